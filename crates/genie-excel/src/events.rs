//! Event notifications from [`crate::ExcelService`].

use std::sync::mpsc::{channel, Receiver, Sender};

/// Something that happened to the Excel connection or the open workbook.
#[derive(Debug, Clone, PartialEq)]
pub enum ExcelEvent {
    ConnectionEstablished,
    ConnectionLost,
    /// Path of the loaded workbook, or `"New Workbook"`.
    WorkbookLoaded(String),
    WorkbookClosed,
    WorksheetActivated(String),
    WorksheetRenamed { old: String, new: String },
    WorksheetDeleted(String),
    ErrorOccurred(String),
}

/// Fan-out of events to any number of channel subscribers. Subscribers whose
/// receiver was dropped are pruned on the next emit.
#[derive(Debug)]
pub struct Emitter<E> {
    subscribers: Vec<Sender<E>>,
}

impl<E> Default for Emitter<E> {
    fn default() -> Self {
        Self {
            subscribers: Vec::new(),
        }
    }
}

impl<E: Clone> Emitter<E> {
    pub fn subscribe(&mut self) -> Receiver<E> {
        let (tx, rx) = channel();
        self.subscribers.push(tx);
        rx
    }

    pub fn emit(&mut self, event: E) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_reaches_every_subscriber() {
        let mut emitter = Emitter::default();
        let a = emitter.subscribe();
        let b = emitter.subscribe();
        emitter.emit(ExcelEvent::WorkbookClosed);
        assert_eq!(a.try_recv().unwrap(), ExcelEvent::WorkbookClosed);
        assert_eq!(b.try_recv().unwrap(), ExcelEvent::WorkbookClosed);
    }

    #[test]
    fn test_dropped_subscriber_is_pruned() {
        let mut emitter = Emitter::default();
        let kept = emitter.subscribe();
        drop(emitter.subscribe());
        emitter.emit(ExcelEvent::ConnectionLost);
        assert_eq!(emitter.subscribers.len(), 1);
        assert_eq!(kept.try_recv().unwrap(), ExcelEvent::ConnectionLost);
    }
}
