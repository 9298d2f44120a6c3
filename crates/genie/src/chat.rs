//! Conversation history and the undo stack.

use std::path::PathBuf;
use std::sync::mpsc::Receiver;

use genie_excel::Emitter;
use tracing::{debug, info};

/// Placeholder text shown while a response is being generated.
pub const LOADING_TEXT: &str = "Generating...";

/// Emitted by [`ChatManager::pop_undo_action`] when the stack is empty.
pub const NOTHING_TO_UNDO: &str = "No actions to undo.";

#[derive(Debug, Clone, PartialEq)]
pub struct ConversationTurn {
    pub message: String,
    pub is_user: bool,
}

/// Handle to a "Generating..." placeholder turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadingMessage {
    history_index: usize,
}

impl LoadingMessage {
    pub fn history_index(&self) -> usize {
        self.history_index
    }
}

/// A destructive action that can be reverted by reopening its backup.
#[derive(Debug, Clone, PartialEq)]
pub struct UndoAction {
    pub backup_file_path: PathBuf,
    /// History length when the action began.
    pub conversation_history_count: usize,
    /// Number of chat entries to keep on screen after reverting.
    pub chat_panel_count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    MessageAdded { message: String, is_user: bool },
    SystemResponseAdded { description: String, code: String },
    LoadingRemoved(usize),
    /// History was truncated; carries the chat panel count to keep.
    ConversationReverted(usize),
    ConversationCleared,
}

/// Owns the conversation and the stack of undoable actions.
#[derive(Debug, Default)]
pub struct ChatManager {
    history: Vec<ConversationTurn>,
    undo_stack: Vec<UndoAction>,
    custom_instructions: String,
    events: Emitter<ChatEvent>,
}

impl ChatManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self) -> Receiver<ChatEvent> {
        self.events.subscribe()
    }

    pub fn history(&self) -> &[ConversationTurn] {
        &self.history
    }

    pub fn custom_instructions(&self) -> &str {
        &self.custom_instructions
    }

    pub fn set_custom_instructions(&mut self, instructions: impl Into<String>) {
        self.custom_instructions = instructions.into();
    }

    /// Record a user turn. The stored turn carries the custom instructions;
    /// the event carries `message` as typed.
    pub fn add_user_message(&mut self, message: &str) {
        let stored = if self.custom_instructions.is_empty() {
            message.to_string()
        } else {
            format!("[Custom Instructions: {}]\n{message}", self.custom_instructions)
        };
        self.history.push(ConversationTurn {
            message: stored,
            is_user: true,
        });
        self.events.emit(ChatEvent::MessageAdded {
            message: message.to_string(),
            is_user: true,
        });
    }

    /// Record a system turn, replacing the loading placeholder when it is
    /// still in the history.
    pub fn add_system_message(&mut self, message: &str, loading: Option<LoadingMessage>) {
        let turn = ConversationTurn {
            message: message.to_string(),
            is_user: false,
        };
        match loading {
            Some(l) if l.history_index < self.history.len() => {
                self.history[l.history_index] = turn;
            }
            _ => self.history.push(turn),
        }
        self.events.emit(ChatEvent::MessageAdded {
            message: message.to_string(),
            is_user: false,
        });
    }

    pub fn add_loading_message(&mut self) -> LoadingMessage {
        let history_index = self.history.len();
        self.history.push(ConversationTurn {
            message: LOADING_TEXT.to_string(),
            is_user: false,
        });
        self.events.emit(ChatEvent::MessageAdded {
            message: LOADING_TEXT.to_string(),
            is_user: false,
        });
        LoadingMessage { history_index }
    }

    pub fn remove_loading_message(&mut self, loading: LoadingMessage) {
        if loading.history_index < self.history.len() {
            self.history.remove(loading.history_index);
            self.events.emit(ChatEvent::LoadingRemoved(loading.history_index));
        }
    }

    /// A system turn with attached VBA code. Only the description enters
    /// the history.
    pub fn add_system_response(&mut self, description: &str, code: &str) {
        self.history.push(ConversationTurn {
            message: description.to_string(),
            is_user: false,
        });
        self.events.emit(ChatEvent::SystemResponseAdded {
            description: description.to_string(),
            code: code.to_string(),
        });
    }

    /// Push an undoable action, capturing the current history length.
    pub fn push_undo_action(&mut self, backup_file_path: PathBuf, chat_panel_count: usize) {
        info!(backup = %backup_file_path.display(), "pushing undo action");
        self.undo_stack.push(UndoAction {
            backup_file_path,
            conversation_history_count: self.history.len(),
            chat_panel_count,
        });
    }

    /// Pop the latest action and truncate the history back to where it
    /// began. With nothing to undo, says so once and returns `None`.
    pub fn pop_undo_action(&mut self) -> Option<UndoAction> {
        let Some(action) = self.undo_stack.pop() else {
            self.add_system_message(NOTHING_TO_UNDO, None);
            return None;
        };
        self.history.truncate(action.conversation_history_count);
        debug!(
            history = self.history.len(),
            panel = action.chat_panel_count,
            "conversation reverted"
        );
        self.events
            .emit(ChatEvent::ConversationReverted(action.chat_panel_count));
        Some(action)
    }

    /// Put back an action whose revert could not be carried out.
    pub fn restore_undo_action(&mut self, action: UndoAction) {
        self.undo_stack.push(action);
    }

    pub fn has_undo_actions(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn clear(&mut self) {
        self.history.clear();
        self.undo_stack.clear();
        self.events.emit(ChatEvent::ConversationCleared);
    }
}
