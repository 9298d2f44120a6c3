//! The seam between [`crate::ExcelService`] and whatever executes bridge commands.

use std::path::Path;

use genie_protocol::{Command, ResponseData};

use crate::error::BridgeError;

/// Executes bridge protocol commands against one Excel instance.
///
/// [`crate::ExcelBridge`] implements this over the bridge subprocess.
pub trait ExcelHost {
    /// Send one command and wait for its response data.
    fn send(&self, command: Command) -> Result<Option<ResponseData>, BridgeError>;

    /// Render a local path the way the Excel side expects it.
    fn host_path(&self, path: &Path) -> String {
        path.display().to_string()
    }
}

impl<H: ExcelHost + ?Sized> ExcelHost for Box<H> {
    fn send(&self, command: Command) -> Result<Option<ResponseData>, BridgeError> {
        (**self).send(command)
    }

    fn host_path(&self, path: &Path) -> String {
        (**self).host_path(path)
    }
}
