use std::error::Error;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchErrorCode {
    MissingInput,
    UnreadableFont,
    BackupRename,
    ContainerLoad,
    SerializeOrWrite,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchError {
    pub code: PatchErrorCode,
    pub message: String,
}

impl PatchError {
    pub fn new(code: PatchErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for PatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

impl Error for PatchError {}
