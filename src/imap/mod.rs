//! The IMAP side of message ingestion: the APPEND command and the few
//! protocol pieces it needs.

pub mod append;
pub mod command;
pub mod response;

pub use append::{Admission, AppendCommand, AppendError, AppendState, ErrorCategory, Progress};
pub use response::{Response, Status};
