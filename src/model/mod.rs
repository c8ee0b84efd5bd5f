//! Message model: the stored record, the envelope over its MIME tree, and
//! attachment handles.

pub mod attachment;
pub mod envelope;
pub mod message;

pub type AccountId = u64;
pub type DomainId = u64;
pub type FolderId = u64;
pub type MessageId = u64;

pub use attachment::{Attachment, Attachments};
pub use envelope::{FieldEncoding, LoadOptions, MessageData};
pub use message::{Message, MessageFlags, MessageState, SharedMessage};
