//! `mailcore`: the message core of a mail server.
//!
//! [`model::MessageData`] wraps a MIME part tree and keeps it in a sane
//! shape while bodies and attachments are set, so a message is always
//! serialized with the smallest structure that holds its content.
//! [`imap::AppendCommand`] receives messages over IMAP APPEND, streaming
//! the literal to disk after quota and permission checks.

pub mod config;
pub mod error;
pub mod imap;
pub mod mime;
pub mod model;
pub mod server;
