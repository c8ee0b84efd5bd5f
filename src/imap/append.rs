//! The APPEND command: admission checks, then streaming the literal to disk.
//!
//! A client sends `tag APPEND mailbox [(flags)] ["date"] {N}` and, after the
//! continuation line, exactly `N` bytes followed by CRLF. [`AppendCommand`]
//! checks the command once up front, then accepts the literal in whatever
//! pieces the network delivers through [`AppendCommand::receive`]. Bytes are
//! buffered and flushed to the message file whenever the buffer passes the
//! configured threshold, so memory stays bounded for any message size.
//!
//! A partially written file is owned by the command until the message
//! record is saved. Any other way out (a write error, [`AppendCommand::abort`],
//! or dropping the command) deletes it.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, error, info, trace, warn};

use super::command::{decode_mailbox_name, tokenize, Word};
use super::response::{Response, Status};
use crate::error::MailError;
use crate::model::{Message, MessageFlags, MessageState};
use crate::server::{
    Account, ChangeKind, ChangeNotification, Folder, Permission, Services, Session,
};

const CONTINUATION_TEXT: &str = "Ready for literal data";
const COMPLETED_TEXT: &str = "APPEND completed";

/// IMAP `date-time` without its quotes.
const INTERNAL_DATE_FORMAT: &str = "%d-%b-%Y %H:%M:%S %z";

/// The CRLF ending the command line after the literal is stored with it.
const LITERAL_TERMINATOR_LEN: u64 = 2;

/// How a rejected or failed APPEND is classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The command itself is unusable.
    ProtocolViolation,
    /// The command is well formed but not allowed. Nothing was written.
    AdmissionDenied,
    /// Writing or recording the message failed midway.
    StorageFailure,
}

/// Why an APPEND did not complete. The message is the reason text sent to
/// the client.
#[derive(Error, Debug)]
pub enum AppendError {
    #[error("Authenticate first")]
    NotAuthenticated,

    #[error("APPEND Command requires at least 2 parameter.")]
    MissingArguments,

    #[error("Missing literal")]
    MissingLiteral,

    #[error("Empty message not permitted.")]
    EmptyMessage,

    #[error("Message size exceeds fixed maximum message size. Size: {size_kb} KB, Max size: {max_kb} KB")]
    TooLarge { size_kb: u64, max_kb: u64 },

    #[error("Folder could not be found.")]
    FolderNotFound,

    #[error("Account could not be fetched.")]
    AccountUnavailable,

    #[error("Your quota has been exceeded.")]
    QuotaExceeded,

    #[error("ACL: Insert permission denied (Required for APPEND command).")]
    InsertDenied,

    #[error("APPEND failed: {0}")]
    Storage(#[from] MailError),
}

impl AppendError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotAuthenticated
            | Self::MissingArguments
            | Self::MissingLiteral
            | Self::EmptyMessage => ErrorCategory::ProtocolViolation,
            Self::TooLarge { .. }
            | Self::FolderNotFound
            | Self::AccountUnavailable
            | Self::QuotaExceeded
            | Self::InsertDenied => ErrorCategory::AdmissionDenied,
            Self::Storage(_) => ErrorCategory::StorageFailure,
        }
    }

    /// The status of the tagged line reporting this error.
    pub fn status(&self) -> Status {
        match self {
            Self::MissingArguments
            | Self::MissingLiteral
            | Self::EmptyMessage
            | Self::FolderNotFound
            | Self::InsertDenied => Status::Bad,
            Self::NotAuthenticated
            | Self::TooLarge { .. }
            | Self::AccountUnavailable
            | Self::QuotaExceeded
            | Self::Storage(_) => Status::No,
        }
    }

    pub fn to_response(&self, tag: &str) -> Response {
        Response::tagged(tag, self.status(), self.to_string())
    }
}

/// Where an [`AppendCommand`] is between calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendState {
    AwaitingCommand,
    ReceivingLiteral,
    Complete,
    Aborted,
}

/// Result of [`AppendCommand::execute`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Accepted; send the continuation line and feed the literal to
    /// [`AppendCommand::receive`].
    Ready(Response),
    /// Rejected with a tagged NO or BAD line. Nothing was written.
    Rejected(Response),
}

impl Admission {
    pub fn response(&self) -> &Response {
        match self {
            Admission::Ready(response) | Admission::Rejected(response) => response,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Admission::Ready(_))
    }
}

/// Result of [`AppendCommand::receive`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
    /// More literal bytes are expected.
    Pending,
    /// The message is stored. `trailing` holds input past the end of the
    /// literal, which belongs to whatever the client sends next.
    Completed {
        responses: Vec<Response>,
        trailing: Vec<u8>,
    },
    /// Storing failed; the partial file has been removed.
    Failed(Response),
    /// No literal was expected. The input is handed back untouched.
    NotReceiving(Vec<u8>),
}

/// The message being received.
struct Delivery {
    tag: String,
    folder: Folder,
    message: Message,
    path: PathBuf,
    flags: String,
    internal_date: Option<String>,
    /// Literal bytes not yet written to disk, buffered ones included.
    remaining: u64,
    buffer: Vec<u8>,
    /// Set once the record is saved; from then on the file is kept.
    committed: bool,
}

impl Delivery {
    fn flush(&mut self) -> Result<(), MailError> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| MailError::io(parent, e))?;
            }
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| MailError::io(&self.path, e))?;
        file.write_all(&self.buffer)
            .map_err(|e| MailError::io(&self.path, e))?;

        self.remaining -= self.buffer.len() as u64;
        trace!(
            path = %self.path.display(),
            written = self.buffer.len(),
            remaining = self.remaining,
            "Flushed literal bytes"
        );
        self.buffer.clear();
        Ok(())
    }
}

impl Drop for Delivery {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        match fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Removed partial message file"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(
                path = %self.path.display(),
                "Could not remove partial message file: {}", e
            ),
        }
    }
}

/// The APPEND state machine of one connection.
///
/// One instance can serve any number of APPEND commands in sequence.
pub struct AppendCommand {
    services: Arc<Services>,
    state: AppendState,
    delivery: Option<Delivery>,
}

impl AppendCommand {
    pub fn new(services: Arc<Services>) -> Self {
        Self {
            services,
            state: AppendState::AwaitingCommand,
            delivery: None,
        }
    }

    pub fn state(&self) -> AppendState {
        self.state
    }

    /// True while literal bytes are expected (binary mode).
    pub fn is_receiving(&self) -> bool {
        self.delivery.is_some()
    }

    /// Literal bytes still expected, including the closing CRLF.
    pub fn bytes_remaining(&self) -> Option<u64> {
        self.delivery
            .as_ref()
            .map(|d| d.remaining - d.buffer.len() as u64)
    }

    /// The file the literal is being written to.
    pub fn destination(&self) -> Option<&Path> {
        self.delivery.as_ref().map(|d| d.path.as_path())
    }

    /// Check an APPEND command. `arguments` is everything after the
    /// command name. A command still receiving is aborted first.
    pub fn execute(&mut self, session: &Session, tag: &str, arguments: &str) -> Admission {
        if self.delivery.is_some() {
            self.abort();
        }

        match self.admit(session, tag, arguments) {
            Ok(delivery) => {
                debug!(
                    tag,
                    folder = %delivery.folder.path,
                    bytes = delivery.remaining,
                    path = %delivery.path.display(),
                    "APPEND accepted"
                );
                self.delivery = Some(delivery);
                self.state = AppendState::ReceivingLiteral;
                Admission::Ready(Response::Continuation(CONTINUATION_TEXT.to_string()))
            }
            Err(e) => {
                info!(tag, category = ?e.category(), "APPEND rejected: {}", e);
                self.state = AppendState::AwaitingCommand;
                Admission::Rejected(e.to_response(tag))
            }
        }
    }

    /// Feed literal bytes received from the client.
    pub fn receive(&mut self, session: &Session, data: &[u8]) -> Progress {
        let Some(mut delivery) = self.delivery.take() else {
            return Progress::NotReceiving(data.to_vec());
        };

        let wanted = delivery.remaining - delivery.buffer.len() as u64;
        let take = usize::try_from(wanted).map_or(data.len(), |w| w.min(data.len()));
        delivery.buffer.extend_from_slice(&data[..take]);
        let trailing = &data[take..];

        if delivery.buffer.len() as u64 >= delivery.remaining {
            let result = match delivery.flush() {
                Ok(()) => self.finalize(session, &mut delivery),
                Err(e) => Err(e.into()),
            };
            return match result {
                Ok(responses) => {
                    self.state = AppendState::Complete;
                    Progress::Completed {
                        responses,
                        trailing: trailing.to_vec(),
                    }
                }
                Err(e) => self.fail(delivery, e),
            };
        }

        if delivery.buffer.len() >= self.services.limits.flush_threshold.max(1) {
            if let Err(e) = delivery.flush() {
                return self.fail(delivery, e.into());
            }
        }

        self.delivery = Some(delivery);
        Progress::Pending
    }

    /// Abandon the literal being received and delete its partial file.
    pub fn abort(&mut self) {
        if let Some(delivery) = self.delivery.take() {
            info!(
                tag = %delivery.tag,
                remaining = delivery.remaining - delivery.buffer.len() as u64,
                "APPEND aborted"
            );
            drop(delivery);
            self.state = AppendState::Aborted;
        }
    }

    fn admit(&self, session: &Session, tag: &str, arguments: &str) -> Result<Delivery, AppendError> {
        let account_id = session.account_id.ok_or(AppendError::NotAuthenticated)?;

        let words = tokenize(arguments);
        if words.len() < 2 {
            return Err(AppendError::MissingArguments);
        }
        let size = match words.last() {
            Some(Word::Literal { size, .. }) => *size,
            _ => return Err(AppendError::MissingLiteral),
        };
        if size == 0 {
            return Err(AppendError::EmptyMessage);
        }

        let mailbox = match &words[0] {
            Word::Quoted(name) => name.clone(),
            word => decode_mailbox_name(&word.text()),
        };
        let mut flags = String::new();
        let mut internal_date = None;
        for word in &words[1..words.len() - 1] {
            match word {
                Word::List(list) => flags = list.clone(),
                Word::Quoted(date) => internal_date = Some(date.trim_start().to_string()),
                _ => {}
            }
        }

        let total = size.saturating_add(LITERAL_TERMINATOR_LEN);
        let max_kb = self.max_message_size_kb(account_id);
        if max_kb > 0 && total / 1024 > max_kb {
            return Err(AppendError::TooLarge {
                size_kb: total / 1024,
                max_kb,
            });
        }

        let folder = self
            .services
            .folders
            .folder_by_path(account_id, &mailbox)
            .ok_or(AppendError::FolderNotFound)?;

        let owner = if folder.public {
            None
        } else {
            let account = self
                .services
                .directory
                .account(account_id)
                .ok_or(AppendError::AccountUnavailable)?;
            if !account.space_available(total) {
                return Err(AppendError::QuotaExceeded);
            }
            Some(account)
        };

        if !self.services.acl.check(session, &folder, Permission::Insert) {
            return Err(AppendError::InsertDenied);
        }

        let message = Message::new(folder.account_id, folder.id);
        let path = self.services.messages.file_path(owner.as_ref(), &message);
        let capacity = usize::try_from(total)
            .unwrap_or(usize::MAX)
            .min(self.services.limits.flush_threshold);

        Ok(Delivery {
            tag: tag.to_string(),
            folder,
            message,
            path,
            flags,
            internal_date,
            remaining: total,
            buffer: Vec::with_capacity(capacity),
            committed: false,
        })
    }

    /// The server limit, lowered by the account's domain limit when that
    /// is set and smaller. 0 means no limit.
    fn max_message_size_kb(&self, account_id: u64) -> u64 {
        let server_max = self.services.limits.max_message_size_kb;
        let domain_max = self
            .services
            .directory
            .account(account_id)
            .and_then(|account: Account| self.services.directory.domain(account.domain_id))
            .map(|domain| domain.max_message_size_kb)
            .unwrap_or(0);

        match (server_max, domain_max) {
            (0, d) => d,
            (s, 0) => s,
            (s, d) => s.min(d),
        }
    }

    fn finalize(&self, session: &Session, delivery: &mut Delivery) -> Result<Vec<Response>, AppendError> {
        let size = fs::metadata(&delivery.path)
            .map_err(|e| MailError::io(&delivery.path, e))?
            .len();

        let folder = delivery.folder.clone();
        let message = &mut delivery.message;
        message.size = size;
        message.state = MessageState::Delivered;

        let mut flags = MessageFlags::from_imap_list(&delivery.flags);
        if flags.contains(MessageFlags::SEEN)
            && !self.services.acl.check(session, &folder, Permission::WriteSeen)
        {
            debug!(folder = %folder.path, "No write-seen permission, \\Seen not applied");
            flags.remove(MessageFlags::SEEN);
        }
        flags.insert(MessageFlags::RECENT);
        message.flags = flags;

        if let Some(date) = &delivery.internal_date {
            match parse_internal_date(date) {
                Some(time) => message.create_time = Some(time),
                None => warn!(date = %date, "Ignoring unparseable internal date"),
            }
        }

        self.services.messages.save(message)?;
        delivery.committed = true;
        self.services.directory.refresh_account(message.account_id);
        self.services.folders.mark_needs_refresh(folder.id);

        let mut responses = Vec::new();
        if session.selected == Some(folder.id) {
            let counts = self.services.folders.counts(folder.id);
            responses.push(Response::Untagged(format!("{} EXISTS", counts.exists)));
            responses.push(Response::Untagged(format!("{} RECENT", counts.recent)));
        }
        responses.push(Response::tagged(&delivery.tag, Status::Ok, COMPLETED_TEXT));

        self.services.notifier.publish(
            Some(session.client_id),
            ChangeNotification {
                account_id: folder.account_id,
                folder_id: folder.id,
                kind: ChangeKind::MessageAdded,
            },
        );

        info!(
            tag = %delivery.tag,
            folder = %folder.path,
            id = message.id,
            size,
            "APPEND completed"
        );
        Ok(responses)
    }

    fn fail(&mut self, delivery: Delivery, e: AppendError) -> Progress {
        error!(
            tag = %delivery.tag,
            path = %delivery.path.display(),
            "APPEND failed: {}", e
        );
        let response = e.to_response(&delivery.tag);
        drop(delivery);
        self.state = AppendState::Aborted;
        Progress::Failed(response)
    }
}

impl Drop for AppendCommand {
    fn drop(&mut self) {
        self.abort();
    }
}

impl std::fmt::Debug for AppendCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppendCommand")
            .field("state", &self.state)
            .field("remaining", &self.bytes_remaining())
            .finish_non_exhaustive()
    }
}

/// Parse an IMAP internal date such as `17-Jul-1996 02:44:25 -0700`.
/// Month names match in any case.
pub fn parse_internal_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(value.trim(), INTERNAL_DATE_FORMAT)
        .ok()
        .map(|date| date.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::memory::{FileMessageRepository, MemoryDirectory, MemoryFolders, StaticAcl};
    use crate::server::notify::NotificationHub;
    use crate::server::{Domain, FolderRepository, Limits};
    use chrono::TimeZone;

    struct Fixture {
        _tmp: tempfile::TempDir,
        folders: Arc<MemoryFolders>,
        inbox: Folder,
        services: Arc<Services>,
    }

    fn fixture(quota: u64, acl: StaticAcl) -> Fixture {
        let tmp = tempfile::tempdir().unwrap();
        let directory = Arc::new(MemoryDirectory::new());
        directory.add_domain(Domain {
            id: 1,
            name: "example.com".to_string(),
            max_message_size_kb: 0,
        });
        directory.add_account(Account {
            id: 1,
            domain_id: 1,
            address: "user@example.com".to_string(),
            quota_bytes: quota,
            used_bytes: 0,
        });
        let folders = Arc::new(MemoryFolders::new());
        let inbox = folders.add_folder(1, "INBOX", false);
        let messages = Arc::new(FileMessageRepository::new(
            tmp.path().to_path_buf(),
            directory.clone(),
            folders.clone(),
        ));
        let services = Arc::new(Services {
            directory,
            folders: folders.clone(),
            messages,
            acl: Arc::new(acl),
            notifier: Arc::new(NotificationHub::new()),
            limits: Limits {
                max_message_size_kb: 0,
                flush_threshold: 20000,
            },
        });
        Fixture {
            _tmp: tmp,
            folders,
            inbox,
            services,
        }
    }

    fn session() -> Session {
        Session::new(1).authenticated(1)
    }

    #[test]
    fn test_rejections_before_streaming() {
        let fx = fixture(0, StaticAcl::allow_all());
        let mut cmd = AppendCommand::new(fx.services.clone());

        let cases = [
            (Session::new(9), "INBOX {5}", Status::No, "Authenticate first"),
            (session(), "INBOX", Status::Bad, "APPEND Command requires at least 2 parameter."),
            (session(), "INBOX (\\Seen)", Status::Bad, "Missing literal"),
            (session(), "INBOX () {0}", Status::Bad, "Empty message not permitted."),
            (session(), "Nowhere {5}", Status::Bad, "Folder could not be found."),
        ];
        for (session, args, status, text) in cases {
            let admission = cmd.execute(&session, "t1", args);
            assert!(!admission.is_ready(), "{args}");
            assert_eq!(admission.response(), &Response::tagged("t1", status, text));
            assert!(!cmd.is_receiving());
        }
    }

    #[test]
    fn test_single_buffer_append() {
        let fx = fixture(0, StaticAcl::allow_all());
        let mut cmd = AppendCommand::new(fx.services.clone());
        let mut session = session();
        session.select(fx.inbox.id);

        let admission = cmd.execute(&session, "a1", "INBOX (\\Flagged) {5}");
        assert_eq!(
            admission,
            Admission::Ready(Response::Continuation("Ready for literal data".into()))
        );
        assert_eq!(cmd.bytes_remaining(), Some(7));
        let path = cmd.destination().unwrap().to_path_buf();

        let progress = cmd.receive(&session, b"hello\r\nb2 NOOP\r\n");
        let Progress::Completed { responses, trailing } = progress else {
            panic!("expected completion, got {progress:?}");
        };
        assert_eq!(
            responses,
            vec![
                Response::Untagged("1 EXISTS".into()),
                Response::Untagged("1 RECENT".into()),
                Response::tagged("a1", Status::Ok, "APPEND completed"),
            ]
        );
        assert_eq!(trailing, b"b2 NOOP\r\n");
        assert_eq!(std::fs::read(&path).unwrap(), b"hello\r\n");
        assert_eq!(cmd.state(), AppendState::Complete);

        let stored = fx.folders.messages(fx.inbox.id);
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].size, 7);
        assert_eq!(stored[0].state, MessageState::Delivered);
        assert_eq!(stored[0].flags, MessageFlags::FLAGGED | MessageFlags::RECENT);
        assert!(fx.folders.needs_refresh(fx.inbox.id));
    }

    #[test]
    fn test_unselected_folder_gets_only_tagged_ok() {
        let fx = fixture(0, StaticAcl::allow_all());
        let mut cmd = AppendCommand::new(fx.services.clone());
        cmd.execute(&session(), "a1", "INBOX {1}");
        let Progress::Completed { responses, .. } = cmd.receive(&session(), b"x\r\n") else {
            panic!("expected completion");
        };
        assert_eq!(responses, vec![Response::tagged("a1", Status::Ok, "APPEND completed")]);
    }

    #[test]
    fn test_threshold_flush_keeps_memory_bounded() {
        let fx = fixture(0, StaticAcl::allow_all());
        let mut cmd = AppendCommand::new(fx.services.clone());
        cmd.execute(&session(), "a1", "INBOX {50000}");

        assert_eq!(cmd.receive(&session(), &[b'a'; 25000]), Progress::Pending);
        assert_eq!(cmd.bytes_remaining(), Some(25002));
        let path = cmd.destination().unwrap().to_path_buf();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 25000);

        assert_eq!(cmd.receive(&session(), &[b'a'; 10000]), Progress::Pending);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 25000);

        let mut tail = vec![b'a'; 15000];
        tail.extend_from_slice(b"\r\n");
        assert!(matches!(
            cmd.receive(&session(), &tail),
            Progress::Completed { .. }
        ));
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 50002);
    }

    #[test]
    fn test_size_limit_uses_smaller_domain_limit() {
        let fx = fixture(0, StaticAcl::allow_all());
        let mut services = (*fx.services).clone();
        services.limits.max_message_size_kb = 100;
        let directory = Arc::new(MemoryDirectory::new());
        directory.add_domain(Domain {
            id: 1,
            name: "example.com".to_string(),
            max_message_size_kb: 2,
        });
        directory.add_account(Account {
            id: 1,
            domain_id: 1,
            address: "user@example.com".to_string(),
            quota_bytes: 0,
            used_bytes: 0,
        });
        services.directory = directory;
        let mut cmd = AppendCommand::new(Arc::new(services));

        let admission = cmd.execute(&session(), "a1", "INBOX {3100}");
        assert_eq!(
            admission.response(),
            &Response::tagged(
                "a1",
                Status::No,
                "Message size exceeds fixed maximum message size. Size: 3 KB, Max size: 2 KB"
            )
        );
        assert!(cmd.execute(&session(), "a2", "INBOX {2000}").is_ready());
    }

    #[test]
    fn test_insert_permission_required() {
        let fx = fixture(0, StaticAcl::new(&[Permission::Read]));
        let mut cmd = AppendCommand::new(fx.services.clone());
        let admission = cmd.execute(&session(), "a1", "INBOX {3}");
        assert_eq!(
            admission.response(),
            &Response::tagged(
                "a1",
                Status::Bad,
                "ACL: Insert permission denied (Required for APPEND command)."
            )
        );
    }

    #[test]
    fn test_internal_date_is_applied() {
        let fx = fixture(0, StaticAcl::allow_all());
        let mut cmd = AppendCommand::new(fx.services.clone());
        cmd.execute(
            &session(),
            "a1",
            r#"INBOX () " 7-feb-1994 21:52:25 -0800" {1}"#,
        );
        cmd.receive(&session(), b"x\r\n");
        let stored = fx.folders.messages(fx.inbox.id);
        assert_eq!(
            stored[0].create_time,
            Some(Utc.with_ymd_and_hms(1994, 2, 8, 5, 52, 25).unwrap())
        );
    }

    #[test]
    fn test_parse_internal_date() {
        assert_eq!(
            parse_internal_date("17-Jul-1996 02:44:25 -0700"),
            Some(Utc.with_ymd_and_hms(1996, 7, 17, 9, 44, 25).unwrap())
        );
        assert!(parse_internal_date("yesterday").is_none());
    }

    #[test]
    fn test_abort_removes_partial_file() {
        let fx = fixture(0, StaticAcl::allow_all());
        let mut cmd = AppendCommand::new(fx.services.clone());
        cmd.execute(&session(), "a1", "INBOX {30000}");
        cmd.receive(&session(), &[0u8; 21000]);
        let path = cmd.destination().unwrap().to_path_buf();
        assert!(path.exists());

        cmd.abort();
        assert!(!path.exists());
        assert_eq!(cmd.state(), AppendState::Aborted);
        assert!(fx.folders.messages(fx.inbox.id).is_empty());
    }

    #[test]
    fn test_receive_without_command() {
        let fx = fixture(0, StaticAcl::allow_all());
        let mut cmd = AppendCommand::new(fx.services.clone());
        assert_eq!(
            cmd.receive(&session(), b"stray"),
            Progress::NotReceiving(b"stray".to_vec())
        );
    }

    #[test]
    fn test_error_categories() {
        assert_eq!(AppendError::EmptyMessage.category(), ErrorCategory::ProtocolViolation);
        assert_eq!(AppendError::QuotaExceeded.category(), ErrorCategory::AdmissionDenied);
        assert_eq!(
            AppendError::Storage(MailError::Config("x".into())).category(),
            ErrorCategory::StorageFailure
        );
    }
}
