//! CLI entry point for `mailcore`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand};
use humansize::{format_size, BINARY};
use serde::Serialize;

use mailcore::config::{self, Config};
use mailcore::imap::{Admission, AppendCommand, Progress, Response};
use mailcore::mime::{header, inspect, PartId, PartTree};
use mailcore::model::{LoadOptions, MessageData};
use mailcore::server::cache::CachedDirectory;
use mailcore::server::memory::{FileMessageRepository, MemoryDirectory, MemoryFolders, StaticAcl};
use mailcore::server::notify::NotificationHub;
use mailcore::server::{Account, Domain, FolderRepository, Limits, Services, Session};

#[derive(Parser)]
#[command(
    name = "mailcore",
    version,
    about = "Inspect and edit MIME messages, and ingest them through IMAP APPEND"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Configuration file to use instead of the standard location
    #[arg(long, value_name = "PATH", global = true, env = "MAILCORE_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show a message's headers, structure, bodies and attachments
    Inspect {
        file: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Replace the plain-text and/or HTML body
    SetBody {
        file: PathBuf,
        #[arg(long, value_name = "TEXT")]
        text: Option<String>,
        #[arg(long, value_name = "HTML")]
        html: Option<String>,
        /// Write here instead of overwriting FILE
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Attach files to a message
    Attach {
        file: PathBuf,
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Write here instead of overwriting FILE
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Save every attachment of a message into a directory
    Extract {
        file: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Deliver a message file through the APPEND command and print the exchange
    Append {
        message: PathBuf,
        /// Root directory for stored message files
        #[arg(long)]
        data_dir: Option<PathBuf>,
        /// Address of the account to deliver to
        #[arg(long)]
        user: String,
        #[arg(long, default_value = "INBOX")]
        mailbox: String,
        /// Flag list, e.g. "\Seen \Flagged"
        #[arg(long)]
        flags: Option<String>,
        /// Internal date, e.g. "17-Jul-1996 02:44:25 -0700"
        #[arg(long)]
        date: Option<String>,
        /// Bytes handed to the command per read
        #[arg(long, default_value_t = 4096)]
        chunk: usize,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match cli.config {
        Some(ref path) => config::load_config_from(path),
        None => config::load_config(),
    };

    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);

    match cli.command {
        Commands::Inspect { file, json } => cmd_inspect(&file, json, &config),
        Commands::SetBody {
            file,
            text,
            html,
            output,
        } => cmd_set_body(&file, text.as_deref(), html.as_deref(), output.as_deref(), &config),
        Commands::Attach {
            file,
            paths,
            output,
        } => cmd_attach(&file, &paths, output.as_deref(), &config),
        Commands::Extract { file, output } => cmd_extract(&file, &output, &config),
        Commands::Append {
            message,
            data_dir,
            user,
            mailbox,
            flags,
            date,
            chunk,
        } => {
            let data_dir = data_dir.unwrap_or_else(|| config::data_dir(&config));
            let request = AppendRequest {
                message: &message,
                data_dir: &data_dir,
                user: &user,
                mailbox: &mailbox,
                flags: flags.as_deref(),
                date: date.as_deref(),
                chunk,
            };
            cmd_append(&request, &config)
        }
        Commands::Completions { shell } => cmd_completions(shell),
    }
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let log_dir = config::log_dir(config);
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(&log_dir, "mailcore.log");
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        // Fall back to stderr only
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "mailcore", &mut std::io::stdout());
    Ok(())
}

fn load_message(path: &Path, config: &Config) -> anyhow::Result<MessageData> {
    if !path.exists() {
        anyhow::bail!("File not found: {}", path.display());
    }
    Ok(MessageData::load(path, None, &LoadOptions::from_config(config))?)
}

// ── inspect ─────────────────────────────────────────────────────

#[derive(Serialize)]
struct Inspection {
    file: String,
    size: u64,
    subject: String,
    from: String,
    to: String,
    date: String,
    /// `date` normalized to RFC 3339, when it parses.
    date_utc: Option<String>,
    structure: Vec<PartSummary>,
    text_bytes: usize,
    html_bytes: usize,
    attachments: Vec<AttachmentInfo>,
    /// The same message as read by an independent parser.
    digest: Option<inspect::Digest>,
}

#[derive(Serialize)]
struct PartSummary {
    depth: usize,
    content_type: String,
    size: usize,
}

#[derive(Serialize)]
struct AttachmentInfo {
    file_name: String,
    content_type: String,
    size: u64,
}

fn describe_tree(tree: &PartTree, id: PartId, depth: usize, out: &mut Vec<PartSummary>) {
    out.push(PartSummary {
        depth,
        content_type: tree.content_type(id),
        size: tree.content_length(id),
    });
    for &child in tree.children(id) {
        describe_tree(tree, child, depth + 1, out);
    }
}

/// Show a message's headers, structure, bodies and attachments.
fn cmd_inspect(path: &Path, json: bool, config: &Config) -> anyhow::Result<()> {
    let mut message = load_message(path, config)?;
    let raw = std::fs::read(path)?;

    let mut structure = Vec::new();
    describe_tree(message.tree(), message.tree().root(), 0, &mut structure);

    let list = message.attachments();
    let mut attachments = Vec::with_capacity(list.len());
    for attachment in list.iter() {
        attachments.push(AttachmentInfo {
            file_name: attachment.file_name(list.message())?,
            content_type: attachment.content_type(list.message())?,
            size: attachment.size(list.message())?,
        });
    }

    let inspection = Inspection {
        file: path.display().to_string(),
        size: raw.len() as u64,
        subject: message.subject(),
        from: message.from(),
        to: message.to(),
        date: message.sent_time(),
        date_utc: header::parse_date(&message.sent_time()).map(|d| d.to_rfc3339()),
        structure,
        text_bytes: message.body().len(),
        html_bytes: message.html_body().len(),
        attachments,
        digest: inspect::summarize(&raw),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&inspection)?);
    } else {
        print_inspection(&inspection);
    }
    Ok(())
}

fn print_inspection(info: &Inspection) {
    println!();
    println!("  {:<12} {}", "File", info.file);
    println!("  {:<12} {}", "Size", format_size(info.size, BINARY));
    println!("  {:<12} {}", "Subject", info.subject);
    println!("  {:<12} {}", "From", info.from);
    println!("  {:<12} {}", "To", info.to);
    println!("  {:<12} {}", "Date", info.date);

    println!();
    println!("  Structure:");
    for part in &info.structure {
        println!(
            "    {}{} ({})",
            "  ".repeat(part.depth),
            part.content_type,
            format_size(part.size, BINARY)
        );
    }

    println!();
    println!("  {:<12} {}", "Text body", format_size(info.text_bytes, BINARY));
    println!("  {:<12} {}", "HTML body", format_size(info.html_bytes, BINARY));

    if !info.attachments.is_empty() {
        println!();
        println!("  {} attachment(s):", info.attachments.len());
        for att in &info.attachments {
            println!(
                "    {:<32} {:<28} {:>10}",
                att.file_name,
                att.content_type,
                format_size(att.size, BINARY)
            );
        }
    }
    println!();
}

// ── set-body / attach / extract ─────────────────────────────────

/// Replace the plain-text and/or HTML body.
fn cmd_set_body(
    path: &Path,
    text: Option<&str>,
    html: Option<&str>,
    output: Option<&Path>,
    config: &Config,
) -> anyhow::Result<()> {
    if text.is_none() && html.is_none() {
        anyhow::bail!("Nothing to do: give --text and/or --html");
    }
    let mut message = load_message(path, config)?;
    if let Some(text) = text {
        message.set_body(text)?;
    }
    if let Some(html) = html {
        message.set_html_body(html)?;
    }
    let target = output.unwrap_or(path);
    message.write(target)?;
    println!("  Wrote {}", target.display());
    Ok(())
}

/// Attach files to a message.
fn cmd_attach(path: &Path, files: &[PathBuf], output: Option<&Path>, config: &Config) -> anyhow::Result<()> {
    let mut message = load_message(path, config)?;
    for file in files {
        let attachment = message.attachments().add_file(file)?;
        println!(
            "  Attached {} ({})",
            attachment.file_name(&message)?,
            format_size(attachment.size(&message)?, BINARY)
        );
    }
    let target = output.unwrap_or(path);
    message.write(target)?;
    println!("  Wrote {}", target.display());
    Ok(())
}

/// Save every attachment of a message into a directory.
fn cmd_extract(path: &Path, output: &Path, config: &Config) -> anyhow::Result<()> {
    let mut message = load_message(path, config)?;
    std::fs::create_dir_all(output)?;

    let list = message.attachments();
    if list.is_empty() {
        println!("  No attachments found.");
        return Ok(());
    }

    let mut written = 0usize;
    for (idx, attachment) in list.iter().enumerate() {
        let name = sanitize_file_name(&attachment.file_name(list.message())?, idx);
        let target = unique_path(output, &name);
        attachment.save_as(list.message(), &target)?;
        written += 1;
    }
    println!("  Extracted {} attachment(s) to {}", written, output.display());
    Ok(())
}

/// Keep only the last path component and drop characters unsafe in file names.
fn sanitize_file_name(name: &str, index: usize) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or("");
    let clean: String = base
        .chars()
        .filter(|c| !c.is_control() && !matches!(c, ':' | '*' | '?' | '"' | '<' | '>' | '|'))
        .collect();
    let clean = clean.trim().trim_start_matches('.');
    if clean.is_empty() {
        format!("attachment_{index}")
    } else {
        clean.to_string()
    }
}

fn unique_path(dir: &Path, name: &str) -> PathBuf {
    let candidate = dir.join(name);
    if !candidate.exists() {
        return candidate;
    }
    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, format!(".{ext}")),
        _ => (name, String::new()),
    };
    (1..)
        .map(|n| dir.join(format!("{stem}_{n}{ext}")))
        .find(|p| !p.exists())
        .unwrap_or(candidate)
}

// ── append ──────────────────────────────────────────────────────

struct AppendRequest<'a> {
    message: &'a Path,
    data_dir: &'a Path,
    user: &'a str,
    mailbox: &'a str,
    flags: Option<&'a str>,
    date: Option<&'a str>,
    chunk: usize,
}

/// Deliver a message file through the APPEND command against in-memory
/// accounts and folders, printing the exchange.
fn cmd_append(request: &AppendRequest<'_>, config: &Config) -> anyhow::Result<()> {
    let data = std::fs::read(request.message)
        .map_err(|e| anyhow::anyhow!("{}: {}", request.message.display(), e))?;
    let Some((_, domain_name)) = request.user.split_once('@') else {
        anyhow::bail!("--user must be a full address, got '{}'", request.user);
    };

    let directory = Arc::new(MemoryDirectory::new());
    directory.add_domain(Domain {
        id: 1,
        name: domain_name.to_string(),
        max_message_size_kb: 0,
    });
    directory.add_account(Account {
        id: 1,
        domain_id: 1,
        address: request.user.to_string(),
        quota_bytes: 0,
        used_bytes: 0,
    });

    let folders = Arc::new(MemoryFolders::new());
    folders.add_folder(1, "INBOX", false);
    if !request.mailbox.eq_ignore_ascii_case("INBOX") {
        folders.add_folder(1, request.mailbox, false);
    }

    let messages = Arc::new(FileMessageRepository::new(
        request.data_dir.to_path_buf(),
        directory.clone(),
        folders.clone(),
    ));
    let services = Arc::new(Services {
        directory: Arc::new(CachedDirectory::new(
            directory,
            config.limits.directory_cache_size,
        )),
        folders: folders.clone(),
        messages,
        acl: Arc::new(StaticAcl::allow_all()),
        notifier: Arc::new(NotificationHub::new()),
        limits: Limits::from_config(config),
    });

    let mut session = Session::new(1).authenticated(1);
    if let Some(folder) = folders.folder_by_path(1, request.mailbox) {
        session.select(folder.id);
    }

    let mut arguments = quote(request.mailbox);
    if let Some(flags) = request.flags {
        arguments.push_str(&format!(" ({flags})"));
    }
    if let Some(date) = request.date {
        arguments.push_str(&format!(" {}", quote(date)));
    }
    arguments.push_str(&format!(" {{{}}}", data.len()));

    let tag = "A001";
    println!("C: {tag} APPEND {arguments}");
    let mut command = AppendCommand::new(services);
    match command.execute(&session, tag, &arguments) {
        Admission::Ready(response) => print_response(&response),
        Admission::Rejected(response) => {
            print_response(&response);
            return Ok(());
        }
    }

    let mut literal = data;
    literal.extend_from_slice(b"\r\n");
    let destination = command.destination().map(Path::to_path_buf);
    println!("C: <{} literal bytes in chunks of {}>", literal.len(), request.chunk.max(1));

    for piece in literal.chunks(request.chunk.max(1)) {
        match command.receive(&session, piece) {
            Progress::Pending => {}
            Progress::Completed { responses, .. } => {
                responses.iter().for_each(print_response);
                if let Some(path) = destination {
                    println!();
                    println!("  Stored {}", path.display());
                }
                return Ok(());
            }
            Progress::Failed(response) => {
                print_response(&response);
                return Ok(());
            }
            Progress::NotReceiving(_) => break,
        }
    }

    anyhow::bail!("Literal ended before the message was complete")
}

fn print_response(response: &Response) {
    print!("S: {response}");
}

/// Render a string as an IMAP quoted string.
fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}
