use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::{BufWriter, Read};
use std::path::PathBuf;
use std::sync::Arc;

use mail_console::api::ApiClient;
use mail_console::auth::token_store;
use mail_console::config::{Config, load_config, resolve_db_path};
use mail_console::daemon::{WatchConfig, format_line, run_watch};
use mail_console::domain::mailbox::{MailType, MailboxCredentials, MailboxUpdate, NewMailbox};
use mail_console::domain::platform::{RuleDraft, RuleUpdate, validate_platform_name};
use mail_console::feed::MailFeedMerger;
use mail_console::store::repo::{KeyValueStore, MemoryStore};
use mail_console::store::sqlite::SqliteStore;
use mail_console::terminal::run_tui;

#[derive(Parser)]
#[command(name = "mail_console")]
#[command(about = "Operator console for the mail ingestion backend", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Log in and store the session token in the keyring
    Login {
        #[arg(long)]
        username: Option<String>,
    },

    /// Forget the stored session token
    Logout,

    /// Check that the backend is reachable
    Health,

    /// Print the latest mail snapshot
    Latest,

    /// Follow new mail and raise desktop notifications
    Watch {
        /// Log notifications only
        #[arg(long)]
        no_desktop: bool,
    },

    /// Live feed view
    Tui,

    #[command(subcommand)]
    Mailboxes(MailboxCmd),

    #[command(subcommand)]
    Platforms(PlatformCmd),

    #[command(subcommand)]
    Rules(RuleCmd),

    #[command(subcommand)]
    Graph(GraphCmd),
}

#[derive(Subcommand)]
enum MailboxCmd {
    List {
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 50)]
        page_size: u32,
        #[arg(long)]
        search: Option<String>,
    },
    /// Register a mailbox; the password is read from stdin
    Add {
        email: String,
        #[arg(long, default_value = "outlook")]
        mail_type: MailType,
        #[arg(long)]
        client_id: Option<String>,
        #[arg(long)]
        refresh_token: Option<String>,
        #[arg(long)]
        server: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    Update {
        id: i64,
        #[arg(long)]
        email: String,
        /// Read a new password from stdin
        #[arg(long)]
        password: bool,
        #[arg(long)]
        client_id: Option<String>,
        #[arg(long)]
        refresh_token: Option<String>,
        #[arg(long)]
        use_graph_api: Option<bool>,
        #[arg(long)]
        server: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    Delete {
        id: i64,
    },
    /// Trigger mail retrieval now
    Check {
        id: i64,
    },
    /// Trigger retrieval for several mailboxes; no ids means all of them
    CheckMany {
        ids: Vec<i64>,
    },
    /// Show the messages fetched for one mailbox
    Records {
        id: i64,
    },
    /// List the attachments of one message
    Attachments {
        mail_id: i64,
    },
    /// Save one attachment to disk
    Download {
        attachment_id: i64,
        #[arg(long)]
        out: PathBuf,
    },
    /// Download the mailbox export file
    Export {
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum PlatformCmd {
    List,
    Rename {
        old_name: String,
        new_name: String,
    },
    Tag {
        mailbox_id: i64,
        platform: String,
    },
    Untag {
        mailbox_id: i64,
        platform: String,
    },
    Correct {
        mailbox_id: i64,
        new_name: String,
        #[arg(long)]
        old_name: Option<String>,
        #[arg(long)]
        sender: Option<String>,
    },
    Corrections,
    DeleteCorrection {
        id: i64,
    },
    /// Re-run corrections and rules over all stored mail
    Scan,
    /// Mailboxes already tagged with a platform
    Registered {
        platform: String,
    },
    /// Pick one mailbox not yet tagged with a platform
    Unregistered {
        platform: String,
    },
}

#[derive(Subcommand)]
enum RuleCmd {
    List,
    Add {
        platform: String,
        #[arg(long)]
        sender: Option<String>,
        #[arg(long)]
        subject: Option<String>,
        #[arg(long)]
        content: Option<String>,
    },
    /// Change only the given fields; an empty pattern clears it
    Update {
        id: i64,
        #[arg(long)]
        platform: Option<String>,
        #[arg(long)]
        sender: Option<String>,
        #[arg(long)]
        subject: Option<String>,
        #[arg(long)]
        content: Option<String>,
        #[arg(long)]
        enabled: Option<bool>,
    },
    Delete {
        id: i64,
    },
}

#[derive(Subcommand)]
enum GraphCmd {
    Status,
    Enable,
    Disable,
    /// Create push subscriptions for every OAuth mailbox
    SubscribeAll,
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let cfg = load_config().map_err(|e| anyhow!("Configuration error: {e}"))?;

    match cli.cmd {
        Command::Login { username } => login(&cfg, username),
        Command::Logout => {
            token_store::clear_session_token(&session_account(&cfg))?;
            println!("Logged out of {}", cfg.server_url);
            Ok(())
        }
        Command::Health => {
            let h = ApiClient::new(cfg.server_url()?)?.health()?;
            println!("{} {}", h.status, h.message.unwrap_or_default());
            Ok(())
        }
        Command::Latest => {
            let api = session(&cfg)?;
            let mut feed = MailFeedMerger::new();
            let records = feed.load_initial(&api).context("loading latest mail")?;
            for r in records {
                println!("{}", format_line(r));
            }
            Ok(())
        }
        Command::Watch { no_desktop } => {
            let api = session(&cfg)?;
            let token = token_store::resolve_session_token(&session_account(&cfg))?;
            run_watch(
                &api,
                WatchConfig {
                    ws_url: cfg.ws_url()?,
                    token,
                    desktop_notifications: cfg.notifications && !no_desktop,
                },
            )
        }
        Command::Tui => {
            let api = session(&cfg)?;
            let token = token_store::resolve_session_token(&session_account(&cfg))?;
            let store: Arc<dyn KeyValueStore> = match resolve_db_path(&cfg)
                .and_then(|p| SqliteStore::open(&p))
            {
                Ok(s) => Arc::new(s),
                Err(e) => {
                    log::warn!("column widths will not persist: {e}");
                    Arc::new(MemoryStore::default())
                }
            };
            run_tui(&api, cfg.ws_url()?, token, store)
        }
        Command::Mailboxes(cmd) => mailboxes(&session(&cfg)?, cmd),
        Command::Platforms(cmd) => platforms(&session(&cfg)?, cmd),
        Command::Rules(cmd) => rules(&session(&cfg)?, cmd),
        Command::Graph(cmd) => graph(&session(&cfg)?, cmd),
    }
}

fn session(cfg: &Config) -> Result<ApiClient> {
    let token = token_store::resolve_session_token(&session_account(cfg))?;
    Ok(ApiClient::new(cfg.server_url()?)?.with_token(token))
}

/// Keyring account every command reads the token from. Login writes to the
/// same one even when `--username` differs from the configured user.
fn session_account(cfg: &Config) -> String {
    cfg.account()
}

fn read_secret(prompt: &str) -> Result<String> {
    eprintln!("{prompt} (end with Ctrl-D):");
    let mut secret = String::new();
    std::io::stdin().read_to_string(&mut secret)?;
    let secret = secret.trim().to_string();
    if secret.is_empty() {
        return Err(anyhow!("nothing read from stdin"));
    }
    Ok(secret)
}

fn login(cfg: &Config, username: Option<String>) -> Result<()> {
    let username = username
        .or_else(|| cfg.username.clone())
        .ok_or_else(|| anyhow!("pass --username or set username in config"))?;
    let password = read_secret("Password")?;

    let api = ApiClient::new(cfg.server_url()?)?;
    let resp = api.login(&username, &password)?;

    token_store::save_session_token(&session_account(cfg), &resp.token)?;
    println!(
        "Logged in as {}{}",
        resp.user.username,
        if resp.user.is_admin { " (admin)" } else { "" }
    );
    Ok(())
}

fn mailboxes(api: &ApiClient, cmd: MailboxCmd) -> Result<()> {
    match cmd {
        MailboxCmd::List {
            page,
            page_size,
            search,
        } => {
            let p = api.list_mailboxes(page, page_size, search.as_deref())?;
            for m in &p.emails {
                let flag = if m.needs_attention() { "!" } else { " " };
                println!(
                    "{flag} {:>6}  {:<40} {:<8} subs={} [{}] {}",
                    m.id,
                    m.email,
                    format!("{:?}", m.mail_type).to_lowercase(),
                    m.subscription_count,
                    m.platforms.join(", "),
                    m.last_error.as_deref().unwrap_or("")
                );
            }
            println!("page {}/{} ({} total)", p.page, p.total_pages, p.total);
        }
        MailboxCmd::Add {
            email,
            mail_type,
            client_id,
            refresh_token,
            server,
            port,
        } => {
            let credentials = if mail_type.is_oauth() {
                MailboxCredentials::OAuth {
                    client_id: client_id.unwrap_or_default(),
                    refresh_token: refresh_token.unwrap_or_default(),
                }
            } else {
                MailboxCredentials::Imap { server, port }
            };
            let mailbox = NewMailbox {
                email,
                password: read_secret("Mailbox password")?,
                mail_type,
                credentials,
            };
            mailbox.validate()?;
            println!("{}", api.add_mailbox(&mailbox)?);
        }
        MailboxCmd::Update {
            id,
            email,
            password,
            client_id,
            refresh_token,
            use_graph_api,
            server,
            port,
        } => {
            let update = MailboxUpdate {
                email,
                password: if password {
                    Some(read_secret("New mailbox password")?)
                } else {
                    None
                },
                client_id,
                refresh_token,
                use_graph_api,
                server,
                port,
            };
            println!("{}", api.update_mailbox(id, &update)?);
        }
        MailboxCmd::Delete { id } => println!("{}", api.delete_mailbox(id)?),
        MailboxCmd::Check { id } => println!("{}", api.check_mailbox(id)?),
        MailboxCmd::CheckMany { ids } => println!("{}", api.batch_check(&ids)?),
        MailboxCmd::Records { id } => {
            for r in api.mailbox_records(id)? {
                println!("{}", format_line(&r));
            }
        }
        MailboxCmd::Attachments { mail_id } => {
            for a in api.mail_attachments(mail_id)? {
                println!(
                    "{:>6}  {:<40} {:<28} {} bytes",
                    a.id,
                    a.filename,
                    a.content_type.as_deref().unwrap_or("-"),
                    a.size
                );
            }
        }
        MailboxCmd::Download { attachment_id, out } => {
            let file = File::create(&out)
                .with_context(|| format!("creating {}", out.display()))?;
            let n = api.download_attachment(attachment_id, &mut BufWriter::new(file))?;
            println!("Wrote {n} bytes to {}", out.display());
        }
        MailboxCmd::Export { out } => {
            let path = match out {
                Some(p) => p,
                None => PathBuf::from(format!(
                    "mailboxes_{}.txt",
                    chrono::Local::now().format("%Y%m%d_%H%M%S")
                )),
            };
            let file = File::create(&path)
                .with_context(|| format!("creating {}", path.display()))?;
            let n = api.export_mailboxes(&mut BufWriter::new(file))?;
            println!("Wrote {n} bytes to {}", path.display());
        }
    }
    Ok(())
}

fn platforms(api: &ApiClient, cmd: PlatformCmd) -> Result<()> {
    match cmd {
        PlatformCmd::List => {
            for p in api.list_platforms()? {
                match p.count() {
                    Some(n) => println!("{:<30} {n}", p.name()),
                    None => println!("{}", p.name()),
                }
            }
        }
        PlatformCmd::Rename { old_name, new_name } => {
            validate_platform_name(&new_name)?;
            if old_name.trim() == new_name.trim() {
                return Err(anyhow!("old and new platform names are the same"));
            }
            let n = api.rename_platform(&old_name, &new_name)?;
            println!("Renamed on {n} mailbox(es)");
        }
        PlatformCmd::Tag {
            mailbox_id,
            platform,
        } => {
            validate_platform_name(&platform)?;
            println!("{}", api.tag_mailbox(mailbox_id, &platform)?);
        }
        PlatformCmd::Untag {
            mailbox_id,
            platform,
        } => println!("{}", api.untag_mailbox(mailbox_id, &platform)?),
        PlatformCmd::Correct {
            mailbox_id,
            new_name,
            old_name,
            sender,
        } => {
            validate_platform_name(&new_name)?;
            println!(
                "{}",
                api.correct_platform(
                    mailbox_id,
                    old_name.as_deref(),
                    &new_name,
                    sender.as_deref()
                )?
            );
        }
        PlatformCmd::Corrections => {
            for c in api.platform_corrections()? {
                println!(
                    "{:>6}  {:<40} {} -> {}",
                    c.id,
                    c.sender.unwrap_or_default(),
                    c.old_name.unwrap_or_default(),
                    c.new_name.unwrap_or_default()
                );
            }
        }
        PlatformCmd::DeleteCorrection { id } => {
            println!("{}", api.delete_platform_correction(id)?)
        }
        PlatformCmd::Scan => {
            let s = api.scan_emails_for_platforms()?;
            println!("Scanned {} message(s), tagged {} platform(s)", s.scanned, s.tagged);
        }
        PlatformCmd::Registered { platform } => {
            let r = api.registered_mailboxes(&platform)?;
            for email in &r.emails {
                println!("{email}");
            }
            println!("{} mailbox(es) on {}", r.count, r.platform);
        }
        PlatformCmd::Unregistered { platform } => {
            let p = api.unregistered_mailbox(&platform)?;
            match p.email {
                Some(email) => println!("{email} ({} more left)", p.remaining),
                None => println!("Every mailbox is already on {}", p.platform),
            }
        }
    }
    Ok(())
}

fn rules(api: &ApiClient, cmd: RuleCmd) -> Result<()> {
    match cmd {
        RuleCmd::List => {
            for r in api.list_rules()? {
                println!(
                    "{:>6} {} {:<24} sender={} subject={} content={}",
                    r.id,
                    if r.is_enabled { "on " } else { "off" },
                    r.platform_name,
                    r.sender_pattern.as_deref().unwrap_or("-"),
                    r.subject_pattern.as_deref().unwrap_or("-"),
                    r.content_pattern.as_deref().unwrap_or("-"),
                );
            }
        }
        RuleCmd::Add {
            platform,
            sender,
            subject,
            content,
        } => {
            let draft = RuleDraft {
                platform_name: platform,
                sender_pattern: sender,
                subject_pattern: subject,
                content_pattern: content,
                is_enabled: None,
            }
            .normalized();
            draft.validate()?;
            println!("Created rule {}", api.add_rule(&draft)?);
        }
        RuleCmd::Update {
            id,
            platform,
            sender,
            subject,
            content,
            enabled,
        } => {
            let update = RuleUpdate {
                platform_name: platform,
                sender_pattern: sender,
                subject_pattern: subject,
                content_pattern: content,
                is_enabled: enabled,
            }
            .normalized();
            update.validate()?;
            println!("{}", api.update_rule(id, &update)?);
        }
        RuleCmd::Delete { id } => println!("{}", api.delete_rule(id)?),
    }
    Ok(())
}

fn graph(api: &ApiClient, cmd: GraphCmd) -> Result<()> {
    match cmd {
        GraphCmd::Status => {
            let s = api.graph_api_status()?;
            let state = if s.use_graph_api { "enabled" } else { "disabled" };
            println!("push subscriptions: {state}");
            println!("oauth mailboxes:    {}", s.outlook_email_count);
            println!(
                "subscriptions:      {}/{} ({} missing, {} expired)",
                s.subscription_count,
                s.expected_subscription_count,
                s.missing_subscriptions(),
                s.expired_count
            );
        }
        GraphCmd::Enable => println!("{}", api.set_graph_api(true)?),
        GraphCmd::Disable => println!("{}", api.set_graph_api(false)?),
        GraphCmd::SubscribeAll => println!("{}", api.create_all_subscriptions()?),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_update_accepts_enabled_flag_alone() {
        let args = ["mail_console", "rules", "update", "5", "--enabled", "false"];
        let cli = Cli::try_parse_from(args).unwrap();
        let Command::Rules(RuleCmd::Update {
            id,
            platform,
            sender,
            enabled,
            ..
        }) = cli.cmd
        else {
            panic!("expected rules update");
        };
        assert_eq!(id, 5);
        assert!(platform.is_none());
        assert!(sender.is_none());
        assert_eq!(enabled, Some(false));
    }

    #[test]
    fn login_stores_token_where_later_commands_look() {
        let cfg: Config = toml::from_str(r#"server_url = "http://mail.local:5000""#).unwrap();
        assert_eq!(session_account(&cfg), cfg.account());
        assert_eq!(session_account(&cfg), "http://mail.local:5000");
    }

    #[test]
    fn check_many_takes_zero_or_more_ids() {
        let cli = Cli::try_parse_from(["mail_console", "mailboxes", "check-many"]).unwrap();
        assert!(matches!(
            cli.cmd,
            Command::Mailboxes(MailboxCmd::CheckMany { ids }) if ids.is_empty()
        ));
        let cli =
            Cli::try_parse_from(["mail_console", "mailboxes", "check-many", "1", "4"]).unwrap();
        assert!(matches!(
            cli.cmd,
            Command::Mailboxes(MailboxCmd::CheckMany { ids }) if ids == vec![1, 4]
        ));
    }
}
