#![forbid(unsafe_code)]

//! `mc-warden-ctl`: operator CLI for a running `mc-warden` agent.
//!
//! Talks to the agent's HTTP API with a bearer token. The `token`
//! subcommand mints one locally from the shared signing secret.

use std::time::Duration;

use clap::{Parser, Subcommand};
use reqwest::{Method, StatusCode};

use mc_warden::auth::SignedTokenVerifier;
use mc_warden::config::{load_credential, TOKEN_SECRET_KEYS};
use mc_warden::models::backup::BackupKind;
use mc_warden::models::permission::PermissionTier;

type CtlResult<T> = std::result::Result<T, Box<dyn std::error::Error>>;

#[derive(Debug, Parser)]
#[command(
    name = "mc-warden-ctl",
    about = "Operator CLI for the mc-warden agent",
    version,
    long_about = None
)]
struct Cli {
    /// Base URL of the agent's HTTP API.
    #[arg(long, env = "MC_WARDEN_URL", default_value = "http://127.0.0.1:8765")]
    url: String,

    /// Bearer token; mint one with `mc-warden-ctl token`.
    #[arg(long, env = "MC_WARDEN_TOKEN")]
    token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Mint a signed access token from the local secret.
    Token {
        /// Subject recorded in the token.
        #[arg(long, default_value = "operator")]
        subject: String,
        /// Permission tier: moderator, admin, or owner.
        #[arg(long, default_value = "owner")]
        tier: PermissionTier,
        /// Token lifetime in seconds.
        #[arg(long, default_value_t = 300)]
        ttl_seconds: u64,
    },

    /// Show server and RCON status.
    Status,

    /// Start the server.
    Start,

    /// Stop the server gracefully.
    Stop,

    /// Restart the server.
    Restart,

    /// Force-kill the server.
    Kill,

    /// Send a console command.
    Cmd {
        /// Command text, e.g. `say hello`.
        #[arg(required = true, num_args = 1..)]
        command: Vec<String>,
    },

    /// Print recent console output.
    Logs {
        /// Number of lines to fetch.
        #[arg(long, default_value_t = 100)]
        lines: usize,
        /// Keep streaming new lines.
        #[arg(long)]
        follow: bool,
    },

    /// Manage backups.
    #[command(subcommand)]
    Backup(BackupCommand),
}

#[derive(Debug, Subcommand)]
enum BackupCommand {
    /// List backups and storage usage.
    List,
    /// Start a new backup.
    Create {
        /// Free-form label.
        #[arg(long, default_value = "")]
        label: String,
        /// Archive scope: full or data-only.
        #[arg(long, default_value = "full")]
        kind: BackupKind,
    },
    /// Delete a backup.
    Delete {
        /// Backup ID.
        id: String,
    },
    /// Restore a backup over the server root (server must be stopped).
    Restore {
        /// Backup ID.
        id: String,
    },
}

fn main() {
    let args = Cli::parse();

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("Error: failed to build runtime: {err}");
            std::process::exit(1);
        }
    };

    if let Err(err) = runtime.block_on(run(args)) {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

async fn run(args: Cli) -> CtlResult<()> {
    let connect = || Client::new(&args.url, args.token.as_deref());

    let (method, path, body) = match &args.command {
        Command::Token {
            subject,
            tier,
            ttl_seconds,
        } => {
            let (keyring_key, env_key) = TOKEN_SECRET_KEYS;
            let secret = load_credential(keyring_key, env_key).await?;
            let token = SignedTokenVerifier::new(secret)?.issue(
                subject,
                *tier,
                Duration::from_secs(*ttl_seconds),
            )?;
            println!("{token}");
            return Ok(());
        }
        Command::Status => (Method::GET, "/api/status".to_owned(), None),
        Command::Start => (Method::POST, "/api/server/start".to_owned(), None),
        Command::Stop => (Method::POST, "/api/server/stop".to_owned(), None),
        Command::Restart => (Method::POST, "/api/server/restart".to_owned(), None),
        Command::Kill => (Method::POST, "/api/server/kill".to_owned(), None),
        Command::Cmd { command } => (
            Method::POST,
            "/api/command".to_owned(),
            Some(serde_json::json!({ "command": command.join(" ") })),
        ),
        Command::Logs { lines, follow } => {
            return print_logs(&connect()?, *lines, *follow).await;
        }
        Command::Backup(BackupCommand::List) => (Method::GET, "/api/backups".to_owned(), None),
        Command::Backup(BackupCommand::Create { label, kind }) => (
            Method::POST,
            "/api/backups".to_owned(),
            Some(serde_json::json!({ "label": label, "kind": kind })),
        ),
        Command::Backup(BackupCommand::Delete { id }) => {
            (Method::DELETE, format!("/api/backups/{id}"), None)
        }
        Command::Backup(BackupCommand::Restore { id }) => {
            (Method::POST, format!("/api/backups/{id}/restore"), None)
        }
    };

    match connect()?.call(method, &path, body.as_ref()).await? {
        Some(data) => println!("{}", serde_json::to_string_pretty(&data)?),
        None => println!("OK"),
    }
    Ok(())
}

/// Thin JSON client over the agent API.
struct Client {
    http: reqwest::Client,
    base: String,
    token: String,
}

impl Client {
    fn new(base: &str, token: Option<&str>) -> CtlResult<Self> {
        let token = token
            .filter(|token| !token.is_empty())
            .ok_or("no token given; pass --token or set MC_WARDEN_TOKEN")?;
        Ok(Self {
            http: reqwest::Client::builder()
                .connect_timeout(Duration::from_secs(5))
                .build()?,
            base: base.trim_end_matches('/').to_owned(),
            token: token.to_owned(),
        })
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, format!("{}{path}", self.base))
            .bearer_auth(&self.token)
    }

    /// Send a request and decode the JSON reply; `None` for empty bodies.
    async fn call(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> CtlResult<Option<serde_json::Value>> {
        let mut request = self.request(method, path);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::NO_CONTENT {
            return Ok(None);
        }

        let data: serde_json::Value = response.json().await.unwrap_or(serde_json::Value::Null);
        if status.is_success() {
            return Ok(Some(data));
        }

        let message = data
            .get("error")
            .and_then(serde_json::Value::as_str)
            .map_or_else(|| status.to_string(), ToOwned::to_owned);
        Err(message.into())
    }
}

async fn print_logs(client: &Client, lines: usize, follow: bool) -> CtlResult<()> {
    if !follow {
        let data = client
            .call(Method::GET, &format!("/api/logs?lines={lines}"), None)
            .await?
            .unwrap_or(serde_json::Value::Null);
        let history = data
            .get("lines")
            .and_then(serde_json::Value::as_array)
            .cloned()
            .unwrap_or_default();
        for line in history {
            if let Some(text) = line.get("line").and_then(serde_json::Value::as_str) {
                println!("{text}");
            }
        }
        return Ok(());
    }

    let mut response = client
        .request(Method::GET, "/api/logs/stream")
        .send()
        .await?
        .error_for_status()?;

    // Event frames may split across chunks; only complete lines are parsed.
    let mut pending = String::new();
    while let Some(chunk) = response.chunk().await? {
        pending.push_str(&String::from_utf8_lossy(&chunk));
        while let Some(end) = pending.find('\n') {
            let line: String = pending.drain(..=end).collect();
            if let Some(text) = sse_log_text(line.trim_end()) {
                println!("{text}");
            }
        }
    }
    Ok(())
}

/// Extract the console text from a `data:` line of a `log` event.
fn sse_log_text(line: &str) -> Option<String> {
    let payload = line.strip_prefix("data:")?.trim_start();
    let value: serde_json::Value = serde_json::from_str(payload).ok()?;
    value
        .get("line")
        .and_then(serde_json::Value::as_str)
        .map(ToOwned::to_owned)
}
