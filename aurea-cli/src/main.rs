//! `aurea`: a developer CLI over the Aurea Gold session core.
//!
//! Tokens persist in `<data-dir>/session.json`, so `aurea login` followed by
//! `aurea get /pix/balance` behaves like a signed-in wallet client, including
//! the refresh-and-retry on an expired access token.

use std::path::PathBuf;
use std::sync::Arc;

use aurea_core::config::SessionConfig;
use aurea_core::logger::{set_logger, LogLevel, Logger};
use aurea_core::pix::PixTransfer;
use aurea_core::session::{ApiRequest, LoginCredentials, MemoryAddressBar, Session};
use aurea_core::storage::FileStore;
use aurea_core::{AureaError, Environment, SessionState};
use clap::{Parser, Subcommand};
use eyre::{bail, eyre, WrapErr};
use serde_json::{json, Value};

const DATA_DIR_NAME: &str = "aurea";

/// Aurea Gold wallet session tool.
#[derive(Debug, Parser)]
#[command(name = "aurea", version, about)]
struct Cli {
    /// Backend deployment.
    #[arg(long, env = "AUREA_ENV", default_value = "production", global = true)]
    env: Environment,

    /// JSON configuration file; overrides `--env`.
    #[arg(long, env = "AUREA_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// API base URL; overrides the environment's default.
    #[arg(long, env = "AUREA_API_URL", global = true)]
    api_url: Option<String>,

    /// Directory holding the persisted session.
    #[arg(long, env = "AUREA_DATA_DIR", global = true)]
    data_dir: Option<PathBuf>,

    /// Per-request timeout in seconds.
    #[arg(long, env = "AUREA_TIMEOUT_SECS", global = true)]
    timeout_secs: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Sign in with e-mail and password.
    Login {
        /// Account e-mail.
        #[arg(long, env = "AUREA_EMAIL")]
        email: String,
        /// Account password.
        #[arg(long, env = "AUREA_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Clear the stored tokens.
    Logout,
    /// Print the session state.
    Status,
    /// Exchange the refresh token for a new access token now.
    Refresh,
    /// Store a token delivered in a deep link's fragment (`#at=..&rt=..`).
    Bootstrap {
        /// The full deep-link URL.
        url: String,
    },
    /// Send an authenticated GET and print the JSON body.
    Get {
        /// API path, e.g. `/pix/balance`.
        path: String,
    },
    /// PIX operations.
    #[command(subcommand)]
    Pix(PixCommand),
}

#[derive(Debug, Subcommand)]
enum PixCommand {
    /// Send a PIX transfer.
    Send {
        /// Destination PIX key.
        #[arg(long)]
        key: String,
        /// Amount in centavos.
        #[arg(long)]
        amount_cents: u64,
        /// Description shown to the receiver.
        #[arg(long)]
        description: Option<String>,
        /// Replay an earlier transfer whose outcome was unknown.
        #[arg(long)]
        idempotency_key: Option<String>,
    },
}

/// Forwards core records into `tracing`.
struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, level: LogLevel, message: String) {
        match level {
            LogLevel::Trace => tracing::trace!(target: "aurea_core", "{message}"),
            LogLevel::Debug => tracing::debug!(target: "aurea_core", "{message}"),
            LogLevel::Info => tracing::info!(target: "aurea_core", "{message}"),
            LogLevel::Warn => tracing::warn!(target: "aurea_core", "{message}"),
            LogLevel::Error => tracing::error!(target: "aurea_core", "{message}"),
        }
    }
}

fn init_tracing() -> eyre::Result<()> {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .wrap_err("failed to install tracing subscriber")?;
    set_logger(Arc::new(TracingLogger));
    Ok(())
}

impl Cli {
    fn session_config(&self) -> eyre::Result<SessionConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let json = std::fs::read_to_string(path)
                    .wrap_err_with(|| format!("failed to read {}", path.display()))?;
                SessionConfig::from_json(&json)?
            }
            None => SessionConfig::from_environment(&self.env),
        };
        if let Some(api_url) = &self.api_url {
            config = config.with_api_url(api_url.as_str());
        }
        if let Some(timeout_secs) = self.timeout_secs {
            config = config.with_timeout_secs(timeout_secs);
        }
        Ok(config)
    }

    fn data_dir(&self) -> eyre::Result<PathBuf> {
        if let Some(dir) = &self.data_dir {
            return Ok(dir.clone());
        }
        dirs::data_dir()
            .map(|dir| dir.join(DATA_DIR_NAME))
            .ok_or_else(|| eyre!("no data directory on this platform, pass --data-dir"))
    }

    fn session(&self) -> eyre::Result<Session> {
        let store = FileStore::open(self.data_dir()?).map_err(AureaError::from)?;
        tracing::debug!("session file at {}", store.path().display());
        Ok(Session::new(self.session_config()?, Arc::new(store))?)
    }
}

/// Adds the sign-in hint to `AuthExpired`; the session is already cleared.
fn with_login_hint(err: AureaError) -> eyre::Report {
    let expired = matches!(err, AureaError::AuthExpired);
    let report = eyre::Report::new(err);
    if expired {
        report.wrap_err("session expired, run `aurea login`")
    } else {
        report
    }
}

async fn run(cli: Cli) -> eyre::Result<Value> {
    let session = cli.session()?;

    let output = match cli.command {
        Command::Login { email, password } => {
            session
                .login(&LoginCredentials::new(email, password))
                .await?;
            json!({ "state": session.state() })
        }
        Command::Logout => {
            session.logout();
            json!({ "state": session.state() })
        }
        Command::Status => json!({
            "state": session.state(),
            "api_url": session.config().api_url,
            "has_refresh_token": session.tokens().get_refresh_token().is_some(),
        }),
        Command::Refresh => {
            if session.refresh().await.is_none() {
                bail!("refresh failed, sign in again");
            }
            json!({ "state": session.state() })
        }
        Command::Bootstrap { url } => {
            let address_bar = MemoryAddressBar::new(url);
            let outcome = session.bootstrap(&address_bar);
            json!({
                "outcome": format!("{outcome:?}"),
                "url": address_bar.url(),
                "state": session.state(),
            })
        }
        Command::Get { path } => {
            session
                .dispatcher()
                .send_json::<Value>(&ApiRequest::get(path))
                .await
                .map_err(with_login_hint)?
        }
        Command::Pix(PixCommand::Send {
            key,
            amount_cents,
            description,
            idempotency_key,
        }) => {
            let transfer = PixTransfer {
                pix_key: key,
                amount_cents,
                description,
            };
            let pix = session.pix();
            let mutation = match idempotency_key {
                Some(existing) => pix.resume(&transfer, &existing)?,
                None => pix.prepare(&transfer)?,
            };
            match pix.submit(&mutation).await {
                Ok(receipt) => json!({
                    "receipt": receipt,
                    "idempotency_key": mutation.key().as_str(),
                }),
                Err(err @ AureaError::MutationOutcomeUnknown { .. }) => {
                    return Err(eyre::Report::new(err).wrap_err(format!(
                        "re-run with --idempotency-key {} to settle the transfer",
                        mutation.key()
                    )));
                }
                Err(err) => return Err(with_login_hint(err)),
            }
        }
    };

    if session.state() == SessionState::Expired {
        tracing::warn!("session expired, run `aurea login`");
    }
    Ok(output)
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let cli = Cli::parse();
    init_tracing()?;

    let output = run(cli).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
