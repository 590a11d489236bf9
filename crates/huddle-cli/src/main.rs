//! Huddle terminal client.
//!
//! # Usage
//!
//! ```bash
//! huddle --server 127.0.0.1:4433 --nickname alice --icon 🦊
//! ```
//!
//! Logs go to stderr; set `RUST_LOG` to override `--log-level`.

use std::path::PathBuf;

use clap::Parser;
use huddle_app::{RedbStorage, Runtime, RuntimeConfig};
use huddle_cli::{CliError, DEFAULT_ICON, Frontend, Profile, QuicDriver, SystemEnv};
use tokio::io::BufReader;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Huddle chat room client
#[derive(Parser, Debug)]
#[command(name = "huddle")]
#[command(about = "Terminal client for Huddle chat rooms")]
#[command(version)]
struct Args {
    /// Server address to connect to
    #[arg(short, long, default_value = "127.0.0.1:4433")]
    server: String,

    /// Directory holding the remembered identity and room
    #[arg(long, default_value = ".huddle")]
    data_dir: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Nickname for rooms (defaults to the remembered one)
    #[arg(short, long)]
    nickname: Option<String>,

    /// Icon shown next to the nickname
    #[arg(short, long)]
    icon: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    std::fs::create_dir_all(&args.data_dir)?;
    let storage = RedbStorage::open(args.data_dir.join("huddle.redb"))?;
    tracing::info!(server = %args.server, data_dir = %args.data_dir.display(), "starting");

    let config = RuntimeConfig::new(args.server);
    let (runtime, handle) = Runtime::new(QuicDriver::new(), SystemEnv::new(), storage, config);
    let task = tokio::spawn(runtime.run());

    let profile = Profile {
        nickname: args.nickname,
        icon: args.icon.unwrap_or_else(|| DEFAULT_ICON.to_string()),
    };
    let frontend = Frontend::new(handle, tokio::io::stdout(), profile);
    frontend.run(BufReader::new(tokio::io::stdin())).await?;

    task.await?;
    Ok(())
}
