// hamchat: Hamming-protected chat relay (`serve`) and interactive client (`chat`).

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use hamchat::client::{run_interactive, Session};
use hamchat::{config, RelayServer};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "hamchat")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log filter when RUST_LOG is unset (default: info for serve, warn for chat)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the relay server
    Serve {
        /// Bind address
        #[arg(long)]
        host: Option<String>,
        #[arg(short, long)]
        port: Option<u16>,
        /// Probability of a single-bit error per forwarded message
        #[arg(long)]
        p_single: Option<f64>,
        /// Probability of a double-bit error per forwarded message
        #[arg(long)]
        p_double: Option<f64>,
        /// Seed for reproducible error injection
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Connect to a relay and chat
    Chat {
        /// Relay host
        #[arg(long)]
        host: Option<String>,
        #[arg(short, long)]
        port: Option<u16>,
        /// User id (prompted for when omitted)
        #[arg(short, long)]
        user: Option<String>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    // config::load logs ignored env overrides; the subscriber must exist first.
    let default_level = match cli.command {
        Commands::Serve { .. } => "info",
        Commands::Chat { .. } => "warn",
    };
    init_logging(cli.log_level.as_deref().unwrap_or(default_level));
    let mut cfg = config::load(cli.config.as_deref()).context("loading configuration")?;

    match cli.command {
        Commands::Serve {
            host,
            port,
            p_single,
            p_double,
            seed,
        } => {
            let s = &mut cfg.server;
            s.host = host.unwrap_or(s.host.clone());
            s.port = port.unwrap_or(s.port);
            s.p_single = p_single.unwrap_or(s.p_single);
            s.p_double = p_double.unwrap_or(s.p_double);
            s.seed = seed.or(s.seed);

            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(async {
                let server = RelayServer::bind(&cfg.server).await?;
                tokio::select! {
                    res = server.run() => res?,
                    res = shutdown_signal() => {
                        res?;
                        info!("shutting down");
                    }
                }
                anyhow::Ok(())
            })
        }
        Commands::Chat { host, port, user } => {
            let c = &mut cfg.client;
            c.host = host.unwrap_or(c.host.clone());
            c.port = port.unwrap_or(c.port);

            let rt = tokio::runtime::Runtime::new()?;
            let res = rt.block_on(chat(cfg.client.connect_addr(), user));
            // stdin is read on a blocking thread that cannot be cancelled.
            rt.shutdown_timeout(Duration::from_millis(250));
            res
        }
    }
}

async fn chat(addr: String, user: Option<String>) -> anyhow::Result<()> {
    let mut input = BufReader::new(tokio::io::stdin());
    let mut out = tokio::io::stdout();
    out.write_all(b"--- [HAMMING CHAT] ---\nError detection and correction enabled.\n")
        .await?;

    let user_id = match user {
        Some(u) => u,
        None => {
            out.write_all(b"Enter your user ID: ").await?;
            out.flush().await?;
            let mut line = String::new();
            input.read_line(&mut line).await?;
            line
        }
    };
    let session = Session::connect(addr.as_str(), &user_id)
        .await
        .with_context(|| format!("connecting to {addr}"))?;
    out.write_all(
        format!(
            "Connected as {}.\nUsage: recipient_id/Your message here\nType '/quit' to exit\n",
            session.user_id()
        )
        .as_bytes(),
    )
    .await?;
    out.flush().await?;

    run_interactive(session, input, &mut out).await?;
    Ok(())
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(filter)
        .try_init()
        .ok();
}

/// Wait for Ctrl+C or SIGTERM (Unix).
async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => res?,
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }
    Ok(())
}
