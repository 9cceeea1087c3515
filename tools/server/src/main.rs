//! DriveMCP - Google Drive tools for MCP clients.
//!
//! ## Usage
//!
//! Add to your MCP client configuration:
//! ```json
//! {
//!   "mcpServers": {
//!     "drive": {
//!       "command": "drivemcp",
//!       "args": ["serve"]
//!     }
//!   }
//! }
//! ```
//!
//! Run `drivemcp auth` once beforehand to complete the browser consent
//! outside the MCP client.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rmcp::transport::stdio;
use rmcp::ServiceExt;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use drivemcp_auth::{AuthStrategy, CredentialResolver};
use drivemcp_drive::SessionFactory;
use drivemcp_server::{AuthArgs, DriveArgs, DriveToolService};

#[derive(Parser)]
#[command(name = "drivemcp")]
#[command(about = "DriveMCP - Read-only Google Drive access over MCP")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(flatten)]
    auth: AuthArgs,

    #[command(flatten)]
    drive: DriveArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve MCP over stdio (default).
    Serve,

    /// Resolve and persist credentials now, then exit.
    Auth,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries the protocol
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => cmd_serve(&cli.auth, &cli.drive).await,
        Commands::Auth => cmd_auth(&cli.auth).await,
    }
}

async fn cmd_serve(auth: &AuthArgs, drive: &DriveArgs) -> Result<()> {
    let resolver = Arc::new(auth.resolver().context("Failed to set up authentication")?);
    let sessions = Arc::new(SessionFactory::new(resolver, drive.config()));

    info!("Starting DriveMCP server");
    let server = DriveToolService::new(sessions).serve(stdio()).await?;
    server.waiting().await?;

    info!("DriveMCP server stopped");
    Ok(())
}

async fn cmd_auth(auth: &AuthArgs) -> Result<()> {
    let resolver = auth.resolver().context("Failed to set up authentication")?;
    let record = resolver.resolve().await.context("Authorization failed")?;

    println!("Authorized via {}", record.strategy);
    println!("Access token expires: {}", record.expires_at);
    match record.strategy {
        AuthStrategy::InteractiveOAuth => {
            println!("Credentials saved to: {}", auth.token_path.display())
        }
        AuthStrategy::ServiceAccount => {
            println!("Service account tokens are minted per session and not saved")
        }
    }

    Ok(())
}
