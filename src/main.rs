use clap::Parser;
use speech_mcp::backends::say::SayBackend;
use speech_mcp::config_loader::{Settings, SETTINGS};
use speech_mcp::mcp::types::ServerInfo;
use speech_mcp::mcp::McpServer;
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// MCP server that speaks text aloud with the macOS `say` command
#[derive(Parser)]
#[command(name = "speech-mcp")]
#[command(author = "StarTuz")]
#[command(version)]
#[command(about = "Text-to-speech tools for MCP clients, served over stdio", long_about = None)]
struct Cli {
    /// Extra configuration file layered over the defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Speech executable to run instead of /usr/bin/say
    #[arg(long)]
    say_command: Option<String>,

    /// Per-call deadline in seconds (0 disables it)
    #[arg(long)]
    timeout_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(command) = cli.say_command {
        settings.say_command = command;
    }
    if let Some(timeout) = cli.timeout_secs {
        settings.request_timeout_secs = timeout;
    }
    settings.validate()?;

    // stdout carries the protocol, logs go to stderr
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.log_level.as_str()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();

    if let Ok(mut global) = SETTINGS.write() {
        *global = settings.clone();
    }

    info!(
        command = %settings.say_command,
        timeout_secs = settings.request_timeout_secs,
        "Starting speech MCP server"
    );

    let backend = Arc::new(SayBackend::new());
    let server = McpServer::new(
        backend,
        ServerInfo {
            name: settings.server_name,
            version: settings.server_version,
        },
    );

    server.serve_stdio().await?;
    Ok(())
}
