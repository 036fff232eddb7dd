use anyhow::Result;
use clap::Parser;
use github_tools_mcp::github::{GithubClient, GithubConfig};
use github_tools_mcp::server::GithubToolsServer;
use rmcp::{transport::stdio, ServiceExt};
use tracing_subscriber::EnvFilter;

/// MCP server exposing GitHub repositories, issues, pull requests, and workflows as tools
#[derive(Parser)]
#[command(name = "github-tools-mcp", version, about)]
struct Cli {
    /// GitHub personal access token.
    /// Can also be set via GITHUB_TOKEN environment variable.
    #[arg(long)]
    token: Option<String>,

    /// Default maximum number of results for search and list tools
    #[arg(long, default_value = "10")]
    max_results: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    // Resolve token: --token > GITHUB_TOKEN
    let token = match cli.token {
        Some(token) => token,
        None => match std::env::var("GITHUB_TOKEN") {
            Ok(token) if !token.is_empty() => {
                tracing::info!("Read GitHub token from GITHUB_TOKEN environment variable");
                token
            }
            _ => anyhow::bail!("a GitHub token is required: set GITHUB_TOKEN or pass --token"),
        },
    };

    let username = std::env::var("GITHUB_USERNAME")
        .ok()
        .filter(|u| !u.is_empty());

    tracing::info!(
        username = username.as_deref().unwrap_or("unknown"),
        max_results = cli.max_results,
        "Starting github-tools-mcp server"
    );

    let github = GithubClient::new(GithubConfig::new(token, username))?;
    let service = GithubToolsServer::new(github, cli.max_results)?;

    let running = service.serve(stdio()).await?;
    running.waiting().await?;

    Ok(())
}
