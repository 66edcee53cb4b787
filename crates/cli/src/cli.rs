use clap::Parser;

/// Aggregate overflow tools from many MCP servers behind one stdio server.
///
/// With no flags, serves MCP on stdin/stdout until the client disconnects.
#[derive(Parser, Debug)]
#[command(name = "mcp-overflow", about = "MCP overflow tool aggregator")]
pub struct CliArgs {
    /// Path to config file (default: ~/.config/mcp-overflow/config.toml)
    #[arg(long)]
    pub config: Option<String>,

    /// Backend registry file (overrides config file and OVERFLOW_REGISTRY)
    #[arg(long)]
    pub registry: Option<String>,

    /// List the overflow tools once and exit instead of serving
    #[arg(long)]
    pub test: bool,
}
