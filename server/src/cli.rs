use clap::Parser;

/// Multi-tenant code execution HTTP server.
#[derive(Parser, Debug, Clone)]
#[command(version)]
pub struct Cli {
    /// Address to bind the HTTP listener to.
    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,

    /// Port to bind the HTTP listener to.
    #[arg(long, short = 'p', default_value_t = 8080)]
    pub port: u16,

    /// Skip pool warmup on startup even if `CELLBOX_POOL_WARMUP_ON_STARTUP` is set.
    #[arg(long, default_value_t = false)]
    pub no_warmup: bool,
}
