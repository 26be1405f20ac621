use std::net::SocketAddr;

use clap::{Parser, ValueEnum};

/// A transparent PostgreSQL wire-protocol proxy that rewrites SQL in
/// flight.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Address to accept client connections on.
    #[arg(short, long, env, default_value = "0.0.0.0:6432")]
    pub listen: SocketAddr,

    /// Address of the upstream PostgreSQL server to forward to.
    #[arg(short, long, env, default_value = "127.0.0.1:5432")]
    pub upstream: SocketAddr,

    /// Optional TOML config file; CLI flags override values it sets.
    #[arg(short, long, env)]
    pub config_file: Option<String>,

    /// Ordered `<old>/<new>` substring rewrite rule; may be given multiple
    /// times. Mutually exclusive with --lua-file.
    #[arg(short, long = "rule")]
    pub rules: Vec<String>,

    /// Path to a Lua script defining `rewriteQuery`/`rewriteParse`.
    /// Mutually exclusive with --rule.
    #[arg(long)]
    pub lua_file: Option<String>,

    #[arg(long, default_value_t = tracing::Level::INFO, env)]
    pub log_level: tracing::Level,

    #[arg(long, value_enum, default_value_t = LogFormat::Text, env)]
    pub log_format: LogFormat,

    #[arg(long, default_value_t = false, env, help = "disable colors in the log output")]
    pub no_color: bool,
}

pub fn parse() -> Args {
    Args::parse()
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum LogFormat {
    Text,
    Structured,
    Debug,
}
