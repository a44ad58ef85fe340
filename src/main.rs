//! qwire - Command-line client for q processes
//!
//! Provides both a REPL and one-shot query execution.

mod output;
mod repl;

use clap::{Parser, Subcommand};
use colored::Colorize;
use output::Format;
use qwire_client::{Client, ClientError, ConnectionConfig};
use qwire_protocol::{TextEncoding, DEFAULT_PORT, MAX_PROTOCOL_VERSION};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "qwire")]
#[command(about = "Command-line client for the q IPC protocol")]
#[command(version)]
struct Cli {
    /// Server host
    #[arg(short = 'H', long, env = "QWIRE_HOST", default_value = "localhost")]
    host: String,

    /// Server port
    #[arg(short, long, env = "QWIRE_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// User name sent in the handshake
    #[arg(short, long, env = "QWIRE_USER", default_value = "")]
    user: String,

    /// Password sent in the handshake
    #[arg(long, env = "QWIRE_PASSWORD", hide_env_values = true, default_value = "")]
    password: String,

    /// Text encoding for symbols and strings (latin1, utf8)
    #[arg(long, default_value = "latin1")]
    encoding: TextEncoding,

    /// Highest protocol version to request
    #[arg(long, default_value_t = MAX_PROTOCOL_VERSION)]
    max_version: u8,

    /// Allow compression for remote peers
    #[arg(long)]
    compression: bool,

    /// Fail requests that take longer than this many milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Result output format
    #[arg(long, value_enum, default_value_t = Format::Text)]
    format: Format,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start interactive REPL
    Repl,

    /// Evaluate one expression and print the result
    Query {
        /// q expression
        expr: String,
    },
}

impl Cli {
    fn config(&self) -> ConnectionConfig {
        let mut config = ConnectionConfig::new(format!("{}:{}", self.host, self.port))
            .with_credentials(&self.user, &self.password)
            .with_max_version(self.max_version)
            .with_encoding(self.encoding)
            .with_compression(self.compression);
        if let Some(ms) = self.timeout_ms {
            config = config.with_request_timeout(Duration::from_millis(ms));
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.config();
    tracing::debug!(?config, "Starting");

    match cli.command {
        Some(Commands::Repl) | None => {
            repl::run(config, cli.format).await?;
        }
        Some(Commands::Query { ref expr }) => {
            let mut client = Client::connect(config).await.map_err(|e| {
                eprintln!("{}: {}", "Connection failed".red(), e);
                e
            })?;

            let result = client.query(expr).await;
            let _ = client.close().await;
            match result {
                Ok(value) => println!("{}", output::render(&value, cli.format)),
                Err(ClientError::ServerError { message }) => {
                    eprintln!("{}", format!("'{message}").red());
                    std::process::exit(1);
                }
                Err(e) => {
                    eprintln!("{}: {}", "Error".red(), e);
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["qwire"]).unwrap();
        assert_eq!(cli.port, DEFAULT_PORT);
        assert_eq!(cli.encoding, TextEncoding::Latin1);
        assert_eq!(cli.format, Format::Text);
        assert!(cli.command.is_none());

        let config = cli.config();
        assert_eq!(config.addr, format!("localhost:{DEFAULT_PORT}"));
        assert_eq!(config.request_timeout, None);
    }

    #[test]
    fn test_query_flags() {
        let cli = Cli::try_parse_from([
            "qwire",
            "-H",
            "tick",
            "-p",
            "5010",
            "--encoding",
            "utf8",
            "--timeout-ms",
            "250",
            "--format",
            "json",
            "query",
            "count trade",
        ])
        .unwrap();
        assert_eq!(cli.format, Format::Json);
        assert!(matches!(cli.command, Some(Commands::Query { ref expr }) if expr == "count trade"));

        let config = cli.config();
        assert_eq!(config.addr, "tick:5010");
        assert_eq!(config.encoding, TextEncoding::Utf8);
        assert_eq!(config.request_timeout, Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_bad_encoding_rejected() {
        assert!(Cli::try_parse_from(["qwire", "--encoding", "ebcdic"]).is_err());
    }
}
