//! Command-line interface.

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(name = "born2eat", version, about = "Born2Eat restaurant discovery backend")]
pub struct Args {
    /// Log output format.
    #[arg(long, value_enum, default_value_t = default_tracing_format())]
    pub tracing: TracingFormat,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TracingFormat {
    Pretty,
    Json,
}

fn default_tracing_format() -> TracingFormat {
    if cfg!(debug_assertions) {
        TracingFormat::Pretty
    } else {
        TracingFormat::Json
    }
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Run the HTTP server (default).
    Serve,
    /// Ingest broadcast episodes once and exit.
    Crawl {
        /// Broadcast code, e.g. TASTY_GUYS.
        #[arg(long)]
        broadcast: String,
        #[arg(long)]
        start: u32,
        /// Last episode to crawl; defaults to the latest published episode.
        #[arg(long)]
        end: Option<u32>,
    },
    /// Reconcile restaurants against the Kakao Local API once and exit.
    KakaoSync {
        #[arg(long, default_value_t = 200)]
        limit: i64,
    },
    /// Rebuild rating/review/like aggregates from source tables and exit.
    RecomputeAggregates,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_crawl_command() {
        let args = Args::parse_from([
            "born2eat", "--tracing", "json", "crawl", "--broadcast", "TASTY_GUYS", "--start", "12",
        ]);
        assert_eq!(args.tracing, TracingFormat::Json);
        match args.command {
            Some(Command::Crawl {
                broadcast,
                start,
                end,
            }) => {
                assert_eq!(broadcast, "TASTY_GUYS");
                assert_eq!(start, 12);
                assert_eq!(end, None);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_no_command_means_serve() {
        let args = Args::parse_from(["born2eat"]);
        assert!(args.command.is_none());
    }
}
