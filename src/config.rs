use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

use crate::client::CONTACT_FORM_KEY;
use crate::models::ActionType;

// CLI argument structure
#[derive(Parser, Debug, Clone)]
#[command(name = "catalog-gate")]
#[command(about = "Rate limiting gate for catalog contact and WhatsApp actions")]
pub struct Args {
    // Log filter, overridden by RUST_LOG when set
    #[arg(long, global = true, default_value = "info", env = "CATALOG_GATE_LOG_LEVEL")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the HTTP rate limit endpoint
    Serve(ServeArgs),
    /// Try one action through the local limiter and then the server
    Attempt(AttemptArgs),
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ServeArgs {
    // Port to run the server on
    #[arg(short, long, default_value_t = 8080, env = "CATALOG_GATE_PORT")]
    pub port: u16,

    // Seconds between sweeps of expired entries
    #[arg(
        long,
        default_value_t = 300,
        env = "CATALOG_GATE_CLEANUP_INTERVAL",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub cleanup_interval: u64,

    // Tag attached to every security event
    #[arg(long, default_value = "development", env = "CATALOG_GATE_ENVIRONMENT")]
    pub environment: String,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct AttemptArgs {
    // Server-side action bucket: whatsapp or contact
    #[arg(short, long)]
    pub action: ActionType,

    // Local storage key, one quota per key
    #[arg(short, long, default_value = CONTACT_FORM_KEY)]
    pub key: String,

    #[arg(long, default_value_t = 3)]
    pub max_actions: u32,

    #[arg(long, default_value_t = 300_000)]
    pub window_ms: u64,

    // Profile directory holding persisted timestamps
    #[arg(long, default_value = ".catalog-gate", env = "CATALOG_GATE_STORAGE_DIR")]
    pub storage_dir: PathBuf,

    // Rate limit server; the local check still applies when it is down
    #[arg(short, long, default_value = "http://localhost:8080", env = "CATALOG_GATE_SERVER")]
    pub server: String,

    // Button text shown when the action is available
    #[arg(long, default_value = "Send")]
    pub label: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_defaults() {
        let args = Args::try_parse_from(["catalog-gate", "serve"]).unwrap();
        let Command::Serve(serve) = args.command else {
            panic!("expected serve");
        };
        assert_eq!(serve.port, 8080);
        assert_eq!(serve.cleanup_interval, 300);
        assert_eq!(args.log_level, "info");
    }

    #[test]
    fn zero_cleanup_interval_is_rejected() {
        assert!(Args::try_parse_from(["catalog-gate", "serve", "--cleanup-interval", "0"]).is_err());
    }

    #[test]
    fn attempt_parses_action() {
        let args =
            Args::try_parse_from(["catalog-gate", "attempt", "--action", "whatsapp", "--max-actions", "5"])
                .unwrap();
        let Command::Attempt(attempt) = args.command else {
            panic!("expected attempt");
        };
        assert_eq!(attempt.action, ActionType::Whatsapp);
        assert_eq!(attempt.key, CONTACT_FORM_KEY);
        assert_eq!(attempt.max_actions, 5);
    }

    #[test]
    fn attempt_rejects_unknown_action() {
        assert!(Args::try_parse_from(["catalog-gate", "attempt", "--action", "bogus"]).is_err());
    }
}
