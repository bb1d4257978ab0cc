use clap::{Parser, ValueEnum};
use log::LevelFilter;

use crate::graphql::model::review::ReviewStatus;

/// Document store backend.
#[derive(ValueEnum, Debug, Copy, Clone, PartialEq, Eq)]
pub enum StoreKind {
    /// MongoDB replica set, required for multi-document transactions.
    Mongo,
    /// Process memory, data is lost on shutdown.
    Memory,
}

/// Command line arguments, each option can also be set through its environment variable.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Generates GraphQL schema in `./schemas/review.graphql`.
    #[arg(long)]
    pub generate_schema: bool,

    /// Document store backend.
    #[arg(long, env = "REVIEW_STORE", value_enum, default_value_t = StoreKind::Mongo)]
    pub store: StoreKind,

    /// Connection string of the MongoDB deployment, required for the `mongo` store.
    #[arg(long, env = "MONGODB_URI")]
    pub mongodb_uri: Option<String>,

    /// Name of the MongoDB database.
    #[arg(long, env = "REVIEW_DATABASE", default_value = "review-database")]
    pub database: String,

    /// Port of the HTTP server.
    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Status of newly submitted reviews, `hidden` holds them back for moderation.
    #[arg(long, env = "DEFAULT_REVIEW_STATUS", default_value = "visible")]
    pub default_review_status: ReviewStatus,

    /// Attempts of an atomic scope before a transaction conflict is surfaced.
    #[arg(
        long,
        env = "MAX_TRANSACTION_ATTEMPTS",
        default_value_t = 3,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub max_transaction_attempts: u32,

    /// Log level filter.
    #[arg(long, env = "LOG_LEVEL", default_value_t = LevelFilter::Info)]
    pub log_level: LevelFilter,
}

impl Args {
    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            initial_status: self.default_review_status,
            max_transaction_attempts: self.max_transaction_attempts,
        }
    }
}

/// Policy knobs of the rating aggregation service.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Status new reviews are created with.
    pub initial_status: ReviewStatus,
    /// Upper bound on attempts of one atomic scope.
    pub max_transaction_attempts: u32,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            initial_status: ReviewStatus::Visible,
            max_transaction_attempts: 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_needs_no_uri() {
        let args = Args::try_parse_from(["review", "--store", "memory"]).unwrap();
        assert_eq!(args.store, StoreKind::Memory);
        assert_eq!(args.service_config(), ServiceConfig::default());
    }

    #[test]
    fn parses_moderation_policy() {
        let args = Args::try_parse_from([
            "review",
            "--store",
            "memory",
            "--default-review-status",
            "hidden",
            "--max-transaction-attempts",
            "5",
        ])
        .unwrap();
        assert_eq!(
            args.service_config(),
            ServiceConfig {
                initial_status: ReviewStatus::Hidden,
                max_transaction_attempts: 5,
            }
        );
    }

    #[test]
    fn rejects_zero_attempts() {
        assert!(
            Args::try_parse_from([
                "review",
                "--store",
                "memory",
                "--max-transaction-attempts",
                "0"
            ])
            .is_err()
        );
    }
}
