#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

/// Per-user activity aggregation and tier classification.
pub mod activity;
/// CLI entry points shared by the binary and tests.
pub mod apps;
/// Derived request→user table lifecycle and the attribution run.
pub mod attribution;
/// Settings file, date ranges, and phases.
pub mod config;
/// Centralized constants used across sources, extraction, and storage.
pub mod constants;
/// Request, identity, attribution, and activity record types.
pub mod data;
/// User-name extraction rules applied to requests.
pub mod extract;
/// User identity and badge membership lookups.
pub mod index;
/// Counters and tier distributions.
pub mod metrics;
/// Report rows composed from aggregation and badge lookups.
pub mod report;
/// Request log streaming and the bounded row stream.
pub mod source;
/// Storage transports (SQLite).
pub mod transport;
/// Shared type aliases.
pub mod types;
/// CSV and text rendering helpers.
pub mod utils;

mod errors;

pub use activity::{ActivityAggregator, classify_tier};
pub use attribution::{AttributionSummary, AttributionTable, run_attribution};
pub use config::{DateRange, Phase, Settings};
pub use data::{Attribution, RequestRecord, Tier, UserActivity, UserIdentity};
pub use errors::AnalyticsError;
pub use extract::{Candidate, ExtractionRule, IdentityExtractor, Resolution, RuleField};
pub use index::UserIndex;
pub use metrics::{Counter, TierDistribution};
pub use source::{RequestFilter, RequestSource, RowStream, StreamStats};
pub use transport::Database;
pub use types::{BadgeTitle, EpochSeconds, RequestId, TableName, UserId, UserKey};
