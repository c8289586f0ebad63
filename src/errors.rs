use std::io;

use thiserror::Error;

use crate::types::RequestId;

/// Error type for storage, parsing, configuration, and output failures.
///
/// Every variant is fatal to the run that produced it. Lookup misses and
/// unmatched requests are ordinary outcomes and never appear here.
#[derive(Debug, Error)]
pub enum AnalyticsError {
    /// The database could not be opened, pinged, or configured.
    #[error("cannot reach storage '{descriptor}': {reason}")]
    Connection {
        /// Descriptor the connection was opened from.
        descriptor: String,
        /// Driver message or refusal reason.
        reason: String,
    },
    /// A statement failed.
    #[error("query failed during {stage}: {source}")]
    Query {
        /// Pipeline step that issued the statement.
        stage: &'static str,
        /// Driver error.
        #[source]
        source: rusqlite::Error,
    },
    /// A request column could not be interpreted.
    #[error("request {request_id}: cannot parse {field} '{value}'")]
    Parse {
        /// Request log row id.
        request_id: RequestId,
        /// Column name.
        field: &'static str,
        /// Raw column text.
        value: String,
    },
    /// A derived table name failed the allow-list.
    #[error("table name '{0}' is not allowed")]
    InvalidIdentifier(String),
    /// Settings or extraction rules are unusable.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// A stream's producer thread panicked.
    #[error("stream producer stopped: {0}")]
    StreamAborted(String),
    /// Reading settings or writing output failed.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl AnalyticsError {
    /// Wrap a driver error with the pipeline stage it happened in.
    pub fn query(stage: &'static str) -> impl Fn(rusqlite::Error) -> Self + Copy {
        move |source| Self::Query { stage, source }
    }
}
