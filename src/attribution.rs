use rusqlite::{CachedStatement, Connection, params};
use serde::Serialize;
use tracing::{debug, info};

use crate::config::Settings;
use crate::constants::attribution::SCHEMA;
use crate::data::Attribution;
use crate::errors::AnalyticsError;
use crate::extract::{IdentityExtractor, Resolution, RuleField};
use crate::index::load_user_index;
use crate::source::{RequestFilter, RequestSource};
use crate::transport::Database;
use crate::transport::sqlite::{
    create_table, drop_table, quote_identifier, table_exists, validate_derived_table,
};
use crate::types::{RequestId, TableName, UserId};

/// Handle to a freshly (re)built request→user table.
///
/// The insert statement is prepared when the table is ensured, so a broken
/// schema fails before any row is written. Every `record` call is its own
/// autocommit statement.
pub struct AttributionTable<'conn> {
    conn: &'conn Connection,
    name: TableName,
    insert_sql: String,
}

impl<'conn> AttributionTable<'conn> {
    /// Drop `name` if it exists and recreate it from `schema`.
    pub fn ensure_fresh_table(
        conn: &'conn Connection,
        name: &str,
        schema: &str,
    ) -> Result<Self, AnalyticsError> {
        let name = validate_derived_table(name)?;
        if table_exists(conn, &name) {
            debug!(table = %name, "dropping existing derived table");
            drop_table(conn, &name)?;
        }
        create_table(conn, &name, schema)?;
        let table = Self {
            conn,
            insert_sql: format!(
                "INSERT INTO {} (request_id, user_id) VALUES (?1, ?2)",
                quote_identifier(&name)
            ),
            name,
        };
        table.insert_statement()?;
        debug!(table = %table.name, "derived table ready");
        Ok(table)
    }

    /// Same as `ensure_fresh_table` with the built-in request→user schema.
    pub fn ensure_default_schema(
        conn: &'conn Connection,
        name: &str,
    ) -> Result<Self, AnalyticsError> {
        Self::ensure_fresh_table(conn, name, SCHEMA)
    }

    /// Validated table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Insert one attribution row through the cached insert statement.
    ///
    /// A duplicate `request_id` violates the primary key and fails with `Query`.
    pub fn record(
        &self,
        request_id: RequestId,
        user_id: UserId,
    ) -> Result<Attribution, AnalyticsError> {
        self.insert_statement()?
            .execute(params![request_id, user_id])
            .map_err(AnalyticsError::query("record attribution"))?;
        Ok(Attribution {
            request_id,
            user_id,
        })
    }

    fn insert_statement(&self) -> Result<CachedStatement<'conn>, AnalyticsError> {
        self.conn
            .prepare_cached(&self.insert_sql)
            .map_err(AnalyticsError::query("prepare attribution insert"))
    }
}

/// Counters reported by one attribution run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct AttributionSummary {
    /// Requests read from the log.
    pub scanned: u64,
    /// Candidates found by the welcome-path rule.
    pub matched_by_path: u64,
    /// Candidates found by the login cookie rule.
    pub matched_by_cookie: u64,
    /// Requests no rule matched.
    pub unmatched: u64,
    /// Candidates with no matching user.
    pub lookup_misses: u64,
    /// Rows written to the attribution table.
    pub recorded: u64,
}

/// Rebuild the request→user table from the request log.
///
/// Streams requests on their own connection while attributions are written
/// through a second one. Any storage or parse failure aborts the run.
pub fn run_attribution(
    database: &Database,
    settings: &Settings,
) -> Result<AttributionSummary, AnalyticsError> {
    run_attribution_with(database, settings, &IdentityExtractor::new()?)
}

/// `run_attribution` with a caller-supplied rule list.
pub fn run_attribution_with(
    database: &Database,
    settings: &Settings,
    extractor: &IdentityExtractor,
) -> Result<AttributionSummary, AnalyticsError> {
    let conn = database.connect_for_writes()?;
    let index = load_user_index(&conn)?;
    let table = AttributionTable::ensure_default_schema(&conn, &settings.attribution_table)?;

    let filter = RequestFilter::from_settings(settings);
    let requests =
        RequestSource::new(database.clone()).stream(&filter, settings.request_buffer_size)?;

    let mut summary = AttributionSummary::default();
    for record in requests {
        let record = record?;
        summary.scanned += 1;
        let Some(candidate) = extractor.extract(&record) else {
            summary.unmatched += 1;
            continue;
        };
        match candidate.field {
            RuleField::Path => summary.matched_by_path += 1,
            RuleField::Cookie => summary.matched_by_cookie += 1,
        }
        match extractor.resolve(&candidate, &index) {
            Resolution::Match(user_id) => {
                table.record(record.id, user_id)?;
                summary.recorded += 1;
            }
            Resolution::Miss => summary.lookup_misses += 1,
        }
    }

    info!(
        table = %table.name(),
        scanned = summary.scanned,
        matched_by_path = summary.matched_by_path,
        matched_by_cookie = summary.matched_by_cookie,
        unmatched = summary.unmatched,
        lookup_misses = summary.lookup_misses,
        recorded = summary.recorded,
        "attribution complete"
    );
    Ok(summary)
}
