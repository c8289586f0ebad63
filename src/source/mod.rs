//! Request log source and the bounded streaming it is built on.
//!
//! Ownership model:
//! - `RequestSource` owns only the storage handle and opens a fresh
//!   connection per `stream` call; re-invoking issues a new query.
//! - The producer thread owns that connection, the prepared statement, and
//!   the row cursor until the stream is exhausted or dropped.

use chrono::NaiveDateTime;
use rusqlite::types::Value;
use rusqlite::{Row, params_from_iter};
use tracing::debug;

use crate::config::{DateRange, Settings};
use crate::constants::requests::{
    DEFAULT_USER_AGENT_DENYLIST, NONE_SENTINEL, REQUEST_LOG_TABLE, TIMESTAMP_PARSE_FORMAT,
    UNSPECIFIED_SENTINEL,
};
use crate::data::RequestRecord;
use crate::errors::AnalyticsError;
use crate::transport::Database;
use crate::types::{EpochSeconds, RequestId};

/// Bounded single-producer/single-consumer row streaming.
pub mod stream;

pub use stream::{RowSink, RowStream, StreamStats};

/// Predicate applied to every request log query.
///
/// All values are bound as statement parameters. The user-agent deny-list
/// always applies; it starts from the built-in synthetic traffic list.
#[derive(Clone, Debug)]
pub struct RequestFilter {
    /// Only requests whose access time falls in this range.
    pub time_range: Option<DateRange>,
    /// Only requests whose path starts with this prefix.
    pub path_prefix: Option<String>,
    /// User-agent substrings to exclude (ASCII case-insensitive).
    pub user_agent_denylist: Vec<String>,
}

impl Default for RequestFilter {
    fn default() -> Self {
        Self {
            time_range: None,
            path_prefix: None,
            user_agent_denylist: DEFAULT_USER_AGENT_DENYLIST
                .iter()
                .map(|entry| (*entry).to_string())
                .collect(),
        }
    }
}

impl RequestFilter {
    /// Filter over the settings' default range plus any configured deny-list entries.
    pub fn from_settings(settings: &Settings) -> Self {
        Self::default()
            .with_time_range(settings.date_range())
            .with_extra_denylist(settings.user_agent_denylist.iter().cloned())
    }

    /// Restrict to requests inside `range`.
    pub fn with_time_range(mut self, range: DateRange) -> Self {
        self.time_range = Some(range);
        self
    }

    /// Restrict to request paths starting with `prefix` (matched literally).
    pub fn with_path_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.path_prefix = Some(prefix.into());
        self
    }

    /// Append deny-list entries, skipping empty and duplicate ones.
    pub fn with_extra_denylist<I>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        for entry in entries {
            if !entry.is_empty() && !self.user_agent_denylist.contains(&entry) {
                self.user_agent_denylist.push(entry);
            }
        }
        self
    }

    /// Render the `WHERE` clause and its bound parameters.
    pub fn to_sql(&self) -> (String, Vec<Value>) {
        let mut clauses = Vec::new();
        let mut params = Vec::new();
        if !self.user_agent_denylist.is_empty() {
            let excluded = self
                .user_agent_denylist
                .iter()
                .map(|entry| {
                    params.push(Value::Text(format!("%{}%", escape_like(entry))));
                    "user_agent NOT LIKE ? ESCAPE '\\'"
                })
                .collect::<Vec<_>>()
                .join(" AND ");
            clauses.push(format!("(user_agent IS NULL OR ({excluded}))"));
        }
        if let Some(range) = &self.time_range {
            clauses.push(format!("access_time >= ? AND access_time {} ?", range.end_operator()));
            params.push(Value::Text(range.start_sql()));
            params.push(Value::Text(range.end_sql()));
        }
        if let Some(prefix) = &self.path_prefix {
            clauses.push("request_url LIKE ? ESCAPE '\\'".to_string());
            params.push(Value::Text(format!("{}%", escape_like(prefix))));
        }
        let clause = if clauses.is_empty() {
            "1 = 1".to_string()
        } else {
            clauses.join(" AND ")
        };
        (clause, params)
    }
}

fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// Streams normalized request records out of the request log.
#[derive(Clone, Debug)]
pub struct RequestSource {
    database: Database,
}

impl RequestSource {
    /// Source reading the request log of `database`.
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    /// Issue a filtered query and stream its rows through a bounded queue.
    ///
    /// The connection is opened before the producer starts, so an unreachable
    /// database fails here rather than as a stream item.
    pub fn stream(
        &self,
        filter: &RequestFilter,
        buffer_size: usize,
    ) -> Result<RowStream<RequestRecord>, AnalyticsError> {
        let conn = self.database.connect()?;
        let (clause, params) = filter.to_sql();
        let sql = format!(
            "SELECT id, access_time, ip_address, request_url, cookies, user_agent, referer \
             FROM {REQUEST_LOG_TABLE} WHERE {clause} ORDER BY id"
        );
        debug!(sql = %sql, buffer_size, "streaming request log");
        Ok(RowStream::spawn(buffer_size, move |sink| {
            let mut stmt = conn
                .prepare(&sql)
                .map_err(AnalyticsError::query("prepare request query"))?;
            let mut rows = stmt
                .query(params_from_iter(params))
                .map_err(AnalyticsError::query("run request query"))?;
            while let Some(row) = rows
                .next()
                .map_err(AnalyticsError::query("fetch request row"))?
            {
                let record = request_from_row(row)?;
                if !sink.push(record) {
                    debug!("request stream consumer went away; stopping producer");
                    break;
                }
            }
            Ok(())
        }))
    }
}

fn request_from_row(row: &Row<'_>) -> Result<RequestRecord, AnalyticsError> {
    let column = AnalyticsError::query("decode request row");
    let id: RequestId = row.get(0).map_err(column)?;
    let raw_time: Option<String> = row.get(1).map_err(column)?;
    let text = |idx: usize, sentinel: &str| -> Result<String, AnalyticsError> {
        let value: Option<String> = row.get(idx).map_err(column)?;
        Ok(value.unwrap_or_else(|| sentinel.to_string()))
    };
    Ok(RequestRecord {
        id,
        access_time: parse_access_time(id, raw_time.as_deref())?,
        source_address: text(2, UNSPECIFIED_SENTINEL)?,
        request_path: text(3, NONE_SENTINEL)?,
        cookie_header: text(4, NONE_SENTINEL)?,
        user_agent: text(5, UNSPECIFIED_SENTINEL)?,
        referer: text(6, NONE_SENTINEL)?,
    })
}

/// Parse a textual access time (UTC) into epoch seconds.
pub fn parse_access_time(
    request_id: RequestId,
    raw: Option<&str>,
) -> Result<EpochSeconds, AnalyticsError> {
    let malformed = || AnalyticsError::Parse {
        request_id,
        field: "access_time",
        value: raw.unwrap_or("NULL").to_string(),
    };
    let raw = raw.ok_or_else(malformed)?;
    NaiveDateTime::parse_from_str(raw.trim(), TIMESTAMP_PARSE_FORMAT)
        .map(|time| time.and_utc().timestamp())
        .map_err(|_| malformed())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn default_filter_excludes_every_denylisted_agent() {
        let (clause, params) = RequestFilter::default().to_sql();
        assert_eq!(params.len(), DEFAULT_USER_AGENT_DENYLIST.len());
        assert_eq!(
            clause.matches("NOT LIKE").count(),
            DEFAULT_USER_AGENT_DENYLIST.len()
        );
        assert!(clause.starts_with("(user_agent IS NULL OR"));
        assert_eq!(params[0], Value::Text("%GoogleBot%".into()));
    }

    #[test]
    fn range_and_prefix_bind_parameters_in_clause_order() {
        let range = DateRange::from_dates(
            NaiveDate::from_ymd_opt(2014, 5, 1).unwrap(),
            NaiveDate::from_ymd_opt(2014, 6, 1).unwrap(),
            true,
        );
        let filter = RequestFilter {
            user_agent_denylist: Vec::new(),
            ..RequestFilter::default()
        }
        .with_time_range(range)
        .with_path_prefix("/static/nb_");
        let (clause, params) = filter.to_sql();
        assert_eq!(
            clause,
            "access_time >= ? AND access_time <= ? AND request_url LIKE ? ESCAPE '\\'"
        );
        assert_eq!(
            params,
            vec![
                Value::Text("2014-05-01 00:00:00".into()),
                Value::Text("2014-06-01 00:00:00".into()),
                Value::Text("/static/nb\\_%".into()),
            ]
        );
    }

    #[test]
    fn extra_denylist_entries_are_deduplicated() {
        let filter = RequestFilter::default()
            .with_extra_denylist(vec!["Pingdom".to_string(), "curl".to_string(), String::new()]);
        assert_eq!(
            filter.user_agent_denylist.len(),
            DEFAULT_USER_AGENT_DENYLIST.len() + 1
        );
    }

    #[test]
    fn parses_access_time_as_utc_epoch_seconds() {
        assert_eq!(parse_access_time(1, Some("2014-05-01 10:00:00")).unwrap(), 1_398_938_400);
        assert_eq!(parse_access_time(1, Some("1970-01-01 00:00:01.250")).unwrap(), 1);
        assert!(matches!(
            parse_access_time(7, Some("01/May/2014:10:00:00 +0200")),
            Err(AnalyticsError::Parse { request_id: 7, .. })
        ));
        assert!(matches!(
            parse_access_time(8, None),
            Err(AnalyticsError::Parse { request_id: 8, .. })
        ));
    }
}
