use rusqlite::{Row, params};
use tracing::{debug, warn};

use crate::config::{DateRange, Settings};
use crate::constants::activity::PROPOSAL_TYPE;
use crate::constants::requests::REQUEST_LOG_TABLE;
use crate::data::{Tier, UserActivity, UserIdentity};
use crate::errors::AnalyticsError;
use crate::source::RowStream;
use crate::transport::Database;
use crate::transport::sqlite::{quote_identifier, table_exists, validate_derived_table};
use crate::types::TableName;

/// Per-user activity counts over a date range.
///
/// Every known user is reported, ordered by id. Each count is computed in its
/// own grouped subquery and left-joined onto `user`, so a user without rows in
/// a source gets zero for that source instead of dropping out.
#[derive(Clone, Debug)]
pub struct ActivityAggregator {
    database: Database,
    attribution_table: TableName,
    capacity: usize,
}

impl ActivityAggregator {
    /// Aggregator over the attribution table and buffer size from `settings`.
    /// Aggregator over `settings.attribution_table`, validated against the allow-list.
    pub fn new(database: Database, settings: &Settings) -> Result<Self, AnalyticsError> {
        Ok(Self {
            database,
            attribution_table: validate_derived_table(&settings.attribution_table)?,
            capacity: settings.request_buffer_size,
        })
    }

    /// Override the stream buffer size taken from the settings.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Stream one `UserActivity` per user for `range`.
    ///
    /// When the attribution table has not been built yet, request counts are
    /// zero and a warning is logged.
    pub fn aggregate(&self, range: &DateRange) -> Result<RowStream<UserActivity>, AnalyticsError> {
        let conn = self.database.connect()?;
        let requests_source = if table_exists(&conn, &self.attribution_table) {
            format!(
                "SELECT a.user_id AS user_id, COUNT(*) AS n \
                 FROM {attributions} a JOIN {REQUEST_LOG_TABLE} r ON r.id = a.request_id \
                 WHERE r.access_time >= ?1 AND r.access_time {op} ?2 \
                 GROUP BY a.user_id",
                attributions = quote_identifier(&self.attribution_table),
                op = range.end_operator(),
            )
        } else {
            warn!(
                table = %self.attribution_table,
                "attribution table missing; request counts will be zero"
            );
            "SELECT NULL AS user_id, 0 AS n WHERE 0".to_string()
        };
        let sql = aggregate_sql(range.end_operator(), &requests_source);
        let (start, end) = (range.start_sql(), range.end_sql());
        debug!(start = %start, end = %end, op = range.end_operator(), "aggregating user activity");

        Ok(RowStream::spawn(self.capacity, move |sink| {
            let mut stmt = conn
                .prepare(&sql)
                .map_err(AnalyticsError::query("prepare activity aggregation"))?;
            let mut rows = stmt
                .query(params![start, end, PROPOSAL_TYPE])
                .map_err(AnalyticsError::query("run activity aggregation"))?;
            while let Some(row) = rows
                .next()
                .map_err(AnalyticsError::query("fetch activity row"))?
            {
                let activity = activity_from_row(row)
                    .map_err(AnalyticsError::query("decode activity row"))?;
                if !sink.push(activity) {
                    break;
                }
            }
            Ok(())
        }))
    }
}

fn aggregate_sql(op: &str, requests_source: &str) -> String {
    format!(
        "SELECT u.id, u.user_name, u.email, \
                COALESCE(c.n, 0), COALESCE(p.n, 0), COALESCE(v.n, 0), COALESCE(q.n, 0) \
         FROM user u \
         LEFT JOIN (SELECT creator_id AS user_id, COUNT(*) AS n FROM comment \
                    WHERE delete_time IS NULL AND create_time >= ?1 AND create_time {op} ?2 \
                    GROUP BY creator_id) c ON c.user_id = u.id \
         LEFT JOIN (SELECT creator_id AS user_id, COUNT(*) AS n FROM delegateable \
                    WHERE type = ?3 AND delete_time IS NULL \
                      AND create_time >= ?1 AND create_time {op} ?2 \
                    GROUP BY creator_id) p ON p.user_id = u.id \
         LEFT JOIN (SELECT user_id, COUNT(*) AS n FROM vote \
                    WHERE create_time >= ?1 AND create_time {op} ?2 \
                    GROUP BY user_id) v ON v.user_id = u.id \
         LEFT JOIN ({requests_source}) q ON q.user_id = u.id \
         ORDER BY u.id"
    )
}

fn activity_from_row(row: &Row<'_>) -> rusqlite::Result<UserActivity> {
    let count = |idx: usize| -> rusqlite::Result<u64> {
        Ok(u64::try_from(row.get::<_, i64>(idx)?).unwrap_or(0))
    };
    Ok(UserActivity {
        user: UserIdentity {
            id: row.get(0)?,
            display_name: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
            email: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
        },
        comment_count: count(3)?,
        proposal_count: count(4)?,
        vote_count: count(5)?,
        request_count: count(6)?,
    })
}

/// Participation tier of one user; the first matching rule wins.
pub fn classify_tier(activity: &UserActivity) -> Tier {
    if activity.proposal_count > 0 || activity.comment_count > 0 {
        Tier::Intensive
    } else if activity.vote_count > 0 {
        Tier::Light
    } else if activity.request_count > 0 {
        Tier::Visited
    } else {
        Tier::None
    }
}
