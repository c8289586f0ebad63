use std::collections::{BTreeSet, HashMap};

use rusqlite::{Connection, params};
use tracing::debug;

use crate::data::UserIdentity;
use crate::errors::AnalyticsError;
use crate::types::{BadgeTitle, UserId, UserKey};

/// Lookup from login name or email to user id.
///
/// Both keys of every user map to the same id. When two users share a key
/// the one read last (highest id) wins.
#[derive(Clone, Debug, Default)]
pub struct UserIndex {
    by_key: HashMap<UserKey, UserId>,
}

impl UserIndex {
    /// Build an index from identities in the order given.
    pub fn from_identities<'a, I>(identities: I) -> Self
    where
        I: IntoIterator<Item = &'a UserIdentity>,
    {
        let mut index = Self::default();
        for identity in identities {
            index.insert(identity);
        }
        index
    }

    fn insert(&mut self, identity: &UserIdentity) {
        for key in [&identity.display_name, &identity.email] {
            if key.is_empty() {
                continue;
            }
            if let Some(previous) = self.by_key.insert(key.clone(), identity.id) {
                if previous != identity.id {
                    debug!(key = %key, previous, current = identity.id, "user key collision");
                }
            }
        }
    }

    /// User id indexed under a display name or email.
    pub fn get(&self, key: &str) -> Option<UserId> {
        self.by_key.get(key).copied()
    }

    /// Number of indexed keys.
    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    /// True when no keys are indexed.
    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

/// All users, ordered by id.
pub fn load_users(conn: &Connection) -> Result<Vec<UserIdentity>, AnalyticsError> {
    let mut stmt = conn
        .prepare("SELECT id, user_name, email FROM user ORDER BY id")
        .map_err(AnalyticsError::query("prepare user query"))?;
    let users = stmt
        .query_map([], |row| {
            Ok(UserIdentity {
                id: row.get(0)?,
                display_name: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                email: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
            })
        })
        .map_err(AnalyticsError::query("load users"))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(AnalyticsError::query("load users"))?;
    Ok(users)
}

/// Snapshot of the name/email → id lookup.
pub fn load_user_index(conn: &Connection) -> Result<UserIndex, AnalyticsError> {
    let users = load_users(conn)?;
    let index = UserIndex::from_identities(&users);
    debug!(users = users.len(), keys = index.len(), "user index loaded");
    Ok(index)
}

/// Ids of every user holding the badge titled `badge`.
pub fn load_badge_holders(
    conn: &Connection,
    badge: &str,
) -> Result<BTreeSet<UserId>, AnalyticsError> {
    let mut stmt = conn
        .prepare(
            "SELECT ub.user_id FROM user_badges ub \
             JOIN badge b ON b.id = ub.badge_id WHERE b.title = ?1",
        )
        .map_err(AnalyticsError::query("prepare badge holder query"))?;
    let holders = stmt
        .query_map(params![badge], |row| row.get::<_, UserId>(0))
        .map_err(AnalyticsError::query("load badge holders"))?
        .collect::<Result<BTreeSet<_>, _>>()
        .map_err(AnalyticsError::query("load badge holders"))?;
    Ok(holders)
}

/// Badge titles held by one user.
pub fn load_user_badges(
    conn: &Connection,
    user_id: UserId,
) -> Result<BTreeSet<BadgeTitle>, AnalyticsError> {
    let mut stmt = conn
        .prepare(
            "SELECT b.title FROM user_badges ub \
             JOIN badge b ON b.id = ub.badge_id WHERE ub.user_id = ?1",
        )
        .map_err(AnalyticsError::query("prepare user badge query"))?;
    let titles = stmt
        .query_map(params![user_id], |row| row.get::<_, BadgeTitle>(0))
        .map_err(AnalyticsError::query("load user badges"))?
        .collect::<Result<BTreeSet<_>, _>>()
        .map_err(AnalyticsError::query("load user badges"))?;
    Ok(titles)
}

/// Badge titles of every user holding at least one badge.
pub fn load_all_user_badges(
    conn: &Connection,
) -> Result<HashMap<UserId, BTreeSet<BadgeTitle>>, AnalyticsError> {
    let mut stmt = conn
        .prepare(
            "SELECT ub.user_id, b.title FROM user_badges ub \
             JOIN badge b ON b.id = ub.badge_id",
        )
        .map_err(AnalyticsError::query("prepare badge membership query"))?;
    let mut rows = stmt
        .query([])
        .map_err(AnalyticsError::query("load badge memberships"))?;
    let mut memberships: HashMap<UserId, BTreeSet<BadgeTitle>> = HashMap::new();
    while let Some(row) = rows
        .next()
        .map_err(AnalyticsError::query("load badge memberships"))?
    {
        let user_id: UserId = row
            .get(0)
            .map_err(AnalyticsError::query("load badge memberships"))?;
        let title: BadgeTitle = row
            .get(1)
            .map_err(AnalyticsError::query("load badge memberships"))?;
        memberships.entry(user_id).or_default().insert(title);
    }
    Ok(memberships)
}
