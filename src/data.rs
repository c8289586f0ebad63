use std::fmt;

use serde::{Deserialize, Serialize};

pub use crate::types::{BadgeTitle, EpochSeconds, RequestId, UserId};

/// One logged HTTP access, normalized.
///
/// String fields never carry a null marker: absent columns are replaced by
/// `(none)` or `(unspecified)` when the row is read.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestRecord {
    /// Stable row identifier in the request log.
    pub id: RequestId,
    /// Access time in epoch seconds (UTC).
    pub access_time: EpochSeconds,
    /// Client address, or `(unspecified)`.
    pub source_address: String,
    /// Path plus optional query string, or `(none)`.
    pub request_path: String,
    /// Raw `Cookie` header, or `(none)`.
    pub cookie_header: String,
    /// Raw `User-Agent` header, or `(unspecified)`.
    pub user_agent: String,
    /// Raw `Referer` header, or `(none)`.
    pub referer: String,
}

/// A registered platform user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    /// Primary key of the user row.
    pub id: UserId,
    /// Login name (`user.user_name`).
    pub display_name: String,
    /// Email address, empty when unset.
    pub email: String,
}

/// A request inferred to have been issued by a user.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Attribution {
    /// Request log row id.
    pub request_id: RequestId,
    /// User the request was attributed to.
    pub user_id: UserId,
}

/// Per-user activity counts over one date range.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserActivity {
    /// The user these counts belong to.
    pub user: UserIdentity,
    /// Comments not deleted.
    pub comment_count: u64,
    /// Proposals not deleted.
    pub proposal_count: u64,
    /// Votes cast.
    pub vote_count: u64,
    /// Attributed requests.
    pub request_count: u64,
}

impl UserActivity {
    /// Activity record with every count at zero.
    pub fn idle(user: UserIdentity) -> Self {
        Self {
            user,
            comment_count: 0,
            proposal_count: 0,
            vote_count: 0,
            request_count: 0,
        }
    }
}

/// Participation tier, ordered from most to least engaged.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Wrote at least one comment or proposal.
    Intensive,
    /// Voted but wrote nothing.
    Light,
    /// Only visited the platform.
    Visited,
    /// No recorded activity.
    None,
}

impl Tier {
    /// All tiers in priority order.
    pub const ALL: [Tier; 4] = [Tier::Intensive, Tier::Light, Tier::Visited, Tier::None];

    /// Lowercase label used in reports.
    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Intensive => "intensive",
            Tier::Light => "light",
            Tier::Visited => "visited",
            Tier::None => "none",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
