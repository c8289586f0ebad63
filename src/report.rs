//! Read-path report rows built on the activity aggregator and the index.
//!
//! Every function returns typed rows; rendering is left to the CLI.

use std::collections::BTreeSet;

use rusqlite::Connection;
use serde::Serialize;
use tracing::debug;

use crate::activity::{ActivityAggregator, classify_tier};
use crate::config::{DateRange, Settings};
use crate::data::Tier;
use crate::errors::AnalyticsError;
use crate::index::{load_all_user_badges, load_badge_holders};
use crate::metrics::{Counter, TierDistribution};
use crate::source::{RequestFilter, RequestSource};
use crate::types::{BadgeTitle, UserId};

/// One user's tier alongside whether they hold a given badge.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ClassificationRow {
    /// User id, used to look up further memberships.
    pub user_id: UserId,
    /// Display name.
    pub name: String,
    /// Email address.
    pub email: String,
    /// Whether the user holds the requested badge.
    pub has_badge: bool,
    /// Participation tier over the range.
    pub tier: Tier,
}

/// Tier distribution for every user plus one per requested badge.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ParticipationStats {
    /// Distribution over every user.
    pub all: TierDistribution,
    /// Distribution over each badge's holders, in request order.
    pub by_badge: Vec<(BadgeTitle, TierDistribution)>,
}

/// One user's tier within one phase, with a label per badge group.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PhaseActivityRow {
    /// Phase name.
    pub phase: String,
    /// User id.
    pub user_id: UserId,
    /// Display name.
    pub name: String,
    /// Email address.
    pub email: String,
    /// Participation tier within the phase.
    pub tier: Tier,
    /// First badge of each group held by the user, or an empty string.
    pub groups: Vec<String>,
}

/// Tier of every user over `range`, flagged by membership in `badge`.
///
/// An unknown badge flags nobody.
pub fn classify_with_badge(
    aggregator: &ActivityAggregator,
    conn: &Connection,
    range: &DateRange,
    badge: &str,
) -> Result<Vec<ClassificationRow>, AnalyticsError> {
    let holders = load_badge_holders(conn, badge)?;
    aggregator
        .aggregate(range)?
        .map(|activity| -> Result<ClassificationRow, AnalyticsError> {
            let activity = activity?;
            Ok(ClassificationRow {
                has_badge: holders.contains(&activity.user.id),
                tier: classify_tier(&activity),
                user_id: activity.user.id,
                name: activity.user.display_name,
                email: activity.user.email,
            })
        })
        .collect()
}

/// Tier distribution over all users and over the holders of each badge.
pub fn participation_stats(
    aggregator: &ActivityAggregator,
    conn: &Connection,
    range: &DateRange,
    badges: &[BadgeTitle],
) -> Result<ParticipationStats, AnalyticsError> {
    let holders = badges
        .iter()
        .map(|badge| load_badge_holders(conn, badge))
        .collect::<Result<Vec<_>, _>>()?;
    let mut stats = ParticipationStats {
        all: TierDistribution::default(),
        by_badge: badges
            .iter()
            .map(|badge| (badge.clone(), TierDistribution::default()))
            .collect(),
    };
    for activity in aggregator.aggregate(range)? {
        let activity = activity?;
        let tier = classify_tier(&activity);
        stats.all.add(tier);
        for (members, (_, distribution)) in holders.iter().zip(stats.by_badge.iter_mut()) {
            if members.contains(&activity.user.id) {
                distribution.add(tier);
            }
        }
    }
    debug!(users = stats.all.total(), badges = badges.len(), "participation stats computed");
    Ok(stats)
}

/// Activity rows for every configured phase, in phase order then user order.
pub fn phase_activity(
    aggregator: &ActivityAggregator,
    conn: &Connection,
    settings: &Settings,
    badge_groups: &[Vec<BadgeTitle>],
) -> Result<Vec<PhaseActivityRow>, AnalyticsError> {
    let memberships = load_all_user_badges(conn)?;
    let no_badges = BTreeSet::new();
    let mut rows = Vec::new();
    for phase in &settings.phases {
        let range = settings.phase_range(phase);
        for activity in aggregator.aggregate(&range)? {
            let activity = activity?;
            let held = memberships.get(&activity.user.id).unwrap_or(&no_badges);
            rows.push(PhaseActivityRow {
                phase: phase.name.clone(),
                tier: classify_tier(&activity),
                groups: badge_groups
                    .iter()
                    .map(|group| status_group(held, group, ""))
                    .collect(),
                user_id: activity.user.id,
                name: activity.user.display_name,
                email: activity.user.email,
            });
        }
    }
    Ok(rows)
}

/// First badge of `preferred` that is held, otherwise `fallback`.
pub fn status_group(
    held: &BTreeSet<BadgeTitle>,
    preferred: &[BadgeTitle],
    fallback: &str,
) -> String {
    preferred
        .iter()
        .find(|badge| held.contains(*badge))
        .cloned()
        .unwrap_or_else(|| fallback.to_string())
}

/// Browser family of a user-agent string; unknown agents are returned as-is.
pub fn summarize_user_agent(user_agent: &str) -> &str {
    const FAMILIES: &[(&[&str], &str)] = &[
        (&["Android"], "Android"),
        (&["iPhone"], "iPhone"),
        (&["iPad"], "iPad"),
        (&["Opera/"], "Opera"),
        (&["Firefox/", "Iceweasel/"], "Firefox"),
        (&["Chromium/", "Chrome/"], "Chrome"),
        (&["MSIE "], "IE"),
        (&["Konqueror/"], "Konqueror"),
        (&["Safari/"], "Safari"),
    ];
    for (markers, family) in FAMILIES {
        if markers.iter().any(|marker| user_agent.contains(marker)) {
            return *family;
        }
    }
    if user_agent.starts_with("Java/") {
        return "java";
    }
    user_agent
}

/// Count user agents (or their families) over the filtered request stream.
pub fn user_agent_counts(
    source: &RequestSource,
    filter: &RequestFilter,
    buffer_size: usize,
    summarize: bool,
) -> Result<Counter<String>, AnalyticsError> {
    let mut counter = Counter::new();
    for record in source.stream(filter, buffer_size)? {
        let record = record?;
        let key = if summarize {
            summarize_user_agent(&record.user_agent).to_string()
        } else {
            record.user_agent
        };
        counter.count(key);
    }
    Ok(counter)
}
