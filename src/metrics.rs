use std::hash::Hash;

use indexmap::IndexMap;
use serde::Serialize;

use crate::data::Tier;

/// Occurrence counts keyed in first-seen order.
#[derive(Clone, Debug)]
pub struct Counter<K: Hash + Eq> {
    counts: IndexMap<K, u64>,
}

impl<K: Hash + Eq> Default for Counter<K> {
    fn default() -> Self {
        Self {
            counts: IndexMap::new(),
        }
    }
}

impl<K: Hash + Eq> Counter<K> {
    /// Empty counter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one occurrence of `key`.
    pub fn count(&mut self, key: K) {
        *self.counts.entry(key).or_insert(0) += 1;
    }

    /// Occurrences of `key`, 0 when never counted.
    pub fn get(&self, key: &K) -> u64 {
        self.counts.get(key).copied().unwrap_or(0)
    }

    /// Total occurrences across all keys.
    pub fn sum(&self) -> u64 {
        self.counts.values().sum()
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// True when nothing was counted.
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Keys by descending count; ties keep first-seen order.
    pub fn most_common(&self) -> Vec<(&K, u64)> {
        let mut entries: Vec<(&K, u64)> = self.counts.iter().map(|(key, n)| (key, *n)).collect();
        // Stable sort keeps insertion order among equal counts.
        entries.sort_by(|a, b| b.1.cmp(&a.1));
        entries
    }
}

impl<K: Hash + Eq> FromIterator<K> for Counter<K> {
    fn from_iter<I: IntoIterator<Item = K>>(iter: I) -> Self {
        let mut counter = Self::new();
        for key in iter {
            counter.count(key);
        }
        counter
    }
}

/// Users per tier with integer percentage shares.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TierDistribution {
    /// Users in [`Tier::Intensive`].
    pub intensive: u64,
    /// Users in [`Tier::Light`].
    pub light: u64,
    /// Users in [`Tier::Visited`].
    pub visited: u64,
    /// Users in [`Tier::None`].
    pub none: u64,
}

impl TierDistribution {
    /// Tally an iterator of tiers.
    pub fn from_tiers<I: IntoIterator<Item = Tier>>(tiers: I) -> Self {
        let mut distribution = Self::default();
        for tier in tiers {
            distribution.add(tier);
        }
        distribution
    }

    /// Count one more user in `tier`.
    pub fn add(&mut self, tier: Tier) {
        *self.slot(tier) += 1;
    }

    /// Users counted in `tier`.
    pub fn get(&self, tier: Tier) -> u64 {
        match tier {
            Tier::Intensive => self.intensive,
            Tier::Light => self.light,
            Tier::Visited => self.visited,
            Tier::None => self.none,
        }
    }

    /// Users across all tiers.
    pub fn total(&self) -> u64 {
        Tier::ALL.iter().map(|tier| self.get(*tier)).sum()
    }

    /// Share of `tier` in whole percent (truncated); 0 for an empty distribution.
    pub fn percent(&self, tier: Tier) -> u64 {
        let total = self.total();
        if total == 0 {
            0
        } else {
            self.get(tier) * 100 / total
        }
    }

    fn slot(&mut self, tier: Tier) -> &mut u64 {
        match tier {
            Tier::Intensive => &mut self.intensive,
            Tier::Light => &mut self.light,
            Tier::Visited => &mut self.visited,
            Tier::None => &mut self.none,
        }
    }
}
