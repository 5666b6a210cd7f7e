use std::collections::{BTreeMap, VecDeque};

use rand::Rng;
use rand::seq::IndexedRandom;

use crate::shader::metadata::TransitionRecord;

/// Priority-tiered cycling over transition programs.
///
/// Transitions are grouped by score (2 best, 5 worst usable) and groups are visited best
/// first. A group is skipped once all its members share the same non-zero usage count,
/// which moves selection to the next tier instead of looping in one tier forever.
#[derive(Clone, Debug)]
pub struct TransitionCycler {
    /// Score -> member names, ascending score.
    groups: BTreeMap<u8, Vec<String>>,
    usage: BTreeMap<String, u32>,
    history: VecDeque<String>,
    max_history: usize,
}

impl TransitionCycler {
    /// `available` are the transition names that compiled. Names without a metadata record
    /// score as excluded.
    pub fn new(
        available: &[String],
        records: &BTreeMap<String, TransitionRecord>,
        history_size: usize,
    ) -> Self {
        let mut groups: BTreeMap<u8, Vec<String>> = BTreeMap::new();
        for name in available {
            match records.get(name) {
                Some(rec) if !rec.is_excluded() => {
                    groups.entry(rec.score()).or_default().push(name.clone());
                }
                Some(_) => tracing::debug!(transition = %name, "excluded by score"),
                None => tracing::debug!(transition = %name, "no metadata, excluded"),
            }
        }
        for members in groups.values_mut() {
            members.sort();
        }
        Self {
            groups,
            usage: available.iter().map(|n| (n.clone(), 0)).collect(),
            history: VecDeque::new(),
            max_history: history_size.min(available.len().saturating_sub(1)),
        }
    }

    /// `(score, member count)` per usable group.
    pub fn score_summary(&self) -> Vec<(u8, usize)> {
        self.groups.iter().map(|(s, m)| (*s, m.len())).collect()
    }

    pub fn max_history(&self) -> usize {
        self.max_history
    }

    /// `true` when no transition can ever be chosen.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    fn usage_of(&self, name: &str) -> u32 {
        self.usage.get(name).copied().unwrap_or(0)
    }

    fn is_exhausted(&self, members: &[String]) -> bool {
        let min = members.iter().map(|m| self.usage_of(m)).min();
        let max = members.iter().map(|m| self.usage_of(m)).max();
        match (min, max) {
            (Some(min), Some(max)) => min == max && min > 0,
            _ => true,
        }
    }

    /// Pick the next transition without recording it. `None` means no usable transition.
    pub fn select(&self, rng: &mut impl Rng) -> Option<String> {
        for (score, members) in &self.groups {
            if self.is_exhausted(members) {
                continue;
            }
            let fresh: Vec<&String> = members
                .iter()
                .filter(|m| !self.history.contains(*m))
                .collect();
            let filtered: Vec<&String> = if fresh.is_empty() {
                members.iter().collect()
            } else {
                fresh
            };
            let min_usage = members
                .iter()
                .map(|m| self.usage_of(m))
                .min()
                .unwrap_or(0);
            let least_used: Vec<&String> = filtered
                .into_iter()
                .filter(|m| self.usage_of(m) == min_usage)
                .collect();
            if let Some(pick) = least_used.choose(rng) {
                tracing::debug!(transition = %pick, score, usage = min_usage, "selected transition");
                return Some((*pick).clone());
            }
        }
        let all: Vec<&String> = self.groups.values().flatten().collect();
        all.choose(rng).map(|s| (*s).clone())
    }

    /// Pick and record the next transition.
    pub fn next(&mut self, rng: &mut impl Rng) -> Option<String> {
        let pick = self.select(rng)?;
        self.record(&pick);
        Some(pick)
    }

    pub fn record(&mut self, name: &str) {
        *self.usage.entry(name.to_string()).or_insert(0) += 1;
        self.history.push_back(name.to_string());
        while self.history.len() > self.max_history {
            self.history.pop_front();
        }
    }

    pub fn usage(&self) -> impl Iterator<Item = (&str, u32)> {
        self.usage.iter().map(|(n, c)| (n.as_str(), *c))
    }

    pub fn total_used(&self) -> u32 {
        self.usage.values().sum()
    }

    pub fn unique_used(&self) -> usize {
        self.usage.values().filter(|c| **c > 0).count()
    }

    pub fn len(&self) -> usize {
        self.usage.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shader::metadata::{Preference, Status};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn records(entries: &[(&str, Preference, Status)]) -> BTreeMap<String, TransitionRecord> {
        entries
            .iter()
            .map(|(n, p, s)| (n.to_string(), TransitionRecord::new(*n, *p, *s)))
            .collect()
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn best_group_is_used_until_exhausted() {
        let recs = records(&[
            ("a", Preference::HighlyDesired, Status::FullyWorking),
            ("b", Preference::HighlyDesired, Status::FullyWorking),
            ("c", Preference::Mid, Status::MinorAdjustments),
        ]);
        let mut rng = StdRng::seed_from_u64(5);
        let mut t = TransitionCycler::new(&names(&["a", "b", "c"]), &recs, 0);
        let first_two = [t.next(&mut rng).unwrap(), t.next(&mut rng).unwrap()];
        assert!(first_two.contains(&"a".to_string()));
        assert!(first_two.contains(&"b".to_string()));
        assert_eq!(t.next(&mut rng).unwrap(), "c");
        assert_eq!(t.score_summary(), vec![(2, 2), (4, 1)]);
    }

    #[test]
    fn broken_low_and_unlisted_transitions_are_never_chosen() {
        let recs = records(&[
            ("good", Preference::Mid, Status::FullyWorking),
            ("bad", Preference::Low, Status::Broken),
        ]);
        let mut rng = StdRng::seed_from_u64(9);
        let mut t = TransitionCycler::new(&names(&["good", "bad", "unlisted"]), &recs, 2);
        for _ in 0..20 {
            assert_eq!(t.next(&mut rng).unwrap(), "good");
        }
        assert_eq!(t.unique_used(), 1);
        assert_eq!(t.total_used(), 20);
    }

    #[test]
    fn all_excluded_yields_none() {
        let recs = records(&[("bad", Preference::Low, Status::Broken)]);
        let mut rng = StdRng::seed_from_u64(1);
        let t = TransitionCycler::new(&names(&["bad", "other"]), &recs, 2);
        assert!(t.is_empty());
        assert_eq!(t.select(&mut rng), None);
    }

    #[test]
    fn exhausted_tiers_fall_back_to_uniform_choice() {
        let recs = records(&[
            ("a", Preference::HighlyDesired, Status::FullyWorking),
            ("b", Preference::Mid, Status::FullyWorking),
        ]);
        let mut rng = StdRng::seed_from_u64(2);
        let mut t = TransitionCycler::new(&names(&["a", "b"]), &recs, 1);
        t.record("a");
        t.record("b");
        for _ in 0..10 {
            let pick = t.select(&mut rng).unwrap();
            assert!(pick == "a" || pick == "b");
        }
    }

    #[test]
    fn recent_history_is_avoided_inside_a_group() {
        let recs = records(&[
            ("a", Preference::HighlyDesired, Status::FullyWorking),
            ("b", Preference::HighlyDesired, Status::FullyWorking),
            ("c", Preference::HighlyDesired, Status::FullyWorking),
        ]);
        let mut rng = StdRng::seed_from_u64(4);
        let mut t = TransitionCycler::new(&names(&["a", "b", "c"]), &recs, 2);
        for name in ["a", "b", "b", "c"] {
            t.record(name);
        }
        // a and c share the minimum usage, but c is in the recency queue.
        for _ in 0..10 {
            assert_eq!(t.select(&mut rng).unwrap(), "a");
        }
    }
}
