//! Aggregation of tracker updates into named groups.
//!
//! The grouper owns the per-group accumulator (the historical floor of every
//! group's [`Counts`]). Each cycle's deltas are added on top of the floor and
//! the sum becomes the new floor, so reported counts never decrease, no
//! matter how processes come and go. Groups seen once are kept forever.

use std::collections::HashMap;

use crate::collector::procfs::CollectError;
use crate::proc::namer::MatchNamer;
use crate::proc::tracker::Tracker;
use crate::proc::types::{CollectErrors, Counts, Group, GroupByName, ProcSample, Update};

/// Groups processes by name and keeps per-group monotonic counters.
pub struct Grouper<N: MatchNamer> {
    tracker: Tracker<N>,
    accum: HashMap<String, Counts>,
}

impl<N: MatchNamer> Grouper<N> {
    pub fn new(namer: N, track_children: bool) -> Self {
        Self {
            tracker: Tracker::new(namer, track_children),
            accum: HashMap::new(),
        }
    }

    pub fn tracker(&self) -> &Tracker<N> {
        &self.tracker
    }

    /// Consumes one snapshot and returns every group ever seen.
    pub fn update<I>(&mut self, procs: I) -> (CollectErrors, GroupByName)
    where
        I: IntoIterator<Item = Result<ProcSample, CollectError>>,
    {
        let (errors, updates) = self.tracker.update(procs);
        (errors, self.groups(updates))
    }

    fn groups(&mut self, updates: Vec<Update>) -> GroupByName {
        let mut groups = GroupByName::new();

        for update in updates {
            let group = groups.entry(update.group_name).or_default();
            group.procs += 1;
            group.memory += update.memory;
            group.states += update.states;
            for (wchan, count) in update.wchans {
                *group.wchans.entry(wchan).or_default() += count;
            }
            group.counts += update.latest;
            group.num_threads += update.num_threads;

            group.oldest_start_time = Some(match group.oldest_start_time {
                Some(oldest) => oldest.min(update.start),
                None => update.start,
            });
            if update.filedesc.open >= 0 {
                group.open_fds += update.filedesc.open as u64;
            }
            if let Some(ratio) = update.filedesc.ratio() {
                group.worst_fd_ratio = group.worst_fd_ratio.max(ratio);
            }
        }

        for (name, group) in groups.iter_mut() {
            if let Some(floor) = self.accum.get(name) {
                group.counts += *floor;
            }
            self.accum.insert(name.clone(), group.counts);
        }

        for (name, counts) in &self.accum {
            if !groups.contains_key(name) {
                groups.insert(
                    name.clone(),
                    Group {
                        counts: *counts,
                        ..Group::default()
                    },
                );
            }
        }

        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proc::tracker::tests::{CommNamer, sample};
    use crate::proc::types::Filedesc;
    use proptest::prelude::*;

    fn ok(samples: Vec<ProcSample>) -> Vec<Result<ProcSample, CollectError>> {
        samples.into_iter().map(Ok).collect()
    }

    #[test]
    fn test_exit_between_cycles_keeps_counts() {
        let mut grouper = Grouper::new(CommNamer::new(&["g"]), false);
        grouper.update(ok(vec![
            sample(100, 1, 1, "g", 40.0),
            sample(200, 1, 2, "g", 30.0),
        ]));
        let (_, t) = grouper.update(ok(vec![
            sample(100, 1, 1, "g", 50.0),
            sample(200, 1, 2, "g", 30.0),
        ]));
        let (_, t1) = grouper.update(ok(vec![sample(100, 1, 1, "g", 60.0)]));

        assert_eq!(
            t1["g"].counts.cpu_user_time,
            t["g"].counts.cpu_user_time + 10.0
        );
        assert_eq!(t1["g"].procs, 1);
    }

    #[test]
    fn test_pid_reuse_adds_nothing() {
        let mut grouper = Grouper::new(CommNamer::new(&["g"]), false);
        grouper.update(ok(vec![sample(500, 1, 1000, "g", 10.0)]));
        let (_, t) = grouper.update(ok(vec![sample(500, 1, 1000, "g", 20.0)]));
        let (_, t1) = grouper.update(ok(vec![sample(500, 1, 2000, "g", 5.0)]));

        assert_eq!(t1["g"].counts.cpu_user_time, t["g"].counts.cpu_user_time);
        assert_eq!(t1["g"].procs, 1);
    }

    #[test]
    fn test_children_procs_count() {
        let tree = || {
            ok(vec![
                sample(10, 1, 10, "python", 1.0),
                sample(11, 10, 11, "sh", 1.0),
                sample(12, 11, 12, "awk", 1.0),
            ])
        };

        let mut with_children = Grouper::new(CommNamer::new(&["python"]), true);
        let (_, groups) = with_children.update(tree());
        assert_eq!(groups["python"].procs, 3);

        let mut without = Grouper::new(CommNamer::new(&["python"]), false);
        let (_, groups) = without.update(tree());
        assert_eq!(groups["python"].procs, 1);
    }

    #[test]
    fn test_dead_group_is_retained_with_zero_gauges() {
        let mut grouper = Grouper::new(CommNamer::new(&["g", "h"]), false);
        let mut s = sample(100, 1, 1, "g", 1.0);
        s.metrics.memory.resident_bytes = 4096;
        grouper.update(ok(vec![s.clone(), sample(200, 1, 2, "h", 1.0)]));
        s.metrics.counts.cpu_user_time = 3.0;
        let (_, t) = grouper.update(ok(vec![s, sample(200, 1, 2, "h", 1.0)]));

        let (_, t1) = grouper.update(ok(vec![sample(200, 1, 2, "h", 1.0)]));
        let g = &t1["g"];
        assert_eq!(g.counts, t["g"].counts);
        assert_eq!(g.procs, 0);
        assert_eq!(g.memory.resident_bytes, 0);
        assert_eq!(g.oldest_start_time, None);

        // still there much later
        let (_, t2) = grouper.update(ok(vec![]));
        assert_eq!(t2["g"].counts, t["g"].counts);
        assert_eq!(t2.len(), 2);
    }

    #[test]
    fn test_group_aggregates_gauges() {
        let mut grouper = Grouper::new(CommNamer::new(&["g"]), false);
        let mut a = sample(100, 1, 500, "g", 0.0);
        a.metrics.memory.resident_bytes = 100;
        a.metrics.memory.virtual_bytes = 1000;
        a.metrics.filedesc = Filedesc {
            open: 10,
            limit: 100,
        };
        a.metrics.wchan = Some("ep_poll".to_string());
        a.metrics.num_threads = 2;
        let mut b = sample(200, 1, 100, "g", 0.0);
        b.metrics.memory.resident_bytes = 50;
        b.metrics.memory.virtual_bytes = 500;
        b.metrics.filedesc = Filedesc {
            open: 30,
            limit: 60,
        };
        b.metrics.wchan = Some("ep_poll".to_string());
        b.metrics.state = 'R';
        b.metrics.num_threads = 3;
        let mut c = sample(300, 1, 900, "g", 0.0);
        c.metrics.filedesc = Filedesc {
            open: -1,
            limit: 100,
        };

        let (_, groups) = grouper.update(ok(vec![a, b, c]));
        let g = &groups["g"];
        assert_eq!(g.procs, 3);
        assert_eq!(g.memory.resident_bytes, 150);
        assert_eq!(g.memory.virtual_bytes, 1500);
        assert_eq!(g.open_fds, 40);
        assert_eq!(g.worst_fd_ratio, 0.5);
        assert_eq!(g.wchans.get("ep_poll"), Some(&2));
        assert_eq!(g.states.running, 1);
        assert_eq!(g.states.sleeping, 2);
        assert_eq!(g.num_threads, 5);
        assert_eq!(g.oldest_start_time, Some(1_700_000_000 + 1));
    }

    #[test]
    fn test_group_revived_by_new_process() {
        let mut grouper = Grouper::new(CommNamer::new(&["g"]), false);
        grouper.update(ok(vec![sample(100, 1, 1, "g", 5.0)]));
        let (_, t) = grouper.update(ok(vec![sample(100, 1, 1, "g", 8.0)]));
        grouper.update(ok(vec![]));
        // successor with a different pid; its own counters start from its baseline
        grouper.update(ok(vec![sample(101, 1, 7, "g", 100.0)]));
        let (_, t4) = grouper.update(ok(vec![sample(101, 1, 7, "g", 102.0)]));

        assert_eq!(
            t4["g"].counts.cpu_user_time,
            t["g"].counts.cpu_user_time + 2.0
        );
        assert_eq!(t4["g"].procs, 1);
    }

    /// One process in a random cycle: (pid slot, start generation, user secs).
    fn cycle_strategy() -> impl Strategy<Value = Vec<(u32, u64, u32)>> {
        prop::collection::vec((0u32..6, 0u64..3, 0u32..500), 0..6)
    }

    fn history_strategy() -> impl Strategy<Value = Vec<Vec<(u32, u64, u32)>>> {
        prop::collection::vec(cycle_strategy(), 1..12)
    }

    proptest! {
        #[test]
        fn prop_group_counts_never_decrease(cycles in history_strategy()) {
            let mut grouper = Grouper::new(CommNamer::new(&["a", "b"]), true);
            let mut previous = GroupByName::new();

            for cycle in cycles {
                let mut seen = std::collections::HashSet::new();
                let snapshot: Vec<ProcSample> = cycle
                    .into_iter()
                    .filter(|(slot, _, _)| seen.insert(*slot))
                    .map(|(slot, generation, user)| {
                        let pid = 100 + slot;
                        let comm = if slot % 2 == 0 { "a" } else { "b" };
                        sample(pid, 1, generation * 1000 + u64::from(slot), comm, f64::from(user))
                    })
                    .collect();

                let (_, groups) = grouper.update(ok(snapshot));
                for (name, before) in &previous {
                    let after = groups.get(name);
                    prop_assert!(after.is_some(), "group {} vanished", name);
                    let grew = after.is_some_and(|g| g.counts.dominates(&before.counts));
                    prop_assert!(grew);
                }
                previous = groups;
            }
        }
    }
}
