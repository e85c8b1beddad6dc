//! Per-process history across scrapes.
//!
//! The tracker keys everything on [`ProcId`] (pid + start time), so a reused
//! PID is a new process. For each live process it remembers the group name
//! assigned at first sighting and the last observed [`Counts`], and turns
//! every snapshot into per-process [`Update`]s carrying this cycle's deltas.
//!
//! Processes the namer rejects are remembered as ignored until they exit,
//! so classification (and the children walk) runs once per process.

use std::collections::{HashMap, HashSet};

use tracing::trace;

use crate::collector::procfs::CollectError;
use crate::proc::namer::MatchNamer;
use crate::proc::types::{CollectErrors, Counts, ProcId, ProcSample, States, Update, Wchans};

#[derive(Debug, Clone)]
struct Tracked {
    group_name: String,
    last_counts: Counts,
}

/// Tracks processes across scrape cycles.
pub struct Tracker<N: MatchNamer> {
    namer: N,
    track_children: bool,
    /// `None` marks a process the namer rejected.
    tracked: HashMap<ProcId, Option<Tracked>>,
}

impl<N: MatchNamer> Tracker<N> {
    pub fn new(namer: N, track_children: bool) -> Self {
        Self {
            namer,
            track_children,
            tracked: HashMap::new(),
        }
    }

    pub fn namer(&self) -> &N {
        &self.namer
    }

    /// Number of processes currently assigned to a group.
    pub fn tracked_count(&self) -> usize {
        self.tracked.values().filter(|t| t.is_some()).count()
    }

    /// Number of live processes remembered as rejected.
    pub fn ignored_count(&self) -> usize {
        self.tracked.values().filter(|t| t.is_none()).count()
    }

    /// Group assigned to a live process, if it is tracked.
    pub fn group_of(&self, id: &ProcId) -> Option<&str> {
        self.tracked
            .get(id)
            .and_then(|t| t.as_ref())
            .map(|t| t.group_name.as_str())
    }

    /// Consumes one snapshot of the process table.
    ///
    /// Returns the read failures of this snapshot and one [`Update`] per live
    /// tracked process. Processes absent from the snapshot are forgotten;
    /// their deltas up to the previous cycle were already reported.
    pub fn update<I>(&mut self, procs: I) -> (CollectErrors, Vec<Update>)
    where
        I: IntoIterator<Item = Result<ProcSample, CollectError>>,
    {
        let mut errors = CollectErrors::default();
        let mut samples = Vec::new();
        for result in procs {
            match result {
                Ok(sample) => {
                    if sample.partial {
                        errors.partial += 1;
                    }
                    samples.push(sample);
                }
                Err(_) => errors.read += 1,
            }
        }

        let present: HashSet<ProcId> = samples.iter().map(|s| s.id).collect();
        let before = self.tracked.len();
        self.tracked.retain(|id, _| present.contains(id));
        if self.tracked.len() != before {
            trace!(
                retired = before - self.tracked.len(),
                "forgot exited processes"
            );
        }

        let mut updates = Vec::with_capacity(samples.len());
        let mut pending = Vec::new();

        for (idx, sample) in samples.iter().enumerate() {
            match self.tracked.get_mut(&sample.id) {
                Some(Some(t)) => {
                    let latest = sample.metrics.counts.delta_since(&t.last_counts);
                    t.last_counts = sample.metrics.counts;
                    updates.push(make_update(t.group_name.clone(), latest, sample));
                }
                Some(None) => {}
                None => match self.namer.match_and_name(&sample.attrs) {
                    Some(name) => {
                        self.track(sample, name.clone());
                        updates.push(make_update(name, Counts::default(), sample));
                    }
                    None if self.track_children => pending.push(idx),
                    None => {
                        self.tracked.insert(sample.id, None);
                    }
                },
            }
        }

        if !pending.is_empty() {
            let by_pid: HashMap<u32, &ProcSample> =
                samples.iter().map(|s| (s.id.pid, s)).collect();

            for idx in pending {
                let sample = &samples[idx];
                match self.find_ancestor_group(sample, &by_pid) {
                    Some(name) => {
                        self.track(sample, name.clone());
                        updates.push(make_update(name, Counts::default(), sample));
                    }
                    None => {
                        self.tracked.insert(sample.id, None);
                    }
                }
            }
        }

        (errors, updates)
    }

    fn track(&mut self, sample: &ProcSample, group_name: String) {
        self.tracked.insert(
            sample.id,
            Some(Tracked {
                group_name,
                last_counts: sample.metrics.counts,
            }),
        );
    }

    /// Walks the parent chain of an unmatched new process.
    ///
    /// Stops at the first ancestor the tracker already decided on: a tracked
    /// one donates its group, an ignored one ends the walk. New, still
    /// undecided ancestors are walked through. The walk never takes more
    /// steps than there are processes in the snapshot.
    fn find_ancestor_group(
        &self,
        sample: &ProcSample,
        by_pid: &HashMap<u32, &ProcSample>,
    ) -> Option<String> {
        let mut ppid = sample.ppid;
        for _ in 0..by_pid.len() {
            if ppid == 0 || ppid == sample.id.pid {
                return None;
            }
            let parent = by_pid.get(&ppid)?;
            match self.tracked.get(&parent.id) {
                Some(Some(t)) => return Some(t.group_name.clone()),
                Some(None) => return None,
                None => ppid = parent.ppid,
            }
        }
        None
    }
}

fn make_update(group_name: String, latest: Counts, sample: &ProcSample) -> Update {
    let mut wchans = Wchans::new();
    if let Some(ref wchan) = sample.metrics.wchan {
        wchans.insert(wchan.clone(), 1);
    }

    Update {
        group_name,
        latest,
        memory: sample.metrics.memory,
        states: States::from_state_char(sample.metrics.state),
        wchans,
        filedesc: sample.metrics.filedesc,
        start: sample.attrs.start_time,
        num_threads: sample.metrics.num_threads,
    }
}
