//! Statistics orchestration: freshness decisions, record passes, persistence.
//!
//! Every statistic group goes through the same state machine:
//!
//! ```text
//! NotStarted -> (freshness check) -> Skipped
//!                                 -> Computing -> Computed -> Persisted
//!                                              -> Failed
//! ```
//!
//! A group is fresh when the caller does not force it, its artifact file (if
//! any) exists, and every required key is already in the cache document.
//! Stale record groups are fed by traversals of the record source: in
//! [`PassMode::Fused`] one traversal serves all of them, in
//! [`PassMode::PerGroup`] each gets its own. A failing group never aborts its
//! siblings, and the document is saved after every group that completes, so a
//! later run resumes only the unfinished groups.

use std::path::{Path, PathBuf};
use std::time::Instant;

use indexmap::IndexMap;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cache::{CacheDocument, StatisticsCache, write_json_atomic};
use crate::config::{PassMode, RecomputePolicy};
use crate::constants::stats::PROGRESS_EVERY;
use crate::data::Record;
use crate::errors::StatsError;
use crate::extract::FieldPath;
use crate::source::{PackageFilter, RecordSource};
use crate::types::{GroupName, StatKey};

/// Lifecycle of one statistic group within a run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GroupState {
    /// Not yet examined.
    NotStarted,
    /// Cached and not forced; nothing was computed.
    Skipped,
    /// Being fed by a pass.
    Computing,
    /// Finished computing, not yet written.
    Computed,
    /// Statistics and artifact written.
    Persisted,
    /// Computation failed; the cache keeps whatever it held before.
    Failed(String),
}

/// Statistics and optional artifact produced by a finished group.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GroupOutput {
    /// Keys merged into the cache document.
    pub statistics: IndexMap<StatKey, Value>,
    /// Artifact document written to the group's artifact path.
    pub artifact: Option<Value>,
}

impl GroupOutput {
    /// Empty output.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one statistic.
    pub fn stat(mut self, key: impl Into<StatKey>, value: Value) -> Self {
        self.statistics.insert(key.into(), value);
        self
    }

    /// Attach the artifact document.
    pub fn with_artifact(mut self, artifact: Value) -> Self {
        self.artifact = Some(artifact);
        self
    }
}

/// Identity and freshness inputs shared by every kind of group.
pub trait GroupSpec {
    /// Unique group name within a report.
    fn name(&self) -> &str;
    /// Cache keys the group produces; all must be present for it to be fresh.
    fn required_keys(&self) -> Vec<StatKey>;
    /// Artifact file the group writes, if any; it must exist for freshness.
    fn artifact_path(&self) -> Option<PathBuf> {
        None
    }
}

/// Group computed from one traversal of the record stream.
pub trait StatisticGroup: GroupSpec {
    /// Fields the group reads. An empty list asks for full records.
    fn fields(&self) -> Vec<FieldPath>;
    /// Fresh accumulator for one pass.
    fn accumulator(&self) -> Box<dyn GroupAccumulator + '_>;
}

/// Per-pass state of a [`StatisticGroup`].
pub trait GroupAccumulator {
    /// Consume one record. Absent fields must be skipped, not reported.
    fn observe(&mut self, record: &Record) -> Result<(), StatsError>;
    /// Produce the group's output once the pass ends.
    fn finish(self: Box<Self>) -> Result<GroupOutput, StatsError>;
}

/// Group computed from precomputed tables (e.g. graph score tables).
pub trait TableGroup: GroupSpec {
    /// Compute the group's output.
    fn compute(&self) -> Result<GroupOutput, StatsError>;
}

/// Final state of every requested group, in request order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RunReport {
    /// Group name to final state.
    pub outcomes: IndexMap<GroupName, GroupState>,
    /// Record traversals opened.
    pub passes: usize,
    /// Records read across all traversals.
    pub records_scanned: u64,
}

impl RunReport {
    /// Final state of `group`.
    pub fn state(&self, group: &str) -> Option<&GroupState> {
        self.outcomes.get(group)
    }

    /// Groups that failed, with their reasons.
    pub fn failed(&self) -> impl Iterator<Item = (&str, &str)> {
        self.outcomes.iter().filter_map(|(name, state)| match state {
            GroupState::Failed(reason) => Some((name.as_str(), reason.as_str())),
            _ => None,
        })
    }

    /// Names of groups that were recomputed and persisted.
    pub fn persisted(&self) -> Vec<&str> {
        self.names_in(&GroupState::Persisted)
    }

    /// Names of groups skipped as fresh.
    pub fn skipped(&self) -> Vec<&str> {
        self.names_in(&GroupState::Skipped)
    }

    /// True when no group failed.
    pub fn is_success(&self) -> bool {
        self.failed().next().is_none()
    }

    fn names_in(&self, wanted: &GroupState) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|(_, state)| *state == wanted)
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

/// Drives freshness checks, passes, and persistence for one cache document.
pub struct StatisticsOrchestrator {
    cache: StatisticsCache,
    document: CacheDocument,
    recompute: RecomputePolicy,
    pass_mode: PassMode,
}

impl StatisticsOrchestrator {
    /// Load the document behind `cache` and prepare a run.
    pub fn new(cache: StatisticsCache, recompute: RecomputePolicy, pass_mode: PassMode) -> Self {
        let document = cache.load();
        Self {
            cache,
            document,
            recompute,
            pass_mode,
        }
    }

    /// The document as currently known (loaded plus persisted this run).
    pub fn document(&self) -> &CacheDocument {
        &self.document
    }

    /// Path of the backing cache document.
    pub fn cache_path(&self) -> &Path {
        self.cache.path()
    }

    /// Freshness predicate: not forced, artifact present, all keys present.
    pub fn is_fresh<G: GroupSpec + ?Sized>(&self, group: &G) -> bool {
        if self.recompute.forces(group.name()) {
            return false;
        }
        if let Some(path) = group.artifact_path()
            && !path.is_file()
        {
            return false;
        }
        self.document.has_all(&group.required_keys())
    }

    /// Compute every stale record group from `source`.
    ///
    /// Returns `Err` only when persisting fails; group-level failures are
    /// reported in the [`RunReport`].
    pub fn run_records(
        &mut self,
        source: &dyn RecordSource,
        filter: Option<&PackageFilter>,
        groups: &[&dyn StatisticGroup],
    ) -> Result<RunReport, StatsError> {
        let mut report = RunReport::default();
        let mut stale = Vec::new();
        for (idx, group) in groups.iter().enumerate() {
            report
                .outcomes
                .insert(group.name().to_string(), GroupState::NotStarted);
            if self.is_fresh(*group) {
                self.transition(&mut report, group.name(), GroupState::Skipped);
            } else {
                stale.push(idx);
            }
        }

        let passes: Vec<Vec<usize>> = match self.pass_mode {
            PassMode::Fused if stale.is_empty() => Vec::new(),
            PassMode::Fused => vec![stale],
            PassMode::PerGroup => stale.into_iter().map(|idx| vec![idx]).collect(),
        };
        for members in passes {
            let selected: Vec<&dyn StatisticGroup> =
                members.iter().map(|idx| groups[*idx]).collect();
            self.run_pass(source, filter, &selected, &mut report)?;
        }
        Ok(report)
    }

    /// Compute every stale table-backed group.
    pub fn run_tables(&mut self, groups: &[&dyn TableGroup]) -> Result<RunReport, StatsError> {
        let mut report = RunReport::default();
        for group in groups {
            report
                .outcomes
                .insert(group.name().to_string(), GroupState::NotStarted);
            if self.is_fresh(*group) {
                self.transition(&mut report, group.name(), GroupState::Skipped);
                continue;
            }
            self.transition(&mut report, group.name(), GroupState::Computing);
            let started = Instant::now();
            match group.compute() {
                Ok(output) => {
                    self.transition(&mut report, group.name(), GroupState::Computed);
                    self.persist(*group, output)?;
                    info!(
                        "[appstats:orchestrator] group '{}' persisted in {:.2}s",
                        group.name(),
                        started.elapsed().as_secs_f64()
                    );
                    self.transition(&mut report, group.name(), GroupState::Persisted);
                }
                Err(err) => self.fail(&mut report, group.name(), &err),
            }
        }
        Ok(report)
    }

    fn run_pass(
        &mut self,
        source: &dyn RecordSource,
        filter: Option<&PackageFilter>,
        groups: &[&dyn StatisticGroup],
        report: &mut RunReport,
    ) -> Result<(), StatsError> {
        let names: Vec<&str> = groups.iter().map(|group| group.name()).collect();
        info!(
            "[appstats:orchestrator] pass over '{}' for groups {:?}",
            source.id(),
            names
        );
        for name in &names {
            self.transition(report, name, GroupState::Computing);
        }

        let fields = projection_for(groups);
        let stream = match fields {
            Some(fields) => source.fetch_projected(filter, &fields),
            None => source.fetch_all(filter),
        };
        report.passes += 1;
        let stream = match stream {
            Ok(stream) => stream,
            Err(err) => {
                for name in &names {
                    self.fail(report, name, &err);
                }
                return Ok(());
            }
        };

        let started = Instant::now();
        let mut accumulators: Vec<Option<Box<dyn GroupAccumulator + '_>>> =
            groups.iter().map(|group| Some(group.accumulator())).collect();
        let mut scanned = 0u64;
        for item in stream {
            let record = match item {
                Ok(record) => record,
                Err(err) => {
                    warn!(
                        "[appstats:orchestrator] pass aborted after {} records: {}",
                        scanned, err
                    );
                    for (idx, slot) in accumulators.iter_mut().enumerate() {
                        if slot.take().is_some() {
                            self.fail(report, names[idx], &err);
                        }
                    }
                    break;
                }
            };
            scanned += 1;
            for (idx, slot) in accumulators.iter_mut().enumerate() {
                let Some(accumulator) = slot.as_mut() else {
                    continue;
                };
                if let Err(err) = accumulator.observe(&record) {
                    *slot = None;
                    self.fail(report, names[idx], &err);
                }
            }
            if scanned % PROGRESS_EVERY == 0 {
                info!(
                    "[appstats:orchestrator] {} records scanned ({:.1}s)",
                    scanned,
                    started.elapsed().as_secs_f64()
                );
            }
        }
        report.records_scanned += scanned;
        debug!(
            records = scanned,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "pass finished"
        );

        for (idx, slot) in accumulators.into_iter().enumerate() {
            let Some(accumulator) = slot else {
                continue;
            };
            match accumulator.finish() {
                Ok(output) => {
                    self.transition(report, names[idx], GroupState::Computed);
                    self.persist(groups[idx], output)?;
                    self.transition(report, names[idx], GroupState::Persisted);
                }
                Err(err) => self.fail(report, names[idx], &err),
            }
        }
        Ok(())
    }

    /// Write the artifact, merge the statistics, and save the document.
    fn persist<G: GroupSpec + ?Sized>(
        &mut self,
        group: &G,
        output: GroupOutput,
    ) -> Result<(), StatsError> {
        if let Some(artifact) = &output.artifact {
            let Some(path) = group.artifact_path() else {
                return Err(StatsError::Configuration(format!(
                    "group '{}' produced an artifact but declares no artifact path",
                    group.name()
                )));
            };
            write_json_atomic(&path, artifact)?;
        }
        if !output.statistics.is_empty() {
            self.document.extend(output.statistics);
            self.cache.save(&self.document)?;
        }
        Ok(())
    }

    fn transition(&self, report: &mut RunReport, group: &str, state: GroupState) {
        debug!(group, state = ?state, "[appstats:orchestrator] group transition");
        if let Some(slot) = report.outcomes.get_mut(group) {
            *slot = state;
        }
    }

    fn fail(&self, report: &mut RunReport, group: &str, err: &StatsError) {
        warn!("[appstats:orchestrator] group '{}' failed: {}", group, err);
        self.transition(report, group, GroupState::Failed(err.to_string()));
    }
}

/// Union of the fields requested by `groups`, or `None` when any group needs
/// full records.
fn projection_for(groups: &[&dyn StatisticGroup]) -> Option<Vec<FieldPath>> {
    let mut fields: Vec<FieldPath> = Vec::new();
    for group in groups {
        let requested = group.fields();
        if requested.is_empty() {
            return None;
        }
        for field in requested {
            if !fields.contains(&field) {
                fields.push(field);
            }
        }
    }
    Some(fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::extract_f64;
    use crate::running::RunningStatistics;
    use crate::source::InMemorySource;
    use serde_json::json;
    use std::cell::Cell;
    use tempfile::tempdir;

    /// Mean of one numeric field; counts how often it was computed.
    struct MeanGroup {
        name: &'static str,
        field: FieldPath,
        computed: Cell<usize>,
    }

    impl MeanGroup {
        fn new(name: &'static str, field: &str) -> Self {
            Self {
                name,
                field: FieldPath::parse(field).unwrap(),
                computed: Cell::new(0),
            }
        }
    }

    impl GroupSpec for MeanGroup {
        fn name(&self) -> &str {
            self.name
        }

        fn required_keys(&self) -> Vec<StatKey> {
            vec![format!("avg_{}", self.name)]
        }
    }

    impl StatisticGroup for MeanGroup {
        fn fields(&self) -> Vec<FieldPath> {
            vec![self.field.clone()]
        }

        fn accumulator(&self) -> Box<dyn GroupAccumulator + '_> {
            self.computed.set(self.computed.get() + 1);
            Box::new(MeanAccumulator {
                group: self,
                stats: RunningStatistics::new(self.name),
            })
        }
    }

    struct MeanAccumulator<'a> {
        group: &'a MeanGroup,
        stats: RunningStatistics,
    }

    impl GroupAccumulator for MeanAccumulator<'_> {
        fn observe(&mut self, record: &Record) -> Result<(), StatsError> {
            if let Some(value) = extract_f64(record, &self.group.field) {
                self.stats.push(value);
            }
            Ok(())
        }

        fn finish(self: Box<Self>) -> Result<GroupOutput, StatsError> {
            Ok(GroupOutput::new().stat(format!("avg_{}", self.group.name), json!(self.stats.mean()?)))
        }
    }

    fn source() -> InMemorySource {
        InMemorySource::new(
            "mem",
            vec![
                Record::new(json!({"docid": "a", "x": 1.0, "y": 10.0})),
                Record::new(json!({"docid": "b", "x": 3.0})),
            ],
        )
    }

    #[test]
    fn fused_pass_serves_all_stale_groups_once() {
        let temp = tempdir().unwrap();
        let cache = StatisticsCache::new(temp.path().join("stats.json"));
        let x = MeanGroup::new("x", "x");
        let y = MeanGroup::new("y", "y");
        let mut orchestrator =
            StatisticsOrchestrator::new(cache, RecomputePolicy::default(), PassMode::Fused);
        let report = orchestrator.run_records(&source(), None, &[&x, &y]).unwrap();
        assert_eq!(report.passes, 1);
        assert_eq!(report.records_scanned, 2);
        assert_eq!(report.persisted(), vec!["x", "y"]);
        assert_eq!(orchestrator.document().get("avg_x"), Some(&json!(2.0)));
        assert_eq!(orchestrator.document().get("avg_y"), Some(&json!(10.0)));
    }

    #[test]
    fn empty_group_fails_without_touching_siblings() {
        let temp = tempdir().unwrap();
        let cache = StatisticsCache::new(temp.path().join("stats.json"));
        let x = MeanGroup::new("x", "x");
        let z = MeanGroup::new("z", "z");
        let mut orchestrator =
            StatisticsOrchestrator::new(cache.clone(), RecomputePolicy::default(), PassMode::Fused);
        let report = orchestrator.run_records(&source(), None, &[&z, &x]).unwrap();
        assert!(matches!(report.state("z"), Some(GroupState::Failed(_))));
        assert_eq!(report.state("x"), Some(&GroupState::Persisted));
        assert!(cache.load().has("avg_x"));
        assert!(!cache.load().has("avg_z"));
    }

    #[test]
    fn per_group_mode_opens_one_pass_per_stale_group() {
        let temp = tempdir().unwrap();
        let cache = StatisticsCache::new(temp.path().join("stats.json"));
        let x = MeanGroup::new("x", "x");
        let y = MeanGroup::new("y", "y");
        let mut orchestrator =
            StatisticsOrchestrator::new(cache, RecomputePolicy::default(), PassMode::PerGroup);
        let report = orchestrator.run_records(&source(), None, &[&x, &y]).unwrap();
        assert_eq!(report.passes, 2);
        assert_eq!(report.records_scanned, 4);
    }

    #[test]
    fn fresh_groups_are_skipped_and_forced_ones_recomputed() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("stats.json");
        let x = MeanGroup::new("x", "x");
        let y = MeanGroup::new("y", "y");
        StatisticsOrchestrator::new(
            StatisticsCache::new(&path),
            RecomputePolicy::default(),
            PassMode::Fused,
        )
        .run_records(&source(), None, &[&x, &y])
        .unwrap();

        let policy = RecomputePolicy {
            overwrite: false,
            force_groups: vec!["y".to_string()],
        };
        let mut orchestrator =
            StatisticsOrchestrator::new(StatisticsCache::new(&path), policy, PassMode::Fused);
        let report = orchestrator.run_records(&source(), None, &[&x, &y]).unwrap();
        assert_eq!(report.skipped(), vec!["x"]);
        assert_eq!(report.persisted(), vec!["y"]);
        assert_eq!(x.computed.get(), 1);
        assert_eq!(y.computed.get(), 2);
    }

    #[test]
    fn no_pass_is_opened_when_everything_is_fresh() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("stats.json");
        let x = MeanGroup::new("x", "x");
        let first = StatisticsOrchestrator::new(
            StatisticsCache::new(&path),
            RecomputePolicy::default(),
            PassMode::Fused,
        )
        .run_records(&source(), None, &[&x])
        .unwrap();
        assert!(first.is_success());
        let second = StatisticsOrchestrator::new(
            StatisticsCache::new(&path),
            RecomputePolicy::default(),
            PassMode::Fused,
        )
        .run_records(&source(), None, &[&x])
        .unwrap();
        assert_eq!(second.passes, 0);
        assert_eq!(second.skipped(), vec!["x"]);
    }

    struct ConstantTable;

    impl GroupSpec for ConstantTable {
        fn name(&self) -> &str {
            "constant"
        }

        fn required_keys(&self) -> Vec<StatKey> {
            vec!["answer".to_string()]
        }
    }

    impl TableGroup for ConstantTable {
        fn compute(&self) -> Result<GroupOutput, StatsError> {
            Ok(GroupOutput::new().stat("answer", json!(42)))
        }
    }

    #[test]
    fn table_groups_share_freshness_and_persistence() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("graph_statistics.json");
        let mut orchestrator = StatisticsOrchestrator::new(
            StatisticsCache::new(&path),
            RecomputePolicy::default(),
            PassMode::Fused,
        );
        let report = orchestrator.run_tables(&[&ConstantTable]).unwrap();
        assert_eq!(report.persisted(), vec!["constant"]);
        let again = orchestrator.run_tables(&[&ConstantTable]).unwrap();
        assert_eq!(again.skipped(), vec!["constant"]);
    }
}
