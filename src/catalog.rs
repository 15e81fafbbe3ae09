//! Catalog statistic groups.
//!
//! Each group reads one or two record fields and produces a fixed set of cache
//! keys plus a histogram artifact (`<prefix>.<artifact>.histogram.json`) for
//! the external plotting tool. All groups are fed by the orchestrator, which
//! fuses them into one traversal of the record source by default.
//!
//! Ranked lists are stored as `[[id, value], ...]`. Summary keys follow the
//! `avg_<x>`, `stdev_<x>`, `<p>perc_<x>` naming.

use std::path::PathBuf;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::info;

use crate::cache::{StatisticsCache, suffixed};
use crate::config::StatsConfig;
use crate::constants::cache::{CATALOG_CACHE_SUFFIX, HISTOGRAM_ARTIFACT_SUFFIX};
use crate::constants::fields;
use crate::constants::histogram::{APP_SIZE_EDGES, RATING_BINS, RATING_MAX, RATING_MIN};
use crate::constants::permissions::ANDROID_PERMISSION_PREFIX;
use crate::data::{Record, ScalarValue};
use crate::dates::{month_key, parse_upload_date, unix_timestamp};
use crate::errors::StatsError;
use crate::extract::{FieldPath, extract, extract_f64, extract_strings};
use crate::histogram::{DiscreteHistogram, EdgeHistogram, HistogramArtifact, OutOfRange};
use crate::orchestrator::{
    GroupAccumulator, GroupOutput, GroupSpec, RunReport, StatisticGroup, StatisticsOrchestrator,
};
use crate::ranking::top_n;
use crate::running::RunningStatistics;
use crate::source::RecordSource;
use crate::topk::BoundedTopK;
use crate::types::{RecordId, StatKey};

/// Settings shared by every catalog group of one report.
#[derive(Clone, Debug)]
pub struct CatalogContext {
    /// Prefix of the cache document and every artifact.
    pub output_prefix: PathBuf,
    /// Title prepended to artifact headings.
    pub title: String,
    /// Ranking size.
    pub top_k: usize,
    /// Reported percentiles.
    pub percentiles: Vec<f64>,
}

impl CatalogContext {
    /// Context derived from a [`StatsConfig`].
    pub fn from_config(config: &StatsConfig) -> Self {
        Self {
            output_prefix: config.output_prefix.clone(),
            title: config.title.clone(),
            top_k: config.top_k,
            percentiles: config.percentiles.clone(),
        }
    }

    /// `<prefix>.db_statistics.json`
    pub fn cache_path(&self) -> PathBuf {
        suffixed(&self.output_prefix, CATALOG_CACHE_SUFFIX)
    }

    /// `<prefix>.<artifact>.histogram.json`
    pub fn artifact_path(&self, artifact: &str) -> PathBuf {
        suffixed(
            &self.output_prefix,
            &format!(".{artifact}{HISTOGRAM_ARTIFACT_SUFFIX}"),
        )
    }

    fn artifact(&self, heading: &str, x_label: &str, y_label: &str, buckets: Value) -> Value {
        HistogramArtifact::new(
            format!("{}\n{}", self.title, heading),
            x_label,
            y_label,
            buckets,
        )
        .to_value()
    }

    fn summary_keys(&self, suffix: &str) -> Vec<StatKey> {
        let mut keys = vec![format!("avg_{suffix}"), format!("stdev_{suffix}")];
        keys.extend(
            self.percentiles
                .iter()
                .map(|p| percentile_key(*p, suffix)),
        );
        keys
    }

    fn summarize(
        &self,
        mut output: GroupOutput,
        suffix: &str,
        stats: &mut RunningStatistics,
    ) -> Result<GroupOutput, StatsError> {
        let summary = stats.summary(&self.percentiles)?;
        output = output
            .stat(format!("avg_{suffix}"), json!(summary.mean))
            .stat(format!("stdev_{suffix}"), json!(summary.stdev));
        for (p, value) in summary.percentiles {
            output = output.stat(percentile_key(p, suffix), json!(value));
        }
        Ok(output)
    }
}

/// `95perc_app_size`, `97.5perc_app_size`, ...
pub fn percentile_key(p: f64, suffix: &str) -> StatKey {
    if p.fract() == 0.0 {
        format!("{}perc_{suffix}", p as i64)
    } else {
        format!("{p}perc_{suffix}")
    }
}

fn ranking_json<I: Serialize, V: Serialize>(pairs: Vec<(I, V)>) -> Value {
    Value::Array(pairs.into_iter().map(|(id, value)| json!([id, value])).collect())
}

fn dense_json(histogram: &DiscreteHistogram<i64>) -> Value {
    Value::Array(
        histogram
            .dense_range()
            .into_iter()
            .map(|(key, count)| json!([key, count]))
            .collect(),
    )
}

fn record_id(record: &Record) -> Option<RecordId> {
    record.id().map(str::to_string)
}

fn field(path: &str) -> Result<FieldPath, StatsError> {
    FieldPath::parse(path)
}

/// Every catalog group, in report order.
pub fn catalog_groups(context: &CatalogContext) -> Result<Vec<Box<dyn StatisticGroup>>, StatsError> {
    let groups: Vec<Box<dyn StatisticGroup>> = vec![
        Box::new(DownloadsGroup::new(context.clone())?),
        Box::new(AppSizeGroup::new(context.clone())?),
        Box::new(LastUpdateGroup::new(context.clone())?),
        Box::new(RatingGroup::bayesian(context.clone())?),
        Box::new(RatingGroup::star(context.clone())?),
        Box::new(PermissionsGroup::new(context.clone())?),
        Box::new(CreatorsGroup::new(context.clone())?),
    ];
    Ok(groups)
}

/// Compute the catalog report described by `config` from `source`.
///
/// Cached groups are skipped unless forced; the returned report lists the
/// final state of each group.
pub fn compute_catalog_statistics(
    source: &dyn RecordSource,
    config: &StatsConfig,
) -> Result<RunReport, StatsError> {
    config.validate()?;
    let context = CatalogContext::from_config(config);
    let groups = catalog_groups(&context)?;
    let group_refs: Vec<&dyn StatisticGroup> = groups.iter().map(|group| group.as_ref()).collect();
    let filter = config.package_filter();

    let mut orchestrator = StatisticsOrchestrator::new(
        StatisticsCache::new(context.cache_path()),
        config.recompute.clone(),
        config.pass_mode,
    );
    let report = orchestrator.run_records(source, filter.as_ref(), &group_refs)?;
    info!(
        "[appstats:orchestrator] catalog report '{}': {} persisted, {} skipped, {} failed",
        orchestrator.cache_path().display(),
        report.persisted().len(),
        report.skipped().len(),
        report.failed().count()
    );
    Ok(report)
}

// ---------------------------------------------------------------------------
// downloads

/// Histogram of apps per download bucket ("1,000+" keyed by 1000).
pub struct DownloadsGroup {
    context: CatalogContext,
    field: FieldPath,
}

impl DownloadsGroup {
    /// Group reading `details.appDetails.numDownloads`.
    pub fn new(context: CatalogContext) -> Result<Self, StatsError> {
        Ok(Self {
            context,
            field: field(fields::NUM_DOWNLOADS)?,
        })
    }
}

/// Numeric lower bound of a download bucket label.
pub fn download_lower_bound(value: &ScalarValue) -> Option<u64> {
    match value {
        ScalarValue::Number(number) if *number >= 0.0 => Some(*number as u64),
        ScalarValue::Number(_) => None,
        ScalarValue::Text(text) => {
            let head = text.split('+').next()?;
            let digits: String = head.trim().chars().filter(|ch| *ch != ',').collect();
            digits.parse().ok()
        }
    }
}

impl GroupSpec for DownloadsGroup {
    fn name(&self) -> &str {
        "downloads"
    }

    fn required_keys(&self) -> Vec<StatKey> {
        Vec::new()
    }

    fn artifact_path(&self) -> Option<PathBuf> {
        Some(self.context.artifact_path("downloads"))
    }
}

impl StatisticGroup for DownloadsGroup {
    fn fields(&self) -> Vec<FieldPath> {
        vec![self.field.clone()]
    }

    fn accumulator(&self) -> Box<dyn GroupAccumulator + '_> {
        Box::new(DownloadsAccumulator {
            group: self,
            buckets: DiscreteHistogram::new(),
        })
    }
}

struct DownloadsAccumulator<'a> {
    group: &'a DownloadsGroup,
    buckets: DiscreteHistogram<u64>,
}

impl GroupAccumulator for DownloadsAccumulator<'_> {
    fn observe(&mut self, record: &Record) -> Result<(), StatsError> {
        if let Some(bound) = extract(record, &self.group.field)
            .as_ref()
            .and_then(download_lower_bound)
        {
            self.buckets.add(bound);
        }
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<GroupOutput, StatsError> {
        if self.buckets.is_empty() {
            return Err(StatsError::empty("downloads"));
        }
        let artifact = self.group.context.artifact(
            "Number of apps distribution per number of downloads",
            "# downloads, lower bound",
            "# apps",
            self.buckets.to_json(),
        );
        Ok(GroupOutput::new().with_artifact(artifact))
    }
}

// ---------------------------------------------------------------------------
// app_size

/// Biggest and smallest apps, size summary, log-scale size histogram.
pub struct AppSizeGroup {
    context: CatalogContext,
    field: FieldPath,
    bins: EdgeHistogram,
}

impl AppSizeGroup {
    /// Group reading the size of the first delivered file.
    pub fn new(context: CatalogContext) -> Result<Self, StatsError> {
        Ok(Self {
            context,
            field: field(fields::FILE_SIZE)?,
            bins: EdgeHistogram::with_edges(APP_SIZE_EDGES.to_vec(), OutOfRange::Clamp)?,
        })
    }
}

impl GroupSpec for AppSizeGroup {
    fn name(&self) -> &str {
        "app_size"
    }

    fn required_keys(&self) -> Vec<StatKey> {
        let mut keys = vec!["biggest_apps".to_string(), "smallest_apps".to_string()];
        keys.extend(self.context.summary_keys("app_size"));
        keys
    }

    fn artifact_path(&self) -> Option<PathBuf> {
        Some(self.context.artifact_path("apps_size"))
    }
}

impl StatisticGroup for AppSizeGroup {
    fn fields(&self) -> Vec<FieldPath> {
        vec![self.field.clone()]
    }

    fn accumulator(&self) -> Box<dyn GroupAccumulator + '_> {
        Box::new(AppSizeAccumulator {
            group: self,
            biggest: BoundedTopK::largest(self.context.top_k),
            smallest: BoundedTopK::smallest(self.context.top_k),
            stats: RunningStatistics::new("app_size"),
            histogram: self.bins.clone(),
        })
    }
}

struct AppSizeAccumulator<'a> {
    group: &'a AppSizeGroup,
    biggest: BoundedTopK<Option<RecordId>, i64>,
    smallest: BoundedTopK<Option<RecordId>, i64>,
    stats: RunningStatistics,
    histogram: EdgeHistogram,
}

impl GroupAccumulator for AppSizeAccumulator<'_> {
    fn observe(&mut self, record: &Record) -> Result<(), StatsError> {
        let Some(size) = extract_f64(record, &self.group.field) else {
            return Ok(());
        };
        let size = size as i64;
        self.biggest.offer(record_id(record), size);
        self.smallest.offer(record_id(record), size);
        self.stats.push(size as f64);
        self.histogram.add(size as f64);
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<GroupOutput, StatsError> {
        let Self {
            group,
            biggest,
            smallest,
            mut stats,
            histogram,
        } = *self;
        let context = &group.context;
        let output = GroupOutput::new()
            .stat("biggest_apps", ranking_json(biggest.into_pairs()))
            .stat("smallest_apps", ranking_json(smallest.into_pairs()));
        let output = context.summarize(output, "app_size", &mut stats)?;
        Ok(output.with_artifact(context.artifact(
            "Number of apps distribution per app size",
            "app size (bytes)",
            "# apps",
            histogram.to_json(),
        )))
    }
}

// ---------------------------------------------------------------------------
// last_update

/// Mean upload timestamp and monthly upload histogram.
pub struct LastUpdateGroup {
    context: CatalogContext,
    field: FieldPath,
}

impl LastUpdateGroup {
    /// Group reading `details.appDetails.uploadDate`.
    pub fn new(context: CatalogContext) -> Result<Self, StatsError> {
        Ok(Self {
            context,
            field: field(fields::UPLOAD_DATE)?,
        })
    }
}

impl GroupSpec for LastUpdateGroup {
    fn name(&self) -> &str {
        "last_update"
    }

    fn required_keys(&self) -> Vec<StatKey> {
        vec!["avg_app_timestamp".to_string()]
    }

    fn artifact_path(&self) -> Option<PathBuf> {
        Some(self.context.artifact_path("app_last_updates"))
    }
}

impl StatisticGroup for LastUpdateGroup {
    fn fields(&self) -> Vec<FieldPath> {
        vec![self.field.clone()]
    }

    fn accumulator(&self) -> Box<dyn GroupAccumulator + '_> {
        Box::new(LastUpdateAccumulator {
            group: self,
            timestamps: RunningStatistics::new("app_timestamp"),
            months: DiscreteHistogram::new(),
        })
    }
}

struct LastUpdateAccumulator<'a> {
    group: &'a LastUpdateGroup,
    timestamps: RunningStatistics,
    months: DiscreteHistogram<String>,
}

impl GroupAccumulator for LastUpdateAccumulator<'_> {
    fn observe(&mut self, record: &Record) -> Result<(), StatsError> {
        let Some(date) = extract(record, &self.group.field)
            .as_ref()
            .and_then(ScalarValue::as_text)
            .and_then(parse_upload_date)
        else {
            return Ok(());
        };
        self.timestamps.push(unix_timestamp(date) as f64);
        self.months.add(month_key(date));
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<GroupOutput, StatsError> {
        let mean = self.timestamps.mean()?;
        Ok(GroupOutput::new()
            .stat("avg_app_timestamp", json!(mean))
            .with_artifact(self.group.context.artifact(
                "Number of apps distribution per last update time",
                "date of last update",
                "# apps",
                self.months.to_json(),
            )))
    }
}

// ---------------------------------------------------------------------------
// ratings

/// Which aggregate rating a [`RatingGroup`] reads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RatingKind {
    /// `aggregateRating.bayesianMeanRating`, also ranked.
    Bayesian,
    /// `aggregateRating.starRating`.
    Star,
}

impl RatingKind {
    fn group_name(self) -> &'static str {
        match self {
            RatingKind::Bayesian => "bayesian_rating",
            RatingKind::Star => "star_rating",
        }
    }

    fn artifact(self) -> &'static str {
        match self {
            RatingKind::Bayesian => "bayesian_ratings",
            RatingKind::Star => "star_ratings",
        }
    }

    fn label(self) -> &'static str {
        match self {
            RatingKind::Bayesian => "Bayesian rating",
            RatingKind::Star => "star rating",
        }
    }
}

fn rating_bins() -> Result<EdgeHistogram, StatsError> {
    EdgeHistogram::uniform(RATING_MIN, RATING_MAX, RATING_BINS, OutOfRange::Clamp)
}

/// Rating summary and 16-bin histogram over `[1, 5]`.
///
/// A zero or empty rating means "not rated" and is skipped.
pub struct RatingGroup {
    context: CatalogContext,
    kind: RatingKind,
    field: FieldPath,
    bins: EdgeHistogram,
}

impl RatingGroup {
    /// Bayesian mean rating group (includes `top_bayesian_rated_apps`).
    pub fn bayesian(context: CatalogContext) -> Result<Self, StatsError> {
        Ok(Self {
            context,
            kind: RatingKind::Bayesian,
            field: field(fields::BAYESIAN_RATING)?,
            bins: rating_bins()?,
        })
    }

    /// Star rating group.
    pub fn star(context: CatalogContext) -> Result<Self, StatsError> {
        Ok(Self {
            context,
            kind: RatingKind::Star,
            field: field(fields::STAR_RATING)?,
            bins: rating_bins()?,
        })
    }
}

impl GroupSpec for RatingGroup {
    fn name(&self) -> &str {
        self.kind.group_name()
    }

    fn required_keys(&self) -> Vec<StatKey> {
        let mut keys = Vec::new();
        if self.kind == RatingKind::Bayesian {
            keys.push("top_bayesian_rated_apps".to_string());
        }
        keys.extend(self.context.summary_keys(self.kind.group_name()));
        keys
    }

    fn artifact_path(&self) -> Option<PathBuf> {
        Some(self.context.artifact_path(self.kind.artifact()))
    }
}

impl StatisticGroup for RatingGroup {
    fn fields(&self) -> Vec<FieldPath> {
        vec![self.field.clone()]
    }

    fn accumulator(&self) -> Box<dyn GroupAccumulator + '_> {
        Box::new(RatingAccumulator {
            group: self,
            top: BoundedTopK::largest(self.context.top_k),
            stats: RunningStatistics::new(self.kind.group_name()),
            histogram: self.bins.clone(),
        })
    }
}

struct RatingAccumulator<'a> {
    group: &'a RatingGroup,
    top: BoundedTopK<Option<RecordId>, f64>,
    stats: RunningStatistics,
    histogram: EdgeHistogram,
}

impl GroupAccumulator for RatingAccumulator<'_> {
    fn observe(&mut self, record: &Record) -> Result<(), StatsError> {
        let Some(value) = extract(record, &self.group.field) else {
            return Ok(());
        };
        if value.is_blank() {
            return Ok(());
        }
        let Some(rating) = value.as_f64() else {
            return Ok(());
        };
        if self.group.kind == RatingKind::Bayesian {
            self.top.offer(record_id(record), rating);
        }
        self.stats.push(rating);
        self.histogram.add(rating);
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<GroupOutput, StatsError> {
        let Self {
            group,
            top,
            mut stats,
            histogram,
        } = *self;
        let kind = group.kind;
        let context = &group.context;
        let mut output = GroupOutput::new();
        if kind == RatingKind::Bayesian {
            output = output.stat("top_bayesian_rated_apps", ranking_json(top.into_pairs()));
        }
        let output = context.summarize(output, kind.group_name(), &mut stats)?;
        Ok(output.with_artifact(context.artifact(
            &format!("Number of apps distribution per {}", kind.label()),
            kind.label(),
            "# apps",
            histogram.to_json(),
        )))
    }
}

// ---------------------------------------------------------------------------
// permissions

/// Permission request counts, most/least requested permissions, and the apps
/// requesting the most permissions.
///
/// Only `android.permission.*` entries count (compared upper-cased). A record
/// without a permission list requests zero permissions.
pub struct PermissionsGroup {
    context: CatalogContext,
    field: FieldPath,
}

impl PermissionsGroup {
    /// Group reading `details.appDetails.permission`.
    pub fn new(context: CatalogContext) -> Result<Self, StatsError> {
        Ok(Self {
            context,
            field: field(fields::PERMISSIONS)?,
        })
    }
}

impl GroupSpec for PermissionsGroup {
    fn name(&self) -> &str {
        "permissions"
    }

    fn required_keys(&self) -> Vec<StatKey> {
        let mut keys = vec!["n_permissions".to_string()];
        keys.extend(self.context.summary_keys("permissions_per_app"));
        keys.extend([
            "most_requested_permissions".to_string(),
            "less_requested_permissions".to_string(),
            "top_permissions_requesters".to_string(),
        ]);
        keys
    }

    fn artifact_path(&self) -> Option<PathBuf> {
        Some(self.context.artifact_path("permissions_requests"))
    }
}

impl StatisticGroup for PermissionsGroup {
    fn fields(&self) -> Vec<FieldPath> {
        vec![self.field.clone()]
    }

    fn accumulator(&self) -> Box<dyn GroupAccumulator + '_> {
        Box::new(PermissionsAccumulator {
            group: self,
            apps: 0,
            per_app: RunningStatistics::new("permissions_per_app"),
            per_app_histogram: DiscreteHistogram::new(),
            requests: IndexMap::new(),
            requesters: BoundedTopK::largest(self.context.top_k),
        })
    }
}

struct PermissionsAccumulator<'a> {
    group: &'a PermissionsGroup,
    apps: u64,
    per_app: RunningStatistics,
    per_app_histogram: DiscreteHistogram<i64>,
    requests: IndexMap<String, u64>,
    requesters: BoundedTopK<Option<RecordId>, u64>,
}

impl GroupAccumulator for PermissionsAccumulator<'_> {
    fn observe(&mut self, record: &Record) -> Result<(), StatsError> {
        let requested: Vec<String> = extract_strings(record, &self.group.field)
            .unwrap_or_default()
            .into_iter()
            .map(str::to_uppercase)
            .filter(|permission| permission.starts_with(ANDROID_PERMISSION_PREFIX))
            .collect();
        let count = requested.len() as u64;
        self.apps += 1;
        self.per_app.push(count as f64);
        self.per_app_histogram.add(count as i64);
        self.requesters.offer(record_id(record), count);
        for permission in requested {
            *self.requests.entry(permission).or_insert(0) += 1;
        }
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<GroupOutput, StatsError> {
        let Self {
            group,
            apps,
            mut per_app,
            per_app_histogram,
            requests,
            requesters,
        } = *self;
        if apps == 0 {
            return Err(StatsError::empty("permissions"));
        }
        let context = &group.context;
        let share = |pairs: Vec<(String, u64)>| -> Value {
            ranking_json(
                pairs
                    .into_iter()
                    .map(|(permission, count)| (permission, count as f64 / apps as f64 * 100.0))
                    .collect(),
            )
        };

        let counts = || requests.iter().map(|(permission, count)| (permission.clone(), *count));
        let most = top_n(counts(), context.top_k);
        let mut least = BoundedTopK::smallest(context.top_k);
        for (permission, count) in counts() {
            least.offer(permission, count);
        }

        let mut output = GroupOutput::new().stat("n_permissions", json!(requests.len()));
        output = context.summarize(output, "permissions_per_app", &mut per_app)?;
        output = output
            .stat("most_requested_permissions", share(most))
            .stat("less_requested_permissions", share(least.into_pairs()))
            .stat(
                "top_permissions_requesters",
                ranking_json(requesters.into_pairs()),
            );
        Ok(output.with_artifact(context.artifact(
            "Number of apps distribution per number of permissions requested",
            "# permissions requested",
            "# apps",
            dense_json(&per_app_histogram),
        )))
    }
}

// ---------------------------------------------------------------------------
// creators

/// Publisher counts, most prolific publishers, and apps-per-publisher
/// distribution (the histogram leaves out the top-K publishers).
pub struct CreatorsGroup {
    context: CatalogContext,
    field: FieldPath,
}

impl CreatorsGroup {
    /// Group reading `creator`.
    pub fn new(context: CatalogContext) -> Result<Self, StatsError> {
        Ok(Self {
            context,
            field: field(fields::CREATOR)?,
        })
    }
}

impl GroupSpec for CreatorsGroup {
    fn name(&self) -> &str {
        "creators"
    }

    fn required_keys(&self) -> Vec<StatKey> {
        let mut keys = vec![
            "n_apps".to_string(),
            "n_creators".to_string(),
            "most_prolific_creators".to_string(),
        ];
        keys.extend(self.context.summary_keys("apps_per_creator"));
        keys
    }

    fn artifact_path(&self) -> Option<PathBuf> {
        Some(self.context.artifact_path("creators_productivity"))
    }
}

impl StatisticGroup for CreatorsGroup {
    fn fields(&self) -> Vec<FieldPath> {
        vec![self.field.clone()]
    }

    fn accumulator(&self) -> Box<dyn GroupAccumulator + '_> {
        Box::new(CreatorsAccumulator {
            group: self,
            apps: 0,
            apps_per_creator: IndexMap::new(),
        })
    }
}

struct CreatorsAccumulator<'a> {
    group: &'a CreatorsGroup,
    apps: u64,
    apps_per_creator: IndexMap<String, u64>,
}

impl GroupAccumulator for CreatorsAccumulator<'_> {
    fn observe(&mut self, record: &Record) -> Result<(), StatsError> {
        self.apps += 1;
        if let Some(ScalarValue::Text(creator)) = extract(record, &self.group.field) {
            *self.apps_per_creator.entry(creator).or_insert(0) += 1;
        }
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<GroupOutput, StatsError> {
        let context = &self.group.context;
        let mut productivity = RunningStatistics::new("apps_per_creator");
        for count in self.apps_per_creator.values() {
            productivity.push(*count as f64);
        }

        let mut prolific = BoundedTopK::largest(context.top_k);
        for (creator, count) in &self.apps_per_creator {
            prolific.offer(creator.clone(), *count);
        }
        let prolific = prolific.into_pairs();

        let mut histogram = DiscreteHistogram::new();
        for (creator, count) in &self.apps_per_creator {
            if prolific.iter().any(|(top, _)| top == creator) {
                continue;
            }
            histogram.add(*count as i64);
        }

        let output = GroupOutput::new()
            .stat("n_apps", json!(self.apps))
            .stat("n_creators", json!(self.apps_per_creator.len()))
            .stat("most_prolific_creators", ranking_json(prolific));
        let output = context.summarize(output, "apps_per_creator", &mut productivity)?;
        Ok(output.with_artifact(context.artifact(
            &format!(
                "Number of developers distribution per number of apps released\n(excluding top {} most prolific developers)",
                context.top_k
            ),
            "# apps released",
            "# developers",
            dense_json(&histogram),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::InMemorySource;
    use tempfile::tempdir;

    fn context(prefix: PathBuf) -> CatalogContext {
        CatalogContext::from_config(&StatsConfig::new(prefix).with_top_k(2))
    }

    fn feed(group: &dyn StatisticGroup, records: &[Record]) -> Result<GroupOutput, StatsError> {
        let mut accumulator = group.accumulator();
        for record in records {
            accumulator.observe(record)?;
        }
        accumulator.finish()
    }

    fn record(value: Value) -> Record {
        Record::new(value)
    }

    #[test]
    fn percentile_keys_drop_integral_fraction() {
        assert_eq!(percentile_key(95.0, "app_size"), "95perc_app_size");
        assert_eq!(percentile_key(97.5, "app_size"), "97.5perc_app_size");
    }

    #[test]
    fn download_labels_parse_to_lower_bounds() {
        assert_eq!(
            download_lower_bound(&ScalarValue::Text("1,000,000+".into())),
            Some(1_000_000)
        );
        assert_eq!(download_lower_bound(&ScalarValue::Text("50+".into())), Some(50));
        assert_eq!(download_lower_bound(&ScalarValue::Number(10.0)), Some(10));
        assert_eq!(download_lower_bound(&ScalarValue::Text("many".into())), None);
    }

    #[test]
    fn app_size_group_ranks_and_summarizes() {
        let temp = tempdir().unwrap();
        let group = AppSizeGroup::new(context(temp.path().join("store"))).unwrap();
        let records: Vec<Record> = [("a", 10), ("b", 5), ("c", 20), ("d", 1), ("e", 15)]
            .into_iter()
            .map(|(id, size)| {
                record(json!({"docid": id, "details": {"appDetails": {"file": [{"size": size}]}}}))
            })
            .chain([record(json!({"docid": "no-file"}))])
            .collect();
        let output = feed(&group, &records).unwrap();
        assert_eq!(output.statistics["biggest_apps"], json!([["c", 20], ["e", 15]]));
        assert_eq!(output.statistics["smallest_apps"], json!([["d", 1], ["b", 5]]));
        let mean = output.statistics["avg_app_size"].as_f64().unwrap();
        assert!((mean - 10.2).abs() < 1e-9);
        let artifact = output.artifact.unwrap();
        let total: u64 = artifact["buckets"]
            .as_array()
            .unwrap()
            .iter()
            .map(|bucket| bucket[1].as_u64().unwrap())
            .sum();
        assert_eq!(total, 5);
        assert_eq!(artifact["title"], json!("Play Store\nNumber of apps distribution per app size"));
    }

    #[test]
    fn zero_ratings_count_as_not_rated() {
        let temp = tempdir().unwrap();
        let group = RatingGroup::bayesian(context(temp.path().join("store"))).unwrap();
        let records = vec![
            record(json!({"docid": "a", "aggregateRating": {"bayesianMeanRating": 4.0}})),
            record(json!({"docid": "b", "aggregateRating": {"bayesianMeanRating": 0}})),
            record(json!({"docid": "c", "aggregateRating": {"bayesianMeanRating": 2.0}})),
        ];
        let output = feed(&group, &records).unwrap();
        assert_eq!(output.statistics["avg_bayesian_rating"], json!(3.0));
        assert_eq!(
            output.statistics["top_bayesian_rated_apps"],
            json!([["a", 4.0], ["c", 2.0]])
        );
    }

    #[test]
    fn every_pass_starts_from_empty_rating_bins() {
        let temp = tempdir().unwrap();
        let group = RatingGroup::star(context(temp.path().join("store"))).unwrap();
        let rated = record(json!({"docid": "a", "aggregateRating": {"starRating": 4.5}}));
        feed(&group, &[rated.clone(), rated.clone()]).unwrap();
        let output = feed(&group, &[rated]).unwrap();
        let buckets = output.artifact.unwrap()["buckets"].as_array().unwrap().clone();
        assert_eq!(buckets.len(), RATING_BINS);
        let total: u64 = buckets.iter().map(|bucket| bucket[1].as_u64().unwrap()).sum();
        assert_eq!(total, 1);
    }

    #[test]
    fn star_rating_group_fails_on_unrated_catalog() {
        let temp = tempdir().unwrap();
        let group = RatingGroup::star(context(temp.path().join("store"))).unwrap();
        let err = feed(&group, &[record(json!({"docid": "a"}))]).unwrap_err();
        assert!(matches!(err, StatsError::EmptyInput { .. }));
    }

    #[test]
    fn permissions_group_counts_android_permissions_only() {
        let temp = tempdir().unwrap();
        let group = PermissionsGroup::new(context(temp.path().join("store"))).unwrap();
        let permissions = |list: Value| json!({"details": {"appDetails": {"permission": list}}});
        let mut a = permissions(json!(["android.permission.INTERNET", "com.vendor.CUSTOM"]));
        a["docid"] = json!("a");
        let mut b = permissions(json!([
            "android.permission.INTERNET",
            "android.permission.CAMERA",
        ]));
        b["docid"] = json!("b");
        let records = vec![record(a), record(b), record(json!({"docid": "c"}))];
        let output = feed(&group, &records).unwrap();
        assert_eq!(output.statistics["n_permissions"], json!(2));
        assert_eq!(output.statistics["avg_permissions_per_app"], json!(1.0));
        assert_eq!(
            output.statistics["most_requested_permissions"][0],
            json!(["ANDROID.PERMISSION.INTERNET", 2.0 / 3.0 * 100.0])
        );
        assert_eq!(
            output.statistics["less_requested_permissions"][0],
            json!(["ANDROID.PERMISSION.CAMERA", 1.0 / 3.0 * 100.0])
        );
        assert_eq!(
            output.statistics["top_permissions_requesters"],
            json!([["b", 2], ["a", 1]])
        );
        assert_eq!(
            output.artifact.unwrap()["buckets"],
            json!([[-1, 0], [0, 1], [1, 1], [2, 1], [3, 0]])
        );
    }

    #[test]
    fn creators_histogram_excludes_top_creators() {
        let temp = tempdir().unwrap();
        let group = CreatorsGroup::new(context(temp.path().join("store"))).unwrap();
        let records: Vec<Record> = ["x", "x", "x", "y", "y", "z", "w"]
            .into_iter()
            .map(|creator| record(json!({ "creator": creator })))
            .collect();
        let output = feed(&group, &records).unwrap();
        assert_eq!(output.statistics["n_apps"], json!(7));
        assert_eq!(output.statistics["n_creators"], json!(4));
        assert_eq!(output.statistics["most_prolific_creators"], json!([["x", 3], ["y", 2]]));
        assert_eq!(
            output.artifact.unwrap()["buckets"],
            json!([[0, 0], [1, 2], [2, 0]])
        );
    }

    #[test]
    fn full_report_writes_cache_and_artifacts() {
        let temp = tempdir().unwrap();
        let prefix = temp.path().join("store");
        let source = InMemorySource::new(
            "mem",
            vec![record(json!({
                "docid": "com.a",
                "creator": "Acme",
                "details": {"appDetails": {
                    "numDownloads": "1,000+",
                    "file": [{"size": 2048}],
                    "uploadDate": "10 Aug 2017",
                    "permission": ["android.permission.INTERNET"]
                }},
                "aggregateRating": {"bayesianMeanRating": 4.2, "starRating": 4.5}
            }))],
        );
        let report = compute_catalog_statistics(&source, &StatsConfig::new(&prefix)).unwrap();
        assert!(report.is_success(), "{:?}", report);
        assert_eq!(report.passes, 1);
        assert!(suffixed(&prefix, ".db_statistics.json").is_file());
        for artifact in [
            "downloads",
            "apps_size",
            "app_last_updates",
            "bayesian_ratings",
            "star_ratings",
            "permissions_requests",
            "creators_productivity",
        ] {
            assert!(
                suffixed(&prefix, &format!(".{artifact}.histogram.json")).is_file(),
                "missing {artifact}"
            );
        }
    }
}
