/// Constants used by the statistics cache and artifact layout.
pub mod cache {
    /// Suffix appended to a report prefix to form the catalog cache document path.
    pub const CATALOG_CACHE_SUFFIX: &str = ".db_statistics.json";
    /// Suffix appended to a graph name to form the graph cache document path.
    pub const GRAPH_CACHE_SUFFIX: &str = "_statistics.json";
    /// Suffix appended to `<prefix>.<artifact>` for histogram artifacts.
    pub const HISTOGRAM_ARTIFACT_SUFFIX: &str = ".histogram.json";
    /// Extension used for the temporary file written before an atomic replace.
    pub const TEMP_EXTENSION: &str = "tmp";
}

/// Constants used by record sources.
pub mod source {
    /// Attempts made before a transient source failure becomes terminal.
    pub const RETRY_ATTEMPTS: usize = 5;
    /// Fixed delay between retry attempts, in milliseconds.
    pub const RETRY_DELAY_MS: u64 = 1_000;
    /// Record field holding the package id.
    pub const ID_FIELD: &str = "docid";
    /// Default source id for JSON-lines record files.
    pub const DEFAULT_SOURCE_ID: &str = "playstore_snapshot";
    /// Log message used when unreadable records are skipped.
    pub const SKIP_UNREADABLE_MSG: &str = "skipping unreadable record line";
}

/// Constants used by the orchestrator and statistic groups.
pub mod stats {
    /// Default bounded ranking size for catalog statistics.
    pub const DEFAULT_TOP_K: usize = 10;
    /// Default bounded ranking size for graph centrality rankings.
    pub const DEFAULT_GRAPH_TOP_N: usize = 20;
    /// Default percentiles reported next to mean and standard deviation.
    pub const DEFAULT_PERCENTILES: [f64; 2] = [95.0, 99.0];
    /// Records between two progress log lines during a pass.
    pub const PROGRESS_EVERY: u64 = 10_000;
    /// Default report title used for artifact labels.
    pub const DEFAULT_TITLE: &str = "Play Store";
}

/// Record field paths read by the catalog statistic groups.
pub mod fields {
    /// Download bucket label, e.g. `1,000+`.
    pub const NUM_DOWNLOADS: &str = "details.appDetails.numDownloads";
    /// Size in bytes of the first delivered file.
    pub const FILE_SIZE: &str = "details.appDetails.file.0.size";
    /// Last upload date, e.g. `10 Aug 2017`.
    pub const UPLOAD_DATE: &str = "details.appDetails.uploadDate";
    /// Bayesian mean rating.
    pub const BAYESIAN_RATING: &str = "aggregateRating.bayesianMeanRating";
    /// Star rating.
    pub const STAR_RATING: &str = "aggregateRating.starRating";
    /// Requested permission list.
    pub const PERMISSIONS: &str = "details.appDetails.permission";
    /// Publisher name.
    pub const CREATOR: &str = "creator";
    /// Similar-app package ids used to build the graph.
    pub const SIMILAR_TO: &str = "similarTo";
}

/// Histogram layouts used by the catalog statistic groups.
pub mod histogram {
    /// App size bin edges in bytes.
    pub const APP_SIZE_EDGES: [f64; 14] = [
        1e3, 5e3, 1e4, 5e4, 1e5, 5e5, 1e6, 5e6, 1e7, 5e7, 1e8, 5e8, 1e9, 5e9,
    ];
    /// Lower rating bound shared by Bayesian and star ratings.
    pub const RATING_MIN: f64 = 1.0;
    /// Upper rating bound shared by Bayesian and star ratings.
    pub const RATING_MAX: f64 = 5.0;
    /// Number of uniform rating bins.
    pub const RATING_BINS: usize = 16;
}

/// Constants used by the permission statistics.
pub mod permissions {
    /// Only permissions in this namespace are counted (compared upper-cased).
    pub const ANDROID_PERMISSION_PREFIX: &str = "ANDROID.PERMISSION";
}

/// Constants used by graph build and graph statistics.
pub mod graph {
    /// Suffix of the serialized graph file.
    pub const GRAPH_SUFFIX: &str = ".graph.json";
    /// Suffix of the tab-separated edge list.
    pub const EDGE_LIST_SUFFIX: &str = ".edgelist.txt";
    /// Suffix of the package-to-node-id dictionary.
    pub const LABEL_DICT_SUFFIX: &str = ".pkg_to_id_dict.json";
    /// Header written at the top of edge lists.
    pub const EDGE_LIST_HEADER: &str = "Play Store similarity graph";
    /// Metric name of PageRank score tables.
    pub const METRIC_PAGERANK: &str = "pageranks";
    /// Metric name of node betweenness score tables.
    pub const METRIC_BETWEENNESS: &str = "node_betweenness";
    /// Metric name of HITS hub score tables.
    pub const METRIC_HITS_HUBS: &str = "hits_hubs";
    /// Metric name of HITS authority score tables.
    pub const METRIC_HITS_AUTHORITIES: &str = "hits_auth";
    /// Metric name of in-degree tables served natively.
    pub const METRIC_IN_DEGREE: &str = "in_degree";
    /// Metric name of out-degree tables served natively.
    pub const METRIC_OUT_DEGREE: &str = "out_degree";
    /// Title prefix of graph histogram artifacts.
    pub const GRAPH_PLOT_TITLE: &str = "Play Store Graph";
    /// Default number of BFS sources sampled for the hop distribution.
    pub const DEFAULT_HOP_SOURCES: usize = 1_000;
    /// Share of reachable pairs covered by the effective diameter.
    pub const EFFECTIVE_DIAMETER_QUANTILE: f64 = 0.9;
}
