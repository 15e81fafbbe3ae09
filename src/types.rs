/// Unique record identifier (the catalog package id).
/// Example: `com.example.notes`
pub type RecordId = String;
/// Identifier for the record source that produced a stream.
/// Examples: `playstore_snapshot`, `fixtures`
pub type SourceId = String;
/// Name of one persisted statistic inside a cache document.
/// Examples: `avg_app_size`, `top_n_pagerank`
pub type StatKey = String;
/// Name of a statistic group (one freshness decision, one artifact).
/// Examples: `app_size`, `permissions`, `hits`
pub type GroupName = String;
/// Dense node identifier assigned by a graph build.
pub type NodeId = u64;
/// Human-readable node or entry label.
/// Example: `com.example.notes`
pub type Label = String;
/// Name of a centrality metric served by a score provider.
/// Examples: `pageranks`, `hits_hubs`, `in_degree`
pub type MetricName = String;
