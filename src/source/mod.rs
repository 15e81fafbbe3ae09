//! Record source interfaces and the retry boundary.
//!
//! Ownership model:
//! - `RecordSource` is the orchestrator-facing interface that opens one
//!   read-only traversal (a "pass") over the catalog.
//! - `RetryingSource` wraps any source with the bounded fixed-delay retry
//!   policy; exhausting it turns a transient failure into a terminal one.
//! - `InMemorySource` serves tests and small fixtures.
//!
//! Streams are consumed by a single cursor in iteration order. Retries apply to
//! opening a traversal; an error yielded mid-stream aborts the pass, since a
//! cursor cannot be resumed at the same position.

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::warn;

use crate::constants::source::{RETRY_ATTEMPTS, RETRY_DELAY_MS};
use crate::data::Record;
use crate::errors::StatsError;
use crate::extract::FieldPath;
use crate::types::{RecordId, SourceId};

/// Source implementation modules.
pub mod sources;

pub use sources::json_lines::JsonLinesSource;

/// One traversal over the records of a source.
pub type RecordStream<'a> = Box<dyn Iterator<Item = Result<Record, StatsError>> + 'a>;

/// Optional package-id restriction applied by sources.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PackageFilter {
    ids: HashSet<RecordId>,
}

impl PackageFilter {
    /// Restrict to the given package ids.
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<RecordId>,
    {
        Self {
            ids: ids.into_iter().map(Into::into).collect(),
        }
    }

    /// True when `record`'s package id is part of the filter.
    pub fn matches(&self, record: &Record) -> bool {
        record.id().is_some_and(|id| self.ids.contains(id))
    }

    /// Number of ids in the filter.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// True for an empty filter (which matches nothing).
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Orchestrator-facing record source.
///
/// For a fixed dataset state, every call should yield records in the same
/// order; top-K tie-breaks depend on it.
pub trait RecordSource: Send + Sync {
    /// Stable source identifier used in logs and errors.
    fn id(&self) -> &str;

    /// Open a traversal over all records, optionally restricted to `filter`.
    fn fetch_all(&self, filter: Option<&PackageFilter>) -> Result<RecordStream<'_>, StatsError>;

    /// Open a traversal that only needs `fields`.
    ///
    /// Sources able to project server-side should override this; the default
    /// returns full records, which callers must tolerate.
    fn fetch_projected(
        &self,
        filter: Option<&PackageFilter>,
        _fields: &[FieldPath],
    ) -> Result<RecordStream<'_>, StatsError> {
        self.fetch_all(filter)
    }

    /// Number of records matching `filter`.
    fn count(&self, filter: Option<&PackageFilter>) -> Result<u64, StatsError> {
        let mut total = 0u64;
        for record in self.fetch_all(filter)? {
            record?;
            total += 1;
        }
        Ok(total)
    }
}

/// Bounded, fixed-delay retry policy for transient source failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub attempts: usize,
    /// Delay between attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: RETRY_ATTEMPTS,
            delay: Duration::from_millis(RETRY_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    /// Policy with `attempts` tries spaced by `delay`.
    pub fn new(attempts: usize, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }

    /// Run `op`, retrying transient failures until attempts run out.
    ///
    /// Non-transient errors are returned immediately. An exhausted policy
    /// reports `SourceUnavailable`, which callers treat as terminal.
    pub fn run<T, F>(&self, source_id: &str, operation: &str, mut op: F) -> Result<T, StatsError>
    where
        F: FnMut() -> Result<T, StatsError>,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < attempts => {
                    warn!(
                        "[appstats:source] {} on '{}' failed (attempt {}/{}), retrying in {:?}: {}",
                        operation, source_id, attempt, attempts, self.delay, err
                    );
                    if !self.delay.is_zero() {
                        thread::sleep(self.delay);
                    }
                    attempt += 1;
                }
                Err(err) if err.is_transient() => {
                    return Err(StatsError::SourceUnavailable {
                        source_id: source_id.to_string(),
                        reason: format!("{operation} gave up after {attempts} attempts: {err}"),
                    });
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Wraps a source so every traversal open goes through a [`RetryPolicy`].
pub struct RetryingSource<S: RecordSource> {
    inner: S,
    policy: RetryPolicy,
}

impl<S: RecordSource> RetryingSource<S> {
    /// Wrap `inner` with `policy`.
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    /// Borrow the wrapped source.
    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S: RecordSource> RecordSource for RetryingSource<S> {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn fetch_all(&self, filter: Option<&PackageFilter>) -> Result<RecordStream<'_>, StatsError> {
        self.policy
            .run(self.inner.id(), "fetch_all", || self.inner.fetch_all(filter))
    }

    fn fetch_projected(
        &self,
        filter: Option<&PackageFilter>,
        fields: &[FieldPath],
    ) -> Result<RecordStream<'_>, StatsError> {
        self.policy.run(self.inner.id(), "fetch_projected", || {
            self.inner.fetch_projected(filter, fields)
        })
    }

    fn count(&self, filter: Option<&PackageFilter>) -> Result<u64, StatsError> {
        self.policy
            .run(self.inner.id(), "count", || self.inner.count(filter))
    }
}

/// In-memory record source for tests and small datasets.
pub struct InMemorySource {
    id: SourceId,
    records: Arc<Vec<Record>>,
}

impl InMemorySource {
    /// Create an in-memory source from prebuilt records.
    pub fn new(id: impl Into<SourceId>, records: Vec<Record>) -> Self {
        Self {
            id: id.into(),
            records: Arc::new(records),
        }
    }
}

impl RecordSource for InMemorySource {
    fn id(&self) -> &str {
        &self.id
    }

    fn fetch_all(&self, filter: Option<&PackageFilter>) -> Result<RecordStream<'_>, StatsError> {
        let filter = filter.cloned();
        Ok(Box::new(
            self.records
                .iter()
                .filter(move |record| filter.as_ref().is_none_or(|f| f.matches(record)))
                .cloned()
                .map(Ok),
        ))
    }

    fn count(&self, filter: Option<&PackageFilter>) -> Result<u64, StatsError> {
        Ok(match filter {
            Some(filter) => self.records.iter().filter(|r| filter.matches(r)).count() as u64,
            None => self.records.len() as u64,
        })
    }
}
