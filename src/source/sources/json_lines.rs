use std::path::PathBuf;

use tracing::{debug, warn};

use crate::config::SourceConfig;
use crate::constants::source::{ID_FIELD, SKIP_UNREADABLE_MSG};
use crate::data::Record;
use crate::errors::StatsError;
use crate::extract::{FieldPath, project};
use crate::source::{PackageFilter, RecordSource, RecordStream};
use crate::transport::fs::{LineFile, is_transient_io};
use crate::types::SourceId;

/// Record source backed by a JSON-lines catalog dump (one document per line).
///
/// Lines that are not valid JSON objects are skipped with a warning; they are
/// unreadable data, not a source failure. IO failures while reading are
/// reported as transient so the retry boundary can reopen the traversal.
pub struct JsonLinesSource {
    source_id: SourceId,
    file: LineFile,
}

impl JsonLinesSource {
    /// Source reading `path`, identified by `source_id`.
    pub fn new(source_id: impl Into<SourceId>, path: impl Into<PathBuf>) -> Self {
        Self {
            source_id: source_id.into(),
            file: LineFile::new(path),
        }
    }

    /// Build from a [`SourceConfig`].
    pub fn from_config(config: &SourceConfig) -> Self {
        Self::new(config.source_id.clone(), config.records_path.clone())
    }

    fn open(
        &self,
        filter: Option<&PackageFilter>,
        fields: Option<Vec<FieldPath>>,
    ) -> Result<RecordStream<'_>, StatsError> {
        let lines = self.file.lines().map_err(|err| self.open_error(err))?;
        debug!(
            "[appstats:source] opened {} for '{}'",
            self.file.path().display(),
            self.source_id
        );
        let filter = filter.cloned();
        let source_id = self.source_id.clone();
        let path = self.file.path().display().to_string();
        Ok(Box::new(lines.filter_map(move |line| {
            let line = match line {
                Ok(line) => line,
                Err(err) => {
                    return Some(Err(StatsError::TransientSource {
                        source_id: source_id.clone(),
                        reason: format!("read failed in {path}: {err}"),
                    }));
                }
            };
            let value = match serde_json::from_str::<serde_json::Value>(&line.text) {
                Ok(value) if value.is_object() => value,
                Ok(_) | Err(_) => {
                    warn!(
                        "[appstats:source] {} ({}:{})",
                        SKIP_UNREADABLE_MSG, path, line.number
                    );
                    return None;
                }
            };
            let record = Record::new(value);
            if let Some(filter) = &filter
                && !filter.matches(&record)
            {
                return None;
            }
            Some(Ok(match &fields {
                Some(fields) => project(&record, fields),
                None => record,
            }))
        })))
    }

    fn open_error(&self, err: std::io::Error) -> StatsError {
        let reason = format!("failed opening {}: {err}", self.file.path().display());
        if is_transient_io(&err) {
            StatsError::TransientSource {
                source_id: self.source_id.clone(),
                reason,
            }
        } else {
            StatsError::SourceUnavailable {
                source_id: self.source_id.clone(),
                reason,
            }
        }
    }
}

impl RecordSource for JsonLinesSource {
    fn id(&self) -> &str {
        &self.source_id
    }

    fn fetch_all(&self, filter: Option<&PackageFilter>) -> Result<RecordStream<'_>, StatsError> {
        self.open(filter, None)
    }

    fn fetch_projected(
        &self,
        filter: Option<&PackageFilter>,
        fields: &[FieldPath],
    ) -> Result<RecordStream<'_>, StatsError> {
        if fields.is_empty() {
            return self.open(filter, None);
        }
        let mut fields = fields.to_vec();
        // Filtering and labels need the id even when no group asked for it.
        fields.push(FieldPath::parse(ID_FIELD)?);
        self.open(filter, Some(fields))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::extract_f64;
    use std::fs;
    use tempfile::tempdir;

    fn write_dump(dir: &std::path::Path) -> PathBuf {
        let path = dir.join("records.jsonl");
        fs::write(
            &path,
            concat!(
                "{\"docid\": \"com.a\", \"details\": {\"appDetails\": {\"file\": [{\"size\": 10}]}}, \"creator\": \"A\"}\n",
                "not json at all\n",
                "[1, 2]\n",
                "\n",
                "{\"docid\": \"com.b\", \"creator\": \"B\"}\n",
            ),
        )
        .unwrap();
        path
    }

    #[test]
    fn unreadable_lines_are_skipped() {
        let temp = tempdir().unwrap();
        let source = JsonLinesSource::new("dump", write_dump(temp.path()));
        let ids: Vec<String> = source
            .fetch_all(None)
            .unwrap()
            .map(|record| record.unwrap().id().unwrap().to_string())
            .collect();
        assert_eq!(ids, vec!["com.a", "com.b"]);
        assert_eq!(source.count(None).unwrap(), 2);
    }

    #[test]
    fn filter_and_projection_apply_per_line() {
        let temp = tempdir().unwrap();
        let source = JsonLinesSource::new("dump", write_dump(temp.path()));
        let size = FieldPath::parse("details.appDetails.file.0.size").unwrap();
        let filter = PackageFilter::new(["com.a"]);
        let records: Vec<Record> = source
            .fetch_projected(Some(&filter), std::slice::from_ref(&size))
            .unwrap()
            .map(Result::unwrap)
            .collect();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id(), Some("com.a"));
        assert_eq!(extract_f64(&records[0], &size), Some(10.0));
        assert!(records[0].as_value().get("creator").is_none());
    }

    #[test]
    fn missing_dump_is_unavailable() {
        let temp = tempdir().unwrap();
        let source = JsonLinesSource::new("dump", temp.path().join("missing.jsonl"));
        let err = source.fetch_all(None).err().unwrap();
        assert!(matches!(err, StatsError::SourceUnavailable { .. }));
    }
}
