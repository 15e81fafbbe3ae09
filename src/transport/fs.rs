use std::fs::File;
use std::io::{self, BufRead, BufReader, ErrorKind};
use std::path::{Path, PathBuf};

/// Filesystem transport that streams non-blank lines from a dump file.
///
/// Every call to [`LineFile::lines`] reopens the file, so each traversal starts
/// from the first line and sees lines in file order.
#[derive(Clone, Debug)]
pub struct LineFile {
    path: PathBuf,
}

/// One non-blank line and its 1-based position in the file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NumberedLine {
    /// 1-based line number.
    pub number: usize,
    /// Line content without the trailing newline.
    pub text: String,
}

impl LineFile {
    /// Transport reading from `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the underlying file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True if the file currently exists.
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Open a fresh line iterator. Blank lines are skipped.
    pub fn lines(&self) -> io::Result<impl Iterator<Item = io::Result<NumberedLine>> + use<>> {
        let reader = BufReader::new(File::open(&self.path)?);
        Ok(reader
            .lines()
            .enumerate()
            .filter_map(|(idx, line)| match line {
                Ok(text) if text.trim().is_empty() => None,
                Ok(text) => Some(Ok(NumberedLine {
                    number: idx + 1,
                    text,
                })),
                Err(err) => Some(Err(err)),
            }))
    }
}

/// True for IO failures worth retrying (interruptions, timeouts, resets).
pub fn is_transient_io(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::Interrupted
            | ErrorKind::TimedOut
            | ErrorKind::WouldBlock
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
    )
}
