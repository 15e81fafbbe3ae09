/// Filesystem transport for line-delimited record dumps.
pub mod fs;
