/// JSON-lines file-backed record source.
pub mod json_lines;
