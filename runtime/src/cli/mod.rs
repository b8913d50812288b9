//! CLI subcommand implementations for the catalog binary.

pub mod extract_cmd;
pub mod learn_cmd;
pub mod output;
pub mod progress;
pub mod scan_cmd;
