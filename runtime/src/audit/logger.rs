//! JSONL product log: one line per extracted product, then one summary line.

use crate::pipeline::report::RunReport;
use crate::types::ExtractedProduct;
use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Receives the final output of a run.
pub trait ProductSink {
    fn persist(&mut self, products: &[ExtractedProduct], report: &RunReport) -> Result<()>;
}

/// One line of the log.
#[derive(Debug, Serialize)]
#[serde(tag = "record", rename_all = "snake_case")]
enum LogLine<'a> {
    Product {
        run_id: Uuid,
        #[serde(flatten)]
        product: &'a ExtractedProduct,
    },
    Summary {
        written_at: String,
        #[serde(flatten)]
        report: &'a RunReport,
    },
}

/// Append-only JSONL product log.
pub struct ProductLog {
    path: PathBuf,
    file: BufWriter<File>,
}

impl ProductLog {
    /// Open or create the log file, creating parent directories.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open product log: {}", path.display()))?;

        Ok(Self {
            path: path.to_path_buf(),
            file: BufWriter::new(file),
        })
    }

    /// `~/.catalog/runs/<run_id>.jsonl`
    pub fn default_path(run_id: Uuid) -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join(".catalog")
            .join("runs")
            .join(format!("{run_id}.jsonl"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_line(&mut self, line: &LogLine<'_>) -> Result<()> {
        let json = serde_json::to_string(line)?;
        writeln!(self.file, "{json}")?;
        Ok(())
    }
}

impl ProductSink for ProductLog {
    fn persist(&mut self, products: &[ExtractedProduct], report: &RunReport) -> Result<()> {
        for product in products {
            self.write_line(&LogLine::Product {
                run_id: report.run_id,
                product,
            })?;
        }
        self.write_line(&LogLine::Summary {
            written_at: Utc::now().to_rfc3339(),
            report,
        })?;
        self.file
            .flush()
            .with_context(|| format!("failed to flush {}", self.path.display()))?;
        Ok(())
    }
}
