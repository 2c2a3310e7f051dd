//! Local persistence of fetched datasets
//!
//! `DataSaver` decides where files go; `DatasetWriter` implementations decide
//! how a dataset becomes bytes on disk.

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::{OutputEncoding, Period, TradeDataset, TradeQuery, TradeRecord};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error on {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("could not encode {path}: {reason}")]
    Encoding { path: PathBuf, reason: String },
}

impl StorageError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        StorageError::Io { path: path.to_path_buf(), source }
    }

    fn csv(path: &Path, source: csv::Error) -> Self {
        StorageError::Csv { path: path.to_path_buf(), source }
    }
}

/// The filesystem capability
pub trait DatasetWriter: Send + Sync {
    fn write(&self, path: &Path, dataset: &TradeDataset) -> Result<(), StorageError>;
}

/// Writes datasets as CSV with the provider's column captions as header
#[derive(Debug, Clone, Default)]
pub struct CsvDatasetWriter {
    encoding: OutputEncoding,
}

impl CsvDatasetWriter {
    /// GBK output, readable by Excel on a Chinese locale
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_encoding(encoding: OutputEncoding) -> Self {
        Self { encoding }
    }

    pub fn encoding(&self) -> OutputEncoding {
        self.encoding
    }

    /// Render the dataset as CSV text, then encode it
    fn render(&self, path: &Path, dataset: &TradeDataset) -> Result<Vec<u8>, StorageError> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::new());

        // Header goes out explicitly so empty datasets still get one
        writer
            .write_record(TradeRecord::COLUMNS)
            .map_err(|e| StorageError::csv(path, e))?;
        for record in &dataset.records {
            writer.serialize(record).map_err(|e| StorageError::csv(path, e))?;
        }

        let utf8 = writer
            .into_inner()
            .map_err(|e| StorageError::io(path, e.into_error()))?;
        if self.encoding == OutputEncoding::Utf8 {
            return Ok(utf8);
        }

        let text = String::from_utf8(utf8).map_err(|e| StorageError::Encoding {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let (bytes, _, unmappable) = self.encoding.encoding().encode(&text);
        if unmappable {
            warn!("⚠️ {}: characters without a {} mapping were escaped", path.display(), self.encoding);
        }
        Ok(bytes.into_owned())
    }
}

impl DatasetWriter for CsvDatasetWriter {
    /// Write through a sibling temp file so a failure never leaves a truncated CSV
    fn write(&self, path: &Path, dataset: &TradeDataset) -> Result<(), StorageError> {
        let bytes = self.render(path, dataset)?;

        let mut tmp_name = path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        if let Err(e) = fs::write(&tmp_path, &bytes) {
            fs::remove_file(&tmp_path).ok();
            return Err(StorageError::io(&tmp_path, e));
        }

        fs::rename(&tmp_path, path).map_err(|e| {
            fs::remove_file(&tmp_path).ok();
            StorageError::io(path, e)
        })?;

        debug!("Wrote {} records ({}) to {}", dataset.len(), self.encoding, path.display());
        Ok(())
    }
}

/// Root-relative layout of saved data
#[derive(Debug, Clone)]
pub struct DataSaver {
    root: PathBuf,
}

impl Default for DataSaver {
    fn default() -> Self {
        Self::new(std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
    }
}

impl DataSaver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn reset_root(&mut self, root: impl Into<PathBuf>) {
        self.root = root.into();
    }

    /// `<root>/data/stock/trade/<period>`
    pub fn trade_dir(&self, period: Period) -> PathBuf {
        self.root
            .join("data")
            .join("stock")
            .join("trade")
            .join(period.as_str())
    }

    /// `<symbol>_<start>_<end>.csv`
    pub fn trade_file_name(symbol: &str, query: &TradeQuery) -> String {
        format!("{}_{}_{}.csv", symbol, query.start_compact(), query.end_compact())
    }

    pub fn ensure_dir(dir: &Path) -> Result<(), StorageError> {
        fs::create_dir_all(dir).map_err(|e| StorageError::io(dir, e))
    }
}
