//! Batch retrieval of trading history with per-symbol failure isolation
//!
//! Every symbol gets exactly one fetch and, on success, exactly one file. A
//! failing symbol is recorded and the batch moves on; the caller gets back
//! the failed codes in input order so it can re-run only those.

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::api::{FetchError, StockDataProvider};
use crate::models::{Target, TradeQuery};
use crate::storage::{CsvDatasetWriter, DataSaver, DatasetWriter, StorageError};

/// Why a single symbol could not be saved
#[derive(Debug, Error)]
pub enum SaveError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("write failed: {0}")]
    Storage(#[from] StorageError),

    #[error("invalid symbol '{0}'")]
    InvalidSymbol(String),
}

/// Progress update for one symbol
#[derive(Debug, Clone)]
pub struct SaveProgress {
    pub index: usize,
    pub total: usize,
    pub symbol: String,
    pub status: SaveStatus,
}

/// Status of a symbol within the batch
#[derive(Debug, Clone, PartialEq)]
pub enum SaveStatus {
    Started,
    Saved { records: usize },
    Failed(String),
}

/// Outcome of a batch
#[derive(Debug)]
pub struct SaveReport {
    pub save_dir: PathBuf,
    pub total: usize,
    pub succeeded: usize,
    pub records_written: usize,
    /// Failed codes in input order
    pub failed: Vec<String>,
    pub errors: Vec<(String, SaveError)>,
}

impl SaveReport {
    fn new(save_dir: PathBuf, total: usize) -> Self {
        Self {
            save_dir,
            total,
            succeeded: 0,
            records_written: 0,
            failed: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn failed_symbols(&self) -> &[String] {
        &self.failed
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        self.succeeded as f64 / self.total as f64 * 100.0
    }
}

/// Fetches trading history and saves one CSV per symbol
pub struct StockSaver<P, W = CsvDatasetWriter> {
    data_saver: DataSaver,
    provider: P,
    writer: W,
    show_progress: bool,
    progress_sender: Option<Arc<broadcast::Sender<SaveProgress>>>,
}

impl<P: StockDataProvider> StockSaver<P, CsvDatasetWriter> {
    pub fn new(provider: P, root: impl Into<PathBuf>) -> Self {
        Self::with_writer(provider, CsvDatasetWriter::new(), root)
    }
}

impl<P: StockDataProvider, W: DatasetWriter> StockSaver<P, W> {
    pub fn with_writer(provider: P, writer: W, root: impl Into<PathBuf>) -> Self {
        Self {
            data_saver: DataSaver::new(root),
            provider,
            writer,
            show_progress: false,
            progress_sender: None,
        }
    }

    /// Draw a terminal progress bar while saving
    pub fn show_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Broadcast a `SaveProgress` event for every state change
    pub fn with_progress_sender(mut self, sender: Arc<broadcast::Sender<SaveProgress>>) -> Self {
        self.progress_sender = Some(sender);
        self
    }

    pub fn root(&self) -> &Path {
        self.data_saver.root()
    }

    pub fn reset_root(&mut self, root: impl Into<PathBuf>) {
        self.data_saver.reset_root(root);
    }

    pub fn data_saver(&self) -> &DataSaver {
        &self.data_saver
    }

    /// Every listed A-share code
    pub async fn list_symbols(&self) -> Result<Vec<String>> {
        self.provider
            .list_symbols()
            .await
            .context("Failed to retrieve the A-share symbol list")
    }

    /// Save trading history for every symbol in `target`
    ///
    /// Only resolving the target or creating the output directory can fail
    /// the call as a whole; per-symbol failures end up in the report.
    pub async fn save_trade_data(&self, query: &TradeQuery, target: Target) -> Result<SaveReport> {
        let symbols = match target {
            Target::All => {
                info!("📋 Resolving all listed A-shares...");
                self.list_symbols().await?
            }
            Target::Symbols(symbols) => symbols,
        };

        let save_dir = self.data_saver.trade_dir(query.period);
        DataSaver::ensure_dir(&save_dir)
            .with_context(|| format!("Failed to create {}", save_dir.display()))?;

        let total = symbols.len();
        info!("🚀 Saving {} history ({} adjusted) for {} stocks", query.period, query.adjust, total);
        info!("📅 Date range: {} to {}", query.start_date, query.end_date);
        info!("📁 Target directory: {}", save_dir.display());

        let pb = self.progress_bar(total);
        let mut report = SaveReport::new(save_dir, total);

        for (index, symbol) in symbols.into_iter().enumerate() {
            pb.set_message(format!("Processing {}", symbol));
            self.notify(index, total, &symbol, SaveStatus::Started);

            let result = self.save_one(&symbol, query, &report.save_dir, &pb).await;
            match result {
                Ok(records) => {
                    debug!("✅ {}/{}: {} - {} records saved", index + 1, total, symbol, records);
                    report.succeeded += 1;
                    report.records_written += records;
                    self.notify(index, total, &symbol, SaveStatus::Saved { records });
                }
                Err(e) => {
                    pb.suspend(|| error!("❌ {}/{}: {} failed - {}", index + 1, total, symbol, e));
                    self.notify(index, total, &symbol, SaveStatus::Failed(e.to_string()));
                    report.failed.push(symbol.clone());
                    report.errors.push((symbol, e));
                }
            }

            pb.inc(1);
        }

        // Summary logs go out after the bar is done drawing
        pb.finish_with_message("✅ Trade data download completed");

        info!("📊 Results: {} saved, {} failed, {} records written",
              report.succeeded, report.failed.len(), report.records_written);
        if !report.all_succeeded() {
            warn!("⚠️ The following stocks failed, please retry: {}", report.failed.join(", "));
        }

        Ok(report)
    }

    async fn save_one(
        &self,
        symbol: &str,
        query: &TradeQuery,
        save_dir: &Path,
        pb: &ProgressBar,
    ) -> Result<usize, SaveError> {
        if symbol.is_empty() || symbol.contains(['/', '\\']) || symbol.starts_with('.') {
            return Err(SaveError::InvalidSymbol(symbol.to_string()));
        }

        let dataset = self.provider.fetch_trade_history(symbol, query).await?;
        if dataset.is_empty() {
            pb.suspend(|| warn!("⚪ {}: no bars between {} and {}", symbol, query.start_date, query.end_date));
        }

        let path = save_dir.join(DataSaver::trade_file_name(symbol, query));
        self.writer.write(&path, &dataset)?;
        Ok(dataset.len())
    }

    fn notify(&self, index: usize, total: usize, symbol: &str, status: SaveStatus) {
        if let Some(sender) = &self.progress_sender {
            let _ = sender.send(SaveProgress {
                index,
                total,
                symbol: symbol.to_string(),
                status,
            });
        }
    }

    fn progress_bar(&self, total: usize) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new(total as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>7}/{len:7} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        pb
    }
}
