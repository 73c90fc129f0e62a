//! Point-in-time backup of the monitored service's data file.
//!
//! The service is stopped while the data file is archived so the archive is
//! consistent, then started again no matter how archiving or uploading went.

mod credentials;
mod storage;

pub use storage::{GcsStore, ObjectStore, TokenSource, GCS_ENDPOINT};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDate;
use tokio::sync::Mutex;

use crate::dispatch::ResponseSink;
use crate::error::{BotError, ExecutionError};
use crate::executor::CommandRunner;

/// Static settings of the pipeline.
#[derive(Debug, Clone)]
pub struct BackupSettings {
    pub stop_command: String,
    pub start_command: String,
    pub data_file: String,
    pub archive_dir: PathBuf,
    pub archive_prefix: String,
    pub archive_extension: String,
}

/// `{prefix}_{YYYY_MM_DD}.{ext}`; backups taken on the same day share a name.
pub fn archive_name(prefix: &str, date: NaiveDate, extension: &str) -> String {
    format!("{}_{}.{}", prefix, date.format("%Y_%m_%d"), extension)
}

pub struct BackupPipeline {
    settings: BackupSettings,
    runner: Arc<dyn CommandRunner>,
    store: Option<Arc<dyn ObjectStore>>,
    in_flight: Mutex<()>,
}

impl BackupPipeline {
    /// `store` is `None` when no bucket is configured; every run then fails
    /// before touching the service.
    pub fn new(
        settings: BackupSettings,
        runner: Arc<dyn CommandRunner>,
        store: Option<Arc<dyn ObjectStore>>,
    ) -> Self {
        Self {
            settings,
            runner,
            store,
            in_flight: Mutex::new(()),
        }
    }

    pub async fn run(&self, sink: &dyn ResponseSink) -> Result<(), BotError> {
        let today = chrono::Local::now().date_naive();
        let size = self.run_on(today).await?;
        sink.send(&format!("Success! Backup size: {size}")).await;
        Ok(())
    }

    /// Run every step for the archive of `date`; returns the uploaded size.
    pub async fn run_on(&self, date: NaiveDate) -> Result<u64, BotError> {
        let store = self.store.as_deref().ok_or_else(|| {
            BotError::Configuration("backup is not configured: no storage bucket set".into())
        })?;
        let _flight = self
            .in_flight
            .try_lock()
            .map_err(|_| BotError::BackupInProgress)?;

        let downtime = ServiceDowntime::begin(
            self.runner.as_ref(),
            &self.settings.stop_command,
            &self.settings.start_command,
        )
        .await?;

        let uploaded = self.archive_and_upload(store, date).await;
        let restarted = downtime.end().await;

        let size = uploaded?;
        restarted?;
        Ok(size)
    }

    async fn archive_and_upload(
        &self,
        store: &dyn ObjectStore,
        date: NaiveDate,
    ) -> Result<u64, BotError> {
        let name = archive_name(
            &self.settings.archive_prefix,
            date,
            &self.settings.archive_extension,
        );
        let archive = ArchiveFile::new(self.settings.archive_dir.join(&name));
        tracing::info!(archive = %archive.path().display(), "archiving data file");

        let zip = format!(
            "zip {} {}",
            archive.path().display(),
            self.settings.data_file
        );
        self.runner.execute(&zip).await?;

        let size = store.upload(&name, archive.path()).await?;
        tracing::info!(object = %name, bytes = size, "backup uploaded");
        Ok(size)
    }
}

/// The monitored service, held stopped until [`ServiceDowntime::end`].
struct ServiceDowntime<'a> {
    runner: &'a dyn CommandRunner,
    start_command: &'a str,
}

impl<'a> ServiceDowntime<'a> {
    async fn begin(
        runner: &'a dyn CommandRunner,
        stop_command: &str,
        start_command: &'a str,
    ) -> Result<Self, ExecutionError> {
        runner.execute(stop_command).await?;
        tracing::info!("service stopped for backup");
        Ok(Self {
            runner,
            start_command,
        })
    }

    async fn end(self) -> Result<(), ExecutionError> {
        let result = self.runner.execute(self.start_command).await;
        match &result {
            Ok(()) => tracing::info!("service restarted after backup"),
            Err(e) => tracing::error!(error = %e, "service restart after backup failed"),
        }
        result
    }
}

/// Local archive removed when dropped, whatever happened to it.
struct ArchiveFile {
    path: PathBuf,
}

impl ArchiveFile {
    fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ArchiveFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to remove archive")
            }
        }
    }
}
