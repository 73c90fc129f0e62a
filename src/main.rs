mod auth;
mod backup;
mod config;
mod dispatch;
mod error;
mod executor;
mod logger;
mod messages;
mod script;
mod status;
mod telegram;
#[cfg(test)]
mod test_utils;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use crate::backup::{BackupPipeline, BackupSettings, GcsStore, ObjectStore, TokenSource};
use crate::config::{validate_telegram_token, Cli, Config};
use crate::dispatch::{Dispatcher, Handler};
use crate::executor::{CommandRunner, ShellExecutor};
use crate::script::ControlCommands;
use crate::status::StatusClient;

/// Wire every command to its handler.
fn build_dispatcher(config: &Config, runner: Arc<dyn CommandRunner>) -> Result<Dispatcher> {
    let commands = ControlCommands::for_script(&config.script_path);

    let store: Option<Arc<dyn ObjectStore>> = match &config.gcs_bucket {
        Some(bucket) => {
            let token = TokenSource::resolve(
                config.gcs_access_token.as_deref(),
                config.gcs_credentials.as_deref(),
            )
            .context("Failed to load Cloud Storage credentials")?;
            tracing::info!(bucket = %bucket, credentials = %token.describe(), "backups enabled");
            let store = GcsStore::new(bucket.clone(), token).with_endpoint(&config.gcs_endpoint);
            Some(Arc::new(store) as Arc<dyn ObjectStore>)
        }
        None => None,
    };
    let pipeline = BackupPipeline::new(
        BackupSettings {
            stop_command: commands.stop.clone(),
            start_command: commands.start.clone(),
            data_file: config.data_file.clone(),
            archive_dir: config.archive_dir.clone(),
            archive_prefix: config.archive_prefix.clone(),
            archive_extension: config.archive_extension.clone(),
        },
        runner.clone(),
        store,
    );

    let mut dispatcher = Dispatcher::new(config.authorized_user, runner);
    dispatcher.register(
        "status",
        Handler::Status(StatusClient::new(config.service_address.clone())),
    )?;
    dispatcher.register("deploy", Handler::Shell(commands.deploy))?;
    dispatcher.register("start", Handler::Shell(commands.start))?;
    dispatcher.register("stop", Handler::Shell(commands.stop))?;
    dispatcher.register("restart", Handler::Shell(commands.restart))?;
    dispatcher.register("backup", Handler::Backup(Arc::new(pipeline)))?;
    Ok(dispatcher)
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    logger::init();

    let cli = Cli::parse();
    let config = Config::from_cli(cli)?;

    script::write_control_script(&config.script_path).with_context(|| {
        format!(
            "Failed to write control script {}",
            config.script_path.display()
        )
    })?;

    let bot_name = validate_telegram_token(&config.token).await?;

    let dispatcher = build_dispatcher(&config, Arc::new(ShellExecutor))?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bot = %bot_name,
        authorized_user = config.authorized_user,
        service_address = %config.service_address,
        backup_bucket = config.gcs_bucket.as_deref().unwrap_or("-"),
        "{} starting",
        env!("CARGO_BIN_NAME")
    );

    telegram::run_bot(&config.token, Arc::new(dispatcher)).await;

    Ok(())
}
