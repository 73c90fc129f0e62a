//! Authorized command dispatch.
//!
//! Every inbound command goes through [`Dispatcher::dispatch`], which checks
//! the sender against the single authorized user, runs the registered
//! [`Handler`] and turns its outcome into exactly one reply.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::auth;
use crate::backup::BackupPipeline;
use crate::error::BotError;
use crate::executor::CommandRunner;
use crate::messages;
use crate::status::StatusClient;

/// Sends text back to the user a command came from.
#[async_trait]
pub trait ResponseSink: Send + Sync {
    async fn send(&self, text: &str);
}

/// Unit of work bound to a command name.
#[derive(Clone)]
pub enum Handler {
    /// Run a fixed command line through the dispatcher's runner.
    Shell(String),
    Status(StatusClient),
    Backup(Arc<BackupPipeline>),
}

impl Handler {
    async fn invoke(
        &self,
        runner: &dyn CommandRunner,
        sink: &dyn ResponseSink,
    ) -> Result<(), BotError> {
        match self {
            Handler::Shell(command_line) => {
                runner.execute(command_line).await?;
                sink.send(messages::MSG_SUCCESS).await;
            }
            Handler::Status(client) => {
                let status = client.get_status().await?;
                sink.send(&status).await;
            }
            Handler::Backup(pipeline) => pipeline.run(sink).await?,
        }
        Ok(())
    }

    fn label(&self) -> &'static str {
        match self {
            Handler::Shell(_) => "shell",
            Handler::Status(_) => "status",
            Handler::Backup(_) => "backup",
        }
    }
}

pub struct Dispatcher {
    authorized_user: u64,
    runner: Arc<dyn CommandRunner>,
    handlers: HashMap<String, Handler>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("authorized_user", &self.authorized_user)
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    pub fn new(authorized_user: u64, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            authorized_user,
            runner,
            handlers: HashMap::new(),
        }
    }

    /// Bind `name` (without the leading `/`) to `handler`.
    /// A name can only be registered once.
    pub fn register(&mut self, name: &str, handler: Handler) -> Result<(), BotError> {
        let name = name.trim_start_matches('/');
        if self.handlers.contains_key(name) {
            return Err(BotError::Configuration(format!(
                "command /{name} registered twice"
            )));
        }
        self.handlers.insert(name.to_string(), handler);
        Ok(())
    }

    /// Registered command names, sorted.
    pub fn command_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub async fn dispatch(&self, command: &str, sender: u64, sink: &dyn ResponseSink) {
        let permission = auth::get_permission_level(sender, self.authorized_user);
        if !auth::can_execute(permission) {
            tracing::warn!(sender, command, "rejected unauthorized sender");
            sink.send(&BotError::Unauthorized { user_id: sender }.to_string())
                .await;
            return;
        }

        let Some(handler) = self.handlers.get(command) else {
            tracing::info!(command, "unknown command");
            sink.send(&BotError::UnknownCommand(command.to_string()).to_string())
                .await;
            return;
        };

        tracing::info!(command, handler = handler.label(), "dispatching");
        match handler.invoke(self.runner.as_ref(), sink).await {
            Ok(()) => tracing::info!(command, "command succeeded"),
            Err(e) => {
                tracing::warn!(command, kind = ?e.kind(), error = %e, "command failed");
                sink.send(&e.to_string()).await;
            }
        }
    }
}
