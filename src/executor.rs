use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::ExecutionError;

/// Runs an operating-system command line to completion.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn execute(&self, command_line: &str) -> Result<(), ExecutionError>;
}

/// Split a command line on whitespace into program and arguments.
/// Quoting is not supported, so arguments cannot contain spaces.
pub fn split_command_line(command_line: &str) -> Option<(&str, Vec<&str>)> {
    let mut parts = command_line.split_whitespace();
    let program = parts.next()?;
    Some((program, parts.collect()))
}

/// Launches commands as child processes and waits for their exit status.
///
/// Output of the child is discarded; the control script redirects the
/// service's own output to a log file. No timeout is applied.
#[derive(Debug, Default, Clone)]
pub struct ShellExecutor;

#[async_trait]
impl CommandRunner for ShellExecutor {
    async fn execute(&self, command_line: &str) -> Result<(), ExecutionError> {
        let (program, args) = split_command_line(command_line)
            .ok_or_else(|| ExecutionError::new(command_line, "empty command line"))?;

        tracing::debug!(command = command_line, "executing");
        let status = Command::new(program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| ExecutionError::new(command_line, e))?;

        if !status.success() {
            return Err(ExecutionError::new(command_line, status));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_program_and_args() {
        let (program, args) =
            split_command_line("zip out.gzip  Stage1st.BoltDB").expect("expected a program");
        assert_eq!(program, "zip");
        assert_eq!(args, vec!["out.gzip", "Stage1st.BoltDB"]);
    }

    #[test]
    fn test_split_empty_line() {
        assert!(split_command_line("").is_none());
        assert!(split_command_line("   ").is_none());
    }

    #[tokio::test]
    async fn test_execute_success() {
        ShellExecutor.execute("true").await.expect("true succeeds");
    }

    #[tokio::test]
    async fn test_execute_nonzero_exit_mentions_command() {
        let err = ShellExecutor
            .execute("false --ignored")
            .await
            .expect_err("false exits non-zero");
        assert_eq!(err.command, "false --ignored");
        assert!(err.to_string().contains("false --ignored"));
    }

    #[tokio::test]
    async fn test_execute_missing_program() {
        let line = "./definitely-not-a-real-program-opsbot start";
        let err = ShellExecutor
            .execute(line)
            .await
            .expect_err("missing program cannot launch");
        assert!(err.to_string().contains(line));
    }

    #[tokio::test]
    async fn test_execute_empty_line_fails() {
        assert!(ShellExecutor.execute("").await.is_err());
    }
}
