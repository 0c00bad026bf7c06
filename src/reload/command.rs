//! Reload by executing an external script.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::coalesce::Handler;
use crate::error::HandlerError;

/// Runs a program and treats a non-zero exit as a failed reload.
///
/// Standard output and standard error are captured together; on failure the
/// combined output is carried in [`HandlerError::Command`].
#[derive(Debug, Clone)]
pub struct CommandHandler {
    program: PathBuf,
    args: Vec<OsString>,
}

impl CommandHandler {
    /// Create a handler that runs `program` with `args`.
    pub fn new<P, I, A>(program: P, args: I) -> Self
    where
        P: Into<PathBuf>,
        I: IntoIterator<Item = A>,
        A: Into<OsString>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// The program this handler runs.
    pub fn program(&self) -> &PathBuf {
        &self.program
    }
}

#[async_trait]
impl Handler for CommandHandler {
    async fn handle(&self) -> Result<(), HandlerError> {
        debug!(program = %self.program.display(), "Running reload command");

        let output = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        if !output.status.success() {
            return Err(HandlerError::Command {
                status: output.status.code(),
                output: combined,
            });
        }

        info!(
            program = %self.program.display(),
            output = %combined.trim_end(),
            "Reloaded"
        );
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_successful_command() {
        let handler = CommandHandler::new("sh", ["-c", "echo reloaded"]);
        assert!(handler.handle().await.is_ok());
    }

    #[tokio::test]
    async fn test_failing_command_carries_output() {
        let handler = CommandHandler::new("sh", ["-c", "echo broken config >&2; exit 3"]);

        match handler.handle().await {
            Err(HandlerError::Command { status, output }) => {
                assert_eq!(status, Some(3));
                assert!(output.contains("broken config"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_program_is_kept() {
        let handler = CommandHandler::new("/usr/sbin/reload-haproxy", ["-c"]);
        assert_eq!(handler.program(), &PathBuf::from("/usr/sbin/reload-haproxy"));
    }

    #[tokio::test]
    async fn test_missing_program_is_io_error() {
        let handler = CommandHandler::new("/nonexistent/reload-haproxy", Vec::<String>::new());
        assert!(matches!(handler.handle().await, Err(HandlerError::Io(_))));
    }
}
