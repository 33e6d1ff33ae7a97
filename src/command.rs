//! # External Command Invocation
//!
//! Typed wrapper around subprocess execution. Every external collaborator
//! (the transcription executable, nvidia-smi, the container runtime CLI,
//! lscpu) is invoked through [`CommandSpec`]: an explicit argument vector,
//! never a shell string, with stdout/stderr/exit status captured as a
//! structured [`CommandOutput`].

use std::process::ExitStatus;

use tokio::process::Command;
use tracing::debug;

use crate::error::{BenchError, BenchResult};

/// A command to run: program name plus argument vector.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    program: String,
    args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Run the command to completion, capturing stdout and stderr.
    ///
    /// A spawn failure (program not installed) is an `ExternalTool` error;
    /// a non-zero exit is *not* an error here, because several callers
    /// (GPU probe, container scan) treat that as an expected condition.
    /// Use [`CommandOutput::success`] to decide.
    pub async fn run(&self) -> BenchResult<CommandOutput> {
        debug!(program = %self.program, args = ?self.args, "running external command");

        let output = Command::new(&self.program)
            .args(&self.args)
            .output()
            .await
            .map_err(|e| BenchError::external_tool(&self.program, e))?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            status: output.status,
        })
    }

    /// Run and require a zero exit status, returning trimmed stdout.
    pub async fn run_checked(&self) -> BenchResult<String> {
        let output = self.run().await?;
        if !output.success() {
            return Err(BenchError::external_tool(
                &self.program,
                format!("{}: {}", output.status, output.stderr.trim()),
            ));
        }
        Ok(output.stdout_trimmed().to_string())
    }
}

/// Captured result of a finished command.
#[derive(Debug)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub status: ExitStatus,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    pub fn stdout_trimmed(&self) -> &str {
        self.stdout.trim()
    }
}
