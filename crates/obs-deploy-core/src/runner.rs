//! Subprocess invocation for the external tools the reconciler drives.
//!
//! Every cluster and package-manager call goes through a [`CommandRunner`],
//! which returns the captured output regardless of exit status. Adapters
//! decide what a non-zero exit means (a missing object is often an answer,
//! not a failure).

use std::io::Write;
use std::process::{Command, Stdio};

use crate::error::{DeployError, Result};

/// Commands that must be on `PATH` before the reconciler touches the cluster.
pub const REQUIRED_TOOLS: [&str; 2] = ["kubectl", "helm"];

/// Captured result of one external command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }

    /// Turn a non-zero exit into [`DeployError::CommandFailed`].
    pub fn into_success(self, program: &str, args: &[String]) -> Result<CommandOutput> {
        if self.success() {
            return Ok(self);
        }
        Err(DeployError::CommandFailed {
            command: render_command(program, args),
            status: self.status,
            stderr: self.stderr.trim().to_string(),
        })
    }
}

pub trait CommandRunner {
    /// Run `program` with `args`, feeding `stdin` when given.
    ///
    /// Returns `Err` only when the process could not be started; a non-zero
    /// exit is reported through [`CommandOutput::status`].
    fn run(&self, program: &str, args: &[String], stdin: Option<&[u8]>) -> Result<CommandOutput>;
}

impl<R: CommandRunner + ?Sized> CommandRunner for &R {
    fn run(&self, program: &str, args: &[String], stdin: Option<&[u8]>) -> Result<CommandOutput> {
        (**self).run(program, args, stdin)
    }
}

/// Runs commands as real child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[String], stdin: Option<&[u8]>) -> Result<CommandOutput> {
        tracing::debug!(command = %render_command(program, args), "exec");

        let mut cmd = Command::new(program);
        cmd.args(args);
        cmd.stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let spawn_err = |source| DeployError::Spawn {
            program: program.to_string(),
            source,
        };
        let mut child = cmd.spawn().map_err(spawn_err)?;

        if let Some(bytes) = stdin {
            if let Some(mut pipe) = child.stdin.take() {
                pipe.write_all(bytes).map_err(spawn_err)?;
                // pipe dropped here so the child sees EOF
            }
        }

        let output = child.wait_with_output().map_err(spawn_err)?;
        Ok(CommandOutput {
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Fail with [`DeployError::MissingTool`] for the first tool not on `PATH`.
pub fn require_tools(tools: &[&str]) -> Result<()> {
    for tool in tools {
        if which::which(tool).is_err() {
            return Err(DeployError::MissingTool((*tool).to_string()));
        }
    }
    Ok(())
}

/// Render a command line for logs and error messages. Stdin is not shown.
pub fn render_command(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}
