// Licensed under the Apache-2.0 license

use log::debug;
use std::io;
use std::process::Command;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
}

/// Captured result of an external program.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when the program was terminated by a signal.
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    /// Stdout followed by stderr, as if stderr had been redirected into stdout.
    pub fn combined(&self) -> String {
        let mut out = self.stdout.clone();
        out.push_str(&self.stderr);
        out
    }
}

pub trait CommandRunner {
    /// Runs `program` with `args` to completion and captures its output.
    ///
    /// # Returns
    ///
    /// * `Result<CommandOutput, ExecError>` - Returns the captured output, whatever the exit
    ///   status. An error is returned only when the program could not be started.
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, ExecError>;
}

/// Runs programs on the local system with `std::process::Command`.
///
/// Calls block until the child exits; there is no timeout.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandRunner;

impl CommandRunner for SystemCommandRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, ExecError> {
        debug!("Running command: {} {}", program, args.join(" "));
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|source| ExecError::Spawn {
                program: program.to_string(),
                source,
            })?;
        let output = CommandOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        debug!("{} exited with {:?}", program, output.status);
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combined_output_order() {
        let output = CommandOutput {
            status: Some(2),
            stdout: "staged\n".to_string(),
            stderr: "warning\n".to_string(),
        };
        assert!(!output.success());
        assert_eq!(output.combined(), "staged\nwarning\n");
    }

    #[test]
    fn test_missing_program_is_spawn_error() {
        let result = SystemCommandRunner.run("z9664f-no-such-program", &[]);
        match result {
            Err(ExecError::Spawn { program, source }) => {
                assert_eq!(program, "z9664f-no-such-program");
                assert_eq!(source.kind(), io::ErrorKind::NotFound);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_exit_status_is_captured() {
        let output = SystemCommandRunner
            .run("sh", &["-c", "echo out; echo err >&2; exit 3"])
            .unwrap();
        assert_eq!(output.status, Some(3));
        assert_eq!(output.stdout, "out\n");
        assert_eq!(output.stderr, "err\n");
    }
}
