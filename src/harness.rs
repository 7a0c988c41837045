use std::path::Path;
use std::process::Command;

use serde::Serialize;

/// Result of one shell command run by the loop runner or `sv task validate`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CommandOutcome {
    pub command: String,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub passed: bool,
}

/// Run a command via `sh -c` with captured output.
///
/// Spawn failures are folded into the outcome (exit code -1) rather than
/// propagated: a command that cannot run is a failed command, and the loop
/// reports it the same way.
pub fn run_shell(command: &str, cwd: &Path, envs: &[(&str, &str)]) -> CommandOutcome {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command).current_dir(cwd);
    for (key, value) in envs {
        cmd.env(key, value);
    }

    match cmd.output() {
        Ok(output) => {
            let exit_code = output.status.code().unwrap_or(-1);
            CommandOutcome {
                command: command.to_string(),
                exit_code,
                stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                passed: output.status.success(),
            }
        }
        Err(e) => CommandOutcome {
            command: command.to_string(),
            exit_code: -1,
            stdout: String::new(),
            stderr: e.to_string(),
            passed: false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn passing_command_captures_stdout() {
        let dir = tempdir().unwrap();
        let outcome = run_shell("echo hello", dir.path(), &[]);
        assert!(outcome.passed);
        assert_eq!(outcome.exit_code, 0);
        assert_eq!(outcome.stdout, "hello");
    }

    #[test]
    fn failing_command_reports_exit_code() {
        let dir = tempdir().unwrap();
        let outcome = run_shell("exit 3", dir.path(), &[]);
        assert!(!outcome.passed);
        assert_eq!(outcome.exit_code, 3);
    }

    #[test]
    fn env_vars_are_visible_to_the_command() {
        let dir = tempdir().unwrap();
        let outcome = run_shell("printf %s \"$SV_TASK_ID\"", dir.path(), &[("SV_TASK_ID", "forge-mzr")]);
        assert!(outcome.passed);
        assert_eq!(outcome.stdout, "forge-mzr");
    }
}
