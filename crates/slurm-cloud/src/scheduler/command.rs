use std::path::Path;
use std::process::Output;

use bstr::ByteSlice;
use tokio::process::Command;

use crate::common::error::HookError;

pub fn create_command(program: &Path, arguments: &[&str]) -> Command {
    let mut command = Command::new(program);
    command.args(arguments);
    command.kill_on_drop(true);
    command
}

pub fn check_command_output(output: Output) -> Result<Output, String> {
    let status = output.status;
    if !status.success() {
        return Err(format!(
            "Exit code: {}\nStderr: {}\nStdout: {}",
            status.code().unwrap_or(-1),
            output.stderr.to_str_lossy().trim(),
            output.stdout.to_str_lossy().trim()
        ));
    }
    Ok(output)
}

/// Runs a scheduler tool and returns its standard output.
pub async fn run_command(program: &Path, arguments: &[&str]) -> crate::Result<String> {
    let command_line = format!("{} {}", program.display(), arguments.join(" "));
    log::debug!("Running command `{command_line}`");

    let output = create_command(program, arguments)
        .output()
        .await
        .map_err(|e| HookError::SchedulerError(format!("`{command_line}` start failed: {e}")))?;
    let output = check_command_output(output).map_err(|e| {
        HookError::SchedulerError(format!("`{command_line}` execution failed\n{e}"))
    })?;
    let stdout = output.stdout.to_str().map_err(|e| {
        HookError::SchedulerError(format!("Invalid UTF-8 in `{command_line}` output: {e:?}"))
    })?;
    Ok(stdout.to_string())
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use crate::scheduler::command::run_command;

    #[tokio::test]
    async fn captures_stdout() {
        let output = run_command(Path::new("echo"), &["node-1", "node-2"])
            .await
            .unwrap();
        assert_eq!(output, "node-1 node-2\n");
    }

    #[tokio::test]
    async fn failing_command_reports_exit_code() {
        let error = run_command(Path::new("sh"), &["-c", "echo oops >&2; exit 3"])
            .await
            .unwrap_err();
        let message = error.to_string();
        assert!(message.contains("Exit code: 3"), "{message}");
        assert!(message.contains("oops"), "{message}");
    }

    #[tokio::test]
    async fn missing_program_is_an_error() {
        assert!(
            run_command(Path::new("/nonexistent/scontrol"), &["show", "config"])
                .await
                .is_err()
        );
    }
}
