//! Process-backed port implementations.
//!
//! These live at the binary edge. Actions are delegated to an operator hook
//! program; verification checks run the declared read-only command directly.
//! Tests inject in-memory fakes instead.

use crate::reactor::ActionRunner;
use crate::verifier::CheckRunner;
use anyhow::{bail, Context};
use std::path::PathBuf;
use std::process::Command;
use tracing::debug;
use warden_common::PlaybookAction;

/// Delegates each action to `<hook> <type> <target> <params-json>`
pub struct HookActionRunner {
    hook: PathBuf,
}

impl HookActionRunner {
    pub fn new(hook: impl Into<PathBuf>) -> Self {
        Self { hook: hook.into() }
    }
}

impl ActionRunner for HookActionRunner {
    fn run(&self, action: &PlaybookAction) -> anyhow::Result<String> {
        let params = serde_json::to_string(&action.params)?;
        debug!(
            "Invoking action hook {} {} {}",
            self.hook.display(),
            action.action_type,
            action.target
        );

        let output = Command::new(&self.hook)
            .arg(action.action_type.as_str())
            .arg(&action.target)
            .arg(params)
            .output()
            .with_context(|| format!("Failed to spawn action hook {}", self.hook.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "action hook exited with {}: {}",
                output.status,
                stderr.trim()
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Runs read-only verification commands and captures stdout
pub struct ProcessCheckRunner;

impl CheckRunner for ProcessCheckRunner {
    fn run_check(&self, command: &[String]) -> anyhow::Result<String> {
        let (program, args) = command.split_first().context("empty check command")?;

        let output = Command::new(program)
            .args(args)
            .output()
            .with_context(|| format!("Failed to spawn check command '{}'", program))?;

        if !output.status.success() {
            bail!("check '{}' exited with {}", program, output.status);
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_runner_captures_stdout() {
        let output = ProcessCheckRunner
            .run_check(&["echo".to_string(), "fresh".to_string()])
            .unwrap();
        assert_eq!(output.trim(), "fresh");
    }

    #[test]
    fn test_check_runner_rejects_empty_command() {
        assert!(ProcessCheckRunner.run_check(&[]).is_err());
    }

    #[test]
    fn test_check_runner_surfaces_nonzero_exit() {
        let result = ProcessCheckRunner.run_check(&["false".to_string()]);
        assert!(result.is_err());
    }
}
