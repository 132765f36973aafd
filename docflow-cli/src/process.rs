//! Subprocess stage executor.
//!
//! Stage executors are external programs reached through the narrow
//! interface: a JSON document with the named inputs on stdin, a JSON
//! document with the named outputs on stdout, non-zero exit for failure.

use async_trait::async_trait;
use docflow::engine::{ExecutorInputs, ExecutorOutputs, StageExecutor};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;

#[derive(Debug, Serialize)]
struct ExecutorRequest {
    inputs: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct ExecutorResponse {
    outputs: ExecutorOutputs,
}

/// Runs a stage as a subprocess.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    program: String,
    args: Vec<String>,
}

impl CommandExecutor {
    /// Creates an executor for a program and its arguments.
    #[must_use]
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

#[async_trait]
impl StageExecutor for CommandExecutor {
    async fn execute(&self, inputs: ExecutorInputs) -> Result<ExecutorOutputs, String> {
        let request = ExecutorRequest {
            inputs: inputs
                .into_iter()
                .map(|(kind, artifact)| (kind, artifact.content))
                .collect(),
        };
        let payload =
            serde_json::to_vec(&request).map_err(|e| format!("encoding inputs: {e}"))?;

        let mut child = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| format!("spawning '{}': {e}", self.program))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&payload)
                .await
                .map_err(|e| format!("writing inputs to '{}': {e}", self.program))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| format!("waiting for '{}': {e}", self.program))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!(
                "'{}' exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            ));
        }

        let response: ExecutorResponse = serde_json::from_slice(&output.stdout)
            .map_err(|e| format!("parsing outputs of '{}': {e}", self.program))?;
        Ok(response.outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_command_executor_round_trip() {
        // The script ignores stdin and emits a fixed outputs document.
        let executor = CommandExecutor::new(
            "sh",
            vec![
                "-c".to_string(),
                r#"cat > /dev/null; printf '{"outputs":{"draft":"generated text"}}'"#.to_string(),
            ],
        );

        let outputs = executor.execute(ExecutorInputs::new()).await.unwrap();
        assert_eq!(
            outputs.get("draft").map(String::as_str),
            Some("generated text")
        );
    }

    #[tokio::test]
    async fn test_command_failure_carries_stderr() {
        let executor = CommandExecutor::new(
            "sh",
            vec![
                "-c".to_string(),
                "echo 'source corpus unavailable' >&2; exit 3".to_string(),
            ],
        );

        let err = executor.execute(ExecutorInputs::new()).await.unwrap_err();
        assert!(err.contains("source corpus unavailable"));
        assert!(err.contains("exit"));
    }

    #[tokio::test]
    async fn test_malformed_output_is_an_error() {
        let executor = CommandExecutor::new(
            "sh",
            vec!["-c".to_string(), "echo not-json".to_string()],
        );

        let err = executor.execute(ExecutorInputs::new()).await.unwrap_err();
        assert!(err.contains("parsing outputs"));
    }
}
