//! External agent command bridge.
//!
//! Spawns the configured command per instruction, writes a JSON request on
//! stdin, forwards non-verdict stdout lines as progress, and parses the
//! final JSON verdict line. The per-call timeout lives here; the engine
//! itself applies none.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::time::timeout;
use tracing::{debug, warn};

use browserpilot_protocols::{AgentOutcome, AgentRunner, ProgressFn, RunnerError};

/// Agent runner that delegates each instruction to an external command.
pub struct ProcessAgentRunner {
    command: String,
    args: Vec<String>,
    timeout: Duration,
}

impl ProcessAgentRunner {
    /// Create a new runner for the given command. Default timeout: 600s.
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            timeout: Duration::from_secs(600),
        }
    }

    /// Set the per-call timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn drive(
        child: &mut Child,
        mut stdin: ChildStdin,
        stdout: ChildStdout,
        stderr: ChildStderr,
        request: String,
        progress: ProgressFn,
    ) -> Result<AgentOutcome, RunnerError> {
        stdin.write_all(request.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        drop(stdin);

        let stderr_task = tokio::spawn(async move {
            let mut text = String::new();
            let _ = BufReader::new(stderr).read_to_string(&mut text).await;
            text
        });

        // Any stdout line that parses as a verdict replaces the previous one;
        // everything else is streamed to the host as progress.
        let mut verdict: Option<AgentOutcome> = None;
        let mut lines = BufReader::new(stdout).lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<AgentOutcome>(&line) {
                Ok(outcome) => verdict = Some(outcome),
                Err(_) => progress(line),
            }
        }

        let stderr_text = stderr_task.await.unwrap_or_default();
        let status = child.wait().await?;

        if !status.success() {
            let code = status.code().unwrap_or(-1);
            warn!("Agent command exited with code {}", code);
            return Err(RunnerError::Failed(format!(
                "agent exited with code {}: {}",
                code,
                stderr_text.trim()
            )));
        }

        verdict.ok_or_else(|| {
            RunnerError::MalformedVerdict("no verdict line on stdout".to_string())
        })
    }
}

#[async_trait]
impl AgentRunner for ProcessAgentRunner {
    async fn run(
        &self,
        prompt: &str,
        max_turns: u32,
        progress: ProgressFn,
    ) -> Result<AgentOutcome, RunnerError> {
        let request = serde_json::json!({
            "prompt": prompt,
            "maxTurns": max_turns,
        })
        .to_string();

        debug!("Spawning agent command '{}'", self.command);
        let mut child = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| RunnerError::Spawn(e.to_string()))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| RunnerError::Spawn("stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RunnerError::Spawn("stdout unavailable".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| RunnerError::Spawn("stderr unavailable".to_string()))?;

        match timeout(
            self.timeout,
            Self::drive(&mut child, stdin, stdout, stderr, request, progress),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                let _ = child.kill().await;
                Err(RunnerError::Timeout(self.timeout.as_secs()))
            }
        }
    }
}

#[cfg(test)]
#[path = "bridge_tests.rs"]
mod tests;
