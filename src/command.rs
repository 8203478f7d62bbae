//! External command oracles
//!
//! Any program that reads SQL on stdin and answers on stdout can act as
//! translator, validator or repairer. Validators signal acceptance with a
//! zero exit status and report the error on stderr otherwise.

use std::io::ErrorKind;
use std::process::{Output, Stdio};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::{ConvertError, ConvertResult};
use crate::oracle::{
    RepairRequest, Repairer, SourceValidator, TargetValidator, Translator, Verdict,
    strip_code_fence,
};

/// A collaborator backed by a child process per call.
#[derive(Debug, Clone)]
pub struct CommandOracle {
    program: String,
    args: Vec<String>,
    mode: String,
}

impl CommandOracle {
    /// Parse a whitespace-separated command line, e.g. `bq-dry-run --quiet`.
    pub fn parse(command_line: &str) -> ConvertResult<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| ConvertError::config("command", command_line, "a program to run"))?;
        Ok(Self {
            program,
            args: parts.collect(),
            mode: "command".to_string(),
        })
    }

    /// Label reported in validator verdicts.
    pub fn with_mode(mut self, mode: impl Into<String>) -> Self {
        self.mode = mode.into();
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Run the program once, feeding `input` on stdin.
    ///
    /// The child is killed if the returned future is dropped.
    async fn exchange(&self, input: &str) -> std::io::Result<Output> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child.stdin.take();
        let payload = input.as_bytes().to_vec();
        let write = async move {
            let Some(mut stdin) = stdin else {
                return Ok(());
            };
            match stdin.write_all(&payload).await {
                // the program may answer without reading everything
                Err(e) if e.kind() == ErrorKind::BrokenPipe => Ok(()),
                other => other,
            }
        };
        let (written, output) = tokio::join!(write, child.wait_with_output());
        written?;
        output
    }

    async fn answer(&self, input: &str) -> Result<String, String> {
        let output = self
            .exchange(input)
            .await
            .map_err(|e| format!("{}: {e}", self.program))?;
        if !output.status.success() {
            return Err(format!("{} failed: {}", self.program, failure_message(&output)));
        }
        Ok(strip_code_fence(&String::from_utf8_lossy(&output.stdout)))
    }

    async fn verdict(&self, sql: &str) -> ConvertResult<Verdict> {
        let output = self
            .exchange(sql)
            .await
            .map_err(|e| ConvertError::Validation(format!("{}: {e}", self.program)))?;
        if output.status.success() {
            Ok(Verdict::valid(&self.mode))
        } else {
            Ok(Verdict::invalid(failure_message(&output), &self.mode))
        }
    }
}

/// stderr, else stdout, else the exit status.
fn failure_message(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.trim().is_empty() {
        return stderr.trim().to_string();
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    if !stdout.trim().is_empty() {
        return stdout.trim().to_string();
    }
    output.status.to_string()
}

#[async_trait]
impl Translator for CommandOracle {
    async fn translate(&self, sql: &str) -> ConvertResult<String> {
        self.answer(sql).await.map_err(ConvertError::Translation)
    }
}

#[async_trait]
impl SourceValidator for CommandOracle {
    async fn validate_source(&self, sql: &str) -> ConvertResult<Verdict> {
        self.verdict(sql).await
    }
}

#[async_trait]
impl TargetValidator for CommandOracle {
    async fn validate_target(&self, sql: &str) -> ConvertResult<Verdict> {
        self.verdict(sql).await
    }
}

/// The repair program receives the request as one JSON document.
#[async_trait]
impl Repairer for CommandOracle {
    async fn repair(&self, request: &RepairRequest<'_>) -> ConvertResult<String> {
        let payload = serde_json::to_string(request)?;
        self.answer(&payload).await.map_err(ConvertError::Repair)
    }
}
