//! An agent backed by an external command.
//!
//! The command is split with shell-words and spawned once per call. It gets
//! one JSON request on stdin and must print one JSON response on stdout:
//!
//! ```text
//! {"task": "analyze", "stage": "line", "text": "...", "bible": {...}}
//!     -> {"letter": "..."} or {"issues": [...]}
//! {"task": "extract_bible", "text": "..."}
//!     -> {"characters": [...], "locations": [...], "timeline": [...], "objects": [...]}
//! {"task": "apply_fixes", "text": "...", "issues": [...]}
//!     -> {"text": "..."}
//! ```
//!
//! The response may be wrapped in a markdown code fence. A non-zero exit
//! status is a failure; anything unparsable is malformed. A cancelled
//! analyze call kills the process.

use std::io::{self, Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::model::{Issue, SeriesBible, StageId, StageReport};

use super::{AgentError, AgentRequest, CancelToken, EditorialAgent};

/// How often a running agent is checked for cancellation.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// An [`EditorialAgent`] that shells out to a configured command.
#[derive(Debug, Clone)]
pub struct CommandAgent {
    program: String,
    args: Vec<String>,
}

#[derive(Serialize)]
#[serde(tag = "task", rename_all = "snake_case")]
enum Task<'a> {
    Analyze {
        stage: StageId,
        text: &'a str,
        #[serde(skip_serializing_if = "Option::is_none")]
        bible: Option<&'a SeriesBible>,
    },
    ExtractBible {
        text: &'a str,
    },
    ApplyFixes {
        text: &'a str,
        issues: &'a [Issue],
    },
}

impl Task<'_> {
    const fn name(&self) -> &'static str {
        match self {
            Self::Analyze { .. } => "analyze",
            Self::ExtractBible { .. } => "extract_bible",
            Self::ApplyFixes { .. } => "apply_fixes",
        }
    }
}

#[derive(Deserialize)]
struct FixedText {
    text: String,
}

impl CommandAgent {
    /// Parses a shell-style command line, e.g. `llm-editor --model big`.
    pub fn new(command: &str) -> Result<Self, AgentError> {
        let mut words = shell_words::split(command)
            .map_err(|e| AgentError::Failed(format!("parse agent command {command:?}: {e}")))?
            .into_iter();
        let program = words
            .next()
            .ok_or_else(|| AgentError::Failed("agent command is empty".to_string()))?;
        Ok(Self {
            program,
            args: words.collect(),
        })
    }

    fn call<T: DeserializeOwned>(
        &self,
        task: &Task<'_>,
        cancel: &CancelToken,
    ) -> Result<T, AgentError> {
        let request =
            serde_json::to_string(task).map_err(|e| AgentError::Failed(e.to_string()))?;
        let response = self.invoke(task.name(), &request, cancel)?;
        serde_json::from_str(extract_json(&response))
            .map_err(|e| AgentError::Malformed(format!("{} response: {e}", task.name())))
    }

    fn invoke(&self, task: &str, request: &str, cancel: &CancelToken) -> Result<String, AgentError> {
        let start = Instant::now();
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| AgentError::Failed(format!("spawn {}: {e}", self.program)))?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        // Both output pipes drain while the request is written.
        let (written, exit, stdout, stderr) = thread::scope(|s| {
            let stdout = s.spawn(move || drain(stdout));
            let stderr = s.spawn(move || drain(stderr));
            let written = stdin.map_or(Ok(()), |mut pipe| pipe.write_all(request.as_bytes()));
            let exit = if written.is_ok() {
                wait(&mut child, cancel)
            } else {
                kill(&mut child);
                Ok(None)
            };
            (written, exit, stdout.join(), stderr.join())
        });
        let stdout = joined(stdout, "stdout")?;
        let stderr = joined(stderr, "stderr")?;
        let stderr = String::from_utf8_lossy(&stderr);

        if let Err(e) = written {
            return Err(AgentError::Failed(format!(
                "write request to {}: {e}: {}",
                self.program,
                stderr.trim()
            )));
        }
        let exit = exit.map_err(|e| AgentError::Failed(format!("wait for {}: {e}", self.program)))?;
        let elapsed_ms = start.elapsed().as_millis();

        let Some(status) = exit else {
            tracing::warn!(task, elapsed_ms, "agent invoke cancelled");
            return Err(AgentError::Cancelled);
        };

        tracing::info!(
            task,
            elapsed_ms,
            request_bytes = request.len(),
            response_bytes = stdout.len(),
            "agent invoke complete"
        );

        if !status.success() {
            return Err(AgentError::Failed(format!(
                "{} exited with {status}: {}",
                self.program,
                stderr.trim()
            )));
        }

        String::from_utf8(stdout)
            .map_err(|e| AgentError::Malformed(format!("stdout is not UTF-8: {e}")))
    }
}

/// Waits for the child, killing it if the call is cancelled.
///
/// `None` means the child was killed.
fn wait(child: &mut Child, cancel: &CancelToken) -> io::Result<Option<ExitStatus>> {
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(Some(status)),
            Ok(None) if cancel.is_cancelled() => {
                kill(child);
                return Ok(None);
            }
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(e) => {
                kill(child);
                return Err(e);
            }
        }
    }
}

/// Kills and reaps the child.
fn kill(child: &mut Child) {
    if let Err(e) = child.kill() {
        tracing::debug!(error = %e, "agent kill failed");
    }
    if let Err(e) = child.wait() {
        tracing::debug!(error = %e, "agent reap failed");
    }
}

fn drain(pipe: Option<impl Read>) -> io::Result<Vec<u8>> {
    let mut bytes = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut bytes)?;
    }
    Ok(bytes)
}

fn joined(reader: thread::Result<io::Result<Vec<u8>>>, pipe: &str) -> Result<Vec<u8>, AgentError> {
    match reader {
        Ok(Ok(bytes)) => Ok(bytes),
        Ok(Err(e)) => Err(AgentError::Failed(format!("read agent {pipe}: {e}"))),
        Err(_) => Err(AgentError::Failed(format!("agent {pipe} reader panicked"))),
    }
}

impl EditorialAgent for CommandAgent {
    fn analyze(&self, request: &AgentRequest<'_>) -> Result<StageReport, AgentError> {
        self.call(
            &Task::Analyze {
                stage: request.stage,
                text: request.text,
                bible: request.bible,
            },
            request.cancel,
        )
    }

    fn extract_bible(&self, text: &str) -> Result<SeriesBible, AgentError> {
        self.call(&Task::ExtractBible { text }, &CancelToken::never())
    }

    fn apply_fixes(&self, text: &str, issues: &[Issue]) -> Result<String, AgentError> {
        self.call::<FixedText>(&Task::ApplyFixes { text, issues }, &CancelToken::never())
            .map(|fixed| fixed.text)
    }
}

/// Strips a surrounding markdown code fence, if any.
fn extract_json(text: &str) -> &str {
    let text = text.trim();

    if let Some(start) = text.find("```json") {
        let start = start + "```json".len();
        if let Some(end) = text[start..].find("```") {
            return text[start..start + end].trim();
        }
    }

    if let Some(start) = text.find("```") {
        let start = start + 3;
        let start = text[start..].find('\n').map_or(start, |i| start + i + 1);
        if let Some(end) = text[start..].find("```") {
            return text[start..start + end].trim();
        }
    }

    text
}
