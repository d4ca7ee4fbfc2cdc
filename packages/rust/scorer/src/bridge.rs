//! Subprocess bridge to an external embedding/LLM similarity service.
//!
//! Spawns the bridge subprocess once, then exchanges JSON-lines messages
//! over stdin/stdout: a `ready` handshake, `score` requests answered by
//! `result`/`error` messages, and a final `shutdown`. Every failure mode
//! (spawn, protocol, backend) maps to `ScorerUnavailable` so the matcher
//! degrades to "tier 3 not available" instead of failing the batch.

use std::io::{BufRead, BufReader, Write};
use std::process::{Child, Command, Stdio};
use std::sync::Mutex;

use tracing::{info, warn};

use lineup_shared::{LineupError, Result};

use crate::{SimilarityScorer, clamp_similarity};

// ---------------------------------------------------------------------------
// Protocol types (mirroring the bridge schemas)
// ---------------------------------------------------------------------------

/// Request message sent to the bridge.
#[derive(Debug, serde::Serialize)]
#[serde(tag = "type")]
enum RequestMessage {
    #[serde(rename = "score")]
    Score {
        id: String,
        text_a: String,
        text_b: String,
    },
    #[serde(rename = "shutdown")]
    Shutdown,
}

/// Response message received from the bridge.
#[derive(Debug, serde::Deserialize)]
#[serde(tag = "type")]
enum ResponseMessage {
    #[serde(rename = "ready")]
    Ready,
    #[serde(rename = "result")]
    Result { id: String, similarity: f64 },
    #[serde(rename = "error")]
    Error {
        #[allow(dead_code)]
        id: String,
        error: String,
    },
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Configuration for the bridge subprocess.
#[derive(Debug, Clone)]
pub struct BridgeScorerConfig {
    /// Bridge command (e.g., "python3").
    pub bridge_cmd: String,
    /// Bridge script path.
    pub bridge_script: String,
    /// Working directory for the subprocess.
    pub working_dir: String,
    /// Backend identifier reported via [`SimilarityScorer::id`].
    pub scorer_id: String,
}

// ---------------------------------------------------------------------------
// Bridge handle
// ---------------------------------------------------------------------------

/// Handle to the spawned bridge subprocess.
#[derive(Debug)]
struct BridgeHandle {
    child: Child,
    stdin: std::process::ChildStdin,
    reader: BufReader<std::process::ChildStdout>,
    request_counter: u64,
}

impl BridgeHandle {
    /// Spawn the bridge subprocess and wait for its ready signal.
    fn spawn(config: &BridgeScorerConfig) -> Result<Self> {
        info!(cmd = %config.bridge_cmd, script = %config.bridge_script, "spawning scorer bridge");

        let mut child = Command::new(&config.bridge_cmd)
            .arg(&config.bridge_script)
            .current_dir(&config.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit()) // Bridge logs go to parent stderr
            .spawn()
            .map_err(|e| {
                LineupError::scorer_unavailable(format!(
                    "failed to spawn bridge: {e}. Is `{}` installed?",
                    config.bridge_cmd
                ))
            })?;

        let stdin = child.stdin.take().ok_or_else(|| {
            LineupError::scorer_unavailable("failed to capture bridge stdin")
        })?;

        let stdout = child.stdout.take().ok_or_else(|| {
            LineupError::scorer_unavailable("failed to capture bridge stdout")
        })?;

        let reader = BufReader::new(stdout);

        let mut handle = Self {
            child,
            stdin,
            reader,
            request_counter: 0,
        };

        handle.wait_for_ready()?;

        Ok(handle)
    }

    /// Wait for the bridge to send its "ready" message.
    fn wait_for_ready(&mut self) -> Result<()> {
        let line = self.read_line()?;

        let msg: ResponseMessage = serde_json::from_str(line.trim()).map_err(|e| {
            LineupError::scorer_unavailable(format!(
                "invalid bridge ready message: {e} (got: {line})"
            ))
        })?;

        match msg {
            ResponseMessage::Ready => {
                info!("scorer bridge is ready");
                Ok(())
            }
            _ => Err(LineupError::scorer_unavailable(format!(
                "expected ready message, got: {line}"
            ))),
        }
    }

    /// Send a score request and wait for the response.
    fn send_score(&mut self, text_a: &str, text_b: &str) -> Result<f64> {
        self.request_counter += 1;
        let id = format!("req-{}", self.request_counter);

        let request = RequestMessage::Score {
            id: id.clone(),
            text_a: text_a.to_string(),
            text_b: text_b.to_string(),
        };

        let json = serde_json::to_string(&request).map_err(|e| {
            LineupError::scorer_unavailable(format!("failed to serialize request: {e}"))
        })?;

        writeln!(self.stdin, "{json}").map_err(|e| {
            LineupError::scorer_unavailable(format!("failed to write to bridge stdin: {e}"))
        })?;
        self.stdin.flush().map_err(|e| {
            LineupError::scorer_unavailable(format!("failed to flush bridge stdin: {e}"))
        })?;

        let line = self.read_line()?;

        let msg: ResponseMessage = serde_json::from_str(line.trim()).map_err(|e| {
            LineupError::scorer_unavailable(format!(
                "invalid bridge response: {e} (got: {})",
                &line[..line.len().min(200)]
            ))
        })?;

        match msg {
            ResponseMessage::Result {
                id: resp_id,
                similarity,
            } => {
                debug_assert_eq!(resp_id, id);
                Ok(clamp_similarity(similarity))
            }
            ResponseMessage::Error { id: _, error } => {
                Err(LineupError::scorer_unavailable(error))
            }
            ResponseMessage::Ready => Err(LineupError::scorer_unavailable(
                "unexpected ready message during scoring",
            )),
        }
    }

    /// Read one line from the bridge stdout.
    fn read_line(&mut self) -> Result<String> {
        let mut line = String::new();
        self.reader
            .read_line(&mut line)
            .map_err(|e| LineupError::scorer_unavailable(format!("bridge read error: {e}")))?;

        if line.is_empty() {
            return Err(LineupError::scorer_unavailable(
                "bridge closed stdout unexpectedly",
            ));
        }
        Ok(line)
    }

    /// Send shutdown and wait for the bridge to exit.
    fn shutdown(&mut self) {
        if let Ok(json) = serde_json::to_string(&RequestMessage::Shutdown) {
            let _ = writeln!(self.stdin, "{json}");
            let _ = self.stdin.flush();
        }

        match self.child.wait() {
            Ok(status) => info!(?status, "scorer bridge exited"),
            Err(e) => warn!("scorer bridge wait error: {e}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Scorer implementation
// ---------------------------------------------------------------------------

/// Similarity scorer backed by the bridge subprocess.
#[derive(Debug)]
pub struct BridgeScorer {
    scorer_id: String,
    handle: Mutex<BridgeHandle>,
}

impl BridgeScorer {
    /// Spawn the bridge and wait for its ready handshake.
    pub fn spawn(config: &BridgeScorerConfig) -> Result<Self> {
        let handle = BridgeHandle::spawn(config)?;
        Ok(Self {
            scorer_id: config.scorer_id.clone(),
            handle: Mutex::new(handle),
        })
    }
}

#[async_trait::async_trait]
impl SimilarityScorer for BridgeScorer {
    fn id(&self) -> &str {
        &self.scorer_id
    }

    async fn score(&self, text_a: &str, text_b: &str) -> Result<f64> {
        let mut handle = self
            .handle
            .lock()
            .map_err(|_| LineupError::scorer_unavailable("bridge mutex poisoned"))?;
        handle.send_score(text_a, text_b)
    }
}

impl Drop for BridgeScorer {
    fn drop(&mut self) {
        if let Ok(mut handle) = self.handle.lock() {
            handle.shutdown();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
