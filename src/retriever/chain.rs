// Report retrieval fallback chain

use crate::executor::ExecutionResult;
use crate::retriever::extract::{extract_fragment, parse_document, parse_report};
use crate::retriever::{ArtifactStore, Result, RetrievalError, RetryPolicy};
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Which step of the chain produced the payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalStage {
    /// The declared report file
    NamedArtifact,
    /// A neighbor whose name differs from the declared one only in case
    CaseInsensitiveMatch,
    /// Stdout parsed as a whole
    StdoutDocument,
    /// A brace-delimited object inside stdout
    StdoutFragment,
    /// Raw stdout, unparsed (remote only)
    RawOutput,
}

/// A recovered payload and the step that recovered it
#[derive(Debug, Clone, PartialEq)]
pub struct Retrieved {
    pub payload: Value,
    pub stage: RetrievalStage,
}

impl Retrieved {
    fn new(payload: Value, stage: RetrievalStage) -> Self {
        debug!(stage = ?stage, "report retrieved");
        Self { payload, stage }
    }
}

/// Resolves a report payload from a successful run.
///
/// Callers pass only results with `success == true`; a failed run is
/// surfaced as-is and never reaches the chain.
#[derive(Debug, Clone, Default)]
pub struct Retriever {
    policy: RetryPolicy,
}

impl Retriever {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Local backend: bounded wait for the file, then neighbor scan, then stdout
    pub async fn resolve_local(
        &self,
        store: &dyn ArtifactStore,
        result: &ExecutionResult,
        report_path: Option<&Path>,
    ) -> Result<Retrieved> {
        let Some(report_path) = report_path else {
            info!("no report path provided, parsing stdout for JSON");
            return from_stdout(&result.stdout);
        };

        let path = std::path::absolute(report_path).unwrap_or_else(|_| report_path.to_path_buf());

        if let Some(payload) = self.await_artifact(store, &path).await? {
            return Ok(Retrieved::new(payload, RetrievalStage::NamedArtifact));
        }

        info!(
            path = %path.display(),
            attempts = self.policy.attempts(),
            "report file not found after all attempts"
        );

        let mut malformed = None;

        match case_insensitive_match(store, &path).await {
            Ok(Some(payload)) => {
                return Ok(Retrieved::new(payload, RetrievalStage::CaseInsensitiveMatch));
            }
            Ok(None) => {}
            Err(e @ RetrievalError::MalformedPayload { .. }) => malformed = Some(e),
            Err(e) => warn!(error = %e, "failed to scan report directory"),
        }

        info!("attempting to parse stdout for JSON");
        match extract_fragment(&result.stdout) {
            Some(Ok(payload)) => {
                return Ok(Retrieved::new(payload, RetrievalStage::StdoutFragment));
            }
            Some(Err(e)) => {
                warn!(error = %e, "failed to parse JSON from stdout");
                malformed = Some(e);
            }
            None => debug!("no JSON object in stdout"),
        }

        Err(malformed.unwrap_or(RetrievalError::ArtifactUnavailable { path }))
    }

    /// Remote backend: read the artifact in place; fall back to raw stdout
    pub async fn resolve_remote(
        &self,
        store: &dyn ArtifactStore,
        result: &ExecutionResult,
        report_path: Option<&Path>,
    ) -> Result<Retrieved> {
        let raw = || Retrieved::new(Value::String(result.stdout.clone()), RetrievalStage::RawOutput);

        let Some(path) = report_path else {
            return Ok(raw());
        };

        info!(path = %path.display(), "checking for remote report file");
        if !store.exists(path).await {
            warn!(path = %path.display(), "remote report file not found, returning raw output");
            return Ok(raw());
        }

        let parsed = match store.read_to_string(path).await {
            Ok(content) => parse_report(&content, &path.display().to_string()),
            Err(e) => Err(e),
        };

        match parsed {
            Ok(payload) => {
                info!(path = %path.display(), "read and parsed remote report file");
                Ok(Retrieved::new(payload, RetrievalStage::NamedArtifact))
            }
            Err(e) => {
                warn!(error = %e, "remote report unusable, returning raw output");
                Ok(raw())
            }
        }
    }

    /// Sleep, check, repeat. `Ok(None)` once every attempt found nothing
    async fn await_artifact(&self, store: &dyn ArtifactStore, path: &Path) -> Result<Option<Value>> {
        let attempts = self.policy.attempts();
        debug!(
            delay_ms = self.policy.delay.as_millis() as u64,
            attempts = attempts,
            "waiting before checking for report file"
        );

        for attempt in 1..=attempts {
            tokio::time::sleep(self.policy.delay).await;

            if store.exists(path).await {
                info!(path = %path.display(), attempt = attempt, "report file found");
                let content = store.read_to_string(path).await.map_err(|e| {
                    RetrievalError::MalformedPayload {
                        origin: path.display().to_string(),
                        reason: e.to_string(),
                    }
                })?;
                return parse_report(&content, &path.display().to_string()).map(Some);
            }

            if attempt < attempts {
                debug!(attempt = attempt, attempts = attempts, "report file not found, retrying");
            }
        }
        Ok(None)
    }
}

/// Parse stdout when no artifact was declared
fn from_stdout(stdout: &str) -> Result<Retrieved> {
    if let Some(payload) = parse_document(stdout) {
        info!("parsed entire stdout as JSON");
        return Ok(Retrieved::new(payload, RetrievalStage::StdoutDocument));
    }

    debug!("stdout is not pure JSON, extracting embedded object");
    match extract_fragment(stdout) {
        Some(Ok(payload)) => Ok(Retrieved::new(payload, RetrievalStage::StdoutFragment)),
        Some(Err(e)) => {
            warn!(error = %e, "embedded JSON in stdout did not parse");
            Err(e)
        }
        None => {
            info!("no JSON found in stdout");
            Err(RetrievalError::NoJsonOutput)
        }
    }
}

/// Find `path`'s file name in its directory ignoring case
async fn case_insensitive_match(store: &dyn ArtifactStore, path: &Path) -> Result<Option<Value>> {
    let (Some(dir), Some(expected)) = (path.parent(), path.file_name()) else {
        return Ok(None);
    };
    let expected = expected.to_string_lossy().to_lowercase();

    let names = store.list_dir(dir).await?;
    debug!(dir = %dir.display(), entries = names.len(), "scanning report directory");

    let Some(found) = names.iter().find(|name| name.to_lowercase() == expected) else {
        return Ok(None);
    };

    let actual: PathBuf = dir.join(found);
    info!(path = %actual.display(), "found report with case-insensitive match");
    let content = store.read_to_string(&actual).await?;
    parse_report(&content, &actual.display().to_string()).map(Some)
}
