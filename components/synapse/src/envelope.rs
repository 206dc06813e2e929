use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

/// Error reported by the remote computation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    /// Machine readable code agreed between caller and worker, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub message: String,
}

impl std::fmt::Display for JobError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{} ({})", self.message, code),
            None => write!(f, "{}", self.message),
        }
    }
}

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("expected a '{expected}' result, worker produced '{actual}'")]
    KindMismatch { expected: String, actual: String },

    #[error("worker failed: {0}")]
    Worker(JobError),

    #[error("failed to decode '{kind}' payload: {source}")]
    Payload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

/// What every job resolves to: the producing function, a payload and an
/// optional error. The payload is meaningful only when `error` is `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerResult {
    pub kind: String,
    #[serde(default)]
    pub payload: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
}

impl WorkerResult {
    pub fn ok<T: Serialize>(kind: impl Into<String>, value: &T) -> Result<Self, serde_json::Error> {
        Ok(WorkerResult {
            kind: kind.into(),
            payload: serde_json::to_vec(value)?,
            error: None,
        })
    }

    pub fn failed(kind: impl Into<String>, code: Option<&str>, message: impl Into<String>) -> Self {
        WorkerResult {
            kind: kind.into(),
            payload: Vec::new(),
            error: Some(JobError {
                code: code.map(str::to_string),
                message: message.into(),
            }),
        }
    }

    pub fn is_err(&self) -> bool {
        self.error.is_some()
    }

    /// Decodes the payload as `T`, refusing envelopes produced by a different
    /// function and surfacing worker errors.
    pub fn decode<T: DeserializeOwned>(&self, expected_kind: &str) -> Result<T, EnvelopeError> {
        if self.kind != expected_kind {
            return Err(EnvelopeError::KindMismatch {
                expected: expected_kind.to_string(),
                actual: self.kind.clone(),
            });
        }
        if let Some(err) = &self.error {
            return Err(EnvelopeError::Worker(err.clone()));
        }
        serde_json::from_slice(&self.payload).map_err(|source| EnvelopeError::Payload {
            kind: self.kind.clone(),
            source,
        })
    }
}
