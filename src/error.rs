//! Error types for a benchmark run

use std::fmt;
use thiserror::Error;

/// Lifecycle stage a probe was in when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeStage {
    /// Building the request before any network activity
    Request,
    Dns,
    Connect,
    /// TLS handshake or handing the connection to the request
    Handoff,
    AwaitingResponse,
    Transfer,
}

impl fmt::Display for ProbeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProbeStage::Request => "request setup",
            ProbeStage::Dns => "DNS lookup",
            ProbeStage::Connect => "TCP connection",
            ProbeStage::Handoff => "connection acquisition",
            ProbeStage::AwaitingResponse => "server processing",
            ProbeStage::Transfer => "content transfer",
        };
        f.write_str(name)
    }
}

/// Failure of a single probe.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{stage} failed: {message}")]
pub struct ProbeError {
    pub stage: ProbeStage,
    pub message: String,
}

impl ProbeError {
    pub fn new(stage: ProbeStage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
        }
    }
}

/// Error surfaced by a benchmark run
#[derive(Error, Debug)]
pub enum BenchError {
    /// Configuration rejected before any probe was launched
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// First probe failure of a fail-fast run
    #[error("network failure during {}: {}", .0.stage, .0.message)]
    Network(ProbeError),

    /// Nothing to average
    #[error("no samples to summarize")]
    EmptyResultSet,

    /// Every probe of an error-collecting run failed
    #[error("all probes failed: 0 of {attempted} samples succeeded, {failed} failed")]
    AllProbesFailed { failed: usize, attempted: usize },

    /// A probe task panicked
    #[error("probe worker error: {0}")]
    Worker(String),
}

/// Result type alias
pub type BenchResult<T> = std::result::Result<T, BenchError>;
