use crate::error::{BenchError, BenchResult};
use hyper::Uri;
use std::path::PathBuf;
use std::time::Duration;

/// How probes are fanned out over the workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanOut {
    /// Every worker runs exactly one probe.
    PerWorker,
    /// Workers keep probing until this many attempts have finished.
    TargetSamples(usize),
}

/// What a failed probe does to the rest of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Abort every in-flight probe and surface the first failure.
    #[default]
    FailFast,
    /// Record the failure and keep probing.
    CollectErrors,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub connect: Duration,
    /// TLS handshake plus handing the connection over to the request.
    pub handshake: Duration,
    pub pool_idle: Duration,
    /// Whole probe, from resolving the host to reading the last body byte.
    pub request: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(10),
            handshake: Duration::from_secs(10),
            pool_idle: Duration::from_secs(30),
            request: Duration::from_secs(30),
        }
    }
}

/// Concurrency settings of a single run, independent of what is probed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunPlan {
    pub concurrency: usize,
    pub fan_out: FanOut,
    pub failure_policy: FailurePolicy,
}

impl RunPlan {
    pub fn validate(&self) -> BenchResult<()> {
        if self.concurrency == 0 {
            return Err(BenchError::InvalidInput(
                "concurrency must be a positive number".to_string(),
            ));
        }
        if self.fan_out == FanOut::TargetSamples(0) {
            return Err(BenchError::InvalidInput(
                "number of requests must be a positive number".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct BenchConfig {
    pub url: Uri,
    pub plan: RunPlan,
    pub timeouts: Timeouts,
    pub insecure: bool,
    pub ca_cert: Option<PathBuf>,
}

impl BenchConfig {
    pub fn new(url: &str, concurrency: usize) -> BenchResult<Self> {
        Ok(Self {
            url: normalize_url(url)?,
            plan: RunPlan {
                concurrency,
                fan_out: FanOut::PerWorker,
                failure_policy: FailurePolicy::default(),
            },
            timeouts: Timeouts::default(),
            insecure: false,
            ca_cert: None,
        })
    }

    pub fn with_fan_out(mut self, fan_out: FanOut) -> Self {
        self.plan.fan_out = fan_out;
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.plan.failure_policy = policy;
        self
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn validate(&self) -> BenchResult<()> {
        self.plan.validate()
    }
}

/// Parses the target, defaulting to `http://` when no scheme is given.
pub fn normalize_url(raw: &str) -> BenchResult<Uri> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(BenchError::InvalidInput("no url given".to_string()));
    }
    let with_scheme = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("http://{}", raw)
    };
    let uri: Uri = with_scheme
        .parse()
        .map_err(|e| BenchError::InvalidInput(format!("invalid url {}: {}", raw, e)))?;
    match uri.scheme_str() {
        Some("http") | Some("https") => {}
        _ => {
            return Err(BenchError::InvalidInput(format!(
                "unsupported scheme in url {}",
                raw
            )))
        }
    }
    if uri.host().map_or(true, str::is_empty) {
        return Err(BenchError::InvalidInput(format!("no host in url {}", raw)));
    }
    Ok(uri)
}
