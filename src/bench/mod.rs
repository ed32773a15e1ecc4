pub mod aggregator;
pub mod orchestrator;

pub use aggregator::SummaryReport;
pub use orchestrator::{BenchRun, Orchestrator, Probe, ProbeOutcome};

use crate::config::BenchConfig;
use crate::error::BenchResult;
use crate::http::probe::HttpProbe;
use std::sync::Arc;

/// Probes `config.url` over HTTP(S) according to the run plan.
pub async fn run(config: &BenchConfig) -> BenchResult<BenchRun> {
    config.validate()?;
    let probe = HttpProbe::new(config)?;
    Orchestrator::new(config.plan, Arc::new(probe)).run().await
}
