//! Concurrent fan-out of probes

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use futures::future::BoxFuture;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use super::aggregator::{summarize, ResultSet, SummaryReport};
use crate::config::{FailurePolicy, FanOut, RunPlan};
use crate::error::{BenchError, BenchResult, ProbeError};
use crate::timing::PhaseMeasurement;

pub type ProbeOutcome = Result<PhaseMeasurement, ProbeError>;

const PREALLOCATED_PER_WORKER: usize = 64;

/// One instrumented request against a fixed target.
pub trait Probe: Send + Sync + 'static {
    fn probe(&self) -> BoxFuture<'static, ProbeOutcome>;
}

/// Everything a finished run produced.
#[derive(Debug, Default)]
pub struct BenchRun {
    pub results: ResultSet,
    pub failures: Vec<ProbeError>,
}

impl BenchRun {
    pub fn attempted(&self) -> usize {
        self.results.len() + self.failures.len()
    }

    /// Averages the results, reporting a run where every probe failed as such.
    pub fn summarize(&self) -> BenchResult<SummaryReport> {
        match summarize(&self.results) {
            Err(BenchError::EmptyResultSet) if !self.failures.is_empty() => {
                Err(BenchError::AllProbesFailed {
                    failed: self.failures.len(),
                    attempted: self.attempted(),
                })
            }
            other => other,
        }
    }
}

/// Runs probes concurrently and owns the result set while they report in.
///
/// Every probe task sends its outcome over a channel; only [`Orchestrator::run`]
/// touches the results, so appends are serialized by construction.
pub struct Orchestrator<P> {
    plan: RunPlan,
    probe: Arc<P>,
}

impl<P: Probe> Orchestrator<P> {
    pub fn new(plan: RunPlan, probe: Arc<P>) -> Self {
        Self { plan, probe }
    }

    /// Launches the probes and waits until every one of them has terminated.
    pub async fn run(&self) -> BenchResult<BenchRun> {
        self.plan.validate()?;
        let start = Instant::now();
        let concurrency = self.plan.concurrency;
        let (tx, mut rx) = mpsc::channel::<ProbeOutcome>(concurrency);
        let mut workers = JoinSet::new();

        info!(
            concurrency,
            fan_out = ?self.plan.fan_out,
            failure_policy = ?self.plan.failure_policy,
            "Starting run"
        );

        match self.plan.fan_out {
            FanOut::PerWorker => {
                for _ in 0..concurrency {
                    let probe = Arc::clone(&self.probe);
                    let tx = tx.clone();
                    workers.spawn(async move {
                        let outcome = probe.probe().await;
                        let _ = tx.send(outcome).await;
                    });
                }
            }
            FanOut::TargetSamples(target) => {
                let attempts = Arc::new(AtomicUsize::new(0));
                for worker_id in 0..concurrency {
                    workers.spawn(sample_until(
                        worker_id,
                        Arc::clone(&self.probe),
                        Arc::clone(&attempts),
                        target,
                        tx.clone(),
                    ));
                }
            }
        }
        drop(tx);

        let mut run = BenchRun {
            results: ResultSet::with_capacity(self.expected_samples()),
            failures: Vec::new(),
        };
        while let Some(outcome) = rx.recv().await {
            match outcome {
                Ok(measurement) => {
                    debug!(%measurement, "Probe finished");
                    run.results.push(measurement);
                }
                Err(err) => match self.plan.failure_policy {
                    FailurePolicy::FailFast => {
                        error!(error = %err, "Probe failed, aborting run");
                        workers.shutdown().await;
                        return Err(BenchError::Network(err));
                    }
                    FailurePolicy::CollectErrors => {
                        warn!(error = %err, "Probe failed");
                        run.failures.push(err);
                    }
                },
            }
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                return Err(BenchError::Worker(e.to_string()));
            }
        }

        info!(
            succeeded = run.results.len(),
            failed = run.failures.len(),
            elapsed = ?start.elapsed(),
            "Run finished"
        );
        Ok(run)
    }

    /// Initial capacity of the result set. Large targets grow the set as
    /// samples arrive instead of reserving it all up front.
    fn expected_samples(&self) -> usize {
        let concurrency = self.plan.concurrency;
        match self.plan.fan_out {
            FanOut::PerWorker => concurrency,
            FanOut::TargetSamples(target) => target
                .min(concurrency.saturating_mul(PREALLOCATED_PER_WORKER))
                .saturating_add(concurrency - 1),
        }
    }
}

/// Probes until `target` attempts have finished across all workers.
///
/// The counter is checked before a probe starts and bumped after it ends,
/// so workers already in flight when the target is hit still report, and
/// the run may finish up to `concurrency - 1` attempts past the target.
async fn sample_until<P: Probe>(
    worker_id: usize,
    probe: Arc<P>,
    attempts: Arc<AtomicUsize>,
    target: usize,
    tx: mpsc::Sender<ProbeOutcome>,
) {
    let mut own = 0usize;
    while attempts.load(Ordering::Acquire) < target {
        let outcome = probe.probe().await;
        attempts.fetch_add(1, Ordering::AcqRel);
        own += 1;
        if tx.send(outcome).await.is_err() {
            break;
        }
    }
    trace!(worker_id, probes = own, "Worker finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProbeStage;
    use std::time::Duration;

    struct FixedProbe {
        total: Duration,
        calls: AtomicUsize,
    }

    impl FixedProbe {
        fn new(total: Duration) -> Self {
            Self {
                total,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl Probe for FixedProbe {
        fn probe(&self) -> BoxFuture<'static, ProbeOutcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let total = self.total;
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(2)).await;
                Ok(PhaseMeasurement {
                    server_processing: total,
                    total,
                    ..Default::default()
                })
            })
        }
    }

    struct UnresolvableProbe;

    impl Probe for UnresolvableProbe {
        fn probe(&self) -> BoxFuture<'static, ProbeOutcome> {
            Box::pin(async { Err(ProbeError::new(ProbeStage::Dns, "no such host")) })
        }
    }

    /// Fails every third call.
    struct FlakyProbe {
        calls: AtomicUsize,
    }

    impl Probe for FlakyProbe {
        fn probe(&self) -> BoxFuture<'static, ProbeOutcome> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                if call % 3 == 2 {
                    Err(ProbeError::new(ProbeStage::Connect, "connection refused"))
                } else {
                    Ok(PhaseMeasurement::default())
                }
            })
        }
    }

    /// Refuses the first call; every later call hangs for a minute.
    struct FirstCallRefused {
        calls: AtomicUsize,
    }

    impl Probe for FirstCallRefused {
        fn probe(&self) -> BoxFuture<'static, ProbeOutcome> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                if call == 0 {
                    return Err(ProbeError::new(ProbeStage::Connect, "connection refused"));
                }
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(PhaseMeasurement::default())
            })
        }
    }

    fn plan(concurrency: usize, fan_out: FanOut, failure_policy: FailurePolicy) -> RunPlan {
        RunPlan {
            concurrency,
            fan_out,
            failure_policy,
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_per_worker_collects_every_probe() {
        let probe = Arc::new(FixedProbe::new(Duration::from_millis(5)));
        let orchestrator = Orchestrator::new(
            plan(10, FanOut::PerWorker, FailurePolicy::FailFast),
            Arc::clone(&probe),
        );
        let run = orchestrator.run().await.unwrap();
        assert_eq!(run.results.len(), 10);
        assert!(run.failures.is_empty());
        assert_eq!(probe.calls.load(Ordering::SeqCst), 10);

        let report = run.summarize().unwrap();
        assert_eq!(report.average.total, Duration::from_millis(5));
        assert_eq!(report.samples, 10);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_target_samples_overshoot_is_bounded() {
        let concurrency = 4;
        let target = 25;
        let probe = Arc::new(FixedProbe::new(Duration::from_millis(1)));
        let orchestrator = Orchestrator::new(
            plan(concurrency, FanOut::TargetSamples(target), FailurePolicy::FailFast),
            Arc::clone(&probe),
        );
        let run = orchestrator.run().await.unwrap();
        let samples = run.results.len();
        assert!(samples >= target, "got {samples} samples");
        assert!(samples <= target + concurrency - 1, "got {samples} samples");
        assert_eq!(probe.calls.load(Ordering::SeqCst), samples);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_target_samples_single_worker_is_exact() {
        let probe = Arc::new(FixedProbe::new(Duration::from_millis(1)));
        let orchestrator = Orchestrator::new(
            plan(1, FanOut::TargetSamples(7), FailurePolicy::FailFast),
            probe,
        );
        let run = orchestrator.run().await.unwrap();
        assert_eq!(run.results.len(), 7);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_collect_errors_with_unresolvable_host() {
        let orchestrator = Orchestrator::new(
            plan(5, FanOut::PerWorker, FailurePolicy::CollectErrors),
            Arc::new(UnresolvableProbe),
        );
        let run = orchestrator.run().await.unwrap();
        assert!(run.results.is_empty());
        assert_eq!(run.failures.len(), 5);
        assert!(run.failures.iter().all(|e| e.stage == ProbeStage::Dns));
        assert!(matches!(
            summarize(&run.results),
            Err(BenchError::EmptyResultSet)
        ));
        assert!(matches!(
            run.summarize(),
            Err(BenchError::AllProbesFailed {
                failed: 5,
                attempted: 5
            })
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_fail_fast_surfaces_first_error() {
        let orchestrator = Orchestrator::new(
            plan(5, FanOut::PerWorker, FailurePolicy::FailFast),
            Arc::new(UnresolvableProbe),
        );
        match orchestrator.run().await {
            Err(BenchError::Network(err)) => assert_eq!(err.stage, ProbeStage::Dns),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_fail_fast_aborts_in_flight_requests() {
        let orchestrator = Orchestrator::new(
            plan(4, FanOut::PerWorker, FailurePolicy::FailFast),
            Arc::new(FirstCallRefused {
                calls: AtomicUsize::new(0),
            }),
        );
        let start = Instant::now();
        let outcome = tokio::time::timeout(Duration::from_secs(5), orchestrator.run())
            .await
            .expect("fail-fast run waited on hanging workers");
        match outcome {
            Err(BenchError::Network(err)) => assert_eq!(err.stage, ProbeStage::Connect),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_huge_target_fails_fast_without_preallocating() {
        let orchestrator = Orchestrator::new(
            plan(
                2,
                FanOut::TargetSamples(usize::MAX / 2),
                FailurePolicy::FailFast,
            ),
            Arc::new(UnresolvableProbe),
        );
        assert!(matches!(
            orchestrator.run().await,
            Err(BenchError::Network(_))
        ));
    }

    #[test]
    fn test_result_capacity_hint_is_capped() {
        let orchestrator = Orchestrator::new(
            plan(3, FanOut::TargetSamples(usize::MAX), FailurePolicy::FailFast),
            Arc::new(UnresolvableProbe),
        );
        assert_eq!(orchestrator.expected_samples(), 3 * 64 + 2);

        let orchestrator = Orchestrator::new(
            plan(3, FanOut::TargetSamples(10), FailurePolicy::FailFast),
            Arc::new(UnresolvableProbe),
        );
        assert_eq!(orchestrator.expected_samples(), 12);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_collect_errors_terminates_with_target_samples() {
        let orchestrator = Orchestrator::new(
            plan(3, FanOut::TargetSamples(30), FailurePolicy::CollectErrors),
            Arc::new(FlakyProbe {
                calls: AtomicUsize::new(0),
            }),
        );
        let run = orchestrator.run().await.unwrap();
        assert!(run.attempted() >= 30 && run.attempted() <= 32);
        assert_eq!(run.failures.len(), run.attempted() / 3);
        assert!(run.summarize().is_ok());
    }

    #[tokio::test]
    async fn test_zero_concurrency_is_rejected() {
        let orchestrator = Orchestrator::new(
            plan(0, FanOut::PerWorker, FailurePolicy::FailFast),
            Arc::new(UnresolvableProbe),
        );
        assert!(matches!(
            orchestrator.run().await,
            Err(BenchError::InvalidInput(_))
        ));
    }
}
