//! Reduction of a result set into per-phase averages

use crate::error::{BenchError, BenchResult};
use crate::timing::PhaseMeasurement;
use std::time::Duration;

/// Successful measurements of one run, in no particular order.
pub type ResultSet = Vec<PhaseMeasurement>;

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Per-phase arithmetic mean over a result set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SummaryReport {
    pub average: PhaseMeasurement,
    pub samples: usize,
}

/// Averages every phase independently.
///
/// Sums are kept in whole nanoseconds and divided with truncation toward
/// zero, so repeated summaries of the same samples are identical.
pub fn summarize(results: &[PhaseMeasurement]) -> BenchResult<SummaryReport> {
    if results.is_empty() {
        return Err(BenchError::EmptyResultSet);
    }
    let count = results.len() as u128;
    let mean = |field: fn(&PhaseMeasurement) -> Duration| -> Duration {
        let sum: u128 = results.iter().map(|m| field(m).as_nanos()).sum();
        from_nanos(sum / count)
    };

    Ok(SummaryReport {
        average: PhaseMeasurement {
            dns_lookup: mean(|m| m.dns_lookup),
            tcp_connection: mean(|m| m.tcp_connection),
            connection_acquisition: mean(|m| m.connection_acquisition),
            server_processing: mean(|m| m.server_processing),
            content_transfer: mean(|m| m.content_transfer),
            total: mean(|m| m.total),
        },
        samples: results.len(),
    })
}

fn from_nanos(nanos: u128) -> Duration {
    // a mean never exceeds the largest sample, which fit in a Duration
    Duration::new(
        (nanos / NANOS_PER_SEC) as u64,
        (nanos % NANOS_PER_SEC) as u32,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(dns: u64, tcp: u64, acquire: u64, server: u64, transfer: u64) -> PhaseMeasurement {
        let m = PhaseMeasurement {
            dns_lookup: Duration::from_millis(dns),
            tcp_connection: Duration::from_millis(tcp),
            connection_acquisition: Duration::from_millis(acquire),
            server_processing: Duration::from_millis(server),
            content_transfer: Duration::from_millis(transfer),
            total: Duration::ZERO,
        };
        PhaseMeasurement {
            total: m.phase_sum(),
            ..m
        }
    }

    #[test]
    fn test_summarize_empty_is_an_error() {
        assert!(matches!(summarize(&[]), Err(BenchError::EmptyResultSet)));
    }

    #[test]
    fn test_summarize_single_sample_is_identity() {
        let m = PhaseMeasurement {
            dns_lookup: Duration::from_nanos(1_234_567),
            tcp_connection: Duration::from_nanos(7),
            connection_acquisition: Duration::from_nanos(999_999_999),
            server_processing: Duration::from_secs(3),
            content_transfer: Duration::from_nanos(1),
            total: Duration::from_nanos(4_001_234_574),
        };
        let report = summarize(&[m]).unwrap();
        assert_eq!(report.average, m);
        assert_eq!(report.samples, 1);
    }

    #[test]
    fn test_summarize_averages_totals() {
        let results: ResultSet = vec![
            sample(0, 0, 0, 1000, 0),
            sample(0, 0, 0, 2000, 0),
            sample(0, 0, 0, 3000, 0),
        ];
        let report = summarize(&results).unwrap();
        assert_eq!(report.average.total, Duration::from_secs(2));
        assert_eq!(report.average.server_processing, Duration::from_secs(2));
        assert_eq!(report.samples, 3);
    }

    #[test]
    fn test_summarize_total_matches_averaged_phases() {
        let results: ResultSet = vec![
            sample(10, 20, 30, 40, 50),
            sample(12, 18, 0, 400, 5),
            sample(2, 4, 6, 8, 10),
            sample(100, 0, 0, 1, 1),
        ];
        let report = summarize(&results).unwrap();
        assert_eq!(report.average.total, report.average.phase_sum());
    }

    #[test]
    fn test_summarize_truncates() {
        let results: ResultSet = vec![
            PhaseMeasurement {
                total: Duration::from_nanos(1),
                ..Default::default()
            },
            PhaseMeasurement {
                total: Duration::from_nanos(2),
                ..Default::default()
            },
        ];
        let report = summarize(&results).unwrap();
        assert_eq!(report.average.total, Duration::from_nanos(1));
    }
}
