use crate::bench::{BenchRun, SummaryReport};
use serde::Serialize;
use std::fmt::Write;

/// Averages in seconds, as printed with `--json`.
#[derive(Debug, Serialize)]
pub struct SummaryJson {
    pub total: f64,
    pub dns_lookup: f64,
    pub tcp_connection: f64,
    pub connection_acquisition: f64,
    pub server_processing: f64,
    pub content_transfer: f64,
    pub samples: usize,
    pub failed: usize,
}

impl SummaryJson {
    pub fn new(report: &SummaryReport, run: &BenchRun) -> Self {
        let avg = &report.average;
        Self {
            total: avg.total.as_secs_f64(),
            dns_lookup: avg.dns_lookup.as_secs_f64(),
            tcp_connection: avg.tcp_connection.as_secs_f64(),
            connection_acquisition: avg.connection_acquisition.as_secs_f64(),
            server_processing: avg.server_processing.as_secs_f64(),
            content_transfer: avg.content_transfer.as_secs_f64(),
            samples: report.samples,
            failed: run.failures.len(),
        }
    }
}

pub fn render_text(report: &SummaryReport, run: &BenchRun) -> String {
    let avg = &report.average;
    let mut out = String::new();
    let lines = [
        ("Average request time", avg.total),
        ("DNS Lookup", avg.dns_lookup),
        ("TCP Connection", avg.tcp_connection),
        ("Connection Acquisition", avg.connection_acquisition),
        ("Server Processing", avg.server_processing),
        ("Content Transfer", avg.content_transfer),
    ];
    for (label, value) in lines {
        let _ = writeln!(out, "{}: {}s", label, value.as_secs_f64());
    }
    if !run.failures.is_empty() {
        let _ = writeln!(
            out,
            "Samples: {} succeeded, {} failed",
            report.samples,
            run.failures.len()
        );
    }
    out
}

pub fn render_json(report: &SummaryReport, run: &BenchRun) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&SummaryJson::new(report, run))
}
