use crate::error::ProbeStage;
use std::fmt;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

/// Lifecycle checkpoints of a single request, filled in by the resolver,
/// the connector wrappers and the traced stream as the request progresses.
///
/// Every slot is first-write-wins, so a hook firing twice (a retried
/// connect, a second read) never moves a checkpoint later.
#[derive(Debug, Default)]
pub struct TraceRecorder {
    dns_start: OnceLock<Instant>,
    dns_done: OnceLock<Instant>,
    connect_start: OnceLock<Instant>,
    conn_done: OnceLock<Instant>,
    got_conn: OnceLock<Instant>,
    first_byte: OnceLock<Instant>,
}

impl TraceRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_dns_start(&self) {
        mark(&self.dns_start, "dns_start");
    }

    pub fn mark_dns_done(&self) {
        mark(&self.dns_done, "dns_done");
    }

    pub fn mark_connect_start(&self) {
        mark(&self.connect_start, "connect_start");
    }

    pub fn mark_conn_done(&self) {
        mark(&self.conn_done, "conn_done");
    }

    pub fn mark_got_conn(&self) {
        mark(&self.got_conn, "got_conn");
    }

    pub fn mark_first_byte(&self) {
        if self.first_byte.get().is_none() {
            mark(&self.first_byte, "first_byte");
        }
    }

    pub fn snapshot(&self) -> Checkpoints {
        Checkpoints {
            dns_start: self.dns_start.get().copied(),
            dns_done: self.dns_done.get().copied(),
            connect_start: self.connect_start.get().copied(),
            conn_done: self.conn_done.get().copied(),
            got_conn: self.got_conn.get().copied(),
            first_byte: self.first_byte.get().copied(),
        }
    }
}

fn mark(slot: &OnceLock<Instant>, name: &'static str) {
    if slot.set(Instant::now()).is_ok() {
        trace!(checkpoint = name, "checkpoint reached");
    }
}

/// Point-in-time copy of a [`TraceRecorder`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoints {
    pub dns_start: Option<Instant>,
    pub dns_done: Option<Instant>,
    pub connect_start: Option<Instant>,
    pub conn_done: Option<Instant>,
    pub got_conn: Option<Instant>,
    pub first_byte: Option<Instant>,
}

impl Checkpoints {
    /// Derives the six phases of a request that completed at `done`.
    ///
    /// DNS that never ran (literal address, no resolver call) collapses to
    /// the start of connection establishment, and a response whose first
    /// byte was never observed collapses the transfer phase onto `done`.
    /// The resulting chain is clamped to be non-decreasing, so each phase is
    /// `end - start` of adjacent checkpoints and they add up to `total`.
    pub fn measure(&self, done: Instant) -> PhaseMeasurement {
        let dns_done_raw = self.dns_done.or(self.connect_start);
        let dns_start = self
            .dns_start
            .or(dns_done_raw)
            .or(self.conn_done)
            .or(self.got_conn)
            .or(self.first_byte)
            .unwrap_or(done);
        let dns_done = not_before(dns_done_raw, dns_start);
        let conn_done = not_before(self.conn_done, dns_done);
        let got_conn = not_before(self.got_conn, conn_done);
        let first_byte = self.first_byte.unwrap_or(done).max(got_conn);
        let done = done.max(first_byte);

        PhaseMeasurement {
            dns_lookup: dns_done - dns_start,
            tcp_connection: conn_done - dns_done,
            connection_acquisition: got_conn - conn_done,
            server_processing: first_byte - got_conn,
            content_transfer: done - first_byte,
            total: done - dns_start,
        }
    }

    /// The lifecycle stage a request was in when these checkpoints were taken.
    pub fn stage_reached(&self) -> ProbeStage {
        if self.first_byte.is_some() {
            ProbeStage::Transfer
        } else if self.got_conn.is_some() {
            ProbeStage::AwaitingResponse
        } else if self.conn_done.is_some() {
            ProbeStage::Handoff
        } else if self.dns_start.is_some() && self.dns_done.is_none() {
            ProbeStage::Dns
        } else {
            ProbeStage::Connect
        }
    }
}

fn not_before(checkpoint: Option<Instant>, previous: Instant) -> Instant {
    checkpoint.map_or(previous, |t| t.max(previous))
}

/// Per-phase durations of one completed request.
///
/// `connection_acquisition` spans from the transport connection being up to
/// the connection being handed to the request. For `https` it contains the
/// TLS handshake, but it is not the handshake alone.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PhaseMeasurement {
    pub dns_lookup: Duration,
    pub tcp_connection: Duration,
    pub connection_acquisition: Duration,
    pub server_processing: Duration,
    pub content_transfer: Duration,
    pub total: Duration,
}

impl PhaseMeasurement {
    pub fn phase_sum(&self) -> Duration {
        self.dns_lookup
            + self.tcp_connection
            + self.connection_acquisition
            + self.server_processing
            + self.content_transfer
    }
}

impl fmt::Display for PhaseMeasurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "dns={:?} tcp={:?} acquire={:?} server={:?} transfer={:?} total={:?}",
            self.dns_lookup,
            self.tcp_connection,
            self.connection_acquisition,
            self.server_processing,
            self.content_transfer,
            self.total
        )
    }
}
