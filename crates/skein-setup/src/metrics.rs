//! Metrics seam -- one record per handled setup request.
//!
//! The sink itself (Prometheus, statsd, ...) lives outside this crate;
//! recorders must tolerate concurrent callers.

use std::time::Duration;

pub trait Recorder: Send + Sync + 'static {
    fn record(&self, duration: Duration, is_error: bool);
}

/// Discards every record. Stands in where no sink is wired up.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRecorder;

impl Recorder for NoopRecorder {
    fn record(&self, _duration: Duration, _is_error: bool) {}
}
