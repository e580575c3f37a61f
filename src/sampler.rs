//! Status sampler
//!
//! Polls `GET /status` on a fixed cadence for a bounded wall-clock window.
//! A failed poll is logged and skipped; the loop only ends when the window
//! has elapsed.

use crate::client::ServiceClient;
use crate::error::{RequestError, RequestResult, SamplerError};
use crate::types::StatusSnapshot;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

pub const STATUS_PATH: &str = "/status";

/// What one sampler tick produced, handed to the observer as it happens.
#[derive(Debug)]
pub enum Tick<'a> {
    Snapshot(&'a StatusSnapshot),
    Failed(&'a RequestError),
}

/// Polls the status resource through a [`ServiceClient`].
pub struct StatusSampler<'a, C: ServiceClient + ?Sized> {
    client: &'a C,
    timeout: Duration,
}

impl<'a, C: ServiceClient + ?Sized> StatusSampler<'a, C> {
    /// `timeout` bounds each individual poll and should be shorter than the
    /// tick interval.
    pub fn new(client: &'a C, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Issue a single status poll.
    pub async fn sample_once(&self) -> RequestResult<StatusSnapshot> {
        let body = self.client.get(STATUS_PATH, self.timeout).await?;
        let raw = body.to_string();
        StatusSnapshot::from_value(body).map_err(|e| RequestError::Shape {
            detail: e.to_string(),
            body: raw,
        })
    }

    /// Poll for `duration`, one tick every `interval`.
    pub async fn sample_for(&self, duration: Duration, interval: Duration) -> SampleWindow {
        self.sample_for_observed(duration, interval, |_| {}).await
    }

    /// Like [`Self::sample_for`], calling `observer` after every tick.
    pub async fn sample_for_observed<F>(
        &self,
        duration: Duration,
        interval: Duration,
        mut observer: F,
    ) -> SampleWindow
    where
        F: FnMut(Tick<'_>),
    {
        let started = Instant::now();
        let mut window = SampleWindow::default();

        while started.elapsed() < duration {
            match self.sample_once().await {
                Ok(snapshot) => {
                    observer(Tick::Snapshot(&snapshot));
                    window.snapshots.push(snapshot);
                }
                Err(err) => {
                    warn!("Status poll failed, skipping tick: {}", err);
                    observer(Tick::Failed(&err));
                    window.failed_ticks += 1;
                }
            }

            let remaining = duration.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                break;
            }
            sleep(interval.min(remaining)).await;
        }

        window.elapsed = started.elapsed();
        debug!(
            "Sampling window closed after {:?}: {} snapshots, {} failed polls",
            window.elapsed,
            window.snapshots.len(),
            window.failed_ticks
        );
        window
    }
}

/// A status counter that went backwards between two consecutive snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterRegression {
    /// Index of the later snapshot in the window
    pub index: usize,
    pub counter: &'static str,
    pub previous: u64,
    pub current: u64,
}

impl std::fmt::Display for CounterRegression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} decreased at sample {} ({} -> {})",
            self.counter, self.index, self.previous, self.current
        )
    }
}

/// Ordered snapshots collected during one sampling window.
#[derive(Debug, Clone, Default)]
pub struct SampleWindow {
    snapshots: Vec<StatusSnapshot>,
    failed_ticks: usize,
    elapsed: Duration,
}

impl SampleWindow {
    /// Build a window from already collected snapshots.
    pub fn from_snapshots(snapshots: Vec<StatusSnapshot>) -> Self {
        Self {
            snapshots,
            ..Self::default()
        }
    }

    pub fn snapshots(&self) -> &[StatusSnapshot] {
        &self.snapshots
    }

    pub fn failed_ticks(&self) -> usize {
        self.failed_ticks
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn latest(&self) -> Option<&StatusSnapshot> {
        self.snapshots.last()
    }

    pub fn into_snapshots(self) -> Vec<StatusSnapshot> {
        self.snapshots
    }

    /// The most recent snapshot, or a sampler failure if none was obtained.
    pub fn require_snapshot(&self) -> Result<&StatusSnapshot, SamplerError> {
        self.latest().ok_or(SamplerError::NoSnapshots {
            failed_ticks: self.failed_ticks,
        })
    }

    /// Highest progress reported; `None` if nothing was sampled.
    pub fn max_progress(&self) -> Option<f64> {
        self.snapshots
            .iter()
            .map(|s| s.progress)
            .fold(None, |max, p| Some(max.map_or(p, |m: f64| m.max(p))))
    }

    /// Highest retry counter reported; `None` if nothing was sampled.
    pub fn max_retries(&self) -> Option<u64> {
        self.snapshots.iter().map(|s| s.total_retries).max()
    }

    /// Distinct phase labels in order of first appearance.
    pub fn distinct_phases(&self) -> Vec<&str> {
        let mut phases: Vec<&str> = Vec::new();
        for snapshot in &self.snapshots {
            let phase = snapshot.phase_label();
            if !phases.contains(&phase) {
                phases.push(phase);
            }
        }
        phases
    }

    /// Every place where `total_bytes` or `total_messages` decreased.
    pub fn counter_regressions(&self) -> Vec<CounterRegression> {
        let mut regressions = Vec::new();
        for (offset, pair) in self.snapshots.windows(2).enumerate() {
            let (previous, current) = (&pair[0], &pair[1]);
            let index = offset + 1;

            if current.total_bytes < previous.total_bytes {
                regressions.push(CounterRegression {
                    index,
                    counter: "total_bytes",
                    previous: previous.total_bytes,
                    current: current.total_bytes,
                });
            }
            if current.total_messages < previous.total_messages {
                regressions.push(CounterRegression {
                    index,
                    counter: "total_messages",
                    previous: previous.total_messages,
                    current: current.total_messages,
                });
            }
        }
        regressions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::testing::{status_json, ScriptedClient};

    fn snapshot(
        phase: &str,
        progress: f64,
        messages: u64,
        bytes: u64,
        retries: u64,
    ) -> StatusSnapshot {
        StatusSnapshot {
            current_phase: phase.to_string(),
            progress,
            total_messages: messages,
            total_bytes: bytes,
            total_retries: retries,
            ..StatusSnapshot::default()
        }
    }

    #[test]
    fn test_aggregates() {
        let window = SampleWindow::from_snapshots(vec![
            snapshot("Idle", 0.0, 0, 0, 0),
            snapshot("Round1Commitment", 0.4, 3, 192, 1),
            snapshot("Round2SignatureShare", 0.9, 6, 384, 3),
            snapshot("Round1Commitment", 0.7, 6, 384, 2),
        ]);

        assert_eq!(window.max_progress(), Some(0.9));
        assert_eq!(window.max_retries(), Some(3));
        assert_eq!(
            window.distinct_phases(),
            vec!["Idle", "Round1Commitment", "Round2SignatureShare"]
        );
        assert!(window.counter_regressions().is_empty());
    }

    #[test]
    fn test_empty_window_is_a_sampler_failure() {
        let window = SampleWindow::default();
        assert_eq!(window.max_progress(), None);
        assert_eq!(window.max_retries(), None);
        assert_eq!(
            window.require_snapshot().unwrap_err(),
            SamplerError::NoSnapshots { failed_ticks: 0 }
        );
    }

    #[test]
    fn test_zero_progress_is_not_a_sampler_failure() {
        let window = SampleWindow::from_snapshots(vec![snapshot("Idle", 0.0, 0, 0, 0)]);
        assert!(window.require_snapshot().is_ok());
        assert_eq!(window.max_progress(), Some(0.0));
    }

    #[test]
    fn test_counter_regressions_are_reported() {
        let window = SampleWindow::from_snapshots(vec![
            snapshot("A", 0.1, 2, 128, 0),
            snapshot("A", 0.2, 1, 256, 0),
            snapshot("A", 0.3, 3, 64, 0),
        ]);

        let regressions = window.counter_regressions();
        assert_eq!(regressions.len(), 2);
        assert_eq!(regressions[0].counter, "total_messages");
        assert_eq!(regressions[0].index, 1);
        assert_eq!(regressions[1].counter, "total_bytes");
        assert_eq!(regressions[1].previous, 256);
        assert_eq!(regressions[1].current, 64);
    }

    #[tokio::test]
    async fn test_failed_ticks_do_not_abort_the_window() {
        let client = ScriptedClient::new().on_get(STATUS_PATH, |call| {
            if call % 2 == 0 {
                Err(TransportError::Timeout.into())
            } else {
                Ok(status_json("Idle", 0.0, 0, 0, 0))
            }
        });

        let sampler = StatusSampler::new(&client, Duration::from_millis(10));
        let window = sampler
            .sample_for(Duration::from_millis(200), Duration::from_millis(20))
            .await;

        assert!(window.failed_ticks() >= 1);
        assert!(!window.is_empty());
        assert!(client.call_count("GET", STATUS_PATH) >= 3);
        assert!(window.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_window_ends_on_time_not_on_count() {
        let client = ScriptedClient::new()
            .on_get(STATUS_PATH, |_| Err(TransportError::ConnectionRefused.into()));

        let sampler = StatusSampler::new(&client, Duration::from_millis(10));
        let window = sampler
            .sample_for(Duration::from_millis(120), Duration::from_millis(30))
            .await;

        assert!(window.is_empty());
        assert!(window.failed_ticks() >= 2);
        assert!(matches!(
            window.require_snapshot(),
            Err(SamplerError::NoSnapshots { .. })
        ));
    }

    #[tokio::test]
    async fn test_malformed_status_is_a_failed_tick() {
        let client = ScriptedClient::new()
            .on_get(STATUS_PATH, |_| Ok(serde_json::json!(["not", "an", "object"])));

        let sampler = StatusSampler::new(&client, Duration::from_millis(10));
        let err = sampler.sample_once().await.unwrap_err();
        assert!(matches!(err, RequestError::Shape { .. }));
    }

    #[tokio::test]
    async fn test_observer_sees_every_tick() {
        let client = ScriptedClient::new()
            .on_get(STATUS_PATH, |call| Ok(status_json("Idle", 0.0, call as u64, 0, 0)));

        let sampler = StatusSampler::new(&client, Duration::from_millis(10));
        let mut seen = 0;
        let window = sampler
            .sample_for_observed(Duration::from_millis(100), Duration::from_millis(20), |tick| {
                if let Tick::Snapshot(_) = tick {
                    seen += 1;
                }
            })
            .await;

        assert_eq!(seen, window.snapshots().len());
    }
}
