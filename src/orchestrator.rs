//! Verification orchestrator
//!
//! Sequences the phases of one run and maps the aggregate result onto a
//! process exit code:
//!
//! `Health → BaselineMonitor → Sign → SignMonitor → ResponseValidate → EventInspect → Summary`
//!
//! Only a failed health check stops the run early. Later failures are
//! reported, recorded as failed checks where they gate the verdict, and the
//! run carries on.

use crate::client::ServiceClient;
use crate::config::VerifierConfig;
use crate::cycle::{CycleResult, CycleSuccess, SigningCycleDriver, PROGRESS_COMPLETE_THRESHOLD};
use crate::error::{RequestError, RequestResult, TransportError};
use crate::events::{decode, DisplayEvent, EventTally};
use crate::report::Console;
use crate::sampler::{SampleWindow, StatusSampler, Tick};
use crate::types::{HealthInfo, StatusSnapshot};
use crate::validator::{validate, ValidationReport};
use std::fmt;
use std::future::Future;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

pub const HEALTH_PATH: &str = "/health";

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_INTERRUPTED: i32 = 130;

/// Signature characters shown before truncation
const SIGNATURE_PREVIEW_CHARS: usize = 80;

/// Phases of a verification run, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Health,
    BaselineMonitor,
    Sign,
    SignMonitor,
    ResponseValidate,
    EventInspect,
    Summary,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Health => "Health check",
            Phase::BaselineMonitor => "Baseline status monitor",
            Phase::Sign => "Sign request",
            Phase::SignMonitor => "Signing progress monitor",
            Phase::ResponseValidate => "Sign response validation",
            Phase::EventInspect => "Event log inspection",
            Phase::Summary => "Summary",
        };
        f.write_str(name)
    }
}

/// One gating check and whether it passed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckOutcome {
    pub phase: Phase,
    pub passed: bool,
}

/// Everything observed during a run that got past the health check
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub health: HealthInfo,
    pub baseline: SampleWindow,
    pub cycle: CycleResult,
    pub sign_monitor: SampleWindow,
    pub validation: Option<ValidationReport>,
    /// `None` when event inspection was skipped
    pub events: Option<Vec<DisplayEvent>>,
    pub checks: Vec<CheckOutcome>,
}

impl RunSummary {
    /// Conjunction of every gating check
    pub fn passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    pub fn check(&self, phase: Phase) -> Option<bool> {
        self.checks.iter().find(|c| c.phase == phase).map(|c| c.passed)
    }
}

/// How a run ended
#[derive(Debug, Clone)]
pub enum RunOutcome {
    Completed(Box<RunSummary>),
    /// The health check failed; nothing else ran
    HealthFailed(RequestError),
    /// An external interrupt arrived mid-run
    Interrupted,
}

impl RunOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::Completed(summary) if summary.passed() => EXIT_SUCCESS,
            RunOutcome::Completed(_) | RunOutcome::HealthFailed(_) => EXIT_FAILURE,
            RunOutcome::Interrupted => EXIT_INTERRUPTED,
        }
    }

    pub fn summary(&self) -> Option<&RunSummary> {
        match self {
            RunOutcome::Completed(summary) => Some(&**summary),
            _ => None,
        }
    }
}

/// Runs the verification phases against one service.
pub struct Verifier<C: ServiceClient> {
    client: C,
    config: VerifierConfig,
    console: Console,
}

impl<C: ServiceClient> Verifier<C> {
    pub fn new(client: C, config: VerifierConfig) -> Self {
        Self {
            client,
            config,
            console: Console,
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    /// Run to completion unless `interrupt` resolves first. Interruption drops
    /// whatever request or sleep is in flight and skips the summary.
    pub async fn run_until<I>(&self, interrupt: I) -> RunOutcome
    where
        I: Future<Output = ()>,
    {
        tokio::select! {
            outcome = self.run() => outcome,
            _ = interrupt => {
                warn!("Verification interrupted");
                self.console.blank();
                self.console.warning("Verification interrupted by user");
                RunOutcome::Interrupted
            }
        }
    }

    /// Run every phase in order.
    pub async fn run(&self) -> RunOutcome {
        let run_id = Uuid::new_v4();
        let span = info_span!("verification", %run_id, base_url = %self.config.base_url);
        self.run_phases(run_id).instrument(span).await
    }

    async fn run_phases(&self, run_id: Uuid) -> RunOutcome {
        info!("Starting verification run");
        self.console.banner();

        let health = match self.check_health().await {
            Ok(health) => health,
            Err(err) => {
                warn!("Health check failed, aborting run: {}", err);
                self.console.blank();
                self.console.error("Cannot continue: start the signing service first");
                return RunOutcome::HealthFailed(err);
            }
        };
        let mut checks = vec![CheckOutcome {
            phase: Phase::Health,
            passed: true,
        }];

        let baseline = self.monitor_baseline().await;
        checks.push(CheckOutcome {
            phase: Phase::BaselineMonitor,
            passed: !baseline.is_empty(),
        });

        let (cycle, sign_monitor) = self.sign_and_monitor().await;
        checks.push(CheckOutcome {
            phase: Phase::Sign,
            passed: cycle.is_success(),
        });

        let validation = cycle.success().map(|success| self.validate_response(success));
        if let Some(report) = &validation {
            checks.push(CheckOutcome {
                phase: Phase::ResponseValidate,
                passed: report.all_passed(),
            });
        }

        let latest = latest_snapshot(&baseline, &cycle, &sign_monitor);
        let events = self.inspect_events(latest).await;

        let summary = RunSummary {
            run_id,
            health,
            baseline,
            cycle,
            sign_monitor,
            validation,
            events,
            checks,
        };
        self.print_summary(&summary);

        info!(passed = summary.passed(), "Verification run finished");
        RunOutcome::Completed(Box::new(summary))
    }

    async fn check_health(&self) -> RequestResult<HealthInfo> {
        self.console.header("Step 1: Health Check");

        match self
            .client
            .get(HEALTH_PATH, self.config.health_timeout())
            .await
        {
            Ok(body) => {
                self.console.success("Service is running");
                let health = HealthInfo::from_value(body).unwrap_or_else(|err| {
                    warn!("Health reply could not be decoded: {}", err);
                    self.console.warning(&format!(
                        "Health reply is malformed ({}); details unavailable",
                        err
                    ));
                    HealthInfo::default()
                });
                self.console.health(&health);
                Ok(health)
            }
            Err(err) => {
                match &err {
                    RequestError::Transport(TransportError::ConnectionRefused) => {
                        self.console.error("Cannot connect to the service");
                        self.console.warning("Please make sure that:");
                        self.console.warning("  1. The demo HTTP server has been started");
                        self.console.warning(&format!(
                            "  2. It is listening on {}",
                            self.config.base_url
                        ));
                    }
                    RequestError::Transport(TransportError::Timeout) => {
                        self.console.error(&format!(
                            "Health check timed out after {:?}",
                            self.config.health_timeout()
                        ));
                    }
                    RequestError::Service { status, .. } => {
                        self.console.error(&format!("Health check failed (HTTP {})", status));
                    }
                    other => {
                        self.console.error(&format!("Health check error: {}", other));
                    }
                }
                Err(err)
            }
        }
    }

    async fn monitor_baseline(&self) -> SampleWindow {
        self.console.header("Step 2: Baseline Status Monitor");
        self.console.info(&format!(
            "Monitoring for {:?}...",
            self.config.baseline_window()
        ));
        self.console.blank();

        let console = self.console;
        let sampler = StatusSampler::new(&self.client, self.config.status_timeout());
        let window = sampler
            .sample_for_observed(
                self.config.baseline_window(),
                self.config.poll_interval(),
                |tick| match tick {
                    Tick::Snapshot(snapshot) => console.snapshot_line(snapshot),
                    Tick::Failed(err) => console.error(&format!("Status poll failed: {}", err)),
                },
            )
            .await;

        self.console.blank();
        match window.require_snapshot() {
            Ok(_) => self.console.success("Status monitoring complete"),
            Err(err) => self
                .console
                .error(&format!("Unable to obtain status information: {}", err)),
        }
        for regression in window.counter_regressions() {
            self.console.warning(&regression.to_string());
        }
        window
    }

    async fn sign_and_monitor(&self) -> (CycleResult, SampleWindow) {
        let request = self.config.sign_request();
        let driver = SigningCycleDriver::new(&self.client, &self.config);

        self.console.header("Step 3: Sign Request");
        self.console.info("Sending sign request:");
        self.console.info(&format!("  Message: {}", request.message));
        self.console.info(&format!("  Signers: {:?}", request.signer_ids));
        self.console.blank();

        if self.config.monitor_during_sign {
            self.console.info("Monitoring signing progress while the request runs...");
            self.console.blank();
            let (cycle, window) = tokio::join!(driver.run_cycle(&request), self.monitor_signing());
            self.console.blank();
            self.report_cycle(&cycle);
            self.console.header("Step 4: Signing Progress");
            self.report_sign_monitor(&window);
            (cycle, window)
        } else {
            self.console.info("Signing in progress...");
            let cycle = driver.run_cycle(&request).await;
            self.report_cycle(&cycle);
            self.console.header("Step 4: Signing Progress");
            let window = self.monitor_signing().await;
            self.report_sign_monitor(&window);
            (cycle, window)
        }
    }

    async fn monitor_signing(&self) -> SampleWindow {
        let console = self.console;
        let sampler = StatusSampler::new(&self.client, self.config.status_timeout());
        sampler
            .sample_for_observed(
                self.config.sign_monitor_window(),
                self.config.poll_interval(),
                |tick| match tick {
                    Tick::Snapshot(snapshot) => console.progress_line(snapshot),
                    Tick::Failed(err) => console.error(&format!("Monitor poll failed: {}", err)),
                },
            )
            .await
    }

    fn report_cycle(&self, cycle: &CycleResult) {
        match cycle {
            CycleResult::Success(success) => self.report_success(success),
            CycleResult::TimedOut => self.console.error(&format!(
                "Sign request timed out (over {:?})",
                self.config.sign_timeout()
            )),
            CycleResult::Unreachable(err) => self
                .console
                .error(&format!("Sign request failed: {}", err)),
            CycleResult::ServiceRejected { status, body } => {
                self.console.error(&format!("Sign request failed (HTTP {})", status));
                self.console.error(&format!("Response: {}", body));
            }
        }
    }

    fn report_success(&self, success: &CycleSuccess) {
        let response = &success.response;
        self.console.success("Sign request succeeded");
        self.console.blank();
        self.console.info("Sign result:");
        self.console.info(&format!("  Message: {}", response.message));
        self.console.info(&format!("  Signers: {:?}", response.signer_ids));
        let preview: String = response
            .signature
            .chars()
            .take(SIGNATURE_PREVIEW_CHARS)
            .collect();
        self.console.info(&format!("  Signature (hex): {}...", preview));
        if response.verified {
            self.console.success("  Verification: passed");
        } else {
            self.console.error("  Verification: failed");
        }
        self.console.blank();

        let describe = |snapshot: &Option<StatusSnapshot>| match snapshot {
            Some(s) => format!("total_bytes={}, progress={:.2}", s.total_bytes, s.progress),
            None => "unavailable".to_string(),
        };
        self.console.info(&format!("Before: {}", describe(&success.before)));
        self.console.info(&format!("After: {}", describe(&success.after)));

        if success.deltas.byte_delta_ok {
            self.console.success("total_bytes did not decrease");
        }
        if success.deltas.message_delta_ok {
            self.console.success("total_messages did not decrease");
        }
        if success.deltas.progress_reached_ok {
            self.console.success(&format!(
                "progress reached {:.2}",
                PROGRESS_COMPLETE_THRESHOLD
            ));
        }
        for warning in &success.warnings {
            self.console.warning(warning);
        }
    }

    fn report_sign_monitor(&self, window: &SampleWindow) {
        if window.is_empty() {
            self.console.warning("No status obtained while monitoring the signing process");
            return;
        }

        self.console.info(&format!(
            "Phases observed: {}",
            window.distinct_phases().join(", ")
        ));
        self.console.info(&format!(
            "Max progress: {:.2}",
            window.max_progress().unwrap_or_default()
        ));
        let max_retries = window.max_retries().unwrap_or_default();
        self.console.info(&format!("Total retries: {}", max_retries));
        self.console.blank();

        if max_retries > 0 {
            self.console.success(&format!(
                "Retransmission observed (total_retries = {})",
                max_retries
            ));
            self.console.info("  The packet-loss simulation is active");
        } else {
            self.console.warning("No retransmission observed (total_retries = 0)");
            self.console.info("  Packet loss is probabilistic; a clean run is possible");
        }
        for regression in window.counter_regressions() {
            self.console.warning(&regression.to_string());
        }
    }

    fn validate_response(&self, success: &CycleSuccess) -> ValidationReport {
        self.console.header("Step 5: Validate Sign Response");
        let report = validate(&success.raw);
        self.console.validation(&report);
        report
    }

    async fn inspect_events(&self, latest: Option<StatusSnapshot>) -> Option<Vec<DisplayEvent>> {
        self.console.header("Step 6: Event Log");

        let Some(latest) = latest else {
            self.console.warning("Skipping event inspection: no status was ever retrieved");
            return None;
        };

        let sampler = StatusSampler::new(&self.client, self.config.status_timeout());
        let snapshot = match sampler.sample_once().await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!("Event inspection could not refresh status: {}", err);
                self.console.warning(&format!(
                    "Could not refresh status ({}); using the last snapshot seen",
                    err
                ));
                latest
            }
        };

        if snapshot.recent_events.is_empty() {
            self.console.warning("Event log is empty");
            self.console.info("The service may have reset its state after the last sign request");
            return Some(Vec::new());
        }

        let events = decode(&snapshot.recent_events);
        self.console.info(&format!(
            "Last {} of {} recent events:",
            events.len(),
            snapshot.recent_events.len()
        ));
        self.console.blank();
        self.console.events(&events);
        self.console.blank();
        self.console.tally(&EventTally::from_events(&events));
        for (message_type, count) in &snapshot.by_type {
            self.console.info(&format!("  {}: {} messages", message_type, count));
        }
        self.console.success("Event log inspection complete");
        Some(events)
    }

    fn print_summary(&self, summary: &RunSummary) {
        self.console.header("Checks");
        for check in &summary.checks {
            if check.passed {
                self.console.success(&format!("{}: passed", check.phase));
            } else {
                self.console.error(&format!("{}: failed", check.phase));
            }
        }
        self.console.final_verdict(summary.passed());
    }
}

/// Most recent snapshot seen anywhere during the run
fn latest_snapshot(
    baseline: &SampleWindow,
    cycle: &CycleResult,
    sign_monitor: &SampleWindow,
) -> Option<StatusSnapshot> {
    let from_cycle = cycle
        .success()
        .and_then(|s| s.after.as_ref().or(s.before.as_ref()));

    from_cycle
        .or_else(|| sign_monitor.latest())
        .or_else(|| baseline.latest())
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cycle::SIGN_PATH;
    use crate::sampler::STATUS_PATH;
    use crate::testing::{fast_config, health_json, signed_response, status_json, ScriptedClient};

    #[test]
    fn test_exit_codes() {
        assert_eq!(RunOutcome::Interrupted.exit_code(), 130);
        assert_eq!(
            RunOutcome::HealthFailed(TransportError::ConnectionRefused.into()).exit_code(),
            1
        );
    }

    #[test]
    fn test_latest_snapshot_prefers_cycle_after() {
        let baseline = SampleWindow::from_snapshots(vec![StatusSnapshot {
            current_phase: "Idle".to_string(),
            ..StatusSnapshot::default()
        }]);
        let monitor = SampleWindow::from_snapshots(vec![StatusSnapshot {
            current_phase: "Round1Commitment".to_string(),
            ..StatusSnapshot::default()
        }]);

        let latest = latest_snapshot(&baseline, &CycleResult::TimedOut, &monitor).unwrap();
        assert_eq!(latest.current_phase, "Round1Commitment");

        let latest = latest_snapshot(&baseline, &CycleResult::TimedOut, &SampleWindow::default());
        assert_eq!(latest.unwrap().current_phase, "Idle");

        assert!(latest_snapshot(
            &SampleWindow::default(),
            &CycleResult::TimedOut,
            &SampleWindow::default()
        )
        .is_none());
    }

    #[tokio::test]
    async fn test_validation_skipped_without_response() {
        let client = ScriptedClient::new()
            .on_get(HEALTH_PATH, |_| Ok(health_json()))
            .on_get(STATUS_PATH, |_| Ok(status_json("Idle", 0.0, 0, 0, 0)))
            .on_post(SIGN_PATH, |_| Err(TransportError::Timeout.into()));

        let outcome = Verifier::new(client, fast_config()).run().await;
        let summary = outcome.summary().unwrap();

        assert_eq!(summary.check(Phase::Sign), Some(false));
        assert_eq!(summary.check(Phase::ResponseValidate), None);
        assert!(summary.validation.is_none());
        assert!(summary.events.is_some());
        assert_eq!(outcome.exit_code(), EXIT_FAILURE);
    }

    #[tokio::test]
    async fn test_sequential_monitoring_mode() {
        let client = ScriptedClient::new()
            .on_get(HEALTH_PATH, |_| Ok(health_json()))
            .on_get(STATUS_PATH, |_| Ok(status_json("Complete", 1.0, 6, 768, 1)))
            .on_post(SIGN_PATH, |_| Ok(signed_response()));
        let mut config = fast_config();
        config.monitor_during_sign = false;

        let verifier = Verifier::new(client, config);
        let outcome = verifier.run().await;

        assert_eq!(outcome.exit_code(), EXIT_SUCCESS);
        let calls = verifier.client().calls();
        let sign_at = calls.iter().position(|c| c == "POST /sign").unwrap();
        let after_sign = &calls[sign_at + 1..];
        assert!(after_sign.iter().filter(|c| *c == "GET /status").count() >= 2);
    }
}
