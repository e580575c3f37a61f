//! Console rendering for verification runs
//!
//! Human-readable text on stdout; diagnostics go through `tracing` instead.

use crate::events::{DisplayEvent, EventKind, EventTally};
use crate::types::{HealthInfo, StatusSnapshot};
use crate::validator::ValidationReport;
use colored::{ColoredString, Colorize};

const RULE_WIDTH: usize = 70;
const PROGRESS_BAR_WIDTH: usize = 30;

/// Console output helpers
#[derive(Debug, Clone, Copy, Default)]
pub struct Console;

impl Console {
    pub fn banner(&self) {
        let rule = "═".repeat(RULE_WIDTH - 2);
        println!();
        println!("{}", format!("╔{}╗", rule).magenta().bold());
        println!(
            "{}",
            format!("║{:^width$}║", "FROST-T Demo Verification", width = RULE_WIDTH - 2)
                .magenta()
                .bold()
        );
        println!("{}", format!("╚{}╝", rule).magenta().bold());
        println!();
    }

    pub fn header(&self, text: &str) {
        let rule = "=".repeat(RULE_WIDTH);
        println!();
        println!("{}", rule.cyan().bold());
        println!("{}", format!("{:^width$}", text, width = RULE_WIDTH).cyan().bold());
        println!("{}", rule.cyan().bold());
        println!();
    }

    pub fn success(&self, text: &str) {
        println!("{}", format!("✓ {}", text).green());
    }

    pub fn error(&self, text: &str) {
        println!("{}", format!("✗ {}", text).red());
    }

    pub fn warning(&self, text: &str) {
        println!("{}", format!("⚠ {}", text).yellow());
    }

    pub fn info(&self, text: &str) {
        println!("{}", format!("ℹ {}", text).blue());
    }

    pub fn blank(&self) {
        println!();
    }

    pub fn health(&self, info: &HealthInfo) {
        let show = |value: &Option<String>| value.clone().unwrap_or_else(|| "N/A".to_string());
        self.info(&format!("  Service: {}", show(&info.service)));
        self.info(&format!("  Version: {}", show(&info.version)));
        self.info(&format!("  Status: {}", show(&info.status)));
    }

    /// One line per baseline tick
    pub fn snapshot_line(&self, snapshot: &StatusSnapshot) {
        println!(
            "[{}] Phase: {} | Progress: {} | Messages: {} | Bytes: {:5} | Retries: {:2} | RSSI: {:4} dBm",
            timestamp(),
            format!("{:15}", snapshot.phase_label()).magenta(),
            format!("{:5.1}%", snapshot.progress * 100.0).cyan(),
            format!("{:3}", snapshot.total_messages).yellow(),
            snapshot.total_bytes,
            snapshot.total_retries,
            snapshot.rssi,
        );
    }

    /// One line per sign-monitor tick, with a progress bar
    pub fn progress_line(&self, snapshot: &StatusSnapshot) {
        println!(
            "[{}] {} {:5.1}% | Phase: {} | Retries: {}",
            timestamp(),
            progress_bar(snapshot.progress, PROGRESS_BAR_WIDTH).cyan(),
            snapshot.progress * 100.0,
            format!("{:15}", snapshot.phase_label()).magenta(),
            format!("{:2}", snapshot.total_retries).yellow(),
        );
    }

    pub fn validation(&self, report: &ValidationReport) {
        for detail in &report.details {
            if detail.passed {
                self.success(&detail.message);
            } else {
                self.error(&detail.message);
            }
        }
        self.blank();
        self.info(&format!(
            "Checks passed: {}/{}",
            report.passed_count, report.total_count
        ));
    }

    pub fn events(&self, events: &[DisplayEvent]) {
        for entry in events {
            println!(
                "  {}. {} {}",
                entry.position,
                event_label(entry.event.kind()),
                entry.event
            );
        }
    }

    pub fn tally(&self, tally: &EventTally) {
        self.info(&format!(
            "Starts: {} | Fragments: {} | Lost: {} | Recovered: {} | Completed: {} | Unknown: {}",
            tally.starts,
            tally.fragments,
            tally.lost,
            tally.recovered,
            tally.completed,
            tally.unknown
        ));
    }

    pub fn final_verdict(&self, passed: bool) {
        self.header("Verification Summary");
        if passed {
            println!("{}", "  ✓✓✓ All verification checks passed ✓✓✓".green().bold());
            self.blank();
            self.success("The signing service is ready for the demo");
        } else {
            println!("{}", "  ✗✗✗ Some verification checks failed ✗✗✗".red().bold());
            self.blank();
            self.warning("Review the errors above and fix the reported problems");
            self.blank();
            self.info("Common causes:");
            self.info("  1. Service not started → start the demo HTTP server");
            self.info("  2. Port already in use → stop the other process or change the port");
            self.info("  3. Service built from a broken tree → rebuild the service binary");
        }
    }
}

fn event_label(kind: EventKind) -> ColoredString {
    let label = format!("[{}]", kind.label());
    match kind {
        EventKind::TransmitStart | EventKind::TransmitComplete => label.green(),
        EventKind::TransmitFragment => label.cyan(),
        EventKind::PacketLost => label.red(),
        EventKind::RetrySuccess => label.yellow(),
        EventKind::Unknown => label.dimmed(),
    }
}

fn timestamp() -> String {
    chrono::Local::now().format("%H:%M:%S").to_string()
}

/// Render `progress` (clamped to `[0, 1]`) as a fixed-width bar.
pub fn progress_bar(progress: f64, width: usize) -> String {
    let clamped = if progress.is_finite() {
        progress.clamp(0.0, 1.0)
    } else {
        0.0
    };
    let filled = ((width as f64) * clamped) as usize;
    format!("{}{}", "█".repeat(filled), "░".repeat(width - filled))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_bar() {
        assert_eq!(progress_bar(0.0, 4), "░░░░");
        assert_eq!(progress_bar(0.5, 4), "██░░");
        assert_eq!(progress_bar(1.0, 4), "████");
    }

    #[test]
    fn test_progress_bar_clamps_out_of_range() {
        assert_eq!(progress_bar(1.7, 3), "███");
        assert_eq!(progress_bar(-0.2, 3), "░░░");
        assert_eq!(progress_bar(f64::NAN, 3), "░░░");
        assert_eq!(progress_bar(0.75, 30).chars().count(), 30);
    }
}
