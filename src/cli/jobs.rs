use super::{JobCommand, ui};
use crate::monitor::{Monitor, QuoteRefreshReport, ReconcileReport, SnapshotReport};
use anyhow::Result;

impl QuoteRefreshReport {
    pub fn summary(&self) -> String {
        if self.skipped {
            return "Outside trading hours or market closed, no quotes fetched".to_string();
        }
        format!(
            "Received {}/{} stock quotes, recorded {} fund estimates",
            self.received, self.requested, self.snapshots
        )
    }
}

impl SnapshotReport {
    pub fn summary(&self) -> String {
        if self.skipped {
            return "Market closed today, no snapshots written".to_string();
        }
        format!("Saved snapshots for {} portfolios", self.portfolios)
    }
}

impl ReconcileReport {
    pub fn summary(&self) -> String {
        let mut text = format!(
            "Checked {} funds, {} with a new NAV",
            self.checked, self.updated
        );
        if self.unavailable > 0 {
            text.push_str(&format!(", {} unavailable", self.unavailable));
        }
        text
    }
}

/// Runs one scheduler job immediately, at the monitor's current time.
pub async fn run(monitor: &Monitor, command: JobCommand) -> Result<()> {
    let pb = ui::new_spinner("Running job...");
    let summary = match command {
        JobCommand::RefreshQuotes => monitor
            .refresh_quotes_at(monitor.now())
            .await
            .map(|r| r.summary()),
        JobCommand::Snapshot => monitor
            .snapshot_portfolios_at(monitor.now())
            .await
            .map(|r| r.summary()),
        JobCommand::ReconcileNav => monitor.reconcile_navs().await.map(|r| r.summary()),
    };
    pb.finish_and_clear();
    println!("{}", summary?);
    Ok(())
}
