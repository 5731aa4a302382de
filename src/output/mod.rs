//! Run summaries
//!
//! Each worker prints a text summary of its run to the console and can
//! optionally write the same record as JSON for machine consumption.

use anyhow::Context;
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;
use std::time::Duration;

use crate::util::time::format_duration;
use crate::Result;

/// Duration with both seconds and human-readable form
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DurationSummary {
    pub secs: f64,
    pub human: String,
}

impl DurationSummary {
    pub fn from_duration(d: Duration) -> Self {
        Self {
            secs: d.as_secs_f64(),
            human: format_duration(d),
        }
    }
}

/// One registered item, as timed by this worker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemSummary {
    pub item: String,
    pub duration: DurationSummary,
}

/// Complete record of one worker's run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub worker_id: u32,
    pub role: String,
    pub cohort: u32,
    pub hostname: String,
    pub started_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<String>,
    pub items: Vec<ItemSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<DurationSummary>,
}

impl RunSummary {
    /// Start a summary for this worker; stamps the start time and hostname
    pub fn begin(worker_id: u32, role: &str, cohort: u32) -> Self {
        Self {
            worker_id,
            role: role.to_string(),
            cohort,
            hostname: hostname::get()
                .map(|h| h.to_string_lossy().into_owned())
                .unwrap_or_else(|_| "unknown".to_string()),
            started_at: Local::now().to_rfc3339(),
            finished_at: None,
            items: Vec::new(),
            total: None,
        }
    }

    /// Record one completed item
    pub fn record_item(&mut self, item: &str, duration: Duration) {
        self.items.push(ItemSummary {
            item: item.to_string(),
            duration: DurationSummary::from_duration(duration),
        });
    }

    /// Stamp the end of the run
    pub fn finish(&mut self, total: Duration) {
        self.finished_at = Some(Local::now().to_rfc3339());
        self.total = Some(DurationSummary::from_duration(total));
    }
}

/// Print the run summary to the console
pub fn print_summary(summary: &RunSummary) {
    println!("═══════════════════════════════════════════════════════════");
    println!("                    RUN SUMMARY");
    println!("═══════════════════════════════════════════════════════════");
    println!();
    println!(
        "Worker:  {} of {} ({}) on {}",
        summary.worker_id, summary.cohort, summary.role, summary.hostname
    );
    println!("Started: {}", summary.started_at);
    if let Some(ref finished) = summary.finished_at {
        println!("Ended:   {}", finished);
    }
    println!();

    if summary.items.is_empty() {
        println!("Items:   none");
    } else {
        println!("Items:");
        for item in &summary.items {
            println!("  {:<24} {}", item.item, item.duration.human);
        }
    }

    if let Some(ref total) = summary.total {
        println!();
        println!("Total:   {}", total.human);
    }
    println!("═══════════════════════════════════════════════════════════");
}

/// Write the run summary as pretty-printed JSON
pub fn write_summary_json(summary: &RunSummary, path: &Path) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create summary file: {}", path.display()))?;
    serde_json::to_writer_pretty(file, summary).context("Failed to serialize run summary")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_summary_records_items_in_order() {
        let mut summary = RunSummary::begin(1, "follower", 3);
        summary.record_item("scan_a", Duration::from_secs(125));
        summary.record_item("scan_b", Duration::from_secs(40));
        summary.finish(Duration::from_secs(170));

        assert_eq!(summary.items.len(), 2);
        assert_eq!(summary.items[0].item, "scan_a");
        assert_eq!(summary.items[0].duration.human, "2m05s");
        assert_eq!(summary.items[1].item, "scan_b");
        assert!(summary.finished_at.is_some());
        assert_eq!(summary.total.as_ref().unwrap().secs, 170.0);
    }

    #[test]
    fn test_json_round_trip() {
        let mut summary = RunSummary::begin(0, "leader", 2);
        summary.record_item("scan_a", Duration::from_secs(90));
        summary.finish(Duration::from_secs(95));

        let json = serde_json::to_string(&summary).unwrap();
        let parsed: RunSummary = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.worker_id, 0);
        assert_eq!(parsed.role, "leader");
        assert_eq!(parsed.items.len(), 1);
        assert_eq!(parsed.items[0].duration.human, "1m30s");
    }

    #[test]
    fn test_unfinished_summary_omits_end_fields() {
        let summary = RunSummary::begin(2, "follower", 4);
        let json = serde_json::to_string(&summary).unwrap();
        assert!(!json.contains("finished_at"));
        assert!(!json.contains("total"));
    }

    #[test]
    fn test_write_summary_json_creates_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("summary.json");

        let mut summary = RunSummary::begin(0, "leader", 1);
        summary.finish(Duration::from_secs(10));
        write_summary_json(&summary, &path).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let parsed: RunSummary = serde_json::from_str(&contents).unwrap();
        assert_eq!(parsed.cohort, 1);
    }
}
