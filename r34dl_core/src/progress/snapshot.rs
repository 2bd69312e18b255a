use serde::Serialize;

/// Aggregate progress of one acquisition run.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressSnapshot {
    /// Items that reached Downloaded or Skipped.
    pub processed: usize,
    pub quantity: usize,
    pub downloaded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub disabled: usize,
    /// Identifier of the item behind the latest event.
    pub last_item: Option<String>,
    pub items_per_sec: f64,
    pub eta_secs: f64,
    pub done: bool,
}

impl ProgressSnapshot {
    pub fn empty(quantity: usize) -> Self {
        Self {
            processed: 0,
            quantity,
            downloaded: 0,
            skipped: 0,
            failed: 0,
            disabled: 0,
            last_item: None,
            items_per_sec: 0.0,
            eta_secs: 0.0,
            done: false,
        }
    }
}

/// Human-readable duration, e.g. `850ms`, `4.2s`, `3.1m`, `1.5h`.
pub fn format_duration(secs: f64) -> String {
    if secs < 1.0 {
        format!("{}ms", (secs * 1000.0).round() as u64)
    } else if secs < 60.0 {
        format!("{:.1}s", secs)
    } else if secs < 3600.0 {
        format!("{:.1}m", secs / 60.0)
    } else {
        format!("{:.1}h", secs / 3600.0)
    }
}
