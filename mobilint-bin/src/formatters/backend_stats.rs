//! Per-backend request statistics, printed after a run with
//! `--backend-stats`.

use mobilint_lib::ratelimit::BackendStatsMap;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Segment},
};

#[derive(Tabled)]
struct BackendStatsTableEntry {
    #[tabled(rename = "Backend")]
    backend: String,
    #[tabled(rename = "Admitted")]
    admitted: u64,
    #[tabled(rename = "Succeeded")]
    succeeded: u64,
    #[tabled(rename = "Failed")]
    failed: u64,
    #[tabled(rename = "Deferred")]
    deferred: u64,
    #[tabled(rename = "Median Time")]
    median_time: String,
}

/// Render the statistics as a table, or `None` if no backend was used
pub(crate) fn backend_stats_table(stats: &BackendStatsMap) -> Option<String> {
    if stats.is_empty() {
        return None;
    }

    let entries: Vec<BackendStatsTableEntry> = stats
        .sorted()
        .into_iter()
        .map(|(backend, stats)| {
            let median_time = stats
                .median_request_time()
                .map_or_else(|| "N/A".to_string(), |d| format!("{}ms", d.as_millis()));

            BackendStatsTableEntry {
                backend: backend.to_string(),
                admitted: stats.admitted,
                succeeded: stats.succeeded,
                failed: stats.failed,
                deferred: stats.deferred,
                median_time,
            }
        })
        .collect();

    let table = Table::new(entries)
        .with(Modify::new(Segment::all()).with(Alignment::left()))
        .with(Style::rounded())
        .to_string();
    Some(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mobilint_lib::Backend;
    use mobilint_lib::ratelimit::BackendStats;
    use std::collections::HashMap;
    use std::time::Duration;

    #[test]
    fn test_no_stats() {
        assert_eq!(backend_stats_table(&BackendStatsMap::default()), None);
    }

    #[test]
    fn test_backend_stats_table() {
        let mut openai = BackendStats::default();
        openai.record_admission();
        openai.record_admission();
        openai.record_success(Duration::from_millis(120));
        openai.record_failure(Duration::from_millis(80));
        let mut llama = BackendStats::default();
        llama.record_deferral();

        let stats = BackendStatsMap::from(HashMap::from([
            (Backend::Llama, llama),
            (Backend::OpenAi, openai),
        ]));
        let table = backend_stats_table(&stats).unwrap();
        let lines: Vec<_> = table.lines().collect();

        assert!(lines[1].contains("Backend"));
        assert!(lines[1].contains("Median Time"));
        // Busiest backend first
        assert!(lines[3].contains("openai"));
        assert!(lines[4].contains("llama"));
        assert!(lines[4].contains("N/A"));
    }
}
