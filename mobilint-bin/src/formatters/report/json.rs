use anyhow::{Context, Result};
use mobilint_lib::Report;

use super::ReportFormatter;

pub(crate) struct Json;

impl Json {
    pub(crate) const fn new() -> Self {
        Self {}
    }
}

impl ReportFormatter for Json {
    /// Format the report as a JSON object
    fn format(&self, report: &Report) -> Result<String> {
        serde_json::to_string_pretty(report).context("Cannot format report as JSON")
    }
}
