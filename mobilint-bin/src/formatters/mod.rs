pub(crate) mod backend_stats;
pub(crate) mod color;
pub(crate) mod log;
pub(crate) mod report;

use self::report::ReportFormatter;
use crate::options::ReportFormat;

/// Create a report formatter based on the given format option
pub(crate) fn get_report_formatter(format: ReportFormat) -> Box<dyn ReportFormatter> {
    match format {
        ReportFormat::Compact => Box::new(report::Compact::new()),
        ReportFormat::Json => Box::new(report::Json::new()),
        ReportFormat::Markdown => Box::new(report::Markdown::new()),
    }
}
