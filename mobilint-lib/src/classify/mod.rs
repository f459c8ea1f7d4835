//! Classification and distribution of fetched files.
//!
//! Runs once per repository analysis, before any file is analyzed:
//!
//! 1. [`detect_app_type`] scores the file set for each supported framework
//! 2. [`should_analyze_file`] and [`is_file_size_acceptable`] drop files that
//!    are not worth analyzing for that app type
//! 3. [`categorize`] buckets the remaining files by language
//! 4. [`distribute`] splits the buckets into one [`Lane`] per backend

mod app_type;
mod filter;
mod lanes;

pub use app_type::detect_app_type;
pub use filter::{MAX_FILE_SIZE, fetch_priority, is_file_size_acceptable, should_analyze_file};
pub use lanes::{FilesByLanguage, Lane, LanguageGroup, categorize, distribute};
