#![allow(unreachable_pub)]

mod error;
mod file;
mod finding;
mod kind;
mod request;

pub use error::ErrorKind;
pub use file::{Language, SourceFile};
pub use finding::{Finding, FindingKind, Severity, Source};
pub use kind::{AnalysisKind, AnalysisMode, AppType};
pub use request::{AnalysisOptions, AnalysisRequest, DEFAULT_MAX_FILES};

/// The mobilint `Result` type
pub type Result<T> = std::result::Result<T, crate::ErrorKind>;
