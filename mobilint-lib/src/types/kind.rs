use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr, VariantNames};

/// The category a file is analyzed for.
///
/// Every report keeps one ordered list of findings per kind.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
    VariantNames,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisKind {
    /// Secrets, insecure transport, injection, weak crypto
    Security,
    /// Main-thread blocking, inefficient loops and rendering
    Performance,
    /// Leaks, retained contexts, unbounded caches
    Memory,
    /// Wake locks, background work, location polling
    Battery,
}

impl AnalysisKind {
    /// All kinds, in report order
    pub const ALL: [AnalysisKind; 4] = [
        AnalysisKind::Security,
        AnalysisKind::Performance,
        AnalysisKind::Memory,
        AnalysisKind::Battery,
    ];
}

/// Whether remote backends may be consulted during a run
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    VariantNames,
    Serialize,
    Deserialize,
)]
pub enum AnalysisMode {
    /// Only the local detectors run. Requests are never deferred.
    #[strum(serialize = "local")]
    #[serde(rename = "local")]
    Local,
    /// Local detectors run first, remote backends augment their results
    #[default]
    #[strum(to_string = "local+remote", serialize = "hybrid")]
    #[serde(rename = "local+remote", alias = "hybrid")]
    LocalRemote,
}

impl AnalysisMode {
    /// `true` if remote backends must never be called
    #[must_use]
    pub const fn is_local_only(self) -> bool {
        matches!(self, AnalysisMode::Local)
    }
}

/// Mobile application framework detected from the repository layout
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    EnumIter,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "camelCase")]
#[serde(rename_all = "camelCase")]
pub enum AppType {
    Flutter,
    ReactNative,
    Xamarin,
    NativeAndroid,
    #[strum(serialize = "nativeIOS")]
    #[serde(rename = "nativeIOS")]
    NativeIos,
    #[default]
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_analysis_mode_from_str() {
        assert_eq!(AnalysisMode::from_str("local").unwrap(), AnalysisMode::Local);
        assert_eq!(
            AnalysisMode::from_str("local+remote").unwrap(),
            AnalysisMode::LocalRemote
        );
        assert_eq!(
            AnalysisMode::from_str("hybrid").unwrap(),
            AnalysisMode::LocalRemote
        );
        assert!(AnalysisMode::from_str("remote").is_err());
        assert_eq!(AnalysisMode::LocalRemote.to_string(), "local+remote");
    }

    #[test]
    fn test_analysis_kind_case_insensitive() {
        assert_eq!(
            AnalysisKind::from_str("Security").unwrap(),
            AnalysisKind::Security
        );
        assert_eq!(AnalysisKind::Battery.to_string(), "battery");
    }

    #[test]
    fn test_app_type_names() {
        assert_eq!(AppType::NativeIos.to_string(), "nativeIOS");
        assert_eq!(AppType::ReactNative.to_string(), "reactNative");
        assert_eq!(
            serde_json::to_string(&AppType::NativeAndroid).unwrap(),
            "\"nativeAndroid\""
        );
    }
}
