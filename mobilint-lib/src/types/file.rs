use std::path::Path;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// A single file fetched from a repository.
///
/// `path` is always relative to the repository root and uses `/` as the
/// separator, regardless of where the file came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    /// Repository-relative path
    pub path: String,
    /// Size in bytes, as reported by the fetcher
    pub size: u64,
    /// UTF-8 file content
    pub content: String,
}

impl SourceFile {
    /// Create a file whose size is derived from its content
    #[must_use]
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            path: path.into(),
            size: content.len() as u64,
            content,
        }
    }

    /// Lowercased file extension including the leading dot, e.g. `.kt`
    #[must_use]
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.path)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
    }

    /// The language of this file, if it is one we know how to analyze
    #[must_use]
    pub fn language(&self) -> Option<Language> {
        self.extension().as_deref().and_then(Language::from_extension)
    }
}

/// Programming or markup language of a source file
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, Serialize, Deserialize,
)]
pub enum Language {
    Java,
    Kotlin,
    Swift,
    #[strum(serialize = "Objective-C")]
    #[serde(rename = "Objective-C")]
    ObjectiveC,
    #[strum(serialize = "C#")]
    #[serde(rename = "C#")]
    CSharp,
    Dart,
    JavaScript,
    TypeScript,
    /// Android resources, manifests and property lists
    #[strum(serialize = "XML")]
    #[serde(rename = "XML")]
    Xml,
    /// Xamarin UI markup
    #[strum(serialize = "XAML")]
    #[serde(rename = "XAML")]
    Xaml,
    #[strum(serialize = "JSON")]
    #[serde(rename = "JSON")]
    Json,
    /// Gradle build scripts
    Groovy,
    /// CocoaPods specs
    Ruby,
}

impl Language {
    /// Map a lowercased extension (with leading dot) to a language
    #[must_use]
    pub fn from_extension(extension: &str) -> Option<Self> {
        let language = match extension {
            ".java" => Self::Java,
            ".kt" => Self::Kotlin,
            ".swift" => Self::Swift,
            ".m" | ".h" => Self::ObjectiveC,
            ".cs" => Self::CSharp,
            ".dart" => Self::Dart,
            ".js" | ".jsx" => Self::JavaScript,
            ".ts" | ".tsx" => Self::TypeScript,
            ".xml" | ".plist" => Self::Xml,
            ".xaml" => Self::Xaml,
            ".json" => Self::Json,
            ".gradle" => Self::Groovy,
            ".podspec" => Self::Ruby,
            _ => return None,
        };
        Some(language)
    }
}
