use std::collections::BTreeMap;
use std::sync::Arc;

use strum::{Display, EnumIter};

use crate::backend::Backend;
use crate::{Language, SourceFile};

/// Language buckets, in the order their files are laid out over lanes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum LanguageGroup {
    Java,
    Kotlin,
    Swift,
    #[strum(serialize = "objectiveC")]
    ObjectiveC,
    Dart,
    JavaScript,
    TypeScript,
    CSharp,
    Xml,
    Other,
}

impl LanguageGroup {
    /// Bucket of a file, based on its extension
    #[must_use]
    pub fn of(file: &SourceFile) -> Self {
        match file.extension().as_deref() {
            Some(".java") => Self::Java,
            Some(".kt") => Self::Kotlin,
            Some(".swift") => Self::Swift,
            Some(".m" | ".h") => Self::ObjectiveC,
            Some(".dart") => Self::Dart,
            Some(".js" | ".jsx") => Self::JavaScript,
            Some(".ts" | ".tsx") => Self::TypeScript,
            Some(".cs") => Self::CSharp,
            Some(".xml") => Self::Xml,
            _ => Self::Other,
        }
    }
}

/// Files bucketed by [`LanguageGroup`], each bucket in fetch order
#[derive(Debug, Default, Clone)]
pub struct FilesByLanguage(BTreeMap<LanguageGroup, Vec<Arc<SourceFile>>>);

impl FilesByLanguage {
    #[must_use]
    pub fn get(&self, group: LanguageGroup) -> &[Arc<SourceFile>] {
        self.0.get(&group).map_or(&[], Vec::as_slice)
    }

    /// Non-empty buckets in group order
    pub fn iter(&self) -> impl Iterator<Item = (LanguageGroup, &[Arc<SourceFile>])> {
        self.0.iter().map(|(group, files)| (*group, files.as_slice()))
    }

    /// Total number of files over all buckets
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All files, bucket after bucket
    fn into_files(self) -> impl Iterator<Item = Arc<SourceFile>> {
        self.0.into_values().flatten()
    }
}

/// The files assigned to one backend
#[derive(Debug, Clone)]
pub struct Lane {
    pub backend: Backend,
    /// Analyzed strictly in this order
    pub files: Vec<Arc<SourceFile>>,
}

impl Lane {
    /// `(file, language)` pairs of the lane, skipping files of unknown
    /// language
    pub fn analyzable(&self) -> impl Iterator<Item = (&Arc<SourceFile>, Language)> {
        self.files.iter().filter_map(|file| match file.language() {
            Some(language) => Some((file, language)),
            None => {
                log::debug!("Skipping {} (unsupported language)", file.path);
                None
            }
        })
    }
}

/// Bucket files by language, keeping their relative order
#[must_use]
pub fn categorize(files: impl IntoIterator<Item = Arc<SourceFile>>) -> FilesByLanguage {
    let mut buckets: BTreeMap<LanguageGroup, Vec<_>> = BTreeMap::new();
    for file in files {
        buckets.entry(LanguageGroup::of(&file)).or_default().push(file);
    }
    for (group, files) in &buckets {
        log::info!("{group}: {} files", files.len());
    }
    FilesByLanguage(buckets)
}

/// Split the buckets into contiguous, equally sized lanes, one per backend.
///
/// Files are laid out bucket after bucket, then cut into chunks of
/// `ceil(total / lanes)`; the last lanes may be shorter or empty. Every
/// file ends up in exactly one lane.
#[must_use]
pub fn distribute(files: FilesByLanguage, backends: &[Backend]) -> Vec<Lane> {
    if backends.is_empty() {
        return Vec::new();
    }
    let total = files.len();
    let per_lane = total.div_ceil(backends.len()).max(1);

    let mut files = files.into_files();
    let lanes: Vec<Lane> = backends
        .iter()
        .map(|&backend| Lane {
            backend,
            files: files.by_ref().take(per_lane).collect(),
        })
        .collect();

    for lane in &lanes {
        log::info!("{}: {} files", lane.backend, lane.files.len());
    }
    lanes
}
