//! Fetching the files of a repository.
//!
//! A [`RepositorySource`] is either a GitHub repository or a local
//! directory. Both are listed first, then the listing is filtered and
//! ordered (see [`crate::classify::fetch_priority`]) before any content is
//! read, so that at most `max_files` files are downloaded.

mod github;
mod headers;
mod local;

use std::fmt::{self, Debug, Display};
use std::path::{Path, PathBuf};

use async_trait::async_trait;

pub use github::{DEFAULT_GITHUB_API, GitHubFetcher, RepositoryUrl};
pub use local::LocalFetcher;

use crate::classify::{fetch_priority, is_file_size_acceptable, should_analyze_file};
use crate::{AppType, ErrorKind, Result, SourceFile};

/// Directories whose files are never fetched
const SKIPPED_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    "build",
    "dist",
    "bin",
    "obj",
    "packages",
    ".gradle",
    ".dart_tool",
    ".idea",
    ".vscode",
];

/// Where the files of an analysis come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepositorySource {
    /// A repository on github.com
    GitHub(RepositoryUrl),
    /// A directory on the local file system
    Local(PathBuf),
}

impl RepositorySource {
    /// Interpret `source` as a GitHub URL if it looks like one, or else as
    /// a local directory.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidRepositoryUrl`] if `source` is neither a
    /// valid GitHub repository URL nor an existing directory.
    pub fn parse(source: &str) -> Result<Self> {
        let source = source.trim();
        if source.starts_with("http://") || source.starts_with("https://") {
            return RepositoryUrl::try_from(source).map(Self::GitHub);
        }
        let path = Path::new(source);
        if path.is_dir() {
            Ok(Self::Local(path.to_path_buf()))
        } else {
            Err(ErrorKind::InvalidRepositoryUrl(source.to_string()))
        }
    }

    /// Owner of a GitHub repository
    #[must_use]
    pub fn owner(&self) -> Option<&str> {
        match self {
            Self::GitHub(url) => Some(&url.owner),
            Self::Local(_) => None,
        }
    }

    /// Repository or directory name
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::GitHub(url) => Some(&url.repo),
            Self::Local(path) => path.file_name().and_then(|name| name.to_str()),
        }
    }
}

impl Display for RepositorySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GitHub(url) => Display::fmt(url, f),
            Self::Local(path) => Display::fmt(&path.display(), f),
        }
    }
}

/// Lists and reads the files of a repository
#[async_trait]
pub trait RepositoryFetcher: Send + Sync + Debug {
    /// Fetch up to `max_files` files worth analyzing for `app_type_hint`,
    /// most relevant first.
    ///
    /// Files whose content cannot be read are skipped.
    ///
    /// # Errors
    ///
    /// Fails if the repository itself cannot be listed.
    async fn get_all_files(
        &self,
        source: &RepositorySource,
        app_type_hint: AppType,
        max_files: usize,
    ) -> Result<Vec<SourceFile>>;
}

/// Fetches from GitHub or from disk, depending on the source
#[derive(Debug, Clone)]
pub struct Fetcher {
    github: GitHubFetcher,
    local: LocalFetcher,
}

impl Fetcher {
    #[must_use]
    pub fn new(github: GitHubFetcher, local: LocalFetcher) -> Self {
        Self { github, local }
    }
}

#[async_trait]
impl RepositoryFetcher for Fetcher {
    async fn get_all_files(
        &self,
        source: &RepositorySource,
        app_type_hint: AppType,
        max_files: usize,
    ) -> Result<Vec<SourceFile>> {
        match source {
            RepositorySource::GitHub(_) => {
                self.github
                    .get_all_files(source, app_type_hint, max_files)
                    .await
            }
            RepositorySource::Local(_) => {
                self.local
                    .get_all_files(source, app_type_hint, max_files)
                    .await
            }
        }
    }
}

/// A listed file whose content was not read yet
#[derive(Debug, Clone, PartialEq, Eq)]
struct Candidate {
    path: String,
    size: u64,
}

fn in_skipped_dir(path: &str) -> bool {
    let mut segments = path.split('/');
    segments.next_back();
    segments.any(|dir| SKIPPED_DIRS.contains(&dir))
}

/// Drop candidates not worth analyzing and order the rest by priority
fn plan(mut candidates: Vec<Candidate>, app_type: AppType) -> Vec<Candidate> {
    let listed = candidates.len();
    candidates.retain(|c| {
        !in_skipped_dir(&c.path)
            && should_analyze_file(&c.path, app_type)
            && is_file_size_acceptable(&c.path, c.size)
    });
    candidates.sort_by_key(|c| fetch_priority(&c.path, app_type));
    log::info!(
        "{} of {listed} listed files are worth analyzing",
        candidates.len()
    );
    candidates
}
