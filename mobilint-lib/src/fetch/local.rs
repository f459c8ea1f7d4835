use std::path::Path;

use async_trait::async_trait;
use ignore::WalkBuilder;

use super::{Candidate, RepositoryFetcher, RepositorySource, plan};
use crate::{AppType, ErrorKind, Result, SourceFile};

/// Reads a repository checked out on the local file system
#[derive(Debug, Clone)]
pub struct LocalFetcher {
    /// Skip files ignored by `.gitignore`, `.ignore` and friends
    respect_ignore_files: bool,
}

impl Default for LocalFetcher {
    fn default() -> Self {
        Self {
            respect_ignore_files: true,
        }
    }
}

impl LocalFetcher {
    #[must_use]
    pub const fn new(respect_ignore_files: bool) -> Self {
        Self {
            respect_ignore_files,
        }
    }

    /// All regular files below `root`, with `/` separated relative paths
    fn list(&self, root: &Path) -> Vec<Candidate> {
        let walk = WalkBuilder::new(root)
            .standard_filters(self.respect_ignore_files)
            // Honor `.gitignore` in directories that are not git repositories
            .require_git(false)
            .build();

        let mut candidates = Vec::new();
        for entry in walk {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    log::warn!("Skipping unreadable entry: {e}");
                    continue;
                }
            };
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(root) else {
                continue;
            };
            let path = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            let size = match entry.metadata() {
                Ok(metadata) => metadata.len(),
                Err(e) => {
                    log::warn!("Skipping {path}: {e}");
                    continue;
                }
            };
            candidates.push(Candidate { path, size });
        }
        // Walk order depends on the file system
        candidates.sort_by(|a, b| a.path.cmp(&b.path));
        candidates
    }
}

#[async_trait]
impl RepositoryFetcher for LocalFetcher {
    async fn get_all_files(
        &self,
        source: &RepositorySource,
        app_type_hint: AppType,
        max_files: usize,
    ) -> Result<Vec<SourceFile>> {
        let RepositorySource::Local(root) = source else {
            return Err(ErrorKind::InvalidRepositoryUrl(source.to_string()));
        };

        let fetcher = self.clone();
        let walk_root = root.clone();
        let listed = tokio::task::spawn_blocking(move || fetcher.list(&walk_root)).await?;

        let mut files = Vec::new();
        for candidate in plan(listed, app_type_hint) {
            if files.len() >= max_files {
                log::warn!("Reached the limit of {max_files} files");
                break;
            }
            let full_path = root.join(&candidate.path);
            match tokio::fs::read_to_string(&full_path).await {
                Ok(content) => files.push(SourceFile {
                    path: candidate.path,
                    size: candidate.size,
                    content,
                }),
                Err(e) => log::debug!("Skipping {}: {e}", full_path.display()),
            }
        }
        log::info!("Read {} files from {}", files.len(), root.display());
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;

    fn write(root: &Path, path: &str, content: &[u8]) {
        let path = root.join(path);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[tokio::test]
    async fn test_read_directory() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "app/src/main/java/Main.java", b"class Main {}");
        write(root, "app/src/main/java/Util.kt", b"object Util");
        write(root, "app/src/main/java/Generated.java", b"class Generated {}");
        write(root, "app/src/main/java/Blob.java", &[0xff, 0xfe, 0x00]);
        write(root, "notes.txt", b"not code");
        write(root, ".gitignore", b"Generated.java\n");

        let source = RepositorySource::Local(root.to_path_buf());
        let files = LocalFetcher::default()
            .get_all_files(&source, AppType::Unknown, 10)
            .await
            .unwrap();

        let paths: Vec<_> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(
            paths,
            vec!["app/src/main/java/Main.java", "app/src/main/java/Util.kt"]
        );
        assert_eq!(files[0].content, "class Main {}");
        assert_eq!(files[0].size, 13);
    }

    #[tokio::test]
    async fn test_ignore_files_can_be_disabled() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "Main.java", b"class Main {}");
        write(dir.path(), ".ignore", b"*.java\n");

        let source = RepositorySource::Local(dir.path().to_path_buf());
        let respecting = LocalFetcher::default()
            .get_all_files(&source, AppType::Unknown, 10)
            .await
            .unwrap();
        let ignoring = LocalFetcher::new(false)
            .get_all_files(&source, AppType::Unknown, 10)
            .await
            .unwrap();
        assert!(respecting.is_empty());
        assert_eq!(ignoring.len(), 1);
    }

    #[tokio::test]
    async fn test_max_files() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["A.java", "B.java", "C.java"] {
            write(dir.path(), name, b"class X {}");
        }
        let source = RepositorySource::Local(dir.path().to_path_buf());
        let files = LocalFetcher::default()
            .get_all_files(&source, AppType::Unknown, 2)
            .await
            .unwrap();
        assert_eq!(files.len(), 2);
    }
}
