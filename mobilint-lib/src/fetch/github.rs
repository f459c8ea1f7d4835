use std::fmt::{self, Display};
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use url::Url;

use super::headers::{parse_remaining, rate_limit_wait};
use super::{Candidate, RepositoryFetcher, RepositorySource, plan};
use crate::{AppType, ErrorKind, Result, SourceFile};

/// Base URL of the public GitHub REST API
pub const DEFAULT_GITHUB_API: &str = "https://api.github.com";

const GITHUB_TIMEOUT: Duration = Duration::from_secs(15);

/// Media type of raw file contents
const RAW_CONTENT: &str = "application/vnd.github.raw";

static GITHUB_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^https?://(www\.)?github\.com/[\w.-]+/[\w.-]+/?$").unwrap());

/// Owner and name of a repository on github.com
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct RepositoryUrl {
    pub owner: String,
    pub repo: String,
}

impl RepositoryUrl {
    fn parse(url: &str) -> Result<Self> {
        let invalid = || ErrorKind::InvalidRepositoryUrl(url.to_string());
        if !GITHUB_URL.is_match(url) {
            return Err(invalid());
        }

        let mut parts = url.trim_end_matches('/').rsplit('/');
        let repo = parts.next().ok_or_else(invalid)?;
        let owner = parts.next().ok_or_else(invalid)?;
        // Clone URLs end with `.git`
        let repo = repo.strip_suffix(".git").unwrap_or(repo);
        if repo.is_empty() {
            return Err(invalid());
        }

        Ok(Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
        })
    }
}

impl TryFrom<&str> for RepositoryUrl {
    type Error = ErrorKind;

    fn try_from(url: &str) -> Result<Self> {
        Self::parse(url.trim())
    }
}

impl Display for RepositoryUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "https://github.com/{}/{}", self.owner, self.repo)
    }
}

#[derive(Debug, Deserialize)]
struct RepositoryInfo {
    default_branch: String,
}

#[derive(Debug, Deserialize)]
struct Tree {
    tree: Vec<TreeEntry>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Debug, Deserialize)]
struct TreeEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    size: u64,
}

/// Fetches repositories through the GitHub REST API.
///
/// The whole tree of the default branch is listed with a single request;
/// only the selected files are downloaded afterwards.
#[derive(Debug, Clone)]
pub struct GitHubFetcher {
    client: reqwest::Client,
    api_url: Url,
}

impl GitHubFetcher {
    /// Create a fetcher for the public API.
    ///
    /// Without a token, GitHub allows 60 requests per hour.
    ///
    /// # Errors
    ///
    /// Fails if the token is not a valid header value or the HTTP client
    /// cannot be built.
    pub fn new(token: Option<&SecretString>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        if let Some(token) = token {
            let mut value = HeaderValue::try_from(format!("Bearer {}", token.expose_secret()))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::ClientBuilder::new()
            .user_agent(crate::DEFAULT_USER_AGENT)
            .default_headers(headers)
            .timeout(GITHUB_TIMEOUT)
            .build()?;
        let api_url = Url::parse(DEFAULT_GITHUB_API)
            .map_err(|_| ErrorKind::InvalidEndpoint(DEFAULT_GITHUB_API.to_string()))?;
        Ok(Self { client, api_url })
    }

    /// Talk to a different API, e.g. GitHub Enterprise
    #[must_use]
    pub fn with_api_url(mut self, api_url: Url) -> Self {
        self.api_url = api_url;
        self
    }

    fn endpoint<'a>(
        &self,
        repository: &RepositoryUrl,
        segments: impl IntoIterator<Item = &'a str>,
    ) -> Result<Url> {
        let mut url = self.api_url.clone();
        url.path_segments_mut()
            .map_err(|()| ErrorKind::InvalidEndpoint(self.api_url.to_string()))?
            .pop_if_empty()
            .extend(["repos", repository.owner.as_str(), repository.repo.as_str()])
            .extend(segments);
        Ok(url)
    }

    /// Send a GET request.
    ///
    /// A request that hit the API rate limit is retried once, after the
    /// limit reset or at most 5 minutes.
    async fn get(&self, url: Url, accept: Option<&'static str>) -> Result<reqwest::Response> {
        let mut retried = false;
        loop {
            let mut request = self.client.get(url.clone());
            if let Some(accept) = accept {
                request = request.header(ACCEPT, accept);
            }
            let response = request.send().await?;
            let status = response.status();
            if status.is_success() {
                if let Some(remaining) = parse_remaining(response.headers()) {
                    log::trace!("{remaining} GitHub API requests left");
                }
                return Ok(response);
            }

            let Some(wait) = rate_limit_wait(status, response.headers()) else {
                return Err(ErrorKind::GitHubStatus {
                    url: url.to_string(),
                    status,
                });
            };
            if retried {
                return Err(ErrorKind::GitHubRateLimited(url.to_string()));
            }
            log::warn!(
                "GitHub API rate limit exceeded, waiting {}s before retrying",
                wait.as_secs()
            );
            tokio::time::sleep(wait).await;
            retried = true;
        }
    }

    async fn default_branch(&self, repository: &RepositoryUrl) -> Result<String> {
        let url = self.endpoint(repository, std::iter::empty())?;
        let info: RepositoryInfo = self.get(url, None).await?.json().await?;
        Ok(info.default_branch)
    }

    async fn list(&self, repository: &RepositoryUrl, branch: &str) -> Result<Vec<Candidate>> {
        let mut url = self.endpoint(repository, ["git", "trees", branch])?;
        url.query_pairs_mut().append_pair("recursive", "1");
        let tree: Tree = self.get(url, None).await?.json().await?;
        if tree.truncated {
            log::warn!("Tree of {repository} is too large and was truncated by GitHub");
        }
        Ok(tree
            .tree
            .into_iter()
            .filter(|entry| entry.kind == "blob")
            .map(|entry| Candidate {
                path: entry.path,
                size: entry.size,
            })
            .collect())
    }

    async fn content(&self, repository: &RepositoryUrl, branch: &str, path: &str) -> Result<String> {
        let segments = std::iter::once("contents").chain(path.split('/'));
        let mut url = self.endpoint(repository, segments)?;
        url.query_pairs_mut().append_pair("ref", branch);
        Ok(self.get(url, Some(RAW_CONTENT)).await?.text().await?)
    }
}

#[async_trait]
impl RepositoryFetcher for GitHubFetcher {
    async fn get_all_files(
        &self,
        source: &RepositorySource,
        app_type_hint: AppType,
        max_files: usize,
    ) -> Result<Vec<SourceFile>> {
        let RepositorySource::GitHub(repository) = source else {
            return Err(ErrorKind::InvalidRepositoryUrl(source.to_string()));
        };

        let branch = self.default_branch(repository).await?;
        log::info!("Listing {repository} at branch {branch}");
        let candidates = plan(self.list(repository, &branch).await?, app_type_hint);

        let mut files = Vec::new();
        for candidate in candidates {
            if files.len() >= max_files {
                log::warn!("Reached the limit of {max_files} files");
                break;
            }
            match self.content(repository, &branch, &candidate.path).await {
                Ok(content) => files.push(SourceFile {
                    path: candidate.path,
                    size: candidate.size,
                    content,
                }),
                Err(e @ ErrorKind::GitHubRateLimited(_)) => {
                    log::warn!("{e}. Continuing with the {} files fetched so far", files.len());
                    break;
                }
                Err(e) => log::error!("Failed to fetch {}: {e}", candidate.path),
            }
        }
        log::info!("Fetched {} files from {repository}", files.len());
        Ok(files)
    }
}
