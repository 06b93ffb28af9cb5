use octocrab::service::middleware::retry::RetryConfig;
use octocrab::Octocrab;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{BackupError, BackupResult};

/// GitHub caps `per_page` at 100
const PAGE_SIZE: usize = 100;

/// A repository to back up, as returned by the listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryRef {
    pub clone_url: String,
    /// Last path segment of the clone URL without its `.git` suffix
    pub name: String,
}

impl RepositoryRef {
    /// Build a ref from a clone URL, or `None` when the URL names no repository
    pub fn from_clone_url(clone_url: &str) -> Option<Self> {
        let trimmed = clone_url.trim().trim_end_matches('/');
        let segment = trimmed
            .rsplit(&['/', ':'][..])
            .next()
            .unwrap_or(trimmed);
        let name = segment.strip_suffix(".git").unwrap_or(segment);

        if name.is_empty() || name == "." || name == ".." {
            return None;
        }

        Some(Self {
            clone_url: clone_url.trim().to_string(),
            name: name.to_string(),
        })
    }
}

/// The subset of the GitHub repository object the backup needs
#[derive(Debug, Deserialize)]
struct RepoItem {
    clone_url: String,
}

#[derive(Debug, Serialize)]
struct ListParams {
    per_page: usize,
    affiliation: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    page: Option<u32>,
}

/// GitHub client listing the repositories an account owns
pub struct GitHubClient {
    client: Octocrab,
    username: String,
    fetch_all_pages: bool,
}

impl GitHubClient {
    /// Create a client authenticated with the configured token
    pub fn new(config: &Config) -> BackupResult<Self> {
        let client = Octocrab::builder()
            .base_uri(config.github_api_url.as_str())
            .map_err(|e| BackupError::Api(format!("invalid GitHub API URL: {}", e)))?
            .personal_token(config.github_token.clone())
            .add_retry_config(RetryConfig::None)
            .build()
            .map_err(|e| BackupError::Api(format!("failed to create GitHub client: {}", e)))?;

        Ok(Self {
            client,
            username: config.github_username.clone(),
            fetch_all_pages: config.fetch_all_pages,
        })
    }

    /// Account whose repositories are listed
    pub fn username(&self) -> &str {
        &self.username
    }

    /// List owned repositories in API order
    pub async fn list_repositories(&self) -> BackupResult<Vec<RepositoryRef>> {
        debug!("Fetching repositories owned by: {}", self.username);

        let mut repositories = Vec::new();

        if self.fetch_all_pages {
            let mut page = 1u32;
            loop {
                let items = self.fetch_page(Some(page)).await?;
                let count = items.len();
                repositories.extend(items);

                if count < PAGE_SIZE {
                    break;
                }
                page += 1;
            }
        } else {
            let items = self.fetch_page(None).await?;
            if items.len() == PAGE_SIZE {
                warn!(
                    "GitHub returned a full page of {} repositories; later pages are not requested (set fetch_all_pages to include them)",
                    PAGE_SIZE
                );
            }
            repositories.extend(items);
        }

        if repositories.is_empty() {
            return Err(BackupError::NoRepositories {
                account: self.username.clone(),
            });
        }

        let refs = repositories
            .into_iter()
            .map(|item| {
                RepositoryRef::from_clone_url(&item.clone_url).ok_or_else(|| {
                    BackupError::Api(format!(
                        "clone_url without a repository name: {}",
                        item.clone_url
                    ))
                })
            })
            .collect::<BackupResult<Vec<_>>>()?;

        info!("Found {} repositories for {}", refs.len(), self.username);
        Ok(refs)
    }

    async fn fetch_page(&self, page: Option<u32>) -> BackupResult<Vec<RepoItem>> {
        let params = ListParams {
            per_page: PAGE_SIZE,
            affiliation: "owner",
            page,
        };

        self.client
            .get::<Vec<RepoItem>, _, _>("/user/repos", Some(&params))
            .await
            .map_err(|e| match page {
                Some(page) => BackupError::Api(format!(
                    "failed to fetch repositories page {}: {}",
                    page, e
                )),
                None => BackupError::Api(format!("failed to fetch repositories: {}", e)),
            })
    }
}
