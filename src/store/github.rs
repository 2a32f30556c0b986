//! store::github
//!
//! Object store backed by the GitHub git-data REST API.
//!
//! # Design
//!
//! Every trait operation maps onto one or two REST calls:
//!
//! | Operation | Endpoint |
//! |---|---|
//! | `resolve_ref` | `GET git/ref/heads/{branch}` |
//! | `get_blob` | `GET contents/{path}?ref={commit}`, falling back to `GET git/blobs/{sha}` for large files |
//! | `put_blob` | `POST git/blobs` |
//! | `get_tree` | `GET git/commits/{sha}` then `GET git/trees/{tree}?recursive=1` |
//! | `put_tree` | `POST git/trees` (full listing, no `base_tree`) |
//! | `create_commit` | `POST git/commits` |
//! | `advance_ref` | `GET git/ref/heads/{branch}` then `PATCH git/refs/heads/{branch}` with `force: false` |
//!
//! Path segments are percent-encoded through `Url::path_segments_mut`, never
//! spliced into the URL as raw strings.
//!
//! # Compare-and-swap
//!
//! GitHub has no conditional ref update. `advance_ref` first checks that the
//! branch still points at `expected_old`, then patches without `force`. The
//! new commit's parent is `expected_old`, so if another writer moved the
//! branch in between, the patch is not a fast-forward and GitHub answers
//! 422, which is reported as [`StoreError::Conflict`].
//!
//! # Rate Limiting
//!
//! Returns `StoreError::RateLimited` when limits are hit; retrying is the
//! caller's responsibility.

use async_trait::async_trait;
use base64::prelude::{Engine as _, BASE64_STANDARD};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::traits::{ObjectStore, StoreError};
use crate::core::types::{BranchName, Entry, EntryMode, File, Oid, RepoPath, Tree};
use crate::git::Identity;

/// Default GitHub API base URL.
pub const DEFAULT_API_BASE: &str = "https://api.github.com";

/// User-Agent header value for API requests.
const USER_AGENT_VALUE: &str = "sitestore";

/// GitHub object store.
pub struct GitHubStore {
    /// HTTP client for making requests
    client: Client,
    /// Access token (optional for read-only use of public repositories)
    token: Option<String>,
    /// Repository owner (user or organization)
    owner: String,
    /// Repository name
    repo: String,
    /// API base URL (configurable for GitHub Enterprise and tests)
    api_base: String,
    /// Commit author, if GitHub's default (the token owner) is not wanted
    identity: Option<Identity>,
}

// Custom Debug to avoid exposing the token
impl std::fmt::Debug for GitHubStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubStore")
            .field("has_token", &self.token.is_some())
            .field("owner", &self.owner)
            .field("repo", &self.repo)
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl GitHubStore {
    /// Create a store for `owner/repo` on github.com.
    pub fn new(token: Option<String>, owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            token,
            owner: owner.into(),
            repo: repo.into(),
            api_base: DEFAULT_API_BASE.to_string(),
            identity: None,
        }
    }

    /// Use a custom API base URL (GitHub Enterprise, or a mock server).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    /// Author and commit as `identity` instead of the token owner.
    pub fn with_identity(mut self, identity: Identity) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Get the repository owner.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Get the repository name.
    pub fn repo(&self) -> &str {
        &self.repo
    }

    /// Build common headers for API requests.
    fn headers(&self) -> Result<HeaderMap, StoreError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = &self.token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| StoreError::AuthFailed("token contains invalid characters".into()))?;
            headers.insert(AUTHORIZATION, value);
        }
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static("2022-11-28"),
        );
        Ok(headers)
    }

    /// Build URL for a repository endpoint, percent-encoding every segment.
    fn repo_url<'a>(
        &self,
        segments: impl IntoIterator<Item = &'a str>,
    ) -> Result<Url, StoreError> {
        let mut url = Url::parse(&self.api_base)
            .map_err(|e| StoreError::Backend(format!("invalid api base '{}': {}", self.api_base, e)))?;
        {
            let mut path = url.path_segments_mut().map_err(|_| {
                StoreError::Backend(format!("api base '{}' cannot hold a path", self.api_base))
            })?;
            path.pop_if_empty()
                .extend(["repos", self.owner.as_str(), self.repo.as_str()])
                .extend(segments);
        }
        Ok(url)
    }

    async fn get<T: for<'de> Deserialize<'de>>(&self, url: Url) -> Result<T, StoreError> {
        debug!(%url, "GET");
        let response = self
            .client
            .get(url)
            .headers(self.headers()?)
            .send()
            .await
            .map_err(|e| StoreError::Network(e.to_string()))?;
        self.handle_response(response).await
    }

    async fn send_json<B: Serialize + ?Sized, T: for<'de> Deserialize<'de>>(
        &self,
        method: reqwest::Method,
        url: Url,
        body: &B,
    ) -> Result<T, StoreError> {
        debug!(%method, %url, "request");
        let response = self
            .client
            .request(method, url)
            .headers(self.headers()?)
            .json(body)
            .send()
            .await
            .map_err(|e| StoreError::Network(e.to_string()))?;
        self.handle_response(response).await
    }

    /// Handle API response, mapping errors appropriately.
    async fn handle_response<T: for<'de> Deserialize<'de>>(
        &self,
        response: Response,
    ) -> Result<T, StoreError> {
        let status = response.status();

        if status.is_success() {
            response.json().await.map_err(|e| StoreError::Api {
                status: status.as_u16(),
                message: format!("Failed to parse response: {}", e),
            })
        } else {
            Err(self.handle_error_response(response, status).await)
        }
    }

    /// Handle an error response from the API.
    async fn handle_error_response(&self, response: Response, status: StatusCode) -> StoreError {
        let rate_limited = response
            .headers()
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok())
            == Some("0");

        // Try to get error message from body
        let message = match response.json::<GitHubErrorResponse>().await {
            Ok(err) => err.message,
            Err(_) => "Unknown error".to_string(),
        };

        match status {
            StatusCode::UNAUTHORIZED => StoreError::AuthFailed("Invalid or expired token".into()),
            StatusCode::FORBIDDEN if rate_limited => StoreError::RateLimited,
            StatusCode::FORBIDDEN => StoreError::AuthFailed(format!("Permission denied: {}", message)),
            StatusCode::NOT_FOUND => StoreError::NotFound(message),
            StatusCode::CONFLICT => StoreError::Conflict(message),
            StatusCode::TOO_MANY_REQUESTS => StoreError::RateLimited,
            _ if status.is_server_error() => StoreError::Api {
                status: status.as_u16(),
                message: format!("GitHub server error: {}", message),
            },
            _ => StoreError::Api {
                status: status.as_u16(),
                message,
            },
        }
    }

    /// URL segments of a branch's ref under `git/<kind>/heads/`.
    fn ref_url(&self, kind: &str, branch: &BranchName) -> Result<Url, StoreError> {
        let segments = ["git", kind, "heads"]
            .into_iter()
            .chain(branch.as_str().split('/'));
        self.repo_url(segments)
    }

    async fn read_blob_by_sha(&self, sha: &str) -> Result<Vec<u8>, StoreError> {
        let url = self.repo_url(["git", "blobs", sha])?;
        let blob: GitHubBlob = self.get(url).await?;
        decode_content(&blob.content, &blob.encoding)
    }
}

/// Decode a contents/blobs payload.
///
/// GitHub wraps base64 content at 60 columns, so embedded newlines are
/// stripped before decoding.
fn decode_content(content: &str, encoding: &str) -> Result<Vec<u8>, StoreError> {
    match encoding {
        "base64" => {
            let compact: String = content.chars().filter(|c| !c.is_whitespace()).collect();
            BASE64_STANDARD
                .decode(compact.as_bytes())
                .map_err(|e| StoreError::Backend(format!("invalid base64 content: {}", e)))
        }
        "utf-8" => Ok(content.as_bytes().to_vec()),
        other => Err(StoreError::Backend(format!(
            "unsupported content encoding '{}'",
            other
        ))),
    }
}

fn parse_oid(sha: &str) -> Result<Oid, StoreError> {
    Oid::new(sha).map_err(StoreError::from)
}

fn object_type(mode: EntryMode) -> &'static str {
    match mode {
        EntryMode::Directory => "tree",
        EntryMode::Submodule => "commit",
        _ => "blob",
    }
}

#[async_trait]
impl ObjectStore for GitHubStore {
    fn name(&self) -> &'static str {
        "github"
    }

    async fn resolve_ref(&self, branch: &BranchName) -> Result<Oid, StoreError> {
        let url = self.ref_url("ref", branch)?;
        let reference: GitHubRef = self.get(url).await?;
        parse_oid(&reference.object.sha)
    }

    async fn get_blob(&self, at_commit: &Oid, path: &RepoPath) -> Result<File, StoreError> {
        let mut url = self.repo_url(["contents"].into_iter().chain(path.segments()))?;
        url.query_pairs_mut().append_pair("ref", at_commit.as_str());

        let contents: GitHubContents = self.get(url).await?;
        let item = match contents {
            GitHubContents::Item(item) if item.kind != "dir" => item,
            _ => return Err(StoreError::NotFound(path.to_string())),
        };

        // Files over 1 MB come back without inline content.
        let content = match (&item.content, &item.encoding) {
            (Some(c), Some(enc)) if !(c.is_empty() && item.size > 0) && enc != "none" => {
                decode_content(c, enc)?
            }
            _ => self.read_blob_by_sha(&item.sha).await?,
        };

        debug!(%path, sha = %item.sha, bytes = content.len(), "read blob");
        Ok(File {
            path: path.clone(),
            content,
            oid: parse_oid(&item.sha)?,
        })
    }

    async fn put_blob(&self, path: &RepoPath, content: &[u8]) -> Result<Oid, StoreError> {
        let url = self.repo_url(["git", "blobs"])?;
        let body = CreateBlobBody {
            content: BASE64_STANDARD.encode(content),
            encoding: "base64",
        };
        let created: GitHubSha = self.send_json(reqwest::Method::POST, url, &body).await?;
        debug!(%path, sha = %created.sha, "wrote blob");
        parse_oid(&created.sha)
    }

    async fn get_tree(&self, commit: &Oid, recursive: bool) -> Result<Tree, StoreError> {
        let url = self.repo_url(["git", "commits", commit.as_str()])?;
        let commit_obj: GitHubCommit = self.get(url).await?;
        let root = parse_oid(&commit_obj.tree.sha)?;

        let mut url = self.repo_url(["git", "trees", root.as_str()])?;
        if recursive {
            url.query_pairs_mut().append_pair("recursive", "1");
        }
        let listing: GitHubTree = self.get(url).await?;
        if listing.truncated {
            return Err(StoreError::Backend(format!(
                "tree listing for {} was truncated by GitHub",
                commit.short(7)
            )));
        }

        let entries = listing
            .tree
            .into_iter()
            .map(|item| -> Result<Entry, StoreError> {
                Ok(Entry {
                    path: RepoPath::new(item.path)?,
                    mode: EntryMode::from_octal_str(&item.mode)?,
                    oid: parse_oid(&item.sha)?,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        debug!(commit = %commit.short(7), entries = entries.len(), "read tree");
        Ok(Tree::new(commit.clone(), root, entries))
    }

    async fn put_tree(&self, entries: &[Entry]) -> Result<Oid, StoreError> {
        let url = self.repo_url(["git", "trees"])?;
        let body = CreateTreeBody {
            tree: entries
                .iter()
                .map(|e| CreateTreeItem {
                    path: e.path.as_str(),
                    mode: e.mode.to_octal_string(),
                    kind: object_type(e.mode),
                    sha: e.oid.as_str(),
                })
                .collect(),
        };
        let created: GitHubSha = self.send_json(reqwest::Method::POST, url, &body).await?;
        debug!(tree = %created.sha, entries = entries.len(), "wrote tree");
        parse_oid(&created.sha)
    }

    async fn create_commit(
        &self,
        tree: &Oid,
        parent: Option<&Oid>,
        message: &str,
    ) -> Result<Oid, StoreError> {
        let url = self.repo_url(["git", "commits"])?;
        let body = CreateCommitBody {
            message,
            tree: tree.as_str(),
            parents: parent.map(|p| p.as_str()).into_iter().collect(),
            author: self.identity.as_ref().map(|i| CommitAuthor {
                name: &i.name,
                email: &i.email,
            }),
        };
        let created: GitHubSha = self.send_json(reqwest::Method::POST, url, &body).await?;
        debug!(commit = %created.sha, "created commit");
        parse_oid(&created.sha)
    }

    async fn advance_ref(
        &self,
        branch: &BranchName,
        new: &Oid,
        expected_old: &Oid,
    ) -> Result<(), StoreError> {
        let current = self.resolve_ref(branch).await?;
        if &current != expected_old {
            warn!(%branch, expected = %expected_old.short(7), actual = %current.short(7), "ref moved, not advancing");
            return Err(StoreError::Conflict(format!(
                "{} is at {}, expected {}",
                branch,
                current.short(7),
                expected_old.short(7)
            )));
        }

        let url = self.ref_url("refs", branch)?;
        let body = UpdateRefBody {
            sha: new.as_str(),
            force: false,
        };
        let result: Result<GitHubRef, StoreError> =
            self.send_json(reqwest::Method::PATCH, url, &body).await;
        match result {
            Ok(_) => {
                info!(%branch, from = %expected_old.short(7), to = %new.short(7), "advanced ref");
                Ok(())
            }
            Err(StoreError::Api { status: 422, message }) => {
                warn!(%branch, %message, "ref update rejected");
                Err(StoreError::Conflict(message))
            }
            Err(e) => Err(e),
        }
    }
}

// =============================================================================
// GitHub API Types
// =============================================================================

#[derive(Debug, Deserialize)]
struct GitHubErrorResponse {
    message: String,
}

#[derive(Debug, Deserialize)]
struct GitHubSha {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct GitHubRef {
    object: GitHubSha,
}

#[derive(Debug, Deserialize)]
struct GitHubCommit {
    tree: GitHubSha,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GitHubContents {
    Listing(Vec<serde_json::Value>),
    Item(GitHubContentItem),
}

#[derive(Debug, Deserialize)]
struct GitHubContentItem {
    #[serde(rename = "type")]
    kind: String,
    sha: String,
    #[serde(default)]
    size: u64,
    content: Option<String>,
    encoding: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitHubBlob {
    content: String,
    encoding: String,
}

#[derive(Debug, Deserialize)]
struct GitHubTree {
    tree: Vec<GitHubTreeItem>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Debug, Deserialize)]
struct GitHubTreeItem {
    path: String,
    mode: String,
    sha: String,
}

#[derive(Debug, Serialize)]
struct CreateBlobBody {
    content: String,
    encoding: &'static str,
}

#[derive(Debug, Serialize)]
struct CreateTreeBody<'a> {
    tree: Vec<CreateTreeItem<'a>>,
}

#[derive(Debug, Serialize)]
struct CreateTreeItem<'a> {
    path: &'a str,
    mode: String,
    #[serde(rename = "type")]
    kind: &'static str,
    sha: &'a str,
}

#[derive(Debug, Serialize)]
struct CreateCommitBody<'a> {
    message: &'a str,
    tree: &'a str,
    parents: Vec<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    author: Option<CommitAuthor<'a>>,
}

#[derive(Debug, Serialize)]
struct CommitAuthor<'a> {
    name: &'a str,
    email: &'a str,
}

#[derive(Debug, Serialize)]
struct UpdateRefBody<'a> {
    sha: &'a str,
    force: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> GitHubStore {
        GitHubStore::new(Some("secret".into()), "owner", "repo")
    }

    #[test]
    fn repo_url_format() {
        let url = store().repo_url(["git", "blobs"]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.github.com/repos/owner/repo/git/blobs"
        );
    }

    #[test]
    fn repo_url_percent_encodes_segments() {
        let path = RepoPath::new("_posts/hello world?.md").unwrap();
        let url = store()
            .repo_url(["contents"].into_iter().chain(path.segments()))
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.github.com/repos/owner/repo/contents/_posts/hello%20world%3F.md"
        );
    }

    #[test]
    fn api_base_with_path_prefix() {
        let s = store().with_api_base("https://ghe.example.com/api/v3/");
        let url = s.repo_url(["git", "trees"]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://ghe.example.com/api/v3/repos/owner/repo/git/trees"
        );
    }

    #[test]
    fn branch_ref_url_keeps_slashes_as_segments() {
        let branch = BranchName::new("feature/new-site").unwrap();
        let url = store().ref_url("refs", &branch).unwrap();
        assert!(url
            .as_str()
            .ends_with("/repos/owner/repo/git/refs/heads/feature/new-site"));
    }

    #[test]
    fn debug_redacts_token() {
        let rendered = format!("{:?}", store());
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("has_token: true"));
    }

    #[test]
    fn decode_wrapped_base64() {
        let decoded = decode_content("aGVs\nbG8=\n", "base64").unwrap();
        assert_eq!(decoded, b"hello");
        assert!(decode_content("x", "gzip").is_err());
    }

    #[test]
    fn object_types() {
        assert_eq!(object_type(EntryMode::Regular), "blob");
        assert_eq!(object_type(EntryMode::Symlink), "blob");
        assert_eq!(object_type(EntryMode::Directory), "tree");
        assert_eq!(object_type(EntryMode::Submodule), "commit");
    }

    #[test]
    fn contents_listing_vs_item() {
        let listing: GitHubContents = serde_json::from_str("[]").unwrap();
        assert!(matches!(listing, GitHubContents::Listing(_)));

        let item: GitHubContents = serde_json::from_str(
            r#"{"type":"file","sha":"abc","size":5,"content":"aGVsbG8=","encoding":"base64"}"#,
        )
        .unwrap();
        assert!(matches!(item, GitHubContents::Item(_)));
    }
}
