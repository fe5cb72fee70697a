use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::RemoteConfig;
use crate::error::{Result, SubrelayError};

/// Owner, repository, and branch extracted from a repository URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoLocation {
    pub owner: String,
    pub repo: String,
    pub branch: String,
}

impl RepoLocation {
    /// Accepts `https://github.com/owner/repo` with an optional
    /// `/tree/<branch>` suffix; branch defaults to `main`.
    pub fn parse(url: &str) -> Result<Self> {
        let without_scheme = url.split("://").nth(1).unwrap_or(url);
        let mut parts = without_scheme.trim_matches('/').split('/');
        let _host = parts.next();
        let owner = parts
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| SubrelayError::Config(format!("Invalid repository URL: {}", url)))?;
        let repo = parts
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| SubrelayError::Config(format!("Invalid repository URL: {}", url)))?;

        let branch = match (parts.next(), parts.next()) {
            (Some("tree"), Some(branch)) if !branch.is_empty() => branch.to_string(),
            _ => "main".to_string(),
        };

        Ok(Self {
            owner: owner.to_string(),
            repo: repo.trim_end_matches(".git").to_string(),
            branch,
        })
    }
}

/// One child of a remote directory listing.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteEntry {
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub entry_type: String,
    pub sha: String,
    pub download_url: Option<String>,
}

/// Client for the path-addressed content API. Writes follow the
/// read-revision-then-conditional-write protocol: the current object's sha
/// is fetched first and sent along with the new content, so the store can
/// reject a write that raced another writer.
pub struct RemotePublisher {
    client: Client,
    config: RemoteConfig,
    location: RepoLocation,
    token: String,
}

impl RemotePublisher {
    pub fn new(config: RemoteConfig, token: String) -> Result<Self> {
        let location = RepoLocation::parse(&config.repo_url)?;
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("subrelay/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SubrelayError::Remote(format!("HTTP client creation failed: {}", e)))?;

        Ok(Self {
            client,
            config,
            location,
            token,
        })
    }

    pub fn location(&self) -> &RepoLocation {
        &self.location
    }

    /// Remote path for a published file inside the configured target directory.
    pub fn target_path(&self, filename: &str) -> String {
        if self.config.target_dir.is_empty() {
            filename.to_string()
        } else {
            format!("{}/{}", self.config.target_dir.trim_matches('/'), filename)
        }
    }

    fn contents_url(&self, path: &str) -> String {
        format!(
            "https://api.github.com/repos/{}/{}/contents/{}",
            self.location.owner,
            self.location.repo,
            path.trim_start_matches('/')
        )
    }

    fn auth_header(&self) -> String {
        format!("token {}", self.token)
    }

    /// Create or update the file at `path` with `content`.
    ///
    /// Transport errors and server errors are retried a bounded number of
    /// times with linear backoff; a rejection such as a revision conflict is
    /// surfaced immediately.
    pub async fn upsert(&self, path: &str, content: &[u8], commit_message: &str) -> Result<()> {
        upsert_via(
            self,
            path,
            content,
            commit_message,
            &self.location.branch,
            self.config.max_retries,
            self.config.retry_backoff_ms,
        )
        .await
    }

    /// List the immediate children of a remote directory.
    pub async fn list_entries(&self, path: &str) -> Result<Vec<RemoteEntry>> {
        let response = self
            .client
            .get(self.contents_url(path))
            .header("Authorization", self.auth_header())
            .query(&[("ref", self.location.branch.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SubrelayError::Remote(format!(
                "Listing '{}' failed: {}",
                path, status
            )));
        }

        Ok(response.json().await?)
    }

    /// Enumerate `path` and every subfolder under it, depth first. A fixed
    /// delay precedes each listing call to stay inside the API request budget.
    pub async fn list_dirs_recursive(&self, path: &str) -> Result<Vec<String>> {
        let mut dirs = vec![path.to_string()];

        sleep(Duration::from_millis(self.config.request_delay_ms)).await;
        for entry in self.list_entries(path).await? {
            if entry.entry_type == "dir" {
                dirs.extend(Box::pin(self.list_dirs_recursive(&entry.path)).await?);
            }
        }

        Ok(dirs)
    }

    /// Subtitle files directly inside a remote directory.
    pub async fn list_srt_files(&self, path: &str) -> Result<Vec<RemoteEntry>> {
        Ok(self
            .list_entries(path)
            .await?
            .into_iter()
            .filter(|e| e.entry_type == "file" && e.name.to_lowercase().ends_with(".srt"))
            .collect())
    }

    /// Download every subtitle file in a remote directory into `local_dir`,
    /// seeding the translation engine's context.
    pub async fn download_srt_files(&self, path: &str, local_dir: &Path) -> Result<usize> {
        tokio::fs::create_dir_all(local_dir).await?;

        let mut count = 0;
        for entry in self.list_srt_files(path).await? {
            let Some(url) = entry.download_url else {
                warn!("No download locator for '{}', skipping", entry.path);
                continue;
            };

            sleep(Duration::from_millis(self.config.request_delay_ms)).await;
            let response = self
                .client
                .get(&url)
                .header("Authorization", self.auth_header())
                .send()
                .await?;
            if !response.status().is_success() {
                warn!("Download of '{}' failed: {}", entry.path, response.status());
                continue;
            }

            let bytes = response.bytes().await?;
            let local_path = local_dir.join(&entry.name);
            tokio::fs::write(&local_path, &bytes).await?;
            info!("Fetched context file: {}", local_path.display());
            count += 1;
        }

        Ok(count)
    }
}

/// Transport seam for the conditional-write protocol. `RemotePublisher`
/// speaks HTTP through it; tests substitute a scripted store.
#[async_trait]
trait ContentsTransport: Send + Sync {
    /// Current revision token for a path, or None if the object does not
    /// exist yet.
    async fn fetch_revision(&self, path: &str) -> Result<Option<String>>;

    /// Submit a write; returns the store's status and, on failure, its
    /// error text.
    async fn put_contents(&self, path: &str, body: &Value) -> Result<(StatusCode, String)>;
}

#[async_trait]
impl ContentsTransport for RemotePublisher {
    async fn fetch_revision(&self, path: &str) -> Result<Option<String>> {
        let response = self
            .client
            .get(self.contents_url(path))
            .header("Authorization", self.auth_header())
            .query(&[("ref", self.location.branch.as_str())])
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => {
                let entry: RemoteEntry = response.json().await?;
                Ok(Some(entry.sha))
            }
            StatusCode::NOT_FOUND => Ok(None),
            status => Err(SubrelayError::Remote(format!(
                "Revision lookup for '{}' failed: {}",
                path, status
            ))),
        }
    }

    async fn put_contents(&self, path: &str, body: &Value) -> Result<(StatusCode, String)> {
        let response = self
            .client
            .put(self.contents_url(path))
            .header("Authorization", self.auth_header())
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let text = if status.is_success() {
            String::new()
        } else {
            response.text().await.unwrap_or_default()
        };
        Ok((status, text))
    }
}

/// The read-revision-then-conditional-write sequence, generic over the
/// transport: fetch the current revision first, attach it to the write if
/// one exists, retry only transport errors and server errors.
async fn upsert_via(
    transport: &(impl ContentsTransport + ?Sized),
    path: &str,
    content: &[u8],
    commit_message: &str,
    branch: &str,
    max_retries: u32,
    retry_backoff_ms: u64,
) -> Result<()> {
    let revision = transport.fetch_revision(path).await?;
    debug!("Current revision for '{}': {:?}", path, revision);
    let body = build_upsert_body(content, commit_message, branch, revision.as_deref());

    let attempts = max_retries.max(1);
    for attempt in 1..=attempts {
        match transport.put_contents(path, &body).await {
            Ok((status, _)) if status.is_success() => {
                info!(
                    "Published '{}' ({})",
                    path,
                    if revision.is_some() { "updated" } else { "created" }
                );
                return Ok(());
            }
            Ok((status, text)) if status.is_server_error() && attempt < attempts => {
                warn!(
                    "Publish attempt {} for '{}' got {}: {}",
                    attempt, path, status, text
                );
            }
            Ok((status, text)) => {
                return Err(SubrelayError::Remote(format!(
                    "Publish of '{}' rejected with {}: {}",
                    path, status, text
                )));
            }
            Err(SubrelayError::Http(e)) if attempt < attempts => {
                warn!("Publish attempt {} for '{}' failed: {}", attempt, path, e);
            }
            Err(e) => return Err(e),
        }
        sleep(Duration::from_millis(retry_backoff_ms * attempt as u64)).await;
    }

    Err(SubrelayError::Remote(format!(
        "Publish of '{}' failed after {} attempts",
        path, attempts
    )))
}

/// Conditional-write request body: the revision token is attached whenever
/// the object already exists, never otherwise.
fn build_upsert_body(
    content: &[u8],
    commit_message: &str,
    branch: &str,
    revision: Option<&str>,
) -> Value {
    let mut body = json!({
        "message": commit_message,
        "content": BASE64.encode(content),
        "branch": branch,
    });
    if let Some(sha) = revision {
        body["sha"] = json!(sha);
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// In-memory store enforcing the same revision rule as the real one: a
    /// write must carry the current sha (or none when the object is new).
    #[derive(Default)]
    struct ScriptedStore {
        object: Mutex<Option<(String, Value)>>,
        puts: Mutex<Vec<Value>>,
    }

    #[async_trait]
    impl ContentsTransport for ScriptedStore {
        async fn fetch_revision(&self, _path: &str) -> Result<Option<String>> {
            Ok(self
                .object
                .lock()
                .unwrap()
                .as_ref()
                .map(|(sha, _)| sha.clone()))
        }

        async fn put_contents(&self, _path: &str, body: &Value) -> Result<(StatusCode, String)> {
            let put_count = {
                let mut puts = self.puts.lock().unwrap();
                puts.push(body.clone());
                puts.len()
            };

            let mut object = self.object.lock().unwrap();
            let current = object.as_ref().map(|(sha, _)| sha.as_str().to_string());
            let sent = body
                .get("sha")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string());
            if current != sent {
                return Ok((StatusCode::CONFLICT, "sha mismatch".to_string()));
            }

            *object = Some((format!("sha-{}", put_count), body.clone()));
            Ok((StatusCode::OK, String::new()))
        }
    }

    #[tokio::test]
    async fn test_upsert_twice_updates_with_captured_revision() {
        let store = ScriptedStore::default();

        upsert_via(&store, "dir/file.srt", b"first", "add file", "main", 1, 0)
            .await
            .unwrap();
        upsert_via(&store, "dir/file.srt", b"second", "update file", "main", 1, 0)
            .await
            .unwrap();

        let puts = store.puts.lock().unwrap();
        assert_eq!(puts.len(), 2);
        // Create carries no revision; update carries the one the first
        // write produced
        assert!(puts[0].get("sha").is_none());
        assert_eq!(puts[1]["sha"], "sha-1");

        // Exactly one object at the path, holding the second call's content
        let object = store.object.lock().unwrap();
        let (_, body) = object.as_ref().unwrap();
        assert_eq!(body["content"], BASE64.encode(b"second"));
        assert_eq!(body["message"], "update file");
    }

    #[tokio::test]
    async fn test_upsert_surfaces_conflict_without_retry() {
        let store = ScriptedStore::default();
        // Pre-existing object the transport's revision lookup will not
        // report, simulating a racing writer between GET and PUT
        *store.object.lock().unwrap() = Some(("sha-race".to_string(), Value::Null));

        struct StaleFetch<'a>(&'a ScriptedStore);

        #[async_trait]
        impl ContentsTransport for StaleFetch<'_> {
            async fn fetch_revision(&self, _path: &str) -> Result<Option<String>> {
                Ok(None)
            }
            async fn put_contents(&self, path: &str, body: &Value) -> Result<(StatusCode, String)> {
                self.0.put_contents(path, body).await
            }
        }

        let err = upsert_via(&StaleFetch(&store), "f", b"x", "m", "main", 3, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, SubrelayError::Remote(_)));
        // A conflict is rejected on the first attempt, never retried
        assert_eq!(store.puts.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_parse_repo_url_default_branch() {
        let loc = RepoLocation::parse("https://github.com/owner/repo").unwrap();
        assert_eq!(loc.owner, "owner");
        assert_eq!(loc.repo, "repo");
        assert_eq!(loc.branch, "main");
    }

    #[test]
    fn test_parse_repo_url_with_branch() {
        let loc = RepoLocation::parse("https://github.com/owner/repo/tree/release").unwrap();
        assert_eq!(loc.branch, "release");
    }

    #[test]
    fn test_parse_repo_url_git_suffix_and_trailing_slash() {
        let loc = RepoLocation::parse("https://github.com/owner/repo.git/").unwrap();
        assert_eq!(loc.repo, "repo");
    }

    #[test]
    fn test_parse_repo_url_rejects_short_paths() {
        assert!(RepoLocation::parse("https://github.com/owner").is_err());
        assert!(RepoLocation::parse("https://github.com/").is_err());
    }

    #[test]
    fn test_upsert_body_without_revision_is_a_create() {
        let body = build_upsert_body(b"hello", "add file", "main", None);
        assert_eq!(body["branch"], "main");
        assert_eq!(body["content"], BASE64.encode(b"hello"));
        assert!(body.get("sha").is_none());
    }

    #[test]
    fn test_upsert_body_with_revision_is_conditional() {
        let body = build_upsert_body(b"hello", "update file", "main", Some("abc123"));
        assert_eq!(body["sha"], "abc123");
    }

    #[test]
    fn test_target_path_joins_configured_dir() {
        let config = RemoteConfig {
            repo_url: "https://github.com/owner/repo".to_string(),
            target_dir: "/season1/".to_string(),
            request_delay_ms: 0,
            max_retries: 1,
            retry_backoff_ms: 0,
        };
        let publisher = RemotePublisher::new(config, "t".to_string()).unwrap();
        assert_eq!(publisher.target_path("ep01.vi.srt"), "season1/ep01.vi.srt");
    }
}
