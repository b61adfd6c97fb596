use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, ErrorKind, Result};
use crate::remote::{RemoteEntry, RemoteFile, RemoteStore};

pub const API_URL: &str = "https://api.github.com";

/// Fixed anonymous committer identity; writes are authorized by the token,
/// not attributed to a user.
const COMMITTER_NAME: &str = "cloudsave";
const COMMITTER_EMAIL: &str = "<none>";

const ACCEPT: &str = "application/vnd.github+json";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// GitHub Contents API backend. Objects are files in a user-owned repo,
/// transported as base64; the blob SHA is the compare-and-swap token.
pub struct GitHubStore {
    client: reqwest::blocking::Client,
    owner: String,
    repo: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct ContentsEntry {
    name: String,
    sha: String,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PutResponse {
    content: ContentsEntry,
}

#[derive(Debug, Serialize)]
struct Committer<'a> {
    name: &'a str,
    email: &'a str,
}

#[derive(Debug, Serialize)]
struct PutBody<'a> {
    message: &'a str,
    committer: Committer<'a>,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
}

impl GitHubStore {
    pub fn new(
        owner: impl Into<String>,
        repo: impl Into<String>,
        token: impl Into<String>,
    ) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("cloudsave/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                Error::new(
                    ErrorKind::RemoteUnavailable,
                    format!("failed to build HTTP client: {e}"),
                )
            })?;
        Ok(Self {
            client,
            owner: owner.into(),
            repo: repo.into(),
            token: token.into(),
        })
    }

    fn contents_url(&self, path: &str) -> String {
        let base = format!("{API_URL}/repos/{}/{}/contents", self.owner, self.repo);
        let path = path.trim_matches('/');
        if path.is_empty() {
            base
        } else {
            format!("{base}/{path}")
        }
    }

    fn send(&self, req: reqwest::blocking::RequestBuilder) -> Result<reqwest::blocking::Response> {
        req.header("Accept", ACCEPT)
            .bearer_auth(&self.token)
            .send()
            .map_err(|e| {
                Error::new(
                    ErrorKind::RemoteUnavailable,
                    format!("remote store request failed: {e}"),
                )
            })
    }
}

fn decode_content(raw: &str) -> Result<Vec<u8>> {
    // The API wraps base64 payloads at 60 columns.
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    BASE64.decode(compact.as_bytes()).map_err(|e| {
        Error::new(
            ErrorKind::RemoteUnavailable,
            format!("remote object has invalid base64 content: {e}"),
        )
    })
}

fn status_error(op: &str, res: reqwest::blocking::Response) -> Error {
    let status = res.status();
    let detail = res
        .json::<serde_json::Value>()
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(String::from))
        .unwrap_or_default();
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Error::new(
            ErrorKind::RemoteUnavailable,
            format!("{op} was rejected as unauthorized ({status}); check the token and its permissions"),
        );
    }
    Error::new(
        ErrorKind::RemoteUnavailable,
        format!("{op} failed with status {status}: {detail}"),
    )
}

impl RemoteStore for GitHubStore {
    fn get(&self, path: &str) -> Result<Option<RemoteFile>> {
        let url = self.contents_url(path);
        debug!(%url, "GET contents");
        let res = self.send(self.client.get(&url))?;
        if res.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !res.status().is_success() {
            return Err(status_error("fetch", res));
        }
        let entry: ContentsEntry = res.json().map_err(|e| {
            Error::new(
                ErrorKind::RemoteUnavailable,
                format!("failed to parse contents response: {e}"),
            )
        })?;
        let content = decode_content(entry.content.as_deref().unwrap_or_default())?;
        Ok(Some(RemoteFile {
            name: entry.name,
            content,
            hash: entry.sha,
        }))
    }

    fn put(
        &self,
        path: &str,
        content: &[u8],
        expected_hash: Option<&str>,
        message: &str,
    ) -> Result<String> {
        let url = self.contents_url(path);
        debug!(%url, cas = expected_hash.is_some(), "PUT contents");
        let body = PutBody {
            message,
            committer: Committer {
                name: COMMITTER_NAME,
                email: COMMITTER_EMAIL,
            },
            content: BASE64.encode(content),
            sha: expected_hash,
        };
        let res = self.send(self.client.put(&url).json(&body))?;
        let status = res.status();
        // 409 is the documented sha-mismatch conflict; 422 covers writes
        // against an object that gained or lost a sha since the last read.
        if status == reqwest::StatusCode::CONFLICT
            || status == reqwest::StatusCode::UNPROCESSABLE_ENTITY
        {
            return Err(Error::new(
                ErrorKind::ConcurrentModification,
                format!("write to '{path}' rejected: content changed since it was last read"),
            ));
        }
        if !status.is_success() {
            return Err(status_error("write", res));
        }
        let parsed: PutResponse = res.json().map_err(|e| {
            Error::new(
                ErrorKind::RemoteUnavailable,
                format!("failed to parse write response: {e}"),
            )
        })?;
        Ok(parsed.content.sha)
    }

    fn list(&self, path: &str) -> Result<Vec<RemoteEntry>> {
        let url = self.contents_url(path);
        debug!(%url, "LIST contents");
        let res = self.send(self.client.get(&url))?;
        if res.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !res.status().is_success() {
            return Err(status_error("list", res));
        }
        let entries: Vec<ContentsEntry> = res.json().map_err(|e| {
            Error::new(
                ErrorKind::RemoteUnavailable,
                format!("failed to parse directory listing: {e}"),
            )
        })?;
        Ok(entries
            .into_iter()
            .map(|e| RemoteEntry {
                name: e.name,
                hash: e.sha,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contents_url_handles_root_and_nested_paths() {
        let store = GitHubStore::new("alice", "saves", "t").expect("store");
        assert_eq!(
            store.contents_url(""),
            "https://api.github.com/repos/alice/saves/contents"
        );
        assert_eq!(
            store.contents_url("game/manifest.json"),
            "https://api.github.com/repos/alice/saves/contents/game/manifest.json"
        );
    }

    #[test]
    fn decode_tolerates_wrapped_base64() {
        let encoded = "aGVs\nbG8g\nd29y\nbGQ=\n";
        assert_eq!(decode_content(encoded).expect("decode"), b"hello world");
    }

    #[test]
    fn decode_rejects_garbage() {
        let err = decode_content("not base64 !!!").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RemoteUnavailable);
    }
}
