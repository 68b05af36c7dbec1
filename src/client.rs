//! Client for the share's `fs` API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ClientError;

const USER_AGENT: &str = concat!("alist-mirror/", env!("CARGO_PKG_VERSION"));

/// Wire value of `type` that marks a directory.
const DIRECTORY_TYPE: i64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Directory,
    File,
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteItem {
    pub name: String,
    pub kind: ItemKind,
}

impl RemoteItem {
    pub fn dir(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ItemKind::Directory,
        }
    }

    pub fn file(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ItemKind::File,
        }
    }
}

/// The two remote operations the crawler needs.
#[async_trait]
pub trait RemoteTree: Send + Sync {
    /// List a directory. An empty directory is `Ok(vec![])`.
    async fn list_directory(&self, path: &str) -> Result<Vec<RemoteItem>, ClientError>;

    /// Resolve a file's direct URL. `Ok(None)` when the share has none.
    async fn resolve_download_url(&self, path: &str) -> Result<Option<String>, ClientError>;
}

/// Build the HTTP client shared by API calls and downloads.
///
/// `timeout` bounds connection setup and each read, not the whole transfer.
pub fn build_http_client(proxy: Option<&str>, timeout: Duration) -> reqwest::Result<Client> {
    let mut builder = Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .read_timeout(timeout);
    if let Some(proxy) = proxy {
        builder = builder.proxy(reqwest::Proxy::all(proxy)?);
    }
    builder.build()
}

#[derive(Serialize)]
struct PathRequest<'a> {
    path: &'a str,
}

#[derive(Deserialize)]
struct Envelope<T> {
    code: Option<i64>,
    message: Option<String>,
    data: Option<T>,
}

#[derive(Deserialize)]
struct ListData {
    content: Option<Vec<ListEntry>>,
}

#[derive(Deserialize)]
struct ListEntry {
    name: String,
    #[serde(rename = "type")]
    kind: i64,
}

#[derive(Deserialize)]
struct GetData {
    raw_url: Option<String>,
}

pub struct ApiClient {
    client: Client,
    list_url: Url,
    get_url: Url,
    timeout: Duration,
}

impl ApiClient {
    pub fn new(base: &Url, client: Client, timeout: Duration) -> Result<Self, url::ParseError> {
        Ok(Self {
            client,
            list_url: base.join("/api/fs/list")?,
            get_url: base.join("/api/fs/get")?,
            timeout,
        })
    }

    async fn post<T: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        url: &Url,
        path: &str,
    ) -> Result<T, ClientError> {
        let resp = self
            .client
            .post(url.clone())
            .timeout(self.timeout)
            .json(&PathRequest { path })
            .send()
            .await
            .and_then(|resp| resp.error_for_status())
            .map_err(|e| ClientError::transport(endpoint, path, e))?;

        let body = resp
            .text()
            .await
            .map_err(|e| ClientError::transport(endpoint, path, e))?;
        let parsed: Envelope<T> = serde_json::from_str(&body)
            .map_err(|e| ClientError::protocol(endpoint, path, format!("invalid JSON: {}", e)))?;

        if let Some(code) = parsed.code.filter(|code| *code != 200) {
            let message = parsed.message.unwrap_or_default();
            return Err(ClientError::protocol(
                endpoint,
                path,
                format!("code {}: {}", code, message),
            ));
        }

        parsed
            .data
            .ok_or_else(|| ClientError::protocol(endpoint, path, "response has no data"))
    }
}

#[async_trait]
impl RemoteTree for ApiClient {
    async fn list_directory(&self, path: &str) -> Result<Vec<RemoteItem>, ClientError> {
        let data: ListData = self.post("list", &self.list_url, path).await?;
        let items = data
            .content
            .unwrap_or_default()
            .into_iter()
            .map(|entry| RemoteItem {
                name: entry.name,
                kind: if entry.kind == DIRECTORY_TYPE {
                    ItemKind::Directory
                } else {
                    ItemKind::File
                },
            })
            .collect();
        Ok(items)
    }

    async fn resolve_download_url(&self, path: &str) -> Result<Option<String>, ClientError> {
        let data: GetData = self.post("get", &self.get_url, path).await?;
        Ok(data.raw_url.filter(|url| !url.is_empty()))
    }
}
