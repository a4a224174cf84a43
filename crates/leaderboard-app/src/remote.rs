//! Client side of the listing API.

use std::future::Future;
use std::time::Duration;

use leaderboard_core::{clamp_limit, Cursor, Listing, Position, SortField, SortOrder, TeamLogo};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// One page as served by `/api/players/<ns>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResponse<E> {
    /// Rows in display order.
    pub data: Vec<E>,
    /// Cursor of the following page, `null` on the last page.
    #[serde(default)]
    pub next_cursor: Option<Cursor>,
}

/// Parameters of one page request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest<F> {
    /// Rows wanted, already clamped to `1..=100`.
    pub limit: usize,
    pub sort_field: F,
    pub sort_order: SortOrder,
    /// `None` asks for the first page.
    pub cursor: Option<Cursor>,
}

impl<F: SortField> PageRequest<F> {
    /// Request `limit` rows at `position`.
    pub fn new(limit: usize, position: Position<F>) -> Self {
        Self {
            limit: clamp_limit(limit),
            sort_field: position.sort_field,
            sort_order: position.sort_order,
            cursor: position.cursor,
        }
    }

    /// Query-string pairs in the order the API documents them.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("limit", self.limit.to_string()),
            ("sortField", self.sort_field.as_str().to_owned()),
            ("sortOrder", self.sort_order.as_str().to_owned()),
        ];
        if let Some(cursor) = &self.cursor {
            pairs.push(("cursor", cursor.as_str().to_owned()));
        }
        pairs
    }
}

/// Failure of a remote call. Never retried.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Connection, timeout or body transfer failure.
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    /// Non-success status.
    #[error("server responded {status}: {body}")]
    Server { status: u16, body: String },
    /// Body that is not the expected JSON.
    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Source of listing pages for a controller.
pub trait RemoteListing<L: Listing>: Send + Sync + 'static {
    /// Fetch one page.
    fn fetch_page(
        &self,
        request: &PageRequest<L::SortField>,
    ) -> impl Future<Output = Result<PageResponse<L::Entity>, RemoteError>> + Send;
}

/// HTTP client for the listing and logo endpoints.
#[derive(Debug, Clone)]
pub struct HttpRemote {
    client: reqwest::Client,
    api_base: String,
}

impl HttpRemote {
    /// Client against `api_base` (e.g. `http://127.0.0.1:3000`).
    pub fn new(api_base: impl Into<String>, timeout: Duration) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_owned(),
        })
    }

    /// Absolute URL of `path`.
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.api_base)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&'static str, String)],
    ) -> Result<T, RemoteError> {
        let url = self.url(path);
        debug!(%url, ?query, "GET");
        let response = self.client.get(&url).query(query).send().await?;
        let status = response.status();
        let body = response.bytes().await?;
        if !status.is_success() {
            return Err(RemoteError::Server {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }
        Ok(serde_json::from_slice(&body)?)
    }

    /// Fetch every team logo.
    pub async fn fetch_team_logos(&self) -> Result<Vec<TeamLogo>, RemoteError> {
        #[derive(Deserialize)]
        struct LogoResponse {
            data: Vec<TeamLogo>,
        }
        let response: LogoResponse = self.get_json("/api/logos/teams/milb", &[]).await?;
        Ok(response.data)
    }
}

impl<L: Listing> RemoteListing<L> for HttpRemote {
    async fn fetch_page(
        &self,
        request: &PageRequest<L::SortField>,
    ) -> Result<PageResponse<L::Entity>, RemoteError> {
        let path = format!("/api/players/{}", L::NAMESPACE);
        self.get_json(&path, &request.query_pairs()).await
    }
}
