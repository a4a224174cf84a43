//! HTTP API: `/api/players/{milb,mlb}`, `/api/logos/teams/milb`, `/api/contact`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    body::{Body, Bytes},
    extract::{Query, Request, State},
    http::{HeaderMap, HeaderValue, Method, StatusCode, header::CONTENT_TYPE, header::ORIGIN},
    middleware::{Next, from_fn_with_state},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use leaderboard_app::{
    AppConfig, ContactError, ContactService, Dataset, DocumentCollection, ListingError, ListingParams,
    ListingService, MemoryCollection, SUCCESS_MESSAGE, SpoolRelay,
};
use leaderboard_app::contact::origin_allowed;
use leaderboard_core::{Milb, Mlb, TeamLogo};
use serde_json::json;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{error, info};

const FORBIDDEN_ORIGIN: &str = "Unauthorized request origin.";

/// Shared handler state over the MiLB collection `M` and the MLB
/// collection `N`.
pub struct AppState<M = Arc<MemoryCollection<Milb>>, N = Arc<MemoryCollection<Mlb>>> {
    milb: Arc<ListingService<Milb, M>>,
    mlb: Arc<ListingService<Mlb, N>>,
    team_logos: Arc<Vec<TeamLogo>>,
    contact: Arc<ContactService<SpoolRelay>>,
    allowed_origin: Option<HeaderValue>,
}

impl<M, N> Clone for AppState<M, N> {
    fn clone(&self) -> Self {
        Self {
            milb: Arc::clone(&self.milb),
            mlb: Arc::clone(&self.mlb),
            team_logos: Arc::clone(&self.team_logos),
            contact: Arc::clone(&self.contact),
            allowed_origin: self.allowed_origin.clone(),
        }
    }
}

impl AppState {
    /// Wire services over `dataset` with the settings of `config`.
    pub fn new(dataset: Dataset, config: &AppConfig) -> Result<Self> {
        Self::with_collections(dataset.milb, dataset.mlb, dataset.team_logos, config)
    }
}

impl<M, N> AppState<M, N>
where
    M: DocumentCollection<Milb>,
    N: DocumentCollection<Mlb>,
{
    /// Wire services over the given collections with the settings of
    /// `config`.
    pub fn with_collections(
        milb: M,
        mlb: N,
        team_logos: Arc<Vec<TeamLogo>>,
        config: &AppConfig,
    ) -> Result<Self> {
        let timeout = config.server.query_timeout();
        let allowed_origin = config
            .server
            .allowed_origin
            .as_deref()
            .map(HeaderValue::from_str)
            .transpose()
            .context("server.allowed_origin is not a valid header value")?;
        Ok(Self {
            milb: Arc::new(ListingService::new(milb, timeout)),
            mlb: Arc::new(ListingService::new(mlb, timeout)),
            team_logos,
            contact: Arc::new(ContactService::new(
                SpoolRelay::from_config(&config.mail),
                &config.mail,
                config.server.allowed_origin.clone(),
            )),
            allowed_origin,
        })
    }
}

/// Error rendered as an API response.
#[derive(Debug, Error)]
pub enum ApiError {
    /// MiLB listing failure; server faults carry `{message, code}`.
    #[error(transparent)]
    Milb(ListingError),
    /// MLB listing failure; every body is `{error: "<text>"}`.
    #[error(transparent)]
    Mlb(ListingError),
    /// Contact form rejection or relay failure.
    #[error(transparent)]
    Contact(#[from] ContactError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Milb(err) if !err.is_client_error() => {
                error!(%err, "API Error");
                let body = json!({ "error": { "message": err.to_string(), "code": err.code() } });
                (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
            }
            Self::Milb(err) | Self::Mlb(err) => {
                let status = if err.is_client_error() {
                    StatusCode::BAD_REQUEST
                } else {
                    error!(%err, "API Error");
                    StatusCode::INTERNAL_SERVER_ERROR
                };
                (status, Json(json!({ "error": err.public_message() }))).into_response()
            }
            Self::Contact(ContactError::Forbidden) => {
                (StatusCode::FORBIDDEN, Json(json!({ "error": FORBIDDEN_ORIGIN }))).into_response()
            }
            Self::Contact(ContactError::Validation(errors)) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": errors }))).into_response()
            }
            Self::Contact(ContactError::Relay(err)) => {
                error!(%err, "Contact form submission error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "Internal Server Error" })),
                )
                    .into_response()
            }
        }
    }
}

async fn milb_players<M, N>(
    State(state): State<AppState<M, N>>,
    Query(params): Query<ListingParams>,
) -> Result<Response, ApiError>
where
    M: DocumentCollection<Milb>,
{
    let page = state.milb.page(&params).await.map_err(ApiError::Milb)?;
    Ok(Json(page).into_response())
}

async fn mlb_players<M, N>(
    State(state): State<AppState<M, N>>,
    Query(params): Query<ListingParams>,
) -> Result<Response, ApiError>
where
    N: DocumentCollection<Mlb>,
{
    let page = state.mlb.page(&params).await.map_err(ApiError::Mlb)?;
    Ok(Json(page).into_response())
}

async fn team_logos<M, N>(State(state): State<AppState<M, N>>) -> Response {
    Json(json!({ "data": state.team_logos.as_slice() })).into_response()
}

async fn contact<M, N>(
    State(state): State<AppState<M, N>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let origin = headers.get(ORIGIN).and_then(|v| v.to_str().ok());
    state.contact.submit(origin, &body).await?;
    Ok(Json(json!({ "message": SUCCESS_MESSAGE })).into_response())
}

/// Reject requests whose `Origin` differs from the configured one.
async fn origin_guard<M, N>(
    State(state): State<AppState<M, N>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let origin = request.headers().get(ORIGIN).and_then(|v| v.to_str().ok());
    let allowed = state.allowed_origin.as_ref().and_then(|v| v.to_str().ok());
    if !origin_allowed(origin, allowed) {
        return ApiError::Contact(ContactError::Forbidden).into_response();
    }
    next.run(request).await
}

/// Build the API router.
pub fn router<M, N>(state: AppState<M, N>) -> Router
where
    M: DocumentCollection<Milb>,
    N: DocumentCollection<Mlb>,
{
    let allow_origin = state
        .allowed_origin
        .clone()
        .map_or_else(AllowOrigin::any, AllowOrigin::exact);
    let cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));

    Router::new()
        .route("/api/players/milb", get(milb_players::<M, N>))
        .route("/api/players/mlb", get(mlb_players::<M, N>))
        .route("/api/logos/teams/milb", get(team_logos::<M, N>))
        .route("/api/contact", post(contact::<M, N>))
        .layer(from_fn_with_state(state.clone(), origin_guard::<M, N>))
        .layer(cors)
        .with_state(state)
}

/// Load the dataset and serve until Ctrl+C or SIGTERM.
pub async fn serve(config: AppConfig, bind: Option<String>) -> Result<()> {
    info!("Loading dataset...");
    let dataset = Dataset::load(&config.server.data_dir).await?;
    let state = AppState::new(dataset, &config)?;
    let app = router(state);

    let address = bind.unwrap_or_else(|| config.server.bind.clone());
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(err) => {
                error!(%err, "Failed to install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(err) => {
                error!(%err, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use leaderboard_app::OrderedQuery;
    use leaderboard_core::{Listing, PlayerMilb, PlayerMlb};
    use serde_json::Value;
    use tower::ServiceExt;

    fn dataset() -> Dataset {
        let milb = (1..=40)
            .map(|i| PlayerMilb {
                id: format!("p{i}"),
                rank: i,
                ..PlayerMilb::default()
            })
            .collect();
        let mlb = (0..5)
            .map(|i| PlayerMlb {
                id: format!("m{i}"),
                season: 2020 + i,
                ..PlayerMlb::default()
            })
            .collect();
        Dataset {
            milb: Arc::new(MemoryCollection::new(milb)),
            mlb: Arc::new(MemoryCollection::new(mlb)),
            team_logos: Arc::new(vec![TeamLogo {
                id: "t1".into(),
                image: "iVBOR".into(),
            }]),
        }
    }

    fn app(config: &AppConfig) -> Result<Router> {
        Ok(router(AppState::new(dataset(), config)?))
    }

    async fn call(app: Router, request: Request<Body>) -> Result<(StatusCode, Value)> {
        let response = app.oneshot(request).await?;
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await?;
        Ok((status, serde_json::from_slice(&bytes)?))
    }

    fn get_req(uri: &str) -> Result<Request<Body>> {
        Ok(Request::builder().uri(uri).body(Body::empty())?)
    }

    #[tokio::test]
    async fn milb_first_page_and_cursor() -> Result<()> {
        let (status, body) = call(app(&AppConfig::default())?, get_req("/api/players/milb?limit=30")?).await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"].as_array().map(Vec::len), Some(30));
        assert_eq!(body["nextCursor"], r#"{"value":30,"id":"p30"}"#);

        let (_, page2) = call(
            app(&AppConfig::default())?,
            get_req("/api/players/milb?cursor=%7B%22value%22%3A30%2C%22id%22%3A%22p30%22%7D")?,
        )
        .await?;
        assert_eq!(page2["data"][0]["id"], "p31");
        assert_eq!(page2["data"].as_array().map(Vec::len), Some(10));
        assert_eq!(page2["nextCursor"], Value::Null);
        Ok(())
    }

    #[tokio::test]
    async fn bad_listing_params_are_400() -> Result<()> {
        let (status, body) = call(app(&AppConfig::default())?, get_req("/api/players/mlb?sortField=bogus")?).await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "error": "Invalid sort field" }));

        let (status, body) = call(app(&AppConfig::default())?, get_req("/api/players/milb?cursor=oops")?).await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "error": "Invalid cursor format" }));
        Ok(())
    }

    #[tokio::test]
    async fn mlb_scalar_cursor_pages() -> Result<()> {
        let (_, body) = call(
            app(&AppConfig::default())?,
            get_req("/api/players/mlb?limit=2&sortOrder=desc")?,
        )
        .await?;
        assert_eq!(body["data"][0]["season"], 2024);
        assert_eq!(body["nextCursor"], "2023");
        Ok(())
    }

    /// Collection whose queries never complete.
    struct Stalled;

    impl<L: Listing> DocumentCollection<L> for Stalled {
        async fn query(&self, _query: &OrderedQuery<L::SortField>) -> Result<Vec<L::Entity>, ListingError> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn query_timeouts_use_each_listing_error_shape() -> Result<()> {
        let mut config = AppConfig::default();
        config.server.query_timeout_secs = 1;
        let stalled = || -> Result<Router> {
            Ok(router(AppState::with_collections(
                Stalled,
                Stalled,
                Arc::new(Vec::new()),
                &config,
            )?))
        };

        let (status, body) = call(stalled()?, get_req("/api/players/milb")?).await?;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body,
            json!({ "error": { "message": "Query timeout", "code": "QUERY_TIMEOUT" } })
        );

        let (status, body) = call(stalled()?, get_req("/api/players/mlb")?).await?;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({ "error": "Query timeout" }));
        Ok(())
    }

    #[tokio::test]
    async fn team_logos_are_listed() -> Result<()> {
        let (status, body) = call(app(&AppConfig::default())?, get_req("/api/logos/teams/milb")?).await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "data": [{ "id": "t1", "image": "iVBOR" }] }));
        Ok(())
    }

    #[tokio::test]
    async fn mismatched_origin_is_forbidden() -> Result<()> {
        let mut config = AppConfig::default();
        config.server.allowed_origin = Some("https://bwar.example".into());

        let request = Request::builder()
            .uri("/api/players/mlb")
            .header(ORIGIN, "https://evil.example")
            .body(Body::empty())?;
        let (status, body) = call(app(&config)?, request).await?;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], FORBIDDEN_ORIGIN);

        let request = Request::builder()
            .uri("/api/players/mlb")
            .header(ORIGIN, "https://bwar.example")
            .body(Body::empty())?;
        let (status, _) = call(app(&config)?, request).await?;
        assert_eq!(status, StatusCode::OK);
        Ok(())
    }

    #[tokio::test]
    async fn contact_validation_and_delivery() -> Result<()> {
        let spool = tempfile::tempdir()?;
        let mut config = AppConfig::default();
        config.mail.from = Some("site@bwar.example".into());
        config.mail.to = Some("team@bwar.example".into());
        config.mail.spool_dir = spool.path().to_path_buf();

        let post_req = |body: &'static str| {
            Request::builder()
                .method(Method::POST)
                .uri("/api/contact")
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(body))
        };

        let (status, body) = call(app(&config)?, post_req(r#"{"name":"A","email":"x","message":"hi"}"#)?).await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"].as_array().map(Vec::len), Some(3));
        assert_eq!(body["error"][1], json!({ "field": "email", "message": "Invalid email address." }));

        let (status, body) = call(
            app(&config)?,
            post_req(r#"{"name":"Ann","email":"ann@bwar.example","message":"Great leaderboard!"}"#)?,
        )
        .await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "message": SUCCESS_MESSAGE }));
        assert_eq!(std::fs::read_dir(spool.path())?.count(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn unconfigured_relay_is_500() -> Result<()> {
        let (status, body) = call(
            app(&AppConfig::default())?,
            Request::builder()
                .method(Method::POST)
                .uri("/api/contact")
                .body(Body::from(r#"{"name":"Ann","email":"ann@bwar.example","message":"Great leaderboard!"}"#))?,
        )
        .await?;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({ "error": "Internal Server Error" }));
        Ok(())
    }
}
