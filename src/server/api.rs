use crate::cli::Args;
use crate::document::DocumentFetcher;
use crate::error::RelayError;
use crate::llm::ChatClient;
use crate::models::relay::{
    AnalyzeDocumentBody,
    AnalyzeDocumentResponse,
    FetchDocumentBody,
    FetchDocumentResponse,
    QueryBody,
    QueryResponse,
    RelayEvent,
    StreamParams,
};
use crate::relay::open_relay;
use crate::session::SessionStore;
use std::convert::Infallible;
use std::error::Error;
use std::sync::Arc;
use axum::{
    routing::{ get, post },
    Router,
    Json,
    extract::{ rejection::JsonRejection, State, Query },
    response::{ IntoResponse, sse::{ Event, KeepAlive, Sse } },
};
use futures::StreamExt;
use serde_json::json;
use tower_http::cors::{ Any, CorsLayer };
use uuid::Uuid;
use log::{ info, error };

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionStore>,
    pub client: Arc<dyn ChatClient>,
    pub documents: DocumentFetcher,
    pub args: Args,
}

impl AppState {
    pub fn new(args: Args, client: Arc<dyn ChatClient>) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let documents = DocumentFetcher::new(args.fetch_timeout(), args.max_document_bytes)?;
        Ok(Self {
            sessions: Arc::new(SessionStore::new(args.session_ttl())),
            client,
            documents,
            args,
        })
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/query", post(query_handler))
        .route("/api/stream", get(stream_handler))
        .route("/api/fetch-document", post(fetch_document_handler))
        .route("/api/analyze-document", post(analyze_document_handler))
        .layer(cors)
        .with_state(state)
}

fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, RelayError> {
    body.map(|Json(inner)| inner).map_err(|e| RelayError::InvalidInput(e.body_text()))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

pub fn to_sse_event(event: &RelayEvent) -> Event {
    Event::default().data(event.wire_data())
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn query_handler(
    State(state): State<AppState>,
    body: Result<Json<QueryBody>, JsonRejection>,
) -> Result<Json<QueryResponse>, RelayError> {
    let body = json_body(body)?;
    let session_id = state.sessions
        .submit(
            body.model.as_deref().unwrap_or_default(),
            body.prompt.as_deref().unwrap_or_default()
        ).await?;

    Ok(Json(QueryResponse {
        message: "Query received. You can now connect to /api/stream.".into(),
        session_id,
    }))
}

async fn stream_handler(
    State(state): State<AppState>,
    Query(params): Query<StreamParams>,
) -> Result<impl IntoResponse, RelayError> {
    let request = match non_empty(params.session) {
        Some(raw) => {
            let id = Uuid::parse_str(raw.trim()).map_err(|_| {
                RelayError::InvalidInput(format!("Invalid session id '{}'", raw))
            })?;
            state.sessions.take_session(&id).await?
        }
        None => state.sessions.take_current().await?,
    };

    let events = open_relay(Arc::clone(&state.client), request)
        .map(|event| Ok::<_, Infallible>(to_sse_event(&event)));

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

async fn fetch_document_handler(
    State(state): State<AppState>,
    body: Result<Json<FetchDocumentBody>, JsonRejection>,
) -> Result<Json<FetchDocumentResponse>, RelayError> {
    let url = non_empty(json_body(body)?.url)
        .ok_or_else(|| RelayError::InvalidInput("URL is required".into()))?;

    let text = state.documents.fetch_text(&url).await?;
    info!("Extracted {} characters from {}", text.chars().count(), url);
    Ok(Json(FetchDocumentResponse { text }))
}

async fn analyze_document_handler(
    State(state): State<AppState>,
    body: Result<Json<AnalyzeDocumentBody>, JsonRejection>,
) -> Result<Json<AnalyzeDocumentResponse>, RelayError> {
    let body = json_body(body)?;
    let text = non_empty(body.text)
        .ok_or_else(|| RelayError::InvalidInput("Text is required".into()))?;

    let model = match non_empty(body.model) {
        Some(model) => model,
        None => state.sessions
            .current_model().await
            .unwrap_or_else(|| state.args.default_model.clone()),
    };
    let prompt = state.args.analysis_prompt.replace("{text}", &text);

    info!("Analyzing {} characters with model '{}'", text.chars().count(), model);
    let completion = state.client.complete(&model, &prompt).await.map_err(|e| {
        error!("Document analysis failed: {}", e);
        e
    })?;

    Ok(Json(AnalyzeDocumentResponse { response: completion.response }))
}
