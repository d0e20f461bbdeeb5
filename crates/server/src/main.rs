//! Quorum Server
//!
//! Axum server exposing the conversation API and the per-turn SSE event
//! stream. The deliberation pipeline itself lives in `quorum_core`; this
//! binary wires it to HTTP, spawns turns, and bridges their events to
//! subscribers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        Json,
    },
    routing::{get, post},
    Router,
};
use clap::{Parser, Subcommand};
use futures::Stream;
use quorum_core::council::{TurnError, TurnRegistry, TurnRunner};
use quorum_core::gateway::{ChatProvider, OpenRouterGateway};
use quorum_core::models::CouncilConfig;
use quorum_core::store::QuorumDb;
use serde::{Deserialize, Serialize};
use std::{convert::Infallible, net::SocketAddr, sync::Arc};
use tokio::{net::TcpListener, sync::mpsc};
use tokio_stream::{wrappers::ReceiverStream, StreamExt};
use utoipa::{OpenApi, ToSchema};

/// Application state
struct AppState {
    db: Arc<QuorumDb>,
    gateway: Arc<dyn ChatProvider>,
    config: CouncilConfig,
    turns: TurnRegistry,
}

type SharedState = Arc<AppState>;

// === API Types ===

#[derive(Deserialize, ToSchema)]
struct SendMessageRequest {
    content: String,
}

#[derive(Serialize, ToSchema)]
struct ApiResponse {
    success: bool,
    message: String,
}

#[derive(Serialize, ToSchema)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
}

#[derive(Serialize, ToSchema)]
struct ConversationMetaResponse {
    id: String,
    created_at: String,
    title: String,
    message_count: i64,
}

#[derive(Serialize, ToSchema)]
struct ConversationResponse {
    id: String,
    created_at: String,
    title: String,
    /// Messages with their stage payloads, as stored
    #[schema(value_type = Vec<Object>)]
    messages: Vec<serde_json::Value>,
}

impl ConversationResponse {
    fn from_core(conversation: quorum_core::store::Conversation) -> Self {
        Self {
            id: conversation.id,
            created_at: conversation.created_at,
            title: conversation.title,
            messages: conversation
                .messages
                .iter()
                .filter_map(|m| serde_json::to_value(m).ok())
                .collect(),
        }
    }
}

type ApiError = (StatusCode, Json<ApiResponse>);

fn not_found(what: &str) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(ApiResponse {
            success: false,
            message: format!("{what} not found"),
        }),
    )
}

fn internal(err: anyhow::Error) -> ApiError {
    tracing::error!(error = %err, "request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiResponse {
            success: false,
            message: err.to_string(),
        }),
    )
}

// === OpenAPI ===

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        list_conversations,
        create_conversation,
        get_conversation,
        delete_conversation,
        send_message
    ),
    components(schemas(
        SendMessageRequest,
        ApiResponse,
        HealthResponse,
        ConversationMetaResponse,
        ConversationResponse
    )),
    tags(
        (name = "conversations", description = "Conversation management"),
        (name = "council", description = "Council deliberation turns")
    )
)]
struct ApiDoc;

async fn serve_openapi() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

// === API Handlers ===

/// Health check
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is up", body = HealthResponse)
    )
)]
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: "Quorum API",
    })
}

/// List all conversations (metadata only)
#[utoipa::path(
    get,
    path = "/api/v1/conversations",
    tag = "conversations",
    responses(
        (status = 200, description = "Conversation metadata, newest first", body = [ConversationMetaResponse])
    )
)]
async fn list_conversations(
    State(state): State<SharedState>,
) -> Result<Json<Vec<ConversationMetaResponse>>, ApiError> {
    let listed = state.db.list_conversations().map_err(internal)?;
    Ok(Json(
        listed
            .into_iter()
            .map(|c| ConversationMetaResponse {
                id: c.id,
                created_at: c.created_at,
                title: c.title,
                message_count: c.message_count,
            })
            .collect(),
    ))
}

/// Create a new conversation
#[utoipa::path(
    post,
    path = "/api/v1/conversations",
    tag = "conversations",
    responses(
        (status = 200, description = "New empty conversation", body = ConversationResponse)
    )
)]
async fn create_conversation(
    State(state): State<SharedState>,
) -> Result<Json<ConversationResponse>, ApiError> {
    let conversation = state.db.create_conversation().map_err(internal)?;
    Ok(Json(ConversationResponse::from_core(conversation)))
}

/// Fetch a conversation with all messages and stage payloads
#[utoipa::path(
    get,
    path = "/api/v1/conversations/{id}",
    tag = "conversations",
    params(("id" = String, Path, description = "Conversation id")),
    responses(
        (status = 200, description = "Hydrated conversation", body = ConversationResponse),
        (status = 404, description = "Unknown conversation", body = ApiResponse)
    )
)]
async fn get_conversation(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<ConversationResponse>, ApiError> {
    let conversation = state
        .db
        .get_conversation(&id)
        .map_err(internal)?
        .ok_or_else(|| not_found("Conversation"))?;
    Ok(Json(ConversationResponse::from_core(conversation)))
}

/// Delete a conversation and all its messages
#[utoipa::path(
    delete,
    path = "/api/v1/conversations/{id}",
    tag = "conversations",
    params(("id" = String, Path, description = "Conversation id")),
    responses(
        (status = 200, description = "Deleted", body = ApiResponse),
        (status = 404, description = "Unknown conversation", body = ApiResponse)
    )
)]
async fn delete_conversation(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse>, ApiError> {
    let deleted = state.db.delete_conversation(&id).map_err(internal)?;
    if !deleted {
        return Err(not_found("Conversation"));
    }
    Ok(Json(ApiResponse {
        success: true,
        message: format!("deleted {id}"),
    }))
}

/// Submit a message and stream the council turn as Server-Sent Events.
///
/// The pipeline run is spawned independently of this response: if the
/// subscriber disconnects, the turn continues in the background and
/// persists its result, so a later fetch observes the final outcome.
#[utoipa::path(
    post,
    path = "/api/v1/conversations/{id}/message",
    tag = "council",
    params(("id" = String, Path, description = "Conversation id")),
    request_body = SendMessageRequest,
    responses(
        (status = 200, description = "SSE stream of turn events"),
        (status = 404, description = "Unknown conversation", body = ApiResponse),
        (status = 409, description = "A turn is already in flight", body = ApiResponse)
    )
)]
async fn send_message(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(req): Json<SendMessageRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    if state
        .db
        .get_conversation(&id)
        .map_err(internal)?
        .is_none()
    {
        return Err(not_found("Conversation"));
    }

    let guard = state.turns.begin(&id).map_err(|e| match e {
        TurnError::TurnInFlight(_) => (
            StatusCode::CONFLICT,
            Json(ApiResponse {
                success: false,
                message: e.to_string(),
            }),
        ),
        other => internal(anyhow::anyhow!(other)),
    })?;

    let (event_tx, event_rx) = mpsc::channel(64);
    let runner = TurnRunner::new(
        state.config.clone(),
        Arc::clone(&state.gateway),
        Arc::clone(&state.db),
    )
    .with_event_channel(event_tx);

    let content = req.content;
    tokio::spawn(async move {
        // Guard held for the whole turn; dropped when the run settles.
        let _guard = guard;
        if let Err(e) = runner.run_turn(&id, &content).await {
            tracing::warn!(error = %e, "council turn failed");
        }
    });

    let stream = ReceiverStream::new(event_rx).map(|event| {
        let json = serde_json::to_string(&event).unwrap_or_default();
        Ok::<_, Infallible>(Event::default().data(json))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

// === Server Entry ===

#[derive(Parser)]
#[command(name = "quorum", about = "LLM council deliberation server")]
struct Args {
    #[command(subcommand)]
    command: Option<CliCommand>,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Start the HTTP server
    Serve {
        #[arg(long, default_value_t = 8001)]
        port: u16,
    },
}

async fn run_server(port: u16) -> anyhow::Result<()> {
    let config = CouncilConfig::from_env();
    tracing::info!(council = ?config.council, "council configured");

    let db_path = std::env::var("QUORUM_DB").unwrap_or_else(|_| ".quorum/quorum.db".to_string());
    let db = Arc::new(QuorumDb::open_at(&db_path)?);

    let gateway: Arc<dyn ChatProvider> =
        Arc::new(OpenRouterGateway::from_env(config.timeout()).map_err(anyhow::Error::new)?);

    let state: SharedState = Arc::new(AppState {
        db,
        gateway,
        config,
        turns: TurnRegistry::new(),
    });

    let conversation_routes = Router::new()
        .route("/", get(list_conversations).post(create_conversation))
        .route("/:id", get(get_conversation).delete(delete_conversation))
        .route("/:id/message", post(send_message));

    let app = Router::new()
        .route("/health", get(health))
        .nest("/api/v1/conversations", conversation_routes)
        .route("/api/v1/openapi.json", get(serve_openapi))
        .with_state(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    println!("🏛️ Quorum Server running at http://{addr}");
    println!("   Conversations: /api/v1/conversations");
    println!("   Turn stream:   /api/v1/conversations/:id/message (SSE)");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let port = match args.command {
        Some(CliCommand::Serve { port }) => port,
        None => 8001,
    };

    run_server(port).await
}
