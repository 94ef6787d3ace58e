//! The HTTP server for the Cadence rehearsal scheduler.

use std::sync::Arc;

use anyhow::Context;
use async_graphql::http::{playground_source, GraphQLPlaygroundConfig};
use async_graphql::{Request, Response};
use axum::extract::Extension;
use axum::http::HeaderMap;
use axum::response::Html;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cadence::config::Config;
use cadence::db::memory::MemoryStore;
use cadence::db::postgres::PgStore;
use cadence::db::DynStore;
use cadence::email::reminder::send_rehearsal_reminders;
use cadence::email::Mailer;
use cadence::error::{CadenceError, CadenceResult};
use cadence::graphql::{build_schema, CadenceSchema};
use cadence::models::user::session::TokenKeys;
use cadence::models::user::User;
use cadence::util::current_time;

const CRON_TOKEN_HEADER: &str = "x-cron-token";

#[derive(Clone)]
struct AppState {
    schema: CadenceSchema,
    store: DynStore,
    keys: TokenKeys,
    mailer: Mailer,
    cron_token: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("cadence=info,tower_http=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let store: DynStore = match &config.database_url {
        Some(url) => {
            info!("connecting to the database");
            let store = PgStore::connect(url)
                .await
                .context("Failed to connect to the database")?;
            store
                .run_migrations()
                .await
                .context("Failed to run migrations")?;
            Arc::new(store) as DynStore
        }
        None => {
            warn!("DATABASE_URL is not set, keeping all data in memory");
            Arc::new(MemoryStore::new()) as DynStore
        }
    };

    let mailer = Mailer::new(config.mailgun_token.clone());
    let state = AppState {
        schema: build_schema(store.clone(), config.tokens.clone(), mailer.clone()),
        store,
        keys: config.tokens.clone(),
        mailer,
        cron_token: config.cron_token.clone(),
    };

    let app = Router::new()
        .route("/graphql", get(playground).post(query))
        .route("/health", get(health))
        .route("/send-reminders", post(send_reminders))
        .layer(Extension(state))
        .layer(CorsLayer::permissive());

    info!(address = %config.bind_address, "listening");
    axum::Server::bind(&config.bind_address)
        .serve(app.into_make_service())
        .await
        .context("Server failed")
}

async fn query(
    Extension(state): Extension<AppState>,
    headers: HeaderMap,
    Json(mut request): Json<Request>,
) -> CadenceResult<Json<Response>> {
    if let Some(token) = bearer_token(&headers)? {
        let user = User::with_token(token, &state.keys, &*state.store).await?;
        request = request.data(user);
    }

    Ok(Json(state.schema.execute(request).await))
}

async fn playground() -> Html<String> {
    Html(playground_source(GraphQLPlaygroundConfig::new("/graphql")))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Called by an external scheduler to email reminders about upcoming rehearsals.
async fn send_reminders(
    Extension(state): Extension<AppState>,
    headers: HeaderMap,
) -> CadenceResult<Json<Value>> {
    let expected = state
        .cron_token
        .as_deref()
        .ok_or_else(|| CadenceError::Forbidden("Reminders are disabled".to_owned()))?;
    let given = headers
        .get(CRON_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok());
    if given != Some(expected) {
        warn!("rejected reminder trigger without a valid cron token");
        return Err(CadenceError::Forbidden("Invalid cron token".to_owned()));
    }

    let report = send_rehearsal_reminders(&*state.store, &state.mailer, current_time()).await?;

    Ok(Json(json!({
        "rehearsals": report.rehearsals,
        "emailsSent": report.emails_sent,
    })))
}

fn bearer_token(headers: &HeaderMap) -> CadenceResult<Option<&str>> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .map(|value| {
            value
                .to_str()
                .ok()
                .and_then(|value| value.strip_prefix("Bearer "))
                .map(str::trim)
                .ok_or(CadenceError::InvalidToken("expected a Bearer token"))
        })
        .transpose()
}
