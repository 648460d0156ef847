use crate::config::Config;
use crate::model::BoardError;
use crate::storage::DataDir;
use crate::view;
use anyhow::{Context, Result};
use axum::{
    extract::{rejection::FormRejection, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
    Form, Json, Router,
};
use chrono::{Datelike, Local};
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct AppState {
    pub data: DataDir,
    pub title: String,
}

#[derive(Debug, Deserialize)]
pub struct BoardQuery {
    #[serde(default, deserialize_with = "empty_as_none")]
    pub year: Option<i32>,
}

/// `?year=` with no value means the current year, not a bad request.
fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<i32>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

/// Fields of either mutation; which ones are required depends on `action`.
#[derive(Debug, Default, Deserialize)]
pub struct ActionForm {
    pub action: Option<String>,
    pub file: Option<String>,
    pub deadline: Option<String>,
    pub program: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActionReply {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub enum ApiError {
    Board(BoardError),
    Rejected(StatusCode, String),
}

impl From<BoardError> for ApiError {
    fn from(err: BoardError) -> Self {
        ApiError::Board(err)
    }
}

impl From<FormRejection> for ApiError {
    fn from(rejection: FormRejection) -> Self {
        ApiError::Rejected(rejection.status(), rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Board(err) if err.is_client_error() => {
                (StatusCode::BAD_REQUEST, err.to_string())
            }
            ApiError::Board(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
            ApiError::Rejected(status, message) => (status, message),
        };
        warn!(error = %message, %status, "action failed");
        let body = Json(ActionReply {
            success: false,
            error: Some(message),
        });
        (status, body).into_response()
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(show_board).post(run_action))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(config: Config) -> Result<()> {
    let state = Arc::new(AppState {
        data: DataDir::new(config.data_dir.clone()),
        title: config.title.clone(),
    });
    let addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(
        addr = %addr,
        data_dir = %config.data_dir.display(),
        "serving deadline board on http://{addr}"
    );
    axum::serve(listener, router(state))
        .await
        .context("server error")?;
    Ok(())
}

async fn show_board(
    State(state): State<Arc<AppState>>,
    Query(query): Query<BoardQuery>,
) -> Html<String> {
    let today = Local::now().date_naive();
    let year = query.year.unwrap_or_else(|| today.year());
    let board = state.data.scan(year);
    Html(view::render_board(&board, &state.title, today).into_string())
}

async fn run_action(
    State(state): State<Arc<AppState>>,
    form: Result<Form<ActionForm>, FormRejection>,
) -> Result<Json<ActionReply>, ApiError> {
    let Form(form) = form?;
    let field = |value: &Option<String>| value.clone().unwrap_or_default();
    match form.action.as_deref().map(str::trim) {
        Some("reschedule") => {
            state
                .data
                .reschedule(&field(&form.file), &field(&form.deadline))?;
        }
        Some("additem") => {
            state.data.add_item(
                &field(&form.program),
                &field(&form.deadline),
                &field(&form.name),
            )?;
        }
        Some(other) => return Err(BoardError::UnknownAction(other.to_string()).into()),
        None => return Err(BoardError::MissingField("action").into()),
    }
    Ok(Json(ActionReply {
        success: true,
        error: None,
    }))
}
