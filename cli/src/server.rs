use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use axum::{
    Extension, Json, Router,
    extract::{Path, Request, State, rejection::JsonRejection},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{Instrument, error, info, info_span, warn};

use crate::sessions::SessionStore;
use mealplan_core::PlanError;
use mealplan_core::Planner;
use mealplan_core::models::{
    DetailedPlan, ExportData, ImportSummary, Recipe, RecipeInput, ShoppingList,
};

const BODY_LIMIT: usize = 1024 * 1024; // 1 MiB
const SESSION_COOKIE: &str = "sid";

#[derive(Clone)]
struct AppState {
    planner: Arc<Planner>,
    sessions: Arc<SessionStore>,
}

/// Username attached to a request by [`require_session`].
#[derive(Clone)]
struct CurrentUser(String);

// --- Request / Response types ---

#[derive(Deserialize)]
struct LoginRequest {
    username: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DayAssignment {
    day: Option<String>,
    recipe_id: Option<String>,
}

impl DayAssignment {
    fn require(self) -> Result<(String, String), ApiError> {
        match (self.day, self.recipe_id) {
            (Some(day), Some(recipe_id)) if !day.is_empty() && !recipe_id.is_empty() => {
                Ok((day, recipe_id))
            }
            _ => Err(ApiError::BadRequest(
                "Both day and recipeId are required".to_string(),
            )),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionResponse {
    message: &'static str,
    session_id: String,
}

#[derive(Serialize)]
struct MessageResponse {
    message: &'static str,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// --- Error handling ---

enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    NotFound(String),
    Rejected(JsonRejection),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::Rejected(rejection) => {
                let status = if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
                    StatusCode::PAYLOAD_TOO_LARGE
                } else {
                    StatusCode::BAD_REQUEST
                };
                (status, rejection.body_text())
            }
            Self::Internal(err) => {
                error!("internal server error: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<PlanError> for ApiError {
    fn from(err: PlanError) -> Self {
        match err {
            PlanError::Storage(inner) => Self::Internal(inner),
            PlanError::Validation(_) | PlanError::InvalidDay(_) => Self::BadRequest(err.to_string()),
            PlanError::NotFound(_) | PlanError::RecipeNotFound(_) | PlanError::NotAssigned { .. } => {
                Self::NotFound(err.to_string())
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Rejected(rejection)
    }
}

// --- Middleware ---

/// Session token from `Authorization: Bearer` or the `sid` cookie.
fn session_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    if let Some(token) = bearer {
        return Some(token.trim().to_string());
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string())
}

async fn require_session(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let user = session_token(request.headers()).and_then(|token| state.sessions.lookup(&token));
    let Some(user) = user else {
        return ApiError::Unauthorized("Unauthorized".to_string()).into_response();
    };
    request.extensions_mut().insert(CurrentUser(user));
    next.run(request).await
}

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("default-src 'none'"),
    );
    response
}

async fn trace_requests(request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    let route = request.uri().path().to_string();
    let span = info_span!("http.request", method = %method, route = %route);

    let started = Instant::now();
    let response = next.run(request).instrument(span.clone()).await;
    span.in_scope(|| {
        info!(
            status = response.status().as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "request finished"
        );
    });
    response
}

// --- Session handlers ---

async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(req) = payload?;
    let username = req.username.unwrap_or_default();
    let token = state
        .sessions
        .login(&username)
        .ok_or_else(|| ApiError::Unauthorized("Username does not meet criteria".to_string()))?;
    info!(%username, "session started");

    let cookie = format!("{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Strict");
    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(SessionResponse {
            message: "Login successful",
            session_id: token,
        }),
    )
        .into_response())
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Result<Response, ApiError> {
    let ended = session_token(&headers).is_some_and(|token| state.sessions.logout(&token));
    if !ended {
        return Err(ApiError::Unauthorized("Session not found".to_string()));
    }
    let cookie = format!("{SESSION_COOKIE}=; Path=/; Max-Age=0; HttpOnly; SameSite=Strict");
    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(MessageResponse {
            message: "Logout successful",
        }),
    )
        .into_response())
}

async fn check_session(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<SessionResponse>, ApiError> {
    let token = session_token(&headers)
        .filter(|token| state.sessions.lookup(token).is_some())
        .ok_or_else(|| ApiError::Unauthorized("Session is expired or invalid".to_string()))?;
    Ok(Json(SessionResponse {
        message: "Session is active",
        session_id: token,
    }))
}

// --- Recipe handlers ---

async fn list_recipes(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<Json<Vec<Recipe>>, ApiError> {
    Ok(Json(state.planner.list_recipes(&user)?))
}

async fn create_recipe(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    payload: Result<Json<RecipeInput>, JsonRejection>,
) -> Result<(StatusCode, Json<Recipe>), ApiError> {
    let Json(input) = payload?;
    let recipe = state.planner.create_recipe(&user, input)?;
    Ok((StatusCode::CREATED, Json(recipe)))
}

async fn get_recipe(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> Result<Json<Recipe>, ApiError> {
    Ok(Json(state.planner.get_recipe(&user, &id)?))
}

async fn update_recipe(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<String>,
    payload: Result<Json<RecipeInput>, JsonRejection>,
) -> Result<Json<Recipe>, ApiError> {
    let Json(input) = payload?;
    Ok(Json(state.planner.update_recipe(&user, &id, input)?))
}

async fn delete_recipe(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.planner.delete_recipe(&user, &id)?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Meal plan handlers ---

async fn get_meal_plan(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<Json<DetailedPlan>, ApiError> {
    Ok(Json(state.planner.detailed_plan(&user)?))
}

async fn assign_recipe(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    payload: Result<Json<DayAssignment>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(req) = payload?;
    let (day, recipe_id) = req.require()?;
    state.planner.assign(&user, &day, &recipe_id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn unassign_recipe(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    payload: Result<Json<DayAssignment>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(req) = payload?;
    let (day, recipe_id) = req.require()?;
    state.planner.unassign(&user, &day, &recipe_id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_shopping_list(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<Json<ShoppingList>, ApiError> {
    Ok(Json(state.planner.shopping_list(&user)?))
}

// --- Export / Import handlers ---

async fn export_data(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<Json<ExportData>, ApiError> {
    Ok(Json(state.planner.export(&user)?))
}

async fn import_data(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    payload: Result<Json<ExportData>, JsonRejection>,
) -> Result<Json<ImportSummary>, ApiError> {
    let Json(data) = payload?;
    let summary = state.planner.import(&user, data)?;
    if summary.dangling > 0 {
        warn!(%user, dangling = summary.dangling, "imported plan references unknown recipes");
    }
    Ok(Json(summary))
}

// --- Router builder ---

fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/api/recipes", get(list_recipes).post(create_recipe))
        .route(
            "/api/recipes/{id}",
            get(get_recipe).put(update_recipe).delete(delete_recipe),
        )
        .route("/api/mealplans", get(get_meal_plan))
        .route("/api/mealplans/assign", post(assign_recipe))
        .route("/api/mealplans/unassign", delete(unassign_recipe))
        .route("/api/shopping-list", get(get_shopping_list))
        .route("/api/export", get(export_data))
        .route("/api/import", post(import_data))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_session,
        ));

    Router::new()
        .route("/api/login", post(login))
        .route("/api/logout", post(logout))
        .route("/api/check-session", get(check_session))
        .merge(protected)
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(middleware::from_fn(security_headers))
        .layer(middleware::from_fn(trace_requests))
        .with_state(state)
}

// --- Server startup ---

pub async fn start_server(planner: Planner, port: u16, bind: &str) -> anyhow::Result<()> {
    let state = AppState {
        planner: Arc::new(planner),
        sessions: Arc::new(SessionStore::new()),
    };
    let app = build_router(state);

    if bind != "127.0.0.1" && bind != "localhost" {
        warn!(
            %bind,
            "listening beyond loopback; session tokens travel in plain HTTP"
        );
    }

    let listener = tokio::net::TcpListener::bind(format!("{bind}:{port}"))
        .await
        .with_context(|| format!("Failed to bind {bind}:{port}"))?;
    info!("listening on http://{bind}:{port}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for ctrl-c: {err}");
        std::future::pending::<()>().await;
    }
}
