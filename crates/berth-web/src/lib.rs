//! Berth Web API Server
//!
//! REST endpoints over the engine: instances, tiers, backups and addon modules.

use axum::{
    body::Body,
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post, put},
    Router,
};
use berth_core::{AppVersion, BackupFrequency, Error, Instance, InstanceState, ResourceLimits};
use berth_engine::{BackupConfigUpdate, CreateInstance, Engine};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::io::ReaderStream;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

const MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;

/// API response wrapper
#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(message: impl Into<String>) -> ApiResponse<()> {
        ApiResponse {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Engine error rendered as an `ApiResponse` with a matching status
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

pub fn status_for(error: &Error) -> StatusCode {
    match error {
        Error::Validation(_) => StatusCode::BAD_REQUEST,
        e if e.is_not_found() => StatusCode::NOT_FOUND,
        Error::Deployment(_) | Error::Integration(_) => StatusCode::BAD_GATEWAY,
        Error::NoPortAvailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            warn!("Request failed: {}", self.0);
        }
        (status, Json(ApiResponse::<()>::err(self.0.to_string()))).into_response()
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    engine: Arc<Engine>,
}

impl AppState {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }
}

/// Instance as exposed over the API, without credentials
#[derive(Debug, Serialize)]
pub struct InstanceView {
    pub id: i64,
    pub name: String,
    pub version: AppVersion,
    pub state: InstanceState,
    pub http_port: Option<u16>,
    pub longpolling_port: Option<u16>,
    pub mapped_domain: Option<String>,
    pub instance_path: PathBuf,
    pub tier_id: Option<i64>,
    pub resources: ResourceLimits,
    pub need_custom_addons: bool,
    pub repository_url: Option<String>,
    pub last_error: Option<String>,
}

impl From<Instance> for InstanceView {
    fn from(instance: Instance) -> Self {
        Self {
            id: instance.id,
            name: instance.name,
            version: instance.version,
            state: instance.state,
            http_port: instance.http_port,
            longpolling_port: instance.longpolling_port,
            mapped_domain: instance.mapped_domain,
            instance_path: instance.instance_path,
            tier_id: instance.tier_id,
            resources: instance.resources,
            need_custom_addons: instance.need_custom_addons,
            repository_url: instance.repository_url,
            last_error: instance.last_error,
        }
    }
}

/// Create request body
#[derive(Deserialize)]
pub struct CreateRequest {
    pub name: String,
    pub version: Option<String>,
    pub tier: Option<String>,
    pub map_domain: Option<bool>,
    pub need_custom_addons: Option<bool>,
}

#[derive(Deserialize)]
pub struct TierRequest {
    pub code: String,
}

/// Backup configuration changes; absent fields are left as they are
#[derive(Deserialize)]
pub struct BackupConfigUpdateRequest {
    pub active: Option<bool>,
    pub frequency: Option<String>,
    pub days_to_keep: Option<i64>,
}

#[derive(Deserialize)]
pub struct ModuleQuery {
    pub path: PathBuf,
    pub instance: Option<String>,
}

#[derive(Deserialize)]
pub struct DeleteModuleRequest {
    pub path: PathBuf,
    pub name: String,
    pub instance: Option<String>,
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    create_router_with_cors(state, None)
}

/// Create the API router with custom CORS origin
pub fn create_router_with_cors(state: AppState, cors_origin: Option<String>) -> Router {
    let origin = cors_origin
        .and_then(|origin| origin.parse::<HeaderValue>().ok())
        .unwrap_or_else(|| HeaderValue::from_static("http://localhost:3000"));
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers(tower_http::cors::Any);

    Router::new()
        .route("/api/health", get(health_check))
        // Instances
        .route("/api/instances", get(list_instances).post(create_instance))
        .route("/api/instances/:name", get(get_instance).delete(delete_instance))
        .route("/api/instances/:name/start", post(start_instance))
        .route("/api/instances/:name/stop", post(stop_instance))
        .route("/api/instances/:name/restart", post(restart_instance))
        .route("/api/instances/:name/resources", put(update_resources))
        .route("/api/instances/:name/manifest", get(get_manifest))
        .route("/api/instances/:name/tier", post(assign_tier))
        .route("/api/instances/:name/backups", get(list_backups).post(run_backup_now))
        // Tiers
        .route("/api/tiers", get(list_tiers))
        .route("/api/tiers/:code/propagate", post(propagate_tier))
        // Backups
        .route("/api/backups/tick", post(backup_tick))
        .route("/api/backups/:id", delete(delete_backup))
        .route("/api/backups/:id/download", get(download_backup))
        .route(
            "/api/backup-configs/:id",
            put(update_backup_config).delete(delete_backup_config),
        )
        .route("/api/backup-configs/:id/run", post(run_backup_config))
        // Addon modules
        .route("/api/modules", get(list_modules))
        .route("/api/modules/upload", post(upload_module))
        .route("/api/modules/delete", post(delete_module))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

/// Start the web server
pub async fn start_server(bind_addr: &str, engine: Arc<Engine>) -> std::io::Result<()> {
    let app = create_router(AppState::new(engine));

    info!("Starting Berth API on {}", bind_addr);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// === API Handlers ===

async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION")
    })))
}

async fn list_instances(State(state): State<AppState>) -> ApiResult<Vec<InstanceView>> {
    let instances = state.engine.lifecycle().list().await?;
    Ok(Json(ApiResponse::ok(
        instances.into_iter().map(InstanceView::from).collect(),
    )))
}

async fn create_instance(
    State(state): State<AppState>,
    Json(req): Json<CreateRequest>,
) -> ApiResult<InstanceView> {
    let version = match req.version.as_deref() {
        Some(v) => v.parse()?,
        None => AppVersion::default(),
    };
    let mut request = CreateInstance::new(req.name, version);
    request.tier = req.tier;
    request.map_domain = req.map_domain.unwrap_or(true);
    request.need_custom_addons = req.need_custom_addons.unwrap_or(false);

    let instance = state.engine.lifecycle().create(request).await?;
    Ok(Json(ApiResponse::ok(instance.into())))
}

async fn get_instance(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<InstanceView> {
    let instance = state.engine.lifecycle().find(&name).await?;
    Ok(Json(ApiResponse::ok(instance.into())))
}

async fn delete_instance(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<serde_json::Value> {
    let instance = state.engine.lifecycle().find(&name).await?;
    state.engine.lifecycle().delete(instance.id).await?;
    Ok(Json(ApiResponse::ok(serde_json::json!({ "deleted": name }))))
}

async fn start_instance(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<InstanceView> {
    let lifecycle = state.engine.lifecycle();
    let instance = lifecycle.find(&name).await?;
    Ok(Json(ApiResponse::ok(lifecycle.start(instance.id).await?.into())))
}

async fn stop_instance(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<InstanceView> {
    let lifecycle = state.engine.lifecycle();
    let instance = lifecycle.find(&name).await?;
    Ok(Json(ApiResponse::ok(lifecycle.stop(instance.id).await?.into())))
}

async fn restart_instance(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<InstanceView> {
    let lifecycle = state.engine.lifecycle();
    let instance = lifecycle.find(&name).await?;
    Ok(Json(ApiResponse::ok(lifecycle.restart(instance.id).await?.into())))
}

async fn update_resources(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(resources): Json<ResourceLimits>,
) -> ApiResult<InstanceView> {
    let lifecycle = state.engine.lifecycle();
    let instance = lifecycle.find(&name).await?;
    let updated = lifecycle.update_resources(instance.id, resources).await?;
    Ok(Json(ApiResponse::ok(updated.into())))
}

async fn get_manifest(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<serde_json::Value> {
    let lifecycle = state.engine.lifecycle();
    let instance = lifecycle.find(&name).await?;
    let manifest = lifecycle.manifest(instance.id).await?;
    Ok(Json(ApiResponse::ok(serde_json::json!({
        "compose": manifest.compose,
        "runtime_config": manifest.runtime_config,
    }))))
}

async fn assign_tier(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<TierRequest>,
) -> ApiResult<InstanceView> {
    let instance = state.engine.assign_tier(&name, &req.code).await?;
    Ok(Json(ApiResponse::ok(instance.into())))
}

async fn list_backups(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Vec<berth_core::Backup>> {
    Ok(Json(ApiResponse::ok(state.engine.backups(&name).await?)))
}

async fn run_backup_now(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<berth_core::Backup> {
    Ok(Json(ApiResponse::ok(state.engine.run_backup_now(&name).await?)))
}

async fn list_tiers(State(state): State<AppState>) -> ApiResult<Vec<berth_core::ResourceTier>> {
    Ok(Json(ApiResponse::ok(state.engine.tiers().list().await?)))
}

async fn propagate_tier(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> ApiResult<serde_json::Value> {
    let updated = state.engine.propagate_tier(&code).await?;
    Ok(Json(ApiResponse::ok(serde_json::json!({ "updated": updated }))))
}

async fn backup_tick(State(state): State<AppState>) -> ApiResult<berth_engine::TickReport> {
    Ok(Json(ApiResponse::ok(state.engine.tick().await?)))
}

async fn run_backup_config(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<berth_core::Backup> {
    Ok(Json(ApiResponse::ok(state.engine.run_backup_config(id).await?)))
}

async fn update_backup_config(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<BackupConfigUpdateRequest>,
) -> ApiResult<berth_core::BackupConfig> {
    let update = BackupConfigUpdate {
        active: req.active,
        frequency: req.frequency.as_deref().map(str::parse::<BackupFrequency>).transpose()?,
        days_to_keep: req.days_to_keep,
    };
    Ok(Json(ApiResponse::ok(state.engine.update_backup_config(id, update).await?)))
}

async fn delete_backup_config(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<serde_json::Value> {
    state.engine.delete_backup_config(id).await?;
    Ok(Json(ApiResponse::ok(serde_json::json!({ "deleted": id }))))
}

async fn delete_backup(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<serde_json::Value> {
    state.engine.delete_backup(id).await?;
    Ok(Json(ApiResponse::ok(serde_json::json!({ "deleted": id }))))
}

async fn download_backup(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    let (backup, path) = state.engine.backup_artifact(id).await?;
    let file = tokio::fs::File::open(&path).await.map_err(Error::from)?;

    let disposition = format!("attachment; filename=\"{}\"", backup.name.replace('"', ""));
    Ok((
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Body::from_stream(ReaderStream::new(file)),
    )
        .into_response())
}

async fn list_modules(
    State(state): State<AppState>,
    Query(query): Query<ModuleQuery>,
) -> ApiResult<Vec<String>> {
    Ok(Json(ApiResponse::ok(state.engine.list_modules(&query.path).await?)))
}

async fn upload_module(
    State(state): State<AppState>,
    Query(query): Query<ModuleQuery>,
    mut multipart: Multipart,
) -> ApiResult<Vec<String>> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::validation(format!("Invalid multipart body: {}", e)))?
    {
        if !matches!(field.name(), Some("file") | Some("filepond")) {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| Error::validation(format!("Failed to read upload: {}", e)))?;
        upload = Some((filename, data.to_vec()));
        break;
    }

    let (filename, data) =
        upload.ok_or_else(|| Error::validation("No file provided in field 'file' or 'filepond'"))?;
    let extracted = state
        .engine
        .upload_module(&query.path, &filename, data, query.instance.as_deref())
        .await?;
    Ok(Json(ApiResponse::ok(extracted)))
}

async fn delete_module(
    State(state): State<AppState>,
    Json(req): Json<DeleteModuleRequest>,
) -> ApiResult<serde_json::Value> {
    state
        .engine
        .delete_module(&req.path, &req.name, req.instance.as_deref())
        .await?;
    Ok(Json(ApiResponse::ok(serde_json::json!({ "deleted": req.name }))))
}
