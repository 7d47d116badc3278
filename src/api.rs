// ABOUTME: axum routes and handlers exposing the dossier core over HTTP/JSON
// ABOUTME: Multipart uploads stream straight into the blob store before the ledger commit

use axum::{
    extract::{multipart::Field, DefaultBodyLimit, Multipart, Path, Query, State},
    http::{HeaderValue, StatusCode},
    middleware as axum_middleware,
    response::Json,
    routing::{delete, get, patch, post},
    Router,
};
use serde_json::{json, Value};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use uuid::Uuid;

use crate::archive::ArchiveTarget;
use crate::config::Config;
use crate::dossier::{DossierSnapshot, ProgressReport};
use crate::entities::{categorized_file, delete_request, deliverable_file, registration_request, user};
use crate::error::{AppError, Result};
use crate::identity::Caller;
use crate::ledger::IncomingFile;
use crate::middleware::security_headers;
use crate::schema::CategorySchema;
use crate::tree::ArchiveTree;
use crate::types::*;
use crate::AppState;

// Room for multipart framing and text fields around the file itself.
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

pub fn router(state: AppState) -> Router {
    let body_limit = state.config.max_file_bytes() as usize + MULTIPART_OVERHEAD;
    let cors = cors_layer(&state.config);

    Router::new()
        .route("/health", get(health))
        .route("/projects", get(list_projects).post(create_project))
        .route("/projects/:id/categories", get(category_tree))
        .route("/projects/:id/archive/tree", get(archive_tree))
        .route("/projects/:id/archive", post(upload_to_archive))
        .route("/projects/:id/dossier", get(dossier_snapshot))
        .route("/projects/:id/progress", get(progress))
        .route("/projects/:id/stages", get(list_stages).post(add_stage))
        .route(
            "/projects/:id/stages/:stage_id/slots/:key",
            get(list_slot).post(upload_to_slot),
        )
        .route("/projects/:id/files", get(list_files))
        .route("/projects/:id/files/delete-requests", post(bulk_delete_request))
        .route("/projects/:id/delete-request", post(project_delete_request))
        .route("/projects/:id/members", get(list_members).post(upsert_member))
        .route("/projects/:id/members/:user_id", delete(remove_member))
        .route("/files/:id/delete-request", post(file_delete_request))
        .route("/delete-requests", get(list_delete_requests))
        .route("/delete-requests/:id/approve", post(approve_delete_request))
        .route("/delete-requests/:id/reject", post(reject_delete_request))
        .route("/registrations", post(request_registration))
        .route("/admin/registrations", get(list_registrations))
        .route("/admin/registrations/:id/approve", post(approve_registration))
        .route("/admin/registrations/:id/reject", post(reject_registration))
        .route("/users", get(list_users).post(create_user))
        .route("/users/:id", patch(update_user))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(axum_middleware::from_fn(security_headers))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(config: &Config) -> CorsLayer {
    if config.allowed_origins.is_empty() {
        return CorsLayer::permissive();
    }
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

// Projects

async fn list_projects(State(state): State<AppState>, Caller(caller): Caller) -> Result<Json<Vec<ProjectSummary>>> {
    let projects = state.storage.list_projects(&caller).await?;
    Ok(Json(projects.into_iter().map(ProjectSummary::from).collect()))
}

async fn create_project(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Json(req): Json<CreateProjectRequest>,
) -> Result<(StatusCode, Json<ProjectSummary>)> {
    let created = state.storage.create_project(&caller, &state.schema, req).await?;
    Ok((StatusCode::CREATED, Json(created.into())))
}

async fn category_tree(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(project_id): Path<Uuid>,
) -> Result<Json<CategorySchema>> {
    Ok(Json(state.storage.category_tree(&caller, &state.schema, project_id).await?))
}

async fn archive_tree(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(project_id): Path<Uuid>,
) -> Result<Json<ArchiveTree>> {
    Ok(Json(state.storage.archive_tree(&caller, &state.schema, project_id).await?))
}

async fn dossier_snapshot(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(project_id): Path<Uuid>,
) -> Result<Json<DossierSnapshot>> {
    Ok(Json(state.storage.dossier_snapshot(&caller, project_id).await?))
}

async fn list_stages(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(project_id): Path<Uuid>,
) -> Result<Json<Vec<StageRef>>> {
    Ok(Json(state.storage.list_stages(&caller, project_id).await?))
}

async fn add_stage(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(project_id): Path<Uuid>,
    Json(req): Json<CreateStageRequest>,
) -> Result<(StatusCode, Json<StageRef>)> {
    let created = state.storage.add_stage(&caller, project_id, req).await?;
    Ok((
        StatusCode::CREATED,
        Json(StageRef {
            id: created.id,
            code: created.code,
            name: created.name,
        }),
    ))
}

async fn progress(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(project_id): Path<Uuid>,
) -> Result<Json<ProgressReport>> {
    Ok(Json(state.storage.progress_report(&caller, project_id).await?))
}

// Uploads

fn multipart_error(err: axum::extract::multipart::MultipartError) -> AppError {
    AppError::Validation(format!("malformed multipart body: {}", err.body_text()))
}

/// Streams one multipart file field into a staged blob.
async fn receive(state: &AppState, mut field: Field<'_>, filename: String) -> Result<IncomingFile> {
    let content_type = field.content_type().map(str::to_string);
    let mut writer = state.storage.blobs.begin().await?;
    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
        writer.write_chunk(&chunk).await?;
    }
    tracing::debug!(%filename, bytes = writer.bytes_written(), "upload received");
    Ok(IncomingFile {
        filename,
        content_type,
        blob: writer.finish().await?,
    })
}

fn file_name_of(field: &Field<'_>) -> Result<String> {
    field
        .file_name()
        .map(str::to_string)
        .ok_or_else(|| AppError::Validation("file field has no filename".to_string()))
}

async fn upload_to_slot(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path((project_id, stage_id, key)): Path<(Uuid, Uuid, String)>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<deliverable_file::Model>)> {
    let mut reason = None;
    let mut incoming = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("reason") => reason = Some(field.text().await.map_err(multipart_error)?),
            Some("file") if incoming.is_none() => {
                let filename = file_name_of(&field)?;
                state
                    .storage
                    .check_slot_upload(&caller, project_id, stage_id, &key, &filename)
                    .await?;
                incoming = Some(receive(&state, field, filename).await?);
            }
            _ => {}
        }
    }

    let file = incoming.ok_or_else(|| AppError::Validation("missing 'file' field".to_string()))?;
    let created = state
        .storage
        .upload_version(&caller, project_id, stage_id, &key, file, reason)
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn upload_to_archive(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(project_id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<categorized_file::Model>)> {
    let mut target = ArchiveTarget::default();
    let mut incoming = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("section") => target.section = field.text().await.map_err(multipart_error)?,
            Some("category") => target.category = field.text().await.map_err(multipart_error)?,
            Some("subcategory") => target.subcategory = Some(field.text().await.map_err(multipart_error)?),
            Some("subpath") => target.subpath = Some(field.text().await.map_err(multipart_error)?),
            Some("file") if incoming.is_none() => {
                if target.section.trim().is_empty() || target.category.trim().is_empty() {
                    return Err(AppError::Validation(
                        "section and category fields must precede the file".to_string(),
                    ));
                }
                let filename = file_name_of(&field)?;
                state
                    .storage
                    .check_archive_upload(&caller, &state.schema, project_id, &target)
                    .await?;
                incoming = Some(receive(&state, field, filename).await?);
            }
            _ => {}
        }
    }

    let file = incoming.ok_or_else(|| AppError::Validation("missing 'file' field".to_string()))?;
    let created = state
        .storage
        .upload_to_archive(&caller, &state.schema, project_id, &target, file)
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn list_slot(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path((project_id, stage_id, key)): Path<(Uuid, Uuid, String)>,
) -> Result<Json<Vec<deliverable_file::Model>>> {
    Ok(Json(state.storage.list_slot(&caller, project_id, stage_id, &key).await?))
}

async fn list_files(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(project_id): Path<Uuid>,
    Query(query): Query<ListFilesQuery>,
) -> Result<Json<ListFilesResponse>> {
    Ok(Json(state.storage.list_files(&caller, project_id, query).await?))
}

// Delete requests

async fn file_delete_request(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(file_id): Path<Uuid>,
    Json(req): Json<DeleteReasonRequest>,
) -> Result<(StatusCode, Json<delete_request::Model>)> {
    let created = state.storage.request_file_deletion(&caller, file_id, &req.reason).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn bulk_delete_request(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(project_id): Path<Uuid>,
    Json(req): Json<BulkDeleteRequest>,
) -> Result<Json<Vec<ItemResult<delete_request::Model>>>> {
    Ok(Json(
        state
            .storage
            .request_bulk_file_deletion(&caller, project_id, &req.ids, &req.reason)
            .await?,
    ))
}

async fn project_delete_request(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(project_id): Path<Uuid>,
    Json(req): Json<DeleteReasonRequest>,
) -> Result<(StatusCode, Json<delete_request::Model>)> {
    let created = state
        .storage
        .request_project_deletion(&caller, project_id, &req.reason)
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn list_delete_requests(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Query(filter): Query<StatusFilter>,
) -> Result<Json<Vec<delete_request::Model>>> {
    Ok(Json(state.storage.list_delete_requests(&caller, filter.status).await?))
}

async fn approve_delete_request(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(request_id): Path<Uuid>,
    body: Option<Json<DecisionNote>>,
) -> Result<Json<delete_request::Model>> {
    let note = body.and_then(|Json(b)| b.note);
    Ok(Json(state.storage.approve_delete_request(&caller, request_id, note).await?))
}

async fn reject_delete_request(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(request_id): Path<Uuid>,
    body: Option<Json<DecisionNote>>,
) -> Result<Json<delete_request::Model>> {
    let note = body.and_then(|Json(b)| b.note);
    Ok(Json(state.storage.reject_delete_request(&caller, request_id, note).await?))
}

// Membership

async fn list_members(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(project_id): Path<Uuid>,
) -> Result<Json<Vec<MemberInfo>>> {
    Ok(Json(state.storage.list_members(&caller, project_id).await?))
}

async fn upsert_member(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(project_id): Path<Uuid>,
    Json(req): Json<UpsertMemberRequest>,
) -> Result<Json<Vec<MemberInfo>>> {
    Ok(Json(state.storage.upsert_member(&caller, project_id, req).await?))
}

async fn remove_member(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path((project_id, user_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode> {
    state.storage.remove_member(&caller, project_id, user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// Registration and users

async fn request_registration(
    State(state): State<AppState>,
    Json(form): Json<RegistrationForm>,
) -> Result<(StatusCode, Json<registration_request::Model>)> {
    let created = state.storage.request_registration(form).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn list_registrations(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Query(filter): Query<StatusFilter>,
) -> Result<Json<Vec<registration_request::Model>>> {
    Ok(Json(state.storage.list_registrations(&caller, filter.status).await?))
}

async fn approve_registration(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(request_id): Path<Uuid>,
    body: Option<Json<ApproveRegistrationForm>>,
) -> Result<Json<user::Model>> {
    let role = body.and_then(|Json(b)| b.role);
    Ok(Json(state.storage.approve_registration(&caller, request_id, role).await?))
}

async fn reject_registration(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(request_id): Path<Uuid>,
    body: Option<Json<DecisionNote>>,
) -> Result<Json<registration_request::Model>> {
    let note = body.and_then(|Json(b)| b.note);
    Ok(Json(state.storage.reject_registration(&caller, request_id, note).await?))
}

async fn list_users(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Query(query): Query<UserQuery>,
) -> Result<Json<Vec<user::Model>>> {
    Ok(Json(state.storage.list_users(&caller, query.q.as_deref()).await?))
}

async fn create_user(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Json(req): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<user::Model>)> {
    let created = state.storage.create_user(&caller, req).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_user(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(user_id): Path<Uuid>,
    Json(req): Json<UpdateUserRequest>,
) -> Result<Json<user::Model>> {
    Ok(Json(state.storage.update_user(&caller, user_id, req).await?))
}
