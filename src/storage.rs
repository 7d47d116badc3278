// ABOUTME: SeaORM storage layer for users, projects, memberships and the combined file listing
// ABOUTME: Owns the connection, blob store and per-key locks shared by ledger and workflows

use regex_lite::Regex;
use sea_orm::sea_query::{Expr, LikeExpr};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, Database, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use sea_orm_migration::MigratorTrait;
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;
use uuid::Uuid;

use crate::access::{self, Action, ProjectContext};
use crate::blob::BlobStore;
use crate::config::Config;
use crate::entities::{
    categorized_file, deliverable_file, deliverable_slot, membership, project, stage, user,
};
use crate::error::{AppError, Result};
use crate::locks::{stages_key, KeyedLocks};
use crate::migration::Migrator;
use crate::schema::{DossierTemplate, SchemaCatalog};
use crate::types::*;

pub const DEFAULT_PAGE: u64 = 50;
pub const MAX_PAGE: u64 = 200;

#[derive(Clone)]
pub struct Storage {
    pub db: DatabaseConnection,
    pub blobs: BlobStore,
    pub locks: KeyedLocks,
}

pub(crate) fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

impl Storage {
    pub async fn connect(config: &Config) -> Result<Self> {
        let db = Database::connect(&config.database_url).await?;
        Migrator::up(&db, None).await?;
        let blobs = BlobStore::open(&config.files_root, config.max_file_bytes()).await?;
        tracing::info!(database = %config.database_url, files_root = %config.files_root.display(), "storage ready");
        Ok(Self::from_parts(db, blobs))
    }

    pub fn from_parts(db: DatabaseConnection, blobs: BlobStore) -> Self {
        Self {
            db,
            blobs,
            locks: KeyedLocks::new(),
        }
    }

    // Users

    pub async fn get_user(&self, user_id: Uuid) -> Result<user::Model> {
        user::Entity::find_by_id(user_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("user {}", user_id)))
    }

    pub async fn find_user_by_username(&self, username: &str) -> Result<Option<user::Model>> {
        Ok(user::Entity::find()
            .filter(user::Column::Username.eq(username))
            .one(&self.db)
            .await?)
    }

    /// Creates an admin account named `username` when no user exists yet.
    pub async fn ensure_bootstrap_admin(&self, username: &str) -> Result<Option<user::Model>> {
        if user::Entity::find().count(&self.db).await? > 0 {
            return Ok(None);
        }
        let admin = insert_user(
            &self.db,
            NewUser {
                username: username.to_string(),
                full_name: None,
                email: None,
                initials: None,
                role: GlobalRole::Admin,
                can_create_projects: true,
                can_access_technical_archive: true,
            },
        )
        .await?;
        tracing::info!(user_id = %admin.id, username = %admin.username, "bootstrap admin created");
        Ok(Some(admin))
    }

    pub async fn create_user(&self, caller: &user::Model, req: CreateUserRequest) -> Result<user::Model> {
        access::authorize(caller, Action::ManageUsers, None)?;
        let username = normalize_username(&req.username)?;
        if self.find_user_by_username(&username).await?.is_some() {
            return Err(AppError::Conflict(format!("username '{}' already exists", username)));
        }
        let created = insert_user(
            &self.db,
            NewUser {
                username,
                full_name: req.full_name,
                email: req.email,
                initials: req.initials,
                role: req.role.unwrap_or(GlobalRole::Colaborador),
                can_create_projects: req.can_create_projects,
                can_access_technical_archive: req.can_access_technical_archive,
            },
        )
        .await?;
        tracing::info!(user_id = %created.id, by = %caller.id, "user created");
        Ok(created)
    }

    pub async fn update_user(
        &self,
        caller: &user::Model,
        user_id: Uuid,
        req: UpdateUserRequest,
    ) -> Result<user::Model> {
        access::authorize(caller, Action::ManageUsers, None)?;
        let existing = self.get_user(user_id).await?;
        let mut active: user::ActiveModel = existing.into();
        if let Some(role) = req.role {
            active.role = Set(role);
        }
        if let Some(initials) = req.initials {
            let initials = initials.trim().to_uppercase();
            active.initials = Set((!initials.is_empty()).then_some(initials));
        }
        if let Some(flag) = req.can_create_projects {
            active.can_create_projects = Set(flag);
        }
        if let Some(flag) = req.can_access_technical_archive {
            active.can_access_technical_archive = Set(flag);
        }
        let updated = active.update(&self.db).await?;
        tracing::info!(user_id = %updated.id, by = %caller.id, "user updated");
        Ok(updated)
    }

    pub async fn list_users(&self, caller: &user::Model, query: Option<&str>) -> Result<Vec<user::Model>> {
        access::authorize(caller, Action::ManageUsers, None)?;
        let needle = query.map(str::trim).filter(|q| !q.is_empty()).map(str::to_lowercase);
        let select = user::Entity::find().order_by_desc(user::Column::CreatedAt);
        let Some(needle) = needle else {
            return Ok(select.limit(DEFAULT_PAGE).all(&self.db).await?);
        };
        Ok(select
            .all(&self.db)
            .await?
            .into_iter()
            .filter(|u| name_matches(&u.username, &needle))
            .take(DEFAULT_PAGE as usize)
            .collect())
    }

    // Projects

    pub async fn create_project(
        &self,
        caller: &user::Model,
        schema: &SchemaCatalog,
        req: CreateProjectRequest,
    ) -> Result<project::Model> {
        access::authorize(caller, Action::CreateProject, None)?;

        let project_type = ProjectType::parse(&req.project_type)?;
        let code = validate_code(project_type, &req.code)?;
        let name = req.name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::Validation("project name must not be empty".to_string()));
        }
        let template = schema.dossier(project_type).ok_or_else(|| {
            AppError::Internal(format!("no dossier taxonomy for {:?}", project_type))
        })?;

        let exists = project::Entity::find()
            .filter(project::Column::Code.eq(code.as_str()))
            .one(&self.db)
            .await?;
        if exists.is_some() {
            return Err(AppError::Conflict(format!("project code '{}' already exists", code)));
        }

        let txn = self.db.begin().await?;
        let created = project::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(code),
            name: Set(name),
            project_type: Set(project_type),
            owner_id: Set(caller.id),
            created_at: Set(now()),
        }
        .insert(&txn)
        .await?;
        seed_dossier(&txn, created.id, template).await?;
        txn.commit().await?;

        tracing::info!(project_id = %created.id, code = %created.code, owner = %caller.id, "project created");
        Ok(created)
    }

    pub async fn get_project(&self, project_id: Uuid) -> Result<project::Model> {
        project::Entity::find_by_id(project_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("project {}", project_id)))
    }

    pub async fn list_projects(&self, caller: &user::Model) -> Result<Vec<project::Model>> {
        access::authorize(caller, Action::ListProjects, None)?;
        let mut select = project::Entity::find();
        if !matches!(caller.role, GlobalRole::Admin | GlobalRole::Auditor) {
            let member_of: Vec<Uuid> = membership::Entity::find()
                .filter(membership::Column::UserId.eq(caller.id))
                .all(&self.db)
                .await?
                .into_iter()
                .map(|m| m.project_id)
                .collect();
            select = select.filter(
                project::Column::OwnerId
                    .eq(caller.id)
                    .or(project::Column::Id.is_in(member_of)),
            );
        }
        Ok(select
            .order_by_desc(project::Column::CreatedAt)
            .all(&self.db)
            .await?)
    }

    pub async fn project_context(&self, user_id: Uuid, project: &project::Model) -> Result<ProjectContext> {
        let membership = membership::Entity::find()
            .filter(membership::Column::ProjectId.eq(project.id))
            .filter(membership::Column::UserId.eq(user_id))
            .one(&self.db)
            .await?
            .map(|m| m.role);
        Ok(ProjectContext {
            owner_id: project.owner_id,
            membership,
        })
    }

    /// Loads the project and checks `action` for the caller in one step.
    pub async fn authorize_project(
        &self,
        caller: &user::Model,
        project_id: Uuid,
        action: Action,
    ) -> Result<project::Model> {
        let project = self.get_project(project_id).await?;
        let ctx = self.project_context(caller.id, &project).await?;
        access::authorize(caller, action, Some(&ctx))?;
        Ok(project)
    }

    pub async fn stages(&self, project_id: Uuid) -> Result<Vec<stage::Model>> {
        Ok(stage::Entity::find()
            .filter(stage::Column::ProjectId.eq(project_id))
            .order_by_asc(stage::Column::Position)
            .all(&self.db)
            .await?)
    }

    pub async fn list_stages(&self, caller: &user::Model, project_id: Uuid) -> Result<Vec<StageRef>> {
        self.authorize_project(caller, project_id, Action::ViewDossier).await?;
        Ok(self
            .stages(project_id)
            .await?
            .into_iter()
            .map(|s| StageRef { id: s.id, code: s.code, name: s.name })
            .collect())
    }

    /// Appends a stage without slots; it counts toward progress only once slots exist.
    pub async fn add_stage(
        &self,
        caller: &user::Model,
        project_id: Uuid,
        req: CreateStageRequest,
    ) -> Result<stage::Model> {
        self.authorize_project(caller, project_id, Action::ManageStages).await?;
        let code = req.code.trim().to_uppercase();
        let name = req.name.trim().to_string();
        if code.is_empty() || name.is_empty() {
            return Err(AppError::Validation("stage code and name must not be empty".to_string()));
        }

        let _guard = self.locks.lock(stages_key(project_id)).await;
        let existing = self.stages(project_id).await?;
        if existing.iter().any(|s| s.code.eq_ignore_ascii_case(&code)) {
            return Err(AppError::Conflict(format!("stage '{}' already exists in this project", code)));
        }
        let position = req
            .position
            .unwrap_or_else(|| existing.iter().map(|s| s.position).max().unwrap_or(0) + 1);

        let created = stage::ActiveModel {
            id: Set(Uuid::new_v4()),
            project_id: Set(project_id),
            code: Set(code),
            name: Set(name),
            position: Set(position),
        }
        .insert(&self.db)
        .await?;
        tracing::info!(%project_id, stage = %created.code, position, by = %caller.id, "stage added");
        Ok(created)
    }

    // Membership

    pub async fn list_members(&self, caller: &user::Model, project_id: Uuid) -> Result<Vec<MemberInfo>> {
        self.authorize_project(caller, project_id, Action::ViewMembers).await?;
        let rows = membership::Entity::find()
            .filter(membership::Column::ProjectId.eq(project_id))
            .order_by_asc(membership::Column::CreatedAt)
            .find_also_related(user::Entity)
            .all(&self.db)
            .await?;
        Ok(rows
            .into_iter()
            .map(|(m, u)| MemberInfo {
                user_id: m.user_id,
                username: u.map(|u| u.username).unwrap_or_default(),
                role: m.role,
                since: m.created_at,
            })
            .collect())
    }

    pub async fn upsert_member(
        &self,
        caller: &user::Model,
        project_id: Uuid,
        req: UpsertMemberRequest,
    ) -> Result<Vec<MemberInfo>> {
        let project = self.authorize_project(caller, project_id, Action::ManageMembers).await?;
        let role = MemberRole::parse(&req.role)?;
        self.get_user(req.user_id).await?;
        if req.user_id == project.owner_id {
            return Err(AppError::Validation("the project owner cannot also be a member".to_string()));
        }

        let existing = membership::Entity::find()
            .filter(membership::Column::ProjectId.eq(project_id))
            .filter(membership::Column::UserId.eq(req.user_id))
            .one(&self.db)
            .await?;
        match existing {
            Some(found) => {
                let mut active: membership::ActiveModel = found.into();
                active.role = Set(role);
                active.update(&self.db).await?;
            }
            None => {
                membership::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    project_id: Set(project_id),
                    user_id: Set(req.user_id),
                    role: Set(role),
                    created_at: Set(now()),
                }
                .insert(&self.db)
                .await?;
            }
        }
        tracing::info!(%project_id, user_id = %req.user_id, ?role, by = %caller.id, "membership set");
        self.list_members(caller, project_id).await
    }

    pub async fn remove_member(&self, caller: &user::Model, project_id: Uuid, user_id: Uuid) -> Result<()> {
        self.authorize_project(caller, project_id, Action::ManageMembers).await?;
        let removed = membership::Entity::delete_many()
            .filter(membership::Column::ProjectId.eq(project_id))
            .filter(membership::Column::UserId.eq(user_id))
            .exec(&self.db)
            .await?;
        if removed.rows_affected == 0 {
            return Err(AppError::NotFound(format!("user {} is not a member", user_id)));
        }
        tracing::info!(%project_id, %user_id, by = %caller.id, "membership removed");
        Ok(())
    }

    // Listing

    pub async fn list_files(
        &self,
        caller: &user::Model,
        project_id: Uuid,
        query: ListFilesQuery,
    ) -> Result<ListFilesResponse> {
        self.authorize_project(caller, project_id, Action::ViewDossier).await?;
        let limit = query.limit.unwrap_or(DEFAULT_PAGE);
        if !(1..=MAX_PAGE).contains(&limit) {
            return Err(AppError::Validation(format!("limit must be between 1 and {}", MAX_PAGE)));
        }
        let offset = query.offset.unwrap_or(0);
        let window = offset
            .checked_add(limit)
            .filter(|w| i64::try_from(*w).is_ok())
            .ok_or_else(|| AppError::Validation(format!("offset {} is out of range", offset)))?;
        // Matched in Rust: SQLite's lower() only folds ASCII.
        let needle = query
            .q
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(str::to_lowercase);
        let sql_window = needle.is_none().then_some(window);

        let folder = query
            .path
            .as_deref()
            .map(|p| p.trim().trim_matches('/'))
            .filter(|p| !p.is_empty())
            .map(|p| format!("{}/", p));
        if query.stage_id.is_some() && folder.is_some() {
            return Err(AppError::Validation(
                "stage_id and path select different file kinds; pass only one".to_string(),
            ));
        }

        // Dossier files have no archive path, so a path filter excludes them.
        let dossier = if folder.is_none() {
            let mut select = deliverable_file::Entity::find()
                .filter(deliverable_file::Column::ProjectId.eq(project_id));
            if let Some(stage_id) = query.stage_id {
                select = select.filter(deliverable_file::Column::StageId.eq(stage_id));
            }
            if let Some(window) = sql_window {
                select = select.limit(window);
            }
            select
                .order_by_desc(deliverable_file::Column::UploadedAt)
                .all(&self.db)
                .await?
                .into_iter()
                .filter(|f| needle.as_deref().map_or(true, |n| name_matches(&f.filename, n)))
                .collect()
        } else {
            Vec::new()
        };

        // Archive files have no stage, so a stage filter excludes them.
        let archive = if query.stage_id.is_none() && caller_sees_archive(caller) {
            let mut select = categorized_file::Entity::find()
                .filter(categorized_file::Column::ProjectId.eq(project_id));
            if let Some(prefix) = &folder {
                select = select.filter(
                    Expr::col(categorized_file::Column::Path)
                        .like(LikeExpr::new(format!("{}%", escape_like(prefix))).escape('\\')),
                );
            }
            if let Some(window) = sql_window {
                select = select.limit(window);
            }
            select
                .order_by_desc(categorized_file::Column::UploadedAt)
                .all(&self.db)
                .await?
                .into_iter()
                .filter(|f| folder.as_deref().map_or(true, |p| f.path.starts_with(p)))
                .filter(|f| needle.as_deref().map_or(true, |n| name_matches(&f.filename, n)))
                .collect()
        } else {
            Vec::new()
        };

        let stages: HashMap<Uuid, StageRef> = self
            .stages(project_id)
            .await?
            .into_iter()
            .map(|s| (s.id, StageRef { id: s.id, code: s.code, name: s.name }))
            .collect();
        let uploader_ids: HashSet<Uuid> = dossier
            .iter()
            .map(|f| f.uploaded_by)
            .chain(archive.iter().map(|f| f.uploaded_by))
            .collect();
        let usernames = self.usernames(uploader_ids).await?;

        let mut items: Vec<FileListItem> = dossier
            .into_iter()
            .map(|f| FileListItem {
                id: f.id,
                stage: stages.get(&f.stage_id).cloned(),
                slot_key: Some(f.slot_key),
                path: None,
                uploaded_by: usernames.get(&f.uploaded_by).cloned(),
                filename: f.filename,
                size_bytes: f.size_bytes,
                content_type: f.content_type,
                version: f.version,
                uploaded_at: f.uploaded_at,
                pending_delete: f.pending_delete,
            })
            .chain(archive.into_iter().map(|f| FileListItem {
                id: f.id,
                stage: None,
                slot_key: None,
                uploaded_by: usernames.get(&f.uploaded_by).cloned(),
                path: Some(f.path),
                filename: f.filename,
                size_bytes: f.size_bytes,
                content_type: f.content_type,
                version: f.version,
                uploaded_at: f.uploaded_at,
                pending_delete: f.pending_delete,
            }))
            .collect();
        items.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at).then(a.id.cmp(&b.id)));
        let items = items
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();

        Ok(ListFilesResponse { items, limit, offset })
    }

    async fn usernames(&self, ids: HashSet<Uuid>) -> Result<HashMap<Uuid, String>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        Ok(user::Entity::find()
            .filter(user::Column::Id.is_in(ids))
            .all(&self.db)
            .await?
            .into_iter()
            .map(|u| (u.id, u.username))
            .collect())
    }
}

/// Case-insensitive substring match; `needle` is already lowercased.
fn name_matches(name: &str, needle: &str) -> bool {
    name.to_lowercase().contains(needle)
}

fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn caller_sees_archive(caller: &user::Model) -> bool {
    caller.role == GlobalRole::Admin || caller.can_access_technical_archive
}

pub(crate) struct NewUser {
    pub username: String,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub initials: Option<String>,
    pub role: GlobalRole,
    pub can_create_projects: bool,
    pub can_access_technical_archive: bool,
}

pub(crate) async fn insert_user<C: ConnectionTrait>(db: &C, new: NewUser) -> Result<user::Model> {
    Ok(user::ActiveModel {
        id: Set(Uuid::new_v4()),
        username: Set(new.username),
        full_name: Set(new.full_name),
        email: Set(new.email),
        initials: Set(new.initials.map(|i| i.trim().to_uppercase()).filter(|i| !i.is_empty())),
        role: Set(new.role),
        can_create_projects: Set(new.can_create_projects),
        can_access_technical_archive: Set(new.can_access_technical_archive),
        created_at: Set(now()),
    }
    .insert(db)
    .await?)
}

pub(crate) fn normalize_username(raw: &str) -> Result<String> {
    let username = raw.trim().to_string();
    if username.is_empty() {
        return Err(AppError::Validation("username must not be empty".to_string()));
    }
    Ok(username)
}

/// Materialises the stage and slot rows of a new project.
async fn seed_dossier<C: ConnectionTrait>(db: &C, project_id: Uuid, template: &DossierTemplate) -> Result<()> {
    for stage_template in &template.stages {
        let stage_id = Uuid::new_v4();
        stage::ActiveModel {
            id: Set(stage_id),
            project_id: Set(project_id),
            code: Set(stage_template.code.clone()),
            name: Set(stage_template.name.clone()),
            position: Set(stage_template.order),
        }
        .insert(db)
        .await?;

        for slot in &stage_template.deliverables {
            deliverable_slot::ActiveModel {
                id: Set(Uuid::new_v4()),
                stage_id: Set(stage_id),
                key: Set(slot.key.clone()),
                title: Set(slot.title.clone()),
                required: Set(slot.required),
                multi: Set(slot.multi),
                allowed_ext: Set(slot.allowed_ext.join(",")),
                position: Set(slot.order),
                optional_group: Set(slot.optional_group.clone()),
            }
            .insert(db)
            .await?;
        }
    }
    Ok(())
}

/// Per-type code patterns; `None` marks the legacy 4-digit key accepted for both types.
fn code_patterns() -> &'static [(Option<ProjectType>, Regex)] {
    static PATTERNS: OnceLock<Vec<(Option<ProjectType>, Regex)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            (Some(ProjectType::External), r"^EE\d{4}\s+[A-Z0-9]{3,}$"),
            (Some(ProjectType::Internal), r"^EI\d{4}\s+[A-Z0-9]{3,}$"),
            (None, r"^\d{4}$"),
        ]
        .into_iter()
        .filter_map(|(pt, pattern)| Regex::new(pattern).ok().map(|re| (pt, re)))
        .collect()
    })
}

/// Normalises whitespace and case, then checks the code against its type's pattern.
pub fn validate_code(project_type: ProjectType, raw: &str) -> Result<String> {
    let code = raw
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase();
    let matches = code_patterns()
        .iter()
        .any(|(pt, re)| pt.map_or(true, |pt| pt == project_type) && re.is_match(&code));
    if matches {
        Ok(code)
    } else {
        Err(AppError::Validation(format!(
            "code '{}' must look like {}0001 ORG",
            code,
            project_type.code_prefix()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_code_per_type() {
        assert_eq!(validate_code(ProjectType::External, " ee0001   abc ").unwrap(), "EE0001 ABC");
        assert_eq!(validate_code(ProjectType::Internal, "EI1234 IMTA").unwrap(), "EI1234 IMTA");
        assert_eq!(validate_code(ProjectType::Internal, "0042").unwrap(), "0042");
        assert!(validate_code(ProjectType::Internal, "EE0001 ABC").is_err());
        assert!(validate_code(ProjectType::External, "EE001 ABC").is_err());
        assert!(validate_code(ProjectType::External, "EE0001 AB").is_err());
    }
}
