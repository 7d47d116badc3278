// ABOUTME: Shared domain enums and API request/response types for the dossier service
// ABOUTME: Enums double as SeaORM active enums so entities and handlers speak one vocabulary

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

// Domain enums

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum ProjectType {
    #[sea_orm(string_value = "externo")]
    #[serde(rename = "externo")]
    External,
    #[sea_orm(string_value = "interno")]
    #[serde(rename = "interno")]
    Internal,
}

impl ProjectType {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_lowercase().as_str() {
            "externo" | "external" => Ok(ProjectType::External),
            "interno" | "internal" => Ok(ProjectType::Internal),
            other => Err(AppError::Validation(format!(
                "project type must be 'externo' or 'interno', got '{}'",
                other
            ))),
        }
    }

    /// Letter pair that prefixes project codes of this type.
    pub fn code_prefix(&self) -> &'static str {
        match self {
            ProjectType::External => "EE",
            ProjectType::Internal => "EI",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "lowercase")]
pub enum GlobalRole {
    #[sea_orm(string_value = "colaborador")]
    Colaborador,
    #[sea_orm(string_value = "admin")]
    Admin,
    #[sea_orm(string_value = "auditor")]
    Auditor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    #[sea_orm(string_value = "viewer")]
    Viewer,
    #[sea_orm(string_value = "uploader")]
    Uploader,
    #[sea_orm(string_value = "manager")]
    Manager,
}

impl MemberRole {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_lowercase().as_str() {
            "viewer" => Ok(MemberRole::Viewer),
            "uploader" => Ok(MemberRole::Uploader),
            "manager" => Ok(MemberRole::Manager),
            "owner" => Err(AppError::Validation(
                "ownership is held by the project and cannot be granted as membership".to_string(),
            )),
            other => Err(AppError::Validation(format!("unknown member role '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    #[sea_orm(string_value = "file")]
    File,
    #[sea_orm(string_value = "project")]
    Project,
}

/// Lifecycle shared by delete and registration requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "approved")]
    Approved,
    #[sea_orm(string_value = "rejected")]
    Rejected,
}

impl RequestStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RequestStatus::Pending)
    }
}

// Project API types

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateProjectRequest {
    pub code: String,
    pub name: String,
    #[serde(rename = "type", default = "default_project_type")]
    pub project_type: String,
}

fn default_project_type() -> String {
    "externo".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectSummary {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    #[serde(rename = "type")]
    pub project_type: ProjectType,
    pub owner_id: Uuid,
    pub created_at: i64,
}

impl From<crate::entities::project::Model> for ProjectSummary {
    fn from(p: crate::entities::project::Model) -> Self {
        Self {
            id: p.id,
            code: p.code,
            name: p.name,
            project_type: p.project_type,
            owner_id: p.owner_id,
            created_at: p.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateStageRequest {
    pub code: String,
    pub name: String,
    /// Defaults to after the last existing stage.
    pub position: Option<i32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpsertMemberRequest {
    pub user_id: Uuid,
    pub role: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberInfo {
    pub user_id: Uuid,
    pub username: String,
    pub role: MemberRole,
    pub since: i64,
}

// File API types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageRef {
    pub id: Uuid,
    pub code: String,
    pub name: String,
}

/// One row of the combined dossier + archive listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileListItem {
    pub id: Uuid,
    pub filename: String,
    pub size_bytes: i64,
    pub content_type: Option<String>,
    pub version: i32,
    pub stage: Option<StageRef>,
    pub slot_key: Option<String>,
    pub path: Option<String>,
    pub uploaded_at: i64,
    pub uploaded_by: Option<String>,
    pub pending_delete: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListFilesQuery {
    pub stage_id: Option<Uuid>,
    /// Archive folder prefix such as `info/ensayos`.
    pub path: Option<String>,
    pub q: Option<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListFilesResponse {
    pub items: Vec<FileListItem>,
    pub limit: u64,
    pub offset: u64,
}

// Delete request API types

#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteReasonRequest {
    pub reason: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BulkDeleteRequest {
    pub ids: Vec<Uuid>,
    pub reason: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct DecisionNote {
    pub note: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StatusFilter {
    pub status: Option<RequestStatus>,
}

/// Per-item outcome for batch operations.
#[derive(Debug, Serialize, Deserialize)]
pub struct ItemResult<T> {
    pub id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ItemError>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ItemError {
    pub kind: String,
    pub message: String,
}

impl<T> ItemResult<T> {
    pub fn from_result(id: Uuid, outcome: Result<T>) -> Self {
        match outcome {
            Ok(value) => Self {
                id,
                result: Some(value),
                error: None,
            },
            Err(err) => Self {
                id,
                result: None,
                error: Some(ItemError {
                    kind: err.kind().to_string(),
                    message: err.message().to_string(),
                }),
            },
        }
    }
}

// User and registration API types

#[derive(Debug, Serialize, Deserialize)]
pub struct RegistrationForm {
    pub username: String,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub initials: Option<String>,
    #[serde(default)]
    pub want_create: bool,
    pub credential_ref: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ApproveRegistrationForm {
    pub role: Option<GlobalRole>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub role: Option<GlobalRole>,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub initials: Option<String>,
    #[serde(default)]
    pub can_create_projects: bool,
    #[serde(default = "default_true")]
    pub can_access_technical_archive: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct UpdateUserRequest {
    pub role: Option<GlobalRole>,
    pub initials: Option<String>,
    pub can_create_projects: Option<bool>,
    pub can_access_technical_archive: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UserQuery {
    pub q: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_type_parse_accepts_both_vocabularies() {
        assert_eq!(ProjectType::parse("Externo").unwrap(), ProjectType::External);
        assert_eq!(ProjectType::parse(" internal ").unwrap(), ProjectType::Internal);
        assert!(ProjectType::parse("mixto").is_err());
    }

    #[test]
    fn test_owner_is_not_a_member_role() {
        let err = MemberRole::parse("owner").unwrap_err();
        assert_eq!(err.kind(), "validation");
        assert_eq!(MemberRole::parse("MANAGER").unwrap(), MemberRole::Manager);
    }

    #[test]
    fn test_item_result_carries_error_kind() {
        let id = Uuid::new_v4();
        let item: ItemResult<()> = ItemResult::from_result(id, Err(AppError::empty_reason()));
        let error = item.error.unwrap();
        assert_eq!(error.kind, "validation");
        assert!(item.result.is_none());
    }
}
