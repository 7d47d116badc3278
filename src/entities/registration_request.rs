// ABOUTME: Registration request entity for admin-approved account creation
// ABOUTME: Holds requested username, profile fields and capability wishes

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::types::RequestStatus;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "registration_requests")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub username: String,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub initials: Option<String>,
    pub wants_create_projects: bool,
    // Opaque handle issued by the external credential service.
    #[serde(skip_serializing)]
    pub credential_ref: Option<String>,
    pub status: RequestStatus,
    pub note: Option<String>,
    pub created_at: i64,
    pub decided_at: Option<i64>,
    pub decided_by: Option<Uuid>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
