// ABOUTME: Delete request entity for moderated removal of files and projects
// ABOUTME: Stores reason, requester and the single terminal decision

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::types::{RequestStatus, TargetKind};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "delete_requests")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub target_kind: TargetKind,
    pub target_id: Uuid,
    pub project_id: Uuid,
    pub reason: String,
    pub requested_by: Uuid,
    pub status: RequestStatus,
    pub decision_note: Option<String>,
    pub created_at: i64,
    pub decided_at: Option<i64>,
    pub decided_by: Option<Uuid>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
