// ABOUTME: Deliverable file entity, one row per uploaded version of a dossier slot
// ABOUTME: Tracks version number, active flag and pending-delete marker per slot

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "deliverable_files")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub project_id: Uuid,
    pub stage_id: Uuid,
    pub slot_key: String,
    pub version: i32,
    pub filename: String,
    pub size_bytes: i64,
    pub content_type: Option<String>,
    pub sha256: String,
    #[serde(skip_serializing)]
    pub blob_key: String,
    pub uploaded_by: Uuid,
    pub uploaded_at: i64,
    pub is_active: bool,
    pub pending_delete: bool,
    pub change_reason: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::stage::Entity",
        from = "Column::StageId",
        to = "super::stage::Column::Id"
    )]
    Stage,
}

impl Related<super::stage::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Stage.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
