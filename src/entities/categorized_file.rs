// ABOUTME: Categorized file entity for the technical archive
// ABOUTME: Path is stored as slash-separated keys ending with the filename

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "categorized_files")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub project_id: Uuid,
    pub path: String, // "info/ensayos/campaña 1/probeta.pdf"
    pub filename: String,
    pub version: i32,
    pub size_bytes: i64,
    pub content_type: Option<String>,
    pub sha256: String,
    #[serde(skip_serializing)]
    pub blob_key: String,
    pub uploaded_by: Uuid,
    pub uploaded_at: i64,
    pub pending_delete: bool,
}

impl Model {
    pub fn segments(&self) -> Vec<&str> {
        self.path.split('/').collect()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::project::Entity",
        from = "Column::ProjectId",
        to = "super::project::Column::Id"
    )]
    Project,
}

impl Related<super::project::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Project.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
