// ABOUTME: Deliverable slot entity materialised per stage from the dossier taxonomy
// ABOUTME: Carries required/multi flags and the comma separated extension allow-list

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "deliverable_slots")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub stage_id: Uuid,
    pub key: String,
    pub title: String,
    pub required: bool,
    pub multi: bool,
    pub allowed_ext: String, // "pdf,doc,docx"
    pub position: i32,
    pub optional_group: Option<String>,
}

impl Model {
    pub fn allowed_extensions(&self) -> Vec<String> {
        self.allowed_ext
            .split(',')
            .map(|ext| ext.trim().to_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect()
    }
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
