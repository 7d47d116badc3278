// ABOUTME: User entity with global role, capability flags and initials
// ABOUTME: Identity itself is established upstream; this row only carries authorization facts

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::types::GlobalRole;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub username: String,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub initials: Option<String>,
    pub role: GlobalRole,
    pub can_create_projects: bool,
    pub can_access_technical_archive: bool,
    pub created_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::membership::Entity")]
    Memberships,
}

impl Related<super::membership::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Memberships.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
