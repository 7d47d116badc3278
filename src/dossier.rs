// ABOUTME: Read-side dossier snapshot: stages, slots, file versions and completion percents
// ABOUTME: All reads run inside one transaction so progress matches the listed files

use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder, TransactionTrait};
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

use crate::access::Action;
use crate::entities::{deliverable_file, deliverable_slot, stage, user};
use crate::error::Result;
use crate::progress::{self, SlotState, StageProgress};
use crate::storage::Storage;
use crate::types::ProjectSummary;

#[derive(Debug, Clone, Serialize)]
pub struct SlotView {
    pub key: String,
    pub title: String,
    pub required: bool,
    pub multi: bool,
    pub allowed_ext: Vec<String>,
    pub optional_group: Option<String>,
    pub done: bool,
    pub files: Vec<deliverable_file::Model>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StageView {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub position: i32,
    pub progress: StageProgress,
    pub slots: Vec<SlotView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DossierSnapshot {
    pub project: ProjectSummary,
    pub stages: Vec<StageView>,
    pub percent: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct StagePercent {
    pub stage_id: Uuid,
    pub code: String,
    #[serde(flatten)]
    pub progress: StageProgress,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgressReport {
    pub project_id: Uuid,
    pub stages: Vec<StagePercent>,
    pub percent: u32,
}

impl Storage {
    pub async fn dossier_snapshot(&self, caller: &user::Model, project_id: Uuid) -> Result<DossierSnapshot> {
        let project = self.authorize_project(caller, project_id, Action::ViewDossier).await?;

        let txn = self.db.begin().await?;
        let stages = stage::Entity::find()
            .filter(stage::Column::ProjectId.eq(project_id))
            .order_by_asc(stage::Column::Position)
            .all(&txn)
            .await?;
        let stage_ids: Vec<Uuid> = stages.iter().map(|s| s.id).collect();
        let slots = deliverable_slot::Entity::find()
            .filter(deliverable_slot::Column::StageId.is_in(stage_ids))
            .order_by_asc(deliverable_slot::Column::Position)
            .all(&txn)
            .await?;
        let files = deliverable_file::Entity::find()
            .filter(deliverable_file::Column::ProjectId.eq(project_id))
            .order_by_asc(deliverable_file::Column::Version)
            .all(&txn)
            .await?;
        txn.commit().await?;

        let mut slots_by_stage: HashMap<Uuid, Vec<deliverable_slot::Model>> = HashMap::new();
        for slot in slots {
            slots_by_stage.entry(slot.stage_id).or_default().push(slot);
        }
        let mut files_by_slot: HashMap<(Uuid, String), Vec<deliverable_file::Model>> = HashMap::new();
        for file in files {
            files_by_slot
                .entry((file.stage_id, file.slot_key.clone()))
                .or_default()
                .push(file);
        }

        let mut views = Vec::with_capacity(stages.len());
        for stage in stages {
            let stage_slots = slots_by_stage.remove(&stage.id).unwrap_or_default();
            let mut states = Vec::with_capacity(stage_slots.len());
            let mut slot_views = Vec::with_capacity(stage_slots.len());
            for slot in stage_slots {
                let slot_files = files_by_slot
                    .remove(&(stage.id, slot.key.clone()))
                    .unwrap_or_default();
                let state = SlotState::of(&slot, &slot_files);
                states.push(state);
                slot_views.push(SlotView {
                    allowed_ext: slot.allowed_extensions(),
                    key: slot.key,
                    title: slot.title,
                    required: slot.required,
                    multi: slot.multi,
                    optional_group: slot.optional_group,
                    done: state.is_done(),
                    files: slot_files,
                });
            }
            views.push(StageView {
                id: stage.id,
                code: stage.code,
                name: stage.name,
                position: stage.position,
                progress: progress::stage_progress(&states),
                slots: slot_views,
            });
        }

        let stage_progress: Vec<StageProgress> = views.iter().map(|v| v.progress).collect();
        Ok(DossierSnapshot {
            project: project.into(),
            percent: progress::project_progress(&stage_progress),
            stages: views,
        })
    }

    pub async fn progress_report(&self, caller: &user::Model, project_id: Uuid) -> Result<ProgressReport> {
        let snapshot = self.dossier_snapshot(caller, project_id).await?;
        Ok(ProgressReport {
            project_id,
            percent: snapshot.percent,
            stages: snapshot
                .stages
                .into_iter()
                .map(|s| StagePercent {
                    stage_id: s.id,
                    code: s.code,
                    progress: s.progress,
                })
                .collect(),
        })
    }
}
