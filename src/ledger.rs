// ABOUTME: Deliverable version ledger: per-slot version history with single-active semantics
// ABOUTME: Version increment and activation happen in one transaction under a per-slot lock

use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use uuid::Uuid;

use crate::access::Action;
use crate::blob::StagedBlob;
use crate::entities::{deliverable_file, deliverable_slot, stage, user};
use crate::error::{AppError, Result};
use crate::locks;
use crate::storage::{now, Storage};
use crate::tree::clean_filename;

/// A fully transferred file waiting to be recorded.
#[derive(Debug)]
pub struct IncomingFile {
    pub filename: String,
    pub content_type: Option<String>,
    pub blob: StagedBlob,
}

pub fn extension_of(filename: &str) -> Option<String> {
    let (stem, ext) = filename.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_lowercase())
}

pub fn check_extension(slot: &deliverable_slot::Model, filename: &str) -> Result<()> {
    let allowed = slot.allowed_extensions();
    if allowed.is_empty() {
        return Ok(());
    }
    match extension_of(filename) {
        Some(ext) if allowed.contains(&ext) => Ok(()),
        Some(ext) => Err(AppError::unsupported_extension(&ext)),
        None => Err(AppError::unsupported_extension("")),
    }
}

impl Storage {
    pub async fn find_slot(
        &self,
        project_id: Uuid,
        stage_id: Uuid,
        slot_key: &str,
    ) -> Result<(stage::Model, deliverable_slot::Model)> {
        let stage = stage::Entity::find_by_id(stage_id)
            .filter(stage::Column::ProjectId.eq(project_id))
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("stage {} in project {}", stage_id, project_id)))?;
        let slot = deliverable_slot::Entity::find()
            .filter(deliverable_slot::Column::StageId.eq(stage_id))
            .filter(deliverable_slot::Column::Key.eq(slot_key))
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("slot '{}' in stage {}", slot_key, stage.code)))?;
        Ok((stage, slot))
    }

    /// Everything that can be rejected before any bytes are transferred.
    pub async fn check_slot_upload(
        &self,
        caller: &user::Model,
        project_id: Uuid,
        stage_id: Uuid,
        slot_key: &str,
        filename: &str,
    ) -> Result<deliverable_slot::Model> {
        self.authorize_project(caller, project_id, Action::UploadDossier).await?;
        let (_, slot) = self.find_slot(project_id, stage_id, slot_key).await?;
        check_extension(&slot, &clean_filename(filename)?)?;
        Ok(slot)
    }

    pub async fn upload_version(
        &self,
        caller: &user::Model,
        project_id: Uuid,
        stage_id: Uuid,
        slot_key: &str,
        file: IncomingFile,
        reason: Option<String>,
    ) -> Result<deliverable_file::Model> {
        let slot = self
            .check_slot_upload(caller, project_id, stage_id, slot_key, &file.filename)
            .await?;
        let filename = clean_filename(&file.filename)?;
        let reason = reason.map(|r| r.trim().to_string()).filter(|r| !r.is_empty());

        let _guard = self
            .locks
            .lock(locks::slot_key(project_id, stage_id, slot_key))
            .await;
        let txn = self.db.begin().await?;

        let history = deliverable_file::Entity::find()
            .filter(deliverable_file::Column::StageId.eq(stage_id))
            .filter(deliverable_file::Column::SlotKey.eq(slot_key))
            .order_by_desc(deliverable_file::Column::Version)
            .all(&txn)
            .await?;
        let has_active = history.iter().any(|f| f.is_active);
        if !slot.multi && has_active && reason.is_none() {
            return Err(AppError::reason_required());
        }
        let version = history.first().map(|f| f.version).unwrap_or(0) + 1;

        if !slot.multi && has_active {
            deliverable_file::Entity::update_many()
                .col_expr(deliverable_file::Column::IsActive, Expr::value(false))
                .filter(deliverable_file::Column::StageId.eq(stage_id))
                .filter(deliverable_file::Column::SlotKey.eq(slot_key))
                .filter(deliverable_file::Column::IsActive.eq(true))
                .exec(&txn)
                .await?;
        }

        let id = Uuid::new_v4();
        let blob_key = id.to_string();
        let created = deliverable_file::ActiveModel {
            id: Set(id),
            project_id: Set(project_id),
            stage_id: Set(stage_id),
            slot_key: Set(slot_key.to_string()),
            version: Set(version),
            filename: Set(filename),
            size_bytes: Set(file.blob.size_bytes),
            content_type: Set(file.content_type),
            sha256: Set(file.blob.sha256.clone()),
            blob_key: Set(blob_key.clone()),
            uploaded_by: Set(caller.id),
            uploaded_at: Set(now()),
            is_active: Set(true),
            pending_delete: Set(false),
            change_reason: Set(reason),
        }
        .insert(&txn)
        .await?;

        self.blobs.promote(file.blob, &blob_key).await?;
        if let Err(err) = txn.commit().await {
            if let Err(cleanup) = self.blobs.remove(&blob_key).await {
                tracing::warn!(%blob_key, "failed to remove blob of aborted upload: {}", cleanup);
            }
            return Err(err.into());
        }

        tracing::info!(
            file_id = %created.id,
            %project_id,
            %stage_id,
            slot = slot_key,
            version,
            multi = slot.multi,
            "deliverable version recorded"
        );
        Ok(created)
    }

    /// All stored versions of a slot, oldest first.
    pub async fn list_slot(
        &self,
        caller: &user::Model,
        project_id: Uuid,
        stage_id: Uuid,
        slot_key: &str,
    ) -> Result<Vec<deliverable_file::Model>> {
        self.authorize_project(caller, project_id, Action::ViewDossier).await?;
        self.find_slot(project_id, stage_id, slot_key).await?;
        Ok(deliverable_file::Entity::find()
            .filter(deliverable_file::Column::StageId.eq(stage_id))
            .filter(deliverable_file::Column::SlotKey.eq(slot_key))
            .order_by_asc(deliverable_file::Column::Version)
            .all(&self.db)
            .await?)
    }
}

/// Restores the single-active rule after a version of a non-multi slot was removed.
///
/// Runs inside the removing transaction so no reader sees zero or two active versions.
pub async fn promote_after_removal<C: ConnectionTrait>(
    db: &C,
    stage_id: Uuid,
    slot_key: &str,
) -> Result<Option<deliverable_file::Model>> {
    let slot = deliverable_slot::Entity::find()
        .filter(deliverable_slot::Column::StageId.eq(stage_id))
        .filter(deliverable_slot::Column::Key.eq(slot_key))
        .one(db)
        .await?;
    if slot.map_or(true, |s| s.multi) {
        return Ok(None);
    }

    let remaining = deliverable_file::Entity::find()
        .filter(deliverable_file::Column::StageId.eq(stage_id))
        .filter(deliverable_file::Column::SlotKey.eq(slot_key))
        .order_by_desc(deliverable_file::Column::Version)
        .all(db)
        .await?;
    if remaining.iter().any(|f| f.is_active) {
        return Ok(None);
    }
    let Some(latest) = remaining.into_iter().next() else {
        return Ok(None);
    };

    let mut active: deliverable_file::ActiveModel = latest.into();
    active.is_active = Set(true);
    let promoted = active.update(db).await?;
    tracing::info!(file_id = %promoted.id, %stage_id, slot = slot_key, version = promoted.version, "promoted remaining version to active");
    Ok(Some(promoted))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(exts: &str) -> deliverable_slot::Model {
        deliverable_slot::Model {
            id: Uuid::new_v4(),
            stage_id: Uuid::new_v4(),
            key: "k".into(),
            title: "K".into(),
            required: true,
            multi: false,
            allowed_ext: exts.into(),
            position: 1,
            optional_group: None,
        }
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("Informe.Final.PDF").as_deref(), Some("pdf"));
        assert_eq!(extension_of("README"), None);
        assert_eq!(extension_of(".pdf"), None);
        assert_eq!(extension_of("x."), None);
    }

    #[test]
    fn test_check_extension() {
        let pdf_only = slot("pdf");
        assert!(check_extension(&pdf_only, "a.PDF").is_ok());
        let err = check_extension(&pdf_only, "a.docx").unwrap_err();
        assert_eq!(err.message(), "unsupported extension: .docx");
        assert!(check_extension(&pdf_only, "noext").is_err());
        assert!(check_extension(&slot(""), "anything.bin").is_ok());
        assert!(check_extension(&slot(""), "LEEME").is_ok());
    }
}
