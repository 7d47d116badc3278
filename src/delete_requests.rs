// ABOUTME: Moderated two-step deletion for files and projects: pending then approved or rejected
// ABOUTME: Approval removes the target and restores the single-active rule in the same transaction

use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseTransaction, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::access::{self, Action};
use crate::entities::{
    categorized_file, delete_request, deliverable_file, deliverable_slot, membership, project,
    stage, user,
};
use crate::error::{AppError, Result};
use crate::ledger::promote_after_removal;
use crate::locks;
use crate::storage::{now, Storage};
use crate::types::{ItemResult, RequestStatus, TargetKind};

/// A file id resolved to whichever table holds it.
#[derive(Debug, Clone)]
pub enum FileTarget {
    Deliverable(deliverable_file::Model),
    Archive(categorized_file::Model),
}

impl FileTarget {
    pub fn project_id(&self) -> Uuid {
        match self {
            FileTarget::Deliverable(f) => f.project_id,
            FileTarget::Archive(f) => f.project_id,
        }
    }
}

async fn find_file<C: ConnectionTrait>(db: &C, file_id: Uuid) -> Result<Option<FileTarget>> {
    if let Some(found) = deliverable_file::Entity::find_by_id(file_id).one(db).await? {
        return Ok(Some(FileTarget::Deliverable(found)));
    }
    Ok(categorized_file::Entity::find_by_id(file_id)
        .one(db)
        .await?
        .map(FileTarget::Archive))
}

async fn set_pending_flag<C: ConnectionTrait>(db: &C, file_id: Uuid, pending: bool) -> Result<()> {
    deliverable_file::Entity::update_many()
        .col_expr(deliverable_file::Column::PendingDelete, Expr::value(pending))
        .filter(deliverable_file::Column::Id.eq(file_id))
        .exec(db)
        .await?;
    categorized_file::Entity::update_many()
        .col_expr(categorized_file::Column::PendingDelete, Expr::value(pending))
        .filter(categorized_file::Column::Id.eq(file_id))
        .exec(db)
        .await?;
    Ok(())
}

fn clean_reason(reason: &str) -> Result<String> {
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(AppError::empty_reason());
    }
    Ok(reason.to_string())
}

impl Storage {
    pub async fn request_file_deletion(
        &self,
        caller: &user::Model,
        file_id: Uuid,
        reason: &str,
    ) -> Result<delete_request::Model> {
        let reason = clean_reason(reason)?;
        let target = find_file(&self.db, file_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("file {}", file_id)))?;
        self.authorize_project(caller, target.project_id(), Action::RequestFileDeletion)
            .await?;
        if matches!(target, FileTarget::Archive(_)) {
            self.authorize_project(caller, target.project_id(), Action::UploadArchive)
                .await?;
        }

        let _guard = self.locks.lock(locks::request_key(file_id)).await;
        let txn = self.db.begin().await?;
        ensure_no_pending(&txn, file_id).await?;
        let created = insert_request(&txn, TargetKind::File, file_id, target.project_id(), reason, caller.id).await?;
        set_pending_flag(&txn, file_id, true).await?;
        txn.commit().await?;

        tracing::info!(request_id = %created.id, %file_id, by = %caller.id, "file delete requested");
        Ok(created)
    }

    /// One outcome per id; failures do not stop the remaining items.
    pub async fn request_bulk_file_deletion(
        &self,
        caller: &user::Model,
        project_id: Uuid,
        ids: &[Uuid],
        reason: &str,
    ) -> Result<Vec<ItemResult<delete_request::Model>>> {
        self.authorize_project(caller, project_id, Action::RequestFileDeletion).await?;
        clean_reason(reason)?;

        let mut results = Vec::with_capacity(ids.len());
        for &file_id in ids {
            let outcome = match find_file(&self.db, file_id).await {
                Ok(Some(target)) if target.project_id() == project_id => {
                    self.request_file_deletion(caller, file_id, reason).await
                }
                Ok(_) => Err(AppError::NotFound(format!("file {} in project {}", file_id, project_id))),
                Err(err) => Err(err),
            };
            results.push(ItemResult::from_result(file_id, outcome));
        }
        let failed = results.iter().filter(|r| r.error.is_some()).count();
        tracing::info!(%project_id, total = ids.len(), failed, "bulk delete requested");
        Ok(results)
    }

    pub async fn request_project_deletion(
        &self,
        caller: &user::Model,
        project_id: Uuid,
        reason: &str,
    ) -> Result<delete_request::Model> {
        let reason = clean_reason(reason)?;
        self.authorize_project(caller, project_id, Action::RequestProjectDeletion).await?;

        let _guard = self.locks.lock(locks::request_key(project_id)).await;
        let txn = self.db.begin().await?;
        ensure_no_pending(&txn, project_id).await?;
        let created = insert_request(&txn, TargetKind::Project, project_id, project_id, reason, caller.id).await?;
        txn.commit().await?;

        tracing::info!(request_id = %created.id, %project_id, by = %caller.id, "project delete requested");
        Ok(created)
    }

    pub async fn list_delete_requests(
        &self,
        caller: &user::Model,
        status: Option<RequestStatus>,
    ) -> Result<Vec<delete_request::Model>> {
        access::authorize(caller, Action::DecideDeleteRequests, None)?;
        let mut select = delete_request::Entity::find();
        if let Some(status) = status {
            select = select.filter(delete_request::Column::Status.eq(status));
        }
        Ok(select
            .order_by_desc(delete_request::Column::CreatedAt)
            .all(&self.db)
            .await?)
    }

    pub async fn approve_delete_request(
        &self,
        caller: &user::Model,
        request_id: Uuid,
        note: Option<String>,
    ) -> Result<delete_request::Model> {
        access::authorize(caller, Action::DecideDeleteRequests, None)?;
        let target_id = self.pending_target(request_id).await?;

        let _guard = self.locks.lock(locks::request_key(target_id)).await;
        // Removing a dossier version competes with uploads to the same slot.
        let _slot_guard = match find_file(&self.db, target_id).await? {
            Some(FileTarget::Deliverable(file)) => Some(
                self.locks
                    .lock(locks::slot_key(file.project_id, file.stage_id, &file.slot_key))
                    .await,
            ),
            _ => None,
        };
        let txn = self.db.begin().await?;
        let request = load_pending(&txn, request_id).await?;

        let blob_keys = match request.target_kind {
            TargetKind::File => remove_file(&txn, request.target_id).await?,
            TargetKind::Project => remove_project(&txn, request.target_id, request.id).await?,
        };
        let decided = decide(&txn, request, RequestStatus::Approved, caller.id, note).await?;
        txn.commit().await?;

        // Rows are gone; leftover bytes are only wasted space.
        for key in &blob_keys {
            if let Err(err) = self.blobs.remove(key).await {
                tracing::warn!(blob_key = %key, "failed to remove blob after approved deletion: {}", err);
            }
        }
        tracing::info!(
            request_id = %decided.id,
            target_id = %decided.target_id,
            kind = ?decided.target_kind,
            blobs = blob_keys.len(),
            by = %caller.id,
            "delete request approved"
        );
        Ok(decided)
    }

    pub async fn reject_delete_request(
        &self,
        caller: &user::Model,
        request_id: Uuid,
        note: Option<String>,
    ) -> Result<delete_request::Model> {
        access::authorize(caller, Action::DecideDeleteRequests, None)?;
        let target_id = self.pending_target(request_id).await?;

        let _guard = self.locks.lock(locks::request_key(target_id)).await;
        let txn = self.db.begin().await?;
        let request = load_pending(&txn, request_id).await?;
        if request.target_kind == TargetKind::File {
            set_pending_flag(&txn, request.target_id, false).await?;
        }
        let decided = decide(&txn, request, RequestStatus::Rejected, caller.id, note).await?;
        txn.commit().await?;

        tracing::info!(request_id = %decided.id, target_id = %decided.target_id, by = %caller.id, "delete request rejected");
        Ok(decided)
    }

    async fn pending_target(&self, request_id: Uuid) -> Result<Uuid> {
        Ok(load_pending(&self.db, request_id).await?.target_id)
    }
}

async fn ensure_no_pending<C: ConnectionTrait>(db: &C, target_id: Uuid) -> Result<()> {
    let pending = delete_request::Entity::find()
        .filter(delete_request::Column::TargetId.eq(target_id))
        .filter(delete_request::Column::Status.eq(RequestStatus::Pending))
        .one(db)
        .await?;
    if pending.is_some() {
        return Err(AppError::duplicate_pending(target_id));
    }
    Ok(())
}

async fn insert_request<C: ConnectionTrait>(
    db: &C,
    target_kind: TargetKind,
    target_id: Uuid,
    project_id: Uuid,
    reason: String,
    requested_by: Uuid,
) -> Result<delete_request::Model> {
    Ok(delete_request::ActiveModel {
        id: Set(Uuid::new_v4()),
        target_kind: Set(target_kind),
        target_id: Set(target_id),
        project_id: Set(project_id),
        reason: Set(reason),
        requested_by: Set(requested_by),
        status: Set(RequestStatus::Pending),
        decision_note: Set(None),
        created_at: Set(now()),
        decided_at: Set(None),
        decided_by: Set(None),
    }
    .insert(db)
    .await?)
}

async fn load_pending<C: ConnectionTrait>(db: &C, request_id: Uuid) -> Result<delete_request::Model> {
    let request = delete_request::Entity::find_by_id(request_id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("delete request {}", request_id)))?;
    if request.status.is_terminal() {
        return Err(AppError::Conflict(format!(
            "delete request {} is already {:?}",
            request_id, request.status
        )));
    }
    Ok(request)
}

async fn decide(
    txn: &DatabaseTransaction,
    request: delete_request::Model,
    status: RequestStatus,
    decided_by: Uuid,
    note: Option<String>,
) -> Result<delete_request::Model> {
    let mut active: delete_request::ActiveModel = request.into();
    active.status = Set(status);
    active.decision_note = Set(note.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()));
    active.decided_at = Set(Some(now()));
    active.decided_by = Set(Some(decided_by));
    Ok(active.update(txn).await?)
}

/// Deletes one file row and returns its blob key.
async fn remove_file(txn: &DatabaseTransaction, file_id: Uuid) -> Result<Vec<String>> {
    let target = find_file(txn, file_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("file {}", file_id)))?;
    match target {
        FileTarget::Deliverable(file) => {
            deliverable_file::Entity::delete_by_id(file.id).exec(txn).await?;
            if file.is_active {
                promote_after_removal(txn, file.stage_id, &file.slot_key).await?;
            }
            Ok(vec![file.blob_key])
        }
        FileTarget::Archive(file) => {
            categorized_file::Entity::delete_by_id(file.id).exec(txn).await?;
            Ok(vec![file.blob_key])
        }
    }
}

/// Deletes the project and everything hanging off it, keeping only the approving request.
async fn remove_project(txn: &DatabaseTransaction, project_id: Uuid, keep_request: Uuid) -> Result<Vec<String>> {
    project::Entity::find_by_id(project_id)
        .one(txn)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("project {}", project_id)))?;

    let deliverables = deliverable_file::Entity::find()
        .filter(deliverable_file::Column::ProjectId.eq(project_id))
        .all(txn)
        .await?;
    let archived = categorized_file::Entity::find()
        .filter(categorized_file::Column::ProjectId.eq(project_id))
        .all(txn)
        .await?;
    let blob_keys: Vec<String> = deliverables
        .into_iter()
        .map(|f| f.blob_key)
        .chain(archived.into_iter().map(|f| f.blob_key))
        .collect();

    let stage_ids: Vec<Uuid> = stage::Entity::find()
        .filter(stage::Column::ProjectId.eq(project_id))
        .all(txn)
        .await?
        .into_iter()
        .map(|s| s.id)
        .collect();

    delete_request::Entity::delete_many()
        .filter(delete_request::Column::ProjectId.eq(project_id))
        .filter(delete_request::Column::Id.ne(keep_request))
        .exec(txn)
        .await?;
    deliverable_file::Entity::delete_many()
        .filter(deliverable_file::Column::ProjectId.eq(project_id))
        .exec(txn)
        .await?;
    categorized_file::Entity::delete_many()
        .filter(categorized_file::Column::ProjectId.eq(project_id))
        .exec(txn)
        .await?;
    deliverable_slot::Entity::delete_many()
        .filter(deliverable_slot::Column::StageId.is_in(stage_ids))
        .exec(txn)
        .await?;
    stage::Entity::delete_many()
        .filter(stage::Column::ProjectId.eq(project_id))
        .exec(txn)
        .await?;
    membership::Entity::delete_many()
        .filter(membership::Column::ProjectId.eq(project_id))
        .exec(txn)
        .await?;
    project::Entity::delete_by_id(project_id).exec(txn).await?;

    Ok(blob_keys)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_reason_is_rejected() {
        assert_eq!(clean_reason("   ").unwrap_err().kind(), "validation");
        assert_eq!(clean_reason(" obsolete ").unwrap(), "obsolete");
    }
}
