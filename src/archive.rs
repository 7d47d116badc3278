// ABOUTME: Technical archive writes and reads: schema-checked uploads and the rebuilt folder tree
// ABOUTME: Re-uploading a path appends a version, serialised per (project, path)

use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set, TransactionTrait};
use serde::Deserialize;
use uuid::Uuid;

use crate::access::Action;
use crate::entities::{categorized_file, user};
use crate::error::{AppError, Result};
use crate::ledger::IncomingFile;
use crate::locks;
use crate::schema::{CategorySchema, SchemaCatalog};
use crate::storage::{now, Storage};
use crate::tree::{self, ArchiveTree};

/// Where an archive upload should land.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ArchiveTarget {
    pub section: String,
    pub category: String,
    pub subcategory: Option<String>,
    pub subpath: Option<String>,
}

/// Resolves a target to its canonical key-based folder path.
pub fn resolve_target(schema: &CategorySchema, target: &ArchiveTarget) -> Result<String> {
    let mut segments = vec![target.section.trim().to_string(), target.category.trim().to_string()];
    let subcategory = target
        .subcategory
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());
    if let Some(sub) = subcategory {
        segments.push(sub.to_string());
    }
    if let Some(subpath) = &target.subpath {
        segments.extend(tree::split_subpath(subpath));
    }

    let resolved = tree::resolve_path(schema, segments.as_slice())?;
    if let Some(requested) = subcategory {
        if resolved.subcategory.is_none() {
            return Err(AppError::schema_mismatch(format!(
                "unknown subcategory '{}' in category '{}'",
                requested, resolved.category.key
            )));
        }
    }
    Ok(resolved.folder_key())
}

fn archive_schema(schema: &SchemaCatalog, project: &crate::entities::project::Model) -> Result<CategorySchema> {
    schema
        .category_schema(project.project_type)
        .cloned()
        .ok_or_else(|| AppError::Internal(format!("no archive taxonomy for {:?}", project.project_type)))
}

impl Storage {
    pub async fn category_tree(
        &self,
        caller: &user::Model,
        schema: &SchemaCatalog,
        project_id: Uuid,
    ) -> Result<CategorySchema> {
        let project = self.authorize_project(caller, project_id, Action::ViewArchive).await?;
        archive_schema(schema, &project)
    }

    /// Authorisation and path checks that run before the transfer starts.
    pub async fn check_archive_upload(
        &self,
        caller: &user::Model,
        schema: &SchemaCatalog,
        project_id: Uuid,
        target: &ArchiveTarget,
    ) -> Result<String> {
        let project = self.authorize_project(caller, project_id, Action::UploadArchive).await?;
        resolve_target(&archive_schema(schema, &project)?, target)
    }

    pub async fn upload_to_archive(
        &self,
        caller: &user::Model,
        schema: &SchemaCatalog,
        project_id: Uuid,
        target: &ArchiveTarget,
        file: IncomingFile,
    ) -> Result<categorized_file::Model> {
        let folder = self.check_archive_upload(caller, schema, project_id, target).await?;
        let filename = tree::clean_filename(&file.filename)?;
        let path = format!("{}/{}", folder, filename);

        let _guard = self.locks.lock(locks::archive_key(project_id, &path)).await;
        let txn = self.db.begin().await?;

        let latest = categorized_file::Entity::find()
            .filter(categorized_file::Column::ProjectId.eq(project_id))
            .filter(categorized_file::Column::Path.eq(path.as_str()))
            .order_by_desc(categorized_file::Column::Version)
            .one(&txn)
            .await?;
        let version = latest.map(|f| f.version).unwrap_or(0) + 1;

        let id = Uuid::new_v4();
        let blob_key = id.to_string();
        let created = categorized_file::ActiveModel {
            id: Set(id),
            project_id: Set(project_id),
            path: Set(path.clone()),
            filename: Set(filename),
            version: Set(version),
            size_bytes: Set(file.blob.size_bytes),
            content_type: Set(file.content_type),
            sha256: Set(file.blob.sha256.clone()),
            blob_key: Set(blob_key.clone()),
            uploaded_by: Set(caller.id),
            uploaded_at: Set(now()),
            pending_delete: Set(false),
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

        tracing::info!(file_id = %created.id, %project_id, %path, version, "archive file recorded");
        Ok(created)
    }

    pub async fn archive_tree(
        &self,
        caller: &user::Model,
        schema: &SchemaCatalog,
        project_id: Uuid,
    ) -> Result<ArchiveTree> {
        let project = self.authorize_project(caller, project_id, Action::ViewArchive).await?;
        let files = categorized_file::Entity::find()
            .filter(categorized_file::Column::ProjectId.eq(project_id))
            .all(&self.db)
            .await?;
        Ok(tree::build_tree(&archive_schema(schema, &project)?, &files))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProjectType;

    fn external() -> CategorySchema {
        SchemaCatalog::builtin()
            .category_schema(ProjectType::External)
            .cloned()
            .unwrap()
    }

    #[test]
    fn test_target_resolves_labels_to_keys() {
        let target = ArchiveTarget {
            section: "Información técnica".into(),
            category: "Datos crudos".into(),
            subcategory: None,
            subpath: Some("campaña 1\\pozo<2>/".into()),
        };
        assert_eq!(resolve_target(&external(), &target).unwrap(), "info/datos_crudos/campaña 1/pozo2");
    }

    #[test]
    fn test_undeclared_subcategory_is_rejected() {
        let target = ArchiveTarget {
            section: "info".into(),
            category: "figuras".into(),
            subcategory: Some("mapas".into()),
            subpath: None,
        };
        let err = resolve_target(&external(), &target).unwrap_err();
        assert_eq!(err.kind(), "validation");
    }

    #[test]
    fn test_category_from_other_type_is_rejected() {
        let target = ArchiveTarget {
            section: "info".into(),
            category: "algoritmos".into(),
            ..Default::default()
        };
        assert!(resolve_target(&external(), &target).is_err());
    }
}
