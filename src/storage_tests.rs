// ABOUTME: Tests for the storage layer against a real SQLite database in a temp dir
// ABOUTME: Covers ledger versioning, moderated deletion, archive paths, listing and registration

#[cfg(test)]
mod tests {
    use super::super::blob::{BlobStore, StagedBlob};
    use super::super::entities::{deliverable_file, project, stage, user};
    use super::super::ledger::IncomingFile;
    use super::super::schema::SchemaCatalog;
    use super::super::storage::*;
    use super::super::types::*;
    use crate::archive::ArchiveTarget;
    use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
    use std::collections::HashSet;
    use tempfile::TempDir;
    use uuid::Uuid;

    async fn create_test_storage() -> (Storage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        use sea_orm::Database;
        use sea_orm_migration::MigratorTrait;

        let db_url = format!("sqlite:{}?mode=rwc", db_path.display());
        let db = Database::connect(&db_url).await.unwrap();

        // Run migrations
        crate::migration::Migrator::up(&db, None).await.unwrap();

        let blobs = BlobStore::open(temp_dir.path().join("blobs"), 1024 * 1024)
            .await
            .unwrap();
        (Storage::from_parts(db, blobs), temp_dir)
    }

    async fn create_user(storage: &Storage, name: &str, role: GlobalRole) -> user::Model {
        insert_user(
            &storage.db,
            NewUser {
                username: name.to_string(),
                full_name: None,
                email: None,
                initials: None,
                role,
                can_create_projects: true,
                can_access_technical_archive: true,
            },
        )
        .await
        .unwrap()
    }

    async fn create_project(storage: &Storage, owner: &user::Model, code: &str) -> project::Model {
        storage
            .create_project(
                owner,
                &SchemaCatalog::builtin(),
                CreateProjectRequest {
                    code: code.to_string(),
                    name: "Presa norte".to_string(),
                    project_type: "externo".to_string(),
                },
            )
            .await
            .unwrap()
    }

    async fn stage_by_code(storage: &Storage, project_id: Uuid, code: &str) -> stage::Model {
        storage
            .stages(project_id)
            .await
            .unwrap()
            .into_iter()
            .find(|s| s.code == code)
            .unwrap()
    }

    async fn staged(storage: &Storage, bytes: &[u8]) -> StagedBlob {
        let mut writer = storage.blobs.begin().await.unwrap();
        writer.write_chunk(bytes).await.unwrap();
        writer.finish().await.unwrap()
    }

    async fn incoming(storage: &Storage, filename: &str) -> IncomingFile {
        IncomingFile {
            filename: filename.to_string(),
            content_type: Some("application/pdf".to_string()),
            blob: staged(storage, filename.as_bytes()).await,
        }
    }

    async fn slot_files(storage: &Storage, stage_id: Uuid, key: &str) -> Vec<deliverable_file::Model> {
        deliverable_file::Entity::find()
            .filter(deliverable_file::Column::StageId.eq(stage_id))
            .filter(deliverable_file::Column::SlotKey.eq(key))
            .all(&storage.db)
            .await
            .unwrap()
    }

    const SINGLE: &str = "solicitud_servicio_dirigida_dg";
    const MULTI: &str = "comunicacion_con_cliente";

    #[tokio::test]
    async fn test_create_project_seeds_dossier() {
        let (storage, _temp_dir) = create_test_storage().await;
        let owner = create_user(&storage, "owner", GlobalRole::Colaborador).await;
        let project = create_project(&storage, &owner, "ee0001  imta").await;

        assert_eq!(project.code, "EE0001 IMTA");
        let codes: Vec<String> = storage
            .stages(project.id)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.code)
            .collect();
        assert_eq!(codes, vec!["E1", "E2", "E3", "E4", "E5"]);

        let snapshot = storage.dossier_snapshot(&owner, project.id).await.unwrap();
        assert_eq!(snapshot.stages[2].slots.len(), 12);
        assert_eq!(snapshot.percent, 0);
    }

    #[tokio::test]
    async fn test_project_creation_rules() {
        let (storage, _temp_dir) = create_test_storage().await;
        let owner = create_user(&storage, "owner", GlobalRole::Colaborador).await;
        create_project(&storage, &owner, "EE0001 ABC").await;

        let duplicate = storage
            .create_project(
                &owner,
                &SchemaCatalog::builtin(),
                CreateProjectRequest {
                    code: "EE0001 ABC".to_string(),
                    name: "Otro".to_string(),
                    project_type: "externo".to_string(),
                },
            )
            .await;
        assert_eq!(duplicate.unwrap_err().kind(), "conflict");

        let mut limited = create_user(&storage, "limited", GlobalRole::Colaborador).await;
        limited.can_create_projects = false;
        let denied = storage
            .create_project(
                &limited,
                &SchemaCatalog::builtin(),
                CreateProjectRequest {
                    code: "EI0002 ABC".to_string(),
                    name: "Interno".to_string(),
                    project_type: "interno".to_string(),
                },
            )
            .await;
        assert_eq!(denied.unwrap_err().kind(), "authorization");
    }

    #[tokio::test]
    async fn test_non_multi_slot_keeps_single_active_version() {
        let (storage, _temp_dir) = create_test_storage().await;
        let owner = create_user(&storage, "owner", GlobalRole::Colaborador).await;
        let project = create_project(&storage, &owner, "EE0001 ABC").await;
        let e1 = stage_by_code(&storage, project.id, "E1").await;

        let first = storage
            .upload_version(&owner, project.id, e1.id, SINGLE, incoming(&storage, "v1.pdf").await, None)
            .await
            .unwrap();
        assert_eq!(first.version, 1);
        assert!(first.is_active);

        // Replacing without a reason is refused and leaves the ledger alone.
        let err = storage
            .upload_version(&owner, project.id, e1.id, SINGLE, incoming(&storage, "v2.pdf").await, Some("  ".into()))
            .await
            .unwrap_err();
        assert!(err.message().contains("reason required"));
        assert_eq!(slot_files(&storage, e1.id, SINGLE).await.len(), 1);

        let second = storage
            .upload_version(
                &owner,
                project.id,
                e1.id,
                SINGLE,
                incoming(&storage, "v2.pdf").await,
                Some("firma actualizada".into()),
            )
            .await
            .unwrap();
        assert_eq!(second.version, 2);
        assert_eq!(second.change_reason.as_deref(), Some("firma actualizada"));

        let files = slot_files(&storage, e1.id, SINGLE).await;
        let active: Vec<_> = files.iter().filter(|f| f.is_active).collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, second.id);
        assert!(storage.blobs.exists(&second.blob_key).await);

        let listed = storage.list_slot(&owner, project.id, e1.id, SINGLE).await.unwrap();
        assert_eq!(listed.iter().map(|f| f.version).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_multi_slot_appends_without_deactivating() {
        let (storage, _temp_dir) = create_test_storage().await;
        let owner = create_user(&storage, "owner", GlobalRole::Colaborador).await;
        let project = create_project(&storage, &owner, "EE0001 ABC").await;
        let e1 = stage_by_code(&storage, project.id, "E1").await;

        for name in ["minuta1.pdf", "minuta2.pdf", "minuta3.pdf"] {
            storage
                .upload_version(&owner, project.id, e1.id, MULTI, incoming(&storage, name).await, None)
                .await
                .unwrap();
        }
        let files = slot_files(&storage, e1.id, MULTI).await;
        assert_eq!(files.len(), 3);
        assert!(files.iter().all(|f| f.is_active));
    }

    #[tokio::test]
    async fn test_disallowed_extension_is_rejected() {
        let (storage, _temp_dir) = create_test_storage().await;
        let owner = create_user(&storage, "owner", GlobalRole::Colaborador).await;
        let project = create_project(&storage, &owner, "EE0001 ABC").await;
        let e1 = stage_by_code(&storage, project.id, "E1").await;

        let err = storage
            .upload_version(&owner, project.id, e1.id, SINGLE, incoming(&storage, "carta.docx").await, None)
            .await
            .unwrap_err();
        assert_eq!(err.message(), "unsupported extension: .docx");
        assert!(slot_files(&storage, e1.id, SINGLE).await.is_empty());

        let missing = storage
            .upload_version(&owner, project.id, e1.id, "no_such_slot", incoming(&storage, "a.pdf").await, None)
            .await
            .unwrap_err();
        assert_eq!(missing.kind(), "not_found");
    }

    #[tokio::test]
    async fn test_concurrent_uploads_never_share_a_version() {
        let (storage, _temp_dir) = create_test_storage().await;
        let owner = create_user(&storage, "owner", GlobalRole::Colaborador).await;
        let project = create_project(&storage, &owner, "EE0001 ABC").await;
        let e1 = stage_by_code(&storage, project.id, "E1").await;

        let (project_id, stage_id) = (project.id, e1.id);
        let mut handles = Vec::new();
        for i in 0..6 {
            let storage = storage.clone();
            let owner = owner.clone();
            let file = incoming(&storage, &format!("copia{}.pdf", i)).await;
            handles.push(tokio::spawn(async move {
                storage
                    .upload_version(&owner, project_id, stage_id, SINGLE, file, Some("reemplazo".into()))
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let files = slot_files(&storage, e1.id, SINGLE).await;
        let versions: HashSet<i32> = files.iter().map(|f| f.version).collect();
        assert_eq!(versions.len(), 6);
        assert_eq!(versions, (1..=6).collect());
        assert_eq!(files.iter().filter(|f| f.is_active).count(), 1);
        let active = files.iter().find(|f| f.is_active).unwrap();
        assert_eq!(active.version, 6);
    }

    #[tokio::test]
    async fn test_approving_active_version_promotes_previous() {
        let (storage, _temp_dir) = create_test_storage().await;
        let admin = create_user(&storage, "admin", GlobalRole::Admin).await;
        let owner = create_user(&storage, "owner", GlobalRole::Colaborador).await;
        let project = create_project(&storage, &owner, "EE0001 ABC").await;
        let e1 = stage_by_code(&storage, project.id, "E1").await;

        let v1 = storage
            .upload_version(&owner, project.id, e1.id, SINGLE, incoming(&storage, "v1.pdf").await, None)
            .await
            .unwrap();
        let v2 = storage
            .upload_version(&owner, project.id, e1.id, SINGLE, incoming(&storage, "v2.pdf").await, Some("nueva".into()))
            .await
            .unwrap();

        let request = storage.request_file_deletion(&owner, v2.id, "subido por error").await.unwrap();
        assert_eq!(request.status, RequestStatus::Pending);
        let flagged = deliverable_file::Entity::find_by_id(v2.id).one(&storage.db).await.unwrap().unwrap();
        assert!(flagged.pending_delete);

        let approved = storage
            .approve_delete_request(&admin, request.id, Some("ok".into()))
            .await
            .unwrap();
        assert_eq!(approved.status, RequestStatus::Approved);
        assert_eq!(approved.decided_by, Some(admin.id));
        assert!(!storage.blobs.exists(&v2.blob_key).await);

        let files = slot_files(&storage, e1.id, SINGLE).await;
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].id, v1.id);
        assert!(files[0].is_active);

        // Removing the last version leaves the slot empty.
        let request = storage.request_file_deletion(&owner, v1.id, "limpieza").await.unwrap();
        storage.approve_delete_request(&admin, request.id, None).await.unwrap();
        assert!(slot_files(&storage, e1.id, SINGLE).await.is_empty());

        // A decided request cannot be decided again.
        let again = storage.reject_delete_request(&admin, request.id, None).await.unwrap_err();
        assert_eq!(again.kind(), "conflict");
    }

    #[tokio::test]
    async fn test_rejected_request_leaves_file_intact() {
        let (storage, _temp_dir) = create_test_storage().await;
        let admin = create_user(&storage, "admin", GlobalRole::Admin).await;
        let owner = create_user(&storage, "owner", GlobalRole::Colaborador).await;
        let project = create_project(&storage, &owner, "EE0001 ABC").await;
        let e1 = stage_by_code(&storage, project.id, "E1").await;

        let file = storage
            .upload_version(&owner, project.id, e1.id, SINGLE, incoming(&storage, "v1.pdf").await, None)
            .await
            .unwrap();
        let request = storage.request_file_deletion(&owner, file.id, "duplicado").await.unwrap();

        let rejected = storage
            .reject_delete_request(&admin, request.id, Some("se conserva".into()))
            .await
            .unwrap();
        assert_eq!(rejected.status, RequestStatus::Rejected);
        assert_eq!(rejected.decision_note.as_deref(), Some("se conserva"));

        let kept = deliverable_file::Entity::find_by_id(file.id).one(&storage.db).await.unwrap().unwrap();
        assert!(kept.is_active);
        assert!(!kept.pending_delete);
        assert!(storage.blobs.exists(&kept.blob_key).await);

        // The file can be requested again after a rejection.
        storage.request_file_deletion(&owner, file.id, "ahora sí").await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_request_validation() {
        let (storage, _temp_dir) = create_test_storage().await;
        let owner = create_user(&storage, "owner", GlobalRole::Colaborador).await;
        let project = create_project(&storage, &owner, "EE0001 ABC").await;
        let e1 = stage_by_code(&storage, project.id, "E1").await;
        let file = storage
            .upload_version(&owner, project.id, e1.id, SINGLE, incoming(&storage, "v1.pdf").await, None)
            .await
            .unwrap();

        let blank = storage.request_file_deletion(&owner, file.id, "   ").await.unwrap_err();
        assert_eq!(blank.kind(), "validation");

        let unknown = storage
            .request_file_deletion(&owner, Uuid::new_v4(), "motivo")
            .await
            .unwrap_err();
        assert_eq!(unknown.kind(), "not_found");

        storage.request_file_deletion(&owner, file.id, "motivo").await.unwrap();
        let duplicate = storage.request_file_deletion(&owner, file.id, "otra vez").await.unwrap_err();
        assert_eq!(duplicate.kind(), "conflict");

        // Only admins decide.
        let pending = storage
            .list_delete_requests(&owner, None)
            .await
            .unwrap_err();
        assert_eq!(pending.kind(), "authorization");
    }

    #[tokio::test]
    async fn test_viewer_reads_but_cannot_write() {
        let (storage, _temp_dir) = create_test_storage().await;
        let owner = create_user(&storage, "owner", GlobalRole::Colaborador).await;
        let viewer = create_user(&storage, "viewer", GlobalRole::Colaborador).await;
        let project = create_project(&storage, &owner, "EE0001 ABC").await;
        let e1 = stage_by_code(&storage, project.id, "E1").await;
        let file = storage
            .upload_version(&owner, project.id, e1.id, SINGLE, incoming(&storage, "v1.pdf").await, None)
            .await
            .unwrap();

        storage
            .upsert_member(&owner, project.id, UpsertMemberRequest { user_id: viewer.id, role: "viewer".into() })
            .await
            .unwrap();

        assert!(storage.dossier_snapshot(&viewer, project.id).await.is_ok());
        assert!(storage.archive_tree(&viewer, &SchemaCatalog::builtin(), project.id).await.is_ok());
        let listing = storage
            .list_files(&viewer, project.id, ListFilesQuery::default())
            .await
            .unwrap();
        assert_eq!(listing.items.len(), 1);

        let upload = storage
            .upload_version(&viewer, project.id, e1.id, MULTI, incoming(&storage, "x.pdf").await, None)
            .await
            .unwrap_err();
        assert_eq!(upload.kind(), "authorization");
        let request = storage.request_file_deletion(&viewer, file.id, "motivo").await.unwrap_err();
        assert_eq!(request.kind(), "authorization");
        let project_request = storage
            .request_project_deletion(&viewer, project.id, "motivo")
            .await
            .unwrap_err();
        assert_eq!(project_request.kind(), "authorization");
    }

    #[tokio::test]
    async fn test_outsider_sees_nothing() {
        let (storage, _temp_dir) = create_test_storage().await;
        let owner = create_user(&storage, "owner", GlobalRole::Colaborador).await;
        let outsider = create_user(&storage, "outsider", GlobalRole::Colaborador).await;
        let auditor = create_user(&storage, "auditor", GlobalRole::Auditor).await;
        let project = create_project(&storage, &owner, "EE0001 ABC").await;

        assert!(storage.list_projects(&outsider).await.unwrap().is_empty());
        assert_eq!(storage.list_projects(&auditor).await.unwrap().len(), 1);
        assert_eq!(storage.list_projects(&owner).await.unwrap().len(), 1);

        let denied = storage.dossier_snapshot(&outsider, project.id).await.unwrap_err();
        assert_eq!(denied.kind(), "authorization");
        assert!(storage.dossier_snapshot(&auditor, project.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_membership_management() {
        let (storage, _temp_dir) = create_test_storage().await;
        let owner = create_user(&storage, "owner", GlobalRole::Colaborador).await;
        let member = create_user(&storage, "member", GlobalRole::Colaborador).await;
        let project = create_project(&storage, &owner, "EE0001 ABC").await;

        let members = storage
            .upsert_member(&owner, project.id, UpsertMemberRequest { user_id: member.id, role: "uploader".into() })
            .await
            .unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].username, "member");

        let members = storage
            .upsert_member(&owner, project.id, UpsertMemberRequest { user_id: member.id, role: "manager".into() })
            .await
            .unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].role, MemberRole::Manager);

        // Managers see members but cannot change them.
        assert!(storage.list_members(&member, project.id).await.is_ok());
        let denied = storage.remove_member(&member, project.id, member.id).await.unwrap_err();
        assert_eq!(denied.kind(), "authorization");

        let owner_role = storage
            .upsert_member(&owner, project.id, UpsertMemberRequest { user_id: member.id, role: "owner".into() })
            .await
            .unwrap_err();
        assert_eq!(owner_role.kind(), "validation");

        storage.remove_member(&owner, project.id, member.id).await.unwrap();
        assert!(storage.list_members(&owner, project.id).await.unwrap().is_empty());
        assert_eq!(
            storage.remove_member(&owner, project.id, member.id).await.unwrap_err().kind(),
            "not_found"
        );
    }

    #[tokio::test]
    async fn test_archive_upload_versions_and_tree() {
        let (storage, _temp_dir) = create_test_storage().await;
        let owner = create_user(&storage, "owner", GlobalRole::Colaborador).await;
        let project = create_project(&storage, &owner, "EE0001 ABC").await;
        let schema = SchemaCatalog::builtin();
        let target = ArchiveTarget {
            section: "info".into(),
            category: "Ensayos de laboratorio".into(),
            subcategory: None,
            subpath: Some("campaña 1/probetas".into()),
        };

        let first = storage
            .upload_to_archive(&owner, &schema, project.id, &target, incoming(&storage, "resumen.pdf").await)
            .await
            .unwrap();
        let second = storage
            .upload_to_archive(&owner, &schema, project.id, &target, incoming(&storage, "resumen.pdf").await)
            .await
            .unwrap();
        assert_eq!(first.path, "info/ensayos/campaña 1/probetas/resumen.pdf");
        assert_eq!((first.version, second.version), (1, 2));

        let bad = ArchiveTarget {
            section: "info".into(),
            category: "inexistente".into(),
            ..Default::default()
        };
        let err = storage
            .upload_to_archive(&owner, &schema, project.id, &bad, incoming(&storage, "x.pdf").await)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "validation");

        let tree = storage.archive_tree(&owner, &schema, project.id).await.unwrap();
        let node = tree.node("info/ensayos/campaña 1/probetas").unwrap();
        assert_eq!(node.files.len(), 2);
        assert!(tree.node("info/figuras").unwrap().files.is_empty());
    }

    #[tokio::test]
    async fn test_archive_needs_capability() {
        let (storage, _temp_dir) = create_test_storage().await;
        let mut owner = create_user(&storage, "owner", GlobalRole::Colaborador).await;
        let project = create_project(&storage, &owner, "EE0001 ABC").await;
        owner.can_access_technical_archive = false;

        let err = storage
            .archive_tree(&owner, &SchemaCatalog::builtin(), project.id)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "authorization");
        assert!(storage.dossier_snapshot(&owner, project.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_list_files_filters_and_pages() {
        let (storage, _temp_dir) = create_test_storage().await;
        let owner = create_user(&storage, "owner", GlobalRole::Colaborador).await;
        let project = create_project(&storage, &owner, "EE0001 ABC").await;
        let e1 = stage_by_code(&storage, project.id, "E1").await;
        for name in ["Minuta-A.pdf", "minuta-b.pdf", "acta.pdf"] {
            storage
                .upload_version(&owner, project.id, e1.id, MULTI, incoming(&storage, name).await, None)
                .await
                .unwrap();
        }
        let target = ArchiveTarget {
            section: "info".into(),
            category: "figuras".into(),
            ..Default::default()
        };
        storage
            .upload_to_archive(&owner, &SchemaCatalog::builtin(), project.id, &target, incoming(&storage, "minuta-plot.pdf").await)
            .await
            .unwrap();

        let all = storage.list_files(&owner, project.id, ListFilesQuery::default()).await.unwrap();
        assert_eq!(all.items.len(), 4);
        assert_eq!(all.limit, 50);

        let matching = storage
            .list_files(&owner, project.id, ListFilesQuery { q: Some("MINUTA".into()), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(matching.items.len(), 3);

        let by_stage = storage
            .list_files(&owner, project.id, ListFilesQuery { stage_id: Some(e1.id), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(by_stage.items.len(), 3);
        assert!(by_stage.items.iter().all(|i| i.stage.as_ref().map(|s| s.code.as_str()) == Some("E1")));

        let in_folder = storage
            .list_files(&owner, project.id, ListFilesQuery { path: Some("/info/figuras/".into()), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(in_folder.items.len(), 1);
        assert_eq!(in_folder.items[0].path.as_deref(), Some("info/figuras/minuta-plot.pdf"));

        let both = storage
            .list_files(
                &owner,
                project.id,
                ListFilesQuery { stage_id: Some(e1.id), path: Some("info".into()), ..Default::default() },
            )
            .await
            .unwrap_err();
        assert_eq!(both.kind(), "validation");

        let page = storage
            .list_files(&owner, project.id, ListFilesQuery { limit: Some(2), offset: Some(3), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(page.items.len(), 1);

        let too_big = storage
            .list_files(&owner, project.id, ListFilesQuery { limit: Some(500), ..Default::default() })
            .await
            .unwrap_err();
        assert_eq!(too_big.kind(), "validation");

        let past_end = storage
            .list_files(&owner, project.id, ListFilesQuery { offset: Some(1_000), ..Default::default() })
            .await
            .unwrap();
        assert!(past_end.items.is_empty());

        let far = storage
            .list_files(&owner, project.id, ListFilesQuery { offset: Some(u64::MAX), ..Default::default() })
            .await
            .unwrap_err();
        assert_eq!(far.kind(), "validation");
    }

    #[tokio::test]
    async fn test_list_files_matches_text_literally() {
        let (storage, _temp_dir) = create_test_storage().await;
        let owner = create_user(&storage, "owner", GlobalRole::Colaborador).await;
        let project = create_project(&storage, &owner, "EE0001 ABC").await;
        let schema = SchemaCatalog::builtin();
        let e1 = stage_by_code(&storage, project.id, "E1").await;
        for name in ["acta.pdf", "minuta.pdf", "acta_ñandú.pdf"] {
            storage
                .upload_version(&owner, project.id, e1.id, MULTI, incoming(&storage, name).await, None)
                .await
                .unwrap();
        }
        for (folder, name) in [("a_b", "x.pdf"), ("aXb", "y.pdf")] {
            let target = ArchiveTarget {
                section: "info".into(),
                category: "figuras".into(),
                subcategory: None,
                subpath: Some(folder.into()),
            };
            storage
                .upload_to_archive(&owner, &schema, project.id, &target, incoming(&storage, name).await)
                .await
                .unwrap();
        }

        let search = |q: &str| ListFilesQuery { q: Some(q.into()), ..Default::default() };
        let underscore = storage.list_files(&owner, project.id, search("_")).await.unwrap();
        assert_eq!(underscore.items.len(), 1);
        assert_eq!(underscore.items[0].filename, "acta_ñandú.pdf");

        let percent = storage.list_files(&owner, project.id, search("%")).await.unwrap();
        assert!(percent.items.is_empty());

        let accented = storage.list_files(&owner, project.id, search("ACTA_ÑANDÚ")).await.unwrap();
        assert_eq!(accented.items.len(), 1);

        let folder = storage
            .list_files(&owner, project.id, ListFilesQuery { path: Some("info/figuras/a_b".into()), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(folder.items.len(), 1);
        assert_eq!(folder.items[0].path.as_deref(), Some("info/figuras/a_b/x.pdf"));
    }

    #[tokio::test]
    async fn test_admin_adds_ad_hoc_stage() {
        let (storage, _temp_dir) = create_test_storage().await;
        let admin = create_user(&storage, "admin", GlobalRole::Admin).await;
        let owner = create_user(&storage, "owner", GlobalRole::Colaborador).await;
        let project = create_project(&storage, &owner, "EE0001 ABC").await;
        let request = |code: &str, position: Option<i32>| CreateStageRequest {
            code: code.into(),
            name: "Seguimiento".into(),
            position,
        };

        let err = storage.add_stage(&owner, project.id, request("E6", None)).await.unwrap_err();
        assert_eq!(err.kind(), "authorization");

        let created = storage.add_stage(&admin, project.id, request(" e6 ", None)).await.unwrap();
        assert_eq!(created.code, "E6");
        assert_eq!(created.position, 6);

        let dup = storage.add_stage(&admin, project.id, request("E6", Some(9))).await.unwrap_err();
        assert_eq!(dup.kind(), "conflict");
        let blank = storage.add_stage(&admin, project.id, request("  ", None)).await.unwrap_err();
        assert_eq!(blank.kind(), "validation");

        let stages = storage.list_stages(&owner, project.id).await.unwrap();
        assert_eq!(stages.len(), 6);
        assert_eq!(stages.last().map(|s| s.code.as_str()), Some("E6"));

        // A stage without slots has no required work and leaves the project percent alone.
        let report = storage.progress_report(&owner, project.id).await.unwrap();
        assert_eq!(report.stages.len(), 6);
        assert_eq!(report.percent, 0);
    }

    #[tokio::test]
    async fn test_progress_follows_uploads() {
        let (storage, _temp_dir) = create_test_storage().await;
        let owner = create_user(&storage, "owner", GlobalRole::Colaborador).await;
        let project = create_project(&storage, &owner, "EE0001 ABC").await;
        let e1 = stage_by_code(&storage, project.id, "E1").await;

        storage
            .upload_version(&owner, project.id, e1.id, SINGLE, incoming(&storage, "v1.pdf").await, None)
            .await
            .unwrap();
        let report = storage.progress_report(&owner, project.id).await.unwrap();
        assert_eq!(report.stages[0].progress.percent, 50);
        // 50 + 0 + 0 + 0 + 0 over five stages.
        assert_eq!(report.percent, 10);

        storage
            .upload_version(&owner, project.id, e1.id, MULTI, incoming(&storage, "m.pdf").await, None)
            .await
            .unwrap();
        let snapshot = storage.dossier_snapshot(&owner, project.id).await.unwrap();
        assert_eq!(snapshot.stages[0].progress.percent, 100);
        assert!(snapshot.stages[0].slots.iter().all(|s| s.done));
        assert_eq!(snapshot.percent, 20);
    }

    #[tokio::test]
    async fn test_bulk_delete_reports_per_item() {
        let (storage, _temp_dir) = create_test_storage().await;
        let owner = create_user(&storage, "owner", GlobalRole::Colaborador).await;
        let project = create_project(&storage, &owner, "EE0001 ABC").await;
        let e1 = stage_by_code(&storage, project.id, "E1").await;
        let file = storage
            .upload_version(&owner, project.id, e1.id, MULTI, incoming(&storage, "a.pdf").await, None)
            .await
            .unwrap();
        let stranger = Uuid::new_v4();

        let results = storage
            .request_bulk_file_deletion(&owner, project.id, &[file.id, stranger, file.id], "depuración")
            .await
            .unwrap();
        assert_eq!(results.len(), 3);
        assert!(results[0].result.is_some());
        assert_eq!(results[1].error.as_ref().unwrap().kind, "not_found");
        assert_eq!(results[2].error.as_ref().unwrap().kind, "conflict");
    }

    #[tokio::test]
    async fn test_project_deletion_removes_everything() {
        let (storage, _temp_dir) = create_test_storage().await;
        let admin = create_user(&storage, "admin", GlobalRole::Admin).await;
        let owner = create_user(&storage, "owner", GlobalRole::Colaborador).await;
        let member = create_user(&storage, "member", GlobalRole::Colaborador).await;
        let project = create_project(&storage, &owner, "EE0001 ABC").await;
        let e1 = stage_by_code(&storage, project.id, "E1").await;
        storage
            .upsert_member(&owner, project.id, UpsertMemberRequest { user_id: member.id, role: "uploader".into() })
            .await
            .unwrap();
        let file = storage
            .upload_version(&member, project.id, e1.id, MULTI, incoming(&storage, "a.pdf").await, None)
            .await
            .unwrap();
        storage.request_file_deletion(&member, file.id, "sobra").await.unwrap();

        let member_try = storage
            .request_project_deletion(&member, project.id, "cerrar")
            .await
            .unwrap_err();
        assert_eq!(member_try.kind(), "authorization");

        let request = storage.request_project_deletion(&owner, project.id, "cancelado").await.unwrap();
        storage.approve_delete_request(&admin, request.id, None).await.unwrap();

        assert_eq!(storage.get_project(project.id).await.unwrap_err().kind(), "not_found");
        assert!(storage.stages(project.id).await.unwrap().is_empty());
        assert!(!storage.blobs.exists(&file.blob_key).await);
        let remaining = storage.list_delete_requests(&admin, None).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, request.id);
        assert_eq!(remaining[0].status, RequestStatus::Approved);
    }

    #[tokio::test]
    async fn test_registration_flow() {
        let (storage, _temp_dir) = create_test_storage().await;
        let admin = create_user(&storage, "admin", GlobalRole::Admin).await;

        let form = || RegistrationForm {
            username: "ana".into(),
            full_name: Some("Ana Pérez".into()),
            email: None,
            initials: Some("ap".into()),
            want_create: true,
            credential_ref: None,
        };
        let request = storage.request_registration(form()).await.unwrap();
        assert_eq!(request.status, RequestStatus::Pending);
        assert_eq!(storage.request_registration(form()).await.unwrap_err().kind(), "conflict");

        let created = storage.approve_registration(&admin, request.id, None).await.unwrap();
        assert_eq!(created.username, "ana");
        assert_eq!(created.role, GlobalRole::Colaborador);
        assert!(created.can_create_projects);
        assert_eq!(created.initials.as_deref(), Some("AP"));

        // Username now exists.
        assert_eq!(storage.request_registration(form()).await.unwrap_err().kind(), "conflict");
        let blank = storage
            .request_registration(RegistrationForm { username: " ".into(), ..form() })
            .await
            .unwrap_err();
        assert_eq!(blank.kind(), "validation");
    }

    #[tokio::test]
    async fn test_registration_for_taken_username_is_closed() {
        let (storage, _temp_dir) = create_test_storage().await;
        let admin = create_user(&storage, "admin", GlobalRole::Admin).await;
        let request = storage
            .request_registration(RegistrationForm {
                username: "luis".into(),
                full_name: None,
                email: None,
                initials: None,
                want_create: false,
                credential_ref: None,
            })
            .await
            .unwrap();
        create_user(&storage, "luis", GlobalRole::Colaborador).await;

        let err = storage.approve_registration(&admin, request.id, None).await.unwrap_err();
        assert_eq!(err.kind(), "conflict");
        let closed = storage
            .list_registrations(&admin, Some(RequestStatus::Rejected))
            .await
            .unwrap();
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].note.as_deref(), Some("duplicate: user already exists"));
    }

    #[tokio::test]
    async fn test_bootstrap_admin_only_on_empty_table() {
        let (storage, _temp_dir) = create_test_storage().await;
        let admin = storage.ensure_bootstrap_admin("root").await.unwrap().unwrap();
        assert_eq!(admin.role, GlobalRole::Admin);
        assert!(storage.ensure_bootstrap_admin("other").await.unwrap().is_none());
        assert!(storage.find_user_by_username("other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_user_administration() {
        let (storage, _temp_dir) = create_test_storage().await;
        let admin = create_user(&storage, "admin", GlobalRole::Admin).await;
        let plain = create_user(&storage, "plain", GlobalRole::Colaborador).await;

        let created = storage
            .create_user(
                &admin,
                CreateUserRequest {
                    username: "marta".into(),
                    role: None,
                    full_name: None,
                    email: None,
                    initials: None,
                    can_create_projects: false,
                    can_access_technical_archive: true,
                },
            )
            .await
            .unwrap();
        let updated = storage
            .update_user(
                &admin,
                created.id,
                UpdateUserRequest {
                    role: Some(GlobalRole::Auditor),
                    initials: Some("mg".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.role, GlobalRole::Auditor);
        assert_eq!(updated.initials.as_deref(), Some("MG"));

        let found = storage.list_users(&admin, Some("MAR")).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(storage.list_users(&plain, None).await.unwrap_err().kind(), "authorization");
    }
}
