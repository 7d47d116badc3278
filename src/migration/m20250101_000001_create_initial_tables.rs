// ABOUTME: Initial migration creating users, projects, stages, slots, files and request tables
// ABOUTME: Unique indexes on version numbers back up the per-slot and per-path write locks

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Users::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Users::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Users::Username).string().not_null().unique_key())
                    .col(ColumnDef::new(Users::FullName).string())
                    .col(ColumnDef::new(Users::Email).string())
                    .col(ColumnDef::new(Users::Initials).string())
                    .col(ColumnDef::new(Users::Role).string().not_null().default("colaborador"))
                    .col(ColumnDef::new(Users::CanCreateProjects).boolean().not_null().default(false))
                    .col(
                        ColumnDef::new(Users::CanAccessTechnicalArchive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(ColumnDef::new(Users::CreatedAt).big_integer().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Projects::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Projects::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Projects::Code).string().not_null().unique_key())
                    .col(ColumnDef::new(Projects::Name).string().not_null())
                    .col(ColumnDef::new(Projects::ProjectType).string().not_null())
                    .col(ColumnDef::new(Projects::OwnerId).uuid().not_null())
                    .col(ColumnDef::new(Projects::CreatedAt).big_integer().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_projects_owner_id")
                            .from(Projects::Table, Projects::OwnerId)
                            .to(Users::Table, Users::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Memberships::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Memberships::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Memberships::ProjectId).uuid().not_null())
                    .col(ColumnDef::new(Memberships::UserId).uuid().not_null())
                    .col(ColumnDef::new(Memberships::Role).string().not_null())
                    .col(ColumnDef::new(Memberships::CreatedAt).big_integer().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_memberships_project_id")
                            .from(Memberships::Table, Memberships::ProjectId)
                            .to(Projects::Table, Projects::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_memberships_user_id")
                            .from(Memberships::Table, Memberships::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .index(
                        Index::create()
                            .name("idx_membership_project_user")
                            .table(Memberships::Table)
                            .col(Memberships::ProjectId)
                            .col(Memberships::UserId)
                            .unique(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Stages::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Stages::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Stages::ProjectId).uuid().not_null())
                    .col(ColumnDef::new(Stages::Code).string().not_null())
                    .col(ColumnDef::new(Stages::Name).string().not_null())
                    .col(ColumnDef::new(Stages::Position).integer().not_null().default(0))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_stages_project_id")
                            .from(Stages::Table, Stages::ProjectId)
                            .to(Projects::Table, Projects::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(DeliverableSlots::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(DeliverableSlots::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(DeliverableSlots::StageId).uuid().not_null())
                    .col(ColumnDef::new(DeliverableSlots::Key).string().not_null())
                    .col(ColumnDef::new(DeliverableSlots::Title).string().not_null())
                    .col(ColumnDef::new(DeliverableSlots::Required).boolean().not_null())
                    .col(ColumnDef::new(DeliverableSlots::Multi).boolean().not_null())
                    .col(ColumnDef::new(DeliverableSlots::AllowedExt).string().not_null())
                    .col(ColumnDef::new(DeliverableSlots::Position).integer().not_null().default(0))
                    .col(ColumnDef::new(DeliverableSlots::OptionalGroup).string())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_deliverable_slots_stage_id")
                            .from(DeliverableSlots::Table, DeliverableSlots::StageId)
                            .to(Stages::Table, Stages::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .index(
                        Index::create()
                            .name("idx_deliverable_slot_key")
                            .table(DeliverableSlots::Table)
                            .col(DeliverableSlots::StageId)
                            .col(DeliverableSlots::Key)
                            .unique(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(DeliverableFiles::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(DeliverableFiles::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(DeliverableFiles::ProjectId).uuid().not_null())
                    .col(ColumnDef::new(DeliverableFiles::StageId).uuid().not_null())
                    .col(ColumnDef::new(DeliverableFiles::SlotKey).string().not_null())
                    .col(ColumnDef::new(DeliverableFiles::Version).integer().not_null())
                    .col(ColumnDef::new(DeliverableFiles::Filename).string().not_null())
                    .col(ColumnDef::new(DeliverableFiles::SizeBytes).big_integer().not_null())
                    .col(ColumnDef::new(DeliverableFiles::ContentType).string())
                    .col(ColumnDef::new(DeliverableFiles::Sha256).string().not_null())
                    .col(ColumnDef::new(DeliverableFiles::BlobKey).string().not_null())
                    .col(ColumnDef::new(DeliverableFiles::UploadedBy).uuid().not_null())
                    .col(ColumnDef::new(DeliverableFiles::UploadedAt).big_integer().not_null())
                    .col(ColumnDef::new(DeliverableFiles::IsActive).boolean().not_null())
                    .col(
                        ColumnDef::new(DeliverableFiles::PendingDelete)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(DeliverableFiles::ChangeReason).string())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_deliverable_files_stage_id")
                            .from(DeliverableFiles::Table, DeliverableFiles::StageId)
                            .to(Stages::Table, Stages::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .index(
                        Index::create()
                            .name("idx_deliverable_file_version_unique")
                            .table(DeliverableFiles::Table)
                            .col(DeliverableFiles::StageId)
                            .col(DeliverableFiles::SlotKey)
                            .col(DeliverableFiles::Version)
                            .unique(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(CategorizedFiles::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(CategorizedFiles::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(CategorizedFiles::ProjectId).uuid().not_null())
                    .col(ColumnDef::new(CategorizedFiles::Path).string().not_null())
                    .col(ColumnDef::new(CategorizedFiles::Filename).string().not_null())
                    .col(ColumnDef::new(CategorizedFiles::Version).integer().not_null())
                    .col(ColumnDef::new(CategorizedFiles::SizeBytes).big_integer().not_null())
                    .col(ColumnDef::new(CategorizedFiles::ContentType).string())
                    .col(ColumnDef::new(CategorizedFiles::Sha256).string().not_null())
                    .col(ColumnDef::new(CategorizedFiles::BlobKey).string().not_null())
                    .col(ColumnDef::new(CategorizedFiles::UploadedBy).uuid().not_null())
                    .col(ColumnDef::new(CategorizedFiles::UploadedAt).big_integer().not_null())
                    .col(
                        ColumnDef::new(CategorizedFiles::PendingDelete)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_categorized_files_project_id")
                            .from(CategorizedFiles::Table, CategorizedFiles::ProjectId)
                            .to(Projects::Table, Projects::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .index(
                        Index::create()
                            .name("idx_categorized_file_version_unique")
                            .table(CategorizedFiles::Table)
                            .col(CategorizedFiles::ProjectId)
                            .col(CategorizedFiles::Path)
                            .col(CategorizedFiles::Version)
                            .unique(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(DeleteRequests::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(DeleteRequests::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(DeleteRequests::TargetKind).string().not_null())
                    .col(ColumnDef::new(DeleteRequests::TargetId).uuid().not_null())
                    .col(ColumnDef::new(DeleteRequests::ProjectId).uuid().not_null())
                    .col(ColumnDef::new(DeleteRequests::Reason).string().not_null())
                    .col(ColumnDef::new(DeleteRequests::RequestedBy).uuid().not_null())
                    .col(ColumnDef::new(DeleteRequests::Status).string().not_null())
                    .col(ColumnDef::new(DeleteRequests::DecisionNote).string())
                    .col(ColumnDef::new(DeleteRequests::CreatedAt).big_integer().not_null())
                    .col(ColumnDef::new(DeleteRequests::DecidedAt).big_integer())
                    .col(ColumnDef::new(DeleteRequests::DecidedBy).uuid())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_delete_requests_target")
                    .table(DeleteRequests::Table)
                    .col(DeleteRequests::TargetId)
                    .col(DeleteRequests::Status)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(RegistrationRequests::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(RegistrationRequests::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(RegistrationRequests::Username).string().not_null())
                    .col(ColumnDef::new(RegistrationRequests::FullName).string())
                    .col(ColumnDef::new(RegistrationRequests::Email).string())
                    .col(ColumnDef::new(RegistrationRequests::Initials).string())
                    .col(
                        ColumnDef::new(RegistrationRequests::WantsCreateProjects)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(RegistrationRequests::CredentialRef).string())
                    .col(ColumnDef::new(RegistrationRequests::Status).string().not_null())
                    .col(ColumnDef::new(RegistrationRequests::Note).string())
                    .col(ColumnDef::new(RegistrationRequests::CreatedAt).big_integer().not_null())
                    .col(ColumnDef::new(RegistrationRequests::DecidedAt).big_integer())
                    .col(ColumnDef::new(RegistrationRequests::DecidedBy).uuid())
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(RegistrationRequests::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(DeleteRequests::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(CategorizedFiles::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(DeliverableFiles::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(DeliverableSlots::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Stages::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Memberships::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Projects::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Users::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
    Username,
    FullName,
    Email,
    Initials,
    Role,
    CanCreateProjects,
    CanAccessTechnicalArchive,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Projects {
    Table,
    Id,
    Code,
    Name,
    ProjectType,
    OwnerId,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Memberships {
    Table,
    Id,
    ProjectId,
    UserId,
    Role,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Stages {
    Table,
    Id,
    ProjectId,
    Code,
    Name,
    Position,
}

#[derive(DeriveIden)]
enum DeliverableSlots {
    Table,
    Id,
    StageId,
    Key,
    Title,
    Required,
    Multi,
    AllowedExt,
    Position,
    OptionalGroup,
}

#[derive(DeriveIden)]
enum DeliverableFiles {
    Table,
    Id,
    ProjectId,
    StageId,
    SlotKey,
    Version,
    Filename,
    SizeBytes,
    ContentType,
    Sha256,
    BlobKey,
    UploadedBy,
    UploadedAt,
    IsActive,
    PendingDelete,
    ChangeReason,
}

#[derive(DeriveIden)]
enum CategorizedFiles {
    Table,
    Id,
    ProjectId,
    Path,
    Filename,
    Version,
    SizeBytes,
    ContentType,
    Sha256,
    BlobKey,
    UploadedBy,
    UploadedAt,
    PendingDelete,
}

#[derive(DeriveIden)]
enum DeleteRequests {
    Table,
    Id,
    TargetKind,
    TargetId,
    ProjectId,
    Reason,
    RequestedBy,
    Status,
    DecisionNote,
    CreatedAt,
    DecidedAt,
    DecidedBy,
}

#[derive(DeriveIden)]
enum RegistrationRequests {
    Table,
    Id,
    Username,
    FullName,
    Email,
    Initials,
    WantsCreateProjects,
    CredentialRef,
    Status,
    Note,
    CreatedAt,
    DecidedAt,
    DecidedBy,
}
