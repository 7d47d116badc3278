// ABOUTME: Self-service registration requests moderated by admins
// ABOUTME: Approval creates the user account; a username taken in the meantime closes the request

use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set, TransactionTrait};
use uuid::Uuid;

use crate::access::{self, Action};
use crate::entities::{registration_request, user};
use crate::error::{AppError, Result};
use crate::storage::{insert_user, normalize_username, now, NewUser, Storage};
use crate::types::{GlobalRole, RegistrationForm, RequestStatus};

const DUPLICATE_NOTE: &str = "duplicate: user already exists";

impl Storage {
    /// Open to unauthenticated callers; the account only exists after approval.
    pub async fn request_registration(&self, form: RegistrationForm) -> Result<registration_request::Model> {
        let username = normalize_username(&form.username)?;
        if self.find_user_by_username(&username).await?.is_some() {
            return Err(AppError::Conflict(format!("username '{}' already exists", username)));
        }
        let pending = registration_request::Entity::find()
            .filter(registration_request::Column::Username.eq(username.as_str()))
            .filter(registration_request::Column::Status.eq(RequestStatus::Pending))
            .one(&self.db)
            .await?;
        if pending.is_some() {
            return Err(AppError::Conflict(format!(
                "a registration for '{}' is already pending",
                username
            )));
        }

        let created = registration_request::ActiveModel {
            id: Set(Uuid::new_v4()),
            username: Set(username),
            full_name: Set(trimmed(form.full_name)),
            email: Set(trimmed(form.email)),
            initials: Set(trimmed(form.initials).map(|i| i.to_uppercase())),
            wants_create_projects: Set(form.want_create),
            credential_ref: Set(trimmed(form.credential_ref)),
            status: Set(RequestStatus::Pending),
            note: Set(None),
            created_at: Set(now()),
            decided_at: Set(None),
            decided_by: Set(None),
        }
        .insert(&self.db)
        .await?;

        tracing::info!(request_id = %created.id, username = %created.username, "registration requested");
        Ok(created)
    }

    pub async fn list_registrations(
        &self,
        caller: &user::Model,
        status: Option<RequestStatus>,
    ) -> Result<Vec<registration_request::Model>> {
        access::authorize(caller, Action::ManageUsers, None)?;
        let mut select = registration_request::Entity::find();
        if let Some(status) = status {
            select = select.filter(registration_request::Column::Status.eq(status));
        }
        Ok(select
            .order_by_desc(registration_request::Column::CreatedAt)
            .all(&self.db)
            .await?)
    }

    pub async fn approve_registration(
        &self,
        caller: &user::Model,
        request_id: Uuid,
        role: Option<GlobalRole>,
    ) -> Result<user::Model> {
        access::authorize(caller, Action::ManageUsers, None)?;
        let txn = self.db.begin().await?;
        let request = load_pending(&txn, request_id).await?;

        let taken = user::Entity::find()
            .filter(user::Column::Username.eq(request.username.as_str()))
            .one(&txn)
            .await?
            .is_some();
        if taken {
            let username = request.username.clone();
            close(&txn, request, RequestStatus::Rejected, caller.id, Some(DUPLICATE_NOTE.to_string())).await?;
            txn.commit().await?;
            tracing::warn!(%request_id, %username, "registration closed, username already taken");
            return Err(AppError::Conflict(format!("username '{}' already exists", username)));
        }

        let created = insert_user(
            &txn,
            NewUser {
                username: request.username.clone(),
                full_name: request.full_name.clone(),
                email: request.email.clone(),
                initials: request.initials.clone(),
                role: role.unwrap_or(GlobalRole::Colaborador),
                can_create_projects: request.wants_create_projects,
                can_access_technical_archive: true,
            },
        )
        .await?;
        close(&txn, request, RequestStatus::Approved, caller.id, None).await?;
        txn.commit().await?;

        tracing::info!(%request_id, user_id = %created.id, by = %caller.id, "registration approved");
        Ok(created)
    }

    pub async fn reject_registration(
        &self,
        caller: &user::Model,
        request_id: Uuid,
        note: Option<String>,
    ) -> Result<registration_request::Model> {
        access::authorize(caller, Action::ManageUsers, None)?;
        let txn = self.db.begin().await?;
        let request = load_pending(&txn, request_id).await?;
        let closed = close(&txn, request, RequestStatus::Rejected, caller.id, trimmed(note)).await?;
        txn.commit().await?;

        tracing::info!(%request_id, by = %caller.id, "registration rejected");
        Ok(closed)
    }
}

fn trimmed(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

async fn load_pending<C: sea_orm::ConnectionTrait>(
    db: &C,
    request_id: Uuid,
) -> Result<registration_request::Model> {
    let request = registration_request::Entity::find_by_id(request_id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("registration request {}", request_id)))?;
    if request.status.is_terminal() {
        return Err(AppError::Conflict(format!(
            "registration request {} is already {:?}",
            request_id, request.status
        )));
    }
    Ok(request)
}

async fn close<C: sea_orm::ConnectionTrait>(
    db: &C,
    request: registration_request::Model,
    status: RequestStatus,
    decided_by: Uuid,
    note: Option<String>,
) -> Result<registration_request::Model> {
    let mut active: registration_request::ActiveModel = request.into();
    active.status = Set(status);
    active.note = Set(note);
    active.decided_at = Set(Some(now()));
    active.decided_by = Set(Some(decided_by));
    Ok(active.update(db).await?)
}
