// ABOUTME: Single authority for permission decisions from global role, ownership and membership
// ABOUTME: Resolves one effective Role per (user, project) and checks it against an Action

use serde::Serialize;
use uuid::Uuid;

use crate::entities::user;
use crate::error::{AppError, Result};
use crate::types::{GlobalRole, MemberRole};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Viewer,
    Uploader,
    Manager,
    Owner,
    Admin,
    Auditor,
}

impl From<MemberRole> for Role {
    fn from(role: MemberRole) -> Self {
        match role {
            MemberRole::Viewer => Role::Viewer,
            MemberRole::Uploader => Role::Uploader,
            MemberRole::Manager => Role::Manager,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    ListProjects,
    CreateProject,
    ViewProject,
    ViewDossier,
    ViewArchive,
    UploadDossier,
    UploadArchive,
    RequestFileDeletion,
    RequestProjectDeletion,
    ViewMembers,
    ManageMembers,
    DecideDeleteRequests,
    ManageUsers,
    /// Adding ad hoc stages beyond the seeded dossier.
    ManageStages,
}

impl Action {
    fn is_archive(&self) -> bool {
        matches!(self, Action::ViewArchive | Action::UploadArchive)
    }
}

/// What the resolver needs to know about a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProjectContext {
    pub owner_id: Uuid,
    pub membership: Option<MemberRole>,
}

/// Global admin, then ownership, then membership, then the auditor fallback.
pub fn resolve_role(user: &user::Model, project: Option<&ProjectContext>) -> Option<Role> {
    if user.role == GlobalRole::Admin {
        return Some(Role::Admin);
    }
    let auditor = (user.role == GlobalRole::Auditor).then_some(Role::Auditor);
    match project {
        Some(ctx) if ctx.owner_id == user.id => Some(Role::Owner),
        Some(ctx) => ctx.membership.map(Role::from).or(auditor),
        None => auditor,
    }
}

pub fn can(user: &user::Model, action: Action, project: Option<&ProjectContext>) -> bool {
    let role = resolve_role(user, project);

    match action {
        Action::ListProjects => return true,
        Action::CreateProject => return role == Some(Role::Admin) || user.can_create_projects,
        Action::DecideDeleteRequests | Action::ManageUsers | Action::ManageStages => {
            return role == Some(Role::Admin)
        }
        _ => {}
    }

    // Everything below is project scoped.
    if project.is_none() {
        return false;
    }
    let Some(role) = role else {
        return false;
    };
    if action.is_archive() && role != Role::Admin && !user.can_access_technical_archive {
        return false;
    }

    use Role::*;
    match action {
        Action::ViewProject | Action::ViewDossier | Action::ViewArchive => true,
        Action::UploadDossier | Action::UploadArchive | Action::RequestFileDeletion => {
            matches!(role, Uploader | Manager | Owner | Admin)
        }
        Action::ViewMembers => matches!(role, Manager | Owner | Admin | Auditor),
        Action::ManageMembers | Action::RequestProjectDeletion => matches!(role, Owner | Admin),
        Action::ListProjects
        | Action::CreateProject
        | Action::DecideDeleteRequests
        | Action::ManageUsers
        | Action::ManageStages => false,
    }
}

/// `can` as a `Result`, for call sites that propagate with `?`.
pub fn authorize(user: &user::Model, action: Action, project: Option<&ProjectContext>) -> Result<()> {
    if can(user, action, project) {
        Ok(())
    } else {
        tracing::debug!(user_id = %user.id, ?action, "access denied");
        Err(AppError::Forbidden(format!("{:?} is not allowed for this user", action)))
    }
}
