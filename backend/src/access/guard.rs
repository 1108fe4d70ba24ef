use crate::db::Role;
use crate::error::{FarmHubError, FarmHubResult};

use super::{visible_rows, EntityKind, Identity, Ownership};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    List,
    Retrieve,
    Create,
    Update,
    Delete,
}

/// Role-level permission, before any row is considered.
fn role_allows(role: Role, kind: EntityKind, op: Operation) -> bool {
    match kind {
        EntityKind::User => match op {
            Operation::Create | Operation::Delete => role == Role::SuperAdmin,
            Operation::List | Operation::Retrieve | Operation::Update => {
                matches!(role, Role::SuperAdmin | Role::Agent)
            }
        },
        EntityKind::Farm => match op {
            Operation::Create => matches!(role, Role::SuperAdmin | Role::Agent),
            Operation::List | Operation::Retrieve | Operation::Update | Operation::Delete => true,
        },
        EntityKind::Cow | EntityKind::MilkRecord | EntityKind::Activity => true,
    }
}

/// Decides allow/deny. With a candidate row the row must also fall inside the
/// caller's scope; super admins always pass that part.
pub fn authorize(
    identity: &Identity,
    kind: EntityKind,
    op: Operation,
    candidate: Option<&Ownership>,
) -> bool {
    let Some(role) = identity.role else {
        return false;
    };
    if !role_allows(role, kind, op) {
        return false;
    }
    match candidate {
        Some(owner) => visible_rows(identity, kind).admits(owner),
        None => true,
    }
}

/// [`authorize`] as an error: a forbidden role is `PermissionDenied`, a row
/// outside scope is `NotFound` so its existence is never revealed.
pub fn enforce(
    identity: &Identity,
    kind: EntityKind,
    op: Operation,
    candidate: Option<&Ownership>,
) -> FarmHubResult<()> {
    if !authorize(identity, kind, op, None) {
        tracing::warn!(
            "user {} denied {:?} on {}",
            identity.user_id,
            op,
            kind.label()
        );
        return Err(FarmHubError::PermissionDenied(format!(
            "You do not have permission to perform this action on {}",
            kind.label()
        )));
    }
    if let Some(owner) = candidate {
        if !authorize(identity, kind, op, Some(owner)) {
            return Err(FarmHubError::NotFound(format!("{} not found", kind.label())));
        }
    }
    Ok(())
}
