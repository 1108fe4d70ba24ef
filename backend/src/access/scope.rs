use sqlx::{Postgres, QueryBuilder};

use crate::db::Role;

use super::{Identity, Ownership};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    User,
    Farm,
    Cow,
    MilkRecord,
    Activity,
}

impl EntityKind {
    pub fn label(&self) -> &'static str {
        match self {
            EntityKind::User => "user",
            EntityKind::Farm => "farm",
            EntityKind::Cow => "cow",
            EntityKind::MilkRecord => "milk record",
            EntityKind::Activity => "activity",
        }
    }

    /// Columns the listing queries expose for each ownership link.
    ///
    /// Queries alias `users u`, `farms f`, `cows c`, `milk_records m` and
    /// `activities a`, always joining through to the owning farm.
    fn columns(&self) -> ScopeColumns {
        match self {
            EntityKind::User => ScopeColumns {
                user: Some("u.id"),
                role: Some("u.role"),
                ..ScopeColumns::default()
            },
            EntityKind::Farm => ScopeColumns {
                agent: Some("f.agent_id"),
                ..ScopeColumns::default()
            },
            EntityKind::Cow => ScopeColumns {
                agent: Some("f.agent_id"),
                farmer: Some("c.farmer_id"),
                ..ScopeColumns::default()
            },
            EntityKind::MilkRecord => ScopeColumns {
                agent: Some("f.agent_id"),
                farmer: Some("m.farmer_id"),
                ..ScopeColumns::default()
            },
            EntityKind::Activity => ScopeColumns {
                agent: Some("f.agent_id"),
                farmer: Some("c.farmer_id"),
                ..ScopeColumns::default()
            },
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct ScopeColumns {
    agent: Option<&'static str>,
    farmer: Option<&'static str>,
    user: Option<&'static str>,
    role: Option<&'static str>,
}

/// Visibility predicate for one identity over one entity kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    All,
    /// Rows on farms managed by this agent.
    ManagedBy(i32),
    /// Rows owned, directly or through the cow, by this farmer.
    OwnedBy(i32),
    /// Identity rows carrying this role.
    RoleIs(Role),
    /// The caller's own identity row.
    SelfOnly(i32),
    Nothing,
}

pub fn visible_rows(identity: &Identity, kind: EntityKind) -> Scope {
    let Some(role) = identity.role else {
        return Scope::Nothing;
    };
    let id = identity.user_id;

    match role {
        Role::SuperAdmin => Scope::All,
        Role::Agent => match kind {
            // Agents see every farmer, not only those on their farms.
            EntityKind::User => Scope::RoleIs(Role::Farmer),
            EntityKind::Farm | EntityKind::Cow | EntityKind::MilkRecord | EntityKind::Activity => {
                Scope::ManagedBy(id)
            }
        },
        Role::Farmer => match kind {
            EntityKind::User => Scope::SelfOnly(id),
            EntityKind::Farm => Scope::Nothing,
            EntityKind::Cow | EntityKind::MilkRecord | EntityKind::Activity => Scope::OwnedBy(id),
        },
    }
}

impl Scope {
    /// Whether a row with this ownership chain falls inside the scope.
    pub fn admits(&self, owner: &Ownership) -> bool {
        match *self {
            Scope::All => true,
            Scope::ManagedBy(agent) => owner.agent_id == Some(agent),
            Scope::OwnedBy(farmer) => owner.farmer_id == Some(farmer),
            Scope::RoleIs(role) => owner.user_role == Some(role),
            Scope::SelfOnly(user) => owner.user_id == Some(user),
            Scope::Nothing => false,
        }
    }

    /// Appends the predicate as a SQL boolean expression.
    ///
    /// A scope that has no column on this entity kind renders as `FALSE`.
    pub fn push_sql(&self, kind: EntityKind, qb: &mut QueryBuilder<'_, Postgres>) {
        let cols = kind.columns();
        match (*self, cols) {
            (Scope::All, _) => {
                qb.push("TRUE");
            }
            (Scope::ManagedBy(agent), ScopeColumns { agent: Some(col), .. }) => {
                qb.push(col).push(" = ").push_bind(agent);
            }
            (Scope::OwnedBy(farmer), ScopeColumns { farmer: Some(col), .. }) => {
                qb.push(col).push(" = ").push_bind(farmer);
            }
            (Scope::RoleIs(role), ScopeColumns { role: Some(col), .. }) => {
                qb.push(col).push(" = ").push_bind(role);
            }
            (Scope::SelfOnly(user), ScopeColumns { user: Some(col), .. }) => {
                qb.push(col).push(" = ").push_bind(user);
            }
            _ => {
                qb.push("FALSE");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KINDS: [EntityKind; 5] = [
        EntityKind::User,
        EntityKind::Farm,
        EntityKind::Cow,
        EntityKind::MilkRecord,
        EntityKind::Activity,
    ];

    fn sql_for(scope: Scope, kind: EntityKind) -> String {
        let mut qb = QueryBuilder::<Postgres>::new("WHERE ");
        scope.push_sql(kind, &mut qb);
        qb.sql().to_string()
    }

    #[test]
    fn super_admin_sees_everything() {
        let admin = Identity::new(1, "root", Role::SuperAdmin);
        for kind in KINDS {
            assert_eq!(visible_rows(&admin, kind), Scope::All);
        }
    }

    #[test]
    fn agent_scopes_by_managed_farm() {
        let agent = Identity::new(5, "g", Role::Agent);
        assert_eq!(visible_rows(&agent, EntityKind::Farm), Scope::ManagedBy(5));
        assert_eq!(visible_rows(&agent, EntityKind::Activity), Scope::ManagedBy(5));
        assert_eq!(visible_rows(&agent, EntityKind::User), Scope::RoleIs(Role::Farmer));
    }

    #[test]
    fn farmer_scopes_by_ownership() {
        let farmer = Identity::new(9, "f", Role::Farmer);
        assert_eq!(visible_rows(&farmer, EntityKind::Cow), Scope::OwnedBy(9));
        assert_eq!(visible_rows(&farmer, EntityKind::MilkRecord), Scope::OwnedBy(9));
        assert_eq!(visible_rows(&farmer, EntityKind::Farm), Scope::Nothing);
        assert_eq!(visible_rows(&farmer, EntityKind::User), Scope::SelfOnly(9));
    }

    #[test]
    fn roleless_identity_sees_nothing() {
        let ghost = Identity {
            user_id: 3,
            username: "ghost".into(),
            role: None,
        };
        for kind in KINDS {
            assert_eq!(visible_rows(&ghost, kind), Scope::Nothing);
        }
    }

    #[test]
    fn farmer_scope_ignores_shared_farms() {
        let on_shared_farm = Ownership::of_cow(10, 1, 5);
        assert!(!Scope::OwnedBy(9).admits(&on_shared_farm));
        assert!(Scope::OwnedBy(10).admits(&on_shared_farm));
    }

    #[test]
    fn agent_scope_ignores_overlapping_farmers() {
        let other_agents_cow = Ownership::of_cow(9, 2, 6);
        assert!(!Scope::ManagedBy(5).admits(&other_agents_cow));
        assert!(Scope::ManagedBy(6).admits(&other_agents_cow));
    }

    #[test]
    fn renders_sql_per_kind() {
        assert_eq!(sql_for(Scope::All, EntityKind::Cow), "WHERE TRUE");
        assert_eq!(sql_for(Scope::ManagedBy(5), EntityKind::Farm), "WHERE f.agent_id = $1");
        assert_eq!(sql_for(Scope::OwnedBy(9), EntityKind::Activity), "WHERE c.farmer_id = $1");
        assert_eq!(sql_for(Scope::OwnedBy(9), EntityKind::MilkRecord), "WHERE m.farmer_id = $1");
        assert_eq!(sql_for(Scope::RoleIs(Role::Farmer), EntityKind::User), "WHERE u.role = $1");
        assert_eq!(sql_for(Scope::SelfOnly(9), EntityKind::User), "WHERE u.id = $1");
    }

    #[test]
    fn mismatched_scope_renders_false() {
        assert_eq!(sql_for(Scope::Nothing, EntityKind::Cow), "WHERE FALSE");
        assert_eq!(sql_for(Scope::OwnedBy(9), EntityKind::Farm), "WHERE FALSE");
    }
}
