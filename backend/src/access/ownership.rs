use crate::db::{DbPool, Role};
use crate::error::FarmHubResult;

use super::EntityKind;

/// Who a row belongs to, resolved once from the leaf entity.
///
/// Activities resolve through their cow, milk records carry farmer and farm
/// directly, and the managing agent always comes from the farm.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Ownership {
    pub farmer_id: Option<i32>,
    pub farm_id: Option<i32>,
    pub agent_id: Option<i32>,
    pub user_id: Option<i32>,
    pub user_role: Option<Role>,
}

impl Ownership {
    pub fn of_cow(farmer_id: i32, farm_id: i32, agent_id: i32) -> Self {
        Self {
            farmer_id: Some(farmer_id),
            farm_id: Some(farm_id),
            agent_id: Some(agent_id),
            ..Self::default()
        }
    }

    pub fn of_farm(farm_id: i32, agent_id: i32) -> Self {
        Self {
            farm_id: Some(farm_id),
            agent_id: Some(agent_id),
            ..Self::default()
        }
    }
}

/// Loads the ownership chain for a single row, or `None` when it does not exist.
pub async fn load(pool: &DbPool, kind: EntityKind, id: i32) -> FarmHubResult<Option<Ownership>> {
    let ownership = match kind {
        EntityKind::User => {
            let row: Option<(i32, Role)> = sqlx::query_as("SELECT id, role FROM users WHERE id = $1")
                .bind(id)
                .fetch_optional(pool)
                .await?;
            row.map(|(user_id, role)| Ownership {
                user_id: Some(user_id),
                user_role: Some(role),
                ..Ownership::default()
            })
        }
        EntityKind::Farm => {
            let row: Option<(i32, i32)> = sqlx::query_as("SELECT id, agent_id FROM farms WHERE id = $1")
                .bind(id)
                .fetch_optional(pool)
                .await?;
            row.map(|(farm_id, agent_id)| Ownership::of_farm(farm_id, agent_id))
        }
        EntityKind::Cow => {
            let row: Option<(i32, i32, i32)> = sqlx::query_as(
                "SELECT c.farmer_id, c.farm_id, f.agent_id
                 FROM cows c JOIN farms f ON f.id = c.farm_id
                 WHERE c.id = $1",
            )
            .bind(id)
            .fetch_optional(pool)
            .await?;
            row.map(|(farmer, farm, agent)| Ownership::of_cow(farmer, farm, agent))
        }
        EntityKind::MilkRecord => {
            let row: Option<(i32, i32, i32)> = sqlx::query_as(
                "SELECT m.farmer_id, m.farm_id, f.agent_id
                 FROM milk_records m JOIN farms f ON f.id = m.farm_id
                 WHERE m.id = $1",
            )
            .bind(id)
            .fetch_optional(pool)
            .await?;
            row.map(|(farmer, farm, agent)| Ownership::of_cow(farmer, farm, agent))
        }
        EntityKind::Activity => {
            let row: Option<(i32, i32, i32)> = sqlx::query_as(
                "SELECT c.farmer_id, c.farm_id, f.agent_id
                 FROM activities a
                 JOIN cows c ON c.id = a.cow_id
                 JOIN farms f ON f.id = c.farm_id
                 WHERE a.id = $1",
            )
            .bind(id)
            .fetch_optional(pool)
            .await?;
            row.map(|(farmer, farm, agent)| Ownership::of_cow(farmer, farm, agent))
        }
    };
    Ok(ownership)
}
