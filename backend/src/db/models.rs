use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::FromRow;

use super::enums::*;
use crate::access::Ownership;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub id: i32,
    pub username: String,
    pub email: Option<String>,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub role: Role,
    pub phone_number: Option<String>,
    pub address: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn ownership(&self) -> Ownership {
        Ownership {
            user_id: Some(self.id),
            user_role: Some(self.role),
            ..Ownership::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Farm {
    pub id: i32,
    pub name: String,
    pub agent_id: i32,
    pub location: String,
    pub size_acres: Decimal,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub agent_username: String,
    pub cow_count: i64,
}

impl Farm {
    pub fn ownership(&self) -> Ownership {
        Ownership {
            farm_id: Some(self.id),
            agent_id: Some(self.agent_id),
            ..Ownership::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Cow {
    pub id: i32,
    pub tag_number: String,
    pub name: Option<String>,
    pub breed: Breed,
    pub farmer_id: i32,
    pub farm_id: i32,
    pub date_of_birth: NaiveDate,
    pub weight_kg: Option<Decimal>,
    pub height_cm: Option<Decimal>,
    pub status: CowStatus,
    pub is_pregnant: bool,
    pub last_breeding_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub farm_name: String,
    pub farm_agent_id: i32,
    pub farmer_username: String,
}

impl Cow {
    pub fn ownership(&self) -> Ownership {
        Ownership {
            farmer_id: Some(self.farmer_id),
            farm_id: Some(self.farm_id),
            agent_id: Some(self.farm_agent_id),
            ..Ownership::default()
        }
    }

    /// Whole years since birth, counting a birthday only once it has passed.
    pub fn age_years(&self, today: NaiveDate) -> i32 {
        let born = self.date_of_birth;
        let mut age = today.year() - born.year();
        if (today.month(), today.day()) < (born.month(), born.day()) {
            age -= 1;
        }
        age
    }

    pub fn view(self, today: NaiveDate) -> CowView {
        CowView {
            age_years: self.age_years(today),
            cow: self,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CowView {
    #[serde(flatten)]
    pub cow: Cow,
    pub age_years: i32,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct MilkRecord {
    pub id: i32,
    pub cow_id: i32,
    pub farmer_id: i32,
    pub farm_id: i32,
    pub date: NaiveDate,
    pub morning_quantity_liters: Decimal,
    pub evening_quantity_liters: Decimal,
    pub total_quantity_liters: Decimal,
    pub fat_percentage: Option<Decimal>,
    pub protein_percentage: Option<Decimal>,
    pub quality_rating: Option<Quality>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub cow_tag: String,
    pub farm_name: String,
    pub farm_agent_id: i32,
}

impl MilkRecord {
    pub fn ownership(&self) -> Ownership {
        Ownership {
            farmer_id: Some(self.farmer_id),
            farm_id: Some(self.farm_id),
            agent_id: Some(self.farm_agent_id),
            ..Ownership::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Activity {
    pub id: i32,
    pub title: String,
    pub activity_type: ActivityType,
    pub cow_id: i32,
    pub scheduled_date: NaiveDate,
    pub scheduled_time: Option<NaiveTime>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: ActivityStatus,
    pub description: Option<String>,
    pub notes: Option<String>,
    pub cost: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub cow_tag: String,
    pub farmer_id: i32,
    pub farm_id: i32,
    pub farm_name: String,
    pub farm_agent_id: i32,
}

impl Activity {
    pub fn ownership(&self) -> Ownership {
        Ownership {
            farmer_id: Some(self.farmer_id),
            farm_id: Some(self.farm_id),
            agent_id: Some(self.farm_agent_id),
            ..Ownership::default()
        }
    }

    pub fn duration_minutes(&self) -> Option<f64> {
        duration_minutes(self.start_time, self.end_time)
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        is_overdue(self.status, self.scheduled_date, self.scheduled_time, now)
    }

    pub fn view(self, now: DateTime<Utc>) -> ActivityView {
        ActivityView {
            duration_minutes: self.duration_minutes(),
            is_overdue: self.is_overdue(now),
            activity: self,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ActivityView {
    #[serde(flatten)]
    pub activity: Activity,
    pub duration_minutes: Option<f64>,
    pub is_overdue: bool,
}

pub fn duration_minutes(
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> Option<f64> {
    match (start, end) {
        (Some(s), Some(e)) => Some((e - s).num_seconds() as f64 / 60.0),
        _ => None,
    }
}

/// Scheduled date and time are read as UTC wall-clock values; a missing time means midnight.
pub fn scheduled_at(date: NaiveDate, time: Option<NaiveTime>) -> DateTime<Utc> {
    NaiveDateTime::new(date, time.unwrap_or(NaiveTime::MIN)).and_utc()
}

pub fn is_overdue(
    status: ActivityStatus,
    date: NaiveDate,
    time: Option<NaiveTime>,
    now: DateTime<Utc>,
) -> bool {
    status == ActivityStatus::Planned && scheduled_at(date, time) < now
}
