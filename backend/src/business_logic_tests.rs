#[cfg(test)]
mod tests {
    use axum::response::IntoResponse;
    use chrono::{NaiveDate, TimeZone, Utc};
    use rust_decimal::Decimal;

    use crate::access::{authorize, enforce, visible_rows, EntityKind, Identity, Operation, Ownership, Scope};
    use crate::commands::cow::ensure_farmer_owns;
    use crate::db::{Breed, Cow, CowStatus, Role};
    use crate::error::{ErrorCode, FarmHubError};
    use crate::validation::activity::{
        normalize_breeding, normalize_calving, BreedingRequest, CalvingRequest, CowEffect, LogTarget,
    };
    use crate::validation::cow::{validate_cow, CowInput, CowRefs};
    use crate::validation::milk::{check_batch_size, validate_daily, DailyContext, ProductionEntry};

    const ADMIN: i32 = 1;
    const FARMER_ONE: i32 = 2;
    const AGENT_ONE: i32 = 3;
    const FARMER_TWO: i32 = 4;
    const AGENT_TWO: i32 = 5;
    const GREEN_VALLEY: i32 = 10;

    fn dec(raw: &str) -> Decimal {
        raw.parse().unwrap()
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn farmer_one() -> Identity {
        Identity::new(FARMER_ONE, "farmer1", Role::Farmer)
    }

    fn agent_one() -> Identity {
        Identity::new(AGENT_ONE, "agent1", Role::Agent)
    }

    /// COW001 on Green Valley Farm, owned by farmer1 and managed by agent1.
    fn cow001() -> Cow {
        Cow {
            id: 100,
            tag_number: "COW001".into(),
            name: Some("Bella".into()),
            breed: Breed::Holstein,
            farmer_id: FARMER_ONE,
            farm_id: GREEN_VALLEY,
            date_of_birth: day(2020, 3, 1),
            weight_kg: Some(dec("550.5")),
            height_cm: None,
            status: CowStatus::Active,
            is_pregnant: true,
            last_breeding_date: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            farm_name: "Green Valley Farm".into(),
            farm_agent_id: AGENT_ONE,
            farmer_username: "farmer1".into(),
        }
    }

    fn entry(morning: &str, evening: &str) -> ProductionEntry {
        ProductionEntry {
            cow_tag: Some("COW001".into()),
            morning_quantity_liters: Some(dec(morning)),
            evening_quantity_liters: Some(dec(evening)),
            quality_rating: Some("good".into()),
            ..ProductionEntry::default()
        }
    }

    fn context(duplicate: bool) -> DailyContext<'static> {
        DailyContext {
            farm_name: Some("Green Valley Farm"),
            date: day(2024, 6, 14),
            today: day(2024, 6, 15),
            duplicate,
        }
    }

    #[test]
    fn daily_record_for_own_cow_is_visible_to_owner_and_managing_agent_only() {
        let cow = cow001();
        let record = validate_daily(&cow, &entry("12.50", "11.80"), context(false)).unwrap();
        assert_eq!(record.total_quantity_liters, dec("24.30"));
        assert_eq!(record.farmer_id, FARMER_ONE);
        assert_eq!(record.farm_id, GREEN_VALLEY);
        assert!(ensure_farmer_owns(&farmer_one(), &cow).is_ok());

        let stored = Ownership::of_cow(record.farmer_id, record.farm_id, cow.farm_agent_id);
        let readers = [
            (Identity::new(ADMIN, "admin", Role::SuperAdmin), true),
            (farmer_one(), true),
            (agent_one(), true),
            (Identity::new(FARMER_TWO, "farmer2", Role::Farmer), false),
            (Identity::new(AGENT_TWO, "agent2", Role::Agent), false),
        ];
        for (reader, expected) in readers {
            assert_eq!(
                authorize(&reader, EntityKind::MilkRecord, Operation::Retrieve, Some(&stored)),
                expected,
                "reader {}",
                reader.username
            );
        }
    }

    #[test]
    fn second_record_for_the_same_cow_and_day_is_a_duplicate() {
        let errors = validate_daily(&cow001(), &entry("10", "10"), context(true)).unwrap_err();
        assert!(errors.has("date", ErrorCode::DuplicateRecord));
    }

    #[test]
    fn daily_record_against_the_wrong_farm_is_a_mismatch() {
        let ctx = DailyContext {
            farm_name: Some("Sunrise Farm"),
            ..context(false)
        };
        let errors = validate_daily(&cow001(), &entry("10", "10"), ctx).unwrap_err();
        assert!(errors.has("farm_name", ErrorCode::Mismatch));
    }

    #[test]
    fn other_farmer_cannot_write_against_cow001() {
        let intruder = Identity::new(FARMER_TWO, "farmer2", Role::Farmer);
        let err = ensure_farmer_owns(&intruder, &cow001()).unwrap_err();
        assert!(matches!(err, FarmHubError::PermissionDenied(_)));
        // Agents and admins are not held to cow ownership.
        assert!(ensure_farmer_owns(&agent_one(), &cow001()).is_ok());
    }

    #[test]
    fn out_of_scope_rows_read_as_missing_and_forbidden_roles_as_denied() {
        let other_farm = Ownership::of_farm(99, AGENT_TWO);
        let err = enforce(&agent_one(), EntityKind::Farm, Operation::Update, Some(&other_farm)).unwrap_err();
        assert!(matches!(err, FarmHubError::NotFound(_)));

        let err = enforce(&farmer_one(), EntityKind::Farm, Operation::Create, None).unwrap_err();
        assert!(matches!(err, FarmHubError::PermissionDenied(_)));
    }

    #[test]
    fn farmers_never_see_farms_even_their_own_cows_farm() {
        assert_eq!(visible_rows(&farmer_one(), EntityKind::Farm), Scope::Nothing);
        assert!(!authorize(
            &farmer_one(),
            EntityKind::Farm,
            Operation::Retrieve,
            Some(&Ownership::of_farm(GREEN_VALLEY, AGENT_ONE)),
        ));
    }

    #[test]
    fn oversized_batch_is_rejected_before_any_row_is_touched() {
        let records = vec![entry("1", "1"); 51];
        let errors = check_batch_size(&records).unwrap_err();
        assert!(errors.has("records", ErrorCode::BatchTooLarge));
        assert!(check_batch_size(&records[..50]).is_ok());
    }

    #[tokio::test]
    async fn batch_failures_report_the_failing_index() {
        let failure = validate_daily(&cow001(), &entry("51", "0"), context(false))
            .map_err(FarmHubError::from)
            .unwrap_err()
            .at_index(2);

        let response = failure.into_response();
        assert_eq!(response.status(), axum::http::StatusCode::BAD_REQUEST);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["record_index"], 2);
        assert_eq!(
            body["errors"]["records[2].morning_quantity_liters"][0]["code"],
            "field_out_of_range"
        );
    }

    #[test]
    fn agent_cannot_register_a_cow_on_a_farm_they_do_not_manage() {
        let input = CowInput {
            tag_number: Some("COW777".into()),
            farmer_id: Some(FARMER_ONE),
            farm_id: Some(42),
            date_of_birth: Some(day(2021, 1, 1)),
            ..CowInput::default()
        };
        let refs = CowRefs {
            farmer_role: Some(Role::Farmer),
            farm_agent_id: Some(AGENT_TWO),
            acting_agent: Some(AGENT_ONE),
        };
        let errors = validate_cow(&input, refs, day(2024, 6, 15)).unwrap_err();
        assert!(errors.has("farm_id", ErrorCode::Mismatch));
    }

    #[test]
    fn calving_and_breeding_logs_carry_their_effect_on_the_cow() {
        let now = Utc.with_ymd_and_hms(2024, 6, 15, 9, 0, 0).unwrap();
        let cow = cow001();
        let target = LogTarget {
            cow_id: cow.id,
            tag_number: &cow.tag_number,
        };

        let calving = CalvingRequest {
            calf_gender: Some("female".into()),
            calf_weight: Some(dec("32.5")),
            ..CalvingRequest::default()
        };
        let log = normalize_calving(target, &calving, now).unwrap();
        assert_eq!(log.cow_effect, Some(CowEffect::Calved));
        assert_eq!(log.activity.cow_id, cow.id);

        let breeding = BreedingRequest {
            description: Some("AI with sire 4471".into()),
            scheduled_date: Some(day(2024, 6, 10)),
            ..BreedingRequest::default()
        };
        let log = normalize_breeding(target, &breeding, now).unwrap();
        assert_eq!(log.cow_effect, Some(CowEffect::Bred(day(2024, 6, 10))));
    }
}
