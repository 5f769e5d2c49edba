use std::sync::Arc;

use chrono::{Datelike, Duration, NaiveDate};

use fleet_status::models::{IncidentReport, PlaceFilter, Resolution, VehicleSettings};
use fleet_status::repositories::{MemoryDocumentStore, MemoryFleetStore};
use fleet_status::services::{DocumentIngestConfig, FleetService, RetryPolicy, WINDOW_DAYS};
use fleet_status::utils::FixedClock;

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
}

fn backends() -> Vec<FleetService> {
    vec![
        FleetService::transactional(
            Arc::new(MemoryFleetStore::new()),
            Arc::new(FixedClock::at_date(today())),
            RetryPolicy::default(),
        ),
        FleetService::document(
            Arc::new(MemoryDocumentStore::new()),
            Arc::new(FixedClock::at_date(today())),
            DocumentIngestConfig::default(),
        ),
    ]
}

async fn register(fleet: &FleetService, count: usize, region: &str, district: &str) -> Vec<String> {
    let mut registrations = Vec::new();
    for i in 0..count {
        let registration = format!("{}{:02}", &region[..2].to_uppercase(), i);
        fleet
            .upsert_vehicle_settings(
                &registration,
                &VehicleSettings {
                    call_sign: Some(format!("CS{}", registration)),
                    region: Some(region.to_string()),
                    district: Some(district.to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        registrations.push(registration);
    }
    registrations
}

#[tokio::test]
async fn test_ten_vehicles_two_off_road_gives_eight_available() {
    for fleet in backends() {
        let registrations = register(&fleet, 10, "North", "Riverside").await;
        let start = today() - Duration::days(3);
        fleet
            .reconcile_batch(vec![
                IncidentReport::new(&registrations[0], "CSNO00", start, today()),
                IncidentReport::new(&registrations[1], "CSNO01", start, today()),
            ])
            .await
            .unwrap();

        let series = fleet
            .get_availability_statistics(&PlaceFilter::all(), None, Resolution::Daily)
            .await
            .unwrap();

        assert_eq!(series.as_of, today());
        assert_eq!(series.total, 10);
        assert_eq!(series.off_road, 2);
        assert_eq!(series.available, 8);
        assert_eq!(series.points.len(), WINDOW_DAYS as usize + 1);

        let last = series.points.last().unwrap();
        assert_eq!(last.date, today());
        assert_eq!(last.available, 8);

        let before = series.points.iter().find(|p| p.date == start - Duration::days(1)).unwrap();
        assert_eq!(before.available, 10);
    }
}

#[tokio::test]
async fn test_scope_filters_and_disposal_exclusion() {
    for fleet in backends() {
        register(&fleet, 3, "North", "Riverside").await;
        register(&fleet, 2, "South", "Harbour").await;
        fleet
            .upsert_vehicle_settings(
                "SO00",
                &VehicleSettings {
                    is_for_disposal: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let south = PlaceFilter::parse(Some("south"), None, None).unwrap();
        let series = fleet
            .get_availability_statistics(&south, None, Resolution::Daily)
            .await
            .unwrap();
        assert_eq!(series.total, 1);

        let riverside = PlaceFilter::parse(Some("1"), Some("riverside "), Some("all")).unwrap();
        assert_eq!(fleet.vehicles_in_scope(&riverside).await.unwrap().len(), 3);

        // El distrito se ignora si la región no filtra
        let ignored = PlaceFilter::parse(Some("all"), Some("Harbour"), None).unwrap();
        assert_eq!(fleet.vehicles_in_scope(&ignored).await.unwrap().len(), 5);

        assert!(PlaceFilter::parse(Some("Atlantis"), None, None).is_err());
    }
}

#[tokio::test]
async fn test_monthly_resolution_buckets_window() {
    for fleet in backends() {
        register(&fleet, 4, "East", "Docks").await;

        let series = fleet
            .get_availability_statistics(&PlaceFilter::all(), Some(today()), Resolution::Monthly)
            .await
            .unwrap();

        assert_eq!(series.resolution, Resolution::Monthly);
        // 2023-03-16 .. 2024-03-15 abarca 13 meses naturales
        assert_eq!(series.points.len(), 13);
        assert!(series.points.iter().all(|p| p.date.day() == 1));
        assert!(series.points.iter().all(|p| p.available == 4));
    }
}

#[tokio::test]
async fn test_scope_token_changes_when_vehicle_changes() {
    for fleet in backends() {
        register(&fleet, 2, "West", "Hill").await;
        let scope = PlaceFilter::parse(Some("West"), None, None).unwrap();
        let other = PlaceFilter::parse(Some("North"), None, None).unwrap();

        let before = fleet.get_scope_version_token(&scope, None).await.unwrap();
        let other_before = fleet.get_scope_version_token(&other, None).await.unwrap();

        fleet.delete_vehicle("WE00").await.unwrap();

        assert_ne!(before, fleet.get_scope_version_token(&scope, None).await.unwrap());
        assert_eq!(other_before, fleet.get_scope_version_token(&other, None).await.unwrap());
    }
}
