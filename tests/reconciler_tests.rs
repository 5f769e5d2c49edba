use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use fleet_status::models::{Incident, IncidentReport, PlaceFilter, Vehicle, VehicleSettings};
use fleet_status::repositories::{FleetReader, FleetStore, FleetTransaction, MemoryFleetStore};
use fleet_status::services::{FleetService, Reconciler, RetryPolicy};
use fleet_status::utils::errors::{ReconcileError, StoreError};
use fleet_status::utils::FixedClock;

fn d(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
}

fn report(registration: &str, call_sign: &str, start: u32, as_of: u32) -> IncidentReport {
    IncidentReport::new(registration, call_sign, d(start), d(as_of))
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        delay: Duration::from_millis(1),
    }
}

fn service(store: &Arc<MemoryFleetStore>, clock: &Arc<FixedClock>) -> FleetService {
    FleetService::transactional(Arc::clone(store), clock.clone(), fast_retry())
}

#[tokio::test]
async fn test_vehicle_lifecycle_across_batches() {
    let store = Arc::new(MemoryFleetStore::new());
    let clock = Arc::new(FixedClock::at_date(d(9)));
    let fleet = service(&store, &clock);

    let created = fleet
        .upsert_vehicle_settings(
            "AB12CDE",
            &VehicleSettings {
                call_sign: Some("WR1".to_string()),
                region: Some("North".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(!created.is_off_road);

    clock.set(d(10).and_hms_opt(6, 0, 0).unwrap().and_utc());
    let summary = fleet
        .reconcile_batch(vec![report("AB12CDE", "WR1", 8, 10), report("XY34ZZZ", "WR2", 9, 10)])
        .await
        .unwrap();
    assert!(summary.authoritative);
    assert_eq!(summary.vehicles_created, 1);
    assert_eq!(summary.vehicles_updated, 1);

    let vehicle = fleet.get_vehicle_by_key("WR1").await.unwrap().unwrap();
    assert_eq!(vehicle.id, created.id);
    assert!(vehicle.is_off_road);
    // Los ajustes manuales sobreviven a la reconciliación
    assert_eq!(vehicle.region, Some("North".to_string()));

    clock.set(d(11).and_hms_opt(6, 0, 0).unwrap().and_utc());
    let summary = fleet
        .reconcile_batch(vec![report("XY34ZZZ", "WR2", 9, 11)])
        .await
        .unwrap();
    assert!(summary.authoritative);
    assert_eq!(summary.vehicles_cleared, 2);

    let vehicle = fleet.get_vehicle_by_key("AB12CDE").await.unwrap().unwrap();
    assert!(!vehicle.is_off_road);
    assert_ne!(vehicle.version_token, created.version_token);
    assert!(fleet.get_vehicle_by_key("WR2").await.unwrap().unwrap().is_off_road);
    assert_eq!(store.snapshot().marker, Some(d(11)));
}

#[tokio::test]
async fn test_same_batch_twice_is_idempotent() {
    let store = Arc::new(MemoryFleetStore::new());
    let clock = Arc::new(FixedClock::at_date(d(10)));
    let fleet = service(&store, &clock);

    let batch = vec![
        report("AB12CDE", "WR1", 8, 10).with_description("gearbox"),
        report("AB12CDE", "WR1", 9, 10).with_comments("awaiting parts"),
        report("XY34ZZZ", "WR2", 10, 10),
    ];

    fleet.reconcile_batch(batch.clone()).await.unwrap();
    let first = store.snapshot();

    let summary = fleet.reconcile_batch(batch).await.unwrap();
    assert_eq!(summary.incidents_created, 0);
    assert_eq!(summary.incidents_updated, 0);
    assert_eq!(store.snapshot(), first);
}

#[tokio::test]
async fn test_stale_and_mixed_batches_are_not_authoritative() {
    let store = Arc::new(MemoryFleetStore::new());
    let clock = Arc::new(FixedClock::at_date(d(10)));
    let fleet = service(&store, &clock);

    fleet
        .reconcile_batch(vec![report("AB12CDE", "WR1", 8, 10)])
        .await
        .unwrap();

    // Fichero atrasado: solo fusiona incidentes
    let summary = fleet
        .reconcile_batch(vec![report("XY34ZZZ", "WR2", 5, 9)])
        .await
        .unwrap();
    assert!(!summary.authoritative);
    assert_eq!(summary.vehicles_cleared, 0);
    assert!(fleet.get_vehicle_by_key("AB12CDE").await.unwrap().unwrap().is_off_road);
    let late = fleet.get_vehicle_by_key("XY34ZZZ").await.unwrap().unwrap();
    assert!(!late.is_off_road);
    assert_eq!(store.incidents_of(late.id).len(), 1);

    // Fechas mezcladas: fecha del lote = la mayor, pero no autoritativo
    let summary = fleet
        .reconcile_batch(vec![report("AB12CDE", "WR1", 8, 12), report("XY34ZZZ", "WR2", 5, 11)])
        .await
        .unwrap();
    assert_eq!(summary.batch_date, Some(d(12)));
    assert!(!summary.authoritative);
    assert_eq!(store.snapshot().marker, Some(d(10)));
}

#[tokio::test]
async fn test_older_report_never_shortens_incident() {
    let store = Arc::new(MemoryFleetStore::new());
    let clock = Arc::new(FixedClock::at_date(d(12)));
    let fleet = service(&store, &clock);

    fleet
        .reconcile_batch(vec![report("AB12CDE", "WR1", 3, 12).with_description("latest")])
        .await
        .unwrap();
    fleet
        .reconcile_batch(vec![report("AB12CDE", "WR1", 3, 7).with_description("historical")])
        .await
        .unwrap();

    let vehicle = store.vehicle("AB12CDE").unwrap();
    let incidents = store.incidents_of(vehicle.id);
    assert_eq!(incidents.len(), 1);
    assert_eq!(incidents[0].end_date, d(12));
    assert_eq!(incidents[0].description, "latest");
}

#[tokio::test]
async fn test_invalid_report_rejects_whole_batch() {
    let store = Arc::new(MemoryFleetStore::new());
    let clock = Arc::new(FixedClock::at_date(d(10)));
    let fleet = service(&store, &clock);

    let err = fleet
        .reconcile_batch(vec![report("AB12CDE", "WR1", 8, 10), report("", "WR2", 8, 10)])
        .await
        .unwrap_err();

    match err {
        ReconcileError::Validation(rejections) => {
            assert_eq!(rejections.len(), 1);
            assert_eq!(rejections[0].index, 1);
        }
        other => panic!("expected validation error, got {:?}", other),
    }
    let snapshot = store.snapshot();
    assert!(snapshot.vehicles.is_empty());
    assert_eq!(snapshot.marker, None);
}

#[tokio::test]
async fn test_deleted_vehicle_is_restored_when_reported_again() {
    let store = Arc::new(MemoryFleetStore::new());
    let clock = Arc::new(FixedClock::at_date(d(10)));
    let fleet = service(&store, &clock);

    fleet
        .reconcile_batch(vec![report("AB12CDE", "WR1", 8, 10)])
        .await
        .unwrap();
    let original = fleet.delete_vehicle("AB12CDE").await.unwrap();
    assert!(fleet.get_vehicle_by_key("AB12CDE").await.unwrap().is_none());
    assert!(fleet.vehicles_in_scope(&PlaceFilter::all()).await.unwrap().is_empty());

    clock.advance(chrono::Duration::days(1));
    let summary = fleet
        .reconcile_batch(vec![report("AB12CDE", "WR1", 8, 11)])
        .await
        .unwrap();
    assert_eq!(summary.vehicles_restored, 1);
    assert_eq!(summary.vehicles_created, 0);

    let restored = fleet.get_vehicle_by_key("AB12CDE").await.unwrap().unwrap();
    assert_eq!(restored.id, original.id);
    assert_eq!(store.snapshot().vehicles.len(), 1);
}

#[tokio::test]
async fn test_disposal_keyword_marks_vehicle() {
    let store = Arc::new(MemoryFleetStore::new());
    let clock = Arc::new(FixedClock::at_date(d(10)));
    let fleet = service(&store, &clock);

    fleet
        .reconcile_batch(vec![
            report("AB12CDE", "WR1", 8, 10).with_comments("Vehicle to be WRITTEN OFF"),
            report("XY34ZZZ", "WR2", 8, 10).with_description("Clutch"),
        ])
        .await
        .unwrap();

    assert!(store.vehicle("AB12CDE").unwrap().is_for_disposal);
    assert!(!store.vehicle("XY34ZZZ").unwrap().is_for_disposal);
}

/// Almacén que inyecta fallos en las transacciones
struct FaultyStore {
    inner: MemoryFleetStore,
    begins: AtomicU32,
    /// Número de `begin` que fallan con error transitorio
    transient_begins: u32,
    /// Si es cierto, guardar un incidente falla
    fail_incidents: bool,
}

impl FaultyStore {
    fn new(transient_begins: u32, fail_incidents: bool) -> Self {
        Self {
            inner: MemoryFleetStore::new(),
            begins: AtomicU32::new(0),
            transient_begins,
            fail_incidents,
        }
    }
}

#[async_trait]
impl FleetReader for FaultyStore {
    async fn find_vehicle_by_key(&self, key: &str) -> Result<Option<Vehicle>, StoreError> {
        self.inner.find_vehicle_by_key(key).await
    }

    async fn list_vehicles(&self, filter: &PlaceFilter) -> Result<Vec<Vehicle>, StoreError> {
        self.inner.list_vehicles(filter).await
    }

    async fn incidents_between(
        &self,
        vehicle_ids: &[Uuid],
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Incident>, StoreError> {
        self.inner.incidents_between(vehicle_ids, from, to).await
    }
}

#[async_trait]
impl FleetStore for FaultyStore {
    async fn begin(&self) -> Result<Box<dyn FleetTransaction>, StoreError> {
        let attempt = self.begins.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.transient_begins {
            return Err(StoreError::Transient("connection reset".to_string()));
        }
        Ok(Box::new(FaultyTransaction {
            inner: self.inner.begin().await?,
            fail_incidents: self.fail_incidents,
        }))
    }
}

struct FaultyTransaction {
    inner: Box<dyn FleetTransaction>,
    fail_incidents: bool,
}

#[async_trait]
impl FleetTransaction for FaultyTransaction {
    async fn resync_marker(&mut self) -> Result<Option<NaiveDate>, StoreError> {
        self.inner.resync_marker().await
    }

    async fn set_resync_marker(&mut self, date: NaiveDate) -> Result<(), StoreError> {
        self.inner.set_resync_marker(date).await
    }

    async fn clear_off_road(
        &mut self,
        modified_at: DateTime<Utc>,
    ) -> Result<Vec<Uuid>, StoreError> {
        self.inner.clear_off_road(modified_at).await
    }

    async fn stamp_version_tokens(&mut self, tokens: &[(Uuid, String)]) -> Result<(), StoreError> {
        self.inner.stamp_version_tokens(tokens).await
    }

    async fn find_vehicle_by_registration(
        &mut self,
        registration: &str,
    ) -> Result<Option<Vehicle>, StoreError> {
        self.inner.find_vehicle_by_registration(registration).await
    }

    async fn save_vehicle(
        &mut self,
        vehicle: &Vehicle,
        expected_token: Option<&str>,
    ) -> Result<(), StoreError> {
        self.inner.save_vehicle(vehicle, expected_token).await
    }

    async fn find_incident(
        &mut self,
        vehicle_id: Uuid,
        start_date: NaiveDate,
    ) -> Result<Option<Incident>, StoreError> {
        self.inner.find_incident(vehicle_id, start_date).await
    }

    async fn save_incident(&mut self, incident: &Incident) -> Result<(), StoreError> {
        if self.fail_incidents {
            return Err(StoreError::Backend("disk full".to_string()));
        }
        self.inner.save_incident(incident).await
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.inner.commit().await
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.inner.rollback().await
    }
}

#[tokio::test]
async fn test_failed_batch_leaves_no_partial_state() {
    let store = Arc::new(FaultyStore::new(0, true));
    let clock = Arc::new(FixedClock::at_date(d(10)));
    let reconciler = Reconciler::new(Arc::clone(&store), clock).with_retry_policy(fast_retry());

    let err = reconciler
        .reconcile(vec![report("AB12CDE", "WR1", 8, 10)])
        .await
        .unwrap_err();
    assert!(matches!(err, ReconcileError::Store(StoreError::Backend(_))));

    let snapshot = store.inner.snapshot();
    assert!(snapshot.vehicles.is_empty());
    assert!(snapshot.incidents.is_empty());
    assert_eq!(snapshot.marker, None);
    // Un error no transitorio no se reintenta
    assert_eq!(store.begins.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_transient_failure_retries_whole_batch() {
    let store = Arc::new(FaultyStore::new(2, false));
    let clock = Arc::new(FixedClock::at_date(d(10)));
    let reconciler = Reconciler::new(Arc::clone(&store), clock).with_retry_policy(fast_retry());

    let summary = reconciler
        .reconcile(vec![report("AB12CDE", "WR1", 8, 10)])
        .await
        .unwrap();
    assert_eq!(summary.vehicles_created, 1);
    assert_eq!(store.begins.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_transient_failure_gives_up_after_max_attempts() {
    let store = Arc::new(FaultyStore::new(5, false));
    let clock = Arc::new(FixedClock::at_date(d(10)));
    let reconciler = Reconciler::new(Arc::clone(&store), clock).with_retry_policy(fast_retry());

    let err = reconciler
        .reconcile(vec![report("AB12CDE", "WR1", 8, 10)])
        .await
        .unwrap_err();
    assert!(matches!(err, ReconcileError::Store(StoreError::Transient(_))));
    assert_eq!(store.begins.load(Ordering::SeqCst), 3);
    assert!(store.inner.snapshot().vehicles.is_empty());
}
