//! Almacén transaccional PostgreSQL
//!
//! Todo el lote de reconciliación corre dentro de una única transacción
//! SQLx. La fila del marcador se bloquea con `FOR UPDATE`, de modo que dos
//! lotes concurrentes se serializan en la base de datos.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::models::{Incident, PlaceFilter, Vehicle};
use crate::repositories::store::{FleetReader, FleetStore, FleetTransaction};
use crate::utils::errors::StoreError;

#[derive(Clone)]
pub struct PgFleetStore {
    pool: PgPool,
}

impl PgFleetStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FleetReader for PgFleetStore {
    async fn find_vehicle_by_key(&self, key: &str) -> Result<Option<Vehicle>, StoreError> {
        let vehicle = sqlx::query_as::<_, Vehicle>(
            r#"
            SELECT * FROM vehicles
            WHERE deleted_at IS NULL AND (registration = $1 OR call_sign = $1)
            ORDER BY (registration = $1) DESC, last_modified DESC
            LIMIT 1
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(vehicle)
    }

    async fn list_vehicles(&self, filter: &PlaceFilter) -> Result<Vec<Vehicle>, StoreError> {
        let vehicles = sqlx::query_as::<_, Vehicle>(
            r#"
            SELECT * FROM vehicles
            WHERE deleted_at IS NULL
              AND ($1::text IS NULL OR lower(trim(region)) = lower($1))
              AND ($2::text IS NULL OR lower(trim(district)) = lower($2))
              AND ($3::text IS NULL OR lower(trim(hub)) = lower($3))
            ORDER BY registration
            "#,
        )
        .bind(filter.region_name())
        .bind(filter.district())
        .bind(filter.hub())
        .fetch_all(&self.pool)
        .await?;

        Ok(vehicles)
    }

    async fn incidents_between(
        &self,
        vehicle_ids: &[Uuid],
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Incident>, StoreError> {
        if vehicle_ids.is_empty() {
            return Ok(Vec::new());
        }

        let incidents = sqlx::query_as::<_, Incident>(
            r#"
            SELECT * FROM incidents
            WHERE vehicle_id = ANY($1) AND start_date <= $3 AND end_date >= $2
            "#,
        )
        .bind(vehicle_ids)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        Ok(incidents)
    }
}

#[async_trait]
impl FleetStore for PgFleetStore {
    async fn begin(&self) -> Result<Box<dyn FleetTransaction>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgFleetTransaction { tx }))
    }
}

pub struct PgFleetTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl FleetTransaction for PgFleetTransaction {
    async fn resync_marker(&mut self) -> Result<Option<NaiveDate>, StoreError> {
        let row: Option<(Option<NaiveDate>,)> =
            sqlx::query_as("SELECT last_date FROM fleet_resync_marker WHERE id = 1 FOR UPDATE")
                .fetch_optional(&mut *self.tx)
                .await?;

        Ok(row.and_then(|(date,)| date))
    }

    async fn set_resync_marker(&mut self, date: NaiveDate) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO fleet_resync_marker (id, last_date) VALUES (1, $1)
            ON CONFLICT (id) DO UPDATE SET last_date = EXCLUDED.last_date
            "#,
        )
        .bind(date)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn clear_off_road(
        &mut self,
        modified_at: DateTime<Utc>,
    ) -> Result<Vec<Uuid>, StoreError> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            UPDATE vehicles SET is_off_road = FALSE, last_modified = $1
            WHERE deleted_at IS NULL AND is_off_road
            RETURNING id
            "#,
        )
        .bind(modified_at)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn stamp_version_tokens(&mut self, tokens: &[(Uuid, String)]) -> Result<(), StoreError> {
        if tokens.is_empty() {
            return Ok(());
        }
        let (ids, values): (Vec<Uuid>, Vec<String>) = tokens.iter().cloned().unzip();

        sqlx::query(
            r#"
            UPDATE vehicles AS v SET version_token = t.token
            FROM UNNEST($1::uuid[], $2::text[]) AS t(id, token)
            WHERE v.id = t.id
            "#,
        )
        .bind(ids)
        .bind(values)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn find_vehicle_by_registration(
        &mut self,
        registration: &str,
    ) -> Result<Option<Vehicle>, StoreError> {
        let vehicle = sqlx::query_as::<_, Vehicle>(
            "SELECT * FROM vehicles WHERE registration = $1 FOR UPDATE",
        )
        .bind(registration)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(vehicle)
    }

    async fn save_vehicle(
        &mut self,
        vehicle: &Vehicle,
        expected_token: Option<&str>,
    ) -> Result<(), StoreError> {
        let result = match expected_token {
            None => {
                sqlx::query(
                    r#"
                    INSERT INTO vehicles (
                        id, registration, call_sign, body_type, make, model,
                        region, district, hub, is_off_road, is_for_disposal,
                        last_modified, version_token, deleted_at
                    ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
                    "#,
                )
                .bind(vehicle.id)
                .bind(&vehicle.registration)
                .bind(&vehicle.call_sign)
                .bind(&vehicle.body_type)
                .bind(&vehicle.make)
                .bind(&vehicle.model)
                .bind(&vehicle.region)
                .bind(&vehicle.district)
                .bind(&vehicle.hub)
                .bind(vehicle.is_off_road)
                .bind(vehicle.is_for_disposal)
                .bind(vehicle.last_modified)
                .bind(&vehicle.version_token)
                .bind(vehicle.deleted_at)
                .execute(&mut *self.tx)
                .await?
            }
            Some(expected) => {
                sqlx::query(
                    r#"
                    UPDATE vehicles SET
                        registration = $2, call_sign = $3, body_type = $4, make = $5, model = $6,
                        region = $7, district = $8, hub = $9, is_off_road = $10, is_for_disposal = $11,
                        last_modified = $12, version_token = $13, deleted_at = $14
                    WHERE id = $1 AND version_token = $15
                    "#,
                )
                .bind(vehicle.id)
                .bind(&vehicle.registration)
                .bind(&vehicle.call_sign)
                .bind(&vehicle.body_type)
                .bind(&vehicle.make)
                .bind(&vehicle.model)
                .bind(&vehicle.region)
                .bind(&vehicle.district)
                .bind(&vehicle.hub)
                .bind(vehicle.is_off_road)
                .bind(vehicle.is_for_disposal)
                .bind(vehicle.last_modified)
                .bind(&vehicle.version_token)
                .bind(vehicle.deleted_at)
                .bind(expected)
                .execute(&mut *self.tx)
                .await?
            }
        };

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!(
                "vehicle {} was modified concurrently",
                vehicle.registration
            )));
        }
        Ok(())
    }

    async fn find_incident(
        &mut self,
        vehicle_id: Uuid,
        start_date: NaiveDate,
    ) -> Result<Option<Incident>, StoreError> {
        let incident = sqlx::query_as::<_, Incident>(
            "SELECT * FROM incidents WHERE vehicle_id = $1 AND start_date = $2",
        )
        .bind(vehicle_id)
        .bind(start_date)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(incident)
    }

    async fn save_incident(&mut self, incident: &Incident) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO incidents (
                id, vehicle_id, description, comments, start_date, end_date, estimated_end_date
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE SET
                description = EXCLUDED.description,
                comments = EXCLUDED.comments,
                end_date = EXCLUDED.end_date,
                estimated_end_date = EXCLUDED.estimated_end_date
            "#,
        )
        .bind(incident.id)
        .bind(incident.vehicle_id)
        .bind(&incident.description)
        .bind(&incident.comments)
        .bind(incident.start_date)
        .bind(incident.end_date)
        .bind(incident.estimated_end_date)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
