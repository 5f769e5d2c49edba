//! Agregador de disponibilidad
//!
//! Serie diaria de vehículos disponibles sobre una ventana de 365 días,
//! opcionalmente agrupada por meses (media redondeada).

use std::sync::Arc;

use chrono::{Datelike, Duration, NaiveDate};
use tracing::debug;
use uuid::Uuid;

use crate::models::{
    AvailabilityPoint, AvailabilitySeries, Incident, PlaceFilter, Resolution, Vehicle,
};
use crate::repositories::FleetReader;
use crate::utils::errors::AppError;

/// Días hacia atrás desde la fecha de consulta
pub const WINDOW_DAYS: i64 = 365;

/// Primer día de la ventana que termina en `as_of`, si es representable
pub fn window_start(as_of: NaiveDate) -> Option<NaiveDate> {
    as_of.checked_sub_signed(Duration::days(WINDOW_DAYS))
}

pub struct AvailabilityAggregator {
    reader: Arc<dyn FleetReader>,
}

impl AvailabilityAggregator {
    pub fn new(reader: Arc<dyn FleetReader>) -> Self {
        Self { reader }
    }

    /// Estadísticas del alcance a una fecha
    ///
    /// Los vehículos marcados para baja no cuentan en el total ni en la serie.
    pub async fn compute(
        &self,
        scope: &PlaceFilter,
        as_of: NaiveDate,
        resolution: Resolution,
    ) -> Result<AvailabilitySeries, AppError> {
        let from = window_start(as_of).ok_or_else(|| {
            AppError::InvalidInput(format!("as_of {} leaves no {}-day window", as_of, WINDOW_DAYS))
        })?;

        let vehicles: Vec<Vehicle> = self
            .reader
            .list_vehicles(scope)
            .await?
            .into_iter()
            .filter(|v| !v.is_for_disposal)
            .collect();

        let total = vehicles.len() as i64;
        let off_road = vehicles.iter().filter(|v| v.is_off_road).count() as i64;

        let ids: Vec<Uuid> = vehicles.iter().map(|v| v.id).collect();
        let incidents = self.reader.incidents_between(&ids, from, as_of).await?;

        debug!(
            "📊 Disponibilidad {} a {}: {} vehículos, {} incidentes en ventana",
            scope.describe(),
            as_of,
            total,
            incidents.len()
        );

        let daily = daily_series(total, &incidents, from, as_of);
        let points = match resolution {
            Resolution::Daily => daily,
            Resolution::Monthly => bucket_by_month(&daily),
        };

        Ok(AvailabilitySeries {
            as_of,
            resolution,
            total,
            off_road,
            available: total - off_road,
            points,
        })
    }
}

/// Serie diaria sobre el intervalo cerrado [from, to]
///
/// Cada día vale `total` menos el número de incidentes que lo cubren.
/// Un mismo vehículo con incidentes solapados cuenta una vez por incidente.
pub fn daily_series(
    total: i64,
    incidents: &[Incident],
    from: NaiveDate,
    to: NaiveDate,
) -> Vec<AvailabilityPoint> {
    if to < from {
        return Vec::new();
    }
    let days = (to - from).num_days() as usize + 1;

    // Diferencias: +1 al entrar en el incidente, -1 al día siguiente de salir
    let mut deltas = vec![0i64; days + 1];
    for incident in incidents.iter().filter(|i| i.intersects(from, to)) {
        let start = incident.start_date.max(from);
        let end = incident.end_date.min(to);
        deltas[(start - from).num_days() as usize] += 1;
        deltas[(end - from).num_days() as usize + 1] -= 1;
    }

    let mut covering = 0;
    from.iter_days()
        .take(days)
        .zip(deltas)
        .map(|(date, delta)| {
            covering += delta;
            AvailabilityPoint {
                date,
                available: total - covering,
            }
        })
        .collect()
}

/// Agrupar una serie diaria por meses
///
/// Un punto por mes (fechado el día 1) con la media de sus días,
/// redondeada al entero más cercano.
pub fn bucket_by_month(points: &[AvailabilityPoint]) -> Vec<AvailabilityPoint> {
    let mut buckets: Vec<(NaiveDate, i64, i64)> = Vec::new();

    for point in points {
        let month = point.date.with_day(1).unwrap_or(point.date);
        match buckets.last_mut() {
            Some((current, sum, count)) if *current == month => {
                *sum += point.available;
                *count += 1;
            }
            _ => buckets.push((month, point.available, 1)),
        }
    }

    buckets
        .into_iter()
        .map(|(date, sum, count)| AvailabilityPoint {
            date,
            available: (sum as f64 / count as f64).round() as i64,
        })
        .collect()
}
