//! Modelo de Incident
//!
//! Un incidente "VOR" (vehículo fuera de servicio). Su clave de fusión es
//! el par (vehículo, fecha de inicio).

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Incident {
    pub id: Uuid,
    pub vehicle_id: Uuid,
    pub description: String,
    pub comments: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub estimated_end_date: Option<NaiveDate>,
}

impl Incident {
    /// ¿Se solapa con el intervalo cerrado [from, to]?
    pub fn intersects(&self, from: NaiveDate, to: NaiveDate) -> bool {
        self.start_date <= to && self.end_date >= from
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    #[test]
    fn test_interval_helpers() {
        let incident = Incident {
            id: Uuid::new_v4(),
            vehicle_id: Uuid::new_v4(),
            description: String::new(),
            comments: String::new(),
            start_date: d(5),
            end_date: d(10),
            estimated_end_date: None,
        };

        assert!(incident.intersects(d(1), d(5)));
        assert!(incident.intersects(d(10), d(20)));
        assert!(!incident.intersects(d(11), d(20)));
    }
}
