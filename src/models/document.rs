//! Documento de vehículo (almacén documental)
//!
//! Un documento por vehículo con todos sus incidentes embebidos. El token
//! de versión del vehículo protege las escrituras condicionales.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::incident::Incident;
use crate::models::vehicle::Vehicle;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleDocument {
    pub vehicle: Vehicle,
    #[serde(default)]
    pub incidents: Vec<Incident>,
}

impl VehicleDocument {
    pub fn new(vehicle: Vehicle) -> Self {
        Self {
            vehicle,
            incidents: Vec::new(),
        }
    }

    pub fn registration(&self) -> &str {
        &self.vehicle.registration
    }

    pub fn version_token(&self) -> &str {
        &self.vehicle.version_token
    }

    pub fn incident(&self, start_date: NaiveDate) -> Option<&Incident> {
        self.incidents.iter().find(|i| i.start_date == start_date)
    }

    /// Insertar o reemplazar por fecha de inicio
    pub fn put_incident(&mut self, incident: Incident) {
        match self
            .incidents
            .iter_mut()
            .find(|i| i.start_date == incident.start_date)
        {
            Some(existing) => *existing = incident,
            None => {
                self.incidents.push(incident);
                self.incidents.sort_by_key(|i| i.start_date);
            }
        }
    }
}

/// Escritura condicional: el documento nuevo y el token esperado
/// (`None` = el documento no debe existir todavía)
#[derive(Debug, Clone)]
pub struct ConditionalWrite {
    pub document: VehicleDocument,
    pub expected_token: Option<String>,
}
