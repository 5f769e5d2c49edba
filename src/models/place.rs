//! Jerarquía de lugares
//!
//! Región -> distrito -> base (hub). Cada nivel solo filtra si el nivel
//! padre está especificado; el centinela "all" corta el filtrado en ese
//! nivel y en los inferiores.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::models::vehicle::Vehicle;
use crate::utils::errors::AppError;

const ALL_SENTINEL: &str = "all";

/// Regiones definidas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Region {
    All,
    North,
    South,
    East,
    West,
    Central,
}

impl Region {
    pub fn as_str(&self) -> &'static str {
        match self {
            Region::All => "All",
            Region::North => "North",
            Region::South => "South",
            Region::East => "East",
            Region::West => "West",
            Region::Central => "Central",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Region {
    type Err = AppError;

    /// Acepta el nombre (sin distinguir mayúsculas) o el código numérico
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim();
        let region = match value.to_ascii_lowercase().as_str() {
            "all" | "0" => Region::All,
            "north" | "1" => Region::North,
            "south" | "2" => Region::South,
            "east" | "3" => Region::East,
            "west" | "4" => Region::West,
            "central" | "5" => Region::Central,
            _ => {
                return Err(AppError::InvalidInput(format!(
                    "Region '{}' is not defined",
                    value
                )))
            }
        };
        Ok(region)
    }
}

/// Filtro de alcance ya validado
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceFilter {
    region: Region,
    district: Option<String>,
    hub: Option<String>,
}

impl Default for PlaceFilter {
    fn default() -> Self {
        Self::all()
    }
}

impl PlaceFilter {
    /// Toda la flota
    pub fn all() -> Self {
        Self {
            region: Region::All,
            district: None,
            hub: None,
        }
    }

    /// Construir el filtro desde parámetros crudos
    ///
    /// Una región indefinida es un error de validación; distrito y base se
    /// descartan si el nivel superior no filtra.
    pub fn parse(
        region: Option<&str>,
        district: Option<&str>,
        hub: Option<&str>,
    ) -> Result<Self, AppError> {
        let region = match region {
            Some(raw) if !raw.trim().is_empty() => raw.parse::<Region>()?,
            _ => Region::All,
        };
        Ok(Self::new(region, district, hub))
    }

    pub fn new(region: Region, district: Option<&str>, hub: Option<&str>) -> Self {
        let district = if region == Region::All {
            None
        } else {
            level(district)
        };
        let hub = if district.is_some() { level(hub) } else { None };
        Self { region, district, hub }
    }

    /// Región efectiva para filtrar (`None` = sin filtro)
    pub fn region_name(&self) -> Option<&'static str> {
        match self.region {
            Region::All => None,
            other => Some(other.as_str()),
        }
    }

    pub fn district(&self) -> Option<&str> {
        self.district.as_deref()
    }

    pub fn hub(&self) -> Option<&str> {
        self.hub.as_deref()
    }

    pub fn matches(&self, vehicle: &Vehicle) -> bool {
        matches_level(self.region_name(), vehicle.region.as_deref())
            && matches_level(self.district(), vehicle.district.as_deref())
            && matches_level(self.hub(), vehicle.hub.as_deref())
    }

    /// Clave estable del alcance, útil para logs
    pub fn describe(&self) -> String {
        format!(
            "{}/{}/{}",
            self.region,
            self.district().unwrap_or(ALL_SENTINEL),
            self.hub().unwrap_or(ALL_SENTINEL)
        )
    }
}

fn level(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case(ALL_SENTINEL))
        .map(str::to_string)
}

fn matches_level(filter: Option<&str>, value: Option<&str>) -> bool {
    match filter {
        None => true,
        Some(expected) => value
            .map(|v| v.trim().eq_ignore_ascii_case(expected))
            .unwrap_or(false),
    }
}
