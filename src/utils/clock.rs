//! Reloj del sistema
//!
//! Los servicios reciben el reloj como dependencia explícita para que
//! "ahora" y "hoy" sean controlables en los tests.

use chrono::{DateTime, NaiveDate, SubsecRound, Utc};
use std::sync::RwLock;

pub trait Clock: Send + Sync {
    /// Instante actual, truncado a microsegundos (precisión de Postgres)
    fn now(&self) -> DateTime<Utc>;

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

/// Reloj real
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now().trunc_subsecs(6)
    }
}

/// Reloj fijo, ajustable a mano
#[derive(Debug)]
pub struct FixedClock {
    instant: RwLock<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(instant: DateTime<Utc>) -> Self {
        Self {
            instant: RwLock::new(instant.trunc_subsecs(6)),
        }
    }

    /// Reloj fijado al mediodía UTC de la fecha indicada
    pub fn at_date(date: NaiveDate) -> Self {
        let noon = date.and_hms_opt(12, 0, 0).unwrap_or_default().and_utc();
        Self::new(noon)
    }

    pub fn set(&self, instant: DateTime<Utc>) {
        let mut guard = self.instant.write().unwrap_or_else(|e| e.into_inner());
        *guard = instant.trunc_subsecs(6);
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut guard = self.instant.write().unwrap_or_else(|e| e.into_inner());
        *guard += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.instant.read().unwrap_or_else(|e| e.into_inner())
    }
}
