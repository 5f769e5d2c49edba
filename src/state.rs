//! Shared application state
//!
//! Este módulo define el estado compartido de la aplicación que se pasa
//! a través del router de Axum.

use std::sync::Arc;

use crate::config::environment::EnvironmentConfig;
use crate::services::FleetService;

#[derive(Clone)]
pub struct AppState {
    pub fleet: Arc<FleetService>,
    pub config: EnvironmentConfig,
}

impl AppState {
    pub fn new(fleet: FleetService, config: EnvironmentConfig) -> Self {
        Self {
            fleet: Arc::new(fleet),
            config,
        }
    }
}
