//! Fleet Status
//!
//! Reconciliación de reportes de incidentes de vehículos y estadísticas de
//! disponibilidad de la flota, sobre PostgreSQL, Redis o memoria.

pub mod cache;
pub mod config;
pub mod database;
pub mod dto;
pub mod middleware;
pub mod models;
pub mod repositories;
pub mod routes;
pub mod services;
pub mod state;
pub mod utils;

pub use routes::create_router;
pub use services::FleetService;
pub use state::AppState;
