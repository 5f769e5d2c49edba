//! DTOs de la API HTTP

pub mod fleet_dto;

pub use fleet_dto::*;
