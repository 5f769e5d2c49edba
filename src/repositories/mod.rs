//! Repositorios
//!
//! Implementaciones del contrato de almacenamiento: transaccional
//! (Postgres, memoria) y documental (Redis, memoria).

pub mod document_reader;
pub mod memory_document_store;
pub mod memory_store;
pub mod postgres_store;
pub mod redis_document_store;
pub mod store;

pub use document_reader::DocumentReader;
pub use memory_document_store::MemoryDocumentStore;
pub use memory_store::{FleetSnapshot, MemoryFleetStore};
pub use postgres_store::PgFleetStore;
pub use redis_document_store::RedisDocumentStore;
pub use store::{DocumentStore, FleetReader, FleetStore, FleetTransaction};
