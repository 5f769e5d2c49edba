//! Configuración de variables de entorno
//!
//! Este módulo maneja la configuración del entorno: servidor, almacén
//! elegido y parámetros de reintento e ingesta.

use anyhow::{bail, Context, Result};
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::services::{DocumentIngestConfig, RetryPolicy};

/// Almacén de la flota
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Redis,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StoreBackend::Postgres),
            "redis" => Ok(StoreBackend::Redis),
            "memory" => Ok(StoreBackend::Memory),
            other => bail!(
                "STORE_BACKEND '{}' is not supported (postgres | redis | memory)",
                other
            ),
        }
    }
}

/// Configuración del entorno
#[derive(Debug, Clone)]
pub struct EnvironmentConfig {
    pub environment: String,
    pub port: u16,
    pub host: String,
    pub cors_origins: Vec<String>,
    pub store_backend: StoreBackend,
    pub redis_url: String,
    pub retry: RetryPolicy,
    pub document: DocumentIngestConfig,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            environment: "development".to_string(),
            port: 3000,
            host: "0.0.0.0".to_string(),
            cors_origins: Vec::new(),
            store_backend: StoreBackend::Postgres,
            redis_url: "redis://localhost:6379".to_string(),
            retry,
            document: DocumentIngestConfig {
                retry,
                ..DocumentIngestConfig::default()
            },
        }
    }
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parsed_or<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .with_context(|| format!("{} must be a valid number, got '{}'", name, raw)),
        _ => Ok(default),
    }
}

impl EnvironmentConfig {
    /// Leer la configuración de las variables de entorno
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let cors_origins = env::var("CORS_ORIGINS")
            .map(|origins| {
                origins
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let retry = RetryPolicy {
            max_attempts: parsed_or("WRITE_MAX_ATTEMPTS", defaults.retry.max_attempts)?,
            delay: Duration::from_millis(parsed_or(
                "WRITE_RETRY_DELAY_MS",
                defaults.retry.delay.as_millis() as u64,
            )?),
        };
        if retry.max_attempts == 0 {
            bail!("WRITE_MAX_ATTEMPTS must be at least 1");
        }

        let document = DocumentIngestConfig {
            chunk_size: parsed_or("DOCUMENT_CHUNK_SIZE", defaults.document.chunk_size)?,
            chunk_delay: Duration::from_millis(parsed_or(
                "DOCUMENT_CHUNK_DELAY_MS",
                defaults.document.chunk_delay.as_millis() as u64,
            )?),
            write_concurrency: parsed_or(
                "DOCUMENT_WRITE_CONCURRENCY",
                defaults.document.write_concurrency,
            )?,
            retry,
        };
        if document.chunk_size == 0 {
            bail!("DOCUMENT_CHUNK_SIZE must be at least 1");
        }

        Ok(Self {
            environment: var_or("ENVIRONMENT", &defaults.environment),
            port: parsed_or("PORT", defaults.port)?,
            host: var_or("HOST", &defaults.host),
            cors_origins,
            store_backend: var_or("STORE_BACKEND", "postgres").parse()?,
            redis_url: var_or("REDIS_URL", &defaults.redis_url),
            retry,
            document,
        })
    }

    /// Verificar si estamos en modo desarrollo
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }

    /// Obtener la dirección del servidor
    pub fn server_url(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_parsing() {
        assert_eq!("Postgres".parse::<StoreBackend>().unwrap(), StoreBackend::Postgres);
        assert_eq!(" redis ".parse::<StoreBackend>().unwrap(), StoreBackend::Redis);
        assert_eq!("memory".parse::<StoreBackend>().unwrap(), StoreBackend::Memory);
        assert!("mongo".parse::<StoreBackend>().is_err());
    }

    #[test]
    fn test_defaults() {
        let config = EnvironmentConfig::default();
        assert_eq!(config.server_url(), "0.0.0.0:3000");
        assert!(config.is_development());
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.document.chunk_size, 25);
        assert_eq!(config.document.chunk_delay, Duration::from_millis(100));
    }
}
