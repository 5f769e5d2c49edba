//! Escritor con reintentos por concurrencia
//!
//! Leer, mutar y escribir condicionado al token leído. Un conflicto vuelve
//! a leer y reaplica la mutación; un error transitorio espera antes de
//! reintentar. Tras `max_attempts` intentos el error sale tipado.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::models::{ConditionalWrite, VehicleDocument};
use crate::repositories::DocumentStore;
use crate::utils::errors::{StoreError, WriteError};
use crate::utils::Clock;

/// Política de reintentos compartida por ambas variantes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(50),
        }
    }
}

impl RetryPolicy {
    /// Ejecutar una operación del almacén reintentando solo los errores
    /// transitorios
    pub async fn retry_transient<T, F, Fut>(
        &self,
        operation: &str,
        mut run: F,
    ) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match run().await {
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    debug!(
                        "⏳ {}: error transitorio (intento {}/{}): {}",
                        operation, attempt, max_attempts, e
                    );
                    tokio::time::sleep(self.delay).await;
                }
                result => return result,
            }
        }
    }
}

pub struct ConcurrencyRetryWriter<D: ?Sized> {
    store: Arc<D>,
    clock: Arc<dyn Clock>,
    policy: RetryPolicy,
}

impl<D: DocumentStore + ?Sized> ConcurrencyRetryWriter<D> {
    pub fn new(store: Arc<D>, clock: Arc<dyn Clock>, policy: RetryPolicy) -> Self {
        Self { store, clock, policy }
    }

    /// Escribir el documento de un vehículo
    ///
    /// `mutate` recibe el documento actual (o `None` si no existe) y devuelve
    /// el nuevo; puede invocarse varias veces, una por intento. La fecha de
    /// modificación y el token se sellan aquí.
    pub async fn write_vehicle<F>(
        &self,
        registration: &str,
        mut mutate: F,
    ) -> Result<VehicleDocument, WriteError>
    where
        F: FnMut(Option<VehicleDocument>) -> VehicleDocument + Send,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.try_write(registration, &mut mutate).await {
                Ok(document) => {
                    debug!("💾 Vehículo {} escrito (intento {})", registration, attempt);
                    return Ok(document);
                }
                Err(StoreError::Conflict(message)) => {
                    if attempt >= max_attempts {
                        warn!("⚠️ Conflicto persistente en {}: {}", registration, message);
                        return Err(WriteError::ConflictExhausted {
                            registration: registration.to_string(),
                            attempts: attempt,
                        });
                    }
                    debug!("🔄 Conflicto en {}, releyendo (intento {})", registration, attempt);
                }
                Err(StoreError::Transient(message)) => {
                    if attempt >= max_attempts {
                        warn!("⚠️ Almacén no disponible para {}: {}", registration, message);
                        return Err(WriteError::TransientExhausted {
                            registration: registration.to_string(),
                            attempts: attempt,
                            message,
                        });
                    }
                    debug!(
                        "⏳ Error transitorio en {}, reintentando en {:?}",
                        registration, self.policy.delay
                    );
                    tokio::time::sleep(self.policy.delay).await;
                }
                Err(source) => {
                    return Err(WriteError::Store {
                        registration: registration.to_string(),
                        source,
                    });
                }
            }
        }
    }

    async fn try_write<F>(
        &self,
        registration: &str,
        mutate: &mut F,
    ) -> Result<VehicleDocument, StoreError>
    where
        F: FnMut(Option<VehicleDocument>) -> VehicleDocument + Send,
    {
        let current = self.store.read_vehicle(registration).await?;
        let expected_token = current.as_ref().map(|d| d.version_token().to_string());

        let mut document = mutate(current);
        document.vehicle.touch(self.clock.now());

        let write = ConditionalWrite {
            document,
            expected_token,
        };
        self.store.write_vehicle(&write).await?;
        Ok(write.document)
    }
}
