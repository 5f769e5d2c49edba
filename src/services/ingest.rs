use async_trait::async_trait;

use crate::models::{IncidentReport, ReconcileSummary};
use crate::utils::errors::ReconcileError;

/// Punto de entrada común de la ingesta de incidentes
///
/// Lo implementan el reconciliador transaccional y el documental; la
/// fachada no necesita saber cuál está detrás.
#[async_trait]
pub trait IncidentIngestor: Send + Sync {
    async fn ingest(
        &self,
        reports: Vec<IncidentReport>,
    ) -> Result<ReconcileSummary, ReconcileError>;
}
