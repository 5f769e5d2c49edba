//! Almacén documental Redis
//!
//! Un documento JSON por vehículo (`fleet_status:vehicle:{MATRÍCULA}`) más
//! un conjunto índice con todas las matrículas. Las escrituras condicionales
//! se ejecutan como scripts Lua, que Redis aplica de forma atómica: el
//! script compara el token del documento guardado con el esperado antes de
//! escribir.

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use redis::{aio::ConnectionManager, AsyncCommands, Script};
use tracing::{debug, info};

use crate::models::{ConditionalWrite, VehicleDocument};
use crate::repositories::store::DocumentStore;
use crate::utils::errors::StoreError;

const KEY_PREFIX: &str = "fleet_status";

/// KEYS = [índice, doc_1 .. doc_n]; ARGV = [matrícula_i, token_esperado_i, json_i]*
/// Un token esperado vacío exige que el documento no exista.
const CONDITIONAL_WRITE_SCRIPT: &str = r#"
local n = #KEYS - 1
for i = 1, n do
  local expected = ARGV[(i - 1) * 3 + 2]
  local current = redis.call('GET', KEYS[i + 1])
  if expected == '' then
    if current then return 0 end
  else
    if not current then return 0 end
    local doc = cjson.decode(current)
    if doc['vehicle']['version_token'] ~= expected then return 0 end
  end
end
for i = 1, n do
  redis.call('SET', KEYS[i + 1], ARGV[(i - 1) * 3 + 3])
  redis.call('SADD', KEYS[1], ARGV[(i - 1) * 3 + 1])
end
return 1
"#;

/// KEYS = [marcador]; ARGV = [día]. El marcador guarda días desde la era
/// común y solo avanza.
const ADVANCE_MARKER_SCRIPT: &str = r#"
local current = tonumber(redis.call('GET', KEYS[1]))
local proposed = tonumber(ARGV[1])
if current and current >= proposed then return 0 end
redis.call('SET', KEYS[1], ARGV[1])
return 1
"#;

/// Cliente Redis del almacén documental
#[derive(Clone)]
pub struct RedisDocumentStore {
    manager: ConnectionManager,
    namespace: String,
}

impl RedisDocumentStore {
    /// Conectar y verificar con PING
    pub async fn connect(redis_url: &str) -> Result<Self, StoreError> {
        info!("🔗 Conectando a Redis: {}", redis_url);

        let client = redis::Client::open(redis_url)?;
        let manager = ConnectionManager::new(client).await?;

        let mut conn = manager.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;

        info!("✅ Redis conectado exitosamente");
        Ok(Self::with_namespace(manager, KEY_PREFIX))
    }

    pub fn with_namespace(manager: ConnectionManager, namespace: &str) -> Self {
        Self {
            manager,
            namespace: namespace.to_string(),
        }
    }

    fn vehicle_key(&self, registration: &str) -> String {
        format!("{}:vehicle:{}", self.namespace, registration)
    }

    fn index_key(&self) -> String {
        format!("{}:vehicles", self.namespace)
    }

    fn marker_key(&self) -> String {
        format!("{}:resync_marker", self.namespace)
    }

    async fn conditional_write(&self, writes: &[ConditionalWrite]) -> Result<(), StoreError> {
        if writes.is_empty() {
            return Ok(());
        }

        let script = Script::new(CONDITIONAL_WRITE_SCRIPT);
        let mut invocation = script.prepare_invoke();
        invocation.key(self.index_key());
        for write in writes {
            let registration = write.document.registration();
            invocation.key(self.vehicle_key(registration));
            invocation.arg(registration);
            invocation.arg(write.expected_token.as_deref().unwrap_or(""));
            invocation.arg(serde_json::to_string(&write.document)?);
        }

        let mut conn = self.manager.clone();
        let applied: i32 = invocation.invoke_async(&mut conn).await?;
        if applied == 1 {
            debug!("💾 {} documento(s) escritos", writes.len());
            Ok(())
        } else {
            Err(StoreError::Conflict(format!(
                "conditional write rejected for {} document(s)",
                writes.len()
            )))
        }
    }
}

#[async_trait]
impl DocumentStore for RedisDocumentStore {
    async fn read_vehicle(
        &self,
        registration: &str,
    ) -> Result<Option<VehicleDocument>, StoreError> {
        let mut conn = self.manager.clone();
        let raw: Option<String> = conn.get(self.vehicle_key(registration)).await?;
        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn write_vehicle(&self, write: &ConditionalWrite) -> Result<(), StoreError> {
        self.conditional_write(std::slice::from_ref(write)).await
    }

    async fn write_batch(&self, writes: &[ConditionalWrite]) -> Result<(), StoreError> {
        self.conditional_write(writes).await
    }

    async fn list_documents(&self) -> Result<Vec<VehicleDocument>, StoreError> {
        let mut conn = self.manager.clone();
        let mut registrations: Vec<String> = conn.smembers(self.index_key()).await?;
        if registrations.is_empty() {
            return Ok(Vec::new());
        }
        registrations.sort();

        let keys: Vec<String> = registrations.iter().map(|r| self.vehicle_key(r)).collect();
        let raw: Vec<Option<String>> = redis::cmd("MGET").arg(&keys).query_async(&mut conn).await?;

        raw.into_iter()
            .flatten()
            .map(|json| serde_json::from_str(&json).map_err(StoreError::from))
            .collect()
    }

    async fn resync_marker(&self) -> Result<Option<NaiveDate>, StoreError> {
        let mut conn = self.manager.clone();
        let raw: Option<i32> = conn.get(self.marker_key()).await?;
        raw.map(|days| {
            NaiveDate::from_num_days_from_ce_opt(days)
                .ok_or_else(|| StoreError::Backend(format!("invalid resync marker {}", days)))
        })
        .transpose()
    }

    async fn advance_resync_marker(&self, date: NaiveDate) -> Result<bool, StoreError> {
        let script = Script::new(ADVANCE_MARKER_SCRIPT);
        let mut invocation = script.prepare_invoke();
        invocation.key(self.marker_key());
        invocation.arg(date.num_days_from_ce());

        let mut conn = self.manager.clone();
        let advanced: i32 = invocation.invoke_async(&mut conn).await?;
        if advanced == 1 {
            debug!("📌 Marcador de resincronización avanzado a {}", date);
        }
        Ok(advanced == 1)
    }
}
