//! Tokens de versión
//!
//! Hash determinista (SHA-256, base64 sin relleno) sobre pares
//! (identidad, última modificación). Sirve a la vez como precondición de
//! concurrencia optimista por vehículo y como ETag de consultas completas.

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, SecondsFormat, Utc};
use sha2::{Digest, Sha256};

pub struct VersionToken;

impl VersionToken {
    /// Calcular el token de un conjunto de entradas
    ///
    /// Las entradas se ordenan por id (y fecha como desempate), de modo que
    /// cualquier permutación de la entrada produce el mismo token.
    pub fn compute<I, K>(entries: I, salt: Option<&str>) -> String
    where
        I: IntoIterator<Item = (K, DateTime<Utc>)>,
        K: ToString,
    {
        let mut entries: Vec<(String, DateTime<Utc>)> = entries
            .into_iter()
            .map(|(id, modified)| (id.to_string(), modified))
            .collect();
        entries.sort();

        let mut payload = String::new();
        if let Some(salt) = salt {
            payload.push_str(salt);
        }
        for (id, modified) in &entries {
            payload.push_str(id);
            payload.push('-');
            payload.push_str(&modified.to_rfc3339_opts(SecondsFormat::Micros, true));
        }

        let digest = Sha256::digest(payload.as_bytes());
        STANDARD.encode(digest).trim_end_matches('=').to_string()
    }

    /// Token de una única entidad
    pub fn for_entity<K: ToString>(id: K, last_modified: DateTime<Utc>) -> String {
        Self::compute([(id, last_modified)], None)
    }
}
