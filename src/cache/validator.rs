//! Validación de caché
//!
//! Decide si el token que trae el cliente sigue siendo el vigente.

pub struct CacheValidator;

impl CacheValidator {
    /// Comparación exacta y sensible a mayúsculas; un token vacío nunca
    /// se considera vigente.
    pub fn is_unchanged(client_token: &str, current_token: &str) -> bool {
        !client_token.is_empty() && client_token == current_token
    }

    /// Extraer el token de una cabecera `If-None-Match`
    ///
    /// Solo se aceptan validadores fuertes (`"token"` o `token`); los débiles
    /// (`W/"..."`) y el comodín `*` devuelven `None`.
    pub fn token_from_if_none_match(header: &str) -> Option<&str> {
        let value = header.trim();
        if value.is_empty() || value == "*" || value.starts_with("W/") {
            return None;
        }
        let unquoted = value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .unwrap_or(value);
        if unquoted.is_empty() {
            None
        } else {
            Some(unquoted)
        }
    }

    /// Formato de cabecera `ETag` para un token
    pub fn etag(token: &str) -> String {
        format!("\"{}\"", token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_client_token_is_changed() {
        assert!(!CacheValidator::is_unchanged("", "abc"));
        assert!(!CacheValidator::is_unchanged("", ""));
    }

    #[test]
    fn test_exact_comparison() {
        assert!(CacheValidator::is_unchanged("abc", "abc"));
        assert!(!CacheValidator::is_unchanged("ABC", "abc"));
        assert!(!CacheValidator::is_unchanged("abc ", "abc"));
    }

    #[test]
    fn test_if_none_match_parsing() {
        assert_eq!(CacheValidator::token_from_if_none_match("\"abc\""), Some("abc"));
        assert_eq!(CacheValidator::token_from_if_none_match("abc"), Some("abc"));
        assert_eq!(CacheValidator::token_from_if_none_match("W/\"abc\""), None);
        assert_eq!(CacheValidator::token_from_if_none_match("*"), None);
        assert_eq!(CacheValidator::token_from_if_none_match("\"\""), None);
    }

    #[test]
    fn test_etag_round_trip() {
        let etag = CacheValidator::etag("tok");
        assert_eq!(CacheValidator::token_from_if_none_match(&etag), Some("tok"));
    }
}
