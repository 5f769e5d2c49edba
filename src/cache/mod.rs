//! Cache
//!
//! Tokens de versión y validación de caché HTTP.

pub mod validator;
pub mod version_token;

pub use validator::CacheValidator;
pub use version_token::VersionToken;
