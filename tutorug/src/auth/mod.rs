//! Authentication and access control

pub mod gate;
pub mod jwt;

pub use gate::{require_owner, AccessGate};
pub use jwt::{extract_token_from_header, Claims, JwtValidator, TOKEN_TTL_SECS};
