//! Shared cryptographic helpers for Nova chat services
//!
//! ## Modules
//! - `jwt`: bearer token verification (and signing for tests / local tooling)

pub mod jwt;

pub use jwt::{Claims, JwtError, TokenSigner, TokenVerifier};
