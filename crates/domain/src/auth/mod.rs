//! Access token types and expiry introspection

mod status;
mod token;

pub use status::TokenStatus;
pub use token::{AccessToken, AuthGrant, TokenClaims, decode_expiry};
