//! Shopkeep Domain - Core client types
//!
//! This crate defines the domain model for the Shopkeep storefront client:
//! access tokens and their embedded claims, request/response descriptors,
//! client settings and the refresh state machine.
//! All types here are pure Rust with no I/O dependencies.

pub mod auth;
pub mod error;
pub mod request;
pub mod response;
pub mod settings;
pub mod state;

pub use auth::{AccessToken, AuthGrant, TokenClaims, TokenStatus, decode_expiry};
pub use error::{DomainError, DomainResult};
pub use request::{FormPart, HttpMethod, MultipartForm, PartValue, PendingRequest, RequestBody};
pub use response::ResponseSpec;
pub use settings::ClientSettings;
pub use state::RefreshState;
