//! HTTP request domain types

mod body;
mod method;
mod pending;

pub use body::{FormPart, MultipartForm, PartValue, RequestBody};
pub use method::HttpMethod;
pub use pending::PendingRequest;
