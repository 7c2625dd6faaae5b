//! Port definitions (interfaces)
//!
//! Ports define the boundaries between the application core and external systems.
//! Each port is a trait that can be implemented by adapters in the infrastructure layer.

mod clock;
mod http_transport;
mod session;
mod storage;

pub use clock::Clock;
pub use http_transport::{HttpTransport, OutboundRequest, TransportError};
pub use session::SessionListener;
pub use storage::{KeyValueStorage, StorageError};
