//! Infrastructure adapters

mod reqwest_transport;
mod session_listener;
mod system_clock;

pub use reqwest_transport::ReqwestTransport;
pub use session_listener::LoggingSessionListener;
pub use system_clock::SystemClock;
