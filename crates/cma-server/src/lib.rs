//! Authoritative city server.
//!
//! Owns the true labor assignment of every city and answers the three city
//! labor requests of the protocol with processing acknowledgements and fresh
//! city info. Used in-process by the client session and its tests.

pub mod config;
pub mod connection;
pub mod state;

pub use config::{RequestPolicy, ServerConfig};
pub use connection::{Session, SessionState};
pub use state::{CityServer, ServerError};
