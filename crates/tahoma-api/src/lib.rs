// tahoma-api: Async Rust client for the TaHoma / Overkiz end-user cloud API

pub mod auth;
pub mod client;
pub mod error;
pub mod events;
pub mod exec;
pub mod models;
pub mod setup;
pub mod transport;

pub use client::TahomaClient;
pub use error::Error;
pub use models::{
    Action, CommandRecord, CurrentExecution, EventRecord, ExecutionEnvelope, RawDevice,
    StateEntry,
};
pub use transport::{TlsMode, TransportConfig};
