// tahoma-core: Session, polling and execution tracking between tahoma-api
// and its consumers (CLI, device façades).

pub mod config;
pub mod connection;
pub mod device;
pub mod error;
pub mod event;
pub mod model;
pub mod registry;

mod router;
mod session;
mod store;
mod tracker;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{ConnectionConfig, TlsVerification};
pub use connection::{Connection, ExecutionHandle};
pub use device::{DeviceHandle, DeviceSelector, DeviceView};
pub use error::CoreError;
pub use event::{ConnectionEvent, ExecStateChange};
pub use model::{Device, ExecutionOutcome, ExecutionState, StateValue};
pub use registry::{ConnectionRegistry, RegistryChange};
pub use tracker::PendingExecutionInfo;

pub use tahoma_api::CommandRecord;
