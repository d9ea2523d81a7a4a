//! Platform preconditions the Orchestrator checks before a session starts:
//! the persistent data directory, free-space margin, and network/metered
//! state (§4.4 step 1/3, §9).

mod data_dir;
mod disk;
mod error;
mod network;

pub use data_dir::persistent_data_dir;
pub use disk::{available_bytes, required_with_margin, STORAGE_MARGIN_FRACTION};
pub use error::PlatformError;
pub use network::{NetworkMonitor, SystemNetworkMonitor};
