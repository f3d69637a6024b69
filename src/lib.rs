//! stackmount - a remote directory, mounted and decrypted in one step
//!
//! A remote filesystem is mounted over the network (the host layer) and an
//! encrypting filesystem is mounted on a hidden directory inside it (the data
//! layer), exposing the decrypted view locally. Both layers are provided by
//! external drivers; this crate resolves the configuration and sequences the
//! mounts.

pub mod config;
pub mod driver;
pub mod error;
pub mod orchestrator;
pub mod paths;

pub use config::{Config, Environment};
pub use error::{CompositeUnmountError, Error, Layer, Result};
pub use orchestrator::{MountOrchestrator, MountState};
pub use paths::MountPaths;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{Config, Environment};
    pub use crate::driver::{MountDriver, SystemDriver};
    pub use crate::error::{Error, Result};
    pub use crate::orchestrator::MountOrchestrator;
    pub use crate::paths::MountPaths;
}
