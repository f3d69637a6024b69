//! External mount drivers
//!
//! The orchestrator never touches a filesystem directly. Everything goes
//! through a [`MountDriver`]:
//! - mounting the remote host and the encrypting layer
//! - unmounting either layer
//! - creating and removing mountpoint directories
//! - asking whether a path is currently a mountpoint

mod system;

#[cfg(test)]
pub(crate) mod recording;

pub use system::{DriverPrograms, SystemDriver};

use crate::error::Result;
use std::path::Path;

/// Capabilities the orchestrator needs from the outside world
pub trait MountDriver {
    /// Mount `remote_root` on `host` at `mountpoint`
    fn mount_remote(&mut self, host: &str, remote_root: &str, mountpoint: &Path) -> Result<()>;

    /// Mount the decrypted view of `encrypted` at `decrypted`
    fn mount_encrypting(&mut self, encrypted: &Path, decrypted: &Path) -> Result<()>;

    /// Unmount `path`. Fails with [`Error::Busy`](crate::Error::Busy) while in use.
    fn unmount(&mut self, path: &Path) -> Result<()>;

    /// Create `path` and its parents if missing. Idempotent.
    fn ensure_directory(&mut self, path: &Path) -> Result<()>;

    /// Remove the now-empty mountpoint directory `path`
    fn remove_directory(&mut self, path: &Path) -> Result<()>;

    /// Whether `path` is currently the root of a mounted filesystem
    fn is_mounted(&mut self, path: &Path) -> Result<bool>;
}
