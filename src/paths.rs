//! Mount paths derived from a resolved configuration

use crate::config::Config;
use crate::error::Layer;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Where each layer lives on the local machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MountPaths {
    /// Mountpoint of the remote filesystem
    pub host_mountpoint: PathBuf,
    /// Encrypted backing directory, hidden inside the remote mount
    pub encrypted_path: PathBuf,
    /// Decrypted view exposed locally
    pub decrypted_path: PathBuf,
}

impl MountPaths {
    /// Derive the stacked paths. Pure; performs no I/O.
    pub fn derive(config: &Config) -> Self {
        MountPaths {
            host_mountpoint: config.host_mountpoint().to_path_buf(),
            encrypted_path: config
                .host_mountpoint()
                .join(format!(".{}", config.dir_name())),
            decrypted_path: config.decrypted_mountpoint().join(config.dir_name()),
        }
    }

    /// Unmount order: data layer first, then the host layer beneath it
    pub fn unmount_order(&self) -> [(Layer, &Path); 2] {
        [
            (Layer::Encrypting, self.decrypted_path.as_path()),
            (Layer::Remote, self.host_mountpoint.as_path()),
        ]
    }
}
