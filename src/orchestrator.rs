//! Mount lifecycle orchestration
//!
//! Brings the stack up host layer first, then the encrypting layer on top of
//! it, and takes it down in the reverse order. The orchestrator keeps no
//! persistent state: whatever is mounted is discovered by asking the driver.
//!
//! Failure policy:
//! - a failed second stage leaves the host layer mounted; nothing is rolled back
//! - unmount always attempts both layers and reports every failure

use crate::config::Config;
use crate::driver::MountDriver;
use crate::error::{CompositeUnmountError, Error, Layer, Result};
use crate::paths::MountPaths;
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info, warn};

/// Position in the mount/unmount sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    HostMounting,
    HostMounted,
    DataMounting,
    DataMounted,
    DataUnmounting,
    HostUnmounting,
}

/// What is currently mounted, as observed through the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MountState {
    Unmounted,
    HostMounted,
    FullyMounted,
    /// The decrypted view is mounted without the host layer beneath it
    DataOnly,
}

/// Drives a [`MountDriver`] through the stacked mount lifecycle
pub struct MountOrchestrator<D: MountDriver> {
    driver: D,
    stage: Stage,
}

impl<D: MountDriver> MountOrchestrator<D> {
    pub fn new(driver: D) -> Self {
        MountOrchestrator {
            driver,
            stage: Stage::Idle,
        }
    }

    /// Stage reached by the last operation
    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn into_driver(self) -> D {
        self.driver
    }

    fn enter(&mut self, stage: Stage) {
        debug!("{:?} -> {:?}", self.stage, stage);
        self.stage = stage;
    }

    /// Mount the remote host, then the decrypted view on top of it.
    ///
    /// Refuses to start when either mountpoint is already in use.
    pub fn perform_mount(&mut self, config: &Config, paths: &MountPaths) -> Result<()> {
        for path in [&paths.host_mountpoint, &paths.decrypted_path] {
            if self.driver.is_mounted(path)? {
                return Err(Error::AlreadyMounted { path: path.clone() });
            }
        }

        self.enter(Stage::HostMounting);
        info!(
            "Mounting {}:{} at {:?}",
            config.remote_host(),
            config.remote_root(),
            paths.host_mountpoint
        );
        self.mount_host(config, paths)
            .map_err(|e| Error::mount(Layer::Remote, e))?;
        self.enter(Stage::HostMounted);

        self.enter(Stage::DataMounting);
        info!(
            "Mounting decrypted view of {:?} at {:?}",
            paths.encrypted_path, paths.decrypted_path
        );
        if let Err(e) = self.mount_data(paths) {
            // The host layer stays up; the operator decides when to unmount it.
            warn!(
                "Encrypting mount failed, leaving {:?} mounted",
                paths.host_mountpoint
            );
            return Err(Error::mount(Layer::Encrypting, e));
        }
        self.enter(Stage::DataMounted);

        info!("Decrypted view available at {:?}", paths.decrypted_path);
        Ok(())
    }

    fn mount_host(&mut self, config: &Config, paths: &MountPaths) -> Result<()> {
        self.driver.ensure_directory(&paths.host_mountpoint)?;
        self.driver.mount_remote(
            config.remote_host(),
            config.remote_root(),
            &paths.host_mountpoint,
        )
    }

    fn mount_data(&mut self, paths: &MountPaths) -> Result<()> {
        self.driver.ensure_directory(&paths.encrypted_path)?;
        self.driver.ensure_directory(&paths.decrypted_path)?;
        self.driver
            .mount_encrypting(&paths.encrypted_path, &paths.decrypted_path)
    }

    /// Unmount the decrypted view, then the host layer, removing each
    /// mountpoint directory once it is free.
    ///
    /// Both layers are always attempted; every failure is collected.
    pub fn perform_unmount(
        &mut self,
        paths: &MountPaths,
    ) -> std::result::Result<(), CompositeUnmountError> {
        let mut failures = CompositeUnmountError::default();

        for (layer, path) in paths.unmount_order() {
            self.enter(match layer {
                Layer::Encrypting => Stage::DataUnmounting,
                Layer::Remote => Stage::HostUnmounting,
            });

            if let Err(e) = self.unmount_layer(layer, path) {
                warn!("Failed to unmount {} layer at {:?}: {}", layer, path, e);
                failures.push(layer, path.to_path_buf(), e);
            }
        }

        if failures.is_empty() {
            self.enter(Stage::Idle);
        }
        failures.into_result()
    }

    fn unmount_layer(&mut self, layer: Layer, path: &Path) -> Result<()> {
        if !self.driver.is_mounted(path)? {
            info!("{} layer at {:?} is not mounted, skipping", layer, path);
            return Ok(());
        }

        info!("Unmounting {} layer at {:?}", layer, path);
        self.driver.unmount(path)?;
        self.driver.remove_directory(path)
    }

    /// Observe which layers are mounted
    pub fn state(&mut self, paths: &MountPaths) -> Result<MountState> {
        let host = self.driver.is_mounted(&paths.host_mountpoint)?;
        let data = self.driver.is_mounted(&paths.decrypted_path)?;

        Ok(match (host, data) {
            (false, false) => MountState::Unmounted,
            (true, false) => MountState::HostMounted,
            (true, true) => MountState::FullyMounted,
            (false, true) => MountState::DataOnly,
        })
    }
}
