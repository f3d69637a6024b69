//! In-memory driver that records every call, for orchestrator tests

use super::MountDriver;
use crate::error::{Error, Result};
use std::collections::HashSet;
use std::io;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    MountRemote {
        host: String,
        remote_root: String,
        mountpoint: PathBuf,
    },
    MountEncrypting {
        encrypted: PathBuf,
        decrypted: PathBuf,
    },
    Unmount(PathBuf),
    EnsureDirectory(PathBuf),
    RemoveDirectory(PathBuf),
    IsMounted(PathBuf),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    /// Keyed by the mountpoint
    MountRemote,
    /// Keyed by the decrypted path
    MountEncrypting,
    Unmount,
    EnsureDirectory,
    RemoveDirectory,
}

#[derive(Debug, Clone, Copy)]
pub enum Fail {
    Busy,
    PermissionDenied,
    ExitCode(i32),
}

impl Fail {
    fn to_error(self, path: &Path) -> Error {
        match self {
            Fail::Busy => Error::Busy {
                path: path.to_path_buf(),
            },
            Fail::PermissionDenied => Error::Permission {
                path: path.to_path_buf(),
                source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
            },
            Fail::ExitCode(code) => Error::Driver {
                program: "fake".to_string(),
                status: ExitStatus::from_raw(code << 8),
                stderr: String::new(),
            },
        }
    }
}

/// Fake [`MountDriver`] keeping mount and directory state in memory
#[derive(Debug, Default)]
pub struct RecordingDriver {
    pub calls: Vec<Call>,
    pub mounted: HashSet<PathBuf>,
    pub directories: HashSet<PathBuf>,
    failures: Vec<(Op, PathBuf, Fail)>,
}

impl RecordingDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `op` on `path` fail with `fail`
    pub fn failing(mut self, op: Op, path: impl Into<PathBuf>, fail: Fail) -> Self {
        self.failures.push((op, path.into(), fail));
        self
    }

    /// Pretend `paths` are already mounted, with their directories present
    pub fn with_mounted<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        for path in paths {
            let path = path.into();
            self.directories.insert(path.clone());
            self.mounted.insert(path);
        }
        self
    }

    /// Calls other than the `is_mounted` probes
    pub fn actions(&self) -> Vec<Call> {
        self.calls
            .iter()
            .filter(|call| !matches!(call, Call::IsMounted(_)))
            .cloned()
            .collect()
    }

    fn check(&self, op: Op, path: &Path) -> Result<()> {
        match self
            .failures
            .iter()
            .find(|(o, p, _)| *o == op && p == path)
        {
            Some((_, _, fail)) => Err(fail.to_error(path)),
            None => Ok(()),
        }
    }
}

impl MountDriver for RecordingDriver {
    fn mount_remote(&mut self, host: &str, remote_root: &str, mountpoint: &Path) -> Result<()> {
        self.calls.push(Call::MountRemote {
            host: host.to_string(),
            remote_root: remote_root.to_string(),
            mountpoint: mountpoint.to_path_buf(),
        });
        self.check(Op::MountRemote, mountpoint)?;
        self.mounted.insert(mountpoint.to_path_buf());
        Ok(())
    }

    fn mount_encrypting(&mut self, encrypted: &Path, decrypted: &Path) -> Result<()> {
        self.calls.push(Call::MountEncrypting {
            encrypted: encrypted.to_path_buf(),
            decrypted: decrypted.to_path_buf(),
        });
        self.check(Op::MountEncrypting, decrypted)?;
        self.mounted.insert(decrypted.to_path_buf());
        Ok(())
    }

    fn unmount(&mut self, path: &Path) -> Result<()> {
        self.calls.push(Call::Unmount(path.to_path_buf()));
        self.check(Op::Unmount, path)?;
        self.mounted.remove(path);
        Ok(())
    }

    fn ensure_directory(&mut self, path: &Path) -> Result<()> {
        self.calls.push(Call::EnsureDirectory(path.to_path_buf()));
        self.check(Op::EnsureDirectory, path)?;
        self.directories.insert(path.to_path_buf());
        Ok(())
    }

    fn remove_directory(&mut self, path: &Path) -> Result<()> {
        self.calls.push(Call::RemoveDirectory(path.to_path_buf()));
        self.check(Op::RemoveDirectory, path)?;
        self.directories.remove(path);
        Ok(())
    }

    fn is_mounted(&mut self, path: &Path) -> Result<bool> {
        self.calls.push(Call::IsMounted(path.to_path_buf()));
        Ok(self.mounted.contains(path))
    }
}
