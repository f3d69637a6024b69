//! Error types for stackmount

use serde::Serialize;
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;
use thiserror::Error;

/// Result type used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// One of the two stacked mount layers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    /// Network filesystem mounted from the remote host
    Remote,
    /// Decrypted view over the encrypted backing directory
    Encrypting,
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Layer::Remote => f.write_str("remote"),
            Layer::Encrypting => f.write_str("encrypting"),
        }
    }
}

/// Errors produced by configuration resolution, the mount drivers and the orchestrator
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("{stage} mount failed: {source}")]
    Mount {
        stage: Layer,
        #[source]
        source: Box<Error>,
    },

    #[error("{} is already mounted", .path.display())]
    AlreadyMounted { path: PathBuf },

    #[error("{} is busy", .path.display())]
    Busy { path: PathBuf },

    #[error("permission denied for {}: {source}", .path.display())]
    Permission {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{program} exited with {status}{}", stderr_suffix(.stderr))]
    Driver {
        program: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("failed to run {program}: {source}")]
    DriverSpawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{program} did not finish within {}s", .timeout.as_secs())]
    DriverTimeout { program: String, timeout: Duration },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Wrap a failure that happened while bringing up `stage`
    pub fn mount(stage: Layer, source: Error) -> Self {
        Error::Mount {
            stage,
            source: Box::new(source),
        }
    }

    /// Map an I/O error on `path`, singling out permission failures
    pub fn from_io(path: impl Into<PathBuf>, err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::PermissionDenied {
            Error::Permission {
                path: path.into(),
                source: err,
            }
        } else {
            Error::Io(err)
        }
    }
}

fn stderr_suffix(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!(": {}", stderr)
    }
}

/// A single layer that could not be taken down
#[derive(Debug)]
pub struct UnmountFailure {
    pub layer: Layer,
    pub path: PathBuf,
    pub source: Error,
}

impl fmt::Display for UnmountFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.layer, self.path.display(), self.source)
    }
}

/// Per-layer unmount failures, in the order the layers were processed
#[derive(Debug, Default)]
pub struct CompositeUnmountError {
    pub failures: Vec<UnmountFailure>,
}

impl CompositeUnmountError {
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn push(&mut self, layer: Layer, path: PathBuf, source: Error) {
        self.failures.push(UnmountFailure {
            layer,
            path,
            source,
        });
    }

    /// `Ok(())` when every layer came down cleanly
    pub fn into_result(self) -> std::result::Result<(), Self> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for CompositeUnmountError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unmount failed for {} layer(s)", self.failures.len())?;
        for failure in &self.failures {
            write!(f, "; {}", failure)?;
        }
        Ok(())
    }
}

impl std::error::Error for CompositeUnmountError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.failures
            .first()
            .map(|failure| &failure.source as &(dyn std::error::Error + 'static))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_display() {
        assert_eq!(Layer::Remote.to_string(), "remote");
        assert_eq!(Layer::Encrypting.to_string(), "encrypting");
    }

    #[test]
    fn test_from_io_maps_permission_denied() {
        let err = Error::from_io(
            "/mnt/x",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(matches!(err, Error::Permission { .. }));

        let err = Error::from_io("/mnt/x", io::Error::new(io::ErrorKind::Other, "boom"));
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_composite_names_every_failure() {
        let mut composite = CompositeUnmountError::default();
        assert!(composite.is_empty());

        composite.push(
            Layer::Encrypting,
            PathBuf::from("/home/u/mnt/data"),
            Error::Busy {
                path: PathBuf::from("/home/u/mnt/data"),
            },
        );
        let message = composite.to_string();
        assert!(message.contains("1 layer(s)"));
        assert!(message.contains("encrypting"));
        assert!(message.contains("/home/u/mnt/data is busy"));
        assert!(composite.into_result().is_err());
    }
}
