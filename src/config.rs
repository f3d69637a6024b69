//! Configuration management for stackmount
//!
//! A [`Config`] is built once per run from three layers, highest precedence
//! first: the rc file, the environment, the compiled-in defaults. The rc file
//! is never evaluated. Only five whitelisted names are read from it, and a
//! value is accepted only when it matches a conservative character class.

use crate::error::{Error, Result};
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

/// Default name of the encrypted/decrypted directory pair
pub const DEFAULT_DIR_NAME: &str = "c1e05ee6-8f3b-4a7d-9e52-6b1f0d4c2a97";

/// Default remote host
pub const DEFAULT_REMOTE_HOST: &str = "localhost";

/// Environment variable naming an alternative rc file
pub const CONFIG_PATH_ENV: &str = "STACKMOUNTRC";

/// rc file name, relative to the home directory
pub const DEFAULT_CONFIG_FILE: &str = ".stackmountrc";

/// Characters an rc file value may consist of
const SAFE_VALUE_CLASS: &str = r"[A-Za-z0-9_.,:@%+/-]+";

/// The only settings the rc file may provide
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    RemoteHost,
    HostMountpoint,
    RemoteRoot,
    DirName,
    DecryptedMountpoint,
}

impl Field {
    pub const ALL: [Field; 5] = [
        Field::RemoteHost,
        Field::HostMountpoint,
        Field::RemoteRoot,
        Field::DirName,
        Field::DecryptedMountpoint,
    ];

    /// Name used both as environment variable and rc file key
    pub fn name(self) -> &'static str {
        match self {
            Field::RemoteHost => "REMOTE_HOST",
            Field::HostMountpoint => "HOST_MOUNTPOINT",
            Field::RemoteRoot => "REMOTE_ROOT",
            Field::DirName => "DIR_NAME",
            Field::DecryptedMountpoint => "DECRYPTED_MOUNTPOINT",
        }
    }
}

/// Snapshot of the variables the resolver looks at
#[derive(Debug, Clone, Default)]
pub struct Environment {
    vars: HashMap<String, String>,
}

impl Environment {
    /// Capture the current process environment. Non-UTF-8 variables are skipped.
    pub fn from_process() -> Self {
        let vars = std::env::vars_os()
            .filter_map(|(key, value): (OsString, OsString)| {
                Some((key.into_string().ok()?, value.into_string().ok()?))
            })
            .collect();
        Environment { vars }
    }

    /// Build an environment from literal pairs
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Environment {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Look up a variable, trimmed, treating an empty value as unset
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars
            .get(name)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    /// `$HOME`, falling back to the platform's notion of it
    pub fn home(&self) -> Option<PathBuf> {
        self.get("HOME").map(PathBuf::from).or_else(dirs::home_dir)
    }

    /// `$STACKMOUNTRC`, else `~/.stackmountrc`
    pub fn config_file_path(&self) -> Option<PathBuf> {
        self.get(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .or_else(|| self.home().map(|home| home.join(DEFAULT_CONFIG_FILE)))
    }
}

/// Extracts whitelisted `NAME=value` assignments from rc file text
pub struct RcFileParser {
    patterns: Vec<(Field, Regex)>,
}

impl RcFileParser {
    pub fn new() -> Result<Self> {
        let patterns = Field::ALL
            .iter()
            .map(|&field| {
                let pattern = format!(r"^\s*{}=({})\s*$", field.name(), SAFE_VALUE_CLASS);
                Regex::new(&pattern)
                    .map(|regex| (field, regex))
                    .map_err(|e| Error::Config(format!("invalid pattern for {}: {}", field.name(), e)))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(RcFileParser { patterns })
    }

    /// Return the accepted values. When a name appears on several lines the last
    /// acceptable one wins. Lines for other names are ignored.
    pub fn parse(&self, contents: &str) -> HashMap<Field, String> {
        let mut values = HashMap::new();

        for (lineno, line) in contents.lines().enumerate() {
            for (field, pattern) in &self.patterns {
                if let Some(captures) = pattern.captures(line) {
                    values.insert(*field, captures[1].to_string());
                } else if is_assignment_to(line, *field) {
                    // Never log the value itself; it may be hostile.
                    warn!(
                        "Ignoring {} on line {}: value contains disallowed characters",
                        field.name(),
                        lineno + 1
                    );
                }
            }
        }

        values
    }
}

fn is_assignment_to(line: &str, field: Field) -> bool {
    line.trim_start()
        .strip_prefix(field.name())
        .is_some_and(|rest| rest.starts_with('='))
}

/// Resolved configuration, read-only once built
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Config {
    remote_host: String,
    host_mountpoint: PathBuf,
    remote_root: String,
    dir_name: String,
    decrypted_mountpoint: PathBuf,
}

impl Config {
    /// Resolve from the environment and the rc file it points to.
    ///
    /// `config_path` overrides the rc file location. A missing or unreadable
    /// rc file is not an error.
    pub fn load(env: &Environment, config_path: Option<&Path>) -> Result<Self> {
        let path = config_path
            .map(Path::to_path_buf)
            .or_else(|| env.config_file_path());

        let contents = path.as_deref().and_then(|path| match std::fs::read_to_string(path) {
            Ok(contents) => {
                debug!("Read config file {:?}", path);
                Some(contents)
            }
            Err(e) => {
                debug!("Skipping config file {:?}: {}", path, e);
                None
            }
        });

        Self::resolve(env, contents.as_deref())
    }

    /// Merge defaults, environment and rc file contents into a validated config
    pub fn resolve(env: &Environment, config_file: Option<&str>) -> Result<Self> {
        let file_values = match config_file {
            Some(contents) => RcFileParser::new()?.parse(contents),
            None => HashMap::new(),
        };

        let explicit = |field: Field| -> Option<String> {
            file_values
                .get(&field)
                .cloned()
                .or_else(|| env.get(field.name()).map(str::to_string))
        };

        let home = env.home();
        let home_default = |field: Field| -> Result<PathBuf> {
            home.clone().ok_or_else(|| {
                Error::Config(format!(
                    "cannot determine home directory for default {}",
                    field.name()
                ))
            })
        };

        let remote_host =
            explicit(Field::RemoteHost).unwrap_or_else(|| DEFAULT_REMOTE_HOST.to_string());

        let host_mountpoint = match explicit(Field::HostMountpoint) {
            Some(value) => PathBuf::from(value),
            None => home_default(Field::HostMountpoint)?
                .join("mnt")
                .join(&remote_host),
        };

        let remote_root = match explicit(Field::RemoteRoot) {
            Some(value) => value,
            None => home_default(Field::RemoteRoot)?
                .to_string_lossy()
                .into_owned(),
        };

        let dir_name = explicit(Field::DirName).unwrap_or_else(|| DEFAULT_DIR_NAME.to_string());

        let decrypted_mountpoint = match explicit(Field::DecryptedMountpoint) {
            Some(value) => PathBuf::from(value),
            None => home_default(Field::DecryptedMountpoint)?.join("mnt"),
        };

        let config = Config {
            remote_host,
            host_mountpoint,
            remote_root,
            dir_name,
            decrypted_mountpoint,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check the invariants every resolved config must hold
    pub fn validate(&self) -> Result<()> {
        if self.remote_host.is_empty() {
            return Err(Error::Config("REMOTE_HOST must not be empty".to_string()));
        }
        // Both are handed to the remote driver as arguments; a leading dash
        // would be read as an option.
        if self.remote_host.starts_with('-') {
            return Err(Error::Config("REMOTE_HOST must not start with '-'".to_string()));
        }
        if self.remote_root.is_empty() || self.remote_root.starts_with('-') {
            return Err(Error::Config(
                "REMOTE_ROOT must be non-empty and not start with '-'".to_string(),
            ));
        }

        for (field, path) in [
            (Field::HostMountpoint, &self.host_mountpoint),
            (Field::DecryptedMountpoint, &self.decrypted_mountpoint),
        ] {
            if !path.is_absolute() {
                return Err(Error::Config(format!(
                    "{} must be an absolute path, got {:?}",
                    field.name(),
                    path
                )));
            }
        }

        let mut components = Path::new(&self.dir_name).components();
        let single_normal = matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        );
        if !single_normal || self.dir_name.contains('/') {
            return Err(Error::Config(format!(
                "DIR_NAME must be a single path component, got {:?}",
                self.dir_name
            )));
        }

        Ok(())
    }

    pub fn remote_host(&self) -> &str {
        &self.remote_host
    }

    pub fn host_mountpoint(&self) -> &Path {
        &self.host_mountpoint
    }

    pub fn remote_root(&self) -> &str {
        &self.remote_root
    }

    pub fn dir_name(&self) -> &str {
        &self.dir_name
    }

    pub fn decrypted_mountpoint(&self) -> &Path {
        &self.decrypted_mountpoint
    }
}
