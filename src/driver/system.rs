//! Driver backed by external executables
//!
//! Every call builds a [`Command`] from discrete arguments. No shell is ever
//! involved, so configuration values cannot smuggle in extra commands.

use super::MountDriver;
use crate::error::{Error, Result};
use nix::errno::Errno;
use nix::sys::stat::stat;
use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// How often a bounded wait checks on the child
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Executables used for each operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverPrograms {
    /// Invoked as `<remote_mount> <host>:<remote_root> <mountpoint>`
    pub remote_mount: String,
    /// Invoked as `<encrypting_mount> <encrypted> <decrypted>`
    pub encrypting_mount: String,
    /// Invoked as `<unmount> <unmount_args...> <path>`
    pub unmount: String,
    pub unmount_args: Vec<String>,
}

impl Default for DriverPrograms {
    fn default() -> Self {
        #[cfg(target_os = "linux")]
        let (unmount, unmount_args) = ("fusermount", vec!["-u".to_string()]);

        #[cfg(not(target_os = "linux"))]
        let (unmount, unmount_args) = ("umount", Vec::new());

        DriverPrograms {
            remote_mount: "sshfs".to_string(),
            encrypting_mount: "encfs".to_string(),
            unmount: unmount.to_string(),
            unmount_args,
        }
    }
}

/// Outcome of a finished external call
struct Completed {
    status: ExitStatus,
    stderr: String,
}

/// [`MountDriver`] that shells out to real mount tools
#[derive(Debug, Clone, Default)]
pub struct SystemDriver {
    programs: DriverPrograms,
    timeout: Option<Duration>,
}

impl SystemDriver {
    pub fn new(programs: DriverPrograms) -> Self {
        SystemDriver {
            programs,
            timeout: None,
        }
    }

    /// Kill any external call still running after `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn programs(&self) -> &DriverPrograms {
        &self.programs
    }

    fn remote_mount_command(&self, host: &str, remote_root: &str, mountpoint: &Path) -> Command {
        let mut command = Command::new(&self.programs.remote_mount);
        command.arg(format!("{}:{}", host, remote_root)).arg(mountpoint);
        command
    }

    fn encrypting_mount_command(&self, encrypted: &Path, decrypted: &Path) -> Command {
        let mut command = Command::new(&self.programs.encrypting_mount);
        command.arg(encrypted).arg(decrypted);
        command
    }

    fn unmount_command(&self, path: &Path) -> Command {
        let mut command = Command::new(&self.programs.unmount);
        command.args(&self.programs.unmount_args).arg(path);
        command
    }

    /// Run a mount tool with the terminal attached, so it can prompt for
    /// passwords and print its own diagnostics.
    fn run_interactive(&self, mut command: Command) -> Result<()> {
        command
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        let program = program_name(&command);
        let completed = self.run(command, &program)?;
        check_status(program, completed)
    }

    /// Run a tool with stderr captured
    fn run_captured(&self, mut command: Command) -> Result<Completed> {
        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        let program = program_name(&command);
        self.run(command, &program)
    }

    fn run(&self, mut command: Command, program: &str) -> Result<Completed> {
        debug!("Running {:?}", command);

        let mut child = command.spawn().map_err(|source| Error::DriverSpawn {
            program: program.to_string(),
            source,
        })?;

        // Drain stderr on its own thread so a chatty tool cannot fill the
        // pipe and stall.
        let reader = child.stderr.take().map(|mut pipe| {
            thread::spawn(move || {
                let mut buf = String::new();
                let _ = pipe.read_to_string(&mut buf);
                buf
            })
        });

        let status = self.wait(&mut child, program)?;
        let stderr = reader
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();

        Ok(Completed {
            status,
            stderr: stderr.trim().to_string(),
        })
    }

    fn wait(&self, child: &mut Child, program: &str) -> Result<ExitStatus> {
        let Some(timeout) = self.timeout else {
            return Ok(child.wait()?);
        };

        let deadline = Instant::now() + timeout;
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }
            if Instant::now() >= deadline {
                warn!("{} still running after {:?}, killing it", program, timeout);
                let _ = child.kill();
                let _ = child.wait();
                return Err(Error::DriverTimeout {
                    program: program.to_string(),
                    timeout,
                });
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

fn program_name(command: &Command) -> String {
    command.get_program().to_string_lossy().into_owned()
}

fn check_status(program: String, completed: Completed) -> Result<()> {
    if completed.status.success() {
        Ok(())
    } else {
        Err(Error::Driver {
            program,
            status: completed.status,
            stderr: completed.stderr,
        })
    }
}

fn is_busy_message(stderr: &str) -> bool {
    stderr.to_ascii_lowercase().contains("busy")
}

impl MountDriver for SystemDriver {
    fn mount_remote(&mut self, host: &str, remote_root: &str, mountpoint: &Path) -> Result<()> {
        self.run_interactive(self.remote_mount_command(host, remote_root, mountpoint))
    }

    fn mount_encrypting(&mut self, encrypted: &Path, decrypted: &Path) -> Result<()> {
        self.run_interactive(self.encrypting_mount_command(encrypted, decrypted))
    }

    fn unmount(&mut self, path: &Path) -> Result<()> {
        let program = self.programs.unmount.clone();
        let completed = self.run_captured(self.unmount_command(path))?;

        if !completed.status.success() && is_busy_message(&completed.stderr) {
            return Err(Error::Busy {
                path: path.to_path_buf(),
            });
        }
        check_status(program, completed)
    }

    fn ensure_directory(&mut self, path: &Path) -> Result<()> {
        std::fs::create_dir_all(path).map_err(|e| Error::from_io(path, e))
    }

    fn remove_directory(&mut self, path: &Path) -> Result<()> {
        std::fs::remove_dir(path).map_err(|e| Error::from_io(path, e))
    }

    fn is_mounted(&mut self, path: &Path) -> Result<bool> {
        let meta = match stat(path) {
            Ok(meta) => meta,
            Err(Errno::ENOENT) | Err(Errno::ENOTDIR) => return Ok(false),
            // A FUSE mount whose daemon died still occupies the mountpoint.
            Err(Errno::ENOTCONN) => return Ok(true),
            Err(errno) => return Err(Error::from_io(path, errno.into())),
        };

        let parent = path.parent().unwrap_or(path);
        let parent_meta = stat(parent).map_err(|errno| Error::from_io(parent, errno.into()))?;

        // Different device from the parent, or the filesystem root itself.
        Ok(meta.st_dev != parent_meta.st_dev || meta.st_ino == parent_meta.st_ino)
    }
}
