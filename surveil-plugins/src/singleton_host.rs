//! Singleton host: owns the lifecycle of one child OS process running a
//! [`surveil_transport::Server`], and a proxy to that server's
//! "register factory" object.
//!
//! The parent binds a one-shot rendezvous socket before spawning the child
//! and passes its path via `SURVEIL_SYNC_SOCKET`. The child binds its own
//! object socket at a path of its own choosing, then connects to the
//! rendezvous socket and sends that path back — mirroring the original's
//! `multiprocessing.Pipe`-based "child creates server, transmits URI back"
//! handshake, just carried over a Unix socket instead of a pipe since we
//! cross a real `exec`, not a `fork`.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::process::{Child, Command};

use surveil_transport::{Proxy, TransportError};
use thiserror::Error;

pub const SYNC_SOCKET_ENV: &str = "SURVEIL_SYNC_SOCKET";

#[derive(Debug, Error)]
pub enum SingletonHostError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("child exited before completing handoff")]
    ChildDied,
}

/// Called by the host process before spawning the child. Binds the
/// rendezvous socket and blocks (in a background thread via the returned
/// join handle style caller, or directly) until the child reports its
/// object socket path.
pub fn await_handoff(sync_path: &Path) -> Result<PathBuf, SingletonHostError> {
    let _ = std::fs::remove_file(sync_path);
    let listener = UnixListener::bind(sync_path)?;
    let (stream, _) = listener.accept()?;
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    reader.read_line(&mut line)?;
    let _ = std::fs::remove_file(sync_path);
    Ok(PathBuf::from(line.trim_end()))
}

/// Called by the child process once its own object server is bound and
/// serving, to report its socket path back to the waiting parent.
pub fn complete_handoff(sync_path: &Path, object_socket_path: &Path) -> Result<(), SingletonHostError> {
    let mut stream = UnixStream::connect(sync_path)?;
    let line = format!("{}\n", object_socket_path.display());
    stream.write_all(line.as_bytes())?;
    stream.flush()?;
    Ok(())
}

/// The parent-side handle to a spawned singleton process.
pub struct SingletonHost {
    child: Child,
    object_socket_path: PathBuf,
}

impl SingletonHost {
    /// Spawns `exe` with `args`, additionally setting `SURVEIL_SYNC_SOCKET`
    /// so the child can complete the handoff via [`complete_handoff`], plus
    /// whatever `extra_env` the caller needs the child to see (e.g. which
    /// process role to boot as). `sync_dir` is a directory the parent
    /// controls (typically a per-run `tempfile::TempDir`).
    pub fn spawn(
        exe: &Path,
        args: &[String],
        sync_dir: &Path,
        extra_env: &[(String, String)],
    ) -> Result<Self, SingletonHostError> {
        let sync_path = sync_dir.join(format!("sync-{}.sock", uuid::Uuid::new_v4()));
        let _ = std::fs::remove_file(&sync_path);
        let listener = UnixListener::bind(&sync_path)?;

        let mut command = Command::new(exe);
        command.args(args).env(SYNC_SOCKET_ENV, &sync_path);
        for (key, value) in extra_env {
            command.env(key, value);
        }
        let mut child = command.spawn()?;

        let (stream, _) = loop {
            match listener.accept() {
                Ok(pair) => break pair,
                Err(e) => {
                    if let Some(status) = child.try_wait()? {
                        log::error!("child exited during handoff with {status}");
                        return Err(SingletonHostError::ChildDied);
                    }
                    return Err(e.into());
                }
            }
        };
        let mut reader = BufReader::new(stream);
        let mut line = String::new();
        reader.read_line(&mut line)?;
        let _ = std::fs::remove_file(&sync_path);

        Ok(SingletonHost {
            child,
            object_socket_path: PathBuf::from(line.trim_end()),
        })
    }

    pub fn object_socket_path(&self) -> &Path {
        &self.object_socket_path
    }

    pub fn open_proxy(&self, target: &str) -> Result<Proxy, SingletonHostError> {
        Ok(Proxy::connect(&self.object_socket_path, target)?)
    }

    /// Convenience wrapper matching the original's `host.instantiate(type)`:
    /// calls `instantiate` on the well-known `register_factory` object.
    pub fn instantiate(&self, type_name: &str) -> Result<serde_json::Value, SingletonHostError> {
        let proxy = self.open_proxy("register_factory")?;
        Ok(proxy.call(
            "instantiate",
            vec![serde_json::Value::String(type_name.to_string())],
            std::collections::HashMap::new(),
        )?)
    }

    pub fn terminate(&mut self) -> std::io::Result<()> {
        self.child.kill()
    }

    pub fn wait(&mut self) -> std::io::Result<std::process::ExitStatus> {
        self.child.wait()
    }
}

impl Drop for SingletonHost {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn handoff_delivers_the_childs_object_socket_path() {
        let dir = tempfile::tempdir().unwrap();
        let sync_path = dir.path().join("sync.sock");
        let object_path = dir.path().join("object.sock");

        let sync_path_clone = sync_path.clone();
        let object_path_clone = object_path.clone();
        let child = thread::spawn(move || {
            // Simulates the child: bind its own object socket, then report back.
            thread::sleep(std::time::Duration::from_millis(20));
            complete_handoff(&sync_path_clone, &object_path_clone).unwrap();
        });

        let reported = await_handoff(&sync_path).unwrap();
        child.join().unwrap();
        assert_eq!(reported, object_path);
    }
}
