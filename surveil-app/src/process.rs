//! Process-role bootstrap: this binary re-execs itself for the CAMERA and
//! CHAT roles. `run()` in `main.rs` spawns each child with
//! [`PROCESS_ROLE_ENV`] set; `main` checks [`requested_role`] before
//! falling into the MAIN flow, and a child that finds it set calls
//! [`run_child`] instead.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use surveil_plugins::singleton_host::{complete_handoff, SYNC_SOCKET_ENV};
use surveil_plugins::{Housekeeper, PluginDefinition, PluginHost, ProcessTag, RegisterFactory, HOUSEKEEPER_NAME, REGISTER_FACTORY_NAME};
use surveil_transport::{ObjectRegistry, Server};

pub const PROCESS_ROLE_ENV: &str = "SURVEIL_PROCESS_ROLE";
pub const SCRATCH_DIR_ENV: &str = "SURVEIL_SCRATCH_DIR";
pub const AUTH_FILE_ENV: &str = "SURVEIL_AUTH_FILE";

/// The role this invocation should boot as, read from [`PROCESS_ROLE_ENV`].
/// `None` means the MAIN flow in `main::run`.
pub fn requested_role() -> Option<ProcessTag> {
    std::env::var(PROCESS_ROLE_ENV).ok().and_then(|v| v.parse().ok())
}

/// CAMERA/CHAT entry point: builds this process's own object registry and
/// plugin host, eagerly instantiates `defs`, registers the housekeeping and
/// register-factory objects every process carries, completes the handoff to
/// the waiting parent, then blocks until the parent kills it.
pub fn run_child(tag: ProcessTag, defs: Vec<PluginDefinition>) -> ExitCode {
    let sync_path = match std::env::var(SYNC_SOCKET_ENV) {
        Ok(v) => PathBuf::from(v),
        Err(_) => {
            eprintln!("surveil-app: {} process started without {SYNC_SOCKET_ENV}", tag.as_str());
            return ExitCode::from(2);
        }
    };
    let scratch_dir = std::env::var(SCRATCH_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| std::env::temp_dir());

    let registry = ObjectRegistry::new();
    let host = Arc::new(PluginHost::new(tag, registry.clone()));
    host.start(&defs);
    registry.register(HOUSEKEEPER_NAME, Arc::new(Housekeeper::new(host.clone())));
    registry.register(REGISTER_FACTORY_NAME, Arc::new(RegisterFactory::new(defs, host)));

    let object_socket_path = scratch_dir.join(format!("{}.sock", tag.as_str()));
    let server = match Server::bind(&object_socket_path, registry) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("surveil-app: {} process failed to bind its object socket: {e}", tag.as_str());
            return ExitCode::from(2);
        }
    };
    server.serve_background();

    if let Err(e) = complete_handoff(&sync_path, &object_socket_path) {
        eprintln!("surveil-app: {} process failed to complete handoff: {e}", tag.as_str());
        return ExitCode::from(2);
    }

    log::info!("{} process is up, serving at {}", tag.as_str(), object_socket_path.display());
    loop {
        std::thread::sleep(Duration::from_secs(3600));
    }
}
