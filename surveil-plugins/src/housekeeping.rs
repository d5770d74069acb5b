//! Housekeeping object: every process registers exactly one of these under
//! [`HOUSEKEEPER_NAME`]. `setup` is the one call that tells a process "your
//! plugin set is final, go live" — it activates every locally hosted
//! instance exactly once; `teardown` mirrors it in reverse. Calling either
//! twice without the matching counterpart in between is a bug in the
//! orchestrator, not a condition to silently tolerate.
//!
//! Grounded on `processes_host.py`'s `_Housekeeper` inner class: a
//! Pyro-exposed `setup(process, plugins)`/`teardown()` pair toggling module
//! globals and raising on double-call. Rust has no module-level globals to
//! toggle, so the "process is active" bit lives here instead, and `setup`
//! drives `PluginHost::activate_all` directly rather than leaving activation
//! to a second, separate pass.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use std::sync::{Arc, Mutex};

use serde_json::{Map, Value};
use surveil_transport::{RemoteObject, TransportError};
use thiserror::Error;

use crate::plugin_host::PluginHost;
use crate::process::ProcessTag;

pub const HOUSEKEEPER_NAME: &str = "housekeeping";

#[derive(Debug, Error)]
pub enum HousekeepingError {
    #[error("setup called while already active")]
    AlreadyActive,
    #[error("teardown called while not active")]
    NotActive,
}

/// Census of the plugins the orchestrator knows about for one process,
/// pushed alongside the process's own tag when it's activated.
pub struct Housekeeper {
    host: Arc<PluginHost>,
    active: Mutex<Option<(ProcessTag, Vec<String>)>>,
}

impl Housekeeper {
    pub fn new(host: Arc<PluginHost>) -> Self {
        Housekeeper {
            host,
            active: Mutex::new(None),
        }
    }

    pub fn setup(&self, process: ProcessTag, plugins: Vec<String>) -> Result<(), HousekeepingError> {
        let mut active = self.active.lock().expect("housekeeper mutex poisoned");
        if active.is_some() {
            return Err(HousekeepingError::AlreadyActive);
        }
        self.host.activate_all();
        *active = Some((process, plugins));
        Ok(())
    }

    pub fn teardown(&self) -> Result<(), HousekeepingError> {
        let mut active = self.active.lock().expect("housekeeper mutex poisoned");
        if active.is_none() {
            return Err(HousekeepingError::NotActive);
        }
        self.host.deactivate_all();
        *active = None;
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.active.lock().expect("housekeeper mutex poisoned").is_some()
    }
}

impl RemoteObject for Housekeeper {
    fn call(&self, method: &str, args: Vec<Value>, _kwargs: Map<String, Value>) -> Result<Value, TransportError> {
        match method {
            "setup" => {
                let process = args
                    .first()
                    .and_then(|v| v.as_str())
                    .and_then(|s| s.parse::<ProcessTag>().ok())
                    .ok_or_else(|| TransportError::NoSuchMethod(HOUSEKEEPER_NAME.into(), "setup".into()))?;
                let plugins: Vec<String> = args
                    .get(1)
                    .and_then(|v| v.as_array())
                    .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
                    .unwrap_or_default();
                self.setup(process, plugins)
                    .map_err(|e| TransportError::Remote(e.to_string()))?;
                Ok(Value::Null)
            }
            "teardown" => {
                self.teardown().map_err(|e| TransportError::Remote(e.to_string()))?;
                Ok(Value::Null)
            }
            other => Err(TransportError::NoSuchMethod(HOUSEKEEPER_NAME.into(), other.into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin_host::PluginDefinition;
    use surveil_transport::ObjectRegistry;

    #[test]
    fn setup_activates_every_local_instance_exactly_once() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        struct Counter(Arc<AtomicUsize>);
        impl RemoteObject for Counter {
            fn call(&self, _m: &str, _a: Vec<Value>, _k: Map<String, Value>) -> Result<Value, TransportError> {
                Ok(Value::Null)
            }
            fn activate(&self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        let defs = vec![PluginDefinition::new("counter").with_process(
            ProcessTag::Main,
            Arc::new(move || Arc::new(Counter(count_clone.clone())) as Arc<dyn RemoteObject>),
        )];
        let host = Arc::new(PluginHost::new(ProcessTag::Main, ObjectRegistry::new()));
        host.start(&defs);

        let keeper = Housekeeper::new(host);
        keeper.setup(ProcessTag::Main, vec!["counter".into()]).unwrap();
        assert!(keeper.is_active());
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(matches!(keeper.setup(ProcessTag::Main, vec![]), Err(HousekeepingError::AlreadyActive)));
        keeper.teardown().unwrap();
        assert!(!keeper.is_active());
        assert!(matches!(keeper.teardown(), Err(HousekeepingError::NotActive)));
    }
}
