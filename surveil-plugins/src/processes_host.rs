//! Cross-process plugin lookup: `find_plugin(name, process)` resolves to a
//! local reference when the target plugin lives in the calling process, or
//! a transport proxy to the remote singleton host otherwise.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use surveil_transport::{Proxy, RemoteObject, TransportError};

use crate::housekeeping::HOUSEKEEPER_NAME;
use crate::plugin_host::PluginHost;
use crate::process::ProcessTag;
use crate::singleton_host::{SingletonHost, SingletonHostError};

pub enum PluginRef {
    Local(Arc<dyn RemoteObject>),
    Remote(Proxy),
}

#[derive(Debug, thiserror::Error)]
pub enum ProcessesHostError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("singleton host error: {0}")]
    Singleton(#[from] SingletonHostError),
}

fn tag_slot(tag: ProcessTag) -> usize {
    match tag {
        ProcessTag::Main => 0,
        ProcessTag::Camera => 1,
        ProcessTag::Chat => 2,
    }
}

/// Cross-process plugin lookup table (component E): for every plugin name,
/// one slot per [`ProcessTag`], built once during
/// [`ProcessesHost::activate`] and left untouched for the rest of that
/// activation. Looking a name up returns either the full triple or the one
/// concrete slot a caller already knows the tag for.
#[derive(Default)]
pub struct PluginTable {
    slots: HashMap<String, [Option<PluginRef>; 3]>,
}

impl PluginTable {
    pub fn triple(&self, name: &str) -> Option<&[Option<PluginRef>; 3]> {
        self.slots.get(name)
    }

    pub fn slot(&self, name: &str, tag: ProcessTag) -> Option<&PluginRef> {
        self.slots.get(name).and_then(|triple| triple[tag_slot(tag)].as_ref())
    }

    pub fn names(&self) -> Vec<String> {
        self.slots.keys().cloned().collect()
    }
}

pub struct ProcessesHost {
    current_tag: ProcessTag,
    local: Arc<PluginHost>,
    remotes: HashMap<ProcessTag, SingletonHost>,
    table: Mutex<Option<PluginTable>>,
}

impl ProcessesHost {
    pub fn new(current_tag: ProcessTag, local: Arc<PluginHost>) -> Self {
        ProcessesHost {
            current_tag,
            local,
            remotes: HashMap::new(),
            table: Mutex::new(None),
        }
    }

    pub fn attach_remote(&mut self, tag: ProcessTag, host: SingletonHost) {
        self.remotes.insert(tag, host);
    }

    /// Runs `f` against the cached plugin table built by the last
    /// `activate` call, or `None` before activation / after `deactivate`.
    pub fn with_table<R>(&self, f: impl FnOnce(Option<&PluginTable>) -> R) -> R {
        let guard = self.table.lock().expect("plugin table mutex poisoned");
        f(guard.as_ref())
    }

    pub fn find_plugin(&self, name: &str, tag: ProcessTag) -> Option<PluginRef> {
        if tag == self.current_tag {
            self.local.plugin(name).map(PluginRef::Local)
        } else {
            self.remotes
                .get(&tag)
                .and_then(|host| host.open_proxy(name).ok())
                .map(PluginRef::Remote)
        }
    }

    fn housekeeping_call(&self, tag: ProcessTag, method: &str, args: Vec<Value>) -> Result<(), ProcessesHostError> {
        if tag == self.current_tag {
            self.local
                .plugin(HOUSEKEEPER_NAME)
                .ok_or_else(|| TransportError::NoSuchObject(HOUSEKEEPER_NAME.to_string()))?
                .call(method, args, serde_json::Map::new())?;
        } else if let Some(host) = self.remotes.get(&tag) {
            host.open_proxy(HOUSEKEEPER_NAME)?
                .call(method, args, std::collections::HashMap::new())?;
        }
        Ok(())
    }

    /// Runs activation steps 3-5 of the process bring-up sequence: builds
    /// the cross-process plugin table for every name in `plugin_names`
    /// (across every attached process, local included), pushes the table's
    /// census and this process's own tag into each process's housekeeping
    /// object (driving that process's own `PluginHost::activate_all`), and
    /// leaves the table cached for the lifetime of this activation.
    pub fn activate(&self, plugin_names: &[String]) -> Result<(), ProcessesHostError> {
        let mut slots: HashMap<String, [Option<PluginRef>; 3]> = HashMap::new();
        for name in plugin_names {
            let mut triple: [Option<PluginRef>; 3] = [None, None, None];
            for tag in ProcessTag::all() {
                triple[tag_slot(tag)] = self.find_plugin(name, tag);
            }
            slots.insert(name.clone(), triple);
        }
        *self.table.lock().expect("plugin table mutex poisoned") = Some(PluginTable { slots });

        let plugins_arg = Value::Array(plugin_names.iter().cloned().map(Value::String).collect());
        self.housekeeping_call(
            self.current_tag,
            "setup",
            vec![Value::String(self.current_tag.as_str().to_string()), plugins_arg.clone()],
        )?;
        for tag in self.remotes.keys().copied().collect::<Vec<_>>() {
            self.housekeeping_call(tag, "setup", vec![Value::String(tag.as_str().to_string()), plugins_arg.clone()])?;
        }
        Ok(())
    }

    /// Reverses `activate`: tears down housekeeping on every process (which
    /// drives that process's own `PluginHost::deactivate_all`), then drops
    /// the cached table.
    pub fn deactivate(&self) -> Result<(), ProcessesHostError> {
        self.housekeeping_call(self.current_tag, "teardown", vec![])?;
        for tag in self.remotes.keys().copied().collect::<Vec<_>>() {
            self.housekeeping_call(tag, "teardown", vec![])?;
        }
        *self.table.lock().expect("plugin table mutex poisoned") = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Map, Value};
    use surveil_transport::{ObjectRegistry, TransportError};

    struct Noop;
    impl RemoteObject for Noop {
        fn call(
            &self,
            _method: &str,
            _args: Vec<Value>,
            _kwargs: Map<String, Value>,
        ) -> Result<Value, TransportError> {
            Ok(Value::Null)
        }
    }

    #[test]
    fn find_plugin_on_the_current_process_resolves_locally() {
        use crate::plugin_host::PluginDefinition;

        let defs = vec![PluginDefinition::new("P").with_process(
            ProcessTag::Main,
            Arc::new(|| Arc::new(Noop) as Arc<dyn RemoteObject>),
        )];
        let host = PluginHost::new(ProcessTag::Main, ObjectRegistry::new());
        host.start(&defs);

        let processes = ProcessesHost::new(ProcessTag::Main, Arc::new(host));
        let found = processes.find_plugin("P", ProcessTag::Main);
        assert!(matches!(found, Some(PluginRef::Local(_))));
    }

    #[test]
    fn find_plugin_on_an_unattached_remote_process_is_none() {
        let host = PluginHost::new(ProcessTag::Main, ObjectRegistry::new());
        let processes = ProcessesHost::new(ProcessTag::Main, Arc::new(host));
        let found = processes.find_plugin("P", ProcessTag::Camera);
        assert!(found.is_none());
    }

    #[test]
    fn activate_builds_the_table_and_drives_local_activation() {
        use crate::housekeeping::{Housekeeper, HOUSEKEEPER_NAME};
        use crate::plugin_host::PluginDefinition;
        use std::sync::atomic::{AtomicUsize, Ordering};

        struct Counter(Arc<AtomicUsize>);
        impl RemoteObject for Counter {
            fn call(&self, _m: &str, _a: Vec<Value>, _k: Map<String, Value>) -> Result<Value, TransportError> {
                Ok(Value::Null)
            }
            fn activate(&self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
            fn deactivate(&self) {
                self.0.fetch_sub(1, Ordering::SeqCst);
            }
        }

        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        let defs = vec![PluginDefinition::new("P").with_process(
            ProcessTag::Main,
            Arc::new(move || Arc::new(Counter(count_clone.clone())) as Arc<dyn RemoteObject>),
        )];
        let host = Arc::new(PluginHost::new(ProcessTag::Main, ObjectRegistry::new()));
        host.start(&defs);
        host.registry()
            .register(HOUSEKEEPER_NAME, Arc::new(Housekeeper::new(host.clone())));

        let processes = ProcessesHost::new(ProcessTag::Main, host);
        processes.activate(&["P".to_string()]).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1, "activate() must reach the registered instance");

        processes.with_table(|table| {
            let table = table.expect("table must be built by activate");
            assert!(matches!(table.slot("P", ProcessTag::Main), Some(PluginRef::Local(_))));
            assert!(table.slot("P", ProcessTag::Camera).is_none());
        });

        processes.deactivate().unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 0, "deactivate() must reach the registered instance");
        processes.with_table(|table| assert!(table.is_none()));
    }

    #[test]
    fn activate_twice_without_deactivate_fails_the_housekeeping_guard() {
        use crate::housekeeping::{Housekeeper, HOUSEKEEPER_NAME};

        let host = Arc::new(PluginHost::new(ProcessTag::Main, ObjectRegistry::new()));
        host.registry()
            .register(HOUSEKEEPER_NAME, Arc::new(Housekeeper::new(host.clone())));
        let processes = ProcessesHost::new(ProcessTag::Main, host);

        processes.activate(&[]).unwrap();
        assert!(processes.activate(&[]).is_err());
    }
}
