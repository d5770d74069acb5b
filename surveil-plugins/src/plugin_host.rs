//! Per-process plugin host: owns the set of plugin instances that live in
//! one OS process and exposes them over the transport's [`ObjectRegistry`].
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use surveil_transport::{ObjectRegistry, RemoteObject};

use crate::process::ProcessTag;

pub type PluginFactory = Arc<dyn Fn() -> Arc<dyn RemoteObject> + Send + Sync>;

/// Declares, for a named plugin, which processes it has an instance on.
/// Mirrors the namedtuple-of-per-process-factories pattern: a plugin may be
/// absent from a process (`None`) if it has no business running there.
#[derive(Clone)]
pub struct PluginDefinition {
    pub name: String,
    factories: HashMap<ProcessTag, PluginFactory>,
}

impl PluginDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        PluginDefinition {
            name: name.into(),
            factories: HashMap::new(),
        }
    }

    pub fn with_process(mut self, tag: ProcessTag, factory: PluginFactory) -> Self {
        self.factories.insert(tag, factory);
        self
    }

    pub fn factory_for(&self, tag: ProcessTag) -> Option<&PluginFactory> {
        self.factories.get(&tag)
    }

    pub fn runs_on(&self, tag: ProcessTag) -> bool {
        self.factories.contains_key(&tag)
    }
}

/// Holds the live instances for one process. Built from a set of
/// [`PluginDefinition`]s filtered down to the ones with a factory for
/// `tag`, then registered into the transport's object registry under their
/// plugin name so other processes can reach them by name.
pub struct PluginHost {
    tag: ProcessTag,
    registry: ObjectRegistry,
    instances: DashMap<String, Arc<dyn RemoteObject>>,
}

impl PluginHost {
    pub fn new(tag: ProcessTag, registry: ObjectRegistry) -> Self {
        PluginHost {
            tag,
            registry,
            instances: DashMap::new(),
        }
    }

    pub fn tag(&self) -> ProcessTag {
        self.tag
    }

    pub fn registry(&self) -> &ObjectRegistry {
        &self.registry
    }

    /// Instantiates every definition that runs on this process and
    /// registers it with the transport. Idempotent per name: a second call
    /// with the same name replaces the earlier instance.
    pub fn start(&self, defs: &[PluginDefinition]) {
        for def in defs {
            self.instantiate_one(def);
        }
    }

    /// Instantiates a single definition's instance for this process, if it
    /// has one. Returns `false` when `def` has no factory for this host's
    /// tag. Shared by `start`'s eager bulk instantiation and by
    /// [`crate::register_factory::RegisterFactory`]'s on-demand,
    /// cross-process `instantiate` call.
    pub fn instantiate_one(&self, def: &PluginDefinition) -> bool {
        match def.factory_for(self.tag) {
            Some(factory) => {
                let instance = factory();
                self.registry.register(def.name.clone(), instance.clone());
                self.instances.insert(def.name.clone(), instance);
                true
            }
            None => false,
        }
    }

    pub fn plugin(&self, name: &str) -> Option<Arc<dyn RemoteObject>> {
        self.instances.get(name).map(|e| e.clone())
    }

    pub fn plugin_names(&self) -> Vec<String> {
        self.instances.iter().map(|e| e.key().clone()).collect()
    }

    /// Calls `activate()` on every instance currently registered. Part of
    /// the processes host's activation sequence, run once the cross-process
    /// plugin table has been built and pushed via housekeeping.
    pub fn activate_all(&self) {
        for entry in self.instances.iter() {
            entry.value().activate();
        }
    }

    /// Calls `deactivate()` on every instance currently registered, mirror
    /// of `activate_all` run during teardown before instances are dropped.
    pub fn deactivate_all(&self) {
        for entry in self.instances.iter() {
            entry.value().deactivate();
        }
    }

    /// Tears down every instance registered by `start`, deregistering it
    /// from the transport.
    pub fn stop(&self) {
        for entry in self.instances.iter() {
            self.registry.deregister(entry.key());
        }
        self.instances.clear();
    }
}

impl Drop for PluginHost {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Map, Value};
    use surveil_transport::TransportError;

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
    fn only_plugins_declared_for_this_process_start() {
        let defs = vec![
            PluginDefinition::new("OnMain")
                .with_process(ProcessTag::Main, Arc::new(|| Arc::new(Noop) as Arc<dyn RemoteObject>)),
            PluginDefinition::new("OnCamera")
                .with_process(ProcessTag::Camera, Arc::new(|| Arc::new(Noop) as Arc<dyn RemoteObject>)),
        ];
        let host = PluginHost::new(ProcessTag::Main, ObjectRegistry::new());
        host.start(&defs);
        assert!(host.plugin("OnMain").is_some());
        assert!(host.plugin("OnCamera").is_none());
    }

    #[test]
    fn stop_clears_all_instances() {
        let defs = vec![PluginDefinition::new("P").with_process(
            ProcessTag::Main,
            Arc::new(|| Arc::new(Noop) as Arc<dyn RemoteObject>),
        )];
        let host = PluginHost::new(ProcessTag::Main, ObjectRegistry::new());
        host.start(&defs);
        host.stop();
        assert!(host.plugin("P").is_none());
    }

    #[test]
    fn activate_all_reaches_every_registered_instance() {
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
        let defs = vec![PluginDefinition::new("P").with_process(
            ProcessTag::Main,
            Arc::new(move || Arc::new(Counter(count_clone.clone())) as Arc<dyn RemoteObject>),
        )];
        let host = PluginHost::new(ProcessTag::Main, ObjectRegistry::new());
        host.start(&defs);
        host.activate_all();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
