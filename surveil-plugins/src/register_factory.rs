//! On-demand cross-process instantiation: registered under
//! [`REGISTER_FACTORY_NAME`] in every process, this is the callee
//! [`crate::singleton_host::SingletonHost::instantiate`] targets. A parent
//! process asks a child to bring one named plugin to life without having to
//! know anything about how that plugin is built — only the child's own
//! `PluginDefinition`s know the factory.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use std::sync::Arc;

use serde_json::{Map, Value};
use surveil_transport::{RemoteObject, TransportError};

use crate::plugin_host::{PluginDefinition, PluginHost};

pub const REGISTER_FACTORY_NAME: &str = "register_factory";

pub struct RegisterFactory {
    defs: Vec<PluginDefinition>,
    host: Arc<PluginHost>,
}

impl RegisterFactory {
    pub fn new(defs: Vec<PluginDefinition>, host: Arc<PluginHost>) -> Self {
        RegisterFactory { defs, host }
    }
}

impl RemoteObject for RegisterFactory {
    fn call(&self, method: &str, args: Vec<Value>, _kwargs: Map<String, Value>) -> Result<Value, TransportError> {
        match method {
            "instantiate" => {
                let name = args
                    .first()
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| TransportError::NoSuchMethod(REGISTER_FACTORY_NAME.into(), "instantiate".into()))?;
                let def = self
                    .defs
                    .iter()
                    .find(|d| d.name == name)
                    .ok_or_else(|| TransportError::NoSuchObject(name.to_string()))?;
                if self.host.instantiate_one(def) {
                    Ok(Value::String(name.to_string()))
                } else {
                    Err(TransportError::NoSuchObject(name.to_string()))
                }
            }
            other => Err(TransportError::NoSuchMethod(REGISTER_FACTORY_NAME.into(), other.into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::ProcessTag;
    use surveil_transport::ObjectRegistry;

    struct Noop;
    impl RemoteObject for Noop {
        fn call(&self, _m: &str, _a: Vec<Value>, _k: Map<String, Value>) -> Result<Value, TransportError> {
            Ok(Value::Null)
        }
    }

    #[test]
    fn instantiate_brings_a_declared_plugin_to_life_on_this_process() {
        let defs = vec![PluginDefinition::new("widget")
            .with_process(ProcessTag::Camera, Arc::new(|| Arc::new(Noop) as Arc<dyn RemoteObject>))];
        let host = Arc::new(PluginHost::new(ProcessTag::Camera, ObjectRegistry::new()));
        let factory = RegisterFactory::new(defs, host.clone());

        assert!(host.plugin("widget").is_none());
        let result = factory
            .call("instantiate", vec![Value::String("widget".into())], Map::new())
            .unwrap();
        assert_eq!(result, Value::String("widget".into()));
        assert!(host.plugin("widget").is_some());
    }

    #[test]
    fn instantiating_an_unknown_name_fails() {
        let host = Arc::new(PluginHost::new(ProcessTag::Camera, ObjectRegistry::new()));
        let factory = RegisterFactory::new(vec![], host);
        let err = factory
            .call("instantiate", vec![Value::String("nope".into())], Map::new())
            .unwrap_err();
        assert!(matches!(err, TransportError::NoSuchObject(_)));
    }

    #[test]
    fn instantiating_a_plugin_absent_from_this_process_fails() {
        let defs = vec![PluginDefinition::new("widget")
            .with_process(ProcessTag::Main, Arc::new(|| Arc::new(Noop) as Arc<dyn RemoteObject>))];
        let host = Arc::new(PluginHost::new(ProcessTag::Camera, ObjectRegistry::new()));
        let factory = RegisterFactory::new(defs, host);
        let err = factory
            .call("instantiate", vec![Value::String("widget".into())], Map::new())
            .unwrap_err();
        assert!(matches!(err, TransportError::NoSuchObject(_)));
    }
}
