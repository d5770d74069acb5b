//! Plugin lookup table: collapses same-process remote-object proxies back
//! into direct local references.
//!
//! Every locally registered plugin instance is minted an [`ObjectId`]. When
//! a process asks the table to resolve a reference that turns out to carry
//! an id already present in its own table, the table hands back the local
//! `Arc` instead of a proxy — avoiding a pointless round trip through the
//! transport for same-process calls.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use std::any::Any;
use std::sync::Arc;

use dashmap::DashMap;
use surveil_transport::ObjectId;

pub struct PluginLookupTable {
    local: DashMap<ObjectId, Arc<dyn Any + Send + Sync>>,
}

impl Default for PluginLookupTable {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginLookupTable {
    pub fn new() -> Self {
        PluginLookupTable {
            local: DashMap::new(),
        }
    }

    /// Registers a locally-owned plugin instance under a freshly minted id.
    pub fn register_local(&self, object: Arc<dyn Any + Send + Sync>) -> ObjectId {
        let id = ObjectId::new_v4();
        self.local.insert(id, object);
        id
    }

    pub fn deregister(&self, id: ObjectId) {
        self.local.remove(&id);
    }

    /// If `id` names an object already registered in this process, returns
    /// it directly. Otherwise the caller must fall back to a remote proxy.
    pub fn resolve_local(&self, id: ObjectId) -> Option<Arc<dyn Any + Send + Sync>> {
        self.local.get(&id).map(|e| e.clone())
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.local.contains_key(&id)
    }
}
