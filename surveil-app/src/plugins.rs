//! Plugin catalogue: which named plugins exist, and which process carries a
//! real, hardware-independent implementation of each. A camera driver and a
//! chat-bot transport are the one legitimate external boundary left for
//! whoever embeds this against actual hardware and a real bot API; every
//! plugin built here needs neither.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use std::sync::Arc;

use surveil_auth::{AuthStore, AuthStoreObject};
use surveil_media::{MediaBus, MediaBusObject};
use surveil_plugins::{PluginDefinition, ProcessTag};
use surveil_transport::RemoteObject;

pub const MEDIA_BUS_PLUGIN: &str = "media_bus";
pub const AUTH_STORE_PLUGIN: &str = "auth_store";

/// The media bus backing motion clips and stills, delivered to whatever
/// `surveil_recorder`/`surveil_detector` wiring an embedder adds against a
/// real camera driver. Lives on CAMERA.
pub fn media_bus_definition() -> PluginDefinition {
    PluginDefinition::new(MEDIA_BUS_PLUGIN).with_process(
        ProcessTag::Camera,
        Arc::new(|| Arc::new(MediaBusObject::new(MediaBus::new(ProcessTag::Camera))) as Arc<dyn RemoteObject>),
    )
}

/// The persisted per-chat authorisation table, loaded from `auth_file`.
/// Lives on CHAT.
pub fn auth_store_definition(auth_file: String) -> PluginDefinition {
    PluginDefinition::new(AUTH_STORE_PLUGIN).with_process(
        ProcessTag::Chat,
        Arc::new(move || {
            let store = AuthStore::open(&auth_file).unwrap_or_else(|e| {
                log::error!("failed to open auth store at {auth_file}: {e}, starting empty");
                AuthStore::new()
            });
            Arc::new(AuthStoreObject::new(Arc::new(store))) as Arc<dyn RemoteObject>
        }),
    )
}
