//! SPDX-License-Identifier: GPL-3.0-or-later

pub mod housekeeping;
pub mod lookup_table;
pub mod plugin_host;
pub mod process;
pub mod processes_host;
pub mod register_factory;
pub mod singleton_host;

pub use housekeeping::{Housekeeper, HousekeepingError, HOUSEKEEPER_NAME};
pub use lookup_table::PluginLookupTable;
pub use plugin_host::{PluginDefinition, PluginFactory, PluginHost};
pub use process::ProcessTag;
pub use processes_host::{PluginRef, PluginTable, ProcessesHost, ProcessesHostError};
pub use register_factory::{RegisterFactory, REGISTER_FACTORY_NAME};
pub use singleton_host::{SingletonHost, SingletonHostError};
