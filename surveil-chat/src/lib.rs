//! SPDX-License-Identifier: GPL-3.0-or-later

pub mod commands;
pub mod root;
pub mod schedule;
pub mod transport;

pub use commands::{CommandRouter, DetectorControl, LightControl, RecorderControl, StillControl};
pub use root::ChatRoot;
pub use schedule::{DetectCommand, TimeOfDay};
pub use transport::{ChatTransport, ChatTransportError, FileId};
