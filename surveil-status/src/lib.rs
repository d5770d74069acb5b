//! SPDX-License-Identifier: GPL-3.0-or-later

pub mod color;
pub mod led;
pub mod pwmled;
pub mod worker;

pub use color::{blend, BlinkSequence, BlinkingStatus, BlinkingStatusError, Color};
pub use led::{StatusHandle, StatusLed, StatusLedError};
pub use pwmled::{PwmLed, PwmLedError};
pub use worker::{QueueThreadHost, ShutdownSignal, StopToken, ThreadHost};
