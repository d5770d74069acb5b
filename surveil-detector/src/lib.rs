//! SPDX-License-Identifier: GPL-3.0-or-later

pub mod accumulator;
pub mod ramp;
pub mod still;

pub use accumulator::{denoised_motion_vector_norm, MotionAccumulator, MotionVector};
pub use ramp::{clamp, RgbLut};
pub use still::{ImageComposer, StillCamera, StillCapture};
