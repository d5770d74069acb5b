//! SPDX-License-Identifier: GPL-3.0-or-later

pub mod buffer;
pub mod dual_buffer;
pub mod mp4_writer;
pub mod recorder;

pub use buffer::Mp4Buffer;
pub use dual_buffer::DualBuffer;
pub use mp4_writer::{Mp4BoxWriter, Mp4Error};
pub use recorder::{BufferedRecorder, CameraInfo, RecorderSettings};
