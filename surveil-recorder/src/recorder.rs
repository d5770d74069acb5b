//! Buffered recorder: the `BufferedRecorder` plugin from the original,
//! wired to a [`surveil_media::MediaBus`] for delivery and a narrow
//! [`CameraInfo`] trait instead of a concrete camera driver (the driver is
//! an external collaborator, out of scope for this crate).
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::dual_buffer::DualBuffer;
use crate::mp4_writer::Mp4Error;
use surveil_media::MediaBus;

/// Narrow external interface onto the camera driver: frame rate,
/// resolution, and the ability to request a fresh key frame. Supplied by
/// whatever drives the actual hardware/IP camera.
pub trait CameraInfo: Send + Sync {
    fn framerate(&self) -> f64;
    fn resolution(&self) -> (u16, u16);
    fn request_key_frame(&self);
}

/// Settings mirrored from `SETTINGS.camera.*` in the original: how many
/// seconds of pre-roll to keep buffered, and how long a gap between SPS
/// headers is tolerated before requesting a fresh key frame.
#[derive(Debug, Clone, Copy)]
pub struct RecorderSettings {
    pub buffer_seconds: f64,
    pub clip_length_tolerance_seconds: f64,
}

impl Default for RecorderSettings {
    fn default() -> Self {
        RecorderSettings {
            buffer_seconds: 2.0,
            clip_length_tolerance_seconds: 1.0,
        }
    }
}

pub struct BufferedRecorder<C: CameraInfo> {
    camera: Arc<C>,
    media_bus: Arc<MediaBus>,
    settings: RecorderSettings,
    on_recording_status: Box<dyn Fn(bool) + Send + Sync>,

    dual: Mutex<DualBuffer>,
    record_user_info: Mutex<Option<Value>>,
    is_recording: AtomicBool,
    keep_media: AtomicBool,
    has_just_flushed: AtomicBool,
    flush_lock: Mutex<()>,
    footage_max_age: Mutex<Option<u64>>,
    last_sps_header_stamp: AtomicU64,
}

impl<C: CameraInfo> BufferedRecorder<C> {
    pub fn new(
        dir: &std::path::Path,
        camera: Arc<C>,
        media_bus: Arc<MediaBus>,
        settings: RecorderSettings,
        on_recording_status: Box<dyn Fn(bool) + Send + Sync>,
    ) -> Result<Self, Mp4Error> {
        let framerate = camera.framerate();
        let default_duration = (90_000.0 / framerate.max(1.0)).round() as u32;
        let dual = DualBuffer::new(dir, default_duration.max(1))?;
        Ok(BufferedRecorder {
            camera,
            media_bus,
            settings,
            on_recording_status,
            dual: Mutex::new(dual),
            record_user_info: Mutex::new(None),
            is_recording: AtomicBool::new(false),
            keep_media: AtomicBool::new(true),
            has_just_flushed: AtomicBool::new(true),
            flush_lock: Mutex::new(()),
            footage_max_age: Mutex::new(None),
            last_sps_header_stamp: AtomicU64::new(0),
        })
    }

    pub fn set_avc_parameters(&self, sps: Vec<u8>, pps: Vec<u8>) {
        let (w, h) = self.camera.resolution();
        self.dual.lock().unwrap().set_avc_parameters(sps, pps, w, h);
    }

    fn buffer_max_age(&self) -> u64 {
        (2.0 * self.camera.framerate() * self.settings.buffer_seconds).round() as u64
    }

    fn sps_header_max_age(&self) -> u64 {
        (self.camera.framerate() * self.settings.clip_length_tolerance_seconds).round() as u64
    }

    pub fn footage_age(&self) -> u64 {
        self.dual.lock().unwrap().footage_age()
    }

    pub fn buffer_age(&self) -> u64 {
        self.dual.lock().unwrap().buffer_age()
    }

    pub fn total_age(&self) -> u64 {
        self.dual.lock().unwrap().total_age()
    }

    pub fn is_recording(&self) -> bool {
        self.dual.lock().unwrap().is_recording() && self.is_recording.load(Ordering::SeqCst)
    }

    pub fn is_finalizing(&self) -> bool {
        self.dual.lock().unwrap().is_recording()
            && self.keep_media.load(Ordering::SeqCst)
            && !self.is_recording.load(Ordering::SeqCst)
    }

    fn set_recording_status(&self, value: bool) {
        (self.on_recording_status)(value);
    }

    fn handle_split_point(&self) -> Result<(), Mp4Error> {
        {
            let mut footage_max_age = self.footage_max_age.lock().unwrap();
            if let Some(max_age) = *footage_max_age {
                if self.footage_age() >= max_age {
                    self.stop_and(true, false)?;
                    *footage_max_age = None;
                }
            }
        }
        let recorder_is_recording = self.dual.lock().unwrap().is_recording();
        if recorder_is_recording && !self.is_recording.load(Ordering::SeqCst) {
            let info = self.record_user_info.lock().unwrap().take();
            if self.keep_media.load(Ordering::SeqCst) {
                let path: PathBuf = self.dual.lock().unwrap().stop_and_finalize()?;
                let media = self.media_bus.deliver_media(path, "mp4", info);
                log::info!("media {} delivered", media.uuid);
            } else {
                log::info!("discarding media with info {:?}", info);
                self.dual.lock().unwrap().stop_and_discard()?;
            }
        }
        if self.buffer_age() > self.buffer_max_age() {
            self.dual.lock().unwrap().rewind_buffer()?;
        }
        self.last_sps_header_stamp.store(self.total_age(), Ordering::SeqCst);
        Ok(())
    }

    fn stop_and(&self, finalize: bool, handle_split_point_if_flushed: bool) -> Result<(), Mp4Error> {
        self.set_recording_status(false);
        self.is_recording.store(false, Ordering::SeqCst);
        self.keep_media.store(finalize, Ordering::SeqCst);
        if handle_split_point_if_flushed {
            let _guard = self.flush_lock.lock().unwrap();
            if self.has_just_flushed.load(Ordering::SeqCst) {
                self.handle_split_point()?;
            }
        }
        Ok(())
    }

    pub fn record(&self, info: Option<Value>, stop_after_seconds: Option<f64>) {
        self.keep_media.store(true, Ordering::SeqCst);
        self.is_recording.store(true, Ordering::SeqCst);
        *self.record_user_info.lock().unwrap() = info;
        let mut footage_max_age = self.footage_max_age.lock().unwrap();
        *footage_max_age = match stop_after_seconds {
            Some(s) if s.is_finite() && s >= 0.0 => {
                Some((s.max(1.0) * self.camera.framerate()) as u64)
            }
            _ => None,
        };
        drop(footage_max_age);
        self.set_recording_status(true);
        self.dual.lock().unwrap().record();
    }

    pub fn stop_and_discard(&self) -> Result<(), Mp4Error> {
        self.stop_and(false, true)
    }

    pub fn stop_and_finalize(&self) -> Result<(), Mp4Error> {
        self.stop_and(true, true)
    }

    /// Appends a frame. `frame_is_sps_header` and `frame_is_complete`
    /// describe the frame the camera driver just handed us; the driver
    /// is responsible for calling `request_key_frame` when told to.
    pub fn write(&self, data: &[u8], frame_is_sps_header: bool, frame_is_complete: bool) -> Result<(), Mp4Error> {
        {
            let _guard = self.flush_lock.lock().unwrap();
            self.has_just_flushed.store(false, Ordering::SeqCst);
        }
        if frame_is_sps_header {
            self.handle_split_point()?;
        }
        self.dual
            .lock()
            .unwrap()
            .append(data, frame_is_sps_header, frame_is_complete)?;

        let last_sps_header_age = self.total_age().saturating_sub(self.last_sps_header_stamp.load(Ordering::SeqCst));
        if last_sps_header_age > self.sps_header_max_age().min(self.buffer_max_age()) {
            self.camera.request_key_frame();
        }
        Ok(())
    }

    pub fn flush(&self) -> Result<(), Mp4Error> {
        let _guard = self.flush_lock.lock().unwrap();
        self.has_just_flushed.store(true, Ordering::SeqCst);
        self.handle_split_point()
    }
}
