//! Still-image capture worker: `StillPlugin` from the original, decoupled
//! from the camera driver and the overlay renderer (both external
//! collaborators, out of scope here) via narrow traits.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{unbounded, Sender};
use serde_json::Value;

use surveil_media::MediaBus;

/// Narrow external interface onto the camera driver: a single RGB frame
/// grab, used both for plain stills and for motion-overlay stills.
pub trait StillCamera: Send + Sync {
    fn capture_rgb(&self) -> Vec<u8>;
    fn resolution(&self) -> (u16, u16);
}

/// Renders the final JPEG, optionally burning a motion overlay into it.
/// The original composes the overlay with PIL; that rendering is out of
/// scope here (Non-goal: image composition) and is left to whatever the
/// binary wires in.
pub trait ImageComposer: Send + Sync {
    fn compose_jpeg(&self, rgb: &[u8], width: u16, height: u16, quality: u8) -> Vec<u8>;
}

enum Job {
    Capture(Option<Value>),
    Shutdown,
}

/// Mirrors `StillPlugin`'s dedicated capture thread: `take_picture` just
/// enqueues, the worker thread does the actual capture + compose + deliver.
pub struct StillCapture {
    sender: Sender<Job>,
    handle: Option<JoinHandle<()>>,
}

impl StillCapture {
    pub fn new<C, I>(camera: Arc<C>, composer: Arc<I>, media_bus: Arc<MediaBus>, jpeg_quality: u8) -> Self
    where
        C: StillCamera + 'static,
        I: ImageComposer + 'static,
    {
        let (sender, receiver) = unbounded::<Job>();
        let handle = std::thread::Builder::new()
            .name("capture_motion_image_thread".into())
            .spawn(move || {
                for job in receiver {
                    match job {
                        Job::Shutdown => break,
                        Job::Capture(info) => {
                            let (w, h) = camera.resolution();
                            let rgb = camera.capture_rgb();
                            let jpeg = composer.compose_jpeg(&rgb, w, h, jpeg_quality);
                            match tempfile::Builder::new().suffix(".jpg").tempfile() {
                                Ok(mut file) => {
                                    use std::io::Write;
                                    if let Err(e) = file.write_all(&jpeg) {
                                        log::error!("could not write still image: {}", e);
                                        continue;
                                    }
                                    let (_, path) = match file.keep() {
                                        Ok(v) => v,
                                        Err(e) => {
                                            log::error!("could not persist still image: {}", e.error);
                                            continue;
                                        }
                                    };
                                    let media = media_bus.deliver_media(path, "jpeg", info);
                                    log::info!("dispatched still image {} with info {:?}", media.uuid, media.info);
                                }
                                Err(e) => log::error!("could not create temp file for still image: {}", e),
                            }
                        }
                    }
                }
            })
            .expect("failed to spawn capture_motion_image_thread");
        StillCapture {
            sender,
            handle: Some(handle),
        }
    }

    pub fn take_picture(&self, info: Option<Value>) {
        let _ = self.sender.send(Job::Capture(info));
    }
}

impl Drop for StillCapture {
    fn drop(&mut self) {
        let _ = self.sender.send(Job::Shutdown);
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct FakeCamera;
    impl StillCamera for FakeCamera {
        fn capture_rgb(&self) -> Vec<u8> {
            vec![0u8; 4 * 4 * 3]
        }
        fn resolution(&self) -> (u16, u16) {
            (4, 4)
        }
    }

    struct FakeComposer {
        calls: AtomicUsize,
    }
    impl ImageComposer for FakeComposer {
        fn compose_jpeg(&self, rgb: &[u8], width: u16, height: u16, quality: u8) -> Vec<u8> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let img = image::RgbImage::from_raw(width as u32, height as u32, rgb.to_vec()).unwrap();
            let mut out = Vec::new();
            let mut cursor = std::io::Cursor::new(&mut out);
            image::codecs::jpeg::JpegEncoder::new_with_quality(&mut cursor, quality)
                .encode_image(&img)
                .unwrap();
            out
        }
    }

    struct Counting(Arc<AtomicUsize>);
    impl surveil_media::MediaReceiver for Counting {
        fn receive_media(&self, _media: &surveil_media::Media) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn take_picture_dispatches_a_still_through_the_media_bus() {
        let camera = Arc::new(FakeCamera);
        let composer = Arc::new(FakeComposer { calls: AtomicUsize::new(0) });
        let bus = MediaBus::new(surveil_plugins::ProcessTag::Camera);
        let received = Arc::new(AtomicUsize::new(0));
        bus.register_receiver("test", Arc::new(Counting(received.clone())));
        let capture = StillCapture::new(camera, composer, bus.clone(), 85);
        capture.take_picture(Some(serde_json::json!({"reason": "motion"})));
        std::thread::sleep(Duration::from_millis(300));
        assert_eq!(received.load(Ordering::SeqCst), 1);
    }
}
