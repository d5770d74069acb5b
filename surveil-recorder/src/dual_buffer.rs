//! Dual-buffered MP4 recorder core: `DualBufferedMP4` from the original.
//! Every appended frame is mirrored into both an `old` and a `new` buffer;
//! `old` always holds the footage that would be delivered if recording
//! stopped right now, `new` is where pre-roll accumulates while recording
//! is active. A split point either finalizes `old` (swap + finalize) or
//! rewinds whichever buffer isn't "the" footage, bounding memory/disk use.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use std::path::{Path, PathBuf};

use crate::buffer::Mp4Buffer;
use crate::mp4_writer::Mp4Error;

pub struct DualBuffer {
    old: Mp4Buffer,
    new: Mp4Buffer,
    is_recording: bool,
    total_age: u64,
}

impl DualBuffer {
    pub fn new(dir: &Path, default_duration: u32) -> Result<Self, Mp4Error> {
        Ok(DualBuffer {
            old: Mp4Buffer::new(dir, default_duration)?,
            new: Mp4Buffer::new(dir, default_duration)?,
            is_recording: false,
            total_age: 0,
        })
    }

    pub fn set_avc_parameters(&mut self, sps: Vec<u8>, pps: Vec<u8>, width: u16, height: u16) {
        self.old.set_avc_parameters(sps.clone(), pps.clone(), width, height);
        self.new.set_avc_parameters(sps, pps, width, height);
    }

    /// Age of whichever buffer represents "what's being recorded right
    /// now": `new` while actively recording (pre-roll), `old` otherwise.
    pub fn buffer_age(&self) -> u64 {
        if self.is_recording {
            self.new.age()
        } else {
            self.old.age()
        }
    }

    /// Age of the footage that would be delivered if stopped right now.
    pub fn footage_age(&self) -> u64 {
        self.old.age()
    }

    pub fn total_age(&self) -> u64 {
        self.total_age
    }

    pub fn is_recording(&self) -> bool {
        self.is_recording
    }

    pub fn record(&mut self) {
        self.is_recording = true;
    }

    pub fn rewind_buffer(&mut self) -> Result<(), Mp4Error> {
        if self.is_recording {
            self.new.rewind()
        } else {
            self.old.rewind()?;
            std::mem::swap(&mut self.old, &mut self.new);
            Ok(())
        }
    }

    pub fn append(&mut self, data: &[u8], frame_is_sps_header: bool, frame_is_complete: bool) -> Result<(), Mp4Error> {
        self.old.append(data, frame_is_sps_header, frame_is_complete)?;
        self.new.append(data, frame_is_sps_header, frame_is_complete)?;
        if !frame_is_sps_header && frame_is_complete {
            self.total_age += 1;
        }
        Ok(())
    }

    pub fn stop_and_finalize(&mut self) -> Result<PathBuf, Mp4Error> {
        self.is_recording = false;
        std::mem::swap(&mut self.old, &mut self.new);
        self.new.finalize()
    }

    pub fn stop_and_discard(&mut self) -> Result<(), Mp4Error> {
        self.is_recording = false;
        self.rewind_buffer()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(db: &mut DualBuffer, byte: u8) {
        db.append(&[byte], false, true).unwrap();
    }

    #[test]
    fn footage_age_tracks_old_buffer_regardless_of_recording_state() {
        let dir = tempfile::tempdir().unwrap();
        let mut db = DualBuffer::new(dir.path(), 3000).unwrap();
        sample(&mut db, 1);
        sample(&mut db, 2);
        assert_eq!(db.footage_age(), 2);
        db.record();
        sample(&mut db, 3);
        // old buffer keeps accumulating too (every sample is mirrored).
        assert_eq!(db.footage_age(), 3);
    }

    #[test]
    fn buffer_age_switches_to_new_while_recording() {
        let dir = tempfile::tempdir().unwrap();
        let mut db = DualBuffer::new(dir.path(), 3000).unwrap();
        sample(&mut db, 1);
        assert_eq!(db.buffer_age(), 1); // not recording: buffer_age == old.age()
        db.record();
        sample(&mut db, 2);
        assert_eq!(db.buffer_age(), 2); // recording: buffer_age == new.age()
    }

    #[test]
    fn total_age_counts_every_complete_non_sps_sample() {
        let dir = tempfile::tempdir().unwrap();
        let mut db = DualBuffer::new(dir.path(), 3000).unwrap();
        db.append(&[0x67], true, true).unwrap(); // sps header: does not count
        sample(&mut db, 1);
        sample(&mut db, 2);
        assert_eq!(db.total_age(), 2);
    }

    #[test]
    fn stop_and_finalize_delivers_the_old_footage_and_keeps_recording_state_clean() {
        let dir = tempfile::tempdir().unwrap();
        let mut db = DualBuffer::new(dir.path(), 3000).unwrap();
        db.set_avc_parameters(vec![0x67, 0x42, 0, 0x1F], vec![0x68], 320, 240);
        db.append(&[0x67], true, true).unwrap();
        sample(&mut db, 1);
        db.record();
        sample(&mut db, 2);
        let path = db.stop_and_finalize().unwrap();
        assert!(path.exists());
        assert!(!db.is_recording());
    }

    #[test]
    fn stop_and_discard_rewinds_without_producing_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut db = DualBuffer::new(dir.path(), 3000).unwrap();
        sample(&mut db, 1);
        db.record();
        sample(&mut db, 2);
        db.stop_and_discard().unwrap();
        assert!(!db.is_recording());
        assert_eq!(db.footage_age(), 0);
    }
}
