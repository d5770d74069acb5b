//! A single temp-file-backed MP4 buffer: `TemporaryMP4Muxer` from the
//! original, translated to synchronous `std::fs` + the box writer above.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use std::fs::File;
use std::path::{Path, PathBuf};

use crate::mp4_writer::{Mp4BoxWriter, Mp4Error};

pub struct Mp4Buffer {
    dir: PathBuf,
    path: PathBuf,
    writer: Mp4BoxWriter<File>,
    age: u64,
    last_frame_complete: bool,
    pending_keyframe: bool,
    default_duration: u32,
    avc_sps: Vec<u8>,
    avc_pps: Vec<u8>,
    width: u16,
    height: u16,
}

fn new_temp_file(dir: &Path) -> Result<(PathBuf, File), Mp4Error> {
    let file = tempfile::Builder::new()
        .prefix("surveil-clip-")
        .suffix(".mp4.part")
        .tempfile_in(dir)?;
    let (file, path) = file.keep().map_err(|e| Mp4Error::Io(e.error))?;
    Ok((path, file))
}

impl Mp4Buffer {
    pub fn new(dir: &Path, default_duration: u32) -> Result<Self, Mp4Error> {
        let (path, file) = new_temp_file(dir)?;
        let writer = Mp4BoxWriter::begin(file)?;
        Ok(Mp4Buffer {
            dir: dir.to_path_buf(),
            path,
            writer,
            age: 0,
            last_frame_complete: false,
            pending_keyframe: false,
            default_duration,
            avc_sps: Vec::new(),
            avc_pps: Vec::new(),
            width: 0,
            height: 0,
        })
    }

    pub fn set_avc_parameters(&mut self, sps: Vec<u8>, pps: Vec<u8>, width: u16, height: u16) {
        self.avc_sps = sps;
        self.avc_pps = pps;
        self.width = width;
        self.height = height;
        self.writer
            .set_avc_parameters(self.avc_sps.clone(), self.avc_pps.clone(), width, height);
    }

    pub fn age(&self) -> u64 {
        self.age
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one access unit. A split point (`frame_is_sps_header`) marks
    /// the *following* complete sample as the sync sample for `stss`, since
    /// the SPS NAL itself carries no picture data.
    pub fn append(&mut self, data: &[u8], frame_is_sps_header: bool, frame_is_complete: bool) -> Result<(), Mp4Error> {
        if frame_is_sps_header {
            self.pending_keyframe = true;
            self.writer.write_sample(data, self.default_duration, false)?;
        } else {
            let is_key = self.pending_keyframe;
            self.pending_keyframe = false;
            self.writer.write_sample(data, self.default_duration, is_key)?;
        }
        if frame_is_complete && !frame_is_sps_header {
            self.age += 1;
        }
        self.last_frame_complete = frame_is_complete;
        Ok(())
    }

    /// Rewinds this buffer back to empty. Only valid right after a complete
    /// frame — rewinding mid-frame would corrupt the in-flight access unit.
    pub fn rewind(&mut self) -> Result<(), Mp4Error> {
        if !self.last_frame_complete {
            return Err(Mp4Error::RewindBeforeFrameComplete);
        }
        let old_path = self.path.clone();
        let (path, file) = new_temp_file(&self.dir)?;
        let mut writer = Mp4BoxWriter::begin(file)?;
        writer.set_avc_parameters(self.avc_sps.clone(), self.avc_pps.clone(), self.width, self.height);
        self.writer = writer;
        self.path = path;
        self.age = 0;
        self.pending_keyframe = false;
        let _ = std::fs::remove_file(old_path);
        Ok(())
    }

    /// Finalizes the current content to its temp file (patching `mdat`
    /// size and writing `moov`), returning its path, while this buffer
    /// keeps recording into a fresh temp file.
    pub fn finalize(&mut self) -> Result<PathBuf, Mp4Error> {
        if !self.last_frame_complete {
            return Err(Mp4Error::RewindBeforeFrameComplete);
        }
        let (new_path, new_file) = new_temp_file(&self.dir)?;
        let mut new_writer = Mp4BoxWriter::begin(new_file)?;
        new_writer.set_avc_parameters(self.avc_sps.clone(), self.avc_pps.clone(), self.width, self.height);

        let old_path = std::mem::replace(&mut self.path, new_path);
        let old_writer = std::mem::replace(&mut self.writer, new_writer);
        self.age = 0;
        self.pending_keyframe = false;

        old_writer.finalize()?;
        Ok(old_path)
    }
}

impl Drop for Mp4Buffer {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewinding_mid_frame_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut buf = Mp4Buffer::new(dir.path(), 3000).unwrap();
        buf.append(&[1, 2, 3], false, false).unwrap();
        assert!(matches!(buf.rewind(), Err(Mp4Error::RewindBeforeFrameComplete)));
    }

    #[test]
    fn rewinding_resets_age_and_replaces_the_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut buf = Mp4Buffer::new(dir.path(), 3000).unwrap();
        buf.append(&[1, 2, 3], false, true).unwrap();
        buf.append(&[4, 5], false, true).unwrap();
        assert_eq!(buf.age(), 2);
        let old_path = buf.path().to_path_buf();
        buf.rewind().unwrap();
        assert_eq!(buf.age(), 0);
        assert_ne!(buf.path(), old_path);
        assert!(!old_path.exists());
    }

    #[test]
    fn sps_header_frame_does_not_advance_age() {
        let dir = tempfile::tempdir().unwrap();
        let mut buf = Mp4Buffer::new(dir.path(), 3000).unwrap();
        buf.append(&[0x67], true, true).unwrap();
        assert_eq!(buf.age(), 0);
        buf.append(&[1, 2], false, true).unwrap();
        assert_eq!(buf.age(), 1);
    }

    #[test]
    fn finalize_produces_a_playable_file_and_keeps_recording() {
        let dir = tempfile::tempdir().unwrap();
        let mut buf = Mp4Buffer::new(dir.path(), 3000).unwrap();
        buf.set_avc_parameters(vec![0x67, 0x42, 0, 0x1F], vec![0x68], 640, 480);
        buf.append(&[0x67], true, true).unwrap();
        buf.append(&[1, 2, 3, 4], false, true).unwrap();
        let finalized_path = buf.finalize().unwrap();
        assert!(finalized_path.exists());
        let bytes = std::fs::read(&finalized_path).unwrap();
        assert!(bytes.windows(4).any(|w| w == b"moov"));
        assert_eq!(buf.age(), 0);
        assert_ne!(buf.path(), finalized_path);

        // The `stco` chunk offset must point at the real first byte of the
        // mdat payload, not at some unrelated literal.
        let mdat_fourcc = bytes.windows(4).position(|w| w == b"mdat").unwrap();
        let mdat_payload_offset = (mdat_fourcc + 4) as u32;

        let stco_fourcc = bytes.windows(4).position(|w| w == b"stco").unwrap();
        let entry_count =
            u32::from_be_bytes(bytes[stco_fourcc + 8..stco_fourcc + 12].try_into().unwrap());
        assert_eq!(entry_count, 1);
        let chunk_offset =
            u32::from_be_bytes(bytes[stco_fourcc + 12..stco_fourcc + 16].try_into().unwrap());
        assert_eq!(chunk_offset, mdat_payload_offset);
    }
}
