//! Minimal non-fragmented MP4 box writer: `ftyp`, then a streamed `mdat`
//! whose size is patched in once the clip is finalized, then a `moov`
//! built from the accumulated sample table. Adapted from the box-writing
//! style of the teacher's fragmented fMP4 writer (`write_box!` +
//! `bytes::BufMut`), but laid out as the classic "mdat then moov" shape
//! instead of per-fragment `moof`/`mdat` pairs, and written synchronously.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use std::io::{Seek, SeekFrom, Write};

use bytes::{BufMut, BytesMut};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Mp4Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("no samples were written")]
    Empty,
    #[error("rewinding or finalizing before the last frame is complete would corrupt the media")]
    RewindBeforeFrameComplete,
}

/// Writes `buf` as `size(4) + fourcc(4) + body`, computing `size` from the
/// body's actual length. Mirrors the teacher's `write_box!` macro.
macro_rules! write_box {
    ($buf:expr, $fourcc:expr, $body:block) => {{
        let _: &mut BytesMut = $buf;
        let pos_start = $buf.len();
        $buf.put_u32(0); // placeholder size
        $buf.put_slice($fourcc);
        $body;
        let size = ($buf.len() - pos_start) as u32;
        $buf[pos_start..pos_start + 4].copy_from_slice(&size.to_be_bytes());
    }};
}

const TIMESCALE: u32 = 90_000;

#[derive(Debug, Clone, Copy, Default)]
pub struct Sample {
    pub size: u32,
    pub duration: u32,
    pub is_keyframe: bool,
}

/// Codec-private data captured the first time an SPS/PPS pair is seen;
/// written into the `avc1`/`avcC` sample entry at finalize time.
#[derive(Debug, Clone, Default)]
pub struct AvcParameters {
    pub sps: Vec<u8>,
    pub pps: Vec<u8>,
    pub width: u16,
    pub height: u16,
}

/// Streams `mdat` payload to `w` as frames arrive, keeping only small
/// per-sample bookkeeping in memory. `finalize` patches the `mdat` size and
/// appends `moov`.
pub struct Mp4BoxWriter<W: Write + Seek> {
    w: W,
    mdat_size_pos: u64,
    samples: Vec<Sample>,
    avc: AvcParameters,
    wrote_header: bool,
}

impl<W: Write + Seek> Mp4BoxWriter<W> {
    pub fn begin(mut w: W) -> Result<Self, Mp4Error> {
        let mut ftyp = BytesMut::new();
        write_box!(&mut ftyp, b"ftyp", {
            ftyp.put_slice(b"isom");
            ftyp.put_u32(0x200);
            ftyp.put_slice(b"isom");
            ftyp.put_slice(b"avc1");
            ftyp.put_slice(b"mp41");
        });
        w.write_all(&ftyp)?;

        let mdat_size_pos = w.stream_position()?;
        w.write_all(&0u32.to_be_bytes())?;
        w.write_all(b"mdat")?;

        Ok(Mp4BoxWriter {
            w,
            mdat_size_pos,
            samples: Vec::new(),
            avc: AvcParameters::default(),
            wrote_header: true,
        })
    }

    pub fn set_avc_parameters(&mut self, sps: Vec<u8>, pps: Vec<u8>, width: u16, height: u16) {
        self.avc = AvcParameters {
            sps,
            pps,
            width,
            height,
        };
    }

    /// Appends one access unit's payload to `mdat` and records its sample
    /// table entry. `duration` is in `TIMESCALE` ticks.
    pub fn write_sample(&mut self, data: &[u8], duration: u32, is_keyframe: bool) -> Result<(), Mp4Error> {
        debug_assert!(self.wrote_header);
        self.w.write_all(data)?;
        self.samples.push(Sample {
            size: data.len() as u32,
            duration: duration.max(1),
            is_keyframe,
        });
        Ok(())
    }

    /// Patches the `mdat` size and appends `moov`, consuming the writer and
    /// returning it (flushed) so the caller can close/rename the file.
    pub fn finalize(mut self) -> Result<W, Mp4Error> {
        if self.samples.is_empty() {
            return Err(Mp4Error::Empty);
        }
        let end_pos = self.w.stream_position()?;
        let mdat_size = end_pos - self.mdat_size_pos;
        self.w.seek(SeekFrom::Start(self.mdat_size_pos))?;
        self.w.write_all(&(mdat_size as u32).to_be_bytes())?;
        self.w.seek(SeekFrom::Start(end_pos))?;

        let moov = self.build_moov();
        self.w.write_all(&moov)?;
        self.w.flush()?;
        Ok(self.w)
    }

    fn build_moov(&self) -> BytesMut {
        let total_duration: u64 = self.samples.iter().map(|s| u64::from(s.duration)).sum();
        let mut moov = BytesMut::new();
        write_box!(&mut moov, b"moov", {
            write_box!(&mut moov, b"mvhd", {
                moov.put_u32(0); // version/flags
                moov.put_u32(0); // creation time
                moov.put_u32(0); // modification time
                moov.put_u32(TIMESCALE);
                moov.put_u32(total_duration as u32);
                moov.put_u32(0x0001_0000); // rate 1.0
                moov.put_u16(0x0100); // volume 1.0
                moov.put_u16(0); // reserved
                moov.put_u64(0); // reserved[2]
                for v in [0x0001_0000u32, 0, 0, 0, 0x0001_0000, 0, 0, 0, 0x4000_0000] {
                    moov.put_u32(v); // unity matrix
                }
                for _ in 0..6 {
                    moov.put_u32(0); // pre_defined
                }
                moov.put_u32(2); // next_track_id
            });
            self.write_trak(&mut moov, total_duration);
        });
        moov
    }

    fn write_trak(&self, moov: &mut BytesMut, total_duration: u64) {
        write_box!(moov, b"trak", {
            write_box!(moov, b"tkhd", {
                moov.put_u32(0x0000_0007); // version/flags: enabled+in movie+in preview
                moov.put_u32(0);
                moov.put_u32(0);
                moov.put_u32(1); // track id
                moov.put_u32(0);
                moov.put_u32(total_duration as u32);
                moov.put_u64(0);
                moov.put_u16(0);
                moov.put_u16(0);
                moov.put_u16(0);
                moov.put_u16(0);
                for v in [0x0001_0000u32, 0, 0, 0, 0x0001_0000, 0, 0, 0, 0x4000_0000] {
                    moov.put_u32(v);
                }
                moov.put_u32(u32::from(self.avc.width) << 16);
                moov.put_u32(u32::from(self.avc.height) << 16);
            });
            write_box!(moov, b"mdia", {
                write_box!(moov, b"mdhd", {
                    moov.put_u32(0);
                    moov.put_u32(0);
                    moov.put_u32(0);
                    moov.put_u32(TIMESCALE);
                    moov.put_u32(total_duration as u32);
                    moov.put_u16(0x55C4); // language "und"
                    moov.put_u16(0);
                });
                write_box!(moov, b"hdlr", {
                    moov.put_u32(0);
                    moov.put_u32(0);
                    moov.put_slice(b"vide");
                    moov.put_u32(0);
                    moov.put_u32(0);
                    moov.put_u32(0);
                    moov.put_slice(b"SurveilVideoHandler\0");
                });
                write_box!(moov, b"minf", {
                    write_box!(moov, b"vmhd", {
                        moov.put_u32(1);
                        moov.put_u64(0);
                    });
                    write_box!(moov, b"dinf", {
                        write_box!(moov, b"dref", {
                            moov.put_u32(0);
                            moov.put_u32(1);
                            write_box!(moov, b"url ", {
                                moov.put_u32(1); // self-contained flag
                            });
                        });
                    });
                    self.write_stbl(moov);
                });
            });
        });
    }

    fn write_stbl(&self, moov: &mut BytesMut) {
        write_box!(moov, b"stbl", {
            write_box!(moov, b"stsd", {
                moov.put_u32(0);
                moov.put_u32(1);
                self.write_avc1(moov);
            });
            write_box!(moov, b"stts", {
                moov.put_u32(0);
                let entries = Self::run_length(self.samples.iter().map(|s| s.duration));
                moov.put_u32(entries.len() as u32);
                for (count, duration) in entries {
                    moov.put_u32(count);
                    moov.put_u32(duration);
                }
            });
            write_box!(moov, b"stsc", {
                moov.put_u32(0);
                moov.put_u32(1);
                moov.put_u32(1);
                moov.put_u32(self.samples.len() as u32);
                moov.put_u32(1);
            });
            write_box!(moov, b"stsz", {
                moov.put_u32(0);
                moov.put_u32(0); // sample_size = 0, use table below
                moov.put_u32(self.samples.len() as u32);
                for s in &self.samples {
                    moov.put_u32(s.size);
                }
            });
            write_box!(moov, b"stco", {
                moov.put_u32(0);
                moov.put_u32(1);
                // Single chunk holding every sample, starting right after the
                // 8-byte mdat header (size + fourcc).
                moov.put_u32((self.mdat_size_pos + 8) as u32);
            });
            write_box!(moov, b"stss", {
                moov.put_u32(0);
                let keyframes: Vec<u32> = self
                    .samples
                    .iter()
                    .enumerate()
                    .filter(|(_, s)| s.is_keyframe)
                    .map(|(i, _)| (i + 1) as u32)
                    .collect();
                moov.put_u32(keyframes.len() as u32);
                for k in keyframes {
                    moov.put_u32(k);
                }
            });
        });
    }

    fn write_avc1(&self, moov: &mut BytesMut) {
        write_box!(moov, b"avc1", {
            moov.put_u32(0); // reserved
            moov.put_u16(0); // reserved
            moov.put_u16(1); // data_reference_index
            moov.put_u16(0); // pre_defined
            moov.put_u16(0); // reserved
            for _ in 0..3 {
                moov.put_u32(0); // pre_defined[3]
            }
            moov.put_u16(self.avc.width);
            moov.put_u16(self.avc.height);
            moov.put_u32(0x0048_0000); // horizresolution 72dpi
            moov.put_u32(0x0048_0000); // vertresolution 72dpi
            moov.put_u32(0); // reserved
            moov.put_u16(1); // frame_count
            for _ in 0..32 {
                moov.put_u8(0); // compressorname
            }
            moov.put_u16(0x0018); // depth
            moov.put_u16(0xFFFF); // pre_defined
            write_box!(moov, b"avcC", {
                moov.put_u8(1); // configurationVersion
                moov.put_u8(self.avc.sps.get(1).copied().unwrap_or(0x42));
                moov.put_u8(self.avc.sps.get(2).copied().unwrap_or(0));
                moov.put_u8(self.avc.sps.get(3).copied().unwrap_or(0x1F));
                moov.put_u8(0xFF); // lengthSizeMinusOne=3, reserved bits set
                moov.put_u8(0xE1); // numOfSequenceParameterSets=1, reserved bits set
                moov.put_u16(self.avc.sps.len() as u16);
                moov.put_slice(&self.avc.sps);
                moov.put_u8(1); // numOfPictureParameterSets
                moov.put_u16(self.avc.pps.len() as u16);
                moov.put_slice(&self.avc.pps);
            });
        });
    }

    fn run_length(values: impl Iterator<Item = u32>) -> Vec<(u32, u32)> {
        let mut out: Vec<(u32, u32)> = Vec::new();
        for v in values {
            match out.last_mut() {
                Some((count, last)) if *last == v => *count += 1,
                _ => out.push((1, v)),
            }
        }
        out
    }
}
