//! `BlinkingStatus` from `plugin_status_led.py`: an immutable recipe for a
//! colour animation, turned into a lazy stream of frames by `generate()`.
//! The first repetition never fades in from `off_color` — it assumes
//! whatever transition got it to `on_color` (the initial fade, or simply
//! starting there) already happened, matching `already_faded_in = True`.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use std::error::Error as StdError;
use std::fmt;

pub type Color = (f64, f64, f64);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlinkingStatus {
    pub on_color: Color,
    pub off_color: Color,
    pub fade_in_time: f64,
    pub fade_out_time: f64,
    pub persist_on_time: f64,
    pub persist_off_time: f64,
    /// `None` repeats forever, mirroring `n=float('inf')`.
    pub n: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlinkingStatusError {
    FadeInTime,
    FadeOutTime,
    PersistOnTime,
    PersistOffTime,
    N,
}

impl fmt::Display for BlinkingStatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let field = match self {
            BlinkingStatusError::FadeInTime => "fade_in_time",
            BlinkingStatusError::FadeOutTime => "fade_out_time",
            BlinkingStatusError::PersistOnTime => "persist_on_time",
            BlinkingStatusError::PersistOffTime => "persist_off_time",
            BlinkingStatusError::N => "n",
        };
        write!(f, "invalid {field}")
    }
}

impl StdError for BlinkingStatusError {}

/// `BlinkingStatus.blend`: a straight per-component lerp from `from` to `to`
/// over `frames` steps, `frames` itself excluded (last yielded fraction is
/// `(frames - 1) / frames`).
pub fn blend(from: Color, to: Color, frames: u32) -> impl Iterator<Item = Color> {
    (0..frames).map(move |i| blend_frame(from, to, i, frames))
}

fn blend_frame(from: Color, to: Color, index: u32, frames: u32) -> Color {
    let t = index as f64 / frames as f64;
    (
        from.0 + (to.0 - from.0) * t,
        from.1 + (to.1 - from.1) * t,
        from.2 + (to.2 - from.2) * t,
    )
}

fn fixed_frames(time: f64, fps: f64) -> u32 {
    ((time * fps).round() as i64).max(1) as u32
}

fn frames_or_forever(time: f64, fps: f64) -> Option<u64> {
    if time.is_infinite() {
        None
    } else {
        Some(((time * fps).round() as i64).max(1) as u64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    InitialFadeIn { index: u32, total: u32 },
    FadeIn { index: u32, total: u32 },
    PersistOn { remaining: Option<u64> },
    FadeOut { index: u32, total: u32 },
    PersistOff { remaining: Option<u64> },
}

/// The frame stream produced by [`BlinkingStatus::generate`]. Unbounded
/// phases (`persist_*_time == f64::INFINITY`) never advance on their own —
/// the status stays in that phase until cancelled — so this never
/// materialises more than one frame at a time.
pub struct BlinkSequence {
    status: BlinkingStatus,
    initial_color: Color,
    fade_in_frames: u32,
    fade_out_frames: u32,
    persist_on_frames: Option<u64>,
    persist_off_frames: Option<u64>,
    reps_total: Option<u32>,
    rep_index: u32,
    phase: Option<Phase>,
}

impl BlinkSequence {
    fn start_of_rep(rep_index: u32, fade_in_frames: u32, persist_on_frames: Option<u64>) -> Phase {
        if rep_index == 0 {
            Phase::PersistOn {
                remaining: persist_on_frames,
            }
        } else {
            Phase::FadeIn {
                index: 0,
                total: fade_in_frames,
            }
        }
    }
}

impl Iterator for BlinkSequence {
    type Item = Color;

    fn next(&mut self) -> Option<Color> {
        loop {
            let phase = self.phase?;
            match phase {
                Phase::InitialFadeIn { index, total } => {
                    if index >= total {
                        self.phase = Some(Self::start_of_rep(
                            self.rep_index,
                            self.fade_in_frames,
                            self.persist_on_frames,
                        ));
                        continue;
                    }
                    self.phase = Some(Phase::InitialFadeIn {
                        index: index + 1,
                        total,
                    });
                    return Some(blend_frame(
                        self.initial_color,
                        self.status.on_color,
                        index,
                        total,
                    ));
                }
                Phase::FadeIn { index, total } => {
                    if index >= total {
                        self.phase = Some(Phase::PersistOn {
                            remaining: self.persist_on_frames,
                        });
                        continue;
                    }
                    self.phase = Some(Phase::FadeIn {
                        index: index + 1,
                        total,
                    });
                    return Some(blend_frame(
                        self.status.off_color,
                        self.status.on_color,
                        index,
                        total,
                    ));
                }
                Phase::PersistOn { remaining } => match remaining {
                    None => return Some(self.status.on_color),
                    Some(0) => {
                        self.phase = Some(Phase::FadeOut {
                            index: 0,
                            total: self.fade_out_frames,
                        });
                        continue;
                    }
                    Some(r) => {
                        self.phase = Some(Phase::PersistOn {
                            remaining: Some(r - 1),
                        });
                        return Some(self.status.on_color);
                    }
                },
                Phase::FadeOut { index, total } => {
                    if index >= total {
                        self.phase = Some(Phase::PersistOff {
                            remaining: self.persist_off_frames,
                        });
                        continue;
                    }
                    self.phase = Some(Phase::FadeOut {
                        index: index + 1,
                        total,
                    });
                    return Some(blend_frame(
                        self.status.on_color,
                        self.status.off_color,
                        index,
                        total,
                    ));
                }
                Phase::PersistOff { remaining } => match remaining {
                    None => return Some(self.status.off_color),
                    Some(0) => {
                        self.rep_index += 1;
                        if let Some(total) = self.reps_total {
                            if self.rep_index >= total {
                                self.phase = None;
                                continue;
                            }
                        }
                        self.phase = Some(Self::start_of_rep(
                            self.rep_index,
                            self.fade_in_frames,
                            self.persist_on_frames,
                        ));
                        continue;
                    }
                    Some(r) => {
                        self.phase = Some(Phase::PersistOff {
                            remaining: Some(r - 1),
                        });
                        return Some(self.status.off_color);
                    }
                },
            }
        }
    }
}

impl BlinkingStatus {
    pub fn generate(self, initial_color: Color, fps: f64) -> Result<BlinkSequence, BlinkingStatusError> {
        if self.fade_in_time.is_nan() || self.fade_in_time.is_infinite() {
            return Err(BlinkingStatusError::FadeInTime);
        }
        if self.fade_out_time.is_nan() || self.fade_out_time.is_infinite() {
            return Err(BlinkingStatusError::FadeOutTime);
        }
        if self.persist_on_time.is_nan() {
            return Err(BlinkingStatusError::PersistOnTime);
        }
        if self.persist_off_time.is_nan() {
            return Err(BlinkingStatusError::PersistOffTime);
        }
        if self.n == Some(0) {
            return Err(BlinkingStatusError::N);
        }

        let initial_fade_in_frames = (self.fade_in_time * fps).round().max(0.0) as u32;
        let fade_in_frames = fixed_frames(self.fade_in_time, fps);
        let fade_out_frames = fixed_frames(self.fade_out_time, fps);
        let persist_on_frames = frames_or_forever(self.persist_on_time, fps);
        let persist_off_frames = frames_or_forever(self.persist_off_time, fps);

        let phase = if initial_fade_in_frames > 0 && initial_color != self.on_color {
            Phase::InitialFadeIn {
                index: 0,
                total: initial_fade_in_frames,
            }
        } else {
            BlinkSequence::start_of_rep(0, fade_in_frames, persist_on_frames)
        };

        Ok(BlinkSequence {
            status: self,
            initial_color,
            fade_in_frames,
            fade_out_frames,
            persist_on_frames,
            persist_off_frames,
            reps_total: self.n,
            rep_index: 0,
            phase: Some(phase),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(n: Option<u32>) -> BlinkingStatus {
        BlinkingStatus {
            on_color: (1.0, 0.0, 0.0),
            off_color: (0.0, 0.0, 0.0),
            fade_in_time: 0.1,
            fade_out_time: 0.1,
            persist_on_time: 0.1,
            persist_off_time: 0.1,
            n,
        }
    }

    #[test]
    fn first_repetition_skips_its_own_fade_in() {
        let seq = status(Some(1))
            .generate((0.0, 0.0, 0.0), 10.0)
            .unwrap();
        let frames: Vec<Color> = seq.collect();
        assert_eq!(frames[0], (1.0, 0.0, 0.0));
    }

    #[test]
    fn finite_sequence_terminates() {
        let seq = status(Some(2)).generate((1.0, 0.0, 0.0), 10.0).unwrap();
        let frames: Vec<Color> = seq.collect();
        assert!(!frames.is_empty());
    }

    #[test]
    fn persist_forever_never_advances_past_on_color() {
        let mut status = status(Some(1));
        status.persist_on_time = f64::INFINITY;
        status.fade_in_time = 0.0;
        let mut seq = status.generate((1.0, 0.0, 0.0), 10.0).unwrap();
        for _ in 0..50 {
            assert_eq!(seq.next(), Some((1.0, 0.0, 0.0)));
        }
    }

    #[test]
    fn rejects_nan_and_infinite_fade_times() {
        let mut status = status(Some(1));
        status.fade_in_time = f64::NAN;
        assert_eq!(
            status.generate((0.0, 0.0, 0.0), 10.0).unwrap_err(),
            BlinkingStatusError::FadeInTime
        );
    }

    #[test]
    fn rejects_zero_repeats() {
        let status = status(Some(0));
        assert_eq!(
            status.generate((0.0, 0.0, 0.0), 10.0).unwrap_err(),
            BlinkingStatusError::N
        );
    }

    #[test]
    fn blend_interpolates_linearly_without_reaching_the_endpoint() {
        let frames: Vec<Color> = blend((0.0, 0.0, 0.0), (1.0, 1.0, 1.0), 4).collect();
        assert_eq!(frames.len(), 4);
        assert_eq!(frames[0], (0.0, 0.0, 0.0));
        assert_eq!(frames[2], (0.5, 0.5, 0.5));
    }
}
