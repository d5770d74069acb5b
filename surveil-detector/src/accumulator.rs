//! Motion accumulator and trigger hysteresis: `MotionDetectorCameraPlugin`'s
//! `analyze`/`_updated_trigger_status` from the original, minus the Pyro
//! plumbing.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

/// One block of the camera driver's per-frame motion vector grid (signed
/// 8-bit x/y components, as H.264 encoders emit them).
#[derive(Debug, Clone, Copy, Default)]
pub struct MotionVector {
    pub x: i16,
    pub y: i16,
}

/// Computes the per-block motion magnitude, scaled into `0..=255` and
/// passed through a 3x3 median filter, mirroring
/// `get_denoised_motion_vector_norm`.
pub fn denoised_motion_vector_norm(blocks: &[MotionVector], width: usize, height: usize) -> Vec<u8> {
    assert_eq!(blocks.len(), width * height);
    let scaled: Vec<u8> = blocks
        .iter()
        .map(|mv| {
            let norm = ((mv.x as f64).powi(2) + (mv.y as f64).powi(2)).sqrt();
            // Max norm for 8-bit signed vector components is ~182.
            let scaled = (norm * 255.0 / 182.0).round();
            scaled.clamp(0.0, 255.0) as u8
        })
        .collect();
    median_filter_3x3(&scaled, width, height)
}

fn median_filter_3x3(data: &[u8], width: usize, height: usize) -> Vec<u8> {
    let mut out = vec![0u8; data.len()];
    for y in 0..height {
        for x in 0..width {
            let mut window = [0u8; 9];
            let mut n = 0;
            for dy in -1i32..=1 {
                for dx in -1i32..=1 {
                    let sx = x as i32 + dx;
                    let sy = y as i32 + dy;
                    if sx >= 0 && sx < width as i32 && sy >= 0 && sy < height as i32 {
                        window[n] = data[sy as usize * width + sx as usize];
                        n += 1;
                    }
                }
            }
            window[..n].sort_unstable();
            out[y * width + x] = window[n / 2];
        }
    }
    out
}

/// Exponentially decaying accumulator of motion magnitude, plus the
/// dual-threshold hysteresis trigger from the original (`trigger_thresholds`
/// / `trigger_area_fractions`, indexed `[0]` when not triggered and `[1]`
/// while triggered, so the "off" threshold can be set lower than the "on"
/// one to avoid flapping).
pub struct MotionAccumulator {
    width: usize,
    height: usize,
    values: Vec<f64>,
    triggered: bool,
    trigger_thresholds: (u8, u8),
    trigger_area_fractions: (f64, f64),
}

impl MotionAccumulator {
    pub fn new(width: usize, height: usize, trigger_thresholds: (u8, u8), trigger_area_fractions: (f64, f64)) -> Self {
        MotionAccumulator {
            width,
            height,
            values: vec![0.0; width * height],
            triggered: false,
            trigger_thresholds,
            trigger_area_fractions,
        }
    }

    pub fn triggered(&self) -> bool {
        self.triggered
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// `decay_factor = exp(-8*ln(2) / (time_window * framerate))`: after
    /// `time_window` seconds a value decays to below 1/256 of itself.
    pub fn decay_factor(time_window: f64, framerate: f64) -> f64 {
        (-8.0 * std::f64::consts::LN_2 / (time_window * framerate)).exp()
    }

    /// Folds in one frame's denoised motion norm, decaying the running
    /// accumulator first, then re-evaluates the trigger. Returns `true` if
    /// the trigger state flipped.
    pub fn update(&mut self, frame_norm: &[u8], decay_factor: f64) -> bool {
        assert_eq!(frame_norm.len(), self.values.len());
        for (acc, &n) in self.values.iter_mut().zip(frame_norm) {
            *acc = *acc * decay_factor + n as f64;
        }
        self.update_trigger_status()
    }

    fn update_trigger_status(&mut self) -> bool {
        let idx = if self.triggered { 1 } else { 0 };
        let threshold = if idx == 1 { self.trigger_thresholds.1 } else { self.trigger_thresholds.0 } as f64;
        let min_area = (if idx == 1 { self.trigger_area_fractions.1 } else { self.trigger_area_fractions.0 })
            * (self.width * self.height) as f64;
        let above = self.values.iter().filter(|&&v| v > threshold).count() as f64;
        let new_triggered = above >= min_area;
        if new_triggered != self.triggered {
            self.triggered = new_triggered;
            true
        } else {
            false
        }
    }
}
