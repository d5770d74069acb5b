//! `StatusLEDPlugin`: an RGB status LED driven by three software-PWM GPIO
//! pins, animated by a `ThreadHost` that advances every active
//! `BlinkSequence` once per frame and writes the last colour that wins.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::color::{BlinkingStatus, BlinkingStatusError, Color};
use crate::worker::ThreadHost;
use rppal::gpio::{Gpio, OutputPin};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use thiserror::Error;

const STATUS_LED_FPS: f64 = 25.0;
const SOFT_PWM_FREQUENCY_HZ: f64 = 100.0;

#[derive(Debug, Error)]
pub enum StatusLedError {
    #[error("gpio error: {0}")]
    Gpio(#[from] rppal::gpio::Error),
    #[error(transparent)]
    Status(#[from] BlinkingStatusError),
    #[error("invalid frequency")]
    Frequency,
    #[error("invalid duty_cycle")]
    DutyCycle,
    #[error("status led has no pins configured")]
    Disabled,
}

fn clamp01(v: f64) -> f64 {
    v.max(0.0).min(1.0)
}

struct RgbPins {
    r: OutputPin,
    g: OutputPin,
    b: OutputPin,
}

impl RgbPins {
    fn write(&mut self, color: Color) -> Result<(), rppal::gpio::Error> {
        self.r.set_pwm_frequency(SOFT_PWM_FREQUENCY_HZ, clamp01(color.0))?;
        self.g.set_pwm_frequency(SOFT_PWM_FREQUENCY_HZ, clamp01(color.1))?;
        self.b.set_pwm_frequency(SOFT_PWM_FREQUENCY_HZ, clamp01(color.2))?;
        Ok(())
    }
}

struct Shared {
    pins: Mutex<Option<RgbPins>>,
    current_color: Mutex<Color>,
    active: Mutex<Vec<(u64, crate::color::BlinkSequence)>>,
}

impl Shared {
    /// `_next_color`: advance every active sequence, drop exhausted ones,
    /// keep only the last colour produced this frame.
    fn advance(&self) -> Option<Color> {
        let mut active = self.active.lock().unwrap();
        let mut color = None;
        let mut i = 0;
        while i < active.len() {
            match active[i].1.next() {
                Some(c) => {
                    color = Some(c);
                    i += 1;
                }
                None => {
                    active.remove(i);
                }
            }
        }
        color
    }
}

/// A handle to a still-running colour sequence. Dropping it does nothing —
/// most callers fire a status and forget it, trusting it to finish on its
/// own (or run forever, for `persist_until_canceled`) — call `cancel()`
/// explicitly to stop it early, the Rust stand-in for `ContextualStatus`.
pub struct StatusHandle {
    shared: Weak<Shared>,
    id: u64,
}

impl StatusHandle {
    pub fn cancel(self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.active.lock().unwrap().retain(|(id, _)| *id != self.id);
        }
    }
}

pub struct StatusLed {
    shared: Arc<Shared>,
    blink_thread: Option<ThreadHost>,
    next_id: AtomicU64,
}

impl StatusLed {
    /// `get_bcm_pins_rgb` + `__enter__`: `None` (unconfigured) or duplicate
    /// pin numbers leave the LED disabled rather than erroring, matching the
    /// plugin logging a warning and running dark.
    pub fn new(bcm_pins: Option<(u8, u8, u8)>) -> Result<Self, StatusLedError> {
        let pins = match bcm_pins {
            None => {
                log::warn!("no pin numbers configured for the status LED, it will not work");
                None
            }
            Some((r, g, b)) if r == g || g == b || r == b => {
                log::error!("status LED pin numbers must be distinct, it will not work");
                None
            }
            Some((r, g, b)) => {
                let gpio = Gpio::new()?;
                Some(RgbPins {
                    r: gpio.get(r)?.into_output(),
                    g: gpio.get(g)?.into_output(),
                    b: gpio.get(b)?.into_output(),
                })
            }
        };

        let enabled = pins.is_some();
        let shared = Arc::new(Shared {
            pins: Mutex::new(pins),
            current_color: Mutex::new((0.0, 0.0, 0.0)),
            active: Mutex::new(Vec::new()),
        });

        let blink_thread = if enabled {
            let worker_shared = shared.clone();
            Some(ThreadHost::spawn("led_blinking_thread", move |token| loop {
                match worker_shared.advance() {
                    Some(color) => {
                        *worker_shared.current_color.lock().unwrap() = color;
                        if let Some(pins) = worker_shared.pins.lock().unwrap().as_mut() {
                            if let Err(e) = pins.write(color) {
                                log::error!("failed to drive status led: {e}");
                            }
                        }
                        if token.wait(Duration::from_secs_f64(1.0 / STATUS_LED_FPS)) {
                            break;
                        }
                    }
                    None => break,
                }
            }))
        } else {
            None
        };

        Ok(StatusLed {
            shared,
            blink_thread,
            next_id: AtomicU64::new(0),
        })
    }

    fn push_validated(&self, status: BlinkingStatus) -> Result<StatusHandle, StatusLedError> {
        if self.blink_thread.is_none() {
            return Err(StatusLedError::Disabled);
        }
        let initial = *self.shared.current_color.lock().unwrap();
        let seq = status.generate(initial, STATUS_LED_FPS)?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut active = self.shared.active.lock().unwrap();
        let was_empty = active.is_empty();
        active.push((id, seq));
        drop(active);
        if was_empty {
            if let Some(host) = &self.blink_thread {
                host.wake();
            }
        }
        Ok(StatusHandle {
            shared: Arc::downgrade(&self.shared),
            id,
        })
    }

    /// `push_status`: the negativity/NaN checks `BlinkingStatus::generate`
    /// doesn't itself make (it only rejects what would break its own maths).
    pub fn push_status(&self, status: BlinkingStatus) -> Result<StatusHandle, StatusLedError> {
        if status.fade_in_time < 0.0 || status.fade_in_time.is_infinite() || status.fade_in_time.is_nan() {
            return Err(BlinkingStatusError::FadeInTime.into());
        }
        if status.fade_out_time < 0.0 || status.fade_out_time.is_infinite() || status.fade_out_time.is_nan() {
            return Err(BlinkingStatusError::FadeOutTime.into());
        }
        if status.persist_on_time < 0.0 || status.persist_on_time.is_nan() {
            return Err(BlinkingStatusError::PersistOnTime.into());
        }
        if status.persist_off_time < 0.0 || status.persist_off_time.is_nan() {
            return Err(BlinkingStatusError::PersistOffTime.into());
        }
        if status.n == Some(0) {
            return Err(BlinkingStatusError::N.into());
        }
        self.push_validated(status)
    }

    pub fn set(
        &self,
        color: Color,
        fade_in_time: f64,
        persist_until_canceled: bool,
    ) -> Result<StatusHandle, StatusLedError> {
        self.push_status(BlinkingStatus {
            on_color: color,
            off_color: color,
            fade_in_time,
            fade_out_time: 0.0,
            persist_on_time: 0.0,
            persist_off_time: if persist_until_canceled { f64::INFINITY } else { 0.0 },
            n: Some(1),
        })
    }

    pub fn pulse(
        &self,
        color: Color,
        n: Option<u32>,
        persist_time: f64,
        frequency: f64,
    ) -> Result<StatusHandle, StatusLedError> {
        if frequency <= 0.0 || frequency.is_nan() || frequency.is_infinite() {
            return Err(StatusLedError::Frequency);
        }
        let period = 1.0 / frequency;
        self.push_status(BlinkingStatus {
            on_color: color,
            off_color: (0.0, 0.0, 0.0),
            fade_in_time: 0.5 * period,
            fade_out_time: 0.5 * period,
            persist_on_time: persist_time,
            persist_off_time: 0.0,
            n,
        })
    }

    pub fn blink(
        &self,
        color: Color,
        n: Option<u32>,
        duty_cycle: f64,
        frequency: f64,
    ) -> Result<StatusHandle, StatusLedError> {
        if frequency <= 0.0 || frequency.is_nan() || frequency.is_infinite() {
            return Err(StatusLedError::Frequency);
        }
        if duty_cycle.is_nan() || duty_cycle.is_infinite() {
            return Err(StatusLedError::DutyCycle);
        }
        let duty_cycle = duty_cycle.max(0.0).min(1.0);
        let period = 1.0 / frequency;
        self.push_status(BlinkingStatus {
            on_color: color,
            off_color: (0.0, 0.0, 0.0),
            fade_in_time: 0.0,
            fade_out_time: 0.0,
            persist_on_time: duty_cycle * period,
            persist_off_time: (1.0 - duty_cycle) * period,
            n,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_without_pins_configured() {
        let led = StatusLed::new(None).unwrap();
        let err = led
            .set((1.0, 0.0, 0.0), 0.5, false)
            .expect_err("disabled led must refuse to push a status");
        assert!(matches!(err, StatusLedError::Disabled));
    }

    #[test]
    fn disabled_with_duplicate_pin_numbers() {
        let led = StatusLed::new(Some((5, 5, 6))).unwrap();
        assert!(matches!(
            led.set((1.0, 0.0, 0.0), 0.5, false),
            Err(StatusLedError::Disabled)
        ));
    }

    #[test]
    fn validation_runs_before_the_disabled_check() {
        let led = StatusLed::new(None).unwrap();
        let err = led
            .set((1.0, 0.0, 0.0), -1.0, false)
            .expect_err("negative fade_in_time must be rejected");
        assert!(matches!(err, StatusLedError::Status(BlinkingStatusError::FadeInTime)));
    }

    #[test]
    fn pulse_rejects_non_positive_frequency() {
        let led = StatusLed::new(None).unwrap();
        assert!(matches!(
            led.pulse((1.0, 0.0, 0.0), Some(1), 0.0, 0.0),
            Err(StatusLedError::Frequency)
        ));
    }

    #[test]
    fn blink_clamps_duty_cycle_instead_of_rejecting_out_of_range() {
        // out-of-range duty_cycle is clamped, not rejected, so the only way
        // to observe this without hardware is that it doesn't surface
        // DutyCycle for a merely out-of-[0,1] (but finite) value.
        let led = StatusLed::new(None).unwrap();
        assert!(matches!(
            led.blink((1.0, 0.0, 0.0), Some(1), 5.0, 1.0),
            Err(StatusLedError::Disabled)
        ));
    }
}
