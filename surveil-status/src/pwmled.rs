//! `PWMLedPlugin`: a single accessory light on one GPIO pin, driven at a
//! configurable PWM frequency. Changing the pin or frequency tears down and
//! rebuilds the underlying `OutputPin`, mirroring `_rebuild_pwmled`'s
//! "replace, don't mutate in place" approach (software PWM can't be
//! reconfigured onto a different pin without restarting it).
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use rppal::gpio::{Gpio, OutputPin};
use thiserror::Error;

const MIN_FREQUENCY_HZ: u32 = 10;
const MAX_FREQUENCY_HZ: u32 = 10_000;
const MIN_BCM_PIN: u8 = 0;
const MAX_BCM_PIN: u8 = 27;

#[derive(Debug, Error)]
pub enum PwmLedError {
    #[error("gpio error: {0}")]
    Gpio(#[from] rppal::gpio::Error),
}

fn clamp_frequency(value: u32) -> u32 {
    value.clamp(MIN_FREQUENCY_HZ, MAX_FREQUENCY_HZ)
}

fn clamp_pin(value: u8) -> u8 {
    value.clamp(MIN_BCM_PIN, MAX_BCM_PIN)
}

pub struct PwmLed {
    bcm_pin: Option<u8>,
    frequency: u32,
    pin: Option<OutputPin>,
    value: f64,
}

impl PwmLed {
    pub fn new(bcm_pin: Option<u8>, frequency: u32) -> Result<Self, PwmLedError> {
        let mut led = PwmLed {
            bcm_pin: bcm_pin.map(clamp_pin),
            frequency: clamp_frequency(frequency),
            pin: None,
            value: 0.0,
        };
        led.rebuild()?;
        Ok(led)
    }

    fn rebuild(&mut self) -> Result<(), PwmLedError> {
        if let Some(mut pin) = self.pin.take() {
            pin.clear_pwm()?;
        }
        match self.bcm_pin {
            Some(bcm_pin) => {
                log::debug!(
                    "rebuilding pwm led on pin {} with frequency {}",
                    bcm_pin,
                    self.frequency
                );
                let mut pin = Gpio::new()?.get(bcm_pin)?.into_output();
                pin.set_pwm_frequency(self.frequency as f64, self.value)?;
                self.pin = Some(pin);
            }
            None => {
                log::debug!("disabled pwm led");
            }
        }
        Ok(())
    }

    pub fn frequency(&self) -> u32 {
        self.frequency
    }

    pub fn set_frequency(&mut self, frequency: u32) -> Result<(), PwmLedError> {
        let frequency = clamp_frequency(frequency);
        if frequency != self.frequency {
            self.frequency = frequency;
            self.rebuild()?;
        }
        Ok(())
    }

    pub fn bcm_pin(&self) -> Option<u8> {
        self.bcm_pin
    }

    pub fn set_bcm_pin(&mut self, bcm_pin: u8) -> Result<(), PwmLedError> {
        let bcm_pin = clamp_pin(bcm_pin);
        if Some(bcm_pin) != self.bcm_pin {
            self.bcm_pin = Some(bcm_pin);
            self.rebuild()?;
        }
        Ok(())
    }

    pub fn is_lit(&self) -> Option<bool> {
        self.pin.as_ref().map(|_| self.value > 0.0)
    }

    pub fn value(&self) -> Option<f64> {
        self.pin.as_ref().map(|_| self.value)
    }

    pub fn set_value(&mut self, value: f64) -> Result<(), PwmLedError> {
        if let Some(pin) = self.pin.as_mut() {
            log::info!("setting pwm led on pin {:?} to value {value}", self.bcm_pin);
            pin.set_pwm_frequency(self.frequency as f64, value)?;
            self.value = value;
        }
        Ok(())
    }

    pub fn on(&mut self) -> Result<(), PwmLedError> {
        if self.pin.is_some() {
            self.set_value(1.0)?;
        }
        Ok(())
    }

    pub fn off(&mut self) -> Result<(), PwmLedError> {
        if self.pin.is_some() {
            self.set_value(0.0)?;
        }
        Ok(())
    }

    pub fn toggle(&mut self) -> Result<(), PwmLedError> {
        if self.pin.is_some() {
            if self.is_lit() == Some(true) {
                self.off()
            } else {
                self.on()
            }
        } else {
            Ok(())
        }
    }
}
