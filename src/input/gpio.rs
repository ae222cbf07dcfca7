//! Raspberry Pi GPIO edge source built on `rppal`.

use super::edge::{EdgeSink, EdgeSource, InputError};
use rppal::gpio::{Event, Gpio, InputPin, Trigger};
use std::collections::HashMap;
use std::time::Instant;

/// Watches BCM-numbered pins wired as active-low buttons.
///
/// Each claimed pin is configured as an input with the internal pull-up
/// enabled and a falling-edge interrupt. rppal runs the interrupt handler on
/// its own thread, so sinks are called from there.
pub struct GpioEdgeSource {
    gpio: Gpio,
    pins: HashMap<u8, InputPin>,
}

impl GpioEdgeSource {
    pub fn new() -> Result<Self, InputError> {
        let gpio = Gpio::new().map_err(|e| InputError::Backend(e.to_string()))?;
        Ok(Self {
            gpio,
            pins: HashMap::new(),
        })
    }

    fn unavailable(pin: u8, e: rppal::gpio::Error) -> InputError {
        InputError::PinUnavailable {
            pin,
            reason: e.to_string(),
        }
    }
}

impl EdgeSource for GpioEdgeSource {
    fn check(&self, pin: u8) -> Result<(), InputError> {
        if self.pins.contains_key(&pin) {
            return Err(InputError::PinUnavailable {
                pin,
                reason: "already claimed".to_string(),
            });
        }
        // Taking the pin and dropping it right away proves it exists and is
        // not held elsewhere in this process.
        self.gpio
            .get(pin)
            .map(drop)
            .map_err(|e| Self::unavailable(pin, e))
    }

    fn claim(&mut self, pin: u8, sink: EdgeSink) -> Result<(), InputError> {
        self.check(pin)?;
        let mut input = self
            .gpio
            .get(pin)
            .map_err(|e| Self::unavailable(pin, e))?
            .into_input_pullup();

        input
            .set_async_interrupt(Trigger::FallingEdge, None, move |_event: Event| {
                sink(Instant::now())
            })
            .map_err(|e| Self::unavailable(pin, e))?;

        tracing::debug!(pin, "GPIO pin claimed");
        self.pins.insert(pin, input);
        Ok(())
    }

    fn release(&mut self, pin: u8) {
        if let Some(mut input) = self.pins.remove(&pin) {
            if let Err(e) = input.clear_async_interrupt() {
                tracing::warn!(pin, error = %e, "Failed to clear GPIO interrupt");
            }
            tracing::debug!(pin, "GPIO pin released");
        }
    }
}

impl Drop for GpioEdgeSource {
    fn drop(&mut self) {
        let pins: Vec<u8> = self.pins.keys().copied().collect();
        for pin in pins {
            self.release(pin);
        }
    }
}
