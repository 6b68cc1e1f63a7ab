// src/hw_gpio.rs
use crypto_ticker_lib::config::HardwareConfig;
use crypto_ticker_lib::input::{ButtonId, LatchedLines, RawEdge};
use crypto_ticker_lib::network::{NetworkError, PowerRail};
use log::info;
use rppal::gpio::{Gpio, InputPin, Level, OutputPin, Trigger};
use std::sync::mpsc::Sender;
use std::thread;
use std::time::{Duration, Instant};

/// Both buttons with edge interrupts. Interrupts stop when this is dropped.
pub struct GpioButtons {
    _cycle: InputPin,
    _sleep: InputPin,
    lines: LatchedLines,
}

impl GpioButtons {
    pub fn new(hw: &HardwareConfig, edges: Sender<RawEdge>) -> rppal::gpio::Result<Self> {
        let gpio = Gpio::new()?;
        let lines = LatchedLines::new();
        let cycle = Self::watch(&gpio, hw.button_a_pin, ButtonId::Cycle, &lines, edges.clone())?;
        let sleep = Self::watch(&gpio, hw.button_b_pin, ButtonId::Sleep, &lines, edges)?;
        info!(
            "Buttons on GPIO {} (cycle) and GPIO {} (sleep/reset)",
            hw.button_a_pin, hw.button_b_pin
        );
        Ok(Self {
            _cycle: cycle,
            _sleep: sleep,
            lines,
        })
    }

    /// Pulled up, active low. The callback only latches the level and
    /// enqueues the edge.
    fn watch(
        gpio: &Gpio,
        pin: u8,
        button: ButtonId,
        lines: &LatchedLines,
        edges: Sender<RawEdge>,
    ) -> rppal::gpio::Result<InputPin> {
        let mut input = gpio.get(pin)?.into_input_pullup();
        lines.set_held(button, input.is_low());
        let lines = lines.clone();
        input.set_async_interrupt(Trigger::Both, move |level: Level| {
            lines.set_held(button, level == Level::Low);
            let _ = edges.send(RawEdge {
                button,
                at: Instant::now(),
            });
        })?;
        Ok(input)
    }

    pub fn lines(&self) -> LatchedLines {
        self.lines.clone()
    }
}

/// WiFi module supply switched by a GPIO.
pub struct GpioRail {
    pin: OutputPin,
}

impl GpioRail {
    pub fn new(pin: u8) -> rppal::gpio::Result<Self> {
        let pin = Gpio::new()?.get(pin)?.into_output_low();
        Ok(Self { pin })
    }
}

impl PowerRail for GpioRail {
    fn set_powered(&mut self, on: bool) -> Result<(), NetworkError> {
        if on {
            self.pin.set_high();
        } else {
            self.pin.set_low();
        }
        // Let the supply settle.
        thread::sleep(Duration::from_millis(200));
        Ok(())
    }
}
