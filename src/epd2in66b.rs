//! 2.66" B/W/Red e-paper driver (152×296, SSD1675-style controller)
//!
//! Written against the embedded-hal 1.0 traits so the same code drives the
//! panel through `linux-embedded-hal` on the device and through recording
//! fakes in tests. Chip select is owned by the [`SpiDevice`].

use crate::display::{Display, Screen};
use crate::render::{draw_screen, FrameBuffer, InkColor, NATIVE_HEIGHT, NATIVE_WIDTH};
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{self, InputPin, OutputPin};
use embedded_hal::spi::{self, SpiDevice};
use log::{debug, info, warn};
use thiserror::Error;

/// spidev refuses transfers larger than its buffer (4096 bytes by default).
const MAX_CHUNK: usize = 4096;
/// BUSY polls of 10 ms before giving up.
const BUSY_POLLS: u32 = 500;

mod command {
    pub const DEEP_SLEEP: u8 = 0x10;
    pub const DATA_ENTRY_MODE: u8 = 0x11;
    pub const SW_RESET: u8 = 0x12;
    pub const MASTER_ACTIVATION: u8 = 0x20;
    pub const DISPLAY_UPDATE_CONTROL: u8 = 0x21;
    pub const WRITE_BLACK_RAM: u8 = 0x24;
    pub const WRITE_RED_RAM: u8 = 0x26;
    pub const RAM_X_RANGE: u8 = 0x44;
    pub const RAM_Y_RANGE: u8 = 0x45;
    pub const RAM_X_COUNTER: u8 = 0x4E;
    pub const RAM_Y_COUNTER: u8 = 0x4F;
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum EpdError {
    #[error("SPI transfer failed: {0:?}")]
    Spi(spi::ErrorKind),

    #[error("GPIO failed: {0:?}")]
    Pin(digital::ErrorKind),

    #[error("panel stayed busy for {0} ms")]
    BusyTimeout(u32),
}

fn spi_err(e: impl spi::Error) -> EpdError {
    EpdError::Spi(e.kind())
}

fn pin_err(e: impl digital::Error) -> EpdError {
    EpdError::Pin(e.kind())
}

pub struct Epd2in66b<SPI, DC, RST, BUSY, DELAY> {
    spi: SPI,
    dc: DC,
    rst: RST,
    busy: BUSY,
    delay: DELAY,
}

impl<SPI, DC, RST, BUSY, DELAY> Epd2in66b<SPI, DC, RST, BUSY, DELAY>
where
    SPI: SpiDevice,
    DC: OutputPin,
    RST: OutputPin,
    BUSY: InputPin,
    DELAY: DelayNs,
{
    pub fn new(spi: SPI, dc: DC, rst: RST, busy: BUSY, delay: DELAY) -> Self {
        Self {
            spi,
            dc,
            rst,
            busy,
            delay,
        }
    }

    fn reset(&mut self) -> Result<(), EpdError> {
        self.rst.set_high().map_err(pin_err)?;
        self.delay.delay_ms(200);
        self.rst.set_low().map_err(pin_err)?;
        self.delay.delay_ms(5);
        self.rst.set_high().map_err(pin_err)?;
        self.delay.delay_ms(200);
        Ok(())
    }

    fn send_command(&mut self, command: u8) -> Result<(), EpdError> {
        self.dc.set_low().map_err(pin_err)?;
        self.spi.write(&[command]).map_err(spi_err)
    }

    fn send_data(&mut self, data: &[u8]) -> Result<(), EpdError> {
        self.dc.set_high().map_err(pin_err)?;
        for chunk in data.chunks(MAX_CHUNK) {
            self.spi.write(chunk).map_err(spi_err)?;
        }
        Ok(())
    }

    fn command_with(&mut self, command: u8, data: &[u8]) -> Result<(), EpdError> {
        self.send_command(command)?;
        self.send_data(data)
    }

    /// BUSY is high while the controller works.
    fn wait_busy(&mut self) -> Result<(), EpdError> {
        let mut polls = 0;
        while self.busy.is_high().map_err(pin_err)? {
            if polls >= BUSY_POLLS {
                return Err(EpdError::BusyTimeout(polls * 10));
            }
            self.delay.delay_ms(10);
            polls += 1;
        }
        debug!("panel ready after {} polls", polls);
        Ok(())
    }

    pub fn init(&mut self) -> Result<(), EpdError> {
        self.reset()?;
        self.wait_busy()?;
        self.send_command(command::SW_RESET)?;
        self.wait_busy()?;

        self.command_with(command::DATA_ENTRY_MODE, &[0x03])?;

        let x_end = (NATIVE_WIDTH / 8 - 1) as u8;
        let y_end = NATIVE_HEIGHT - 1;
        self.command_with(command::RAM_X_RANGE, &[0x00, x_end & 0x1F])?;
        self.command_with(
            command::RAM_Y_RANGE,
            &[0x00, 0x00, (y_end & 0xFF) as u8, ((y_end >> 8) & 0x01) as u8],
        )?;
        self.command_with(command::DISPLAY_UPDATE_CONTROL, &[0x00, 0x80])?;

        self.command_with(command::RAM_X_COUNTER, &[0x00])?;
        self.command_with(command::RAM_Y_COUNTER, &[0x00, 0x00])?;
        self.wait_busy()?;

        info!("e-paper panel initialised");
        Ok(())
    }

    /// Upload both planes and run a full refresh.
    pub fn display(&mut self, buffer: &FrameBuffer) -> Result<(), EpdError> {
        let (black, red) = buffer.ink_counts();
        debug!("uploading frame: {} black, {} red pixels", black, red);

        self.command_with(command::WRITE_BLACK_RAM, buffer.black_plane())?;
        self.command_with(command::WRITE_RED_RAM, buffer.red_plane())?;
        self.send_command(command::MASTER_ACTIVATION)?;
        self.wait_busy()
    }

    /// Deep sleep. The image stays on the glass; `init` wakes the panel.
    pub fn sleep(&mut self) -> Result<(), EpdError> {
        self.command_with(command::DEEP_SLEEP, &[0x01])?;
        self.delay.delay_ms(100);
        Ok(())
    }
}

/// [`Display`] backed by the e-paper panel.
pub struct EinkDisplay<SPI, DC, RST, BUSY, DELAY> {
    epd: Epd2in66b<SPI, DC, RST, BUSY, DELAY>,
    buffer: FrameBuffer,
    awake: bool,
}

impl<SPI, DC, RST, BUSY, DELAY> EinkDisplay<SPI, DC, RST, BUSY, DELAY>
where
    SPI: SpiDevice,
    DC: OutputPin,
    RST: OutputPin,
    BUSY: InputPin,
    DELAY: DelayNs,
{
    pub fn new(epd: Epd2in66b<SPI, DC, RST, BUSY, DELAY>) -> Self {
        Self {
            epd,
            buffer: FrameBuffer::new(),
            awake: false,
        }
    }

    pub fn buffer(&self) -> &FrameBuffer {
        &self.buffer
    }

    fn push(&mut self) -> Result<(), EpdError> {
        if !self.awake {
            self.epd.init()?;
            self.awake = true;
        }
        self.epd.display(&self.buffer)
    }
}

impl<SPI, DC, RST, BUSY, DELAY> Display for EinkDisplay<SPI, DC, RST, BUSY, DELAY>
where
    SPI: SpiDevice,
    DC: OutputPin,
    RST: OutputPin,
    BUSY: InputPin,
    DELAY: DelayNs,
{
    fn clear(&mut self) {
        self.buffer.fill(InkColor::White);
    }

    fn render(&mut self, screen: &Screen) {
        draw_screen(&mut self.buffer, screen);
        if let Err(e) = self.push() {
            warn!("panel refresh failed: {}", e);
            // Force a full re-init on the next render.
            self.awake = false;
        }
    }

    fn sleep(&mut self) {
        if !self.awake {
            return;
        }
        if let Err(e) = self.epd.sleep() {
            warn!("panel sleep failed: {}", e);
        }
        self.awake = false;
    }
}
