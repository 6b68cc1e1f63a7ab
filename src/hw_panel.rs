// src/hw_panel.rs
use anyhow::Context;
use crypto_ticker_lib::config::HardwareConfig;
use crypto_ticker_lib::epd2in66b::{EinkDisplay, Epd2in66b};
use linux_embedded_hal::gpio_cdev::{Chip, LineRequestFlags};
use linux_embedded_hal::spidev::{SpiModeFlags, Spidev, SpidevOptions};
use linux_embedded_hal::{CdevPin, Delay, SpidevDevice};

const CONSUMER: &str = "crypto-ticker";

pub type Panel = EinkDisplay<SpidevDevice, CdevPin, CdevPin, CdevPin, Delay>;

fn output(chip: &mut Chip, offset: u32) -> anyhow::Result<CdevPin> {
    let handle = chip
        .get_line(offset)?
        .request(LineRequestFlags::OUTPUT, 0, CONSUMER)
        .with_context(|| format!("request output line {offset}"))?;
    Ok(CdevPin::new(handle)?)
}

fn input(chip: &mut Chip, offset: u32) -> anyhow::Result<CdevPin> {
    let handle = chip
        .get_line(offset)?
        .request(LineRequestFlags::INPUT, 0, CONSUMER)
        .with_context(|| format!("request input line {offset}"))?;
    Ok(CdevPin::new(handle)?)
}

/// Open the panel on the kernel SPI driver (CS handled by the kernel) with
/// DC/RST/BUSY on the GPIO character device.
pub fn open(hw: &HardwareConfig) -> anyhow::Result<Panel> {
    let mut chip = Chip::new("/dev/gpiochip0").context("open gpiochip0")?;
    let dc = output(&mut chip, hw.dc_pin)?;
    let rst = output(&mut chip, hw.rst_pin)?;
    let busy = input(&mut chip, hw.busy_pin)?;

    let mut spi =
        Spidev::open(&hw.spi_device).with_context(|| format!("open {}", hw.spi_device))?;
    let options = SpidevOptions::new()
        .bits_per_word(8)
        .max_speed_hz(4_000_000)
        .mode(SpiModeFlags::SPI_MODE_0)
        .build();
    spi.configure(&options).context("configure SPI")?;

    Ok(EinkDisplay::new(Epd2in66b::new(
        SpidevDevice(spi),
        dc,
        rst,
        busy,
        Delay,
    )))
}
