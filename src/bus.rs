//! BusAdapter: owns the SPI link and the three dedicated GPIOs (XCS, XDCS,
//! DREQ), and the hardware reset pin. Generalizes the teacher's
//! `set_cs_pin`/`set_dcs_pin`/`await_data_request` trio into one type that
//! is generic over `embedded-hal` 1.0 traits instead of ESP-IDF's
//! `PinDriver`.

use embedded_hal::digital::{InputPin, OutputPin};
use embedded_hal::spi::{Operation, SpiDevice};

use crate::error::{Error, Result};

/// `embedded-hal`'s `SpiDevice` has no notion of a runtime-configurable
/// clock divider, but this protocol requires switching baudrate between
/// every register access and every data burst (see SPEC_FULL §4.1, §9).
/// Concrete SPI peripherals implement this alongside `SpiDevice`.
pub trait SpiBaudrate {
    fn set_baudrate(&mut self, hz: u32);
}

/// Bound on the busy-poll loop waiting for DREQ to go high, mirroring the
/// teacher's 2000-iteration/1ms-sleep bound (`await_data_request`).
const DREQ_WAIT_ITERATIONS: u32 = 2000;

pub struct BusAdapter<SPI, XCS, XDCS, DREQ, RESET> {
    spi: SPI,
    xcs: XCS,
    xdcs: XDCS,
    dreq: DREQ,
    reset: Option<RESET>,
}

impl<SPI, XCS, XDCS, DREQ, RESET> BusAdapter<SPI, XCS, XDCS, DREQ, RESET>
where
    SPI: SpiDevice + SpiBaudrate,
    XCS: OutputPin,
    XDCS: OutputPin,
    DREQ: InputPin,
    RESET: OutputPin,
{
    pub fn new(spi: SPI, xcs: XCS, xdcs: XDCS, dreq: DREQ, reset: Option<RESET>) -> Self {
        Self {
            spi,
            xcs,
            xdcs,
            dreq,
            reset,
        }
    }

    pub fn set_baudrate(&mut self, hz: u32) {
        self.spi.set_baudrate(hz);
    }

    pub fn assert_xcs(&mut self) -> Result<()> {
        self.xcs.set_low().map_err(|_| Error::Pin)
    }

    pub fn deassert_xcs(&mut self) -> Result<()> {
        self.xcs.set_high().map_err(|_| Error::Pin)
    }

    pub fn assert_xdcs(&mut self) -> Result<()> {
        self.xdcs.set_low().map_err(|_| Error::Pin)
    }

    pub fn deassert_xdcs(&mut self) -> Result<()> {
        self.xdcs.set_high().map_err(|_| Error::Pin)
    }

    /// Non-blocking peek, used by the Streamer's cooperative wait to decide
    /// whether to spin again without committing to a blocking wait.
    pub fn dreq_is_high(&mut self) -> Result<bool> {
        self.dreq.is_high().map_err(|_| Error::Pin)
    }

    /// Blocking wait used by register transactions and flush bursts.
    /// Bounded the same way the teacher bounds it: a fixed number of
    /// 1ms-equivalent spins, erroring out rather than hanging forever on a
    /// disconnected or dead chip.
    pub fn wait_dreq(&mut self) -> Result<()> {
        for _ in 0..DREQ_WAIT_ITERATIONS {
            if self.dreq_is_high()? {
                return Ok(());
            }
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
        Err(Error::Bus)
    }

    pub fn hw_reset(&mut self) -> Result<()> {
        if let Some(reset) = self.reset.as_mut() {
            reset.set_low().map_err(|_| Error::Pin)?;
            std::thread::sleep(std::time::Duration::from_millis(20));
            reset.set_high().map_err(|_| Error::Pin)?;
            std::thread::sleep(std::time::Duration::from_millis(20));
        }
        Ok(())
    }

    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        self.spi
            .transaction(&mut [Operation::Write(data)])
            .map_err(|_| Error::Bus)
    }

    pub fn transfer(&mut self, write: &[u8], read: &mut [u8]) -> Result<()> {
        self.spi
            .transaction(&mut [Operation::Write(write), Operation::Read(read)])
            .map_err(|_| Error::Bus)
    }
}

/// Blanket impl so tests and simple simulations can plug a plain
/// `SpiDevice` mock in directly without a real divider; the no-op baudrate
/// change documents "this device has only one speed" without requiring a
/// separate wrapper type per test.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedBaudrate<SPI> {
    pub inner: SPI,
}

impl<SPI> FixedBaudrate<SPI> {
    pub fn new(inner: SPI) -> Self {
        Self { inner }
    }
}

impl<SPI: SpiDevice> SpiBaudrate for FixedBaudrate<SPI> {
    fn set_baudrate(&mut self, _hz: u32) {}
}

impl<SPI> embedded_hal::spi::ErrorType for FixedBaudrate<SPI>
where
    SPI: SpiDevice,
{
    type Error = SPI::Error;
}

impl<SPI> SpiDevice for FixedBaudrate<SPI>
where
    SPI: SpiDevice,
{
    fn transaction(
        &mut self,
        operations: &mut [Operation<'_, u8>],
    ) -> core::result::Result<(), Self::Error> {
        self.inner.transaction(operations)
    }
}
