//! RegisterInterface: word-granularity SCI register access and indirect
//! XRAM access, built on top of `BusAdapter`. Grounded on the teacher's
//! `read_register`/`write_register`/`wram_write` plus the exact
//! deassert-wait-switch-assert-transfer-deassert-restore sequence from
//! `original_source/async/vs1053.py`'s `_write_reg`/`_read_reg`.

use embedded_hal::digital::{InputPin, OutputPin};
use embedded_hal::spi::SpiDevice;

use crate::bus::{BusAdapter, SpiBaudrate};
use crate::error::Result;
use crate::registers::{DATA_BAUDRATE_HZ, SCI_BAUDRATE_HZ, SCI_WRAM, SCI_WRAMADDR};

const SCI_WRITE_OPCODE: u8 = 0x02;
const SCI_READ_OPCODE: u8 = 0x03;

pub struct RegisterInterface<SPI, XCS, XDCS, DREQ, RESET> {
    bus: BusAdapter<SPI, XCS, XDCS, DREQ, RESET>,
    /// Selects the initial (pre-clock-boost) SCI rate vs. the normal one.
    /// Mirrors the teacher's dual `spi`/`low_spi` handles, but as a single
    /// runtime baudrate instead of two pre-configured SPI objects.
    slow_spi: bool,
}

impl<SPI, XCS, XDCS, DREQ, RESET> RegisterInterface<SPI, XCS, XDCS, DREQ, RESET>
where
    SPI: SpiDevice + SpiBaudrate,
    XCS: OutputPin,
    XDCS: OutputPin,
    DREQ: InputPin,
    RESET: OutputPin,
{
    pub fn new(bus: BusAdapter<SPI, XCS, XDCS, DREQ, RESET>) -> Self {
        Self {
            bus,
            slow_spi: true,
        }
    }

    pub fn bus(&mut self) -> &mut BusAdapter<SPI, XCS, XDCS, DREQ, RESET> {
        &mut self.bus
    }

    pub fn set_slow_spi(&mut self, slow: bool) {
        self.slow_spi = slow;
    }

    fn sci_baudrate(&self) -> u32 {
        if self.slow_spi {
            crate::registers::INITIAL_BAUDRATE_HZ
        } else {
            SCI_BAUDRATE_HZ
        }
    }

    fn control_mode_on(&mut self) -> Result<()> {
        self.bus.deassert_xdcs()?;
        self.bus.wait_dreq()?;
        self.bus.set_baudrate(self.sci_baudrate());
        self.bus.assert_xcs()
    }

    fn control_mode_off(&mut self) -> Result<()> {
        self.bus.deassert_xcs()?;
        self.bus.set_baudrate(DATA_BAUDRATE_HZ);
        Ok(())
    }

    pub fn data_mode_on(&mut self) -> Result<()> {
        self.bus.deassert_xcs()?;
        self.bus.wait_dreq()?;
        self.bus.assert_xdcs()
    }

    pub fn data_mode_off(&mut self) -> Result<()> {
        self.bus.deassert_xdcs()
    }

    pub fn read_register(&mut self, address: u8) -> Result<u16> {
        self.control_mode_on()?;
        let mut buf = [0u8; 2];
        let result = self.bus.transfer(&[SCI_READ_OPCODE, address], &mut buf);
        self.control_mode_off()?;
        result?;
        Ok(u16::from_be_bytes(buf))
    }

    pub fn write_register(&mut self, address: u8, value: u16) -> Result<()> {
        self.control_mode_on()?;
        let bytes = value.to_be_bytes();
        let result = self
            .bus
            .write(&[SCI_WRITE_OPCODE, address, bytes[0], bytes[1]]);
        self.control_mode_off()?;
        result
    }

    pub fn read_ram(&mut self, address: u16) -> Result<u16> {
        self.write_register(SCI_WRAMADDR, address)?;
        self.read_register(SCI_WRAM)
    }

    pub fn write_ram(&mut self, address: u16, value: u16) -> Result<()> {
        self.write_register(SCI_WRAMADDR, address)?;
        self.write_register(SCI_WRAM, value)
    }

    /// Sets `bits` in SCI_MODE while always preserving SDINEW.
    pub fn mode_set(&mut self, bits: u16) -> Result<()> {
        let mode = self.read_register(crate::registers::SCI_MODE)?;
        self.write_register(
            crate::registers::SCI_MODE,
            mode | bits | crate::registers::SM_SDINEW,
        )
    }

    /// Clears `bits` in SCI_MODE while always preserving SDINEW.
    pub fn mode_clear(&mut self, bits: u16) -> Result<()> {
        let mode = self.read_register(crate::registers::SCI_MODE)?;
        self.write_register(
            crate::registers::SCI_MODE,
            (mode & !bits) | crate::registers::SM_SDINEW,
        )
    }

    /// Writes one 32-byte SDI burst. Caller is responsible for having
    /// entered data mode and for DREQ gating.
    pub fn sdi_write(&mut self, data: &[u8]) -> Result<()> {
        self.bus.write(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::FixedBaudrate;
    use embedded_hal_mock::eh1::digital::{Mock as PinMock, State as PinState, Transaction as PinTx};
    use embedded_hal_mock::eh1::spi::{Mock as SpiMock, Transaction as SpiTx};

    fn make(
        spi_tx: &[SpiTx<u8>],
        xcs_tx: &[PinTx],
        xdcs_tx: &[PinTx],
        dreq_tx: &[PinTx],
    ) -> RegisterInterface<
        FixedBaudrate<SpiMock<u8>>,
        embedded_hal_mock::eh1::digital::Mock,
        embedded_hal_mock::eh1::digital::Mock,
        embedded_hal_mock::eh1::digital::Mock,
        embedded_hal_mock::eh1::digital::Mock,
    > {
        let spi = FixedBaudrate::new(SpiMock::new(spi_tx));
        let xcs = PinMock::new(xcs_tx);
        let xdcs = PinMock::new(xdcs_tx);
        let dreq = PinMock::new(dreq_tx);
        RegisterInterface::new(BusAdapter::new(spi, xcs, xdcs, dreq, None))
    }

    #[test]
    fn write_register_frames_four_bytes() {
        let mut reg = make(
            &[SpiTx::transaction_start(), SpiTx::write_vec(vec![0x02, 0x0B, 0x00, 0x32]), SpiTx::transaction_end()],
            &[PinTx::set(PinState::Low), PinTx::set(PinState::High)],
            &[PinTx::set(PinState::High)],
            &[PinTx::get(PinState::High)],
        );
        reg.write_register(0x0B, 0x0032).unwrap();
    }

    #[test]
    fn mode_set_preserves_sdinew() {
        let mut reg = make(
            &[
                SpiTx::transaction_start(),
                SpiTx::write_vec(vec![0x03, 0x00]),
                SpiTx::read_vec(vec![0x08, 0x00]),
                SpiTx::transaction_end(),
                SpiTx::transaction_start(),
                SpiTx::write_vec(vec![0x02, 0x00, 0x08, 0x0C]),
                SpiTx::transaction_end(),
            ],
            &[
                PinTx::set(PinState::Low),
                PinTx::set(PinState::High),
                PinTx::set(PinState::Low),
                PinTx::set(PinState::High),
            ],
            &[PinTx::set(PinState::High), PinTx::set(PinState::High)],
            &[PinTx::get(PinState::High), PinTx::get(PinState::High)],
        );
        reg.mode_set(0x0004).unwrap();
    }
}
