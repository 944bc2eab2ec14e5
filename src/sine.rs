//! SineTest: sine-wave diagnostic using the codec's internal test mode.
//! Grounded on `original_source/async/vs1053.py`'s `sine_test`; the
//! teacher has no equivalent (its `test_comm` exercises SCI register
//! round-trips, not the audible self-test).

use std::time::Duration;

use embedded_hal::digital::{InputPin, OutputPin};
use embedded_hal::spi::SpiDevice;

use crate::bus::SpiBaudrate;
use crate::error::Result;
use crate::lifecycle::ChipLifecycle;
use crate::registers::SM_TESTS;

const ENTER_SINE: [u8; 8] = [0x53, 0xEF, 0x6E, 0x00, 0x00, 0x00, 0x00, 0x00];
const EXIT_SINE: [u8; 8] = [0x45, 0x78, 0x69, 0x74, 0x00, 0x00, 0x00, 0x00];

/// Runs the self-test sine wave at the frequency encoded by `freq_byte`
/// (vendor-documented: e.g. 0x63 -> ~517 Hz) for `duration`, then stops it.
pub fn sine_test<SPI, XCS, XDCS, DREQ, RESET>(
    lifecycle: &mut ChipLifecycle<SPI, XCS, XDCS, DREQ, RESET>,
    freq_byte: u8,
    duration: Duration,
) -> Result<()>
where
    SPI: SpiDevice + SpiBaudrate,
    XCS: OutputPin,
    XDCS: OutputPin,
    DREQ: InputPin,
    RESET: OutputPin,
{
    lifecycle.soft_reset()?;
    lifecycle.mode_set(SM_TESTS)?;

    let mut enter = ENTER_SINE;
    enter[2] = freq_byte;
    lifecycle.registers().data_mode_on()?;
    lifecycle.registers().sdi_write(&enter)?;
    lifecycle.registers().data_mode_off()?;

    std::thread::sleep(duration);

    lifecycle.registers().data_mode_on()?;
    lifecycle.registers().sdi_write(&EXIT_SINE)?;
    lifecycle.registers().data_mode_off()?;
    lifecycle.mode_clear(SM_TESTS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enter_command_has_fixed_prefix() {
        assert_eq!(&ENTER_SINE[..3], &[0x53, 0xEF, 0x6E]);
        assert_eq!(&ENTER_SINE[3..], &[0, 0, 0, 0, 0]);
    }

    #[test]
    fn exit_command_is_fixed() {
        assert_eq!(EXIT_SINE, [0x45, 0x78, 0x69, 0x74, 0x00, 0x00, 0x00, 0x00]);
    }
}
