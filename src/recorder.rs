//! Recorder: IMA-ADPCM line/mic recording into a WAV container. Grounded
//! on `original_source/synchronous/vs1053_mon_syn.py`'s `_save`,
//! `_write_patch`, and `record` — the teacher never implemented a
//! recording path at all.

use std::io::{Read, Seek, SeekFrom, Write};
use std::time::{Duration, Instant};

use embedded_hal::digital::{InputPin, OutputPin};
use embedded_hal::spi::SpiDevice;
use log::warn;

use crate::bus::SpiBaudrate;
use crate::error::Result;
use crate::lifecycle::ChipLifecycle;
use crate::registers::{
    DATA_BAUDRATE_HZ, SCI_AICTRL0, SCI_AICTRL1, SCI_AICTRL2, SCI_AICTRL3, SCI_BAUDRATE_HZ,
    SCI_HDAT0, SCI_HDAT1, SCI_MODE, SCI_WRAM, SCI_WRAMADDR, SM_ADPCM, SM_LINE_IN, SM_RESET,
};

/// Built-in IMA-ADPCM encoder patch, loaded at WRAMADDR 0x8010.
const PATCH: &[u16] = &[
    0x3e12, 0xb817, 0x3e14, 0xf812, 0x3e01, 0xb811, 0x0007, 0x9717, 0x0020, 0xffd2, 0x0030, 0x11d1,
    0x3111, 0x8024, 0x3704, 0xc024, 0x3b81, 0x8024, 0x3101, 0x8024, 0x3b81, 0x8024, 0x3f04, 0xc024,
    0x2808, 0x4800, 0x36f1, 0x9811,
];
const PATCH_ADDR: u16 = 0x8010;

/// Second patch block, loaded at WRAMADDR 0x8028.
const PATCH1: &[u16] = &[0x2a00, 0x040e];
const PATCH1_ADDR: u16 = 0x8028;

/// 58-byte WAV template with RIFF/fmt/fact/data chunk sizes zeroed; patched
/// in place once the recorded sample count is known.
const WAV_HEADER_TEMPLATE: [u8; 58] = [
    b'R', b'I', b'F', b'F', 0, 0, 0, 0, b'W', b'A', b'V', b'E', b'f', b'm', b't', b' ', 0x14, 0x00,
    0x00, 0x00, 0x11, 0x00, 0x02, 0x00, 0x40, 0x1f, 0x00, 0x00, 0xae, 0x1f, 0x00, 0x00, 0x00, 0x02,
    0x04, 0x00, 0x02, 0x00, 0xf9, 0x01, b'f', b'a', b'c', b't', 0x04, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, b'd', b'a', b't', b'a', 0x00, 0x00, 0x00, 0x00,
];

/// Overrun (max HDAT1 sample count seen between drain cycles) above which
/// we log a warning: high values mean the host is close to losing samples.
const OVERRUN_WARN_THRESHOLD: u16 = 768;

/// Linearizes a dB gain into the AICTRLn register scale. `None` means "use
/// automatic gain control" and encodes as 0.
fn from_db(db: Option<f32>) -> u16 {
    match db {
        None => 0,
        Some(db) => {
            let raw = (1024.0 * 10f32.powf(db / 20.0)).round();
            raw.clamp(1.0, 65535.0) as u16
        }
    }
}

pub struct RecordConfig {
    pub line_in: bool,
    pub sample_rate: u16,
    pub agc_gain_db: Option<f32>,
    pub gain_db: Option<f32>,
    pub stereo: bool,
}

impl Default for RecordConfig {
    fn default() -> Self {
        Self {
            line_in: true,
            sample_rate: 8000,
            agc_gain_db: None,
            gain_db: None,
            stereo: true,
        }
    }
}

/// What should stop an in-progress recording: either a duration budget or
/// an application-supplied predicate (mirrors the original driver's
/// `stop` parameter, which accepts either a callable or a millisecond
/// count).
pub enum StopCondition<'a> {
    After(Duration),
    Predicate(&'a mut dyn FnMut() -> bool),
}

pub fn record<W, SPI, XCS, XDCS, DREQ, RESET>(
    lifecycle: &mut ChipLifecycle<SPI, XCS, XDCS, DREQ, RESET>,
    out: &mut W,
    config: &RecordConfig,
    mut stop: StopCondition<'_>,
) -> Result<u16>
where
    W: Write + Seek,
    SPI: SpiDevice + SpiBaudrate,
    XCS: OutputPin,
    XDCS: OutputPin,
    DREQ: InputPin,
    RESET: OutputPin,
{
    out.write_all(&WAV_HEADER_TEMPLATE)?;

    let old_mode = lifecycle.read_mode()?;
    let mut new_mode = old_mode | SM_RESET | SM_ADPCM;
    if config.line_in {
        new_mode |= SM_LINE_IN;
    }
    lifecycle.registers().write_register(SCI_MODE, new_mode)?;

    lifecycle
        .registers()
        .write_register(SCI_AICTRL0, config.sample_rate)?;
    lifecycle
        .registers()
        .write_register(SCI_AICTRL1, from_db(config.gain_db))?;
    lifecycle
        .registers()
        .write_register(SCI_AICTRL2, from_db(config.agc_gain_db))?;
    lifecycle
        .registers()
        .write_register(SCI_AICTRL3, if config.stereo { 0 } else { 2 })?;

    write_encoder_patch(lifecycle)?;

    let mut nsamples: u64 = 0;
    let mut overrun: u16 = 0;
    let deadline = match &stop {
        StopCondition::After(d) => Some(Instant::now() + *d),
        StopCondition::Predicate(_) => None,
    };

    loop {
        let should_stop = match (&mut stop, deadline) {
            (StopCondition::Predicate(pred), _) => pred(),
            (StopCondition::After(_), Some(deadline)) => Instant::now() >= deadline,
            (StopCondition::After(_), None) => unreachable!(),
        };
        if should_stop {
            break;
        }
        let (n, high_water) = drain_samples(lifecycle, out)?;
        nsamples += n as u64;
        overrun = overrun.max(high_water);
    }

    if overrun > OVERRUN_WARN_THRESHOLD {
        warn!("recording overrun high-water mark {overrun} exceeds warn threshold");
    }

    patch_wav_header(out, nsamples, config)?;
    Ok(overrun)
}

/// Drains every sample currently queued in SCI_HDAT1, returning the count
/// drained and that count itself as the overrun high-water mark for this
/// call (original driver's `_save`).
///
/// Each sample read is a raw SCI transfer, not a framed `read_register`
/// call, so XCS must be asserted/deasserted by hand around every one of
/// them (mirrors `_save`'s `self._xcs(0)`/`self._xcs(1)` pair), and the bus
/// must first be dropped to the post-boost SCI rate — `write_encoder_patch`
/// left it at `DATA_BAUDRATE_HZ`, too fast for an SCI read — then restored
/// afterward so SDI streaming elsewhere isn't left running at the slow
/// rate.
fn drain_samples<W, SPI, XCS, XDCS, DREQ, RESET>(
    lifecycle: &mut ChipLifecycle<SPI, XCS, XDCS, DREQ, RESET>,
    out: &mut W,
) -> Result<(u16, u16)>
where
    W: Write,
    SPI: SpiDevice + SpiBaudrate,
    XCS: OutputPin,
    XDCS: OutputPin,
    DREQ: InputPin,
    RESET: OutputPin,
{
    let n = lifecycle.registers().read_register(SCI_HDAT1)?;
    if n > 0 {
        lifecycle.registers().bus().set_baudrate(SCI_BAUDRATE_HZ);
        for _ in 0..n {
            let mut rbuf = [0u8; 4];
            lifecycle.registers().bus().assert_xcs()?;
            let result = lifecycle
                .registers()
                .bus()
                .transfer(&[0x03, SCI_HDAT0, 0xFF, 0xFF], &mut rbuf);
            lifecycle.registers().bus().deassert_xcs()?;
            result?;
            out.write_all(&rbuf[2..])?;
        }
        lifecycle.registers().bus().set_baudrate(DATA_BAUDRATE_HZ);
    }
    Ok((n, n))
}

fn write_encoder_patch<SPI, XCS, XDCS, DREQ, RESET>(
    lifecycle: &mut ChipLifecycle<SPI, XCS, XDCS, DREQ, RESET>,
) -> Result<()>
where
    SPI: SpiDevice + SpiBaudrate,
    XCS: OutputPin,
    XDCS: OutputPin,
    DREQ: InputPin,
    RESET: OutputPin,
{
    lifecycle.registers().write_register(SCI_WRAMADDR, PATCH_ADDR)?;
    for &word in PATCH {
        lifecycle.registers().write_register(SCI_WRAM, word)?;
    }
    lifecycle.registers().write_register(SCI_WRAMADDR, PATCH1_ADDR)?;
    for &word in PATCH1 {
        lifecycle.registers().write_register(SCI_WRAM, word)?;
    }
    Ok(())
}

/// Patches the size fields of the WAV header in place once the final
/// sample count is known. A block is 256 samples (stereo) or 128 (mono).
fn patch_wav_header<W: Write + Seek>(out: &mut W, nsamples: u64, config: &RecordConfig) -> Result<()> {
    let channels: u64 = if config.stereo { 2 } else { 1 };
    let samples_per_block: u64 = if config.stereo { 256 } else { 128 };
    let nblocks = nsamples / samples_per_block;

    let chunk_size = (nblocks * 256 * channels + 52) as u32;
    let byte_rate = ((config.sample_rate as u64) * 256 * channels / 505) as u32;
    let num_samples = (nblocks * 505) as u32;
    let data_size = (nblocks * 256 * channels) as u32;

    out.seek(SeekFrom::Start(4))?;
    out.write_all(&chunk_size.to_le_bytes())?;

    if !config.stereo {
        out.seek(SeekFrom::Start(22))?;
        out.write_all(&[0x01])?;
        out.seek(SeekFrom::Start(33))?;
        out.write_all(&[0x01])?;
    }

    out.seek(SeekFrom::Start(24))?;
    out.write_all(&(config.sample_rate as u32).to_le_bytes())?;

    out.seek(SeekFrom::Start(28))?;
    out.write_all(&byte_rate.to_le_bytes())?;

    out.seek(SeekFrom::Start(48))?;
    out.write_all(&num_samples.to_le_bytes())?;

    out.seek(SeekFrom::Start(56))?;
    out.write_all(&data_size.to_le_bytes())?;

    out.seek(SeekFrom::End(0))?;
    Ok(())
}

/// Re-reads a previously written WAV header back, for testing purposes
/// and for application code verifying an already-closed recording.
pub fn read_wav_header<R: Read>(input: &mut R) -> Result<[u8; 58]> {
    let mut buf = [0u8; 58];
    input.read_exact(&mut buf)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn from_db_none_is_zero_agc() {
        assert_eq!(from_db(None), 0);
    }

    #[test]
    fn from_db_clamps_to_nonzero_minimum() {
        assert_eq!(from_db(Some(-1000.0)), 1);
    }

    #[test]
    fn from_db_zero_db_is_1024() {
        assert_eq!(from_db(Some(0.0)), 1024);
    }

    #[test]
    fn patch_wav_header_stereo_math() {
        let mut buf = Cursor::new(WAV_HEADER_TEMPLATE.to_vec());
        let config = RecordConfig {
            stereo: true,
            sample_rate: 8000,
            ..Default::default()
        };
        // 256 samples/block * 10 blocks = 2560 samples
        patch_wav_header(&mut buf, 2560, &config).unwrap();
        let bytes = buf.into_inner();
        let chunk_size = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
        let byte_rate = u32::from_le_bytes(bytes[28..32].try_into().unwrap());
        let num_samples = u32::from_le_bytes(bytes[48..52].try_into().unwrap());
        let data_size = u32::from_le_bytes(bytes[56..60].try_into().unwrap());
        assert_eq!(chunk_size, 10 * 256 * 2 + 52);
        assert_eq!(byte_rate, (8000u64 * 256 * 2 / 505) as u32);
        assert_eq!(num_samples, 10 * 505);
        assert_eq!(data_size, 10 * 256 * 2);
    }

    #[test]
    fn patch_wav_header_mono_sets_mono_bytes() {
        let mut buf = Cursor::new(WAV_HEADER_TEMPLATE.to_vec());
        let config = RecordConfig {
            stereo: false,
            sample_rate: 8000,
            ..Default::default()
        };
        patch_wav_header(&mut buf, 1280, &config).unwrap();
        let bytes = buf.into_inner();
        assert_eq!(bytes[22], 0x01);
        assert_eq!(bytes[33], 0x01);
    }

    #[test]
    fn patch_constants_are_nonempty() {
        assert_eq!(PATCH.len(), 28);
        assert_eq!(PATCH1.len(), 2);
    }
}
