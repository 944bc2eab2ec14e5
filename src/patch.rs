//! PatchLoader: parses the VLSI plugin binary format (little-endian 16-bit
//! words, RLE/copy records) and applies it through `ChipLifecycle`'s
//! register interface. Grounded on `original_source/async/vs1053.py`'s
//! `_patch_stream`, and on the commented-out `loadUserCode` in the
//! teacher's `vs1053.rs` (never wired up there).

use std::fs;
use std::io::Read;
use std::path::Path;

use embedded_hal::digital::{InputPin, OutputPin};
use embedded_hal::spi::SpiDevice;

use crate::bus::SpiBaudrate;
use crate::error::{Error, Result};
use crate::lifecycle::ChipLifecycle;

const RLE_FLAG: u16 = 0x8000;
const RLE_COUNT_MASK: u16 = 0x7FFF;

/// Reads one little-endian u16 word. Distinguishes "clean EOF at a word
/// boundary" (`Ok(None)`) from a malformed short read (`Err`), per
/// SPEC_FULL §4.4 — stricter than the original driver, which swallows any
/// short read as EOF.
fn read_word<R: Read>(source: &mut R, at_boundary: bool) -> Result<Option<u16>> {
    let mut buf = [0u8; 2];
    let mut filled = 0;
    loop {
        match source.read(&mut buf[filled..])? {
            0 if filled == 0 && at_boundary => return Ok(None),
            0 => return Err(Error::InvalidPatch),
            n => {
                filled += n;
                if filled == 2 {
                    return Ok(Some(u16::from_le_bytes(buf)));
                }
            }
        }
    }
}

/// Applies one plugin binary's records to the chip via `lifecycle`.
pub fn apply_patch<R, SPI, XCS, XDCS, DREQ, RESET>(
    lifecycle: &mut ChipLifecycle<SPI, XCS, XDCS, DREQ, RESET>,
    source: &mut R,
) -> Result<usize>
where
    R: Read,
    SPI: SpiDevice + SpiBaudrate,
    XCS: OutputPin,
    XDCS: OutputPin,
    DREQ: InputPin,
    RESET: OutputPin,
{
    let mut words_written = 0;
    loop {
        let addr = match read_word(source, true)? {
            None => return Ok(words_written),
            Some(addr) => addr,
        };
        let count_flag = read_word(source, false)?.ok_or(Error::InvalidPatch)?;

        if count_flag & RLE_FLAG != 0 {
            let count = count_flag & RLE_COUNT_MASK;
            let value = read_word(source, false)?.ok_or(Error::InvalidPatch)?;
            for _ in 0..count {
                lifecycle.registers().write_register(addr as u8, value)?;
                words_written += 1;
            }
        } else {
            for _ in 0..count_flag {
                let value = read_word(source, false)?.ok_or(Error::InvalidPatch)?;
                lifecycle.registers().write_register(addr as u8, value)?;
                words_written += 1;
            }
        }
    }
}

/// Applies every file in `dir`, in lexicographic order, as a plugin binary.
/// Returns `Error::NoPatchLocation` if the directory doesn't exist or
/// contains nothing, matching the original driver's behavior for a missing
/// patch location.
pub fn apply_patch_dir<P, SPI, XCS, XDCS, DREQ, RESET>(
    lifecycle: &mut ChipLifecycle<SPI, XCS, XDCS, DREQ, RESET>,
    dir: P,
) -> Result<usize>
where
    P: AsRef<Path>,
    SPI: SpiDevice + SpiBaudrate,
    XCS: OutputPin,
    XDCS: OutputPin,
    DREQ: InputPin,
    RESET: OutputPin,
{
    let mut entries: Vec<_> = fs::read_dir(dir.as_ref())
        .map_err(|_| Error::NoPatchLocation)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .collect();
    entries.sort();
    if entries.is_empty() {
        return Err(Error::NoPatchLocation);
    }

    let mut total = 0;
    for path in entries {
        let mut file = fs::File::open(&path)?;
        total += apply_patch(lifecycle, &mut file)?;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn words_to_le_bytes(words: &[u16]) -> Vec<u8> {
        words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    #[test]
    fn clean_eof_at_record_boundary_is_ok() {
        let mut cursor = Cursor::new(Vec::<u8>::new());
        assert_eq!(read_word(&mut cursor, true).unwrap(), None);
    }

    #[test]
    fn partial_word_is_invalid_patch() {
        let mut cursor = Cursor::new(vec![0x01]);
        assert!(matches!(
            read_word(&mut cursor, true),
            Err(Error::InvalidPatch)
        ));
    }

    #[test]
    fn short_read_mid_record_is_invalid_patch() {
        // address word present but count word missing entirely
        let data = words_to_le_bytes(&[0x0003]);
        let mut cursor = Cursor::new(data);
        let addr = read_word(&mut cursor, true).unwrap();
        assert_eq!(addr, Some(0x0003));
        assert!(matches!(
            read_word(&mut cursor, false),
            Err(Error::InvalidPatch)
        ));
    }

    #[test]
    fn rle_record_parses_as_repeated_word() {
        // addr=0x0003, count=0x8002 (RLE run of 2), value=0x1234, then EOF
        let data = words_to_le_bytes(&[0x0003, 0x8002, 0x1234]);
        let mut cursor = Cursor::new(data);

        let addr = read_word(&mut cursor, true).unwrap().unwrap();
        let count_flag = read_word(&mut cursor, false).unwrap().unwrap();
        assert_eq!(addr, 0x0003);
        assert_eq!(count_flag & RLE_FLAG, RLE_FLAG);
        assert_eq!(count_flag & RLE_COUNT_MASK, 2);
        let value = read_word(&mut cursor, false).unwrap().unwrap();
        assert_eq!(value, 0x1234);
        assert_eq!(read_word(&mut cursor, true).unwrap(), None);
    }
}
