//! SCI register addresses, XRAM addresses, and SCI_MODE bit numbers.
//!
//! Bit-exact against the VLSI datasheet and cross-checked against both the
//! teacher's `vs1053.rs` constants and the MicroPython reference driver's
//! `async/vs1053.py` mode-bit table.

/// SCI register addresses.
pub const SCI_MODE: u8 = 0x00;
pub const SCI_STATUS: u8 = 0x01;
pub const SCI_BASS: u8 = 0x02;
pub const SCI_CLOCKF: u8 = 0x03;
pub const SCI_DECODE_TIME: u8 = 0x04;
pub const SCI_AUDATA: u8 = 0x05;
pub const SCI_WRAM: u8 = 0x06;
pub const SCI_WRAMADDR: u8 = 0x07;
pub const SCI_HDAT0: u8 = 0x08;
pub const SCI_HDAT1: u8 = 0x09;
pub const SCI_AIADDR: u8 = 0x0A;
pub const SCI_VOL: u8 = 0x0B;
pub const SCI_AICTRL0: u8 = 0x0C;
pub const SCI_AICTRL1: u8 = 0x0D;
pub const SCI_AICTRL2: u8 = 0x0E;
pub const SCI_AICTRL3: u8 = 0x0F;
pub const SCI_NUM_REGISTERS: u8 = 0x0F;

/// SCI_MODE bits (public, vendor-documented behavior switches).
pub const SM_DIFF: u16 = 0x0001;
pub const SM_LAYER12: u16 = 0x0002;
pub const SM_EARSPEAKER_LO: u16 = 0x0010;
pub const SM_EARSPEAKER_HI: u16 = 0x0080;
pub const SM_LINE_IN: u16 = 0x4000;

/// SCI_MODE bits (internal to the protocol implemented here).
pub const SM_RESET: u16 = 0x0004;
pub const SM_CANCEL: u16 = 0x0008;
pub const SM_TESTS: u16 = 0x0020;
pub const SM_SDINEW: u16 = 0x0800;
pub const SM_ADPCM: u16 = 0x1000;

/// XRAM addresses, accessed indirectly via SCI_WRAMADDR/SCI_WRAM.
pub const XRAM_BYTE_RATE: u16 = 0x1E05;
pub const XRAM_END_FILL_BYTE: u16 = 0x1E06;
pub const XRAM_IO_DIRECTION: u16 = 0xC017;
pub const XRAM_IO_READ: u16 = 0xC018;
pub const XRAM_IO_WRITE: u16 = 0xC019;
pub const XRAM_I2S_CONFIG: u16 = 0xC040;

/// SPI baudrates. Writes to SCI_CLOCKF must happen at `INITIAL_HZ`; all other
/// SCI traffic after the clock boost uses `SCI_HZ`; all SDI traffic uses
/// `DATA_HZ`.
pub const INITIAL_BAUDRATE_HZ: u32 = 1_000_000;
pub const SCI_BAUDRATE_HZ: u32 = 5_000_000;
pub const DATA_BAUDRATE_HZ: u32 = 10_752_000;

/// CLOCKF value written during soft reset: xtal multiplier 3.5 plus a fixed
/// +1 allowance, matching both the original driver and the vendor datasheet.
pub const CLOCKF_BOOST: u16 = 0x8800;

/// Size of one SDI burst.
pub const CHUNK_SIZE: usize = 32;

/// Buffered streamer ring size and mask (power of two).
pub const RING_BUF_SIZE: usize = 2048;
pub const RING_BUF_MASK: usize = RING_BUF_SIZE - 1;
