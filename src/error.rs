use thiserror::Error;

/// Crate-wide error type.
///
/// The teacher's `DSPError` never implemented `std::error::Error`, which made
/// its own `?`-into-`anyhow::Result` usage silently rely on a blanket impl
/// that doesn't actually exist for it. This one derives the standard trait
/// so it composes with `?` both inside the crate and in application code
/// that wraps the driver in `anyhow`.
#[derive(Debug, Error)]
pub enum Error {
    #[error("no VS1053 device found (CLOCKF read-back mismatch)")]
    NoDevice,

    #[error("HDAT0/HDAT1 non-zero after end-of-stream flush: hdat0={hdat0:#06x} hdat1={hdat1:#06x}")]
    InvalidHdat { hdat0: u16, hdat1: u16 },

    #[error("malformed plugin patch data")]
    InvalidPatch,

    #[error("no patch location given and no default mount point available")]
    NoPatchLocation,

    #[error("SPI transaction failed")]
    Bus,

    #[error("GPIO operation failed")]
    Pin,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = core::result::Result<T, Error>;
