//! Application shims (C8): thin adapters turning a file or a directory of
//! files into `Streamer` calls. Grounded on the teacher's `main.rs`, which
//! drove playback from files on a mounted filesystem, generalized here to
//! not assume any particular HTTP/WiFi/radio-tuner context.

use std::fs;
use std::path::Path;

use embedded_hal::digital::{InputPin, OutputPin};
use embedded_hal::spi::SpiDevice;

use crate::bus::SpiBaudrate;
use crate::cancel::CancelSource;
use crate::error::Result;
use crate::streamer::Streamer;
use crate::yield_now::Yield;

/// Selects which `Streamer` algorithm the shim drives; mirrors the two
/// distinct loop functions in the original driver rather than collapsing
/// them into one generic loop (see DESIGN.md).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamMode {
    Direct,
    Buffered,
}

/// Plays a single file to completion or cancellation.
pub async fn play_file<SPI, XCS, XDCS, DREQ, RESET, C, Y>(
    streamer: &mut Streamer<SPI, XCS, XDCS, DREQ, RESET>,
    path: impl AsRef<Path>,
    mode: StreamMode,
    cancel: C,
    yielder: Y,
) -> Result<()>
where
    SPI: SpiDevice + SpiBaudrate,
    XCS: OutputPin,
    XDCS: OutputPin,
    DREQ: InputPin,
    RESET: OutputPin,
    C: CancelSource,
    Y: Yield,
{
    let file = fs::File::open(path)?;
    match mode {
        StreamMode::Direct => streamer.play_direct(file, cancel, yielder).await,
        StreamMode::Buffered => streamer.play_buffered(file, cancel, yielder).await,
    }
}

/// Plays every file in `dir`, in lexicographic order (mirroring
/// `PatchLoader`'s directory-ordering convention), stopping early on
/// cancellation or a file-level error. Returns the path it stopped at, if
/// any files remained unplayed.
pub async fn play_dir<SPI, XCS, XDCS, DREQ, RESET, C, Y>(
    streamer: &mut Streamer<SPI, XCS, XDCS, DREQ, RESET>,
    dir: impl AsRef<Path>,
    mode: StreamMode,
    mut cancel: C,
    mut yielder: Y,
) -> Result<Option<std::path::PathBuf>>
where
    SPI: SpiDevice + SpiBaudrate,
    XCS: OutputPin,
    XDCS: OutputPin,
    DREQ: InputPin,
    RESET: OutputPin,
    C: CancelSource + Clone,
    Y: Clone + Yield,
{
    let mut entries: Vec<_> = fs::read_dir(dir.as_ref())?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .collect();
    entries.sort();

    for path in entries {
        if cancel.is_cancelled() {
            return Ok(Some(path));
        }
        play_file(streamer, &path, mode, cancel.clone(), yielder.clone()).await?;
    }
    Ok(None)
}
