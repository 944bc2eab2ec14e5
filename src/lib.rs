//! Host-side driver for the VS1053b audio codec: an SPI-connected
//! MP3/FLAC/Ogg/WMA decoder and IMA-ADPCM encoder.
//!
//! The crate is generic over `embedded-hal` 1.0 traits so it runs on any
//! microcontroller HAL that implements them; the ESP32 demo binary under
//! the `demo` feature shows one way to wire it up.

pub mod app;
pub mod bus;
pub mod cancel;
pub mod error;
pub mod lifecycle;
pub mod patch;
pub mod recorder;
pub mod registers;
pub mod sci;
pub mod sine;
pub mod source;
pub mod streamer;
pub mod yield_now;

pub use app::{play_dir, play_file, StreamMode};
pub use bus::{BusAdapter, SpiBaudrate};
pub use cancel::{CancelFlag, CancelSource, NeverCancel};
pub use error::{Error, Result};
pub use lifecycle::{ChipLifecycle, I2sRate};
pub use patch::{apply_patch, apply_patch_dir};
pub use recorder::{record, RecordConfig, StopCondition};
pub use sci::RegisterInterface;
pub use sine::sine_test;
pub use source::ByteSource;
pub use streamer::Streamer;
pub use yield_now::{CooperativeYield, NoYield, Yield};
