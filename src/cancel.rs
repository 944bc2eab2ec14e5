//! Cancellation handle shared between the two Streamer deployment shapes.
//!
//! The original MicroPython driver has two distinct cancellation stories:
//! the async variant (`async/vs1053.py`) sets a flag observed by the
//! streaming task; the synchronous variant (`synchronous/vs1053_mon_syn.py`)
//! takes a `cancb` callback polled inline. `CancelSource` unifies both
//! behind one trait so the Streamer core only needs to know "is cancel
//! requested right now".

use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Something the Streamer can poll to find out whether cancellation has
/// been requested.
pub trait CancelSource {
    fn is_cancelled(&mut self) -> bool;
}

impl<F> CancelSource for F
where
    F: FnMut() -> bool,
{
    fn is_cancelled(&mut self) -> bool {
        self()
    }
}

/// An atomic cancellation flag for the cooperative/async deployment shape.
///
/// Cloning shares the same underlying flag; `request()` is callable from any
/// task or interrupt context that has a clone.
#[derive(Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl CancelSource for CancelFlag {
    fn is_cancelled(&mut self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A source that never requests cancellation, for callers with nothing to
/// cancel (e.g. `play_dir` driving individual files to natural completion).
pub struct NeverCancel;

impl CancelSource for NeverCancel {
    fn is_cancelled(&mut self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_starts_clear() {
        let mut flag = CancelFlag::new();
        assert!(!flag.is_cancelled());
    }

    #[test]
    fn flag_shares_state_across_clones() {
        let flag = CancelFlag::new();
        let mut other = flag.clone();
        flag.request();
        assert!(other.is_cancelled());
    }

    #[test]
    fn closure_is_a_cancel_source() {
        let mut calls = 0;
        let mut source = || {
            calls += 1;
            calls > 2
        };
        assert!(!source.is_cancelled());
        assert!(!source.is_cancelled());
        assert!(source.is_cancelled());
    }

    #[test]
    fn never_cancel_always_false() {
        let mut never = NeverCancel;
        assert!(!never.is_cancelled());
        assert!(!never.is_cancelled());
    }
}
