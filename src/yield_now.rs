//! Cooperative scheduling point shared by both Streamer deployment shapes.
//!
//! The cooperative deployment needs to hand control back to whatever
//! executor is driving it at each DREQ-wait spin; the strictly-synchronous
//! deployment needs that same call site to be a no-op. Rather than add an
//! executor-specific dependency (embassy, tokio) purely for a zero-delay
//! yield, this is a small hand-rolled `Future`, the same trick
//! `embassy_futures::yield_now`/`tokio::task::yield_now` use internally.

use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll};

/// Suspends the calling task for one poll, then resolves. Lets the streamer
/// loop keep feeding the DREQ spin to a real executor without busy-waiting
/// the CPU.
pub trait Yield {
    fn yield_now(&mut self) -> impl Future<Output = ()>;
}

/// A no-op `Yield` for the strictly-synchronous deployment: driven by a
/// single-poll executor, so there is no scheduler to hand control back to.
#[derive(Default, Clone, Copy)]
pub struct NoYield;

impl Yield for NoYield {
    async fn yield_now(&mut self) {}
}

/// A genuine cooperative yield: returns `Pending` exactly once, waking
/// itself immediately, then resolves on the next poll.
#[derive(Default, Clone, Copy)]
pub struct CooperativeYield;

impl Yield for CooperativeYield {
    fn yield_now(&mut self) -> YieldOnce {
        YieldOnce { polled: false }
    }
}

pub struct YieldOnce {
    polled: bool,
}

impl Future for YieldOnce {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.polled {
            Poll::Ready(())
        } else {
            self.polled = true;
            cx.waker().wake_by_ref();
            Poll::Pending
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;

    #[test]
    fn no_yield_resolves_immediately() {
        block_on(async {
            let mut y = NoYield;
            y.yield_now().await;
        });
    }

    #[test]
    fn cooperative_yield_resolves() {
        block_on(async {
            let mut y = CooperativeYield;
            y.yield_now().await;
            y.yield_now().await;
        });
    }
}
