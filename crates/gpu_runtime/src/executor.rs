use std::future::Future;
use std::pin::pin;
use std::task::{Poll, Waker};
use std::time::Duration;

use crate::context::Context;

/// Interval between device ticks while a future is pending.
pub const TICK_INTERVAL: Duration = Duration::from_micros(500);

/// Drives node futures to completion. GPU completion callbacks only fire
/// while the device is polled, so the executor owns the tick.
pub trait Executor {
    fn block_on<F: Future>(&self, future: F) -> F::Output;

    /// Waits for all submitted GPU work.
    fn drain(&self);
}

impl Executor for Context {
    fn block_on<F: Future>(&self, future: F) -> F::Output {
        let mut future = pin!(future);
        let mut context = std::task::Context::from_waker(Waker::noop());
        loop {
            if let Poll::Ready(output) = future.as_mut().poll(&mut context) {
                return output;
            }
            if let Err(error) = self.device().poll(wgpu::PollType::Poll) {
                log::warn!(target: "WebGPU", "device poll failed: {error}");
            }
            std::thread::sleep(TICK_INTERVAL);
        }
    }

    fn drain(&self) {
        if let Err(error) = self.device().poll(wgpu::PollType::wait_indefinitely()) {
            log::warn!(target: "WebGPU", "device drain failed: {error}");
        }
    }
}

/// Polls `future` with a no-op waker until ready, without touching a
/// device. Futures that never resolve spin forever.
pub fn block_on_local<F: Future>(future: F) -> F::Output {
    let mut future = pin!(future);
    let mut context = std::task::Context::from_waker(Waker::noop());
    loop {
        if let Poll::Ready(output) = future.as_mut().poll(&mut context) {
            return output;
        }
        std::thread::yield_now();
    }
}
