//! Futures over the two GPU completion callbacks nodes wait on.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use crossbeam_channel::{Receiver, TryRecvError, bounded};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GpuTaskError {
    /// The callback was dropped without firing, usually on device loss.
    CallbackDropped,
    Map(String),
}

impl fmt::Display for GpuTaskError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GpuTaskError::CallbackDropped => {
                write!(formatter, "GPU callback dropped before completion")
            }
            GpuTaskError::Map(message) => write!(formatter, "failed to map buffer: {message}"),
        }
    }
}

impl std::error::Error for GpuTaskError {}

/// Resolves once all work submitted to the queue before creation has
/// finished.
pub struct SubmittedWork {
    receiver: Receiver<()>,
}

impl SubmittedWork {
    pub fn new(queue: &wgpu::Queue) -> Self {
        let (sender, receiver) = bounded(1);
        queue.on_submitted_work_done(move || {
            let _ = sender.send(());
        });
        Self { receiver }
    }
}

impl Future for SubmittedWork {
    type Output = Result<(), GpuTaskError>;

    fn poll(self: Pin<&mut Self>, _context: &mut Context<'_>) -> Poll<Self::Output> {
        match self.receiver.try_recv() {
            Ok(()) => Poll::Ready(Ok(())),
            Err(TryRecvError::Empty) => Poll::Pending,
            Err(TryRecvError::Disconnected) => Poll::Ready(Err(GpuTaskError::CallbackDropped)),
        }
    }
}

/// Maps a `MAP_READ` buffer and resolves to a copy of its contents. The
/// buffer is unmapped afterwards.
pub struct BufferRead {
    buffer: wgpu::Buffer,
    receiver: Receiver<Result<(), wgpu::BufferAsyncError>>,
}

impl BufferRead {
    pub fn new(buffer: wgpu::Buffer) -> Self {
        let (sender, receiver) = bounded(1);
        buffer
            .slice(..)
            .map_async(wgpu::MapMode::Read, move |result| {
                let _ = sender.send(result);
            });
        Self { buffer, receiver }
    }
}

impl Future for BufferRead {
    type Output = Result<Vec<u8>, GpuTaskError>;

    fn poll(self: Pin<&mut Self>, _context: &mut Context<'_>) -> Poll<Self::Output> {
        match self.receiver.try_recv() {
            Ok(Ok(())) => {
                let mapped = self.buffer.slice(..).get_mapped_range();
                let bytes = mapped.to_vec();
                drop(mapped);
                self.buffer.unmap();
                Poll::Ready(Ok(bytes))
            }
            Ok(Err(error)) => Poll::Ready(Err(GpuTaskError::Map(error.to_string()))),
            Err(TryRecvError::Empty) => Poll::Pending,
            Err(TryRecvError::Disconnected) => Poll::Ready(Err(GpuTaskError::CallbackDropped)),
        }
    }
}
