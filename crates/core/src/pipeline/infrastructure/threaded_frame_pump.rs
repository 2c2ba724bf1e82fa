use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use thiserror::Error;

use crate::capture::domain::frame_reader::FrameReader;
use crate::shared::frame_buffer::FrameBuffer;
use crate::shared::reader_error::ReaderError;
use crate::shared::stream_metadata::StreamMetadata;

pub const DEFAULT_PUMP_CAPACITY: usize = 4;

type FrameResult = Result<FrameBuffer, ReaderError>;

#[derive(Error, Debug, PartialEq)]
pub enum PumpError {
    #[error("no frame within {0:?}")]
    Timeout(Duration),
    #[error("capture worker has stopped")]
    Disconnected,
    #[error(transparent)]
    Reader(#[from] ReaderError),
}

/// Runs a [`FrameReader`] on its own thread and hands out copied frames.
///
/// The reader is built on the worker so engine handles never cross threads.
/// The worker stops after the first error it forwards, including end of
/// stream, and always closes its reader before exiting.
pub struct FramePump {
    frames: Option<Receiver<FrameResult>>,
    cancelled: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    metadata: StreamMetadata,
}

impl FramePump {
    /// Builds and opens a reader on a worker thread. Returns once the open
    /// has succeeded or failed.
    pub fn spawn<R, F>(make_reader: F, capacity: usize) -> Result<Self, ReaderError>
    where
        R: FrameReader + 'static,
        F: FnOnce() -> R + Send + 'static,
    {
        let (opened_tx, opened_rx) = crossbeam_channel::bounded(1);
        let (frame_tx, frame_rx) = crossbeam_channel::bounded(capacity.max(1));
        let cancelled = Arc::new(AtomicBool::new(false));

        let worker_cancelled = Arc::clone(&cancelled);
        let handle = std::thread::spawn(move || {
            let mut reader = make_reader();
            match reader.open() {
                Ok(metadata) => {
                    if opened_tx.send(Ok(metadata.clone())).is_ok() {
                        pump_frames(&mut reader, &metadata, &frame_tx, &worker_cancelled);
                    }
                }
                Err(e) => {
                    let _ = opened_tx.send(Err(e));
                }
            }
            reader.close();
        });

        let opened = opened_rx
            .recv()
            .unwrap_or(Err(ReaderError::InvalidState("capture worker exited during open")));
        match opened {
            Ok(metadata) => Ok(Self {
                frames: Some(frame_rx),
                cancelled,
                handle: Some(handle),
                metadata,
            }),
            Err(e) => {
                join_worker(handle);
                Err(e)
            }
        }
    }

    pub fn metadata(&self) -> &StreamMetadata {
        &self.metadata
    }

    /// Waits at most `timeout` for the next frame.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<FrameBuffer, PumpError> {
        let frames = self.frames.as_ref().ok_or(PumpError::Disconnected)?;
        match frames.recv_timeout(timeout) {
            Ok(result) => Ok(result?),
            Err(RecvTimeoutError::Timeout) => Err(PumpError::Timeout(timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(PumpError::Disconnected),
        }
    }

    pub fn recv(&self) -> Result<FrameBuffer, PumpError> {
        let frames = self.frames.as_ref().ok_or(PumpError::Disconnected)?;
        match frames.recv() {
            Ok(result) => Ok(result?),
            Err(_) => Err(PumpError::Disconnected),
        }
    }

    /// Cancels the worker and waits for it to close its reader.
    pub fn stop(&mut self) {
        self.cancelled.store(true, Ordering::Relaxed);
        // unblocks a worker waiting on a full channel
        self.frames = None;
        if let Some(handle) = self.handle.take() {
            join_worker(handle);
        }
    }
}

impl Drop for FramePump {
    fn drop(&mut self) {
        self.stop();
    }
}

fn pump_frames<R: FrameReader>(
    reader: &mut R,
    metadata: &StreamMetadata,
    frame_tx: &Sender<FrameResult>,
    cancelled: &AtomicBool,
) {
    while !cancelled.load(Ordering::Relaxed) {
        let mut buffer = FrameBuffer::for_stream(metadata);
        let result = reader.read_into(&mut buffer).map(|_| buffer);
        let failed = result.is_err();
        if frame_tx.send(result).is_err() || failed {
            break;
        }
    }
}

fn join_worker(handle: JoinHandle<()>) {
    if handle.join().is_err() {
        log::error!("capture worker panicked");
    }
}
