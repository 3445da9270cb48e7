//! Frame decode pipeline.
//!
//! Frames arrive from the camera on the caller's thread. Admission
//! (gate, spacing, single decode slot) is decided there without blocking;
//! accepted frames are handed to one dedicated worker thread that runs the
//! decoder sequentially and reports back over a tokio channel.

use std::sync::Arc;
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::thread::JoinHandle;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, trace, warn};

use super::decoder::{BarcodeDecoder, DecodeFailure};
use super::throttle::{FrameThrottle, ThrottleDecision};
use super::tier::PipelineProfile;
use super::types::{CropRegion, Frame};
use crate::payload::{self, IdentityRecord};
use crate::validation::ScanGateView;

const WORKER_NAME: &str = "frame-decode";

/// Reported back to the control context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    /// `record` is set when the payload is a complete identity record.
    Decoded {
        raw: String,
        record: Option<IdentityRecord>,
    },
    DecodeFailed { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameRejection {
    Stale,
    DecodeInFlight,
    GateClosed,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameDisposition {
    Accepted,
    Rejected(FrameRejection),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to start decode worker")]
    WorkerSpawn(#[source] std::io::Error),
}

pub struct FramePipeline {
    profile: PipelineProfile,
    throttle: Arc<Mutex<FrameThrottle>>,
    gate: ScanGateView,
    jobs: Option<SyncSender<Frame>>,
    worker: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for FramePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FramePipeline")
            .field("profile", &self.profile)
            .field("running", &self.jobs.is_some())
            .finish()
    }
}

impl FramePipeline {
    pub fn spawn<D: BarcodeDecoder>(
        profile: PipelineProfile,
        decoder: D,
        gate: ScanGateView,
        events: UnboundedSender<PipelineEvent>,
    ) -> Result<Self, PipelineError> {
        let throttle = Arc::new(Mutex::new(FrameThrottle::new(profile.throttle)));
        // One slot: admission never lets a second frame in while one decodes.
        let (jobs, queue) = mpsc::sync_channel::<Frame>(1);

        let worker = DecodeWorker {
            profile: profile.clone(),
            decoder,
            throttle: Arc::clone(&throttle),
            events,
        };
        let handle = std::thread::Builder::new()
            .name(WORKER_NAME.to_string())
            .spawn(move || worker.run(queue))
            .map_err(PipelineError::WorkerSpawn)?;

        debug!(
            tier = ?profile.tier,
            resolution = %profile.resolution,
            throttle_ms = profile.throttle.as_millis() as u64,
            "frame pipeline started"
        );

        Ok(Self {
            profile,
            throttle,
            gate,
            jobs: Some(jobs),
            worker: Some(handle),
        })
    }

    pub fn profile(&self) -> &PipelineProfile {
        &self.profile
    }

    /// Offers one frame. A rejected frame is released before this returns.
    pub fn on_frame(&self, frame: Frame) -> FrameDisposition {
        let Some(jobs) = self.jobs.as_ref() else {
            return reject(frame, FrameRejection::Stopped);
        };
        if self.gate.is_busy() {
            return reject(frame, FrameRejection::GateClosed);
        }

        match self.throttle.lock().admit(frame.captured_at()) {
            ThrottleDecision::Accept => {}
            ThrottleDecision::Stale => return reject(frame, FrameRejection::Stale),
            ThrottleDecision::Busy => return reject(frame, FrameRejection::DecodeInFlight),
        }

        match jobs.try_send(frame) {
            Ok(()) => FrameDisposition::Accepted,
            // The queued frame owns the decode slot and frees it when decoded.
            Err(TrySendError::Full(frame)) => reject(frame, FrameRejection::DecodeInFlight),
            Err(TrySendError::Disconnected(frame)) => {
                self.throttle.lock().finish();
                reject(frame, FrameRejection::Stopped)
            }
        }
    }

    /// Stops accepting frames and joins the worker after its current decode.
    pub fn shutdown(&mut self) {
        self.jobs.take();
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            warn!("frame decode worker panicked");
        }
    }
}

impl Drop for FramePipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn reject(frame: Frame, reason: FrameRejection) -> FrameDisposition {
    trace!(?reason, "frame rejected");
    frame.release();
    FrameDisposition::Rejected(reason)
}

struct DecodeWorker<D> {
    profile: PipelineProfile,
    decoder: D,
    throttle: Arc<Mutex<FrameThrottle>>,
    events: UnboundedSender<PipelineEvent>,
}

impl<D: BarcodeDecoder> DecodeWorker<D> {
    fn run(mut self, queue: mpsc::Receiver<Frame>) {
        while let Ok(frame) = queue.recv() {
            let result = self.decode(&frame);
            frame.release();
            self.throttle.lock().finish();

            let event = match result {
                Ok(raw) => {
                    let record = payload::parse(&raw).ok();
                    debug!(full_record = record.is_some(), "barcode decoded");
                    PipelineEvent::Decoded { raw, record }
                }
                Err(DecodeFailure::NotFound) => continue,
                Err(DecodeFailure::Error(message)) => {
                    warn!(%message, "barcode decode failed");
                    PipelineEvent::DecodeFailed { message }
                }
            };

            if self.events.send(event).is_err() {
                debug!("pipeline event receiver dropped");
            }
        }
        debug!("frame decode worker stopped");
    }

    fn decode(&mut self, frame: &Frame) -> Result<String, DecodeFailure> {
        let crop = CropRegion::for_frame(self.profile.crop, frame.width(), frame.height());
        let first = self.decoder.decode(
            frame.luma(),
            frame.width(),
            frame.height(),
            crop,
            self.profile.binarizer,
        );

        match first {
            Err(_) if self.profile.retry_alternate => self.decoder.decode(
                frame.luma(),
                frame.width(),
                frame.height(),
                crop,
                self.profile.binarizer.alternate(),
            ),
            other => other,
        }
    }
}
