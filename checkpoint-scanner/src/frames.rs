//! Frame source reading still images dropped into a directory.
//!
//! Stands in for a camera on hosts without one: each new image file becomes
//! one frame, scaled to fit the session resolution and reduced to luma.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use checkpoint_core::frame::{CameraError, CameraSource, Frame, ReleaseHandle, Resolution};
use image::imageops::FilterType;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "gif", "webp"];

/// Frames handed out and not yet released, shared with every release handle.
#[derive(Debug, Default)]
struct Outstanding(AtomicUsize);

pub struct ImageDirectorySource {
    dir: PathBuf,
    poll_interval: Duration,
    max_outstanding: usize,
    max_resolution: Option<Resolution>,
    frames: UnboundedSender<Frame>,
    outstanding: Arc<Outstanding>,
    running: Option<Running>,
}

struct Running {
    stop: Arc<AtomicBool>,
    worker: JoinHandle<()>,
}

impl std::fmt::Debug for ImageDirectorySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageDirectorySource")
            .field("dir", &self.dir)
            .field("poll_interval", &self.poll_interval)
            .field("outstanding", &self.outstanding.0.load(Ordering::Relaxed))
            .field("running", &self.running.is_some())
            .finish()
    }
}

impl ImageDirectorySource {
    pub fn new(
        dir: impl Into<PathBuf>,
        poll_interval: Duration,
    ) -> (Self, UnboundedReceiver<Frame>) {
        let (frames, rx) = mpsc::unbounded_channel();
        (
            Self {
                dir: dir.into(),
                poll_interval,
                max_outstanding: 2,
                max_resolution: None,
                frames,
                outstanding: Arc::new(Outstanding::default()),
                running: None,
            },
            rx,
        )
    }

    /// Refuses sessions above `resolution`, like a camera with a smaller sensor.
    pub fn with_max_resolution(mut self, resolution: Resolution) -> Self {
        self.max_resolution = Some(resolution);
        self
    }

    /// Frames handed out but not yet released.
    pub fn outstanding(&self) -> usize {
        self.outstanding.0.load(Ordering::SeqCst)
    }
}

impl CameraSource for ImageDirectorySource {
    fn start(&mut self, resolution: Resolution) -> Result<(), CameraError> {
        self.stop();

        if let Some(max) = self.max_resolution
            && (resolution.width > max.width || resolution.height > max.height)
        {
            return Err(CameraError::Session {
                resolution,
                reason: format!("source supports at most {max}"),
            });
        }
        if !self.dir.is_dir() {
            return Err(CameraError::Session {
                resolution,
                reason: format!("{} is not a directory", self.dir.display()),
            });
        }

        let stop = Arc::new(AtomicBool::new(false));
        let poller = DirectoryPoller {
            dir: self.dir.clone(),
            resolution,
            poll_interval: self.poll_interval,
            max_outstanding: self.max_outstanding,
            frames: self.frames.clone(),
            outstanding: self.outstanding.clone(),
            stop: stop.clone(),
            seen: HashSet::new(),
        };
        let worker = thread::Builder::new()
            .name("frame-source".into())
            .spawn(move || poller.run())
            .map_err(|err| CameraError::Session {
                resolution,
                reason: format!("failed to spawn frame source: {err}"),
            })?;

        info!(dir = %self.dir.display(), %resolution, "image directory source started");
        self.running = Some(Running { stop, worker });
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(Running { stop, worker }) = self.running.take() {
            stop.store(true, Ordering::SeqCst);
            if worker.join().is_err() {
                warn!("frame source thread panicked");
            }
            debug!("image directory source stopped");
        }
    }
}

impl Drop for ImageDirectorySource {
    fn drop(&mut self) {
        self.stop();
    }
}

struct DirectoryPoller {
    dir: PathBuf,
    resolution: Resolution,
    poll_interval: Duration,
    max_outstanding: usize,
    frames: UnboundedSender<Frame>,
    outstanding: Arc<Outstanding>,
    stop: Arc<AtomicBool>,
    seen: HashSet<PathBuf>,
}

impl DirectoryPoller {
    fn run(mut self) {
        while !self.stop.load(Ordering::SeqCst) {
            if !self.poll_once() {
                return;
            }
            thread::sleep(self.poll_interval);
        }
    }

    /// Emits new images in name order. Returns false once nobody listens.
    fn poll_once(&mut self) -> bool {
        let mut fresh = match list_images(&self.dir) {
            Ok(paths) => paths,
            Err(err) => {
                warn!(dir = %self.dir.display(), error = %err, "failed to list frame directory");
                return true;
            }
        };
        fresh.retain(|path| !self.seen.contains(path));
        fresh.sort();

        for path in fresh {
            // Buffers not returned yet; wait like a camera out of buffers.
            if self.outstanding.0.load(Ordering::SeqCst) >= self.max_outstanding {
                break;
            }
            self.seen.insert(path.clone());
            let Some(frame) = self.load(&path) else {
                continue;
            };
            if self.frames.send(frame).is_err() {
                return false;
            }
        }
        true
    }

    fn load(&self, path: &Path) -> Option<Frame> {
        let image = match image::open(path) {
            Ok(image) => image,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "skipping unreadable image");
                return None;
            }
        };
        let luma = image
            .resize(self.resolution.width, self.resolution.height, FilterType::Triangle)
            .to_luma8();
        let (width, height) = luma.dimensions();

        self.outstanding.0.fetch_add(1, Ordering::SeqCst);
        let outstanding = self.outstanding.clone();
        let release = ReleaseHandle::new(move || {
            outstanding.0.fetch_sub(1, Ordering::SeqCst);
        });
        debug!(path = %path.display(), width, height, "frame captured");
        Some(Frame::new(luma.into_raw(), width, height, Instant::now(), release))
    }
}

fn list_images(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut images = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_image = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        if is_image && path.is_file() {
            images.push(path);
        }
    }
    Ok(images)
}
