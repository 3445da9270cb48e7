use std::fmt;
use std::time::Instant;

/// Runs the camera's buffer-return callback exactly once.
///
/// Dropping the handle releases; [`ReleaseHandle::release`] does the same
/// eagerly. The callback can never run twice.
pub struct ReleaseHandle {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl ReleaseHandle {
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// Handle for buffers the pipeline owns outright.
    pub fn detached() -> Self {
        Self { release: None }
    }

    pub fn release(mut self) {
        self.run();
    }

    fn run(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for ReleaseHandle {
    fn drop(&mut self) {
        self.run();
    }
}

impl fmt::Debug for ReleaseHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReleaseHandle")
            .field("pending", &self.release.is_some())
            .finish()
    }
}

/// Single camera frame: 8-bit luma plane plus the handle returning its buffer.
#[derive(Debug)]
pub struct Frame {
    luma: Vec<u8>,
    width: u32,
    height: u32,
    captured_at: Instant,
    release: ReleaseHandle,
}

impl Frame {
    pub fn new(
        luma: Vec<u8>,
        width: u32,
        height: u32,
        captured_at: Instant,
        release: ReleaseHandle,
    ) -> Self {
        Self {
            luma,
            width,
            height,
            captured_at,
            release,
        }
    }

    pub fn luma(&self) -> &[u8] {
        &self.luma
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }

    /// Returns the buffer to the camera now instead of at drop.
    pub fn release(self) {
        self.release.release();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const STANDARD: Resolution = Resolution::new(1280, 720);
    pub const LOW_END: Resolution = Resolution::new(640, 480);
    pub const MINIMAL: Resolution = Resolution::new(480, 360);

    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Centered share of the frame handed to the decoder, in `(0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropFraction {
    pub width: f32,
    pub height: f32,
}

impl CropFraction {
    pub const FULL: CropFraction = CropFraction {
        width: 1.0,
        height: 1.0,
    };
    pub const CENTRAL: CropFraction = CropFraction {
        width: 0.8,
        height: 0.6,
    };
}

/// Pixel rectangle within a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRegion {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRegion {
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            left: 0,
            top: 0,
            width,
            height,
        }
    }

    pub fn for_frame(fraction: CropFraction, width: u32, height: u32) -> Self {
        let scale = |extent: u32, share: f32| -> u32 {
            let share = share.clamp(0.0, 1.0);
            ((extent as f32 * share).round() as u32).clamp(1.min(extent), extent)
        };
        let crop_width = scale(width, fraction.width);
        let crop_height = scale(height, fraction.height);
        Self {
            left: (width - crop_width) / 2,
            top: (height - crop_height) / 2,
            width: crop_width,
            height: crop_height,
        }
    }

    pub fn is_full(&self, width: u32, height: u32) -> bool {
        *self == Self::full(width, height)
    }
}

/// Thresholding strategy the decoder applies before symbol detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Binarizer {
    #[default]
    Hybrid,
    GlobalHistogram,
}

impl Binarizer {
    pub fn alternate(self) -> Self {
        match self {
            Binarizer::Hybrid => Binarizer::GlobalHistogram,
            Binarizer::GlobalHistogram => Binarizer::Hybrid,
        }
    }
}
