use thiserror::Error;

use super::types::{Binarizer, CropRegion};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeFailure {
    /// No symbol in the region. Expected on most frames.
    #[error("no barcode found")]
    NotFound,
    #[error("decoder error: {0}")]
    Error(String),
}

/// Black-box 2-D barcode reader.
///
/// Called only from the pipeline's worker thread, one frame at a time.
#[cfg_attr(test, mockall::automock)]
pub trait BarcodeDecoder: Send + 'static {
    fn decode(
        &mut self,
        luma: &[u8],
        width: u32,
        height: u32,
        crop: CropRegion,
        binarizer: Binarizer,
    ) -> Result<String, DecodeFailure>;
}

impl<D: BarcodeDecoder + ?Sized> BarcodeDecoder for Box<D> {
    fn decode(
        &mut self,
        luma: &[u8],
        width: u32,
        height: u32,
        crop: CropRegion,
        binarizer: Binarizer,
    ) -> Result<String, DecodeFailure> {
        (**self).decode(luma, width, height, crop, binarizer)
    }
}
