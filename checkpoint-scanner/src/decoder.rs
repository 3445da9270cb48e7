//! Barcode decoding through an external reader program.

use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use checkpoint_config::DecoderCommandConfig;
use checkpoint_core::frame::{BarcodeDecoder, Binarizer, CropRegion, DecodeFailure};
use image::{GrayImage, ImageFormat};
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Runs the configured reader on a PNG of the cropped frame.
///
/// A clean exit with text on stdout is a decode. An empty stdout is
/// "nothing found"; anything else is a decode error.
#[derive(Debug, Clone)]
pub struct ExternalCommandDecoder {
    config: DecoderCommandConfig,
}

impl ExternalCommandDecoder {
    pub fn new(config: DecoderCommandConfig) -> Self {
        Self { config }
    }

    fn binarizer_args(&self, binarizer: Binarizer) -> &[String] {
        match binarizer {
            Binarizer::Hybrid => &self.config.hybrid_args,
            Binarizer::GlobalHistogram => &self.config.global_histogram_args,
        }
    }

    fn run(&self, image_path: &std::path::Path, binarizer: Binarizer) -> Result<String, DecodeFailure> {
        let mut child = Command::new(&self.config.program)
            .args(&self.config.args)
            .args(self.binarizer_args(binarizer))
            .arg(image_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| {
                DecodeFailure::Error(format!("failed to start {}: {err}", self.config.program))
            })?;

        let timeout = Duration::from_millis(self.config.timeout_ms);
        let status = wait_with_timeout(&mut child, timeout)?;

        let stdout = read_pipe(child.stdout.take());
        let stderr = read_pipe(child.stderr.take());

        let payload = stdout.trim_end_matches(['\r', '\n']);
        if status.success() && !payload.trim().is_empty() {
            return Ok(payload.to_string());
        }
        if payload.trim().is_empty() {
            debug!(code = ?status.code(), "reader found no symbol");
            return Err(DecodeFailure::NotFound);
        }
        Err(DecodeFailure::Error(format!(
            "{} exited with {status}: {}",
            self.config.program,
            stderr.trim()
        )))
    }
}

impl BarcodeDecoder for ExternalCommandDecoder {
    fn decode(
        &mut self,
        luma: &[u8],
        width: u32,
        height: u32,
        crop: CropRegion,
        binarizer: Binarizer,
    ) -> Result<String, DecodeFailure> {
        let cropped = crop_luma(luma, width, height, crop)?;

        let file = tempfile::Builder::new()
            .prefix("checkpoint-frame-")
            .suffix(".png")
            .tempfile()
            .map_err(|err| DecodeFailure::Error(format!("temporary frame file: {err}")))?;
        cropped
            .save_with_format(file.path(), ImageFormat::Png)
            .map_err(|err| DecodeFailure::Error(format!("failed to encode frame: {err}")))?;

        self.run(file.path(), binarizer)
    }
}

/// Copies the crop rectangle out of a row-major luma plane.
pub fn crop_luma(
    luma: &[u8],
    width: u32,
    height: u32,
    crop: CropRegion,
) -> Result<GrayImage, DecodeFailure> {
    let expected = width as usize * height as usize;
    if luma.len() < expected {
        return Err(DecodeFailure::Error(format!(
            "luma plane has {} bytes, expected {expected}",
            luma.len()
        )));
    }
    if crop.left + crop.width > width || crop.top + crop.height > height {
        return Err(DecodeFailure::Error(format!(
            "crop {crop:?} exceeds {width}x{height} frame"
        )));
    }

    let mut pixels = Vec::with_capacity(crop.width as usize * crop.height as usize);
    for row in crop.top..crop.top + crop.height {
        let start = row as usize * width as usize + crop.left as usize;
        pixels.extend_from_slice(&luma[start..start + crop.width as usize]);
    }
    GrayImage::from_raw(crop.width, crop.height, pixels)
        .ok_or_else(|| DecodeFailure::Error("crop buffer size mismatch".to_string()))
}

fn wait_with_timeout(
    child: &mut Child,
    timeout: Duration,
) -> Result<std::process::ExitStatus, DecodeFailure> {
    let started = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) if started.elapsed() >= timeout => {
                if let Err(err) = child.kill() {
                    warn!(error = %err, "failed to kill stalled reader");
                }
                let _ = child.wait();
                return Err(DecodeFailure::Error(format!(
                    "reader timed out after {} ms",
                    timeout.as_millis()
                )));
            }
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(err) => return Err(DecodeFailure::Error(format!("reader wait failed: {err}"))),
        }
    }
}

fn read_pipe(pipe: Option<impl Read>) -> String {
    let mut output = String::new();
    if let Some(mut pipe) = pipe
        && let Err(err) = pipe.read_to_string(&mut output)
    {
        debug!(error = %err, "reader output was not UTF-8");
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crop_copies_the_centre() {
        // 4x3 plane numbered row-major.
        let luma: Vec<u8> = (0..12).collect();
        let crop = CropRegion {
            left: 1,
            top: 1,
            width: 2,
            height: 2,
        };
        let image = crop_luma(&luma, 4, 3, crop).unwrap();
        assert_eq!(image.as_raw(), &vec![5, 6, 9, 10]);
    }

    #[test]
    fn crop_outside_frame_is_an_error() {
        let luma = vec![0u8; 16];
        let crop = CropRegion {
            left: 3,
            top: 0,
            width: 2,
            height: 2,
        };
        assert!(matches!(
            crop_luma(&luma, 4, 4, crop),
            Err(DecodeFailure::Error(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn echo_reader_decodes_and_silent_reader_finds_nothing() {
        let luma = vec![128u8; 64];
        let crop = CropRegion::full(8, 8);

        let mut echo = ExternalCommandDecoder::new(DecoderCommandConfig {
            program: "sh".into(),
            args: vec!["-c".into(), "echo '@DOE@JOHN'".into()],
            hybrid_args: Vec::new(),
            global_histogram_args: Vec::new(),
            timeout_ms: 5_000,
        });
        assert_eq!(
            echo.decode(&luma, 8, 8, crop, Binarizer::Hybrid).unwrap(),
            "@DOE@JOHN"
        );

        let mut silent = ExternalCommandDecoder::new(DecoderCommandConfig {
            program: "sh".into(),
            args: vec!["-c".into(), "exit 1".into()],
            hybrid_args: Vec::new(),
            global_histogram_args: Vec::new(),
            timeout_ms: 5_000,
        });
        assert_eq!(
            silent.decode(&luma, 8, 8, crop, Binarizer::Hybrid),
            Err(DecodeFailure::NotFound)
        );
    }
}
