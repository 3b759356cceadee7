//! Decoding collaborators: files in, grayscale pixel grids out.
//!
//! Fingerprinting never reads files directly. It goes through an
//! [`ImageDecoder`] for still images and a [`FrameExtractor`] for animated
//! or video sources, so tests (and embedders with their own codecs) can
//! swap either side out.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use image::codecs::gif::GifDecoder;
use image::{AnimationDecoder, DynamicImage};
use thiserror::Error;

use super::PixelGrid;

/// A file could not be turned into a pixel grid.
///
/// Never fatal to a scan: the scanner records it and moves on.
#[derive(Debug, Error)]
#[error("Failed to decode {}: {cause}", path.display())]
pub struct DecodeError {
    /// The file that failed.
    pub path: PathBuf,
    /// Why it failed.
    pub cause: DecodeCause,
}

impl DecodeError {
    /// Attach a path to a cause.
    pub fn new(path: impl Into<PathBuf>, cause: impl Into<DecodeCause>) -> Self {
        Self {
            path: path.into(),
            cause: cause.into(),
        }
    }
}

/// Underlying reason for a [`DecodeError`].
#[derive(Debug, Error)]
pub enum DecodeCause {
    /// Reading the file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The image codec rejected the data.
    #[error("{0}")]
    Image(#[from] image::ImageError),

    /// The requested animation/video frame does not exist.
    #[error("frame {index} is out of range ({available} frames available)")]
    FrameOutOfRange {
        /// Requested frame index.
        index: u32,
        /// Number of frames the source actually has.
        available: u32,
    },

    /// The decoded image has zero width or height.
    #[error("image has no pixels")]
    EmptyImage,

    /// The format is recognised but cannot be decoded by this build.
    #[error("unsupported format: {0}")]
    Unsupported(String),

    /// The video decoder reported an error.
    #[error("video decoding failed: {0}")]
    Video(String),
}

/// Decodes a still image into a pixel grid.
pub trait ImageDecoder: Send + Sync {
    /// Decode the image at `path`.
    fn decode(&self, path: &Path) -> Result<PixelGrid, DecodeError>;
}

/// Pulls a single frame out of an animated image or video.
pub trait FrameExtractor: Send + Sync {
    /// Decode frame number `frame_index` (zero-based) of the file at `path`.
    fn extract_frame(&self, path: &Path, frame_index: u32) -> Result<PixelGrid, DecodeError>;
}

/// [`ImageDecoder`] backed by the `image` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdImageDecoder;

impl ImageDecoder for StdImageDecoder {
    fn decode(&self, path: &Path) -> Result<PixelGrid, DecodeError> {
        let img = image::open(path).map_err(|e| DecodeError::new(path, e))?;
        PixelGrid::from_image(&img).ok_or_else(|| DecodeError::new(path, DecodeCause::EmptyImage))
    }
}

/// [`FrameExtractor`] for GIFs (via `image`) and, with the `video`
/// feature, mp4/webm/mov (via FFmpeg).
#[derive(Debug, Default, Clone, Copy)]
pub struct MediaFrameExtractor;

impl FrameExtractor for MediaFrameExtractor {
    fn extract_frame(&self, path: &Path, frame_index: u32) -> Result<PixelGrid, DecodeError> {
        let is_gif = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("gif"));

        if is_gif {
            gif_frame(path, frame_index)
        } else {
            video_frame(path, frame_index)
        }
    }
}

fn gif_frame(path: &Path, frame_index: u32) -> Result<PixelGrid, DecodeError> {
    let file = File::open(path).map_err(|e| DecodeError::new(path, e))?;
    let decoder = GifDecoder::new(BufReader::new(file)).map_err(|e| DecodeError::new(path, e))?;

    let mut available = 0u32;
    for frame in decoder.into_frames() {
        let frame = frame.map_err(|e| DecodeError::new(path, e))?;
        if available == frame_index {
            let img = DynamicImage::ImageRgba8(frame.into_buffer());
            return PixelGrid::from_image(&img)
                .ok_or_else(|| DecodeError::new(path, DecodeCause::EmptyImage));
        }
        available += 1;
    }

    Err(DecodeError::new(
        path,
        DecodeCause::FrameOutOfRange {
            index: frame_index,
            available,
        },
    ))
}

#[cfg(not(feature = "video"))]
fn video_frame(path: &Path, _frame_index: u32) -> Result<PixelGrid, DecodeError> {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_default();
    Err(DecodeError::new(
        path,
        DecodeCause::Unsupported(format!(
            "{ext} (rebuild with the `video` feature for video support)"
        )),
    ))
}

#[cfg(feature = "video")]
fn video_frame(path: &Path, frame_index: u32) -> Result<PixelGrid, DecodeError> {
    use ffmpeg_next as ffmpeg;

    let fail = |e: ffmpeg::Error| DecodeError::new(path, DecodeCause::Video(e.to_string()));

    ffmpeg::init().map_err(fail)?;
    let mut input = ffmpeg::format::input(&path).map_err(fail)?;

    let stream = input
        .streams()
        .best(ffmpeg::media::Type::Video)
        .ok_or_else(|| DecodeError::new(path, DecodeCause::Video("no video stream".into())))?;
    let stream_index = stream.index();
    let context = ffmpeg::codec::context::Context::from_parameters(stream.parameters())
        .map_err(fail)?;
    let mut decoder = context.decoder().video().map_err(fail)?;

    let mut scaler = ffmpeg::software::scaling::context::Context::get(
        decoder.format(),
        decoder.width(),
        decoder.height(),
        ffmpeg::format::Pixel::GRAY8,
        decoder.width(),
        decoder.height(),
        ffmpeg::software::scaling::flag::Flags::BILINEAR,
    )
    .map_err(fail)?;

    let mut seen = 0u32;
    for (stream, packet) in input.packets() {
        if stream.index() != stream_index {
            continue;
        }
        decoder.send_packet(&packet).map_err(fail)?;
        if let Some(grid) = receive_target(&mut decoder, &mut scaler, frame_index, &mut seen)
            .map_err(fail)?
        {
            return Ok(grid);
        }
    }

    decoder.send_eof().map_err(fail)?;
    if let Some(grid) =
        receive_target(&mut decoder, &mut scaler, frame_index, &mut seen).map_err(fail)?
    {
        return Ok(grid);
    }

    Err(DecodeError::new(
        path,
        DecodeCause::FrameOutOfRange {
            index: frame_index,
            available: seen,
        },
    ))
}

/// Drain decoded frames, converting the one at `target` to grayscale.
#[cfg(feature = "video")]
fn receive_target(
    decoder: &mut ffmpeg_next::decoder::Video,
    scaler: &mut ffmpeg_next::software::scaling::context::Context,
    target: u32,
    seen: &mut u32,
) -> Result<Option<PixelGrid>, ffmpeg_next::Error> {
    use ffmpeg_next::util::frame::video::Video;

    let mut decoded = Video::empty();
    while decoder.receive_frame(&mut decoded).is_ok() {
        if *seen == target {
            let mut gray = Video::empty();
            scaler.run(&decoded, &mut gray)?;

            let (width, height) = (gray.width(), gray.height());
            let stride = gray.stride(0);
            let data = gray.data(0);
            let mut samples = Vec::with_capacity(width as usize * height as usize);
            for row in data.chunks(stride).take(height as usize) {
                samples.extend_from_slice(&row[..width as usize]);
            }
            return Ok(PixelGrid::new(width, height, samples));
        }
        *seen += 1;
    }
    Ok(None)
}
