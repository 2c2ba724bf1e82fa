use ffmpeg_next::codec::Parameters;
use ffmpeg_next::format::Pixel;
use ffmpeg_next::util::error::EAGAIN;
use ffmpeg_next::util::frame::video::Video;

use crate::capture::domain::media_backend::{FrameDecoder, PictureParams, Pull};
use crate::shared::reader_error::ReaderError;

/// A libavcodec video decoder opened from a stream's parameters.
pub struct FfmpegDecoder {
    decoder: ffmpeg_next::decoder::Video,
}

impl FfmpegDecoder {
    pub(super) fn open(parameters: Parameters) -> Result<Self, ReaderError> {
        let context = ffmpeg_next::codec::context::Context::from_parameters(parameters)
            .map_err(|e| ReaderError::CodecSetup(e.to_string()))?;
        let decoder = context
            .decoder()
            .video()
            .map_err(|e| ReaderError::CodecSetup(e.to_string()))?;
        Ok(Self { decoder })
    }
}

impl FrameDecoder for FfmpegDecoder {
    type Packet = ffmpeg_next::Packet;
    type Frame = Video;

    fn picture(&self) -> PictureParams {
        PictureParams {
            width: self.decoder.width(),
            height: self.decoder.height(),
            pixel_format: pixel_format_name(self.decoder.format()),
            sample_aspect: self.decoder.aspect_ratio().into(),
        }
    }

    fn submit(&mut self, packet: &ffmpeg_next::Packet) -> Result<Pull, ReaderError> {
        match self.decoder.send_packet(packet) {
            Ok(()) => Ok(Pull::Ready),
            Err(ffmpeg_next::Error::Other { errno }) if errno == EAGAIN => Ok(Pull::WouldBlock),
            Err(e) => Err(ReaderError::DecodeSubmit(e.to_string())),
        }
    }

    fn finish(&mut self) -> Result<(), ReaderError> {
        match self.decoder.send_eof() {
            Ok(()) | Err(ffmpeg_next::Error::Eof) => Ok(()),
            Err(e) => Err(ReaderError::DecodeSubmit(e.to_string())),
        }
    }

    fn receive(&mut self, frame: &mut Video) -> Result<Pull, ReaderError> {
        match self.decoder.receive_frame(frame) {
            Ok(()) => Ok(Pull::Ready),
            Err(ffmpeg_next::Error::Other { errno }) if errno == EAGAIN => Ok(Pull::WouldBlock),
            Err(ffmpeg_next::Error::Eof) => Ok(Pull::EndOfStream),
            Err(e) => Err(ReaderError::DecodeReceive(e.to_string())),
        }
    }
}

/// Name libavfilter understands for `format`, or its numeric id when the
/// format has no descriptor.
pub(super) fn pixel_format_name(format: Pixel) -> String {
    format
        .descriptor()
        .map(|d| d.name().to_string())
        .unwrap_or_else(|| (ffmpeg_next::ffi::AVPixelFormat::from(format) as i32).to_string())
}
