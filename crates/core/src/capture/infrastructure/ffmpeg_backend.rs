use std::sync::OnceLock;

use ffmpeg_next::format::context::Context;
use ffmpeg_next::format::Format;
use ffmpeg_next::util::frame::video::Video;

use crate::capture::domain::media_backend::{
    MediaBackend, MediaFrame, MediaPacket, ScalerParams, SourceParams,
};
use crate::capture::domain::stream_selector::StreamDescriptor;
use crate::capture::infrastructure::ffmpeg_decoder::FfmpegDecoder;
use crate::capture::infrastructure::ffmpeg_filter_graph::FfmpegFilterGraph;
use crate::capture::infrastructure::ffmpeg_input::FfmpegInput;
use crate::capture::infrastructure::ffmpeg_scaler::FfmpegScaler;
use crate::shared::pixel_format::PixelFormat;
use crate::shared::reader_config::DeviceConfig;
use crate::shared::reader_error::ReaderError;

static LIBAV_READY: OnceLock<Result<(), ffmpeg_next::Error>> = OnceLock::new();

/// Capture engines backed by libavdevice, libavformat, libavcodec,
/// libavfilter and libswscale via ffmpeg-next.
///
/// An empty `backend` in the device config opens `device` as an ordinary
/// URL instead of going through a capture driver.
#[derive(Debug, Default, Clone, Copy)]
pub struct FfmpegBackend;

impl FfmpegBackend {
    pub fn new() -> Self {
        Self
    }
}

impl MediaPacket for ffmpeg_next::Packet {
    fn stream_index(&self) -> usize {
        self.stream()
    }

    fn discard_payload(&mut self) {
        // Safety: the packet owns its payload reference.
        unsafe { ffmpeg_next::ffi::av_packet_unref(self.as_mut_ptr()) };
    }
}

impl MediaFrame for Video {
    fn presentation_timestamp(&self) -> Option<i64> {
        self.pts()
    }

    fn set_presentation_timestamp(&mut self, timestamp: Option<i64>) {
        self.set_pts(timestamp);
    }

    fn best_effort_timestamp(&self) -> Option<i64> {
        self.timestamp()
    }
}

/// Looks up a registered libavdevice video input by its short name.
fn find_capture_format(name: &str) -> Option<Format> {
    // The device iterator ends on a format wrapping a null pointer.
    ffmpeg_next::device::input::video()
        // Safety: only the pointer value is inspected.
        .take_while(|f| matches!(f, Format::Input(i) if unsafe { !i.as_ptr().is_null() }))
        .find(|f| f.name() == name)
}

impl MediaBackend for FfmpegBackend {
    type Packet = ffmpeg_next::Packet;
    type Frame = Video;
    type Input = FfmpegInput;
    type Decoder = FfmpegDecoder;
    type Graph = FfmpegFilterGraph;
    type Scaler = FfmpegScaler;

    fn register_devices(&self) -> Result<(), ReaderError> {
        LIBAV_READY
            .get_or_init(|| {
                ffmpeg_next::init()?;
                ffmpeg_next::device::register_all();
                log::debug!("registered libavdevice input devices");
                Ok(())
            })
            .clone()
            .map_err(|e| ReaderError::DeviceOpen(format!("failed to initialise libav: {e}")))
    }

    fn open_input(&self, device: &DeviceConfig) -> Result<FfmpegInput, ReaderError> {
        let mut options = ffmpeg_next::Dictionary::new();
        for (key, value) in device.options() {
            options.set(&key, &value);
        }

        if device.backend.is_empty() {
            return ffmpeg_next::format::input_with_dictionary(&device.device, options)
                .map(FfmpegInput::new)
                .map_err(|e| ReaderError::DeviceOpen(format!("{}: {e}", device.device)));
        }

        let format = find_capture_format(&device.backend).ok_or_else(|| {
            ReaderError::DeviceOpen(format!("no capture backend named '{}'", device.backend))
        })?;

        match ffmpeg_next::format::open_with(&device.device, &format, options) {
            Ok(Context::Input(ictx)) => Ok(FfmpegInput::new(ictx)),
            Ok(Context::Output(_)) => Err(ReaderError::DeviceOpen(format!(
                "{} opened as an output",
                device.device
            ))),
            Err(e) => Err(ReaderError::DeviceOpen(format!(
                "{} via {}: {e}",
                device.device, device.backend
            ))),
        }
    }

    fn open_decoder(
        &self,
        input: &FfmpegInput,
        stream: &StreamDescriptor,
    ) -> Result<FfmpegDecoder, ReaderError> {
        let parameters = input.stream_parameters(stream.index).ok_or_else(|| {
            ReaderError::CodecSetup(format!("stream {} disappeared", stream.index))
        })?;
        FfmpegDecoder::open(parameters)
    }

    fn alloc_frame(&self) -> Result<Video, ReaderError> {
        let frame = Video::empty();
        // Safety: only the pointer value is inspected.
        if unsafe { frame.as_ptr().is_null() } {
            return Err(ReaderError::Allocation("frame"));
        }
        Ok(frame)
    }

    fn alloc_packet(&self) -> Result<ffmpeg_next::Packet, ReaderError> {
        Ok(ffmpeg_next::Packet::empty())
    }

    fn build_graph(
        &self,
        source: &SourceParams,
        sink_format: PixelFormat,
        description: &str,
    ) -> Result<FfmpegFilterGraph, ReaderError> {
        FfmpegFilterGraph::build(source, sink_format, description)
    }

    fn create_scaler(&self, params: &ScalerParams) -> Result<FfmpegScaler, ReaderError> {
        FfmpegScaler::create(params)
    }
}
