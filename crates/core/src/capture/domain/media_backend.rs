use crate::capture::domain::stream_selector::StreamDescriptor;
use crate::shared::pixel_format::PixelFormat;
use crate::shared::rational::Rational;
use crate::shared::reader_config::DeviceConfig;
use crate::shared::reader_error::ReaderError;

/// Outcome of polling a demuxer, decoder or filter sink.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pull {
    /// The output buffer now holds a packet or frame.
    Ready,
    /// More input is needed before anything can come out.
    WouldBlock,
    /// Nothing will ever come out again.
    EndOfStream,
}

/// A reusable compressed-packet buffer.
pub trait MediaPacket {
    fn stream_index(&self) -> usize;

    /// Drops the payload so the buffer can be refilled.
    fn discard_payload(&mut self);
}

/// A reusable picture buffer, raw or filtered.
pub trait MediaFrame {
    fn presentation_timestamp(&self) -> Option<i64>;

    fn set_presentation_timestamp(&mut self, timestamp: Option<i64>);

    /// The decoder's own estimate, present even when the container left the
    /// presentation timestamp out.
    fn best_effort_timestamp(&self) -> Option<i64>;

    /// Makes the best-effort estimate the frame's timestamp, if there is one.
    fn adopt_best_effort_timestamp(&mut self) {
        if let Some(ts) = self.best_effort_timestamp() {
            self.set_presentation_timestamp(Some(ts));
        }
    }
}

/// Picture parameters a decoder produces.
#[derive(Clone, Debug, PartialEq)]
pub struct PictureParams {
    pub width: u32,
    pub height: u32,
    /// Native format name, e.g. `bgr0`.
    pub pixel_format: String,
    pub sample_aspect: Rational,
}

/// Parameters of the filter graph's source node.
#[derive(Clone, Debug, PartialEq)]
pub struct SourceParams {
    pub width: u32,
    pub height: u32,
    pub pixel_format: String,
    pub time_base: Rational,
    pub sample_aspect: Rational,
}

impl SourceParams {
    pub fn new(picture: PictureParams, time_base: Rational) -> Self {
        Self {
            width: picture.width,
            height: picture.height,
            pixel_format: picture.pixel_format,
            time_base,
            sample_aspect: picture.sample_aspect.or_unknown(),
        }
    }

    /// Argument string for a `buffer` source filter.
    pub fn buffer_args(&self) -> String {
        format!(
            "video_size={}x{}:pix_fmt={}:time_base={}:pixel_aspect={}",
            self.width, self.height, self.pixel_format, self.time_base, self.sample_aspect
        )
    }
}

/// Parameters a scaler is created from. Fixed for a session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScalerParams {
    pub src_format: PixelFormat,
    pub src_width: u32,
    pub src_height: u32,
    pub dst_format: PixelFormat,
    pub dst_width: u32,
    pub dst_height: u32,
}

/// An opened input exposing its streams and yielding packets in container
/// order.
pub trait DemuxInput {
    type Packet: MediaPacket;

    fn streams(&self) -> Vec<StreamDescriptor>;

    fn read_packet(&mut self, packet: &mut Self::Packet) -> Result<Pull, ReaderError>;
}

/// A per-stream decoding engine.
pub trait FrameDecoder {
    type Packet;
    type Frame;

    fn picture(&self) -> PictureParams;

    /// Feeds one packet. `WouldBlock` means the packet was not taken and
    /// output must be received before it is offered again.
    fn submit(&mut self, packet: &Self::Packet) -> Result<Pull, ReaderError>;

    /// Signals the end of input so buffered frames can be drained.
    fn finish(&mut self) -> Result<(), ReaderError>;

    fn receive(&mut self, frame: &mut Self::Frame) -> Result<Pull, ReaderError>;
}

/// A configured source → stages → sink graph.
pub trait OverlayGraph {
    type Frame;

    /// Injects a frame without taking the caller's reference.
    fn push(&mut self, frame: &Self::Frame) -> Result<(), ReaderError>;

    fn pull(&mut self, frame: &mut Self::Frame) -> Result<Pull, ReaderError>;
}

/// Converts filtered frames into caller memory.
pub trait FrameScaler {
    type Frame;

    /// Writes one plane of `height` rows, `dest_stride` bytes apart.
    fn scale(
        &mut self,
        frame: &Self::Frame,
        dest: &mut [u8],
        dest_stride: usize,
    ) -> Result<(), ReaderError>;
}

/// The engines a capture session is assembled from.
///
/// Every handle is released by dropping it, so a session can be torn down
/// from any partially built state.
pub trait MediaBackend {
    type Packet: MediaPacket;
    type Frame: MediaFrame;
    type Input: DemuxInput<Packet = Self::Packet>;
    type Decoder: FrameDecoder<Packet = Self::Packet, Frame = Self::Frame>;
    type Graph: OverlayGraph<Frame = Self::Frame>;
    type Scaler: FrameScaler<Frame = Self::Frame>;

    /// Process-wide, one-time device registration. Safe to call repeatedly.
    fn register_devices(&self) -> Result<(), ReaderError>;

    fn open_input(&self, device: &DeviceConfig) -> Result<Self::Input, ReaderError>;

    fn open_decoder(
        &self,
        input: &Self::Input,
        stream: &StreamDescriptor,
    ) -> Result<Self::Decoder, ReaderError>;

    fn alloc_frame(&self) -> Result<Self::Frame, ReaderError>;

    fn alloc_packet(&self) -> Result<Self::Packet, ReaderError>;

    fn build_graph(
        &self,
        source: &SourceParams,
        sink_format: PixelFormat,
        description: &str,
    ) -> Result<Self::Graph, ReaderError>;

    fn create_scaler(&self, params: &ScalerParams) -> Result<Self::Scaler, ReaderError>;
}
