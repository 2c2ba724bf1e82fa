use std::collections::VecDeque;
use std::sync::Arc;

use crate::capture::domain::media_backend::{
    DemuxInput, FrameDecoder, FrameScaler, MediaBackend, MediaFrame, MediaPacket, PictureParams,
    Pull, ScalerParams, SourceParams,
};
use crate::capture::domain::stream_selector::{MediaKind, StreamDescriptor};
use crate::capture::infrastructure::resource_ledger::{ResourceGuard, ResourceKind, ResourceLedger};
use crate::capture::infrastructure::synthetic_graph::SyntheticGraph;
use crate::capture::infrastructure::yuv;
use crate::shared::pixel_format::PixelFormat;
use crate::shared::rational::Rational;
use crate::shared::reader_config::DeviceConfig;
use crate::shared::reader_error::ReaderError;

/// Backend name that selects the synthetic device.
pub const SYNTHETIC_BACKEND_NAME: &str = "synthetic";

const MICROSECOND_TIME_BASE: Rational = Rational::new(1, 1_000_000);

#[derive(Clone, Debug, PartialEq)]
pub struct SyntheticStream {
    pub kind: MediaKind,
    pub decodable: bool,
    pub width: u32,
    pub height: u32,
    pub time_base: Rational,
}

impl SyntheticStream {
    pub fn video(width: u32, height: u32) -> Self {
        Self {
            kind: MediaKind::Video,
            decodable: true,
            width,
            height,
            time_base: MICROSECOND_TIME_BASE,
        }
    }

    pub fn audio() -> Self {
        Self {
            kind: MediaKind::Audio,
            decodable: true,
            width: 0,
            height: 0,
            time_base: Rational::new(1, 48_000),
        }
    }
}

/// Failures the synthetic engines can be told to produce.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SyntheticFaults {
    pub device_open: bool,
    pub packet_alloc: bool,
    pub scaler_init: bool,
    /// The graph rejects every pushed frame.
    pub reject_push: bool,
    /// Video frame whose packets arrive empty.
    pub corrupt_frame: Option<usize>,
    /// Packet number at which the demuxer reports an I/O error once.
    pub demux_error_at: Option<usize>,
    /// Times the demuxer reports "try again" before every packet.
    pub stalled_reads: usize,
    /// The graph reports end of stream after this many frames.
    pub graph_end_after: Option<usize>,
}

/// Describes what the synthetic device produces.
#[derive(Clone, Debug, PartialEq)]
pub struct SyntheticSource {
    pub streams: Vec<SyntheticStream>,
    /// Video frames before the input runs dry. `None` never ends.
    pub frame_count: Option<usize>,
    /// Packets the decoder needs before it emits a frame.
    pub packets_per_frame: usize,
    /// Frames the decoder holds back until later input or end of input
    /// pushes them out.
    pub decoder_delay: usize,
    /// Timestamp step between frames, in video time-base units.
    pub frame_duration: i64,
    /// Native decoder output format.
    pub pixel_format: PixelFormat,
    pub faults: SyntheticFaults,
}

impl SyntheticSource {
    /// An endless single-stream camera with a microsecond time-base.
    pub fn camera(width: u32, height: u32, frame_rate: f64) -> Self {
        Self {
            streams: vec![SyntheticStream::video(width, height)],
            frame_count: None,
            packets_per_frame: 1,
            decoder_delay: 0,
            frame_duration: (1_000_000.0 / frame_rate).round() as i64,
            pixel_format: PixelFormat::Bgr0,
            faults: SyntheticFaults::default(),
        }
    }

    /// A camera matching the size, rate and format a device config asks for.
    pub fn from_device(device: &DeviceConfig) -> Result<Self, ReaderError> {
        let (width, height) = device.video_dimensions().ok_or_else(|| {
            ReaderError::Config(format!("invalid video size '{}'", device.video_size))
        })?;
        let frame_rate: f64 = device
            .frame_rate
            .trim()
            .parse()
            .ok()
            .filter(|&r: &f64| r > 0.0)
            .ok_or_else(|| {
                ReaderError::Config(format!("invalid frame rate '{}'", device.frame_rate))
            })?;
        let mut source = Self::camera(width, height, frame_rate);
        if !device.pixel_format.is_empty() {
            source.pixel_format = device
                .pixel_format
                .parse()
                .map_err(|e: crate::shared::pixel_format::UnknownPixelFormat| {
                    ReaderError::Config(e.to_string())
                })?;
        }
        Ok(source)
    }

    pub fn with_frame_count(mut self, frame_count: usize) -> Self {
        self.frame_count = Some(frame_count);
        self
    }

    pub fn with_streams(mut self, streams: Vec<SyntheticStream>) -> Self {
        self.streams = streams;
        self
    }

    pub fn with_packets_per_frame(mut self, packets: usize) -> Self {
        self.packets_per_frame = packets.max(1);
        self
    }

    pub fn with_decoder_delay(mut self, frames: usize) -> Self {
        self.decoder_delay = frames;
        self
    }

    pub fn with_faults(mut self, faults: SyntheticFaults) -> Self {
        self.faults = faults;
        self
    }

    fn video_index(&self) -> Option<usize> {
        self.streams
            .iter()
            .position(|s| s.kind == MediaKind::Video && s.decodable)
    }
}

/// In-process engines that behave like a live camera, for tests and demos.
///
/// Every handle they hand out is tracked in a [`ResourceLedger`].
pub struct SyntheticBackend {
    source: SyntheticSource,
    ledger: Arc<ResourceLedger>,
}

impl SyntheticBackend {
    pub fn new(source: SyntheticSource) -> Self {
        Self::with_ledger(source, ResourceLedger::new())
    }

    pub fn with_ledger(source: SyntheticSource, ledger: Arc<ResourceLedger>) -> Self {
        Self { source, ledger }
    }

    pub fn ledger(&self) -> &Arc<ResourceLedger> {
        &self.ledger
    }
}

#[derive(Debug)]
pub struct SyntheticPacket {
    stream_index: usize,
    pts: Option<i64>,
    payload: Vec<u8>,
    _guard: ResourceGuard,
}

impl MediaPacket for SyntheticPacket {
    fn stream_index(&self) -> usize {
        self.stream_index
    }

    fn discard_payload(&mut self) {
        self.stream_index = 0;
        self.pts = None;
        self.payload.clear();
    }
}

#[derive(Debug)]
pub struct SyntheticFrame {
    pub(super) data: Vec<u8>,
    pub(super) format: Option<PixelFormat>,
    pub(super) width: u32,
    pub(super) height: u32,
    pub(super) pts: Option<i64>,
    pub(super) best_effort: Option<i64>,
    pub(super) _guard: ResourceGuard,
}

impl SyntheticFrame {
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn format(&self) -> Option<PixelFormat> {
        self.format
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

impl MediaFrame for SyntheticFrame {
    fn presentation_timestamp(&self) -> Option<i64> {
        self.pts
    }

    fn set_presentation_timestamp(&mut self, timestamp: Option<i64>) {
        self.pts = timestamp;
    }

    fn best_effort_timestamp(&self) -> Option<i64> {
        self.best_effort
    }
}

pub struct SyntheticInput {
    source: SyntheticSource,
    video_index: Option<usize>,
    other_indices: Vec<usize>,
    next_packet: usize,
    stalls: usize,
    _guard: ResourceGuard,
}

impl DemuxInput for SyntheticInput {
    type Packet = SyntheticPacket;

    fn streams(&self) -> Vec<StreamDescriptor> {
        self.source
            .streams
            .iter()
            .enumerate()
            .map(|(index, s)| StreamDescriptor {
                index,
                kind: s.kind,
                codec: if s.kind == MediaKind::Video {
                    "rawvideo".to_string()
                } else {
                    "pcm_s16le".to_string()
                },
                decodable: s.decodable,
                width: s.width,
                height: s.height,
                time_base: s.time_base,
            })
            .collect()
    }

    /// Emits one packet per non-video stream followed by the video packets
    /// of each frame.
    fn read_packet(&mut self, packet: &mut SyntheticPacket) -> Result<Pull, ReaderError> {
        if self.stalls < self.source.faults.stalled_reads {
            self.stalls += 1;
            return Ok(Pull::WouldBlock);
        }
        self.stalls = 0;

        let number = self.next_packet;
        if self.source.faults.demux_error_at == Some(number) {
            self.next_packet += 1;
            return Err(ReaderError::Demux("synthetic read failure".to_string()));
        }

        let video_packets = if self.video_index.is_some() {
            self.source.packets_per_frame.max(1)
        } else {
            0
        };
        let per_frame = self.other_indices.len() + video_packets;
        if per_frame == 0 {
            return Ok(Pull::EndOfStream);
        }

        let frame = number / per_frame;
        if self.source.frame_count.is_some_and(|n| frame >= n) {
            return Ok(Pull::EndOfStream);
        }
        self.next_packet += 1;

        let slot = number % per_frame;
        packet.pts = Some(frame as i64 * self.source.frame_duration);
        packet.payload.clear();
        match (self.other_indices.get(slot), self.video_index) {
            (Some(&other), _) => {
                packet.stream_index = other;
                packet.payload.push(0xA0);
            }
            (None, Some(video)) => {
                packet.stream_index = video;
                if self.source.faults.corrupt_frame != Some(frame) {
                    let last = slot - self.other_indices.len() + 1 == video_packets;
                    packet.payload.push(u8::from(last));
                }
            }
            (None, None) => return Ok(Pull::EndOfStream),
        }
        Ok(Pull::Ready)
    }
}

pub struct SyntheticDecoder {
    width: u32,
    height: u32,
    format: PixelFormat,
    bytes_per_pixel: usize,
    offsets: [usize; 3],
    delay: usize,
    queued: VecDeque<i64>,
    finished: bool,
    decoded: u64,
    _guard: ResourceGuard,
}

impl SyntheticDecoder {
    /// Moving gradient: blue across, green down, red steps per frame.
    fn paint(&self, frame: &mut SyntheticFrame) {
        let (w, h) = (self.width as usize, self.height as usize);
        let bpp = self.bytes_per_pixel;
        let [r, g, b] = self.offsets;
        let shade = (self.decoded * 8 % 256) as u8;

        frame.data.resize(w * h * bpp, 0);
        for y in 0..h {
            for x in 0..w {
                let px = &mut frame.data[(y * w + x) * bpp..(y * w + x + 1) * bpp];
                px.fill(255);
                px[r] = shade;
                px[g] = (y * 255 / h.max(1)) as u8;
                px[b] = (x * 255 / w.max(1)) as u8;
            }
        }
        frame.format = Some(self.format);
        frame.width = self.width;
        frame.height = self.height;
    }
}

impl FrameDecoder for SyntheticDecoder {
    type Packet = SyntheticPacket;
    type Frame = SyntheticFrame;

    fn picture(&self) -> PictureParams {
        PictureParams {
            width: self.width,
            height: self.height,
            pixel_format: self.format.name().to_string(),
            sample_aspect: Rational::new(1, 1),
        }
    }

    fn submit(&mut self, packet: &SyntheticPacket) -> Result<Pull, ReaderError> {
        match packet.payload.first() {
            None => Err(ReaderError::DecodeSubmit(format!(
                "empty packet on stream {}",
                packet.stream_index
            ))),
            Some(&1) if self.queued.len() > self.delay => Ok(Pull::WouldBlock),
            Some(&1) => {
                self.queued.push_back(packet.pts.unwrap_or(0));
                Ok(Pull::Ready)
            }
            Some(_) => Ok(Pull::Ready),
        }
    }

    fn finish(&mut self) -> Result<(), ReaderError> {
        self.finished = true;
        Ok(())
    }

    fn receive(&mut self, frame: &mut SyntheticFrame) -> Result<Pull, ReaderError> {
        let ready = self.queued.len() > self.delay || self.finished;
        let Some(pts) = self.queued.front().copied().filter(|_| ready) else {
            return Ok(if self.finished {
                Pull::EndOfStream
            } else {
                Pull::WouldBlock
            });
        };
        self.queued.pop_front();
        self.paint(frame);
        // Left unset so callers must fall back on the decoder's estimate.
        frame.pts = None;
        frame.best_effort = Some(pts);
        self.decoded += 1;
        Ok(Pull::Ready)
    }
}

pub struct SyntheticScaler {
    params: ScalerParams,
    _guard: ResourceGuard,
}

impl FrameScaler for SyntheticScaler {
    type Frame = SyntheticFrame;

    fn scale(
        &mut self,
        frame: &SyntheticFrame,
        dest: &mut [u8],
        dest_stride: usize,
    ) -> Result<(), ReaderError> {
        let p = &self.params;
        if frame.format != Some(p.src_format)
            || frame.width != p.src_width
            || frame.height != p.src_height
        {
            return Err(ReaderError::Scale(format!(
                "frame {}x{} {:?} does not match scaler input {}x{} {}",
                frame.width, frame.height, frame.format, p.src_width, p.src_height, p.src_format
            )));
        }
        let (w, h) = (p.dst_width as usize, p.dst_height as usize);
        let row = w * 4;
        if dest_stride < row || (h > 0 && dest.len() < dest_stride * (h - 1) + row) {
            return Err(ReaderError::Scale("destination plane too small".to_string()));
        }
        yuv::uyvy_to_rgb0(&frame.data, w, h, dest, dest_stride);
        Ok(())
    }
}

impl MediaBackend for SyntheticBackend {
    type Packet = SyntheticPacket;
    type Frame = SyntheticFrame;
    type Input = SyntheticInput;
    type Decoder = SyntheticDecoder;
    type Graph = SyntheticGraph;
    type Scaler = SyntheticScaler;

    fn register_devices(&self) -> Result<(), ReaderError> {
        Ok(())
    }

    fn open_input(&self, device: &DeviceConfig) -> Result<SyntheticInput, ReaderError> {
        if device.backend != SYNTHETIC_BACKEND_NAME {
            return Err(ReaderError::DeviceOpen(format!(
                "unknown capture backend '{}'",
                device.backend
            )));
        }
        if self.source.faults.device_open {
            return Err(ReaderError::DeviceOpen(format!(
                "{} is unavailable",
                device.device
            )));
        }
        let video_index = self.source.video_index();
        let other_indices = (0..self.source.streams.len())
            .filter(|&i| Some(i) != video_index)
            .collect();
        Ok(SyntheticInput {
            source: self.source.clone(),
            video_index,
            other_indices,
            next_packet: 0,
            stalls: 0,
            _guard: self.ledger.acquire(ResourceKind::Input),
        })
    }

    fn open_decoder(
        &self,
        input: &SyntheticInput,
        stream: &StreamDescriptor,
    ) -> Result<SyntheticDecoder, ReaderError> {
        let spec = input
            .source
            .streams
            .get(stream.index)
            .filter(|s| s.kind == MediaKind::Video && s.decodable)
            .ok_or_else(|| {
                ReaderError::CodecSetup(format!("stream {} is not decodable video", stream.index))
            })?;
        let format = self.source.pixel_format;
        let (Some(bytes_per_pixel), Some(offsets)) =
            (format.packed_bytes_per_pixel(), format.rgb_offsets())
        else {
            return Err(ReaderError::CodecSetup(format!(
                "synthetic decoder cannot produce {format}"
            )));
        };
        Ok(SyntheticDecoder {
            width: spec.width,
            height: spec.height,
            format,
            bytes_per_pixel,
            offsets,
            delay: self.source.decoder_delay,
            queued: VecDeque::new(),
            finished: false,
            decoded: 0,
            _guard: self.ledger.acquire(ResourceKind::Decoder),
        })
    }

    fn alloc_frame(&self) -> Result<SyntheticFrame, ReaderError> {
        Ok(SyntheticFrame {
            data: Vec::new(),
            format: None,
            width: 0,
            height: 0,
            pts: None,
            best_effort: None,
            _guard: self.ledger.acquire(ResourceKind::Frame),
        })
    }

    fn alloc_packet(&self) -> Result<SyntheticPacket, ReaderError> {
        if self.source.faults.packet_alloc {
            return Err(ReaderError::Allocation("packet"));
        }
        Ok(SyntheticPacket {
            stream_index: 0,
            pts: None,
            payload: Vec::new(),
            _guard: self.ledger.acquire(ResourceKind::Packet),
        })
    }

    fn build_graph(
        &self,
        source: &SourceParams,
        sink_format: PixelFormat,
        description: &str,
    ) -> Result<SyntheticGraph, ReaderError> {
        SyntheticGraph::build(
            source,
            sink_format,
            description,
            &self.source.faults,
            self.ledger.acquire(ResourceKind::Graph),
        )
    }

    fn create_scaler(&self, params: &ScalerParams) -> Result<SyntheticScaler, ReaderError> {
        if self.source.faults.scaler_init {
            return Err(ReaderError::ScalerInit("synthetic scaler refused".to_string()));
        }
        if params.src_format != PixelFormat::Uyvy422 || params.dst_format != PixelFormat::Rgb0 {
            return Err(ReaderError::ScalerInit(format!(
                "cannot convert {} to {}",
                params.src_format, params.dst_format
            )));
        }
        Ok(SyntheticScaler {
            params: params.clone(),
            _guard: self.ledger.acquire(ResourceKind::Scaler),
        })
    }
}
