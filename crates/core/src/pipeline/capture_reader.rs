use std::time::{Duration, Instant};

use crate::capture::domain::frame_reader::FrameReader;
use crate::capture::domain::media_backend::{
    DemuxInput, FrameDecoder, FrameScaler, MediaBackend, MediaFrame, MediaPacket, OverlayGraph,
    Pull, ScalerParams, SourceParams,
};
use crate::capture::domain::stream_selector::select_video_stream;
use crate::pipeline::pipeline_logger::{NullPipelineLogger, PipelineLogger};
use crate::shared::constants::{INTERMEDIATE_PIXEL_FORMAT, OUTPUT_PIXEL_FORMAT};
use crate::shared::reader_config::ReaderConfig;
use crate::shared::reader_error::ReaderError;
use crate::shared::stream_metadata::StreamMetadata;

/// Pause between demuxer polls while a live device has no packet ready.
const DEMUX_RETRY_INTERVAL: Duration = Duration::from_millis(2);

/// Where a session is in its open/read/close cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReaderPhase {
    Closed,
    Open,
    /// The stream ended; every further read reports end of stream.
    Ended,
    /// `open` failed part way; only `close` is meaningful.
    Failed,
}

/// Everything one open/close cycle owns.
///
/// Handles are acquired in pipeline order during `open` and dropped by
/// `release`; any of them may be absent if `open` stopped early.
struct ReaderState<B: MediaBackend> {
    phase: ReaderPhase,
    metadata: Option<StreamMetadata>,
    input: Option<B::Input>,
    decoder: Option<B::Decoder>,
    raw_frame: Option<B::Frame>,
    filtered_frame: Option<B::Frame>,
    packet: Option<B::Packet>,
    graph: Option<B::Graph>,
    scaler: Option<B::Scaler>,
    /// The packet in hand was refused by a full decoder.
    packet_pending: bool,
    /// End of input was signalled to the decoder.
    draining: bool,
    frames_read: usize,
}

impl<B: MediaBackend> ReaderState<B> {
    fn new() -> Self {
        Self {
            phase: ReaderPhase::Closed,
            metadata: None,
            input: None,
            decoder: None,
            raw_frame: None,
            filtered_frame: None,
            packet: None,
            graph: None,
            scaler: None,
            packet_pending: false,
            draining: false,
            frames_read: 0,
        }
    }

    fn release(&mut self) {
        self.scaler = None;
        self.input = None;
        self.raw_frame = None;
        self.filtered_frame = None;
        self.packet = None;
        self.decoder = None;
        self.graph = None;
        self.metadata = None;
        self.packet_pending = false;
        self.draining = false;
        self.frames_read = 0;
        self.phase = ReaderPhase::Closed;
    }

    /// Drains the decoder, feeding it packets of `stream_index` only when it
    /// has nothing ready.
    fn decode_next(&mut self, stream_index: usize) -> Result<(), ReaderError> {
        let (Some(input), Some(decoder), Some(packet), Some(frame)) = (
            self.input.as_mut(),
            self.decoder.as_mut(),
            self.packet.as_mut(),
            self.raw_frame.as_mut(),
        ) else {
            return Err(ReaderError::InvalidState("session has no decoder"));
        };

        loop {
            match decoder.receive(frame)? {
                Pull::Ready => {
                    frame.adopt_best_effort_timestamp();
                    return Ok(());
                }
                Pull::EndOfStream => return Err(ReaderError::EndOfStream),
                Pull::WouldBlock if self.draining => return Err(ReaderError::EndOfStream),
                Pull::WouldBlock => {}
            }

            if !self.packet_pending {
                match input.read_packet(packet)? {
                    Pull::Ready => {}
                    Pull::WouldBlock => {
                        std::thread::sleep(DEMUX_RETRY_INTERVAL);
                        continue;
                    }
                    Pull::EndOfStream => {
                        decoder.finish()?;
                        self.draining = true;
                        continue;
                    }
                }
                if packet.stream_index() != stream_index {
                    packet.discard_payload();
                    continue;
                }
            }

            match decoder.submit(packet) {
                Ok(Pull::WouldBlock) => self.packet_pending = true,
                submitted => {
                    self.packet_pending = false;
                    packet.discard_payload();
                    submitted?;
                }
            }
        }
    }

    /// Runs the decoded frame through the graph into the filtered frame.
    fn filter_current(&mut self, strict_push: bool) -> Result<(), ReaderError> {
        let (Some(graph), Some(raw), Some(filtered)) = (
            self.graph.as_mut(),
            self.raw_frame.as_ref(),
            self.filtered_frame.as_mut(),
        ) else {
            return Err(ReaderError::InvalidState("session has no filter graph"));
        };

        if let Err(e) = graph.push(raw) {
            if strict_push {
                return Err(e);
            }
            log::warn!("{e}; pulling from the graph anyway");
        }

        match graph.pull(filtered)? {
            Pull::Ready => Ok(()),
            Pull::WouldBlock => Err(ReaderError::FilterPull(
                "graph produced no frame for the input".into(),
            )),
            Pull::EndOfStream => Err(ReaderError::EndOfStream),
        }
    }

    fn current_timestamp(&self) -> i64 {
        let filtered = self
            .filtered_frame
            .as_ref()
            .and_then(|f| f.presentation_timestamp());
        let raw = self
            .raw_frame
            .as_ref()
            .and_then(|f| f.presentation_timestamp());
        filtered.or(raw).unwrap_or(0)
    }
}

/// Pull-based reader over a live capture device.
///
/// Owns one capture session at a time: `open` acquires the device, decoder
/// and overlay graph, each `read_frame` delivers one overlaid `rgb0` frame,
/// `close` releases everything. Dropping the reader closes it.
pub struct CaptureReader<B: MediaBackend> {
    backend: B,
    config: ReaderConfig,
    logger: Box<dyn PipelineLogger>,
    state: ReaderState<B>,
}

impl<B: MediaBackend> CaptureReader<B> {
    pub fn new(backend: B, config: ReaderConfig) -> Self {
        Self {
            backend,
            config,
            logger: Box::new(NullPipelineLogger),
            state: ReaderState::new(),
        }
    }

    pub fn with_logger(mut self, logger: Box<dyn PipelineLogger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn phase(&self) -> ReaderPhase {
        self.state.phase
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn frames_read(&self) -> usize {
        self.state.frames_read
    }

    pub fn logger(&self) -> &dyn PipelineLogger {
        self.logger.as_ref()
    }

    fn open_stages(&mut self) -> Result<StreamMetadata, ReaderError> {
        let description = self.config.filter_description()?;
        let state = &mut self.state;

        self.backend.register_devices()?;
        let input = state
            .input
            .insert(self.backend.open_input(&self.config.device)?);
        log::debug!(
            "opened {} via {}",
            self.config.device.device,
            self.config.device.backend
        );

        let streams = input.streams();
        let stream = select_video_stream(&streams)?;
        log::debug!(
            "selected stream {} ({}, {}x{}, time-base {})",
            stream.index,
            stream.codec,
            stream.width,
            stream.height,
            stream.time_base
        );

        let decoder = state
            .decoder
            .insert(self.backend.open_decoder(input, stream)?);
        let picture = decoder.picture();

        state.raw_frame = Some(self.backend.alloc_frame()?);
        state.filtered_frame = Some(self.backend.alloc_frame()?);
        state.packet = Some(self.backend.alloc_packet()?);

        let source = SourceParams::new(picture, stream.time_base);
        log::debug!("building filter graph from {}: {description}", source.buffer_args());
        state.graph = Some(self.backend.build_graph(
            &source,
            INTERMEDIATE_PIXEL_FORMAT,
            &description,
        )?);

        let metadata = StreamMetadata {
            width: stream.width,
            height: stream.height,
            time_base: stream.time_base,
            stream_index: stream.index,
            codec: stream.codec.clone(),
        };
        state.metadata = Some(metadata.clone());
        Ok(metadata)
    }

    fn scale_into(
        &mut self,
        dest: &mut [u8],
        metadata: &StreamMetadata,
    ) -> Result<(), ReaderError> {
        if self.state.scaler.is_none() {
            let params = ScalerParams {
                src_format: INTERMEDIATE_PIXEL_FORMAT,
                src_width: metadata.width,
                src_height: metadata.height,
                dst_format: OUTPUT_PIXEL_FORMAT,
                dst_width: metadata.width,
                dst_height: metadata.height,
            };
            self.state.scaler = Some(self.backend.create_scaler(&params)?);
            log::debug!(
                "created {} -> {} scaler at {}x{}",
                params.src_format,
                params.dst_format,
                params.dst_width,
                params.dst_height
            );
        }

        let (Some(scaler), Some(filtered)) =
            (self.state.scaler.as_mut(), self.state.filtered_frame.as_ref())
        else {
            return Err(ReaderError::InvalidState("session has no scaler"));
        };
        scaler.scale(filtered, dest, metadata.stride())
    }

    fn read_stages(
        &mut self,
        dest: &mut [u8],
        metadata: &StreamMetadata,
    ) -> Result<i64, ReaderError> {
        let started = Instant::now();
        self.state.decode_next(metadata.stream_index)?;
        let decoded = Instant::now();
        self.logger
            .timing("decode", (decoded - started).as_secs_f64() * 1000.0);

        self.state.filter_current(self.config.strict_filter_push)?;
        let filtered = Instant::now();
        self.logger
            .timing("filter", (filtered - decoded).as_secs_f64() * 1000.0);

        self.scale_into(dest, metadata)?;
        self.logger
            .timing("scale", filtered.elapsed().as_secs_f64() * 1000.0);

        Ok(self.state.current_timestamp())
    }
}

impl<B: MediaBackend> FrameReader for CaptureReader<B> {
    fn open(&mut self) -> Result<StreamMetadata, ReaderError> {
        if self.state.phase != ReaderPhase::Closed {
            return Err(ReaderError::InvalidState(
                "open called on a session that was not closed",
            ));
        }

        self.state.phase = ReaderPhase::Failed;
        let metadata = self.open_stages()?;
        self.state.phase = ReaderPhase::Open;
        self.logger.session_started();
        self.logger.info(&format!(
            "Capture opened: {}x{} {}, time-base {}",
            metadata.width, metadata.height, metadata.codec, metadata.time_base
        ));
        Ok(metadata)
    }

    fn read_frame(&mut self, dest: &mut [u8]) -> Result<i64, ReaderError> {
        match self.state.phase {
            ReaderPhase::Open => {}
            ReaderPhase::Ended => return Err(ReaderError::EndOfStream),
            ReaderPhase::Closed => {
                return Err(ReaderError::InvalidState("read_frame called before open"))
            }
            ReaderPhase::Failed => {
                return Err(ReaderError::InvalidState(
                    "read_frame called after a failed open",
                ))
            }
        }

        let metadata = self
            .state
            .metadata
            .clone()
            .ok_or(ReaderError::InvalidState("open session has no metadata"))?;
        let required = metadata.frame_len();
        if dest.len() < required {
            return Err(ReaderError::BufferTooSmall {
                required,
                actual: dest.len(),
            });
        }

        match self.read_stages(&mut dest[..required], &metadata) {
            Ok(timestamp) => {
                self.logger.frame(self.state.frames_read, timestamp);
                self.state.frames_read += 1;
                Ok(timestamp)
            }
            Err(ReaderError::EndOfStream) => {
                self.state.phase = ReaderPhase::Ended;
                self.logger.info(&format!(
                    "Capture ended after {} frames",
                    self.state.frames_read
                ));
                Err(ReaderError::EndOfStream)
            }
            Err(e) => Err(e),
        }
    }

    fn close(&mut self) {
        if self.state.phase == ReaderPhase::Closed {
            return;
        }
        let frames = self.state.frames_read;
        self.state.release();
        self.logger.summary();
        log::info!("Capture closed after {frames} frames");
    }

    fn metadata(&self) -> Option<&StreamMetadata> {
        self.state.metadata.as_ref()
    }
}

impl<B: MediaBackend> Drop for CaptureReader<B> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::infrastructure::resource_ledger::{ResourceKind, ResourceLedger};
    use crate::capture::infrastructure::synthetic_backend::{
        SyntheticBackend, SyntheticFaults, SyntheticSource, SyntheticStream,
        SYNTHETIC_BACKEND_NAME,
    };
    use crate::capture::domain::stream_selector::MediaKind;
    use crate::shared::frame_buffer::FrameBuffer;
    use rstest::rstest;
    use std::sync::{Arc, Mutex};

    fn synthetic_config() -> ReaderConfig {
        let mut config = ReaderConfig::default();
        config.device.backend = SYNTHETIC_BACKEND_NAME.to_string();
        config.device.device = "cam0".to_string();
        config
    }

    fn reader_for(
        source: SyntheticSource,
        config: ReaderConfig,
    ) -> (CaptureReader<SyntheticBackend>, Arc<ResourceLedger>) {
        let backend = SyntheticBackend::new(source);
        let ledger = Arc::clone(backend.ledger());
        (CaptureReader::new(backend, config), ledger)
    }

    fn small_camera() -> SyntheticSource {
        SyntheticSource::camera(32, 24, 25.0)
    }

    #[test]
    fn test_open_close_without_reads_releases_everything() {
        let (mut reader, ledger) = reader_for(small_camera(), synthetic_config());
        reader.open().unwrap();
        assert_eq!(reader.phase(), ReaderPhase::Open);
        assert_eq!(ledger.live(ResourceKind::Frame), 2);
        assert_eq!(ledger.live(ResourceKind::Graph), 1);
        assert_eq!(ledger.allocated(ResourceKind::Scaler), 0);

        reader.close();
        assert_eq!(reader.phase(), ReaderPhase::Closed);
        for kind in ResourceKind::ALL {
            assert_eq!(ledger.live(kind), 0, "{kind:?} still live");
        }
        assert!(ledger.all_released());
    }

    #[test]
    fn test_close_is_idempotent() {
        let (mut reader, ledger) = reader_for(small_camera(), synthetic_config());
        reader.open().unwrap();
        reader.close();
        reader.close();
        assert_eq!(ledger.released(ResourceKind::Input), 1);
        assert_eq!(ledger.released(ResourceKind::Decoder), 1);
    }

    #[test]
    fn test_close_without_open_is_noop() {
        let (mut reader, ledger) = reader_for(small_camera(), synthetic_config());
        reader.close();
        assert_eq!(reader.phase(), ReaderPhase::Closed);
        assert!(ledger.all_released());
    }

    #[test]
    fn test_drop_releases_open_session() {
        let (mut reader, ledger) = reader_for(small_camera(), synthetic_config());
        reader.open().unwrap();
        drop(reader);
        assert!(ledger.all_released());
    }

    #[test]
    fn test_timestamps_are_non_decreasing() {
        let (mut reader, _ledger) = reader_for(small_camera(), synthetic_config());
        let meta = reader.open().unwrap();
        let mut buffer = FrameBuffer::for_stream(&meta);

        let timestamps: Vec<i64> = (0..10)
            .map(|_| reader.read_into(&mut buffer).unwrap())
            .collect();
        assert!(timestamps.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(timestamps[1], 40_000);
        assert_eq!(buffer.timestamp(), Some(360_000));
        assert_eq!(reader.frames_read(), 10);
    }

    #[test]
    fn test_output_fills_exactly_frame_len_bytes() {
        let (mut reader, _ledger) = reader_for(small_camera(), synthetic_config());
        let meta = reader.open().unwrap();
        let required = 32 * 24 * 4;
        assert_eq!(meta.frame_len(), required);

        let mut dest = vec![0xAB; required + 16];
        reader.read_frame(&mut dest).unwrap();
        assert!(dest[..required].iter().any(|&b| b != 0xAB));
        assert!(dest[required..].iter().all(|&b| b == 0xAB));
    }

    #[test]
    fn test_short_buffer_is_rejected_before_reading() {
        let (mut reader, _ledger) =
            reader_for(small_camera().with_frame_count(1), synthetic_config());
        let meta = reader.open().unwrap();

        let mut short = vec![0u8; meta.frame_len() - 1];
        assert_eq!(
            reader.read_frame(&mut short).unwrap_err(),
            ReaderError::BufferTooSmall {
                required: meta.frame_len(),
                actual: meta.frame_len() - 1,
            }
        );
        // the single frame is still there
        let mut buffer = FrameBuffer::for_stream(&meta);
        assert_eq!(reader.read_into(&mut buffer).unwrap(), 0);
    }

    #[test]
    fn test_read_after_end_of_stream_stays_ended() {
        let (mut reader, ledger) =
            reader_for(small_camera().with_frame_count(2), synthetic_config());
        let meta = reader.open().unwrap();
        let mut buffer = FrameBuffer::for_stream(&meta);

        reader.read_into(&mut buffer).unwrap();
        reader.read_into(&mut buffer).unwrap();
        assert_eq!(reader.read_into(&mut buffer), Err(ReaderError::EndOfStream));
        assert_eq!(reader.phase(), ReaderPhase::Ended);
        let scalers = ledger.allocated(ResourceKind::Scaler);
        assert_eq!(reader.read_into(&mut buffer), Err(ReaderError::EndOfStream));
        assert_eq!(ledger.allocated(ResourceKind::Scaler), scalers);

        reader.close();
        assert!(ledger.all_released());
    }

    #[test]
    fn test_720p_first_frame_has_content() {
        let source = SyntheticSource::camera(1280, 720, 25.0);
        let (mut reader, _ledger) = reader_for(source, synthetic_config());
        let meta = reader.open().unwrap();
        assert_eq!((meta.width, meta.height), (1280, 720));

        let mut buffer = FrameBuffer::for_stream(&meta);
        let ts = reader.read_into(&mut buffer).unwrap();
        assert!(ts >= 0);
        assert_eq!(buffer.data().len(), 1280 * 720 * 4);
        assert!(buffer.data().iter().any(|&b| b != 0));
    }

    #[test]
    fn test_overlay_darkens_the_bar_only() {
        let read_first = |config: ReaderConfig| {
            let (mut reader, _ledger) = reader_for(SyntheticSource::camera(320, 240, 25.0), config);
            let meta = reader.open().unwrap();
            let mut buffer = FrameBuffer::for_stream(&meta);
            reader.read_into(&mut buffer).unwrap();
            buffer
        };
        let mut plain = synthetic_config();
        plain.filter_description = Some("null".to_string());
        let plain = read_first(plain);
        let overlaid = read_first(synthetic_config());

        let brightness = |buffer: &FrameBuffer, row: usize| {
            let view = buffer.as_ndarray();
            (0..320).map(|x| view[[row, x, 1]] as u64).sum::<u64>()
        };
        // default bar spans ih-68 .. ih-20 and the caption ends at ih-29
        assert_eq!(brightness(&plain, 10), brightness(&overlaid, 10));
        assert!(brightness(&overlaid, 240 - 25) < brightness(&plain, 240 - 25));
    }

    #[test]
    fn test_all_audio_source_has_no_video_stream() {
        let source = small_camera()
            .with_streams(vec![SyntheticStream::audio(), SyntheticStream::audio()]);
        let (mut reader, ledger) = reader_for(source, synthetic_config());

        assert_eq!(reader.open().unwrap_err(), ReaderError::NoVideoStream);
        assert_eq!(reader.phase(), ReaderPhase::Failed);
        assert_eq!(ledger.allocated(ResourceKind::Decoder), 0);
        assert_eq!(ledger.allocated(ResourceKind::Graph), 0);
        assert_eq!(ledger.allocated(ResourceKind::Scaler), 0);
        assert_eq!(ledger.live(ResourceKind::Input), 1);

        reader.close();
        assert!(ledger.all_released());
    }

    #[test]
    fn test_undecodable_video_is_skipped() {
        let mut hidden = SyntheticStream::video(64, 48);
        hidden.decodable = false;
        let source = small_camera().with_streams(vec![hidden, SyntheticStream::video(32, 24)]);
        let (mut reader, _ledger) = reader_for(source, synthetic_config());
        let meta = reader.open().unwrap();
        assert_eq!(meta.stream_index, 1);
        assert_eq!((meta.width, meta.height), (32, 24));
    }

    #[test]
    fn test_malformed_filter_fails_after_decoder_opened() {
        let mut config = synthetic_config();
        config.filter_description = Some("drawbox=y=ih-:t=fill".to_string());
        let (mut reader, ledger) = reader_for(small_camera(), config);

        assert!(matches!(reader.open(), Err(ReaderError::FilterGraph(_))));
        assert_eq!(ledger.allocated(ResourceKind::Decoder), 1);
        assert_eq!(ledger.live(ResourceKind::Decoder), 1);

        reader.close();
        assert_eq!(ledger.live(ResourceKind::Decoder), 0);
        assert!(ledger.all_released());
    }

    #[test]
    fn test_bad_overlay_template_fails_before_device() {
        let mut config = synthetic_config();
        config.overlay.text.template = "{nobody}".to_string();
        let (mut reader, ledger) = reader_for(small_camera(), config);
        assert!(matches!(reader.open(), Err(ReaderError::Config(_))));
        assert_eq!(ledger.allocated(ResourceKind::Input), 0);
    }

    #[test]
    fn test_two_sessions_in_one_process() {
        let (mut reader, ledger) = reader_for(small_camera(), synthetic_config());
        for _ in 0..2 {
            let meta = reader.open().unwrap();
            let mut buffer = FrameBuffer::for_stream(&meta);
            for _ in 0..3 {
                reader.read_into(&mut buffer).unwrap();
            }
            reader.close();
        }
        assert_eq!(ledger.allocated(ResourceKind::Input), 2);
        assert_eq!(ledger.allocated(ResourceKind::Scaler), 2);
        assert!(ledger.all_released());
    }

    #[test]
    fn test_scaler_is_created_once_per_session() {
        let (mut reader, ledger) = reader_for(small_camera(), synthetic_config());
        let meta = reader.open().unwrap();
        let mut buffer = FrameBuffer::for_stream(&meta);
        for _ in 0..5 {
            reader.read_into(&mut buffer).unwrap();
        }
        assert_eq!(ledger.allocated(ResourceKind::Scaler), 1);
    }

    #[test]
    fn test_read_before_open_is_invalid() {
        let (mut reader, _ledger) = reader_for(small_camera(), synthetic_config());
        let mut dest = vec![0u8; 32 * 24 * 4];
        assert!(matches!(
            reader.read_frame(&mut dest),
            Err(ReaderError::InvalidState(_))
        ));
    }

    #[test]
    fn test_open_twice_is_invalid() {
        let (mut reader, _ledger) = reader_for(small_camera(), synthetic_config());
        reader.open().unwrap();
        assert!(matches!(reader.open(), Err(ReaderError::InvalidState(_))));
        assert_eq!(reader.phase(), ReaderPhase::Open);
    }

    #[test]
    fn test_read_after_failed_open_is_invalid() {
        let faults = SyntheticFaults {
            device_open: true,
            ..SyntheticFaults::default()
        };
        let (mut reader, ledger) =
            reader_for(small_camera().with_faults(faults), synthetic_config());
        assert!(matches!(reader.open(), Err(ReaderError::DeviceOpen(_))));
        let mut dest = vec![0u8; 32 * 24 * 4];
        assert!(matches!(
            reader.read_frame(&mut dest),
            Err(ReaderError::InvalidState(_))
        ));
        reader.close();
        assert!(ledger.all_released());
        assert_eq!(reader.phase(), ReaderPhase::Closed);
    }

    #[test]
    fn test_unknown_backend_fails_to_open() {
        let mut config = synthetic_config();
        config.device.backend = "nope".to_string();
        let (mut reader, _ledger) = reader_for(small_camera(), config);
        assert!(matches!(reader.open(), Err(ReaderError::DeviceOpen(_))));
    }

    #[test]
    fn test_packet_allocation_failure_is_reported() {
        let faults = SyntheticFaults {
            packet_alloc: true,
            ..SyntheticFaults::default()
        };
        let (mut reader, ledger) =
            reader_for(small_camera().with_faults(faults), synthetic_config());
        assert_eq!(reader.open().unwrap_err(), ReaderError::Allocation("packet"));
        assert_eq!(ledger.live(ResourceKind::Frame), 2);
        reader.close();
        assert!(ledger.all_released());
    }

    #[test]
    fn test_other_streams_are_discarded() {
        let source = small_camera()
            .with_streams(vec![
                SyntheticStream::audio(),
                SyntheticStream::video(32, 24),
                SyntheticStream::audio(),
            ])
            .with_frame_count(3);
        let (mut reader, _ledger) = reader_for(source, synthetic_config());
        let meta = reader.open().unwrap();
        assert_eq!(meta.stream_index, 1);

        let mut buffer = FrameBuffer::for_stream(&meta);
        let timestamps: Vec<i64> =
            std::iter::from_fn(|| reader.read_into(&mut buffer).ok()).collect();
        assert_eq!(timestamps, [0, 40_000, 80_000]);
    }

    #[test]
    fn test_decoder_would_block_keeps_reading() {
        let source = small_camera().with_packets_per_frame(3).with_frame_count(2);
        let (mut reader, _ledger) = reader_for(source, synthetic_config());
        let meta = reader.open().unwrap();
        let mut buffer = FrameBuffer::for_stream(&meta);

        assert_eq!(reader.read_into(&mut buffer).unwrap(), 0);
        assert_eq!(reader.read_into(&mut buffer).unwrap(), 40_000);
        assert_eq!(reader.read_into(&mut buffer), Err(ReaderError::EndOfStream));
    }

    #[test]
    fn test_delayed_decoder_delivers_every_frame() {
        let source = small_camera().with_decoder_delay(2).with_frame_count(5);
        let (mut reader, ledger) = reader_for(source, synthetic_config());
        let meta = reader.open().unwrap();
        let mut buffer = FrameBuffer::for_stream(&meta);

        let timestamps: Vec<i64> =
            std::iter::from_fn(|| reader.read_into(&mut buffer).ok()).collect();
        assert_eq!(timestamps, [0, 40_000, 80_000, 120_000, 160_000]);
        assert_eq!(reader.phase(), ReaderPhase::Ended);

        reader.close();
        assert!(ledger.all_released());
    }

    #[test]
    fn test_stalled_demuxer_is_polled_with_pauses() {
        let faults = SyntheticFaults {
            stalled_reads: 5,
            ..SyntheticFaults::default()
        };
        let source = small_camera().with_frame_count(1).with_faults(faults);
        let (mut reader, _ledger) = reader_for(source, synthetic_config());
        let meta = reader.open().unwrap();
        let mut buffer = FrameBuffer::for_stream(&meta);

        let started = Instant::now();
        assert_eq!(reader.read_into(&mut buffer).unwrap(), 0);
        assert!(started.elapsed() >= DEMUX_RETRY_INTERVAL * 5);
    }

    #[derive(Clone, Default)]
    struct RecordingLogger {
        frames: Arc<Mutex<Vec<usize>>>,
    }

    impl PipelineLogger for RecordingLogger {
        fn frame(&mut self, index: usize, _timestamp: i64) {
            self.frames.lock().unwrap().push(index);
        }
        fn timing(&mut self, _stage: &str, _duration_ms: f64) {}
        fn info(&mut self, _message: &str) {}
        fn session_started(&mut self) {
            self.frames.lock().unwrap().clear();
        }
    }

    #[test]
    fn test_logger_restarts_with_each_session() {
        let logger = RecordingLogger::default();
        let frames = Arc::clone(&logger.frames);
        let backend = SyntheticBackend::new(small_camera());
        let mut reader =
            CaptureReader::new(backend, synthetic_config()).with_logger(Box::new(logger));

        for reads in [3, 2] {
            let meta = reader.open().unwrap();
            let mut buffer = FrameBuffer::for_stream(&meta);
            for _ in 0..reads {
                reader.read_into(&mut buffer).unwrap();
            }
            reader.close();
        }
        assert_eq!(*frames.lock().unwrap(), [0, 1]);
    }

    #[test]
    fn test_decode_errors_propagate() {
        let faults = SyntheticFaults {
            corrupt_frame: Some(1),
            ..SyntheticFaults::default()
        };
        let (mut reader, _ledger) =
            reader_for(small_camera().with_faults(faults), synthetic_config());
        let meta = reader.open().unwrap();
        let mut buffer = FrameBuffer::for_stream(&meta);

        reader.read_into(&mut buffer).unwrap();
        assert!(matches!(
            reader.read_into(&mut buffer),
            Err(ReaderError::DecodeSubmit(_))
        ));
        // not terminal: the next frame decodes
        assert_eq!(reader.read_into(&mut buffer).unwrap(), 80_000);
    }

    #[test]
    fn test_demux_errors_propagate() {
        let faults = SyntheticFaults {
            demux_error_at: Some(0),
            ..SyntheticFaults::default()
        };
        let (mut reader, _ledger) =
            reader_for(small_camera().with_faults(faults), synthetic_config());
        let meta = reader.open().unwrap();
        let mut dest = vec![0u8; meta.frame_len()];
        assert!(matches!(reader.read_frame(&mut dest), Err(ReaderError::Demux(_))));
        assert!(reader.read_frame(&mut dest).is_ok());
    }

    #[rstest]
    #[case::lenient(false)]
    #[case::strict(true)]
    fn test_rejected_push(#[case] strict: bool) {
        let faults = SyntheticFaults {
            reject_push: true,
            ..SyntheticFaults::default()
        };
        let mut config = synthetic_config();
        config.strict_filter_push = strict;
        let (mut reader, _ledger) = reader_for(small_camera().with_faults(faults), config);
        let meta = reader.open().unwrap();
        let mut dest = vec![0u8; meta.frame_len()];

        let err = reader.read_frame(&mut dest).unwrap_err();
        if strict {
            assert!(matches!(err, ReaderError::FilterPush(_)));
        } else {
            assert!(matches!(err, ReaderError::FilterPull(_)));
        }
        assert_eq!(reader.phase(), ReaderPhase::Open);
    }

    #[test]
    fn test_graph_end_of_stream_is_terminal() {
        let faults = SyntheticFaults {
            graph_end_after: Some(1),
            ..SyntheticFaults::default()
        };
        let (mut reader, _ledger) =
            reader_for(small_camera().with_faults(faults), synthetic_config());
        let meta = reader.open().unwrap();
        let mut buffer = FrameBuffer::for_stream(&meta);

        reader.read_into(&mut buffer).unwrap();
        assert_eq!(reader.read_into(&mut buffer), Err(ReaderError::EndOfStream));
        assert_eq!(reader.phase(), ReaderPhase::Ended);
    }

    #[test]
    fn test_scaler_failure_is_reported_on_first_read() {
        let faults = SyntheticFaults {
            scaler_init: true,
            ..SyntheticFaults::default()
        };
        let (mut reader, ledger) =
            reader_for(small_camera().with_faults(faults), synthetic_config());
        let meta = reader.open().unwrap();
        let mut dest = vec![0u8; meta.frame_len()];
        assert!(matches!(reader.read_frame(&mut dest), Err(ReaderError::ScalerInit(_))));
        assert_eq!(ledger.allocated(ResourceKind::Scaler), 0);
    }

    #[test]
    fn test_metadata_follows_session() {
        let (mut reader, _ledger) = reader_for(small_camera(), synthetic_config());
        assert!(reader.metadata().is_none());
        let meta = reader.open().unwrap();
        assert_eq!(reader.metadata(), Some(&meta));
        assert_eq!(meta.codec, "rawvideo");
        assert_eq!(meta.time_base.den, 1_000_000);
        assert_eq!(
            reader.backend().ledger().live(ResourceKind::Input),
            1
        );
        reader.close();
        assert!(reader.metadata().is_none());
    }

    #[test]
    fn test_non_video_stream_cannot_be_decoded() {
        let source = small_camera();
        let backend = SyntheticBackend::new(source);
        let input = backend.open_input(&synthetic_config().device).unwrap();
        let mut stream = input.streams()[0].clone();
        stream.kind = MediaKind::Audio;
        stream.index = 7;
        assert!(matches!(
            backend.open_decoder(&input, &stream),
            Err(ReaderError::CodecSetup(_))
        ));
    }
}
