use ffmpeg_next::filter;
use ffmpeg_next::util::error::EAGAIN;
use ffmpeg_next::util::frame::video::Video;

use crate::capture::domain::media_backend::{OverlayGraph, Pull, SourceParams};
use crate::shared::constants::{GRAPH_SINK_NAME, GRAPH_SOURCE_NAME};
use crate::shared::pixel_format::PixelFormat;
use crate::shared::reader_error::ReaderError;

/// A libavfilter graph: `buffer` source, the parsed chain, `buffersink`.
pub struct FfmpegFilterGraph {
    graph: filter::Graph,
    /// Holds an extra reference to the frame being pushed so the caller's
    /// frame is never consumed.
    staging: Video,
}

impl FfmpegFilterGraph {
    pub(super) fn build(
        source: &SourceParams,
        sink_format: PixelFormat,
        description: &str,
    ) -> Result<Self, ReaderError> {
        let graph_err = |context: &'static str| {
            move |e: ffmpeg_next::Error| ReaderError::FilterGraph(format!("{context}: {e}"))
        };
        let find = |name: &str| {
            filter::find(name)
                .ok_or_else(|| ReaderError::FilterGraph(format!("filter '{name}' is unavailable")))
        };

        let mut graph = filter::Graph::new();
        graph
            .add(&find("buffer")?, GRAPH_SOURCE_NAME, &source.buffer_args())
            .map_err(graph_err("cannot create buffer source"))?;
        graph
            .add(&find("buffersink")?, GRAPH_SINK_NAME, "")
            .map_err(graph_err("cannot create buffer sink"))?;
        graph
            .get(GRAPH_SINK_NAME)
            .ok_or_else(|| ReaderError::FilterGraph("buffer sink vanished".into()))?
            .set_pixel_format(sink_format.to_ffmpeg());

        graph
            .output(GRAPH_SOURCE_NAME, 0)
            .and_then(|parser| parser.input(GRAPH_SINK_NAME, 0))
            .and_then(|parser| parser.parse(description))
            .map_err(graph_err("cannot parse filter description"))?;
        graph
            .validate()
            .map_err(graph_err("cannot configure filter graph"))?;
        log::debug!("filter graph configured:\n{}", graph.dump());

        Ok(Self {
            graph,
            staging: Video::empty(),
        })
    }
}

impl OverlayGraph for FfmpegFilterGraph {
    type Frame = Video;

    fn push(&mut self, frame: &Video) -> Result<(), ReaderError> {
        // Safety: both frames are valid for the duration of the call; the
        // staging frame's previous reference is dropped before it is reused.
        let status = unsafe {
            ffmpeg_next::ffi::av_frame_unref(self.staging.as_mut_ptr());
            ffmpeg_next::ffi::av_frame_ref(self.staging.as_mut_ptr(), frame.as_ptr())
        };
        if status < 0 {
            return Err(ReaderError::FilterPush(
                ffmpeg_next::Error::from(status).to_string(),
            ));
        }

        let mut source = self
            .graph
            .get(GRAPH_SOURCE_NAME)
            .ok_or_else(|| ReaderError::FilterPush("graph has no source".into()))?;
        source
            .source()
            .add(&self.staging)
            .map_err(|e| ReaderError::FilterPush(e.to_string()))
    }

    fn pull(&mut self, frame: &mut Video) -> Result<Pull, ReaderError> {
        // Safety: the sink moves a new reference in, so the old one must go.
        unsafe { ffmpeg_next::ffi::av_frame_unref(frame.as_mut_ptr()) };

        let mut sink = self
            .graph
            .get(GRAPH_SINK_NAME)
            .ok_or_else(|| ReaderError::FilterPull("graph has no sink".into()))?;
        match sink.sink().frame(frame) {
            Ok(()) => Ok(Pull::Ready),
            Err(ffmpeg_next::Error::Other { errno }) if errno == EAGAIN => Ok(Pull::WouldBlock),
            Err(ffmpeg_next::Error::Eof) => Ok(Pull::EndOfStream),
            Err(e) => Err(ReaderError::FilterPull(e.to_string())),
        }
    }
}
