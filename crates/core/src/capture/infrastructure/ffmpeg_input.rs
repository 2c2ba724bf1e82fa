use ffmpeg_next::format::context::Input;
use ffmpeg_next::format::stream::Stream;
use ffmpeg_next::media::Type;
use ffmpeg_next::util::error::EAGAIN;

use crate::capture::domain::media_backend::{DemuxInput, Pull};
use crate::capture::domain::stream_selector::{MediaKind, StreamDescriptor};
use crate::shared::reader_error::ReaderError;

/// An opened capture device (or plain URL) read through libavformat.
pub struct FfmpegInput {
    ictx: Input,
}

impl FfmpegInput {
    pub(super) fn new(ictx: Input) -> Self {
        Self { ictx }
    }

    pub(super) fn stream_parameters(&self, index: usize) -> Option<ffmpeg_next::codec::Parameters> {
        self.ictx.stream(index).map(|s| s.parameters())
    }
}

impl DemuxInput for FfmpegInput {
    type Packet = ffmpeg_next::Packet;

    fn streams(&self) -> Vec<StreamDescriptor> {
        self.ictx.streams().map(|s| describe(&s)).collect()
    }

    fn read_packet(&mut self, packet: &mut ffmpeg_next::Packet) -> Result<Pull, ReaderError> {
        match packet.read(&mut self.ictx) {
            Ok(()) => Ok(Pull::Ready),
            Err(ffmpeg_next::Error::Eof) => Ok(Pull::EndOfStream),
            Err(ffmpeg_next::Error::Other { errno }) if errno == EAGAIN => Ok(Pull::WouldBlock),
            Err(e) => Err(ReaderError::Demux(e.to_string())),
        }
    }
}

fn describe(stream: &Stream) -> StreamDescriptor {
    let params = stream.parameters();
    let decoder = ffmpeg_next::decoder::find(params.id());
    let decodable = decoder.is_some();

    // Safety: codecpar belongs to the stream, which outlives this read.
    let (width, height) = unsafe {
        let raw = params.as_ptr();
        ((*raw).width.max(0) as u32, (*raw).height.max(0) as u32)
    };

    StreamDescriptor {
        index: stream.index(),
        kind: media_kind(params.medium()),
        codec: decoder
            .map(|c| c.name().to_string())
            .unwrap_or_else(|| format!("{:?}", params.id())),
        decodable,
        width,
        height,
        time_base: stream.time_base().into(),
    }
}

fn media_kind(medium: Type) -> MediaKind {
    match medium {
        Type::Video => MediaKind::Video,
        Type::Audio => MediaKind::Audio,
        Type::Subtitle => MediaKind::Subtitle,
        Type::Data => MediaKind::Data,
        _ => MediaKind::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_kind_mapping() {
        assert_eq!(media_kind(Type::Video), MediaKind::Video);
        assert_eq!(media_kind(Type::Audio), MediaKind::Audio);
        assert_eq!(media_kind(Type::Attachment), MediaKind::Other);
    }
}
