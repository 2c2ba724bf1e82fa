use crate::shared::rational::Rational;
use crate::shared::reader_error::ReaderError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    Audio,
    Subtitle,
    Data,
    Other,
}

/// What the selector needs to know about one stream of an opened input.
#[derive(Clone, Debug, PartialEq)]
pub struct StreamDescriptor {
    pub index: usize,
    pub kind: MediaKind,
    pub codec: String,
    /// Whether a decoder exists for the stream's codec.
    pub decodable: bool,
    pub width: u32,
    pub height: u32,
    pub time_base: Rational,
}

/// Picks the lowest-index video stream that has a decoder.
///
/// First match wins; candidates are not scored.
pub fn select_video_stream(
    streams: &[StreamDescriptor],
) -> Result<&StreamDescriptor, ReaderError> {
    streams
        .iter()
        .filter(|s| s.decodable)
        .find(|s| s.kind == MediaKind::Video)
        .ok_or(ReaderError::NoVideoStream)
}
