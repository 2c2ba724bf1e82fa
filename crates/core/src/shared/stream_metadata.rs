use crate::shared::constants::output_buffer_len;
use crate::shared::rational::Rational;

/// Geometry and timing of an open capture session.
///
/// Derived once at open time from the selected stream and fixed until close.
#[derive(Clone, Debug, PartialEq)]
pub struct StreamMetadata {
    pub width: u32,
    pub height: u32,
    pub time_base: Rational,
    pub stream_index: usize,
    pub codec: String,
}

impl StreamMetadata {
    /// Bytes a caller buffer must hold for one output frame.
    pub fn frame_len(&self) -> usize {
        output_buffer_len(self.width, self.height)
    }

    /// Row stride of the output buffer.
    pub fn stride(&self) -> usize {
        self.width as usize * crate::shared::constants::OUTPUT_BYTES_PER_PIXEL
    }
}
