use crate::shared::frame_buffer::FrameBuffer;
use crate::shared::reader_error::ReaderError;
use crate::shared::stream_metadata::StreamMetadata;

/// Pulls overlaid frames from a capture source, one at a time.
///
/// Calls block until a frame is ready, an error occurs, or the stream ends.
/// None of them are reentrant.
pub trait FrameReader {
    /// Opens the source and returns its geometry and time-base. On failure
    /// `close` must still be called.
    fn open(&mut self) -> Result<StreamMetadata, ReaderError>;

    /// Writes the next frame into `dest` (at least `width * height * 4`
    /// bytes) and returns its presentation timestamp.
    fn read_frame(&mut self, dest: &mut [u8]) -> Result<i64, ReaderError>;

    /// Releases everything the session holds. Safe to call in any state.
    fn close(&mut self);

    fn metadata(&self) -> Option<&StreamMetadata>;

    fn read_into(&mut self, buffer: &mut FrameBuffer) -> Result<i64, ReaderError> {
        let timestamp = self.read_frame(buffer.data_mut())?;
        buffer.set_timestamp(timestamp);
        Ok(timestamp)
    }
}
