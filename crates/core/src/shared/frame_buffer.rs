use ndarray::{ArrayView3, ArrayViewMut3};

use crate::shared::constants::{output_buffer_len, OUTPUT_BYTES_PER_PIXEL};
use crate::shared::stream_metadata::StreamMetadata;

/// Caller-owned output frame: packed `rgb0` bytes, row-major, stride
/// `width * 4`.
///
/// The reader only ever writes into this buffer; its own decode and filter
/// buffers never leave the session.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameBuffer {
    data: Vec<u8>,
    width: u32,
    height: u32,
    timestamp: Option<i64>,
}

impl FrameBuffer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            data: vec![0; output_buffer_len(width, height)],
            width,
            height,
            timestamp: None,
        }
    }

    pub fn for_stream(metadata: &StreamMetadata) -> Self {
        Self::new(metadata.width, metadata.height)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn stride(&self) -> usize {
        self.width as usize * OUTPUT_BYTES_PER_PIXEL
    }

    /// Presentation timestamp of the frame last written, in stream time-base
    /// units.
    pub fn timestamp(&self) -> Option<i64> {
        self.timestamp
    }

    pub fn set_timestamp(&mut self, timestamp: i64) {
        self.timestamp = Some(timestamp);
    }

    pub fn as_ndarray(&self) -> ArrayView3<'_, u8> {
        ArrayView3::from_shape(self.shape(), &self.data)
            .expect("FrameBuffer data length must match dimensions")
    }

    pub fn as_ndarray_mut(&mut self) -> ArrayViewMut3<'_, u8> {
        ArrayViewMut3::from_shape(self.shape(), &mut self.data)
            .expect("FrameBuffer data length must match dimensions")
    }

    /// Drops the padding byte of every pixel.
    pub fn to_rgb_image(&self) -> image::RgbImage {
        let rgb: Vec<u8> = self
            .data
            .chunks_exact(OUTPUT_BYTES_PER_PIXEL)
            .flat_map(|px| [px[0], px[1], px[2]])
            .collect();
        image::RgbImage::from_raw(self.width, self.height, rgb)
            .expect("rgb buffer length matches dimensions")
    }

    fn shape(&self) -> (usize, usize, usize) {
        (
            self.height as usize,
            self.width as usize,
            OUTPUT_BYTES_PER_PIXEL,
        )
    }
}
