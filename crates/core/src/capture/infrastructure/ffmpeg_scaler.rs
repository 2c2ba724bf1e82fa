use std::ffi::c_int;
use std::ptr;

use ffmpeg_next::software::scaling::{Context, Flags};
use ffmpeg_next::util::frame::video::Video;

use crate::capture::domain::media_backend::{FrameScaler, ScalerParams};
use crate::shared::reader_error::ReaderError;

/// A libswscale context converting filtered frames straight into caller
/// memory.
pub struct FfmpegScaler {
    context: Context,
    params: ScalerParams,
}

impl FfmpegScaler {
    pub(super) fn create(params: &ScalerParams) -> Result<Self, ReaderError> {
        let context = Context::get(
            params.src_format.to_ffmpeg(),
            params.src_width,
            params.src_height,
            params.dst_format.to_ffmpeg(),
            params.dst_width,
            params.dst_height,
            Flags::BILINEAR,
        )
        .map_err(|e| ReaderError::ScalerInit(e.to_string()))?;
        Ok(Self {
            context,
            params: params.clone(),
        })
    }
}

impl FrameScaler for FfmpegScaler {
    type Frame = Video;

    fn scale(
        &mut self,
        frame: &Video,
        dest: &mut [u8],
        dest_stride: usize,
    ) -> Result<(), ReaderError> {
        let p = &self.params;
        if frame.format() != p.src_format.to_ffmpeg()
            || frame.width() != p.src_width
            || frame.height() != p.src_height
        {
            return Err(ReaderError::Scale(format!(
                "frame {}x{} {:?} does not match scaler input {}x{} {}",
                frame.width(),
                frame.height(),
                frame.format(),
                p.src_width,
                p.src_height,
                p.src_format
            )));
        }

        let row = p.dst_width as usize * p.dst_format.packed_bytes_per_pixel().unwrap_or(4);
        let rows = p.dst_height as usize;
        if dest_stride < row || (rows > 0 && dest.len() < dest_stride * (rows - 1) + row) {
            return Err(ReaderError::Scale("destination plane too small".into()));
        }

        let dst_planes: [*mut u8; 4] = [
            dest.as_mut_ptr(),
            ptr::null_mut(),
            ptr::null_mut(),
            ptr::null_mut(),
        ];
        let dst_strides: [c_int; 4] = [dest_stride as c_int, 0, 0, 0];

        // Safety: the source frame matches the context's input geometry and
        // the single destination plane was bounds-checked above.
        let written = unsafe {
            let src = frame.as_ptr();
            ffmpeg_next::ffi::sws_scale(
                self.context.as_mut_ptr(),
                (*src).data.as_ptr() as *const *const u8,
                (*src).linesize.as_ptr(),
                0,
                (*src).height,
                dst_planes.as_ptr(),
                dst_strides.as_ptr(),
            )
        };
        if written < 0 {
            return Err(ReaderError::Scale(ffmpeg_next::Error::from(written).to_string()));
        }
        Ok(())
    }
}
