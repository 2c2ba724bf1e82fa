use crate::shared::pixel_format::PixelFormat;

/// Capture backend used when none is configured.
#[cfg(target_os = "macos")]
pub const DEFAULT_BACKEND: &str = "avfoundation";
#[cfg(target_os = "linux")]
pub const DEFAULT_BACKEND: &str = "v4l2";
#[cfg(target_os = "windows")]
pub const DEFAULT_BACKEND: &str = "dshow";
#[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
pub const DEFAULT_BACKEND: &str = "video4linux2";

/// Device URL handed to the backend. On AVFoundation this selects the
/// default video device and no audio device.
#[cfg(target_os = "macos")]
pub const DEFAULT_DEVICE: &str = "default:none";
#[cfg(target_os = "linux")]
pub const DEFAULT_DEVICE: &str = "/dev/video0";
#[cfg(not(any(target_os = "macos", target_os = "linux")))]
pub const DEFAULT_DEVICE: &str = "default";

pub const DEFAULT_FRAME_RATE: &str = "25";
pub const DEFAULT_VIDEO_SIZE: &str = "1280x720";
pub const DEFAULT_DEVICE_PIXEL_FORMAT: &str = "bgr0";

/// The only format the filter graph's sink accepts.
pub const INTERMEDIATE_PIXEL_FORMAT: PixelFormat = PixelFormat::Uyvy422;

/// Layout written into caller buffers.
pub const OUTPUT_PIXEL_FORMAT: PixelFormat = PixelFormat::Rgb0;
pub const OUTPUT_BYTES_PER_PIXEL: usize = 4;

/// Names of the graph's boundary nodes.
pub const GRAPH_SOURCE_NAME: &str = "in";
pub const GRAPH_SINK_NAME: &str = "out";

pub const DEFAULT_FONT_FILE: &str = "OpenSans-Regular.ttf";
pub const DEFAULT_OVERLAY_TEXT: &str = "{name} | {role}";

pub const CONFIG_DIR_NAME: &str = "overlaycam";
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Required output buffer length for a frame of the given geometry.
pub fn output_buffer_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * OUTPUT_BYTES_PER_PIXEL
}
