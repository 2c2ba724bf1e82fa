use std::fmt;
use std::str::FromStr;

use ffmpeg_next::format::Pixel;

/// Pixel layouts the reader names explicitly.
///
/// Device-native formats are passed to the capture layer as strings; this
/// enum only covers formats the pipeline itself produces or converts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// Packed 4:2:2, `U Y0 V Y1`. The filter graph's fixed output format.
    Uyvy422,
    /// Packed 4:2:2, `Y0 U Y1 V`.
    Yuyv422,
    Nv12,
    Yuv420p,
    /// Packed RGB with one padding byte. The caller-facing format.
    Rgb0,
    Bgr0,
    Rgba,
    Rgb24,
}

impl PixelFormat {
    pub const ALL: &[PixelFormat] = &[
        PixelFormat::Uyvy422,
        PixelFormat::Yuyv422,
        PixelFormat::Nv12,
        PixelFormat::Yuv420p,
        PixelFormat::Rgb0,
        PixelFormat::Bgr0,
        PixelFormat::Rgba,
        PixelFormat::Rgb24,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            PixelFormat::Uyvy422 => "uyvy422",
            PixelFormat::Yuyv422 => "yuyv422",
            PixelFormat::Nv12 => "nv12",
            PixelFormat::Yuv420p => "yuv420p",
            PixelFormat::Rgb0 => "rgb0",
            PixelFormat::Bgr0 => "bgr0",
            PixelFormat::Rgba => "rgba",
            PixelFormat::Rgb24 => "rgb24",
        }
    }

    /// Bytes per pixel for packed formats, `None` for planar ones.
    pub fn packed_bytes_per_pixel(&self) -> Option<usize> {
        match self {
            PixelFormat::Uyvy422 | PixelFormat::Yuyv422 => Some(2),
            PixelFormat::Rgb0 | PixelFormat::Bgr0 | PixelFormat::Rgba => Some(4),
            PixelFormat::Rgb24 => Some(3),
            PixelFormat::Nv12 | PixelFormat::Yuv420p => None,
        }
    }

    /// Byte offsets of R, G and B within one pixel of a packed RGB format.
    pub fn rgb_offsets(&self) -> Option<[usize; 3]> {
        match self {
            PixelFormat::Rgb0 | PixelFormat::Rgba | PixelFormat::Rgb24 => Some([0, 1, 2]),
            PixelFormat::Bgr0 => Some([2, 1, 0]),
            _ => None,
        }
    }

    pub fn to_ffmpeg(self) -> Pixel {
        match self {
            PixelFormat::Uyvy422 => Pixel::UYVY422,
            PixelFormat::Yuyv422 => Pixel::YUYV422,
            PixelFormat::Nv12 => Pixel::NV12,
            PixelFormat::Yuv420p => Pixel::YUV420P,
            PixelFormat::Rgb0 => Pixel::RGBZ,
            PixelFormat::Bgr0 => Pixel::BGRZ,
            PixelFormat::Rgba => Pixel::RGBA,
            PixelFormat::Rgb24 => Pixel::RGB24,
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported pixel format: {0}")]
pub struct UnknownPixelFormat(pub String);

impl FromStr for PixelFormat {
    type Err = UnknownPixelFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        PixelFormat::ALL
            .iter()
            .copied()
            .find(|f| f.name() == lowered)
            .ok_or(UnknownPixelFormat(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::uyvy("uyvy422", PixelFormat::Uyvy422)]
    #[case::rgb0("rgb0", PixelFormat::Rgb0)]
    #[case::bgr0_upper("BGR0", PixelFormat::Bgr0)]
    #[case::padded(" nv12 ", PixelFormat::Nv12)]
    fn test_parse(#[case] input: &str, #[case] expected: PixelFormat) {
        assert_eq!(input.parse::<PixelFormat>().unwrap(), expected);
    }

    #[test]
    fn test_parse_unknown_fails() {
        let err = "p010le".parse::<PixelFormat>().unwrap_err();
        assert_eq!(err.to_string(), "unsupported pixel format: p010le");
    }

    #[test]
    fn test_rgb_offsets() {
        assert_eq!(PixelFormat::Bgr0.rgb_offsets(), Some([2, 1, 0]));
        assert_eq!(PixelFormat::Rgb24.rgb_offsets(), Some([0, 1, 2]));
        assert_eq!(PixelFormat::Uyvy422.rgb_offsets(), None);
    }

    #[test]
    fn test_output_format_is_four_bytes() {
        assert_eq!(PixelFormat::Rgb0.packed_bytes_per_pixel(), Some(4));
        assert_eq!(PixelFormat::Uyvy422.packed_bytes_per_pixel(), Some(2));
        assert_eq!(PixelFormat::Yuv420p.packed_bytes_per_pixel(), None);
    }

    #[test]
    fn test_ffmpeg_mapping_of_fixed_formats() {
        assert_eq!(PixelFormat::Uyvy422.to_ffmpeg(), Pixel::UYVY422);
        assert_eq!(PixelFormat::Rgb0.to_ffmpeg(), Pixel::RGBZ);
    }
}
