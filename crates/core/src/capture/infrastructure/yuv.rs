//! Integer BT.601 (limited range) conversions used by the synthetic engines.

pub(crate) fn rgb_to_yuv(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let (r, g, b) = (r as i32, g as i32, b as i32);
    let y = ((66 * r + 129 * g + 25 * b + 128) >> 8) + 16;
    let u = ((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128;
    let v = ((112 * r - 94 * g - 18 * b + 128) >> 8) + 128;
    (clamp(y), clamp(u), clamp(v))
}

pub(crate) fn yuv_to_rgb(y: u8, u: u8, v: u8) -> (u8, u8, u8) {
    let c = y as i32 - 16;
    let d = u as i32 - 128;
    let e = v as i32 - 128;
    let r = (298 * c + 409 * e + 128) >> 8;
    let g = (298 * c - 100 * d - 208 * e + 128) >> 8;
    let b = (298 * c + 516 * d + 128) >> 8;
    (clamp(r), clamp(g), clamp(b))
}

/// Bytes per row of a packed 4:2:2 picture. An odd last pixel still takes a
/// full macropixel.
pub(crate) fn uyvy_stride(width: usize) -> usize {
    width.div_ceil(2) * 4
}

/// Packs tightly packed RGB24 into UYVY422, averaging chroma over pixel pairs.
pub(crate) fn rgb_to_uyvy(rgb: &[u8], width: usize, height: usize, out: &mut Vec<u8>) {
    let stride = uyvy_stride(width);
    out.clear();
    out.resize(stride * height, 0);
    for row in 0..height {
        let src = &rgb[row * width * 3..(row + 1) * width * 3];
        let dst = &mut out[row * stride..(row + 1) * stride];
        for (pair, macropixel) in dst.chunks_exact_mut(4).enumerate() {
            let left = pair * 2;
            let right = (left + 1).min(width - 1);
            let (y0, u0, v0) = rgb_to_yuv(src[left * 3], src[left * 3 + 1], src[left * 3 + 2]);
            let (y1, u1, v1) =
                rgb_to_yuv(src[right * 3], src[right * 3 + 1], src[right * 3 + 2]);
            macropixel[0] = ((u0 as u16 + u1 as u16 + 1) / 2) as u8;
            macropixel[1] = y0;
            macropixel[2] = ((v0 as u16 + v1 as u16 + 1) / 2) as u8;
            macropixel[3] = y1;
        }
    }
}

/// Unpacks UYVY422 into rgb0 rows `dest_stride` bytes apart. The padding
/// byte is written as 255.
pub(crate) fn uyvy_to_rgb0(
    src: &[u8],
    width: usize,
    height: usize,
    dest: &mut [u8],
    dest_stride: usize,
) {
    let src_stride = uyvy_stride(width);
    for row in 0..height {
        let line = &src[row * src_stride..(row + 1) * src_stride];
        let out = &mut dest[row * dest_stride..row * dest_stride + width * 4];
        for (x, px) in out.chunks_exact_mut(4).enumerate() {
            let macropixel = &line[(x / 2) * 4..(x / 2) * 4 + 4];
            let y = if x % 2 == 0 { macropixel[1] } else { macropixel[3] };
            let (r, g, b) = yuv_to_rgb(y, macropixel[0], macropixel[2]);
            px.copy_from_slice(&[r, g, b, 255]);
        }
    }
}

fn clamp(value: i32) -> u8 {
    value.clamp(0, 255) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::white((255, 255, 255), (235, 128, 128))]
    #[case::black((0, 0, 0), (16, 128, 128))]
    fn test_rgb_to_yuv_extremes(#[case] rgb: (u8, u8, u8), #[case] expected: (u8, u8, u8)) {
        assert_eq!(rgb_to_yuv(rgb.0, rgb.1, rgb.2), expected);
    }

    #[test]
    fn test_video_white_and_black_expand_to_full_range() {
        assert_eq!(yuv_to_rgb(235, 128, 128), (255, 255, 255));
        assert_eq!(yuv_to_rgb(16, 128, 128), (0, 0, 0));
    }

    #[test]
    fn test_uyvy_stride_rounds_up() {
        assert_eq!(uyvy_stride(4), 8);
        assert_eq!(uyvy_stride(5), 12);
    }

    #[test]
    fn test_saturated_red_stays_red() {
        let mut uyvy = Vec::new();
        rgb_to_uyvy(&[255, 0, 0, 255, 0, 0], 2, 1, &mut uyvy);
        let mut rgb0 = [0u8; 8];
        uyvy_to_rgb0(&uyvy, 2, 1, &mut rgb0, 8);
        assert!(rgb0[0] > 240, "red channel was {}", rgb0[0]);
        assert!(rgb0[1] < 15 && rgb0[2] < 15);
        assert_eq!(rgb0[3], 255);
    }

    #[test]
    fn test_odd_width_and_padded_destination() {
        let rgb = vec![200u8; 3 * 3 * 2];
        let mut uyvy = Vec::new();
        rgb_to_uyvy(&rgb, 3, 2, &mut uyvy);
        assert_eq!(uyvy.len(), 8 * 2);

        let mut dest = vec![7u8; 16 * 2];
        uyvy_to_rgb0(&uyvy, 3, 2, &mut dest, 16);
        // bytes past width * 4 in each row are left alone
        assert_eq!(&dest[12..16], &[7, 7, 7, 7]);
        assert!(dest[16..19].iter().all(|&c| (198..=202).contains(&c)));
    }
}
