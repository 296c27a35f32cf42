//! Frame type and pixel conversion — YUYV to RGB, dark-frame detection.

/// A captured RGB8 camera frame.
#[derive(Clone)]
pub struct Frame {
    /// Interleaved RGB8 pixel data (width * height * 3 bytes).
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: std::time::Instant,
    pub sequence: u32,
    pub is_dark: bool,
}

impl Frame {
    /// Average luma (0.0–255.0), Rec. 601 weights.
    pub fn avg_luma(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        let total: f64 = self
            .data
            .chunks_exact(3)
            .map(|px| luma(px[0], px[1], px[2]) as f64)
            .sum();
        (total / (self.data.len() / 3) as f64) as f32
    }
}

/// Rec. 601 luma of one RGB pixel.
fn luma(r: u8, g: u8, b: u8) -> f32 {
    0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid YUYV length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

/// Convert packed YUYV (4:2:2) to interleaved RGB8.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V], with U/V shared by
/// the pixel pair. Uses the BT.601 studio-swing conversion.
pub fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = (width * height * 2) as usize;
    if yuyv.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: yuyv.len(),
        });
    }

    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    for quad in yuyv[..expected].chunks_exact(4) {
        let (y0, u, y1, v) = (quad[0], quad[1], quad[2], quad[3]);
        push_pixel(&mut rgb, y0, u, v);
        push_pixel(&mut rgb, y1, u, v);
    }
    Ok(rgb)
}

fn push_pixel(rgb: &mut Vec<u8>, y: u8, u: u8, v: u8) {
    let c = y as f32 - 16.0;
    let d = u as f32 - 128.0;
    let e = v as f32 - 128.0;

    let r = 1.164 * c + 1.596 * e;
    let g = 1.164 * c - 0.392 * d - 0.813 * e;
    let b = 1.164 * c + 2.017 * d;

    rgb.push(r.round().clamp(0.0, 255.0) as u8);
    rgb.push(g.round().clamp(0.0, 255.0) as u8);
    rgb.push(b.round().clamp(0.0, 255.0) as u8);
}

/// Check whether an RGB8 frame is dark.
///
/// Returns true if more than `threshold_pct` of pixels have luma below 32 —
/// a lens cap, a covered camera, or an unlit room. Dark frames are skipped
/// rather than fed to the detector.
pub fn is_dark_frame(rgb: &[u8], threshold_pct: f32) -> bool {
    let pixels = rgb.len() / 3;
    if pixels == 0 {
        return true;
    }
    let dark_count = rgb
        .chunks_exact(3)
        .filter(|px| luma(px[0], px[1], px[2]) < 32.0)
        .count();
    (dark_count as f32 / pixels as f32) > threshold_pct
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yuyv_to_rgb_gray_pixels() {
        // U = V = 128 means no chroma: output should be near-gray.
        // Y=128 → c=112, r=g=b ≈ 130.
        let yuyv = vec![128, 128, 128, 128];
        let rgb = yuyv_to_rgb(&yuyv, 2, 1).unwrap();
        assert_eq!(rgb.len(), 6);
        for &channel in &rgb {
            assert!((128i16 - channel as i16).abs() <= 3, "got {channel}");
        }
    }

    #[test]
    fn test_yuyv_to_rgb_black_and_white() {
        // Y=16 is studio black; Y=235 is studio white.
        let yuyv = vec![16, 128, 235, 128];
        let rgb = yuyv_to_rgb(&yuyv, 2, 1).unwrap();
        assert_eq!(&rgb[0..3], &[0, 0, 0]);
        for &channel in &rgb[3..6] {
            assert!(channel >= 250, "got {channel}");
        }
    }

    #[test]
    fn test_yuyv_to_rgb_invalid_length() {
        let yuyv = vec![100, 128]; // too short for 2x1
        assert!(yuyv_to_rgb(&yuyv, 2, 1).is_err());
    }

    #[test]
    fn test_dark_frame_all_black() {
        let rgb = vec![0u8; 300];
        assert!(is_dark_frame(&rgb, 0.95));
    }

    #[test]
    fn test_dark_frame_normal() {
        let rgb = vec![128u8; 300];
        assert!(!is_dark_frame(&rgb, 0.95));
    }

    #[test]
    fn test_dark_frame_empty() {
        assert!(is_dark_frame(&[], 0.95));
    }

    #[test]
    fn test_dark_frame_mostly_dark() {
        // 96% dark, 4% bright → dark.
        let mut rgb = vec![10u8; 960 * 3];
        rgb.extend(vec![128u8; 40 * 3]);
        assert!(is_dark_frame(&rgb, 0.95));
    }

    #[test]
    fn test_dark_frame_borderline_bright() {
        // 94% dark, 6% bright → not dark.
        let mut rgb = vec![10u8; 940 * 3];
        rgb.extend(vec![128u8; 60 * 3]);
        assert!(!is_dark_frame(&rgb, 0.95));
    }

    #[test]
    fn test_avg_luma_flat_frame() {
        let frame = Frame {
            data: vec![100u8; 30],
            width: 5,
            height: 2,
            timestamp: std::time::Instant::now(),
            sequence: 0,
            is_dark: false,
        };
        assert!((frame.avg_luma() - 100.0).abs() < 0.5);
    }
}
