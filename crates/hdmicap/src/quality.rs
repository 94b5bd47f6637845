// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 hdmicap developers

//! Quality factor to bitrate mapping.
//!
//! The encoder's bitrate attribute is in kbit/s. A factor of 0 gives 512 and
//! a factor of 1 gives 2000 at 1080p; other resolutions scale by pixel count.

use std::sync::atomic::{AtomicU32, Ordering};

const LOW: f32 = 512.0;
const HIGH: f32 = 2000.0;
const REFERENCE_PIXELS: u64 = 1920 * 1080;
const MIN_BITRATE: u32 = 100;

/// Target bitrate for a quality factor at the given resolution.
///
/// Both steps truncate toward zero. The result never drops below 100.
pub fn bitrate(factor: f32, width: u32, height: u32) -> u32 {
    let base = LOW as i64 + ((HIGH - LOW) * factor) as i64;
    let base = base.max(0) as u64;
    let pixels = u64::from(width) * u64::from(height);
    let scaled = base * pixels / REFERENCE_PIXELS;
    u32::try_from(scaled).unwrap_or(u32::MAX).max(MIN_BITRATE)
}

/// The VBR ceiling passed alongside [`bitrate`].
pub fn max_bitrate(bitrate: u32) -> u32 {
    bitrate.saturating_mul(2)
}

/// Clamp a caller-supplied factor into `[0, 1]`; NaN means full quality.
pub fn clamp_factor(factor: f32) -> f32 {
    if factor.is_nan() {
        1.0
    } else {
        factor.clamp(0.0, 1.0)
    }
}

/// The process-wide quality factor, read at every session start.
#[derive(Debug)]
pub struct QualityFactor(AtomicU32);

impl QualityFactor {
    pub fn new(factor: f32) -> Self {
        QualityFactor(AtomicU32::new(clamp_factor(factor).to_bits()))
    }

    pub fn get(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::SeqCst))
    }

    /// Store a new factor, returning the clamped value actually stored.
    pub fn set(&self, factor: f32) -> f32 {
        let factor = clamp_factor(factor);
        self.0.store(factor.to_bits(), Ordering::SeqCst);
        factor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn endpoints_at_1080p() {
        assert_eq!(bitrate(0.0, 1920, 1080), 512);
        assert_eq!(bitrate(1.0, 1920, 1080), 2000);
        assert_eq!(bitrate(0.5, 1920, 1080), 1256);
    }

    #[test]
    fn scales_with_pixel_count() {
        assert_eq!(bitrate(1.0, 3840, 2160), 8000);
        assert_eq!(bitrate(1.0, 1280, 720), 888);
        assert_eq!(bitrate(0.0, 960, 540), 128);
    }

    #[test]
    fn floored_at_minimum() {
        assert_eq!(bitrate(0.0, 640, 480), 100);
        assert_eq!(bitrate(1.0, 1, 1), 100);
        assert_eq!(bitrate(0.0, 0, 0), 100);
    }

    #[test]
    fn monotonic_in_factor() {
        let mut rng = rand::rng();
        for _ in 0..200 {
            let width = rng.random_range(1..=3840);
            let height = rng.random_range(1..=2160);
            let a: f32 = rng.random_range(0.0..=1.0);
            let b: f32 = rng.random_range(0.0..=1.0);
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            assert!(
                bitrate(lo, width, height) <= bitrate(hi, width, height),
                "factor {} vs {} at {}x{}",
                lo,
                hi,
                width,
                height
            );
        }
    }

    #[test]
    fn max_is_double() {
        assert_eq!(max_bitrate(2000), 4000);
        assert_eq!(max_bitrate(u32::MAX), u32::MAX);
    }

    #[test]
    fn stored_factor_is_clamped() {
        let quality = QualityFactor::new(3.0);
        assert_eq!(quality.get(), 1.0);
        assert_eq!(quality.set(0.25), 0.25);
        assert_eq!(quality.get(), 0.25);
        assert_eq!(quality.set(-1.0), 0.0);
        assert_eq!(quality.get(), 0.0);
    }

    #[test]
    fn clamping() {
        assert_eq!(clamp_factor(-0.5), 0.0);
        assert_eq!(clamp_factor(1.5), 1.0);
        assert_eq!(clamp_factor(0.3), 0.3);
        assert_eq!(clamp_factor(f32::NAN), 1.0);
        assert_eq!(clamp_factor(f32::INFINITY), 1.0);
    }
}
