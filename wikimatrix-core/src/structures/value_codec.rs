//! Linear 16-bit quantization of relatedness scores
//!
//! A score `v` is stored as `code = round((v - c2) / c1)` and restored as
//! `c1 * code + c2`. Codecs derived from a range spread that range over the
//! whole `i16` domain, so the restored value is within `c1 / 2` of the clipped
//! input.

use serde::{Deserialize, Serialize};

/// Lowest score the default codec can represent
pub const MIN_SCORE: f32 = -1.1;

/// Highest score the default codec can represent
pub const MAX_SCORE: f32 = 1.1;

/// Number of distinct steps in the packed domain
pub const PACKED_RANGE: f64 = (i16::MAX as i32 - i16::MIN as i32) as f64;

/// Quantizer mapping `f32` scores to `i16` codes and back
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueCodec {
    c1: f64,
    c2: f64,
}

impl Default for ValueCodec {
    fn default() -> Self {
        Self::from_range(MIN_SCORE, MAX_SCORE)
    }
}

impl ValueCodec {
    /// Create a codec from explicit parameters.
    ///
    /// A non-positive or non-finite `c1` is replaced by 1.0 so that `pack`
    /// never divides by zero.
    pub fn new(c1: f64, c2: f64) -> Self {
        let c1 = if c1.is_finite() && c1 > 0.0 { c1 } else { 1.0 };
        let c2 = if c2.is_finite() { c2 } else { 0.0 };
        Self { c1, c2 }
    }

    /// Spread `[min, max]` over the full `i16` domain
    pub fn from_range(min: f32, max: f32) -> Self {
        let (lo, hi) = if min <= max { (min, max) } else { (max, min) };
        let range = hi as f64 - lo as f64;
        if range < f32::EPSILON as f64 {
            // Degenerate range: unit steps with `lo` at code 0.
            return Self::new(1.0, lo as f64);
        }
        let c1 = range / PACKED_RANGE;
        let c2 = lo as f64 - c1 * i16::MIN as f64;
        Self::new(c1, c2)
    }

    /// Derive a codec from the observed range of `values`.
    ///
    /// Falls back to the default codec when no finite values are present.
    pub fn fit<I: IntoIterator<Item = f32>>(values: I) -> Self {
        let mut min = f32::INFINITY;
        let mut max = f32::NEG_INFINITY;
        for v in values.into_iter().filter(|v| v.is_finite()) {
            min = min.min(v);
            max = max.max(v);
        }
        if min > max {
            Self::default()
        } else {
            Self::from_range(min, max)
        }
    }

    #[inline]
    pub fn c1(&self) -> f64 {
        self.c1
    }

    #[inline]
    pub fn c2(&self) -> f64 {
        self.c2
    }

    /// Smallest representable score
    pub fn min_value(&self) -> f32 {
        self.unpack(i16::MIN)
    }

    /// Largest representable score
    pub fn max_value(&self) -> f32 {
        self.unpack(i16::MAX)
    }

    /// Maximum absolute error introduced by `pack` followed by `unpack` for
    /// values inside `[min_value, max_value]`.
    pub fn epsilon(&self) -> f32 {
        (self.c1 / 2.0) as f32
    }

    /// Quantize a score. Out-of-range values are clipped, NaN packs to the
    /// code closest to zero.
    #[inline]
    pub fn pack(&self, value: f32) -> i16 {
        let v = value as f64;
        if v.is_nan() {
            return self.pack(0.0);
        }
        let code = ((v - self.c2) / self.c1).round();
        code.clamp(i16::MIN as f64, i16::MAX as f64) as i16
    }

    #[inline]
    pub fn unpack(&self, code: i16) -> f32 {
        (self.c1 * code as f64 + self.c2) as f32
    }

    /// Re-quantize a code produced by `other` into this codec
    #[inline]
    pub fn transcode(&self, code: i16, other: &ValueCodec) -> i16 {
        if self.almost_eq(other) {
            code
        } else {
            self.pack(other.unpack(code))
        }
    }

    /// True when both codecs produce the same codes for every score
    pub fn almost_eq(&self, other: &ValueCodec) -> bool {
        let tolerance = self.c1.min(other.c1) * 1e-6;
        (self.c1 - other.c1).abs() <= tolerance && (self.c2 - other.c2).abs() <= tolerance
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_codec_bounds() {
        let codec = ValueCodec::default();
        assert!((codec.min_value() - MIN_SCORE).abs() < 1e-6);
        assert!((codec.max_value() - MAX_SCORE).abs() < 1e-6);
        assert_eq!(codec.pack(MIN_SCORE), i16::MIN);
        assert_eq!(codec.pack(MAX_SCORE), i16::MAX);
    }

    #[test]
    fn test_quantization_error_bound() {
        let codec = ValueCodec::default();
        let mut v = MIN_SCORE;
        while v <= MAX_SCORE {
            let restored = codec.unpack(codec.pack(v));
            assert!(
                (restored - v).abs() <= codec.epsilon() + 1e-6,
                "value {} restored as {}",
                v,
                restored
            );
            v += 0.0137;
        }
    }

    #[test]
    fn test_clipping() {
        let codec = ValueCodec::default();
        assert_eq!(codec.pack(5.0), i16::MAX);
        assert_eq!(codec.pack(-5.0), i16::MIN);
        assert_eq!(codec.pack(f32::INFINITY), i16::MAX);
        assert_eq!(codec.pack(f32::NEG_INFINITY), i16::MIN);
        assert_eq!(codec.pack(f32::NAN), codec.pack(0.0));
    }

    #[test]
    fn test_monotonic() {
        let codec = ValueCodec::from_range(0.0, 10.0);
        let mut last = i16::MIN;
        for i in 0..=1000 {
            let code = codec.pack(i as f32 / 100.0);
            assert!(code >= last);
            last = code;
        }
    }

    #[test]
    fn test_degenerate_range() {
        let codec = ValueCodec::from_range(0.5, 0.5);
        assert_eq!(codec.unpack(codec.pack(0.5)), 0.5);
        assert_eq!(codec.pack(0.5), 0);
    }

    #[test]
    fn test_fit_and_transcode() {
        let codec = ValueCodec::fit([3.0, -2.0, 7.5, f32::NAN]);
        assert!((codec.min_value() + 2.0).abs() < 1e-4);
        assert!((codec.max_value() - 7.5).abs() < 1e-4);

        let default = ValueCodec::default();
        let code = default.pack(0.25);
        let moved = codec.transcode(code, &default);
        assert!((codec.unpack(moved) - 0.25).abs() <= codec.epsilon() + default.epsilon() + 1e-6);
        assert_eq!(default.transcode(code, &default), code);
        assert!(!codec.almost_eq(&default));
        assert!(ValueCodec::fit(std::iter::empty()).almost_eq(&default));
    }
}
