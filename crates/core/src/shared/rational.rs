use std::fmt;

use serde::{Deserialize, Serialize};

/// A rational number, used for stream time-bases and pixel aspect ratios.
///
/// One timestamp unit of a stream lasts `num / den` seconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rational {
    pub num: i32,
    pub den: i32,
}

impl Rational {
    pub const fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    /// `0/1`, the "unknown" value for aspect ratios.
    pub const fn unknown() -> Self {
        Self { num: 0, den: 1 }
    }

    pub fn is_unknown(&self) -> bool {
        self.num == 0 || self.den == 0
    }

    pub fn as_f64(&self) -> f64 {
        if self.den == 0 {
            0.0
        } else {
            self.num as f64 / self.den as f64
        }
    }

    /// Converts a timestamp in units of this time-base to seconds.
    pub fn seconds(&self, timestamp: i64) -> f64 {
        timestamp as f64 * self.as_f64()
    }

    /// Returns `self`, or `0/1` when the ratio carries no information.
    pub fn or_unknown(self) -> Self {
        if self.is_unknown() {
            Self::unknown()
        } else {
            self
        }
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

impl From<ffmpeg_next::Rational> for Rational {
    fn from(value: ffmpeg_next::Rational) -> Self {
        Self::new(value.numerator(), value.denominator())
    }
}

impl From<Rational> for ffmpeg_next::Rational {
    fn from(value: Rational) -> Self {
        ffmpeg_next::Rational(value.num, value.den)
    }
}
