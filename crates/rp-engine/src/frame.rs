//! Audio frame type.

/// A stereo audio frame (16-bit integer).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Frame {
    pub left: i16,
    pub right: i16,
}

impl Frame {
    /// Create a silent frame.
    pub const fn silence() -> Self {
        Self { left: 0, right: 0 }
    }

    /// Create a mono frame (same value for both channels).
    pub const fn mono(value: i16) -> Self {
        Self {
            left: value,
            right: value,
        }
    }

    /// Build a frame from wide accumulators, saturating each side.
    pub fn saturating(left: i32, right: i32) -> Self {
        Self {
            left: left.clamp(i16::MIN as i32, i16::MAX as i32) as i16,
            right: right.clamp(i16::MIN as i32, i16::MAX as i32) as i16,
        }
    }

    /// Mix another frame into this one.
    pub fn mix(&mut self, other: Frame) {
        *self = Self::saturating(
            self.left as i32 + other.left as i32,
            self.right as i32 + other.right as i32,
        );
    }

    /// True when both sides are zero.
    pub fn is_silent(&self) -> bool {
        self.left == 0 && self.right == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saturating_clamps_both_sides() {
        let f = Frame::saturating(40_000, -40_000);
        assert_eq!(f, Frame { left: 32767, right: -32768 });
    }

    #[test]
    fn mix_saturates() {
        let mut f = Frame::mono(30_000);
        f.mix(Frame::mono(30_000));
        assert_eq!(f, Frame::mono(32767));
    }
}
