//! Size specs passed down during measurement

use std::fmt;

/// How a [`SizeSpec`] constrains the measured dimension.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SizeMode {
    /// The parent imposes nothing; the child picks its own size.
    Unspecified,
    /// The child must be exactly `size`.
    Exactly,
    /// The child may be as large as it wants up to `size`.
    AtMost,
}

/// A single-axis measurement constraint: a mode plus a size.
///
/// `Unspecified` specs always carry a size of `0` so that two unspecified
/// specs compare equal regardless of how they were produced.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SizeSpec {
    mode: SizeMode,
    size: i32,
}

impl SizeSpec {
    pub const UNSPECIFIED: SizeSpec = SizeSpec {
        mode: SizeMode::Unspecified,
        size: 0,
    };

    /// Creates a spec that forces the given size.
    pub fn exactly(size: i32) -> Self {
        Self {
            mode: SizeMode::Exactly,
            size: size.max(0),
        }
    }

    /// Creates a spec bounded from above by the given size.
    pub fn at_most(size: i32) -> Self {
        Self {
            mode: SizeMode::AtMost,
            size: size.max(0),
        }
    }

    pub fn unspecified() -> Self {
        Self::UNSPECIFIED
    }

    #[inline]
    pub fn mode(self) -> SizeMode {
        self.mode
    }

    #[inline]
    pub fn size(self) -> i32 {
        self.size
    }

    /// Resolves a content size against this spec.
    pub fn resolve(self, content: i32) -> i32 {
        match self.mode {
            SizeMode::Exactly => self.size,
            SizeMode::AtMost => content.clamp(0, self.size),
            SizeMode::Unspecified => content.max(0),
        }
    }

    /// Removes `amount` (padding, margins) from the available size.
    ///
    /// Unspecified specs are unaffected; bounded specs never go below zero.
    pub fn shrink(self, amount: i32) -> Self {
        match self.mode {
            SizeMode::Unspecified => self,
            mode => Self {
                mode,
                size: self.size.saturating_sub(amount).max(0),
            },
        }
    }

    /// Turns an exact spec into an upper bound of the same size.
    pub fn loosen(self) -> Self {
        match self.mode {
            SizeMode::Exactly => Self::at_most(self.size),
            _ => self,
        }
    }
}

impl Default for SizeSpec {
    fn default() -> Self {
        Self::UNSPECIFIED
    }
}

impl fmt::Debug for SizeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mode {
            SizeMode::Unspecified => f.write_str("UNSPECIFIED"),
            SizeMode::Exactly => write!(f, "EXACTLY {}", self.size),
            SizeMode::AtMost => write!(f, "AT_MOST {}", self.size),
        }
    }
}

impl fmt::Display for SizeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Decides whether a measurement taken under `old_spec`, which produced
/// `old_measured`, is still valid under `new_spec`.
///
/// The rule:
/// - identical specs are always compatible;
/// - an exact new spec is compatible when it equals the old measured size;
/// - an old unspecified spec is compatible with a new upper bound the old
///   measurement still fits in;
/// - two upper bounds are compatible when the new one is tighter but still
///   at least the old measurement.
pub fn is_size_spec_compatible(old_spec: SizeSpec, new_spec: SizeSpec, old_measured: i32) -> bool {
    if old_spec == new_spec {
        return true;
    }
    match (old_spec.mode, new_spec.mode) {
        (_, SizeMode::Exactly) => new_spec.size == old_measured,
        (SizeMode::Unspecified, SizeMode::AtMost) => new_spec.size >= old_measured,
        (SizeMode::AtMost, SizeMode::AtMost) => {
            old_spec.size > new_spec.size && old_measured <= new_spec.size
        }
        _ => false,
    }
}

#[cfg(test)]
#[path = "tests/size_spec_tests.rs"]
mod tests;
