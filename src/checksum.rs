//! Weak rolling checksum used to find candidate block matches.
//!
//! This module implements the Adler-32 style checksum from Tridgell's rsync
//! thesis with modulus `2^16`, which allows O(1) window sliding so a candidate
//! document can be scanned in a single pass.

/// Weak checksum state over a byte window.
///
/// # Algorithm
///
/// For a window `d[0..L]`:
/// - `a`: sum of all bytes (mod 2^16)
/// - `b`: sum of the running sums of `a`, i.e. `sum((L - k) * d[k])` (mod 2^16)
///
/// The combined value is `(b << 16) | a`, and the 16-bit bucket key is the
/// combined value reduced mod 2^16.
///
/// # Example
///
/// ```rust
/// use docdelta::WeakChecksum;
///
/// let mut rolling = WeakChecksum::compute(b"hello");
/// rolling.roll(b'h', b'!'); // "ello!"
/// assert_eq!(rolling, WeakChecksum::compute(b"ello!"));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WeakChecksum {
    a: u16,
    b: u16,
    /// Window length the state was computed over
    len: usize,
}

impl WeakChecksum {
    /// Compute the checksum of a window from scratch.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn compute(window: &[u8]) -> Self {
        let mut a: u16 = 0;
        let mut b: u16 = 0;

        for &byte in window {
            a = a.wrapping_add(u16::from(byte));
            b = b.wrapping_add(a);
        }

        Self {
            a,
            b,
            len: window.len(),
        }
    }

    /// Rebuild a checksum from previously computed components.
    #[must_use]
    pub const fn from_parts(a: u16, b: u16, len: usize) -> Self {
        Self { a, b, len }
    }

    /// Slide the window forward by one byte in O(1).
    ///
    /// `dropped` is the byte leaving the front of the window and `added` the
    /// byte entering at the back. The window length does not change, so this
    /// is only valid while the next window is still full-size.
    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    pub fn roll(&mut self, dropped: u8, added: u8) {
        let dropped = u16::from(dropped);
        // Weights only matter mod 2^16, so truncating the length is exact
        let weight = self.len as u16;

        self.a = self.a.wrapping_sub(dropped).wrapping_add(u16::from(added));
        self.b = self
            .b
            .wrapping_sub(weight.wrapping_mul(dropped))
            .wrapping_add(self.a);
    }

    /// `(a, b, combined)` components.
    #[inline]
    #[must_use]
    pub const fn parts(&self) -> (u16, u16, u32) {
        (self.a, self.b, self.combined())
    }

    /// Sum component.
    #[inline]
    #[must_use]
    pub const fn a(&self) -> u16 {
        self.a
    }

    /// Weighted-sum component.
    #[inline]
    #[must_use]
    pub const fn b(&self) -> u16 {
        self.b
    }

    /// Combined 32-bit value `(b << 16) | a`.
    #[inline]
    #[must_use]
    pub const fn combined(&self) -> u32 {
        ((self.b as u32) << 16) | self.a as u32
    }

    /// 16-bit bucket key.
    #[inline]
    #[must_use]
    pub const fn hash16(&self) -> u16 {
        hash16(self.combined())
    }

    /// Window length.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Check if the window is empty.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Reduce a combined weak checksum to its 16-bit bucket key.
#[inline]
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub const fn hash16(combined: u32) -> u16 {
    (combined % 65536) as u16
}

/// Roll raw `(a, b)` components forward by one byte.
///
/// Equivalent to [`WeakChecksum::roll`] for callers that only persist the
/// components.
#[must_use]
pub fn roll_parts(a: u16, b: u16, dropped: u8, added: u8, window_len: usize) -> (u16, u16) {
    let mut state = WeakChecksum::from_parts(a, b, window_len);
    state.roll(dropped, added);
    (state.a, state.b)
}
