//! Native <-> wire byte order.
//!
//! The wire is Big Endian. Conversion is a byte reversal on little-endian
//! hosts and the identity on big-endian hosts, so applying it twice always
//! yields the original bytes. Host order is resolved at compile time; the only
//! branch per call is on that constant.

/// True when the host stores multi-byte values most significant byte first.
pub const NATIVE_IS_BIG_ENDIAN: bool = cfg!(target_endian = "big");

/// Convert `N` native-order bytes to wire order.
///
/// `N` must be 1, 2, 4 or 8. One byte needs no conversion.
#[inline]
#[must_use]
pub const fn to_wire<const N: usize>(native: [u8; N]) -> [u8; N] {
    const { assert!(N == 1 || N == 2 || N == 4 || N == 8, "wire widths are 1, 2, 4 or 8 bytes") };

    if NATIVE_IS_BIG_ENDIAN || N == 1 {
        return native;
    }

    let mut out = [0u8; N];
    let mut i = 0;
    while i < N {
        out[i] = native[N - 1 - i];
        i += 1;
    }
    out
}

/// Convert `N` wire-order bytes to native order.
///
/// The inverse of [`to_wire`], which is its own inverse.
#[inline]
#[must_use]
pub const fn from_wire<const N: usize>(wire: [u8; N]) -> [u8; N] {
    to_wire(wire)
}
