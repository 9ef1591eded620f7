//! Deterministic Q31.32 Fixed-Point Scalar
//!
//! The numeric foundation of the engine. Every quantity that can affect
//! simulation outcome is a [`Fix64`]: a signed 64-bit integer interpreted as
//! `value = raw / 2^32`. All arithmetic is pure integer math, so the same
//! inputs produce the same bit patterns on x86, ARM, WASM, or anything else.
//!
//! # Overflow policies
//!
//! Operations that can overflow come in three tiers:
//!
//! - **Unchecked** (the plain operators): wrap per 64-bit two's-complement
//!   semantics. Fastest; for hot inner loops where range is externally
//!   guaranteed.
//! - **Saturating** (`saturating_add` and friends): clamp to [`Fix64::MAX`] /
//!   [`Fix64::MIN`] with correct sign. For math on possibly-extreme inputs
//!   (inverses of near-zero components, error terms) where a wrong-signed
//!   wrap would be catastrophic.
//! - **Checked** (`checked_add` and friends): return `None` on overflow.
//!   Diagnostic tier, not used by the simulation pipeline.
//!
//! Division by zero returns [`Fix64::MAX`] regardless of sign; callers that
//! need zero-handling must guard explicitly.
//!
//! # Transcendentals
//!
//! All bit-reproducible, no lookup into platform libm:
//!
//! - `sqrt`: binary digit-by-digit (restoring) algorithm, exact at Q31.32
//! - `sin`/`cos`: quarter-period sample table built at compile time, with a
//!   linearly interpolated accurate tier and a nearest-sample fast tier
//! - `atan`/`atan2`: Euler-series accurate tier and a rational fast tier
//! - `log2`/`ln`/`exp2`/`pow`: Turner-style binary logarithm and binary
//!   fraction exponentiation

use core::fmt;
use core::ops::{Add, Div, Mul, Neg, Rem, Sub};

// ============================================================================
// Fix64 (Q31.32)
// ============================================================================

/// Q31.32 fixed-point number: a signed 64-bit raw value scaled by 2^32.
///
/// Range ±2.1 × 10^9, precision 2.3 × 10^-10. Ordering and hashing operate
/// on the raw integer, which agrees with numeric order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Fix64(i64);

/// Raw value of 1.0 (2^32), shared with the const table builders.
const ONE_RAW: i64 = 1 << 32;

impl Fix64 {
    /// Zero constant
    pub const ZERO: Self = Self(0);

    /// One (1.0)
    pub const ONE: Self = Self(ONE_RAW);

    /// Negative one (-1.0)
    pub const NEG_ONE: Self = Self(-ONE_RAW);

    /// One half (0.5)
    pub const HALF: Self = Self(1 << 31);

    /// Two (2.0)
    pub const TWO: Self = Self(2 << 32);

    /// Largest representable value (~2.147e9)
    pub const MAX: Self = Self(i64::MAX);

    /// Smallest representable value (~-2.147e9)
    pub const MIN: Self = Self(i64::MIN);

    /// Smallest positive increment (2^-32)
    pub const EPSILON: Self = Self(1);

    /// Pi, rounded to the nearest representable value
    pub const PI: Self = Self(0x3_243F_6A89);

    /// Pi / 2
    pub const HALF_PI: Self = Self(0x1_921F_B544);

    /// 2 * Pi
    pub const TWO_PI: Self = Self(0x6_487E_D511);

    /// Pi / 4
    pub const QUARTER_PI: Self = Self(0xC90F_DAA2);

    /// Euler's number e
    pub const E: Self = Self(0x2_B7E1_5163);

    /// ln(2)
    pub const LN2: Self = Self(0xB172_17F8);

    /// log2(e)
    pub const LOG2_E: Self = Self(0x1_7154_7653);

    // ------------------------------------------------------------------
    // Construction / conversion
    // ------------------------------------------------------------------

    /// Create from a raw Q31.32 bit pattern.
    #[inline]
    pub const fn from_raw(raw: i64) -> Self {
        Self(raw)
    }

    /// Raw Q31.32 bit pattern. This is what state hashes should consume.
    #[inline]
    pub const fn to_raw(self) -> i64 {
        self.0
    }

    /// Create from an integer.
    #[inline]
    pub const fn from_int(n: i32) -> Self {
        Self((n as i64) << 32)
    }

    /// Truncate toward zero to an integer.
    #[inline]
    pub const fn to_int(self) -> i64 {
        self.0 / ONE_RAW
    }

    /// Create from a fraction `num / denom` using exact integer math.
    ///
    /// `denom == 0` follows the division rule and returns [`Fix64::MAX`].
    pub const fn from_ratio(num: i64, denom: i64) -> Self {
        if denom == 0 {
            return Self::MAX;
        }
        Self((((num as i128) << 32) / denom as i128) as i64)
    }

    /// Create from an `f64`. Initialization/debugging only: float conversion
    /// is not part of the deterministic core and must never feed a value
    /// that affects simulation outcome mid-run.
    #[cfg(feature = "std")]
    pub fn from_f64(f: f64) -> Self {
        Self((f * ONE_RAW as f64) as i64)
    }

    /// Create from an `f32`. Same caveat as [`Fix64::from_f64`].
    #[cfg(feature = "std")]
    pub fn from_f32(f: f32) -> Self {
        Self::from_f64(f as f64)
    }

    /// Convert to `f64` for display/debugging only.
    #[cfg(feature = "std")]
    pub fn to_f64(self) -> f64 {
        self.0 as f64 / ONE_RAW as f64
    }

    /// Convert to `f32` for display/debugging only.
    #[cfg(feature = "std")]
    pub fn to_f32(self) -> f32 {
        self.to_f64() as f32
    }

    // ------------------------------------------------------------------
    // Predicates and sign helpers
    // ------------------------------------------------------------------

    /// Check if exactly zero.
    #[inline]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Check if strictly negative.
    #[inline]
    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Absolute value; `MIN` saturates to `MAX` so the result is never
    /// negative.
    #[inline]
    pub const fn abs(self) -> Self {
        if self.0 == i64::MIN {
            Self::MAX
        } else if self.0 < 0 {
            Self(-self.0)
        } else {
            self
        }
    }

    /// -1, 0, or +1 with the sign of the value.
    #[inline]
    pub const fn signum(self) -> Self {
        Self(self.0.signum() * ONE_RAW)
    }

    // ------------------------------------------------------------------
    // Rounding
    // ------------------------------------------------------------------

    /// Round toward negative infinity.
    #[inline]
    pub const fn floor(self) -> Self {
        Self(self.0 & !(ONE_RAW - 1))
    }

    /// Round toward positive infinity (wraps near `MAX`).
    #[inline]
    pub const fn ceil(self) -> Self {
        if self.0 & (ONE_RAW - 1) == 0 {
            self
        } else {
            Self(self.floor().0.wrapping_add(ONE_RAW))
        }
    }

    /// Round half away from zero.
    #[inline]
    pub const fn round(self) -> Self {
        if self.0 >= 0 {
            Self(self.0.wrapping_add(1 << 31)).floor()
        } else {
            Self(self.0.wrapping_sub(1 << 31)).ceil()
        }
    }

    /// Fractional part, `self - self.floor()`.
    #[inline]
    pub const fn frac(self) -> Self {
        Self(self.0 & (ONE_RAW - 1))
    }

    // ------------------------------------------------------------------
    // Exact shifts and small helpers
    // ------------------------------------------------------------------

    /// Divide by 2 (bit shift, exact).
    #[inline]
    pub const fn half(self) -> Self {
        Self(self.0 >> 1)
    }

    /// Multiply by 2 (bit shift, wrapping).
    #[inline]
    pub const fn double(self) -> Self {
        Self(self.0.wrapping_shl(1))
    }

    /// `self * self` with wrapping semantics.
    #[inline]
    pub fn squared(self) -> Self {
        self * self
    }

    /// `1 / self`; zero input returns [`Fix64::MAX`] per the division rule.
    #[inline]
    pub fn recip(self) -> Self {
        Self::ONE / self
    }

    // ------------------------------------------------------------------
    // Saturating tier
    // ------------------------------------------------------------------

    /// Addition clamping to `MAX`/`MIN` on overflow.
    #[inline]
    pub const fn saturating_add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }

    /// Subtraction clamping to `MAX`/`MIN` on overflow.
    #[inline]
    pub const fn saturating_sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }

    /// Multiplication clamping to `MAX`/`MIN` on overflow.
    pub const fn saturating_mul(self, rhs: Self) -> Self {
        let wide = (self.0 as i128 * rhs.0 as i128) >> 32;
        if wide > i64::MAX as i128 {
            Self::MAX
        } else if wide < i64::MIN as i128 {
            Self::MIN
        } else {
            Self(wide as i64)
        }
    }

    /// Division clamping to `MAX`/`MIN` on overflow; division by zero
    /// returns [`Fix64::MAX`].
    pub const fn saturating_div(self, rhs: Self) -> Self {
        if rhs.0 == 0 {
            return Self::MAX;
        }
        let wide = ((self.0 as i128) << 32) / rhs.0 as i128;
        if wide > i64::MAX as i128 {
            Self::MAX
        } else if wide < i64::MIN as i128 {
            Self::MIN
        } else {
            Self(wide as i64)
        }
    }

    // ------------------------------------------------------------------
    // Checked tier (diagnostics)
    // ------------------------------------------------------------------

    /// Addition returning `None` on overflow.
    #[inline]
    pub const fn checked_add(self, rhs: Self) -> Option<Self> {
        match self.0.checked_add(rhs.0) {
            Some(raw) => Some(Self(raw)),
            None => None,
        }
    }

    /// Subtraction returning `None` on overflow.
    #[inline]
    pub const fn checked_sub(self, rhs: Self) -> Option<Self> {
        match self.0.checked_sub(rhs.0) {
            Some(raw) => Some(Self(raw)),
            None => None,
        }
    }

    /// Multiplication returning `None` on overflow.
    pub const fn checked_mul(self, rhs: Self) -> Option<Self> {
        let wide = (self.0 as i128 * rhs.0 as i128) >> 32;
        if wide > i64::MAX as i128 || wide < i64::MIN as i128 {
            None
        } else {
            Some(Self(wide as i64))
        }
    }

    // ------------------------------------------------------------------
    // Square root
    // ------------------------------------------------------------------

    /// Square root via the binary digit-by-digit (restoring) algorithm.
    ///
    /// Exact: produces the correctly rounded Q31.32 root with no iteration
    /// count to tune and no table. Zero or negative input returns zero
    /// (negative input is a caller bug; handled totally rather than
    /// panicking, matching the degenerate-input policy).
    pub const fn sqrt(self) -> Self {
        Self(sqrt_raw(self.0))
    }

    // ------------------------------------------------------------------
    // Trigonometry
    // ------------------------------------------------------------------

    /// Sine, accurate tier: quarter-period table with linear interpolation.
    ///
    /// Absolute error is below 3e-7 over the full circle; exact at the
    /// quadrant boundaries (`sin 0 == 0`, `sin π/2 == 1`).
    #[inline]
    pub fn sin(self) -> Self {
        Self(sin_lookup(self.0, true))
    }

    /// Sine, fast tier: nearest-sample lookup, no interpolation.
    ///
    /// Absolute error up to ~8e-4. For throughput-sensitive callers that
    /// can tolerate the precision loss.
    #[inline]
    pub fn sin_fast(self) -> Self {
        Self(sin_lookup(self.0, false))
    }

    /// Cosine, accurate tier.
    #[inline]
    pub fn cos(self) -> Self {
        Self(sin_lookup(self.0.wrapping_add(Self::HALF_PI.0), true))
    }

    /// Cosine, fast tier.
    #[inline]
    pub fn cos_fast(self) -> Self {
        Self(sin_lookup(self.0.wrapping_add(Self::HALF_PI.0), false))
    }

    /// Simultaneous accurate sine and cosine.
    #[inline]
    pub fn sin_cos(self) -> (Self, Self) {
        (self.sin(), self.cos())
    }

    /// Tangent. Uses saturating division, so odd multiples of π/2 return
    /// values near the range ends instead of wrapping.
    pub fn tan(self) -> Self {
        let (s, c) = self.sin_cos();
        s.saturating_div(c)
    }

    /// Arctangent, accurate tier (Euler series with argument reduction).
    ///
    /// Absolute error below 2e-8 for all inputs.
    pub fn atan(self) -> Self {
        if self.0 > ONE_RAW {
            Self::HALF_PI - Self(atan_series(recip_raw(self.0)))
        } else if self.0 < -ONE_RAW {
            -Self::HALF_PI - Self(atan_series(-recip_raw(self.0.wrapping_neg())))
        } else {
            Self(atan_series(self.0))
        }
    }

    /// Four-quadrant arctangent, accurate tier.
    ///
    /// `atan2(0, 0) == 0`. Uses saturating division internally so extreme
    /// `y/x` ratios collapse toward ±π/2 rather than wrapping.
    pub fn atan2(y: Self, x: Self) -> Self {
        if x.is_zero() {
            return if y.0 > 0 {
                Self::HALF_PI
            } else if y.0 < 0 {
                -Self::HALF_PI
            } else {
                Self::ZERO
            };
        }
        let base = y.saturating_div(x).atan();
        if x.0 > 0 {
            base
        } else if y.0 >= 0 {
            base + Self::PI
        } else {
            base - Self::PI
        }
    }

    /// Four-quadrant arctangent, fast tier.
    ///
    /// Single-term rational approximation; absolute error up to ~5e-3 rad.
    pub fn atan2_fast(y: Self, x: Self) -> Self {
        if x.is_zero() {
            return if y.0 > 0 {
                Self::HALF_PI
            } else if y.0 < 0 {
                -Self::HALF_PI
            } else {
                Self::ZERO
            };
        }
        let z = y.saturating_div(x);
        let base = if z.abs() <= Self::ONE {
            atan_approx(z)
        } else {
            let inner = atan_approx(z.recip());
            if z.0 > 0 {
                Self::HALF_PI - inner
            } else {
                -Self::HALF_PI - inner
            }
        };
        if x.0 > 0 {
            base
        } else if y.0 >= 0 {
            base + Self::PI
        } else {
            base - Self::PI
        }
    }

    /// Arcsine; input is clamped to [-1, 1].
    pub fn asin(self) -> Self {
        let x = clamp_unit(self);
        let rest = (Self::ONE - x * x).sqrt();
        Self::atan2(x, rest)
    }

    /// Arccosine; input is clamped to [-1, 1].
    pub fn acos(self) -> Self {
        Self::HALF_PI - self.asin()
    }

    // ------------------------------------------------------------------
    // Logarithms and exponentials
    // ------------------------------------------------------------------

    /// Binary logarithm via Turner's method: normalize the mantissa into
    /// [1, 2), then extract one output bit per squaring. Zero or negative
    /// input returns [`Fix64::MIN`].
    pub fn log2(self) -> Self {
        if self.0 <= 0 {
            return Self::MIN;
        }
        let mut x = self.0;
        let mut y: i64 = 0;
        while x < ONE_RAW {
            x <<= 1;
            y -= ONE_RAW;
        }
        while x >= 2 * ONE_RAW {
            x >>= 1;
            y += ONE_RAW;
        }
        // x in [1, 2): 32 squarings produce the fractional bits.
        let mut bit: i64 = 1 << 31;
        let mut i = 0;
        while i < 32 {
            x = ((x as i128 * x as i128) >> 32) as i64;
            if x >= 2 * ONE_RAW {
                x >>= 1;
                y += bit;
            }
            bit >>= 1;
            i += 1;
        }
        Self(y)
    }

    /// Natural logarithm, `log2 * ln 2`. Zero or negative input returns
    /// [`Fix64::MIN`].
    pub fn ln(self) -> Self {
        if self.0 <= 0 {
            return Self::MIN;
        }
        self.log2() * Self::LN2
    }

    /// Base-2 exponential via binary-fraction products: multiply the
    /// factors `2^(2^-k)` selected by the fraction bits, then shift by the
    /// integer part. Saturates to `MAX` above 2^31 and underflows to zero.
    pub fn exp2(self) -> Self {
        if self.is_zero() {
            return Self::ONE;
        }
        let neg = self.0 < 0;
        let mag = if neg { self.0.wrapping_neg() } else { self.0 };
        if mag < 0 {
            // Magnitude of MIN is unrepresentable: 2^-2^31 underflows.
            return Self::ZERO;
        }
        let int_part = mag >> 32;
        let frac = (mag & (ONE_RAW - 1)) as u64;
        if !neg && int_part >= 31 {
            return Self::MAX;
        }
        if neg && int_part >= 63 {
            return Self::ZERO;
        }
        let mut acc: i128 = ONE_RAW as i128;
        let mut k = 0;
        while k < 32 {
            if frac & (1 << (31 - k)) != 0 {
                acc = (acc * EXP2_FRAC_TABLE[k] as i128) >> 32;
            }
            k += 1;
        }
        let result = acc << int_part;
        if neg {
            if result == 0 {
                return Self::MAX;
            }
            Self((((ONE_RAW as i128) << 32) / result) as i64)
        } else if result > i64::MAX as i128 {
            Self::MAX
        } else {
            Self(result as i64)
        }
    }

    /// `self` raised to `exp`, as `exp2(exp * log2 self)`.
    ///
    /// Defined for positive bases; `pow(0, y)` is zero for positive `y`,
    /// one for zero `y`, `MAX` for negative `y` (the `1/0` rule). Negative
    /// bases return zero.
    pub fn pow(self, exp: Self) -> Self {
        if exp.is_zero() {
            return Self::ONE;
        }
        if self.is_zero() {
            return if exp.is_negative() {
                Self::MAX
            } else {
                Self::ZERO
            };
        }
        if self.is_negative() {
            return Self::ZERO;
        }
        self.log2().saturating_mul(exp).exp2()
    }
}

#[inline]
const fn clamp_unit(x: Fix64) -> Fix64 {
    if x.0 > ONE_RAW {
        Fix64::ONE
    } else if x.0 < -ONE_RAW {
        Fix64::NEG_ONE
    } else {
        x
    }
}

/// `1/x` on raw values without saturation concerns (`x > ONE_RAW` only).
#[inline]
const fn recip_raw(raw: i64) -> i64 {
    (((ONE_RAW as i128) << 32) / raw as i128) as i64
}

// ============================================================================
// Operators (unchecked / wrapping tier)
// ============================================================================

impl Add for Fix64 {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self(self.0.wrapping_add(rhs.0))
    }
}

impl Sub for Fix64 {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self(self.0.wrapping_sub(rhs.0))
    }
}

impl Mul for Fix64 {
    type Output = Self;

    #[inline]
    fn mul(self, rhs: Self) -> Self {
        // Full i128 product, then drop the 32 fraction bits. Truncation is
        // toward negative infinity (arithmetic shift); wrapping on the final
        // narrowing is the unchecked-tier contract.
        Self(((self.0 as i128 * rhs.0 as i128) >> 32) as i64)
    }
}

impl Div for Fix64 {
    type Output = Self;

    #[inline]
    fn div(self, rhs: Self) -> Self {
        if rhs.0 == 0 {
            return Self::MAX;
        }
        Self((((self.0 as i128) << 32) / rhs.0 as i128) as i64)
    }
}

impl Rem for Fix64 {
    type Output = Self;

    #[inline]
    fn rem(self, rhs: Self) -> Self {
        if rhs.0 == 0 {
            return Self::ZERO;
        }
        Self(self.0.wrapping_rem(rhs.0))
    }
}

impl Neg for Fix64 {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Self(self.0.wrapping_neg())
    }
}

impl fmt::Display for Fix64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Deterministic decimal rendering with six fraction digits, all
        // integer math so Display works identically under no_std.
        let raw = self.0;
        let neg = raw < 0;
        let mag = raw.unsigned_abs();
        let int_part = mag >> 32;
        let frac_digits = ((mag & (ONE_RAW as u64 - 1)) as u128 * 1_000_000) >> 32;
        if neg {
            write!(f, "-{int_part}.{frac_digits:06}")
        } else {
            write!(f, "{int_part}.{frac_digits:06}")
        }
    }
}

// ============================================================================
// Digit-by-digit square root
// ============================================================================

/// Restoring shift-subtract square root on the raw representation. Runs the
/// standard integer algorithm twice: once for the integer bits, once more
/// after promoting the remainder for the 32 fraction bits.
const fn sqrt_raw(raw: i64) -> i64 {
    if raw <= 0 {
        return 0;
    }
    let mut num = raw as u64;
    let mut result: u64 = 0;
    let mut bit: u64 = 1 << 62;
    while bit > num {
        bit >>= 2;
    }
    let mut pass = 0;
    while pass < 2 {
        while bit != 0 {
            if num >= result + bit {
                num -= result + bit;
                result = (result >> 1) + bit;
            } else {
                result >>= 1;
            }
            bit >>= 2;
        }
        if pass == 0 {
            // Promote the remainder to cover the fraction bits. The shifted
            // path would overflow for large remainders, so fold half of the
            // next bit in ahead of time.
            if num > (1 << 32) - 1 {
                num -= result;
                num = (num << 32) - 0x8000_0000;
                result = (result << 32) + 0x8000_0000;
            } else {
                num <<= 32;
                result <<= 32;
            }
            bit = 1 << 30;
        }
        pass += 1;
    }
    // Final rounding of the last computed digit.
    if num > result {
        result += 1;
    }
    result as i64
}

// ============================================================================
// Quarter-period sine table
// ============================================================================

/// Number of intervals over [0, π/2].
const SIN_INTERVALS: usize = 1024;

/// Samples of sin over one quarter period, Q31.32, built at compile time.
static SIN_TABLE: [i64; SIN_INTERVALS + 1] = build_sin_table();

/// Taylor kernel in Q48 for the table builder. Ten terms reach well past
/// Q31.32 precision for arguments in [0, π/2].
const fn taylor_sin_q48(x: i128) -> i128 {
    let x2 = (x * x) >> 48;
    let mut term = x;
    let mut sum = x;
    let mut k: i128 = 1;
    while k <= 10 {
        term = ((term * x2) >> 48) / ((2 * k) * (2 * k + 1));
        if k & 1 == 1 {
            sum -= term;
        } else {
            sum += term;
        }
        k += 1;
    }
    sum
}

const fn build_sin_table() -> [i64; SIN_INTERVALS + 1] {
    let mut table = [0i64; SIN_INTERVALS + 1];
    let mut i = 0;
    while i <= SIN_INTERVALS {
        let angle_q48 = ((i as i128 * Fix64::HALF_PI.0 as i128) << 16) / SIN_INTERVALS as i128;
        let mut v = (taylor_sin_q48(angle_q48) + (1 << 15)) >> 16;
        if v > ONE_RAW as i128 {
            v = ONE_RAW as i128;
        }
        if v < 0 {
            v = 0;
        }
        table[i] = v as i64;
        i += 1;
    }
    table
}

/// Shared sin path: reduce into [0, 2π), fold into a quadrant, then either
/// interpolate (accurate) or snap to the nearest sample (fast).
fn sin_lookup(raw: i64, lerp: bool) -> i64 {
    let two_pi = Fix64::TWO_PI.0;
    let half_pi = Fix64::HALF_PI.0;
    let r = raw.rem_euclid(two_pi);
    let mut quadrant = r / half_pi;
    let mut f = r - quadrant * half_pi;
    if quadrant > 3 {
        // 2π is not an exact multiple of the rounded π/2 constant.
        quadrant = 3;
        f = r - 3 * half_pi;
    }
    // Fixed-point table position: index in the high bits, blend in the low.
    let mut pos = (f as i128 * (SIN_INTERVALS as i128) << 32) / half_pi as i128;
    if quadrant == 1 || quadrant == 3 {
        pos = ((SIN_INTERVALS as i128) << 32) - pos;
    }
    let mut idx = (pos >> 32) as usize;
    let t = (pos & 0xFFFF_FFFF) as i64;
    if idx >= SIN_INTERVALS {
        idx = SIN_INTERVALS;
    }
    let value = if lerp {
        let a = SIN_TABLE[idx];
        if idx == SIN_INTERVALS {
            a
        } else {
            let b = SIN_TABLE[idx + 1];
            a + (((b - a) as i128 * t as i128) >> 32) as i64
        }
    } else {
        let nearest = ((pos + (1 << 31)) >> 32) as usize;
        SIN_TABLE[if nearest > SIN_INTERVALS {
            SIN_INTERVALS
        } else {
            nearest
        }]
    };
    if quadrant >= 2 {
        -value
    } else {
        value
    }
}

// ============================================================================
// Arctangent
// ============================================================================

/// Euler series for atan on |x| <= 1:
/// with z = x²/(1+x²), atan(x) = x/(1+x²) · Σ (2·4·…·2n)/(3·5·…·(2n+1)) zⁿ.
/// Every term is nonnegative and the ratio is bounded by z <= 1/2, so forty
/// fixed iterations land under Q31.32 noise.
fn atan_series(raw: i64) -> i64 {
    let x = raw as i128;
    let x2 = (x * x) >> 32;
    let denom = (ONE_RAW as i128) + x2;
    let z = (x2 << 32) / denom;
    let base = (x << 32) / denom;
    let mut term = base;
    let mut sum = base;
    let mut n: i128 = 1;
    while n < 40 {
        term = (term * z) >> 32;
        term = term * (2 * n) / (2 * n + 1);
        sum += term;
        n += 1;
    }
    sum as i64
}

/// Fast-tier atan on |z| <= 1: `z·(π/4 + K·(1 − |z|))` with K = 0.273.
fn atan_approx(z: Fix64) -> Fix64 {
    const K: Fix64 = Fix64::from_raw(0x45E3_53F8);
    z * (Fix64::QUARTER_PI + K * (Fix64::ONE - z.abs()))
}

// ============================================================================
// exp2 factor table
// ============================================================================

/// `2^(2^-(k+1))` for k = 0..32, Q31.32, built at compile time by repeated
/// square roots of 2.
static EXP2_FRAC_TABLE: [i64; 32] = build_exp2_table();

const fn build_exp2_table() -> [i64; 32] {
    let mut table = [0i64; 32];
    let mut value = 2 * ONE_RAW;
    let mut k = 0;
    while k < 32 {
        value = sqrt_raw(value);
        table[k] = value;
        k += 1;
    }
    table
}

// ============================================================================
// Tests
// ============================================================================
