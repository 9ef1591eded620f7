//! Fixed-Point Geometric Primitives
//!
//! Vectors, quaternions, and 3x3 matrices over [`Fix64`]. Pure value types
//! with no allocation; every operation inherits the scalar's determinism.
//!
//! The saturating variants exist for geometry on possibly-extreme inputs
//! (ray-direction inverses, error accumulators) where the wrapping default
//! would flip signs.

use crate::fixed::Fix64;
use core::ops::{Add, Div, Mul, Neg, Sub};

// ============================================================================
// Vec3
// ============================================================================

/// 3D vector with [`Fix64`] components.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(C)]
pub struct Vec3 {
    pub x: Fix64,
    pub y: Fix64,
    pub z: Fix64,
}

impl Vec3 {
    /// Zero vector
    pub const ZERO: Self = Self::splat(Fix64::ZERO);

    /// All-ones vector
    pub const ONE: Self = Self::splat(Fix64::ONE);

    /// Unit X
    pub const UNIT_X: Self = Self::new(Fix64::ONE, Fix64::ZERO, Fix64::ZERO);

    /// Unit Y
    pub const UNIT_Y: Self = Self::new(Fix64::ZERO, Fix64::ONE, Fix64::ZERO);

    /// Unit Z
    pub const UNIT_Z: Self = Self::new(Fix64::ZERO, Fix64::ZERO, Fix64::ONE);

    /// Create a new vector.
    #[inline]
    pub const fn new(x: Fix64, y: Fix64, z: Fix64) -> Self {
        Self { x, y, z }
    }

    /// All components set to `v`.
    #[inline]
    pub const fn splat(v: Fix64) -> Self {
        Self { x: v, y: v, z: v }
    }

    /// Create from integers.
    #[inline]
    pub const fn from_int(x: i32, y: i32, z: i32) -> Self {
        Self {
            x: Fix64::from_int(x),
            y: Fix64::from_int(y),
            z: Fix64::from_int(z),
        }
    }

    /// Dot product.
    #[inline]
    pub fn dot(self, rhs: Self) -> Fix64 {
        self.x * rhs.x + self.y * rhs.y + self.z * rhs.z
    }

    /// Dot product with saturating accumulation.
    #[inline]
    pub fn dot_saturating(self, rhs: Self) -> Fix64 {
        self.x
            .saturating_mul(rhs.x)
            .saturating_add(self.y.saturating_mul(rhs.y))
            .saturating_add(self.z.saturating_mul(rhs.z))
    }

    /// Cross product.
    #[inline]
    pub fn cross(self, rhs: Self) -> Self {
        Self {
            x: self.y * rhs.z - self.z * rhs.y,
            y: self.z * rhs.x - self.x * rhs.z,
            z: self.x * rhs.y - self.y * rhs.x,
        }
    }

    /// Squared length (no sqrt).
    #[inline]
    pub fn length_squared(self) -> Fix64 {
        self.dot(self)
    }

    /// Length.
    #[inline]
    pub fn length(self) -> Fix64 {
        self.length_squared().sqrt()
    }

    /// Normalize to unit length; the zero vector stays zero.
    pub fn normalize(self) -> Self {
        let len = self.length();
        if len.is_zero() {
            Self::ZERO
        } else {
            self / len
        }
    }

    /// Normalize, falling back to `fallback` when the input is degenerate.
    ///
    /// The degenerate-axis branches in constraint setup use this instead of
    /// silently producing a zero direction.
    pub fn normalize_or(self, fallback: Self) -> Self {
        let len = self.length();
        if len.is_zero() {
            fallback
        } else {
            self / len
        }
    }

    /// Scale by a scalar.
    #[inline]
    pub fn scale(self, s: Fix64) -> Self {
        Self {
            x: self.x * s,
            y: self.y * s,
            z: self.z * s,
        }
    }

    /// Component-wise minimum.
    #[inline]
    pub fn min(self, rhs: Self) -> Self {
        Self {
            x: self.x.min(rhs.x),
            y: self.y.min(rhs.y),
            z: self.z.min(rhs.z),
        }
    }

    /// Component-wise maximum.
    #[inline]
    pub fn max(self, rhs: Self) -> Self {
        Self {
            x: self.x.max(rhs.x),
            y: self.y.max(rhs.y),
            z: self.z.max(rhs.z),
        }
    }

    /// Addition clamping each component on overflow.
    #[inline]
    pub fn saturating_add(self, rhs: Self) -> Self {
        Self {
            x: self.x.saturating_add(rhs.x),
            y: self.y.saturating_add(rhs.y),
            z: self.z.saturating_add(rhs.z),
        }
    }

    /// Largest component magnitude.
    pub fn max_abs_component(self) -> Fix64 {
        self.x.abs().max(self.y.abs()).max(self.z.abs())
    }
}

impl Add for Vec3 {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
            z: self.z + rhs.z,
        }
    }
}

impl Sub for Vec3 {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
            z: self.z - rhs.z,
        }
    }
}

impl Mul<Fix64> for Vec3 {
    type Output = Self;

    #[inline]
    fn mul(self, rhs: Fix64) -> Self {
        self.scale(rhs)
    }
}

impl Div<Fix64> for Vec3 {
    type Output = Self;

    #[inline]
    fn div(self, rhs: Fix64) -> Self {
        Self {
            x: self.x / rhs,
            y: self.y / rhs,
            z: self.z / rhs,
        }
    }
}

impl Neg for Vec3 {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Self {
            x: -self.x,
            y: -self.y,
            z: -self.z,
        }
    }
}

// ============================================================================
// Quat
// ============================================================================

/// Quaternion with [`Fix64`] components, `(x, y, z, w)` with scalar `w`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(C)]
pub struct Quat {
    pub x: Fix64,
    pub y: Fix64,
    pub z: Fix64,
    pub w: Fix64,
}

impl Quat {
    /// Identity (no rotation)
    pub const IDENTITY: Self = Self {
        x: Fix64::ZERO,
        y: Fix64::ZERO,
        z: Fix64::ZERO,
        w: Fix64::ONE,
    };

    /// Create a new quaternion.
    #[inline]
    pub const fn new(x: Fix64, y: Fix64, z: Fix64, w: Fix64) -> Self {
        Self { x, y, z, w }
    }

    /// Create from an axis and angle. The axis is normalized; a degenerate
    /// axis falls back to unit X.
    pub fn from_axis_angle(axis: Vec3, angle: Fix64) -> Self {
        let (sin_half, cos_half) = angle.half().sin_cos();
        let axis = axis.normalize_or(Vec3::UNIT_X);
        Self {
            x: axis.x * sin_half,
            y: axis.y * sin_half,
            z: axis.z * sin_half,
            w: cos_half,
        }
    }

    /// Rotation composition.
    pub fn mul(self, rhs: Self) -> Self {
        Self {
            x: self.w * rhs.x + self.x * rhs.w + self.y * rhs.z - self.z * rhs.y,
            y: self.w * rhs.y - self.x * rhs.z + self.y * rhs.w + self.z * rhs.x,
            z: self.w * rhs.z + self.x * rhs.y - self.y * rhs.x + self.z * rhs.w,
            w: self.w * rhs.w - self.x * rhs.x - self.y * rhs.y - self.z * rhs.z,
        }
    }

    /// Conjugate (inverse for unit quaternions).
    #[inline]
    pub fn conjugate(self) -> Self {
        Self {
            x: -self.x,
            y: -self.y,
            z: -self.z,
            w: self.w,
        }
    }

    /// Squared magnitude.
    #[inline]
    pub fn length_squared(self) -> Fix64 {
        self.x * self.x + self.y * self.y + self.z * self.z + self.w * self.w
    }

    /// Normalize to a unit quaternion; degenerate input becomes identity.
    pub fn normalize(self) -> Self {
        let len = self.length_squared().sqrt();
        if len.is_zero() {
            Self::IDENTITY
        } else {
            Self {
                x: self.x / len,
                y: self.y / len,
                z: self.z / len,
                w: self.w / len,
            }
        }
    }

    /// Rotate a vector: q v q*.
    pub fn rotate(self, v: Vec3) -> Vec3 {
        let qv = Self::new(v.x, v.y, v.z, Fix64::ZERO);
        let r = self.mul(qv).mul(self.conjugate());
        Vec3::new(r.x, r.y, r.z)
    }
}

// ============================================================================
// Mat3
// ============================================================================

/// Column-major 3x3 matrix, used for inertia tensors and effective masses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(C)]
pub struct Mat3 {
    pub col0: Vec3,
    pub col1: Vec3,
    pub col2: Vec3,
}

impl Mat3 {
    /// Identity matrix
    pub const IDENTITY: Self = Self {
        col0: Vec3::UNIT_X,
        col1: Vec3::UNIT_Y,
        col2: Vec3::UNIT_Z,
    };

    /// Zero matrix
    pub const ZERO: Self = Self {
        col0: Vec3::ZERO,
        col1: Vec3::ZERO,
        col2: Vec3::ZERO,
    };

    /// Create from columns.
    #[inline]
    pub const fn from_cols(col0: Vec3, col1: Vec3, col2: Vec3) -> Self {
        Self { col0, col1, col2 }
    }

    /// Diagonal matrix.
    #[inline]
    pub fn diagonal(x: Fix64, y: Fix64, z: Fix64) -> Self {
        Self {
            col0: Vec3::new(x, Fix64::ZERO, Fix64::ZERO),
            col1: Vec3::new(Fix64::ZERO, y, Fix64::ZERO),
            col2: Vec3::new(Fix64::ZERO, Fix64::ZERO, z),
        }
    }

    /// Uniform scaling of the identity.
    #[inline]
    pub fn scaled_identity(s: Fix64) -> Self {
        Self::diagonal(s, s, s)
    }

    /// Cross-product (skew-symmetric) matrix of `v`: `skew(v) * u == v × u`.
    pub fn skew(v: Vec3) -> Self {
        Self {
            col0: Vec3::new(Fix64::ZERO, v.z, -v.y),
            col1: Vec3::new(-v.z, Fix64::ZERO, v.x),
            col2: Vec3::new(v.y, -v.x, Fix64::ZERO),
        }
    }

    /// Matrix-vector product.
    #[inline]
    pub fn mul_vec(self, v: Vec3) -> Vec3 {
        Vec3::new(
            self.col0.x * v.x + self.col1.x * v.y + self.col2.x * v.z,
            self.col0.y * v.x + self.col1.y * v.y + self.col2.y * v.z,
            self.col0.z * v.x + self.col1.z * v.y + self.col2.z * v.z,
        )
    }

    /// Transpose.
    #[inline]
    pub fn transpose(self) -> Self {
        Self {
            col0: Vec3::new(self.col0.x, self.col1.x, self.col2.x),
            col1: Vec3::new(self.col0.y, self.col1.y, self.col2.y),
            col2: Vec3::new(self.col0.z, self.col1.z, self.col2.z),
        }
    }

    /// Scale all elements.
    #[inline]
    pub fn scale(self, s: Fix64) -> Self {
        Self {
            col0: self.col0.scale(s),
            col1: self.col1.scale(s),
            col2: self.col2.scale(s),
        }
    }

    /// Determinant.
    pub fn determinant(self) -> Fix64 {
        self.col0.dot(self.col1.cross(self.col2))
    }

    /// Inverse via the adjugate; `None` when the determinant is zero.
    pub fn invert(self) -> Option<Self> {
        let det = self.determinant();
        if det.is_zero() {
            return None;
        }
        let r0 = self.col1.cross(self.col2);
        let r1 = self.col2.cross(self.col0);
        let r2 = self.col0.cross(self.col1);
        // Rows of the adjugate become columns of the transposed cofactors.
        Some(
            Self {
                col0: Vec3::new(r0.x, r1.x, r2.x),
                col1: Vec3::new(r0.y, r1.y, r2.y),
                col2: Vec3::new(r0.z, r1.z, r2.z),
            }
            .scale(det.recip()),
        )
    }
}

impl Add for Mat3 {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self {
            col0: self.col0 + rhs.col0,
            col1: self.col1 + rhs.col1,
            col2: self.col2 + rhs.col2,
        }
    }
}

impl Sub for Mat3 {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self {
            col0: self.col0 - rhs.col0,
            col1: self.col1 - rhs.col1,
            col2: self.col2 - rhs.col2,
        }
    }
}

impl Mul<Mat3> for Mat3 {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        Self {
            col0: self.mul_vec(rhs.col0),
            col1: self.mul_vec(rhs.col1),
            col2: self.mul_vec(rhs.col2),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
