//! 3D vector math for attitude determination and control
//!
//! Double-precision three-component vectors with the handful of
//! operations the control laws need. Float intrinsics route through
//! `std` on hosts and `libm` on bare-metal targets.

use core::ops::{Add, Mul, Neg, Sub};

use serde::{Deserialize, Serialize};

/// Tolerance below which a vector is treated as zero
pub const VEC3_EPSILON: f64 = 1e-10;

#[inline]
pub(crate) fn sqrt(x: f64) -> f64 {
    #[cfg(feature = "std")]
    {
        x.sqrt()
    }
    #[cfg(not(feature = "std"))]
    {
        libm::sqrt(x)
    }
}

/// Round to the nearest integer, halfway cases away from zero
#[inline]
#[must_use]
pub fn round(x: f64) -> f64 {
    #[cfg(feature = "std")]
    {
        x.round()
    }
    #[cfg(not(feature = "std"))]
    {
        libm::round(x)
    }
}

/// 3D vector with double-precision components
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    /// X component
    pub x: f64,
    /// Y component
    pub y: f64,
    /// Z component
    pub z: f64,
}

impl Vec3 {
    /// Zero vector
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);

    /// Body-frame +X unit vector
    pub const UNIT_X: Self = Self::new(1.0, 0.0, 0.0);

    /// Create a new vector
    #[must_use]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Vector magnitude
    #[must_use]
    pub fn magnitude(&self) -> f64 {
        sqrt(self.x * self.x + self.y * self.y + self.z * self.z)
    }

    /// Normalise in place
    ///
    /// No-op when the magnitude is below [`VEC3_EPSILON`], so repeated
    /// calls are idempotent and the zero vector stays zero.
    pub fn normalize(&mut self) {
        let mag = self.magnitude();
        if mag > VEC3_EPSILON {
            self.x /= mag;
            self.y /= mag;
            self.z /= mag;
        }
    }

    /// Return a normalised copy
    #[must_use]
    pub fn normalized(&self) -> Self {
        let mut v = *self;
        v.normalize();
        v
    }

    /// Cross product `self × other`
    #[must_use]
    pub fn cross(&self, other: &Self) -> Self {
        Self {
            x: self.y * other.z - self.z * other.y,
            y: self.z * other.x - self.x * other.z,
            z: self.x * other.y - self.y * other.x,
        }
    }

    /// Dot product
    #[must_use]
    pub fn dot(&self, other: &Self) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    /// Scale down uniformly so the magnitude does not exceed `cap`
    ///
    /// Uniform scaling preserves direction and also bounds each
    /// component by `cap`. Vectors already within the cap are untouched.
    pub fn saturate(&mut self, cap: f64) {
        let mag = self.magnitude();
        if mag > cap && mag > VEC3_EPSILON {
            let scale = cap / mag;
            self.x *= scale;
            self.y *= scale;
            self.z *= scale;
        }
    }
}

impl Add for Vec3 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f64> for Vec3 {
    type Output = Self;

    fn mul(self, rhs: f64) -> Self {
        Self::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl Neg for Vec3 {
    type Output = Self;

    fn neg(self) -> Self {
        Self::new(-self.x, -self.y, -self.z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const EPS: f64 = 1e-10;

    #[test]
    fn test_magnitude() {
        let v = Vec3::new(3.0, 4.0, 0.0);
        assert!((v.magnitude() - 5.0).abs() < EPS);
        assert!(Vec3::ZERO.magnitude() < EPS);
    }

    #[test]
    fn test_normalize_idempotent() {
        let mut v = Vec3::new(10.0, -3.0, 7.0);
        v.normalize();
        let first = v;
        v.normalize();
        assert!((v.x - first.x).abs() < EPS);
        assert!((v.y - first.y).abs() < EPS);
        assert!((v.z - first.z).abs() < EPS);
        assert!((v.magnitude() - 1.0).abs() < EPS);
    }

    #[test]
    fn test_normalize_zero_is_noop() {
        let mut v = Vec3::ZERO;
        v.normalize();
        assert_eq!(v, Vec3::ZERO);
    }

    #[test]
    fn test_cross_right_handed() {
        let x = Vec3::UNIT_X;
        let y = Vec3::new(0.0, 1.0, 0.0);
        let z = x.cross(&y);
        assert!((z.z - 1.0).abs() < EPS);
        assert!(z.x.abs() < EPS && z.y.abs() < EPS);
    }

    #[test]
    fn test_cross_orthogonal_to_inputs() {
        let a = Vec3::new(1.5, -2.0, 0.25);
        let b = Vec3::new(0.5, 3.0, -1.0);
        let c = a.cross(&b);
        assert!(c.dot(&a).abs() < 1e-9);
        assert!(c.dot(&b).abs() < 1e-9);
    }

    #[test]
    fn test_saturate_below_cap_untouched() {
        let mut v = Vec3::new(0.05, 0.05, 0.05);
        let before = v;
        v.saturate(0.2);
        assert_eq!(v, before);
    }

    #[test]
    fn test_saturate_preserves_direction() {
        let mut v = Vec3::new(3.0, 4.0, 0.0);
        v.saturate(1.0);
        assert!((v.magnitude() - 1.0).abs() < 1e-9);
        assert!((v.x / v.y - 3.0 / 4.0).abs() < 1e-9);
    }

    proptest! {
        #[test]
        fn prop_saturate_bounds_magnitude(
            x in -1e3f64..1e3, y in -1e3f64..1e3, z in -1e3f64..1e3,
            cap in 1e-3f64..10.0,
        ) {
            let mut v = Vec3::new(x, y, z);
            v.saturate(cap);
            prop_assert!(v.magnitude() <= cap * (1.0 + 1e-9));
            prop_assert!(v.x.abs() <= cap * (1.0 + 1e-9));
            prop_assert!(v.y.abs() <= cap * (1.0 + 1e-9));
            prop_assert!(v.z.abs() <= cap * (1.0 + 1e-9));
        }

        #[test]
        fn prop_normalize_unit_or_zero(
            x in -1e3f64..1e3, y in -1e3f64..1e3, z in -1e3f64..1e3,
        ) {
            let mut v = Vec3::new(x, y, z);
            let before = v.magnitude();
            v.normalize();
            let after = v.magnitude();
            if before > super::VEC3_EPSILON {
                prop_assert!((after - 1.0).abs() < 1e-9);
            } else {
                prop_assert!((after - before).abs() < 1e-12);
            }
        }
    }
}
