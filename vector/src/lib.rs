extern crate num;
extern crate serde;

use num::traits::Inv;
use num::traits::{NumAssign, NumOps, NumRef};
use num::Float;
use num::Num;
use num::NumCast;
use std::fmt;
use std::fmt::{Debug, Display, LowerExp};
use std::iter::Sum;
use std::ops::{Add, AddAssign, Div, Index, IndexMut, Mul, MulAssign, Neg, Sub, SubAssign};

mod serialization;

pub trait Field
where
    Self: Num,
    Self: Mul<Self, Output = Self>,
    Self: MulAssign<Self>,
    Self: AddAssign<Self>,
    Self: SubAssign<Self>,
    Self: Div<Self, Output = Self>,
    Self: Add<Self, Output = Self>,
    Self: Sub<Self, Output = Self>,
    Self: Neg<Output = Self>,
    Self: Inv<Output = Self>,
    Self: Sum<Self>,
    Self: PartialEq,
    Self: Copy,
    Self: Default,
    Self: Debug,
    Self: Display,
{
}

pub trait RealNumberLike
where
    Self: Field,
    Self: Num,
    Self: NumCast,
    Self: Float,
    Self: NumAssign,
    Self: NumOps,
    Self: NumRef,
{
}

impl Field for f32 {}
impl Field for f64 {}

impl RealNumberLike for f64 {}
impl RealNumberLike for f32 {}

/// A four-vector `(t, x, y, z)` with metric `(+, -, -, -)`.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct LorentzVector<T: Field> {
    pub t: T,
    pub x: T,
    pub y: T,
    pub z: T,
}

impl<T: Field> Default for LorentzVector<T> {
    fn default() -> LorentzVector<T> {
        LorentzVector {
            t: T::default(),
            x: T::default(),
            y: T::default(),
            z: T::default(),
        }
    }
}

impl<T: Field> Display for LorentzVector<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "(t:{}, x:{}, y:{}, z:{})",
            self.t, self.x, self.y, self.z
        )
    }
}

impl<T: Field + LowerExp> LowerExp for LorentzVector<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "(t:{:e}, x:{:e}, y:{:e}, z:{:e})",
            self.t, self.x, self.y, self.z
        )
    }
}

impl<T: Field> LorentzVector<T> {
    #[inline]
    pub fn new() -> LorentzVector<T> {
        LorentzVector::default()
    }

    #[inline]
    pub fn from_args(t: T, x: T, y: T, z: T) -> LorentzVector<T> {
        LorentzVector { t, x, y, z }
    }

    #[inline]
    pub fn from_slice(v: &[T]) -> LorentzVector<T> {
        let (t, x, y, z) = (v[0], v[1], v[2], v[3]);
        LorentzVector { t, x, y, z }
    }

    /// A particle at rest with energy `m`.
    #[inline]
    pub fn at_rest(m: T) -> LorentzVector<T> {
        LorentzVector::from_args(m, T::zero(), T::zero(), T::zero())
    }

    #[inline]
    pub fn dual(&self) -> LorentzVector<T> {
        LorentzVector {
            t: self.t,
            x: -self.x,
            y: -self.y,
            z: -self.z,
        }
    }

    #[inline]
    pub fn square(&self) -> T {
        self.t * self.t - self.x * self.x - self.y * self.y - self.z * self.z
    }

    #[inline]
    pub fn dot(&self, other: &LorentzVector<T>) -> T {
        self.t * other.t - self.x * other.x - self.y * other.y - self.z * other.z
    }

    #[inline]
    pub fn spatial_squared(&self) -> T {
        self.x * self.x + self.y * self.y + self.z * self.z
    }

    #[inline]
    pub fn spatial_dot(&self, other: &LorentzVector<T>) -> T {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    #[inline]
    pub fn map<F, U: Field>(&self, map: F) -> LorentzVector<U>
    where
        F: Fn(T) -> U,
    {
        LorentzVector {
            t: map(self.t),
            x: map(self.x),
            y: map(self.y),
            z: map(self.z),
        }
    }
}

impl<'a, T: Field> Neg for &'a LorentzVector<T> {
    type Output = LorentzVector<T>;

    #[inline]
    fn neg(self) -> LorentzVector<T> {
        LorentzVector {
            t: -self.t,
            x: -self.x,
            y: -self.y,
            z: -self.z,
        }
    }
}

impl<T: Field> Neg for LorentzVector<T> {
    type Output = LorentzVector<T>;

    #[inline]
    fn neg(self) -> LorentzVector<T> {
        -&self
    }
}

impl<'a, T: Field> Add<&'a LorentzVector<T>> for &'a LorentzVector<T> {
    type Output = LorentzVector<T>;

    #[inline]
    fn add(self, other: &'a LorentzVector<T>) -> LorentzVector<T> {
        LorentzVector {
            t: self.t + other.t,
            x: self.x + other.x,
            y: self.y + other.y,
            z: self.z + other.z,
        }
    }
}

impl<'a, T: Field> Add<LorentzVector<T>> for &'a LorentzVector<T> {
    type Output = LorentzVector<T>;

    #[inline]
    fn add(self, other: LorentzVector<T>) -> LorentzVector<T> {
        self.add(&other)
    }
}

impl<'a, T: Field> Add<&'a LorentzVector<T>> for LorentzVector<T> {
    type Output = LorentzVector<T>;

    #[inline]
    fn add(self, other: &'a LorentzVector<T>) -> LorentzVector<T> {
        &self + other
    }
}

impl<T: Field> Add<LorentzVector<T>> for LorentzVector<T> {
    type Output = LorentzVector<T>;

    #[inline]
    fn add(self, other: LorentzVector<T>) -> LorentzVector<T> {
        &self + &other
    }
}

impl<T: Field> AddAssign<LorentzVector<T>> for LorentzVector<T> {
    #[inline]
    fn add_assign(&mut self, other: LorentzVector<T>) {
        self.t += other.t;
        self.x += other.x;
        self.y += other.y;
        self.z += other.z;
    }
}

impl<T: Field> SubAssign<LorentzVector<T>> for LorentzVector<T> {
    #[inline]
    fn sub_assign(&mut self, other: LorentzVector<T>) {
        self.t -= other.t;
        self.x -= other.x;
        self.y -= other.y;
        self.z -= other.z;
    }
}

impl<'a, T: Field> Sub<&'a LorentzVector<T>> for &'a LorentzVector<T> {
    type Output = LorentzVector<T>;

    #[inline]
    fn sub(self, other: &'a LorentzVector<T>) -> LorentzVector<T> {
        LorentzVector {
            t: self.t - other.t,
            x: self.x - other.x,
            y: self.y - other.y,
            z: self.z - other.z,
        }
    }
}

impl<'a, T: Field> Sub<LorentzVector<T>> for &'a LorentzVector<T> {
    type Output = LorentzVector<T>;

    #[inline]
    fn sub(self, other: LorentzVector<T>) -> LorentzVector<T> {
        self.sub(&other)
    }
}

impl<T: Field> Sub<LorentzVector<T>> for LorentzVector<T> {
    type Output = LorentzVector<T>;

    #[inline]
    fn sub(self, other: LorentzVector<T>) -> LorentzVector<T> {
        &self - &other
    }
}

impl<'a, T: Field> Sub<&'a LorentzVector<T>> for LorentzVector<T> {
    type Output = LorentzVector<T>;

    #[inline]
    fn sub(self, other: &'a LorentzVector<T>) -> LorentzVector<T> {
        &self - other
    }
}

impl<'a, T: Field> Mul<T> for &'a LorentzVector<T> {
    type Output = LorentzVector<T>;

    #[inline]
    fn mul(self, other: T) -> LorentzVector<T> {
        LorentzVector {
            t: self.t * other,
            x: self.x * other,
            y: self.y * other,
            z: self.z * other,
        }
    }
}

impl<T: Field> Mul<T> for LorentzVector<T> {
    type Output = LorentzVector<T>;

    #[inline]
    fn mul(self, other: T) -> LorentzVector<T> {
        &self * other
    }
}

impl<'a, T: Field> Div<T> for &'a LorentzVector<T> {
    type Output = LorentzVector<T>;

    #[inline]
    fn div(self, other: T) -> LorentzVector<T> {
        let o = other.inv();
        self * o
    }
}

impl<T: Field> Div<T> for LorentzVector<T> {
    type Output = LorentzVector<T>;

    #[inline]
    fn div(self, other: T) -> LorentzVector<T> {
        let o = other.inv();
        self * o
    }
}

impl<T: Field> MulAssign<T> for LorentzVector<T> {
    #[inline]
    fn mul_assign(&mut self, other: T) {
        self.t *= other;
        self.x *= other;
        self.y *= other;
        self.z *= other;
    }
}

impl<T: Field> Sum<LorentzVector<T>> for LorentzVector<T> {
    fn sum<I: Iterator<Item = LorentzVector<T>>>(iter: I) -> LorentzVector<T> {
        iter.fold(LorentzVector::default(), |acc, p| acc + p)
    }
}

impl<'a, T: Field> Sum<&'a LorentzVector<T>> for LorentzVector<T> {
    fn sum<I: Iterator<Item = &'a LorentzVector<T>>>(iter: I) -> LorentzVector<T> {
        iter.fold(LorentzVector::default(), |acc, p| acc + p)
    }
}

impl<T: Field> Index<usize> for LorentzVector<T> {
    type Output = T;

    #[inline]
    fn index(&self, index: usize) -> &T {
        match index {
            0 => &self.t,
            1 => &self.x,
            2 => &self.y,
            3 => &self.z,
            _ => panic!("Index is not between 0 and 3"),
        }
    }
}

impl<T: Field> IndexMut<usize> for LorentzVector<T> {
    #[inline]
    fn index_mut(&mut self, index: usize) -> &mut T {
        match index {
            0 => &mut self.t,
            1 => &mut self.x,
            2 => &mut self.y,
            3 => &mut self.z,
            _ => panic!("Index is not between 0 and 3"),
        }
    }
}

impl<T: Float + Field> LorentzVector<T> {
    /// Invariant mass. A space-like vector returns `-sqrt(-p^2)`.
    #[inline]
    pub fn mass(&self) -> T {
        let m2 = self.square();
        if m2 < T::zero() {
            -(-m2).sqrt()
        } else {
            m2.sqrt()
        }
    }

    /// Polar angle with respect to the +z axis.
    #[inline]
    pub fn theta(&self) -> T {
        let perp = self.x.hypot(self.y);
        if perp == T::zero() && self.z == T::zero() {
            T::zero()
        } else {
            perp.atan2(self.z)
        }
    }

    #[inline]
    pub fn phi(&self) -> T {
        if self.x == T::zero() && self.y == T::zero() {
            T::zero()
        } else {
            self.y.atan2(self.x)
        }
    }

    /// The velocity `p / E`, stored in the spatial components.
    #[inline]
    pub fn boost_vector(&self) -> LorentzVector<T> {
        LorentzVector::from_args(T::zero(), self.x / self.t, self.y / self.t, self.z / self.t)
    }

    pub fn boost(&self, boost_vector: &LorentzVector<T>) -> LorentzVector<T> {
        let b2 = boost_vector.spatial_squared();
        let gamma = (T::one() - b2).sqrt().inv();

        let bp = self.spatial_dot(boost_vector);
        let gamma2 = if b2 > T::zero() {
            (gamma - T::one()) / b2
        } else {
            T::zero()
        };
        let factor = gamma2 * bp + gamma * self.t;
        LorentzVector::from_args(
            gamma * (self.t + bp),
            boost_vector.x.mul_add(factor, self.x),
            boost_vector.y.mul_add(factor, self.y),
            boost_vector.z.mul_add(factor, self.z),
        )
    }

    /// Rotate around the z axis by the angle with the given cosine and sine.
    #[inline]
    pub fn rotate_z(&self, cos: T, sin: T) -> LorentzVector<T> {
        LorentzVector::from_args(
            self.t,
            cos * self.x - sin * self.y,
            sin * self.x + cos * self.y,
            self.z,
        )
    }

    /// Rotate in the x-z plane by the angle with the given cosine and sine.
    #[inline]
    pub fn rotate_y(&self, cos: T, sin: T) -> LorentzVector<T> {
        LorentzVector::from_args(
            self.t,
            cos * self.x - sin * self.z,
            self.y,
            sin * self.x + cos * self.z,
        )
    }
}
