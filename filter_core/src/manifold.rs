// filter_core/src/manifold.rs

use crate::types::TangentVector;
use nalgebra::{SVector, UnitQuaternion, Vector3};
use rand::{Rng, RngCore};
use rand_distr::StandardNormal;
use std::fmt::Debug;

// --- MANIFOLD TRAIT ---
// The local-chart contract every state, measurement and noise type must
// satisfy. `z = h(x)` style models only ever touch their arguments through
// these four operations, which is what lets the finite-difference Jacobians
// work on curved spaces (orientations) and flat ones (positions) alike.
pub trait Manifold<const D: usize>: Clone + Debug {
    /// The tangent-space dimension of this type.
    const DIM: usize = D;

    /// Moves this point along the tangent direction `delta`.
    ///
    /// For a flat (Euclidean) type this is plain addition; for a curved type
    /// it is the exponential-map update around `self`.
    fn box_plus(&self, delta: &TangentVector<D>) -> Self;

    /// Computes the tangent-space difference `self ⊟ other`.
    ///
    /// Invariant (round-trip law): `other.box_plus(&a.box_minus(&other))`
    /// recovers `a` up to numerical tolerance, for any two points.
    fn box_minus(&self, other: &Self) -> TangentVector<D>;

    /// The identity element of this type (zero vector, identity rotation, ...).
    fn identity() -> Self;

    /// Draws a random point, spread `scale` around the identity.
    ///
    /// Used by the Jacobian self-check harness; the RNG is caller-supplied so
    /// tests can seed it deterministically.
    fn sample(scale: f64, rng: &mut dyn RngCore) -> Self;
}

// --- Euclidean chart ---
// Any fixed-size vector is a manifold under ordinary addition.
impl<const D: usize> Manifold<D> for SVector<f64, D> {
    fn box_plus(&self, delta: &TangentVector<D>) -> Self {
        self + delta
    }

    fn box_minus(&self, other: &Self) -> TangentVector<D> {
        self - other
    }

    fn identity() -> Self {
        SVector::zeros()
    }

    fn sample(scale: f64, rng: &mut dyn RngCore) -> Self {
        SVector::from_fn(|_, _| {
            let v: f64 = rng.sample(StandardNormal);
            scale * v
        })
    }
}

// --- Rotation chart ---
// Unit quaternions with a rotation-vector tangent space and left-applied
// perturbation: `q ⊞ v = exp(v) * q`, `a ⊟ b = log(a * b⁻¹)`.
impl Manifold<3> for UnitQuaternion<f64> {
    fn box_plus(&self, delta: &TangentVector<3>) -> Self {
        UnitQuaternion::from_scaled_axis(*delta) * self
    }

    fn box_minus(&self, other: &Self) -> TangentVector<3> {
        (self * other.inverse()).scaled_axis()
    }

    fn identity() -> Self {
        UnitQuaternion::identity()
    }

    fn sample(scale: f64, rng: &mut dyn RngCore) -> Self {
        let axis = <Vector3<f64> as Manifold<3>>::sample(scale, rng);
        UnitQuaternion::from_scaled_axis(axis)
    }
}
