// filter_core/src/types.rs

use nalgebra::{DMatrix, DVector, SMatrix, SVector};

// --- Core Type Aliases ---

/// A tangent-space vector of compile-time dimension `D`.
pub type TangentVector<const D: usize> = SVector<f64, D>;

/// A Jacobian block of compile-time shape `R x C` (rows in the output
/// tangent space, columns in the perturbed tangent space).
pub type Jacobian<const R: usize, const C: usize> = SMatrix<f64, R, C>;

// The shared buffers a filter threads through the outlier chain are sized
// once per filter type, so they stay dynamically dimensioned.

/// The full innovation vector `y = z - h(x)` of the owning filter.
pub type Innovation = DVector<f64>;

/// The innovation covariance `Py = H P H^T + R`.
pub type InnovationCovariance = DMatrix<f64>;

/// The observation Jacobian `H` mapping state tangent space to innovation space.
pub type ObservationJacobian = DMatrix<f64>;
