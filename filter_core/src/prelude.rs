// filter_core/src/prelude.rs

// --- Core Abstractions (The main contracts of the library) ---
pub use crate::manifold::Manifold;
pub use crate::models::Model;
pub use crate::properties::PropertyRegistry;

// --- Core Data Structures (The "nouns" of the library) ---
pub use crate::models::{JacobianReport, JacobianTestConfig};
pub use crate::outlier::{
    chi_square_threshold, BlockDescriptor, OutlierConfigError, OutlierDetection, OutlierGate,
};
pub use crate::properties::PropertySheet;
pub use crate::types::{
    Innovation, InnovationCovariance, Jacobian, ObservationJacobian, TangentVector,
};
