// filter_core/src/lib.rs

// This file defines the public modules of your library.
pub mod manifold;
pub mod models;
pub mod outlier;
pub mod prelude;
pub mod properties;
pub mod types;
