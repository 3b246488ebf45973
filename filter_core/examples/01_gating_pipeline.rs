// filter_core/examples/01_gating_pipeline.rs
//
// Builds a small orientation measurement model, cross-checks its analytic
// Jacobians against the manifold finite differences, then pushes a crafted
// innovation through a two-gate outlier chain the way a filter update would.

use filter_core::prelude::*;
use nalgebra::{DMatrix, DVector, SMatrix, UnitQuaternion, Vector3};

/// Predicts a reference direction seen through the current orientation:
/// `y = q * m + n`.
#[derive(Debug)]
struct DirectionModel;

impl Model<3, 3, 3, 3> for DirectionModel {
    type Input = UnitQuaternion<f64>;
    type Output = Vector3<f64>;
    type Meas = Vector3<f64>;
    type Noise = Vector3<f64>;

    fn eval(
        &self,
        input: &Self::Input,
        meas: &Self::Meas,
        noise: &Self::Noise,
        _dt: f64,
    ) -> Self::Output {
        input.transform_vector(meas) + noise
    }

    fn jac_input(&self, input: &Self::Input, meas: &Self::Meas, _dt: f64) -> Jacobian<3, 3> {
        -(input.transform_vector(meas)).cross_matrix()
    }

    fn jac_noise(&self, _: &Self::Input, _: &Self::Meas, _: f64) -> Jacobian<3, 3> {
        SMatrix::<f64, 3, 3>::identity()
    }
}

fn main() {
    // 1. Verify the model's analytic Jacobians before trusting them in a filter.
    let model = DirectionModel;
    let cfg = JacobianTestConfig {
        tolerance: 1e-4,
        ..JacobianTestConfig::default()
    };
    let mut rng = rand::thread_rng();
    let (input_report, noise_report) = model.check_jacobians(&cfg, &mut rng);
    println!(
        "jac_input:  max error {:.3e} -> {}",
        input_report.max_error,
        if input_report.passed() { "ok" } else { "MISMATCH" }
    );
    println!(
        "jac_noise:  max error {:.3e} -> {}",
        noise_report.max_error,
        if noise_report.passed() { "ok" } else { "MISMATCH" }
    );

    // 2. Gate a 5-dimensional innovation split into a position block [0, 2)
    //    and a direction block [2, 5); the direction block carries a gross error.
    let mut chain =
        OutlierDetection::new(&[BlockDescriptor::new(0, 2), BlockDescriptor::new(2, 3)])
            .expect("disjoint blocks");
    chain.set_enabled_all(true);

    let innovation = DVector::from_vec(vec![0.1, -0.05, 8.0, 1.0, -2.0]);
    let mut py = DMatrix::<f64>::identity(5, 5);
    let mut h_jac = DMatrix::<f64>::repeat(5, 6, 1.0);

    chain.process(&innovation, &mut py, &mut h_jac);

    for i in 0..chain.len() {
        println!(
            "gate {i} [{}..{}): outlier = {}, threshold = {:.3}",
            chain.gate(i).offset(),
            chain.gate(i).offset() + chain.gate(i).width(),
            chain.is_outlier(i),
            chain.mahalanobis_th(i),
        );
    }
    println!("H after gating:\n{h_jac}");
}
