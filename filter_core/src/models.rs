// filter_core/src/models.rs

use crate::manifold::Manifold;
use crate::types::{Jacobian, TangentVector};
use rand::RngCore;

// --- MODEL TRAIT ---
// Represents one measurement or process model of an estimator,
// `output = f(input, meas, noise, dt)`, together with its derivatives.
//
// `NI`/`NO`/`NM`/`NN` are the tangent-space dimensions of the four argument
// types, fixed at compile time so every Jacobian is a stack-resident matrix.

/// The contract every concrete sensor/process model must satisfy.
///
/// Concrete models implement `eval` and override the analytic Jacobians;
/// the finite-difference Jacobians and the self-check harness are provided
/// once here and work for any model, because they only touch the argument
/// types through the [`Manifold`] operations.
pub trait Model<const NI: usize, const NO: usize, const NM: usize, const NN: usize> {
    type Input: Manifold<NI>;
    type Output: Manifold<NO>;
    type Meas: Manifold<NM>;
    type Noise: Manifold<NN>;

    /// Evaluates the model: `output = f(input, meas, noise, dt)`.
    ///
    /// Must be pure and deterministic for fixed arguments.
    fn eval(
        &self,
        input: &Self::Input,
        meas: &Self::Meas,
        noise: &Self::Noise,
        dt: f64,
    ) -> Self::Output;

    /// Evaluates the model with the noise argument at its identity element.
    fn eval_noise_free(&self, input: &Self::Input, meas: &Self::Meas, dt: f64) -> Self::Output {
        self.eval(input, meas, &Self::Noise::identity(), dt)
    }

    /// Analytic derivative of `eval` with respect to `input`, expressed in
    /// the input's tangent space. Models without an analytic form keep the
    /// zero default.
    fn jac_input(&self, input: &Self::Input, meas: &Self::Meas, dt: f64) -> Jacobian<NO, NI> {
        let _ = (input, meas, dt);
        Jacobian::zeros()
    }

    /// Analytic derivative of `eval` with respect to `noise`, expressed in
    /// the noise's tangent space, evaluated at noise identity.
    fn jac_noise(&self, input: &Self::Input, meas: &Self::Meas, dt: f64) -> Jacobian<NO, NN> {
        let _ = (input, meas, dt);
        Jacobian::zeros()
    }

    /// Finite-difference derivative with respect to `input`.
    ///
    /// For each tangent basis direction `e_i` of the input space the input is
    /// perturbed via `box_plus(step * e_i)`, the model re-evaluated, and the
    /// column obtained as `(f(perturbed) ⊟ f(reference)) / step`. Ordinary
    /// coordinate subtraction would be invalid on a curved input or output
    /// type; only `box_minus` yields a valid tangent-space difference.
    fn jac_input_fd(
        &self,
        input: &Self::Input,
        meas: &Self::Meas,
        dt: f64,
        step: f64,
    ) -> Jacobian<NO, NI> {
        let reference = self.eval_noise_free(input, meas, dt);
        let mut jac = Jacobian::<NO, NI>::zeros();
        for i in 0..NI {
            let mut delta = TangentVector::<NI>::zeros();
            delta[i] = step;
            let disturbed = input.box_plus(&delta);
            let dif = self.eval_noise_free(&disturbed, meas, dt).box_minus(&reference);
            jac.set_column(i, &(dif / step));
        }
        jac
    }

    /// Finite-difference derivative with respect to `noise`, perturbing the
    /// noise argument about its identity element.
    fn jac_noise_fd(
        &self,
        input: &Self::Input,
        meas: &Self::Meas,
        dt: f64,
        step: f64,
    ) -> Jacobian<NO, NN> {
        let noise_ref = Self::Noise::identity();
        let reference = self.eval(input, meas, &noise_ref, dt);
        let mut jac = Jacobian::<NO, NN>::zeros();
        for i in 0..NN {
            let mut delta = TangentVector::<NN>::zeros();
            delta[i] = step;
            let disturbed = noise_ref.box_plus(&delta);
            let dif = self.eval(input, meas, &disturbed, dt).box_minus(&reference);
            jac.set_column(i, &(dif / step));
        }
        jac
    }

    /// Cross-checks the analytic input Jacobian against its finite-difference
    /// counterpart at a random input/measurement pair.
    ///
    /// The outcome is logged and returned; a mismatch is never fatal here,
    /// the pass/fail policy stays with the caller.
    fn check_jac_input(
        &self,
        cfg: &JacobianTestConfig,
        rng: &mut dyn RngCore,
    ) -> JacobianReport {
        let input = Self::Input::sample(cfg.random_scale, rng);
        let meas = Self::Meas::sample(cfg.random_scale, rng);
        let diff = self.jac_input(&input, &meas, cfg.dt)
            - self.jac_input_fd(&input, &meas, cfg.dt, cfg.step);
        report("jac_input", diff.abs().max(), cfg.tolerance)
    }

    /// Cross-checks the analytic noise Jacobian, see [`Model::check_jac_input`].
    fn check_jac_noise(
        &self,
        cfg: &JacobianTestConfig,
        rng: &mut dyn RngCore,
    ) -> JacobianReport {
        let input = Self::Input::sample(cfg.random_scale, rng);
        let meas = Self::Meas::sample(cfg.random_scale, rng);
        let diff = self.jac_noise(&input, &meas, cfg.dt)
            - self.jac_noise_fd(&input, &meas, cfg.dt, cfg.step);
        report("jac_noise", diff.abs().max(), cfg.tolerance)
    }

    /// Runs both Jacobian cross-checks.
    fn check_jacobians(
        &self,
        cfg: &JacobianTestConfig,
        rng: &mut dyn RngCore,
    ) -> (JacobianReport, JacobianReport) {
        (self.check_jac_input(cfg, rng), self.check_jac_noise(cfg, rng))
    }
}

/// Parameters of the Jacobian self-check harness.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JacobianTestConfig {
    /// Finite-difference step size.
    pub step: f64,
    /// Maximum tolerated elementwise absolute difference.
    pub tolerance: f64,
    /// Spread of the random input/measurement draw.
    pub random_scale: f64,
    /// Time step passed to the model.
    pub dt: f64,
}

impl Default for JacobianTestConfig {
    fn default() -> Self {
        Self {
            step: 1e-6,
            tolerance: 1e-6,
            random_scale: 1.0,
            dt: 0.1,
        }
    }
}

/// Result of one Jacobian cross-check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JacobianReport {
    /// Largest elementwise absolute difference between the analytic and the
    /// finite-difference Jacobian.
    pub max_error: f64,
    /// The tolerance the check was run against.
    pub tolerance: f64,
}

impl JacobianReport {
    pub fn passed(&self) -> bool {
        self.max_error <= self.tolerance
    }
}

fn report(label: &str, max_error: f64, tolerance: f64) -> JacobianReport {
    let report = JacobianReport {
        max_error,
        tolerance,
    };
    if report.passed() {
        log::debug!("{label} check passed (max error {max_error:.3e})");
    } else {
        log::warn!("{label} check failed: max error {max_error:.3e} exceeds tolerance {tolerance:.3e}");
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use nalgebra::{SMatrix, SVector, UnitQuaternion, Vector3};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    /// A fully linear model: `y = A x + m + dt * n`.
    #[derive(Debug)]
    struct LinearModel {
        a: SMatrix<f64, 2, 3>,
    }

    impl LinearModel {
        fn new() -> Self {
            Self {
                a: SMatrix::<f64, 2, 3>::new(1.0, 2.0, -0.5, 0.0, -1.0, 3.0),
            }
        }
    }

    impl Model<3, 2, 2, 2> for LinearModel {
        type Input = SVector<f64, 3>;
        type Output = SVector<f64, 2>;
        type Meas = SVector<f64, 2>;
        type Noise = SVector<f64, 2>;

        fn eval(
            &self,
            input: &Self::Input,
            meas: &Self::Meas,
            noise: &Self::Noise,
            dt: f64,
        ) -> Self::Output {
            self.a * input + meas + dt * noise
        }

        fn jac_input(&self, _: &Self::Input, _: &Self::Meas, _: f64) -> Jacobian<2, 3> {
            self.a
        }

        fn jac_noise(&self, _: &Self::Input, _: &Self::Meas, dt: f64) -> Jacobian<2, 2> {
            dt * SMatrix::<f64, 2, 2>::identity()
        }
    }

    /// Rotates the measured direction by the input orientation:
    /// `y = q * m + n`. The input lives on SO(3), so the finite-difference
    /// columns must come out through the rotation chart.
    #[derive(Debug)]
    struct RotationModel;

    impl Model<3, 3, 3, 3> for RotationModel {
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
            // d/d(delta) [exp(delta) q] m = -(q m)^
            -(input.transform_vector(meas)).cross_matrix()
        }

        fn jac_noise(&self, _: &Self::Input, _: &Self::Meas, _: f64) -> Jacobian<3, 3> {
            SMatrix::<f64, 3, 3>::identity()
        }
    }

    /// A model that keeps every default Jacobian.
    #[derive(Debug)]
    struct DefaultJacModel;

    impl Model<2, 2, 2, 2> for DefaultJacModel {
        type Input = SVector<f64, 2>;
        type Output = SVector<f64, 2>;
        type Meas = SVector<f64, 2>;
        type Noise = SVector<f64, 2>;

        fn eval(
            &self,
            input: &Self::Input,
            _: &Self::Meas,
            noise: &Self::Noise,
            _: f64,
        ) -> Self::Output {
            input + noise
        }
    }

    #[test]
    fn linear_model_jacobians_match_fd() {
        let model = LinearModel::new();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let cfg = JacobianTestConfig::default();
        let (input_report, noise_report) = model.check_jacobians(&cfg, &mut rng);
        assert!(input_report.passed(), "max error {}", input_report.max_error);
        assert!(noise_report.passed(), "max error {}", noise_report.max_error);
    }

    #[test]
    fn rotation_model_jacobians_match_fd() {
        let model = RotationModel;
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        // Forward differences carry an O(step) curvature error on SO(3),
        // so the tolerance is looser than for the linear model.
        let cfg = JacobianTestConfig {
            tolerance: 1e-4,
            ..JacobianTestConfig::default()
        };
        let (input_report, noise_report) = model.check_jacobians(&cfg, &mut rng);
        assert!(input_report.passed(), "max error {}", input_report.max_error);
        assert!(noise_report.passed(), "max error {}", noise_report.max_error);
    }

    #[test]
    fn fd_jacobian_matches_analytic_directly() {
        let model = LinearModel::new();
        let input = SVector::<f64, 3>::new(0.3, -1.2, 0.7);
        let meas = SVector::<f64, 2>::new(0.5, 0.5);
        let fd = model.jac_input_fd(&input, &meas, 0.1, 1e-6);
        let analytic = model.jac_input(&input, &meas, 0.1);
        assert_abs_diff_eq!((fd - analytic).abs().max(), 0.0, epsilon = 1e-8);
    }

    #[test]
    fn noise_free_eval_uses_noise_identity() {
        let model = LinearModel::new();
        let input = SVector::<f64, 3>::new(1.0, 0.0, -1.0);
        let meas = SVector::<f64, 2>::new(0.2, -0.3);
        let expected = model.eval(&input, &meas, &SVector::<f64, 2>::zeros(), 0.1);
        assert_eq!(model.eval_noise_free(&input, &meas, 0.1), expected);
    }

    #[test]
    fn default_jacobians_are_zero() {
        let model = DefaultJacModel;
        let input = SVector::<f64, 2>::new(1.0, 2.0);
        let meas = SVector::<f64, 2>::zeros();
        assert_eq!(model.jac_input(&input, &meas, 0.1), SMatrix::<f64, 2, 2>::zeros());
        assert_eq!(model.jac_noise(&input, &meas, 0.1), SMatrix::<f64, 2, 2>::zeros());
        // The self-check reports the mismatch against the (nonzero) FD
        // Jacobian instead of panicking.
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let cfg = JacobianTestConfig::default();
        let report = model.check_jac_input(&cfg, &mut rng);
        assert!(!report.passed());
    }
}
