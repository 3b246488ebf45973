// filter_core/src/outlier.rs

use crate::properties::PropertyRegistry;
use crate::types::{Innovation, InnovationCovariance, ObservationJacobian};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Quadratic fit to the chi-square critical value as a function of the block
/// dimension. An engineering shortcut that avoids a quantile table; it was
/// calibrated for small-to-moderate dimensions, so callers gating wide blocks
/// should override the threshold per gate.
pub fn chi_square_threshold(dim: usize) -> f64 {
    let d = dim as f64;
    -0.0376136 * d * d + 1.99223 * d + 2.05183
}

// --- BLOCK DESCRIPTOR ---

/// Describes how a contiguous run of the innovation vector decomposes into
/// independently gated blocks: `repeat` blocks of `width` starting at
/// `offset`, each at an increasing offset.
///
/// A zero-width descriptor contributes no gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockDescriptor {
    pub offset: usize,
    pub width: usize,
    #[serde(default = "default_repeat")]
    pub repeat: usize,
}

fn default_repeat() -> usize {
    1
}

impl BlockDescriptor {
    /// A single block `[offset, offset + width)`.
    pub fn new(offset: usize, width: usize) -> Self {
        Self {
            offset,
            width,
            repeat: 1,
        }
    }

    /// `repeat` consecutive same-width blocks starting at `offset`.
    pub fn repeated(offset: usize, width: usize, repeat: usize) -> Self {
        Self {
            offset,
            width,
            repeat,
        }
    }
}

/// A misconfigured gate layout, rejected at construction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OutlierConfigError {
    #[error(
        "innovation blocks [{first_start}..{first_end}) and [{second_start}..{second_end}) overlap"
    )]
    OverlappingBlocks {
        first_start: usize,
        first_end: usize,
        second_start: usize,
        second_end: usize,
    },
}

// --- OUTLIER GATE ---

/// One gate of the chain, owning the innovation slice `[offset, offset + width)`.
#[derive(Debug, Clone)]
pub struct OutlierGate {
    offset: usize,
    width: usize,
    /// Last gating decision.
    outlier: bool,
    /// Whether a rejected block is neutralized in `Py`/`H`.
    enabled: bool,
    mahalanobis_th: f64,
    /// Consecutive-outlier streak, telemetry only.
    outlier_count: u32,
}

impl OutlierGate {
    fn new(offset: usize, width: usize) -> Self {
        Self {
            offset,
            width,
            outlier: false,
            enabled: false,
            mahalanobis_th: chi_square_threshold(width),
            outlier_count: 0,
        }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn is_outlier(&self) -> bool {
        self.outlier
    }

    /// Gates this block: Mahalanobis distance of the slice against its own
    /// covariance block, compared to the threshold.
    fn check(&mut self, innovation: &Innovation, py: &InnovationCovariance) {
        let v_sub = innovation.rows(self.offset, self.width).into_owned();
        let py_sub = py
            .view((self.offset, self.offset), (self.width, self.width))
            .into_owned();
        let py_inv = match py_sub.try_inverse() {
            Some(inv) => inv,
            None => {
                // Well-conditioned Py is a documented precondition; a singular
                // block leaves this gate undecided for the cycle.
                log::warn!(
                    "outlier gate [{}..{}): singular covariance block, gating skipped",
                    self.offset,
                    self.offset + self.width
                );
                self.outlier = false;
                return;
            }
        };
        let d = (v_sub.transpose() * py_inv * &v_sub)[(0, 0)];
        self.outlier = d > self.mahalanobis_th;
        if self.outlier {
            self.outlier_count += 1;
        } else {
            self.outlier_count = 0;
        }
    }

    /// Removes this block's influence on the joint update while keeping the
    /// matrix dimensions intact: cross-covariance strips and the block's rows
    /// of `H` go to zero, the block's own covariance becomes identity.
    fn neutralize(&self, py: &mut InnovationCovariance, h_jac: &mut ObservationJacobian) {
        let (s, d) = (self.offset, self.width);
        let n = py.nrows();
        let h_cols = h_jac.ncols();
        py.view_mut((0, s), (n, d)).fill(0.0);
        py.view_mut((s, 0), (d, n)).fill(0.0);
        py.view_mut((s, s), (d, d)).fill_with_identity();
        h_jac.view_mut((s, 0), (d, h_cols)).fill(0.0);
    }

    fn reset(&mut self) {
        self.outlier = false;
        self.outlier_count = 0;
    }
}

// --- OUTLIER DETECTION CHAIN ---

/// An ordered sequence of [`OutlierGate`]s over disjoint contiguous slices of
/// one innovation vector. The layout is fixed at construction; per-cycle
/// state is the per-gate decision and streak.
///
/// Gates are addressed by their flat zero-based index in chain order; an
/// out-of-range index is a programmer error and panics.
#[derive(Debug, Clone)]
pub struct OutlierDetection {
    gates: Vec<OutlierGate>,
    /// Smallest innovation dimension the configured blocks fit into.
    min_dim: usize,
}

impl OutlierDetection {
    /// Expands the descriptor list into the flat gate sequence, rejecting
    /// overlapping block ranges.
    pub fn new(blocks: &[BlockDescriptor]) -> Result<Self, OutlierConfigError> {
        let mut gates = Vec::new();
        for block in blocks {
            if block.width == 0 {
                continue;
            }
            for k in 0..block.repeat {
                gates.push(OutlierGate::new(block.offset + k * block.width, block.width));
            }
        }

        let mut spans: Vec<(usize, usize)> = gates
            .iter()
            .map(|g| (g.offset, g.offset + g.width))
            .collect();
        spans.sort_unstable();
        for pair in spans.windows(2) {
            if pair[1].0 < pair[0].1 {
                return Err(OutlierConfigError::OverlappingBlocks {
                    first_start: pair[0].0,
                    first_end: pair[0].1,
                    second_start: pair[1].0,
                    second_end: pair[1].1,
                });
            }
        }
        let min_dim = spans.last().map_or(0, |span| span.1);

        Ok(Self { gates, min_dim })
    }

    /// Runs every gate over the shared buffers, in chain order: compute the
    /// slice's Mahalanobis distance, update the decision and streak, and
    /// neutralize the slice's contribution to `py`/`h_jac` if it is a
    /// rejected block on an enabled gate.
    ///
    /// The gated diagonal blocks are disjoint, so earlier neutralizations
    /// never feed into later distance computations.
    pub fn process(
        &mut self,
        innovation: &Innovation,
        py: &mut InnovationCovariance,
        h_jac: &mut ObservationJacobian,
    ) {
        assert!(
            innovation.len() >= self.min_dim,
            "OutlierDetection::process: innovation dimension {} is smaller than the configured block span {}",
            innovation.len(),
            self.min_dim
        );
        assert_eq!(
            py.nrows(),
            innovation.len(),
            "OutlierDetection::process: covariance rows must match the innovation dimension"
        );
        assert_eq!(
            py.ncols(),
            innovation.len(),
            "OutlierDetection::process: covariance columns must match the innovation dimension"
        );
        assert_eq!(
            h_jac.nrows(),
            innovation.len(),
            "OutlierDetection::process: observation Jacobian rows must match the innovation dimension"
        );

        for i in 0..self.gates.len() {
            self.gates[i].check(innovation, py);
            let gate = &self.gates[i];
            if gate.outlier && gate.enabled {
                gate.neutralize(py, h_jac);
            }
        }
    }

    /// Number of gates in the chain.
    pub fn len(&self) -> usize {
        self.gates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gates.is_empty()
    }

    /// Clears every gate's decision and streak.
    pub fn reset(&mut self) {
        for gate in &mut self.gates {
            gate.reset();
        }
    }

    /// Last decision of gate `i`.
    pub fn is_outlier(&self, i: usize) -> bool {
        self.gate(i).outlier
    }

    pub fn set_enabled(&mut self, i: usize, enabled: bool) {
        self.gate_mut(i).enabled = enabled;
    }

    pub fn set_enabled_all(&mut self, enabled: bool) {
        for gate in &mut self.gates {
            gate.enabled = enabled;
        }
    }

    /// Consecutive-outlier streak of gate `i`.
    pub fn outlier_count(&self, i: usize) -> u32 {
        self.gate(i).outlier_count
    }

    /// Mutable streak access, e.g. for external telemetry resets.
    pub fn outlier_count_mut(&mut self, i: usize) -> &mut u32 {
        &mut self.gate_mut(i).outlier_count
    }

    pub fn mahalanobis_th(&self, i: usize) -> f64 {
        self.gate(i).mahalanobis_th
    }

    /// Mutable threshold access for live tuning.
    pub fn mahalanobis_th_mut(&mut self, i: usize) -> &mut f64 {
        &mut self.gate_mut(i).mahalanobis_th
    }

    pub fn gate(&self, i: usize) -> &OutlierGate {
        assert!(
            i < self.gates.len(),
            "outlier gate index {} out of range ({} gates)",
            i,
            self.gates.len()
        );
        &self.gates[i]
    }

    fn gate_mut(&mut self, i: usize) -> &mut OutlierGate {
        assert!(
            i < self.gates.len(),
            "outlier gate index {} out of range ({} gates)",
            i,
            self.gates.len()
        );
        &mut self.gates[i]
    }

    /// Registers every gate's threshold as `prefix + flat_index` with the
    /// given registry, so configuration can override the chi-square defaults.
    pub fn register_properties(&mut self, registry: &mut dyn PropertyRegistry, prefix: &str) {
        for (i, gate) in self.gates.iter_mut().enumerate() {
            registry.register_scalar(&format!("{prefix}{i}"), &mut gate.mahalanobis_th);
        }
    }
}
