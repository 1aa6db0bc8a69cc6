//! Monotone probability calibration.
//!
//! Fits `logit P(detected) = Σ βⱼ Bⱼ(raw)` where `Bⱼ` is a clamped cubic
//! B-spline basis over the observed raw range. Coefficients are kept
//! non-decreasing by the reparameterization `β₀ = γ₀`, `βⱼ = βⱼ₋₁ + exp(γⱼ)`,
//! and a second-difference penalty on `γ₁..` keeps the curve smooth. The
//! penalized likelihood is maximized by Fisher scoring with step halving.
//!
//! The fitted curve is tabulated on a dense grid and interpolated, which
//! makes [`CalibrationMap::apply`] exactly monotone in floating point.

use faer::linalg::solvers::{Llt, Solve};
use faer::{Mat, Side};
use ndarray::{Array1, Array2, Axis};
use tracing::{debug, info, instrument};

use crate::error::ModelError;

/// Spline order (cubic); lowered when fewer basis functions are requested.
const ORDER: usize = 4;
/// Ridge added to every coefficient so the system stays positive definite.
const RIDGE: f64 = 1e-6;
/// Largest `γ` passed to `exp`.
const MAX_LOG_INCREMENT: f64 = 30.0;
const MAX_HALVINGS: usize = 40;

/// Fits a [`CalibrationMap`] from raw predictions and labels.
///
/// # Defaults
///
/// | Parameter            | Default |
/// |----------------------|---------|
/// | `degrees_of_freedom` | 5       |
/// | `smoothing`          | 1.0     |
/// | `max_iter`           | 200     |
/// | `tolerance`          | 1e-9    |
/// | `min_positives`      | 10      |
/// | `table_size`         | 1001    |
#[derive(Debug, Clone)]
pub struct Calibrator {
    degrees_of_freedom: usize,
    smoothing: f64,
    max_iter: usize,
    tolerance: f64,
    min_positives: usize,
    table_size: usize,
}

impl Calibrator {
    /// Create a calibrator with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            degrees_of_freedom: 5,
            smoothing: 1.0,
            max_iter: 200,
            tolerance: 1e-9,
            min_positives: 10,
            table_size: 1001,
        }
    }

    /// Set the number of B-spline basis functions (at least 3).
    #[must_use]
    pub fn with_degrees_of_freedom(mut self, degrees_of_freedom: usize) -> Self {
        self.degrees_of_freedom = degrees_of_freedom;
        self
    }

    /// Set the second-difference penalty weight.
    #[must_use]
    pub fn with_smoothing(mut self, smoothing: f64) -> Self {
        self.smoothing = smoothing;
        self
    }

    /// Set the maximum number of scoring iterations.
    #[must_use]
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Set the relative objective change that counts as converged.
    #[must_use]
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Set the minimum number of detections required to fit.
    #[must_use]
    pub fn with_min_positives(mut self, min_positives: usize) -> Self {
        self.min_positives = min_positives;
        self
    }

    /// Set the number of nodes in the interpolation table (at least 2).
    #[must_use]
    pub fn with_table_size(mut self, table_size: usize) -> Self {
        self.table_size = table_size;
        self
    }

    fn validate(&self) -> Result<(), ModelError> {
        if self.degrees_of_freedom < 3 {
            return Err(ModelError::InvalidDegreesOfFreedom {
                df: self.degrees_of_freedom,
            });
        }
        if !self.smoothing.is_finite() || self.smoothing < 0.0 {
            return Err(ModelError::InvalidCalibrationParameter {
                name: "smoothing",
                value: self.smoothing,
            });
        }
        if !self.tolerance.is_finite() || self.tolerance <= 0.0 {
            return Err(ModelError::InvalidCalibrationParameter {
                name: "tolerance",
                value: self.tolerance,
            });
        }
        if self.max_iter == 0 {
            return Err(ModelError::InvalidCalibrationParameter {
                name: "max_iter",
                value: 0.0,
            });
        }
        if self.table_size < 2 {
            return Err(ModelError::InvalidCalibrationParameter {
                name: "table_size",
                value: self.table_size as f64,
            });
        }
        Ok(())
    }

    /// Fit the calibration curve.
    ///
    /// # Errors
    ///
    /// | Variant                                       | When                                          |
    /// |-----------------------------------------------|-----------------------------------------------|
    /// | [`ModelError::InvalidDegreesOfFreedom`]       | fewer than 3 basis functions                  |
    /// | [`ModelError::InvalidCalibrationParameter`]   | smoothing, tolerance, or iteration limit bad  |
    /// | [`ModelError::EmptyInput`]                    | no rows                                       |
    /// | [`ModelError::LengthMismatch`]                | `raw.len() != labels.len()`                   |
    /// | [`ModelError::NonFinitePrediction`]           | a raw value is NaN or infinite                |
    /// | [`ModelError::InsufficientPositives`]         | fewer than `min_positives` detections         |
    /// | [`ModelError::NoNegatives`]                   | no non-detections                             |
    /// | [`ModelError::DegenerateRange`]               | all raw values equal                          |
    /// | [`ModelError::CalibrationFailed`]             | the scoring system is singular                |
    /// | [`ModelError::CalibrationNotConverged`]       | `max_iter` reached                            |
    #[instrument(skip_all, fields(n = raw.len(), df = self.degrees_of_freedom))]
    pub fn fit(&self, raw: &[f64], labels: &[bool]) -> Result<CalibrationMap, ModelError> {
        self.validate()?;
        if raw.is_empty() {
            return Err(ModelError::EmptyInput {
                stage: "calibration",
            });
        }
        if raw.len() != labels.len() {
            return Err(ModelError::LengthMismatch {
                n_predictions: raw.len(),
                n_labels: labels.len(),
            });
        }
        if let Some(index) = raw.iter().position(|v| !v.is_finite()) {
            return Err(ModelError::NonFinitePrediction { index });
        }
        let n_positives = labels.iter().filter(|&&y| y).count();
        if n_positives < self.min_positives {
            return Err(ModelError::InsufficientPositives {
                n_positives,
                min_positives: self.min_positives,
            });
        }
        if n_positives == labels.len() {
            return Err(ModelError::NoNegatives);
        }
        let lo = raw.iter().copied().fold(f64::INFINITY, f64::min);
        let hi = raw.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if hi - lo <= f64::EPSILON * hi.abs().max(1.0) {
            return Err(ModelError::DegenerateRange { lo, hi });
        }

        let basis = SplineBasis::new(lo, hi, self.degrees_of_freedom);
        let mut design = Array2::<f64>::zeros((raw.len(), self.degrees_of_freedom));
        for (mut row, &x) in design.axis_iter_mut(Axis(0)).zip(raw) {
            row.assign(&basis.evaluate(x));
        }
        let gamma = self.score(&design, labels, n_positives)?;
        let beta = coefficients(&gamma);

        // Tabulate, then force the table non-decreasing.
        let n = self.table_size;
        let mut table: Vec<f64> = (0..n)
            .map(|m| {
                let x = lo + (hi - lo) * m as f64 / (n - 1) as f64;
                sigmoid(basis.evaluate(x).dot(&beta)).clamp(0.0, 1.0)
            })
            .collect();
        for m in 1..n {
            if table[m] < table[m - 1] {
                table[m] = table[m - 1];
            }
        }

        info!(
            lo,
            hi,
            calibrated_lo = table[0],
            calibrated_hi = table[n - 1],
            "calibration fitted"
        );

        Ok(CalibrationMap {
            lo,
            hi,
            table,
            coefficients: beta.to_vec(),
        })
    }

    /// Penalized Fisher scoring over `γ`.
    fn score(
        &self,
        design: &Array2<f64>,
        labels: &[bool],
        n_positives: usize,
    ) -> Result<Array1<f64>, ModelError> {
        let k = self.degrees_of_freedom;
        let penalty = penalty_matrix(k, self.smoothing);

        let prevalence = n_positives as f64 / labels.len() as f64;
        let mut gamma = Array1::from_elem(k, 0.1f64.ln());
        gamma[0] = (prevalence / (1.0 - prevalence)).ln() - 0.1 * (k - 1) as f64 / 2.0;

        let mut objective = penalized_loglik(design, labels, &gamma, &penalty);
        if !objective.is_finite() {
            return Err(ModelError::CalibrationFailed {
                reason: "non-finite initial likelihood".to_string(),
            });
        }

        for iteration in 1..=self.max_iter {
            let (gradient, information) = score_system(design, labels, &gamma, &penalty);
            let step = solve_spd(&information, &gradient)?;

            let mut scale = 1.0;
            let mut accepted = None;
            for _ in 0..MAX_HALVINGS {
                let mut candidate = gamma.clone();
                candidate.scaled_add(scale, &step);
                let value = penalized_loglik(design, labels, &candidate, &penalty);
                if value.is_finite() && value >= objective {
                    accepted = Some((candidate, value));
                    break;
                }
                scale *= 0.5;
            }

            // No ascent along the scoring direction: at the optimum to
            // working precision.
            let Some((candidate, value)) = accepted else {
                debug!(iteration, objective, "step halving exhausted");
                return Ok(gamma);
            };

            let change = value - objective;
            gamma = candidate;
            objective = value;
            debug!(iteration, objective, scale, "scoring step");
            if change <= self.tolerance * (objective.abs() + self.tolerance) {
                return Ok(gamma);
            }
        }

        Err(ModelError::CalibrationNotConverged {
            iterations: self.max_iter,
        })
    }
}

impl Default for Calibrator {
    fn default() -> Self {
        Self::new()
    }
}

/// A fitted monotone map from raw ensemble probability to calibrated
/// encounter rate.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CalibrationMap {
    lo: f64,
    hi: f64,
    table: Vec<f64>,
    coefficients: Vec<f64>,
}

impl CalibrationMap {
    /// Map a raw probability to a calibrated one.
    ///
    /// Inputs outside the fitted raw range are clamped to it; NaN maps to
    /// the lower end. For `a <= b`, `apply(a) <= apply(b)`.
    #[must_use]
    pub fn apply(&self, raw: f64) -> f64 {
        let n = self.table.len();
        let x = if raw.is_nan() { self.lo } else { raw.clamp(self.lo, self.hi) };
        let t = (x - self.lo) / (self.hi - self.lo) * (n - 1) as f64;
        let m = (t.floor() as usize).min(n - 2);
        let frac = (t - m as f64).clamp(0.0, 1.0);
        let (y0, y1) = (self.table[m], self.table[m + 1]);
        (y0 + (y1 - y0) * frac).clamp(y0, y1)
    }

    /// Map every raw probability in order.
    #[must_use]
    pub fn apply_batch(&self, raw: &[f64]) -> Vec<f64> {
        raw.iter().map(|&r| self.apply(r)).collect()
    }

    /// Return the raw range the map was fitted on.
    #[must_use]
    pub fn raw_range(&self) -> (f64, f64) {
        (self.lo, self.hi)
    }

    /// Return the fitted, non-decreasing spline coefficients on the logit scale.
    #[must_use]
    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }
}

/// Clamped B-spline basis with evenly spaced interior knots.
struct SplineBasis {
    knots: Vec<f64>,
    n_basis: usize,
    order: usize,
}

impl SplineBasis {
    fn new(lo: f64, hi: f64, n_basis: usize) -> Self {
        let order = ORDER.min(n_basis);
        let n_interior = n_basis - order;
        let mut knots = vec![lo; order];
        for i in 1..=n_interior {
            knots.push(lo + (hi - lo) * i as f64 / (n_interior + 1) as f64);
        }
        knots.extend(std::iter::repeat_n(hi, order));
        Self {
            knots,
            n_basis,
            order,
        }
    }

    /// All basis values at `x`; at most `order` are non-zero and they sum to 1.
    fn evaluate(&self, x: f64) -> Array1<f64> {
        let degree = self.order - 1;
        let k = self.n_basis;
        let t = &self.knots;
        let x = x.clamp(t[0], t[t.len() - 1]);

        // Knot span with t[span] <= x < t[span + 1]; the right end uses the last span.
        let span = if x >= t[k] {
            k - 1
        } else {
            let mut s = degree;
            while s < k - 1 && x >= t[s + 1] {
                s += 1;
            }
            s
        };

        let mut local = [0.0f64; ORDER];
        let mut left = [0.0f64; ORDER];
        let mut right = [0.0f64; ORDER];
        local[0] = 1.0;
        for j in 1..=degree {
            left[j] = x - t[span + 1 - j];
            right[j] = t[span + j] - x;
            let mut saved = 0.0;
            for r in 0..j {
                let temp = local[r] / (right[r + 1] + left[j - r]);
                local[r] = saved + right[r + 1] * temp;
                saved = left[j - r] * temp;
            }
            local[j] = saved;
        }

        let mut values = Array1::<f64>::zeros(k);
        for (r, v) in local.iter().take(self.order).enumerate() {
            values[span - degree + r] = *v;
        }
        values
    }
}

/// `β` from `γ`: `β₀ = γ₀`, `βⱼ = βⱼ₋₁ + exp(γⱼ)`.
fn coefficients(gamma: &Array1<f64>) -> Array1<f64> {
    let mut acc = 0.0;
    gamma
        .iter()
        .enumerate()
        .map(|(j, &g)| {
            acc += if j == 0 { g } else { g.min(MAX_LOG_INCREMENT).exp() };
            acc
        })
        .collect()
}

/// `λ·D₂ᵀD₂` on `γ₁..` plus a small ridge on every coefficient.
fn penalty_matrix(k: usize, smoothing: f64) -> Array2<f64> {
    let mut p = Array2::<f64>::zeros((k, k));
    // Rows of D₂ act on γ indices (j, j+1, j+2) for j >= 1.
    let coef = [1.0, -2.0, 1.0];
    for j in 1..k.saturating_sub(2) {
        for a in 0..3 {
            for b in 0..3 {
                p[[j + a, j + b]] += smoothing * coef[a] * coef[b];
            }
        }
    }
    p.diag_mut().mapv_inplace(|d| d + RIDGE);
    p
}

fn penalized_loglik(
    design: &Array2<f64>,
    labels: &[bool],
    gamma: &Array1<f64>,
    penalty: &Array2<f64>,
) -> f64 {
    let eta = design.dot(&coefficients(gamma));
    let loglik: f64 = eta
        .iter()
        .zip(labels)
        .map(|(&eta, &y)| (if y { eta } else { 0.0 }) - softplus(eta))
        .sum();
    loglik - 0.5 * gamma.dot(&penalty.dot(gamma))
}

/// Gradient and expected information of the penalized log-likelihood in `γ`.
fn score_system(
    design: &Array2<f64>,
    labels: &[bool],
    gamma: &Array1<f64>,
    penalty: &Array2<f64>,
) -> (Array1<f64>, Array2<f64>) {
    let (n, k) = design.dim();
    let eta = design.dot(&coefficients(gamma));
    let increments = gamma.mapv(|g| g.min(MAX_LOG_INCREMENT).exp());

    let mut jacobian = Array2::<f64>::zeros((n, k));
    let mut weights = Array1::<f64>::zeros(n);
    let mut residuals = Array1::<f64>::zeros(n);
    for (i, (row, &y)) in design.outer_iter().zip(labels).enumerate() {
        let mu = sigmoid(eta[i]);
        weights[i] = (mu * (1.0 - mu)).max(1e-12);
        residuals[i] = if y { 1.0 - mu } else { -mu };

        // ∂η/∂γ₀ = Σ Bⱼ; ∂η/∂γₘ = exp(γₘ)·Σ_{j≥m} Bⱼ.
        let mut tail = 0.0;
        for m in (0..k).rev() {
            tail += row[m];
            jacobian[[i, m]] = if m == 0 { tail } else { increments[m] * tail };
        }
    }

    let gradient = jacobian.t().dot(&residuals) - penalty.dot(gamma);
    let weighted = &jacobian * &weights.insert_axis(Axis(1));
    let information = jacobian.t().dot(&weighted) + penalty;
    (gradient, information)
}

/// Solve `A x = b` for symmetric positive definite `A` by Cholesky.
fn solve_spd(a: &Array2<f64>, b: &Array1<f64>) -> Result<Array1<f64>, ModelError> {
    let not_spd = || ModelError::CalibrationFailed {
        reason: "information matrix is not positive definite".to_string(),
    };
    if a.iter().chain(b.iter()).any(|v| !v.is_finite()) {
        return Err(not_spd());
    }
    let k = b.len();
    let af = Mat::from_fn(k, k, |i, j| a[[i, j]]);
    let llt = Llt::new(af.as_ref(), Side::Lower).map_err(|_| not_spd())?;
    let bf = Mat::from_fn(k, 1, |i, _| b[i]);
    let x = llt.solve(bf.as_ref());
    Ok(Array1::from_iter((0..k).map(|i| x[(i, 0)])))
}

fn sigmoid(eta: f64) -> f64 {
    if eta >= 0.0 {
        1.0 / (1.0 + (-eta).exp())
    } else {
        let e = eta.exp();
        e / (1.0 + e)
    }
}

fn softplus(eta: f64) -> f64 {
    eta.max(0.0) + (-eta.abs()).exp().ln_1p()
}
