use super::Likelihood;
use crate::structs::parameters::{ParameterVector, Parameters};
use ndarray::{Array1, Array2, Zip};
use std::collections::HashMap;
use std::sync::Arc;

/// A log-likelihood that can be handed to an external sampler
///
/// Implementations must be pure and total: identical input gives identical
/// output, and rejected points return negative infinity instead of failing.
pub trait LogLikelihood: Send + Sync {
    fn log_likelihood(&self, params: &ParameterVector) -> f64;
}

impl LogLikelihood for Likelihood {
    fn log_likelihood(&self, params: &ParameterVector) -> f64 {
        Likelihood::log_likelihood(self, params)
    }
}

/// Calling conventions for external samplers
///
/// Translates positional or named arguments into a [ParameterVector], layers
/// them over the fixed parameters, applies the flat prior ranges of the free
/// parameters and forwards to the wrapped [LogLikelihood]. It keeps no state
/// between calls and can be shared across walkers and chains.
#[derive(Debug, Clone)]
pub struct SamplerAdapter<L: LogLikelihood = Likelihood> {
    likelihood: Arc<L>,
    free: Parameters,
    names: Vec<String>,
    fixed: ParameterVector,
}

impl<L: LogLikelihood> SamplerAdapter<L> {
    pub fn new(likelihood: Arc<L>, free: Parameters, fixed: ParameterVector) -> Self {
        let names = free.names();
        SamplerAdapter {
            likelihood,
            free,
            names,
            fixed,
        }
    }

    /// Names of the free parameters, in positional order
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Number of free parameters
    pub fn ndim(&self) -> usize {
        self.names.len()
    }

    pub fn free(&self) -> &Parameters {
        &self.free
    }

    pub fn fixed(&self) -> &ParameterVector {
        &self.fixed
    }

    /// Evaluate a named parameter vector, merged over the fixed parameters
    pub fn evaluate(&self, point: &ParameterVector) -> f64 {
        let params = self.fixed.merged(point);
        if !self.free.within_bounds(&params) {
            return f64::NEG_INFINITY;
        }
        self.likelihood.log_likelihood(&params)
    }

    /// Positional convention, values ordered as [SamplerAdapter::names]
    pub fn call(&self, theta: &[f64]) -> f64 {
        match ParameterVector::from_positional(&self.names, theta) {
            Ok(point) => self.evaluate(&point),
            Err(err) => {
                tracing::trace!("Positional call rejected: {}", err);
                f64::NEG_INFINITY
            }
        }
    }

    /// Named convention
    pub fn call_named(&self, values: &HashMap<String, f64>) -> f64 {
        let point: ParameterVector = values.iter().map(|(k, v)| (k.clone(), *v)).collect();
        self.evaluate(&point)
    }

    /// Evaluate every row of `points` in parallel
    pub fn call_batch(&self, points: &Array2<f64>) -> Array1<f64> {
        let mut out = Array1::from_elem(points.nrows(), f64::NEG_INFINITY);
        Zip::from(&mut out)
            .and(points.rows())
            .par_for_each(|value, row| {
                let theta: Vec<f64> = row.iter().copied().collect();
                *value = self.call(&theta);
            });
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structs::parameters::{OMEGA_M, W0};
    use ndarray::array;

    /// Gaussian bump around (0.3, -1.0)
    struct Bump;

    impl LogLikelihood for Bump {
        fn log_likelihood(&self, params: &ParameterVector) -> f64 {
            let om = params.get(OMEGA_M).unwrap_or(f64::NAN);
            let w = params.get(W0).unwrap_or(f64::NAN);
            -0.5 * ((om - 0.3).powi(2) + (w + 1.0).powi(2))
        }
    }

    fn adapter() -> SamplerAdapter<Bump> {
        let free = Parameters::new().add(OMEGA_M, 0.0, 1.0);
        let fixed = ParameterVector::new().with(W0, -1.0);
        SamplerAdapter::new(Arc::new(Bump), free, fixed)
    }

    #[test]
    fn positional_and_named_calls_agree() {
        let adapter = adapter();
        let named = HashMap::from([(OMEGA_M.to_string(), 0.4)]);
        assert_eq!(adapter.call(&[0.4]), adapter.call_named(&named));
        assert_eq!(adapter.call(&[0.3]), 0.0);
    }

    #[test]
    fn out_of_range_and_wrong_length_are_rejected() {
        let adapter = adapter();
        assert_eq!(adapter.call(&[1.5]), f64::NEG_INFINITY);
        assert_eq!(adapter.call(&[0.3, 0.1]), f64::NEG_INFINITY);
    }

    #[test]
    fn named_values_override_fixed_parameters() {
        let adapter = adapter();
        let named = HashMap::from([(OMEGA_M.to_string(), 0.3), (W0.to_string(), -0.8)]);
        assert!((adapter.call_named(&named) + 0.02).abs() < 1e-12);
    }

    #[test]
    fn batch_matches_sequential_calls() {
        let adapter = adapter();
        let points = array![[0.1], [0.3], [2.0], [0.7]];
        let batch = adapter.call_batch(&points);
        for (row, value) in points.rows().into_iter().zip(batch.iter()) {
            assert_eq!(*value, adapter.call(&[row[0]]));
        }
        assert_eq!(batch[2], f64::NEG_INFINITY);
    }
}
