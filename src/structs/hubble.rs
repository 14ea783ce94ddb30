use crate::error::{LikelihoodError, Result};
use ndarray::Array1;

/// Observed Hubble diagram of a supernova sample
///
/// Entry `i` corresponds to row and column `i` of the covariance matrix. The
/// diagram is validated on construction and immutable afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct HubbleDiagram {
    names: Option<Vec<String>>,
    redshifts: Array1<f64>,
    distance_moduli: Array1<f64>,
    errors: Option<Array1<f64>>,
}

impl HubbleDiagram {
    pub fn new(
        redshifts: Array1<f64>,
        distance_moduli: Array1<f64>,
        errors: Option<Array1<f64>>,
    ) -> Result<Self> {
        let n = redshifts.len();
        if n == 0 {
            return Err(LikelihoodError::InvalidData(
                "the Hubble diagram contains no entries".to_string(),
            ));
        }
        if distance_moduli.len() != n {
            return Err(LikelihoodError::DimensionMismatch {
                what: "distance modulus column",
                expected: n,
                found: distance_moduli.len(),
            });
        }
        if let Some((i, z)) = redshifts
            .iter()
            .enumerate()
            .find(|(_, z)| !z.is_finite() || **z <= 0.0)
        {
            return Err(LikelihoodError::InvalidData(format!(
                "redshift of entry {} must be finite and positive, got {}",
                i, z
            )));
        }
        if let Some((i, mu)) = distance_moduli
            .iter()
            .enumerate()
            .find(|(_, mu)| !mu.is_finite())
        {
            return Err(LikelihoodError::InvalidData(format!(
                "distance modulus of entry {} is not finite ({})",
                i, mu
            )));
        }
        if let Some(errors) = &errors {
            if errors.len() != n {
                return Err(LikelihoodError::DimensionMismatch {
                    what: "error column",
                    expected: n,
                    found: errors.len(),
                });
            }
            if let Some((i, e)) = errors
                .iter()
                .enumerate()
                .find(|(_, e)| !e.is_finite() || **e < 0.0)
            {
                return Err(LikelihoodError::InvalidData(format!(
                    "error of entry {} must be finite and non-negative, got {}",
                    i, e
                )));
            }
        }

        Ok(HubbleDiagram {
            names: None,
            redshifts,
            distance_moduli,
            errors,
        })
    }

    /// Attach supernova names, one per entry
    pub fn with_names(mut self, names: Vec<String>) -> Result<Self> {
        if names.len() != self.len() {
            return Err(LikelihoodError::DimensionMismatch {
                what: "name column",
                expected: self.len(),
                found: names.len(),
            });
        }
        self.names = Some(names);
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.redshifts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.redshifts.is_empty()
    }

    pub fn redshifts(&self) -> &Array1<f64> {
        &self.redshifts
    }

    pub fn distance_moduli(&self) -> &Array1<f64> {
        &self.distance_moduli
    }

    /// Per-entry distance modulus uncertainties, if the input provided them
    pub fn errors(&self) -> Option<&Array1<f64>> {
        self.errors.as_ref()
    }

    pub fn names(&self) -> Option<&[String]> {
        self.names.as_deref()
    }

    pub fn max_redshift(&self) -> f64 {
        self.redshifts.iter().copied().fold(0.0, f64::max)
    }
}
