use crate::error::{LikelihoodError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Hubble constant in km/s/Mpc
pub const H0: &str = "h0";
/// Dimensionless Hubble parameter, `h0 = 100 h`
pub const LITTLE_H: &str = "h";
/// Total matter density
pub const OMEGA_M: &str = "omega_m";
/// Cold dark matter density, summed with [OMEGA_B] when [OMEGA_M] is absent
pub const OMEGA_C: &str = "omega_c";
/// Baryon density
pub const OMEGA_B: &str = "omega_b";
/// Curvature density
pub const OMEGA_K: &str = "omega_k";
/// Radiation density
pub const OMEGA_R: &str = "omega_r";
/// Present-day dark energy equation of state
pub const W0: &str = "w0";
/// Alias of [W0]
pub const W: &str = "w";
/// Time evolution of the dark energy equation of state
pub const WA: &str = "wa";
/// Absolute-magnitude offset between observed and predicted distance moduli
pub const DELTA_M: &str = "delta_m";

/// Named parameter values for a single likelihood evaluation
///
/// Names are kept in a sorted map so that iteration order, and therefore anything
/// derived from it, is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterVector {
    values: BTreeMap<String, f64>,
}

impl ParameterVector {
    pub fn new() -> Self {
        ParameterVector::default()
    }

    /// Builder-style insertion
    pub fn with(mut self, name: impl Into<String>, value: f64) -> Self {
        self.insert(name, value);
        self
    }

    /// Zip a list of names with their positional values
    pub fn from_positional(names: &[String], values: &[f64]) -> Result<Self> {
        if names.len() != values.len() {
            return Err(LikelihoodError::DimensionMismatch {
                what: "parameter vector",
                expected: names.len(),
                found: values.len(),
            });
        }
        Ok(names.iter().cloned().zip(values.iter().copied()).collect())
    }

    pub fn insert(&mut self, name: impl Into<String>, value: f64) -> Option<f64> {
        self.values.insert(name.into(), value)
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    /// Get a parameter, failing with [LikelihoodError::MissingParameter] if absent
    pub fn require(&self, name: &str) -> Result<f64> {
        self.get(name)
            .ok_or_else(|| LikelihoodError::MissingParameter(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Return a new vector with the values of `other` layered on top of `self`
    pub fn merged(&self, other: &ParameterVector) -> ParameterVector {
        let mut values = self.values.clone();
        values.extend(other.values.iter().map(|(k, v)| (k.clone(), *v)));
        ParameterVector { values }
    }
}

impl FromIterator<(String, f64)> for ParameterVector {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        ParameterVector {
            values: iter.into_iter().collect(),
        }
    }
}

impl From<HashMap<String, f64>> for ParameterVector {
    fn from(map: HashMap<String, f64>) -> Self {
        map.into_iter().collect()
    }
}

impl From<BTreeMap<String, f64>> for ParameterVector {
    fn from(values: BTreeMap<String, f64>) -> Self {
        ParameterVector { values }
    }
}

/// A free parameter and its flat prior range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub lower: f64,
    pub upper: f64,
}

impl Parameter {
    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }
}

/// Ordered collection of free parameters
///
/// The order defines the positional calling convention of the
/// [SamplerAdapter](crate::likelihood::adapter::SamplerAdapter).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Parameters {
    parameters: Vec<Parameter>,
}

impl Parameters {
    pub fn new() -> Self {
        Parameters::default()
    }

    /// Add a free parameter with range `[lower, upper]`
    ///
    /// Adding a name twice replaces the earlier range in place.
    pub fn add(mut self, name: impl Into<String>, lower: f64, upper: f64) -> Self {
        let parameter = Parameter {
            name: name.into(),
            lower,
            upper,
        };
        match self.parameters.iter_mut().find(|p| p.name == parameter.name) {
            Some(existing) => *existing = parameter,
            None => self.parameters.push(parameter),
        }
        self
    }

    pub fn names(&self) -> Vec<String> {
        self.parameters.iter().map(|p| p.name.clone()).collect()
    }

    pub fn ranges(&self) -> Vec<(f64, f64)> {
        self.parameters.iter().map(|p| (p.lower, p.upper)).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters.iter()
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// Check that every range is finite and non-empty
    pub fn validate(&self) -> Result<()> {
        for p in &self.parameters {
            if !p.lower.is_finite() || !p.upper.is_finite() || p.lower >= p.upper {
                return Err(LikelihoodError::InvalidSettings(format!(
                    "range of parameter {} must be finite with lower < upper, got [{}, {}]",
                    p.name, p.lower, p.upper
                )));
            }
        }
        Ok(())
    }

    /// Whether all parameters present in `vector` lie within their ranges
    ///
    /// Names in `vector` without a range are not checked.
    pub fn within_bounds(&self, vector: &ParameterVector) -> bool {
        self.parameters
            .iter()
            .all(|p| vector.get(&p.name).map_or(true, |v| p.contains(v)))
    }
}
