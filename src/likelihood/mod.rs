//! Likelihood of a cosmology given a supernova Hubble diagram.
//!
//! A [Likelihood] binds together the observed [HubbleDiagram], a
//! [DistanceModel] built for its redshifts and a shared, already factorized
//! [Covariance]. Each call to [Likelihood::log_likelihood]:
//!
//! 1. resolves and validates the cosmology,
//! 2. predicts the distance moduli in one batched call,
//! 3. forms the residual `mu_obs - mu_th`,
//! 4. handles the magnitude offset according to [NuisanceTreatment],
//! 5. combines the quadratic form with the determinant term.
//!
//! Any parameter outside the physical domain yields negative infinity.

pub mod adapter;
pub mod covariance;

pub use adapter::{LogLikelihood, SamplerAdapter};
pub use covariance::{Cholesky, Composition, Covariance, Factorize, OffsetTerms};

use crate::cosmology::quadrature::DEFAULT_ORDER;
use crate::cosmology::{Cosmology, DistanceModel, Model};
use crate::error::{LikelihoodError, Result};
use crate::structs::hubble::HubbleDiagram;
use crate::structs::parameters::{ParameterVector, DELTA_M};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// `ln(2 pi)`
const LN_2PI: f64 = 1.837_877_066_409_345_5;

/// Treatment of the absolute-magnitude offset `delta_m`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NuisanceTreatment {
    /// `delta_m` is read from the parameter vector
    Sampled,
    /// `delta_m` is replaced by the value minimizing the chi-square
    Profiled,
    /// `delta_m` is integrated out in closed form, including the normalization of the integral
    Marginalized,
}

impl fmt::Display for NuisanceTreatment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NuisanceTreatment::Sampled => "sampled",
            NuisanceTreatment::Profiled => "profiled",
            NuisanceTreatment::Marginalized => "marginalized",
        };
        write!(f, "{}", name)
    }
}

/// Prior on the magnitude offset when it is marginalized
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MagnitudePrior {
    /// Improper prior of unit density
    #[default]
    Flat,
    /// Normal prior `N(mean, sigma)`
    Gaussian { mean: f64, sigma: f64 },
}

/// Sampling distribution of the data
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Family {
    /// Multivariate normal
    #[default]
    Gaussian,
    /// Multivariate t for a covariance estimated from `nu` simulations
    /// (Sellentin & Heavens 2016), `ln L = -nu/2 ln(1 + chi2 / (nu - 1))`
    StudentT { nu: f64 },
}

/// Evaluation options fixed for the lifetime of a [Likelihood]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Options {
    pub model: Model,
    pub nuisance: NuisanceTreatment,
    pub prior: MagnitudePrior,
    pub family: Family,
    pub quadrature_order: usize,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            model: Model::FlatLcdm,
            nuisance: NuisanceTreatment::Marginalized,
            prior: MagnitudePrior::Flat,
            family: Family::Gaussian,
            quadrature_order: DEFAULT_ORDER,
        }
    }
}

impl Options {
    pub fn validate(&self) -> Result<()> {
        if let Family::StudentT { nu } = self.family {
            if !nu.is_finite() || nu <= 1.0 {
                return Err(LikelihoodError::InvalidSettings(format!(
                    "the t-distribution needs nu > 1, got {}",
                    nu
                )));
            }
            if self.nuisance == NuisanceTreatment::Marginalized {
                return Err(LikelihoodError::InvalidSettings(
                    "the t-distribution cannot be combined with a marginalized offset; use sampled or profiled"
                        .to_string(),
                ));
            }
        }
        if let MagnitudePrior::Gaussian { mean, sigma } = self.prior {
            if !mean.is_finite() || !sigma.is_finite() || sigma <= 0.0 {
                return Err(LikelihoodError::InvalidSettings(format!(
                    "the magnitude prior needs a finite mean and a positive sigma, got N({}, {})",
                    mean, sigma
                )));
            }
        }
        Ok(())
    }
}

/// Breakdown of one likelihood evaluation
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Evaluation {
    /// Chi-square after the offset treatment
    pub chi2: f64,
    /// `ln |C|`
    pub log_det: f64,
    /// Additive log-likelihood term from marginalizing the offset, zero otherwise
    pub correction: f64,
    /// Offset used: sampled, best-fit, or posterior mean when marginalized
    pub offset: f64,
    pub log_likelihood: f64,
}

/// Log-likelihood of cosmological parameters for one supernova data set
#[derive(Debug, Clone)]
pub struct Likelihood {
    diagram: HubbleDiagram,
    distances: DistanceModel,
    covariance: Arc<Covariance>,
    options: Options,
    /// `ln |C| + N ln(2 pi)`
    normalization: f64,
}

impl Likelihood {
    pub fn new(diagram: HubbleDiagram, covariance: Arc<Covariance>, options: Options) -> Result<Self> {
        options.validate()?;
        if covariance.dim() != diagram.len() {
            return Err(LikelihoodError::DimensionMismatch {
                what: "covariance matrix",
                expected: diagram.len(),
                found: covariance.dim(),
            });
        }
        let distances = DistanceModel::new(diagram.redshifts(), options.quadrature_order)?;
        let normalization = covariance.log_determinant() + diagram.len() as f64 * LN_2PI;

        tracing::info!(
            "Likelihood ready: {} supernovae, model {}, offset {:?}, {:?} distribution",
            diagram.len(),
            options.model,
            options.nuisance,
            options.family
        );

        Ok(Likelihood {
            diagram,
            distances,
            covariance,
            options,
            normalization,
        })
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn diagram(&self) -> &HubbleDiagram {
        &self.diagram
    }

    pub fn covariance(&self) -> &Arc<Covariance> {
        &self.covariance
    }

    pub fn len(&self) -> usize {
        self.diagram.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diagram.is_empty()
    }

    /// Residuals `mu_obs - mu_th` before any offset is applied
    pub fn residuals(&self, params: &ParameterVector) -> Result<Array1<f64>> {
        let cosmo = Cosmology::from_parameters(self.options.model, params)?;
        let predicted = self.distances.predict_all(&cosmo)?;
        Ok(self.diagram.distance_moduli() - &predicted)
    }

    /// Full evaluation, reporting why a parameter vector is rejected
    pub fn evaluate(&self, params: &ParameterVector) -> Result<Evaluation> {
        let residual = self.residuals(params)?;
        let (chi2, offset, correction) = self.treat_offset(&residual, params)?;

        let log_likelihood = match self.options.family {
            Family::Gaussian => -0.5 * (chi2 + self.normalization) + correction,
            Family::StudentT { nu } => -0.5 * nu * (chi2 / (nu - 1.0)).ln_1p(),
        };

        Ok(Evaluation {
            chi2,
            log_det: self.covariance.log_determinant(),
            correction,
            offset,
            log_likelihood,
        })
    }

    /// Log-likelihood, negative infinity for any rejected parameter vector
    pub fn log_likelihood(&self, params: &ParameterVector) -> f64 {
        match self.evaluate(params) {
            Ok(evaluation) if !evaluation.log_likelihood.is_nan() => evaluation.log_likelihood,
            Ok(_) => f64::NEG_INFINITY,
            Err(err) => {
                tracing::trace!("Parameter vector rejected: {}", err);
                f64::NEG_INFINITY
            }
        }
    }

    /// Chi-square after the offset treatment, positive infinity for any rejected parameter vector
    pub fn chi_square(&self, params: &ParameterVector) -> f64 {
        match self.evaluate(params) {
            Ok(evaluation) if !evaluation.chi2.is_nan() => evaluation.chi2,
            _ => f64::INFINITY,
        }
    }

    /// Returns `(chi2, offset, correction)` for the configured offset treatment
    fn treat_offset(&self, residual: &Array1<f64>, params: &ParameterVector) -> Result<(f64, f64, f64)> {
        match self.options.nuisance {
            NuisanceTreatment::Sampled => {
                let offset = params.require(DELTA_M)?;
                if !offset.is_finite() {
                    return Err(LikelihoodError::invalid(DELTA_M, offset, "not finite"));
                }
                let shifted = residual.mapv(|r| r - offset);
                let chi2 = self.covariance.solve_quadratic_form(&shifted)?;
                Ok((chi2, offset, 0.0))
            }
            NuisanceTreatment::Profiled => {
                let terms = self.covariance.offset_terms(residual)?;
                Ok((terms.profiled_chi2(), terms.best_offset(), 0.0))
            }
            NuisanceTreatment::Marginalized => {
                let terms = self.covariance.offset_terms(residual)?;
                Ok(marginalize(&terms, &self.options.prior))
            }
        }
    }
}

/// Integrate `exp(-chi2(M) / 2) p(M)` over the offset `M` in closed form
///
/// Returns `(chi2, offset, correction)` such that the marginal log-likelihood
/// is `-0.5 (chi2 + ln|C| + N ln 2pi) + correction`.
fn marginalize(terms: &OffsetTerms, prior: &MagnitudePrior) -> (f64, f64, f64) {
    match *prior {
        MagnitudePrior::Flat => (
            terms.profiled_chi2(),
            terms.best_offset(),
            0.5 * (LN_2PI - terms.e.ln()),
        ),
        MagnitudePrior::Gaussian { mean, sigma } => {
            let precision = 1.0 / (sigma * sigma);
            let combined = OffsetTerms {
                a: terms.a + mean * mean * precision,
                b: terms.b + mean * precision,
                e: terms.e + precision,
            };
            (
                combined.profiled_chi2(),
                combined.best_offset(),
                -0.5 * (combined.e * sigma * sigma).ln(),
            )
        }
    }
}
