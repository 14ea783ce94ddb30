//! Background cosmology: parameter resolution, the expansion rate and the
//! distance model used to predict supernova distance moduli.

pub mod distance;
pub mod quadrature;

pub use distance::DistanceModel;
pub use quadrature::GaussLegendre;

use crate::error::{LikelihoodError, Result};
use crate::structs::parameters::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Speed of light in km/s
pub const SPEED_OF_LIGHT: f64 = 299_792.458;

/// Hubble constant used when none is provided
///
/// With the magnitude offset profiled or marginalized, `h0` is fully degenerate
/// with the offset and has no effect on the likelihood.
pub const DEFAULT_H0: f64 = 70.0;

/// Cosmological model family
///
/// Parameters a model does not free take their fiducial value:
/// `omega_k = 0`, `w0 = -1`, `wa = 0`. `omega_r` defaults to zero in every
/// model and is read when present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Model {
    /// Flat universe with a cosmological constant
    FlatLcdm,
    /// Cosmological constant with free curvature
    Lcdm,
    /// Constant dark energy equation of state, optional curvature
    Wcdm,
    /// CPL dark energy `w(a) = w0 + wa (1 - a)`, optional curvature
    #[serde(rename = "w0wacdm")]
    W0waCdm,
}

impl Model {
    /// Parameters read from the parameter vector by this model, besides `h0` and `omega_r`
    pub fn parameters(&self) -> &'static [&'static str] {
        match self {
            Model::FlatLcdm => &[OMEGA_M],
            Model::Lcdm => &[OMEGA_M, OMEGA_K],
            Model::Wcdm => &[OMEGA_M, OMEGA_K, W0],
            Model::W0waCdm => &[OMEGA_M, OMEGA_K, W0, WA],
        }
    }

    /// Whether `name`, or an alias of it, is read when resolving this model
    pub fn reads(&self, name: &str) -> bool {
        match name {
            H0 | LITTLE_H | OMEGA_C | OMEGA_B | OMEGA_R => true,
            W => self.parameters().contains(&W0),
            _ => self.parameters().contains(&name),
        }
    }

    fn reads_curvature(&self) -> bool {
        !matches!(self, Model::FlatLcdm)
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Model::FlatLcdm => "flat_lcdm",
            Model::Lcdm => "lcdm",
            Model::Wcdm => "wcdm",
            Model::W0waCdm => "w0wacdm",
        };
        write!(f, "{}", name)
    }
}

/// Resolved background cosmology
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cosmology {
    pub h0: f64,
    pub omega_m: f64,
    pub omega_k: f64,
    pub omega_r: f64,
    pub w0: f64,
    pub wa: f64,
}

impl Cosmology {
    pub fn flat_lcdm(h0: f64, omega_m: f64) -> Self {
        Cosmology {
            h0,
            omega_m,
            omega_k: 0.0,
            omega_r: 0.0,
            w0: -1.0,
            wa: 0.0,
        }
    }

    /// Resolve a named parameter vector into a validated cosmology
    ///
    /// Accepted aliases: `h` for `h0 / 100`, `omega_c + omega_b` for
    /// `omega_m`, and `w` for `w0`. Giving both a parameter and its alias is
    /// rejected.
    pub fn from_parameters(model: Model, params: &ParameterVector) -> Result<Self> {
        let h0 = match (params.get(H0), params.get(LITTLE_H)) {
            (Some(_), Some(h)) => {
                return Err(LikelihoodError::invalid(LITTLE_H, h, "given together with h0"))
            }
            (Some(h0), None) => h0,
            (None, Some(h)) => 100.0 * h,
            (None, None) => DEFAULT_H0,
        };

        let omega_m = match params.get(OMEGA_M) {
            Some(omega_m) => {
                if let Some(omega_c) = params.get(OMEGA_C) {
                    return Err(LikelihoodError::invalid(
                        OMEGA_C,
                        omega_c,
                        "given together with omega_m",
                    ));
                }
                omega_m
            }
            None => match params.get(OMEGA_C) {
                Some(omega_c) => omega_c + params.require(OMEGA_B)?,
                None => return Err(LikelihoodError::MissingParameter(OMEGA_M.to_string())),
            },
        };

        let omega_k = if model.reads_curvature() {
            params.get(OMEGA_K).unwrap_or(0.0)
        } else {
            0.0
        };

        let w0 = match model {
            Model::Wcdm | Model::W0waCdm => match (params.get(W0), params.get(W)) {
                (Some(_), Some(w)) => {
                    return Err(LikelihoodError::invalid(W, w, "given together with w0"))
                }
                (Some(w0), None) | (None, Some(w0)) => w0,
                (None, None) => return Err(LikelihoodError::MissingParameter(W0.to_string())),
            },
            _ => -1.0,
        };

        let wa = match model {
            Model::W0waCdm => params.require(WA)?,
            _ => 0.0,
        };

        let cosmology = Cosmology {
            h0,
            omega_m,
            omega_k,
            omega_r: params.get(OMEGA_R).unwrap_or(0.0),
            w0,
            wa,
        };
        cosmology.validate()?;
        Ok(cosmology)
    }

    /// Check the parameters against the physical domain
    ///
    /// The positivity of `E(z)^2` is checked separately, at every integration
    /// node, by the [DistanceModel].
    pub fn validate(&self) -> Result<()> {
        let fields = [
            (H0, self.h0),
            (OMEGA_M, self.omega_m),
            (OMEGA_K, self.omega_k),
            (OMEGA_R, self.omega_r),
            (W0, self.w0),
            (WA, self.wa),
        ];
        if let Some((name, value)) = fields.iter().find(|(_, v)| !v.is_finite()) {
            return Err(LikelihoodError::invalid(name, *value, "not finite"));
        }
        if self.h0 <= 0.0 {
            return Err(LikelihoodError::invalid(H0, self.h0, "must be positive"));
        }
        if self.omega_m <= 0.0 {
            return Err(LikelihoodError::invalid(OMEGA_M, self.omega_m, "must be positive"));
        }
        if self.omega_r < 0.0 {
            return Err(LikelihoodError::invalid(OMEGA_R, self.omega_r, "must be non-negative"));
        }
        Ok(())
    }

    /// Dark energy density closing the energy budget
    pub fn omega_de(&self) -> f64 {
        1.0 - self.omega_m - self.omega_k - self.omega_r
    }

    /// Hubble distance `c / H0` in Mpc
    pub fn hubble_distance(&self) -> f64 {
        SPEED_OF_LIGHT / self.h0
    }

    /// Dimensionless expansion rate squared, `E(z)^2 = H(z)^2 / H0^2`
    pub fn e2(&self, z: f64) -> f64 {
        let zp1 = 1.0 + z;
        let zp1_2 = zp1 * zp1;
        let dark_energy = if self.w0 == -1.0 && self.wa == 0.0 {
            1.0
        } else {
            (3.0 * (1.0 + self.w0 + self.wa) * zp1.ln() - 3.0 * self.wa * z / zp1).exp()
        };
        self.omega_m * zp1_2 * zp1
            + self.omega_r * zp1_2 * zp1_2
            + self.omega_k * zp1_2
            + self.omega_de() * dark_energy
    }

    /// Transverse comoving distance for a line-of-sight comoving distance, both in Mpc
    pub fn transverse_distance(&self, comoving: f64) -> f64 {
        let dh = self.hubble_distance();
        if self.omega_k.abs() < CURVATURE_EPS {
            comoving
        } else if self.omega_k > 0.0 {
            let s = self.omega_k.sqrt();
            dh / s * (s * comoving / dh).sinh()
        } else {
            let s = (-self.omega_k).sqrt();
            dh / s * (s * comoving / dh).sin()
        }
    }
}

/// Curvature below which the universe is treated as flat
const CURVATURE_EPS: f64 = 1e-14;

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn names_read_by_each_model() {
        assert!(Model::FlatLcdm.reads(H0));
        assert!(Model::FlatLcdm.reads(OMEGA_C));
        assert!(!Model::FlatLcdm.reads(OMEGA_K));
        assert!(!Model::Lcdm.reads(W));
        assert!(Model::Wcdm.reads(W));
        assert!(!Model::Wcdm.reads(WA));
        assert!(Model::W0waCdm.reads(WA));
        assert!(!Model::W0waCdm.reads("omgea_k"));
        assert_eq!(Model::W0waCdm.to_string(), "w0wacdm");
    }

    #[test]
    fn flat_lcdm_ignores_curvature_and_dark_energy() {
        let params = ParameterVector::new()
            .with(OMEGA_M, 0.3)
            .with(OMEGA_K, 0.1)
            .with(W0, -0.5);
        let cosmo = Cosmology::from_parameters(Model::FlatLcdm, &params).unwrap();
        assert_eq!(cosmo, Cosmology::flat_lcdm(DEFAULT_H0, 0.3));
    }

    #[test]
    fn aliases_are_resolved() {
        let params = ParameterVector::new()
            .with(LITTLE_H, 0.7)
            .with(OMEGA_C, 0.25)
            .with(OMEGA_B, 0.05)
            .with(W, -0.9);
        let cosmo = Cosmology::from_parameters(Model::Wcdm, &params).unwrap();
        assert_relative_eq!(cosmo.h0, 70.0);
        assert_relative_eq!(cosmo.omega_m, 0.3);
        assert_eq!(cosmo.w0, -0.9);
    }

    #[test]
    fn conflicting_aliases_are_rejected() {
        let params = ParameterVector::new()
            .with(H0, 70.0)
            .with(LITTLE_H, 0.7)
            .with(OMEGA_M, 0.3);
        let err = Cosmology::from_parameters(Model::FlatLcdm, &params).unwrap_err();
        assert!(err.is_evaluation_error());
    }

    #[test]
    fn missing_equation_of_state_is_reported() {
        let params = ParameterVector::new().with(OMEGA_M, 0.3).with(W0, -1.0);
        let err = Cosmology::from_parameters(Model::W0waCdm, &params).unwrap_err();
        assert_eq!(err, LikelihoodError::MissingParameter(WA.to_string()));
    }

    #[test]
    fn non_positive_matter_density_is_invalid() {
        for omega_m in [0.0, -0.1, f64::NAN] {
            let params = ParameterVector::new().with(OMEGA_M, omega_m);
            let err = Cosmology::from_parameters(Model::FlatLcdm, &params).unwrap_err();
            assert!(matches!(err, LikelihoodError::InvalidParameter { .. }));
        }
    }

    #[test]
    fn expansion_rate_is_one_today() {
        let cosmo = Cosmology {
            h0: 70.0,
            omega_m: 0.3,
            omega_k: 0.05,
            omega_r: 1e-4,
            w0: -0.9,
            wa: 0.2,
        };
        assert_relative_eq!(cosmo.e2(0.0), 1.0, epsilon = 1e-14);
    }

    #[test]
    fn constant_w_matches_power_law() {
        let cosmo = Cosmology {
            w0: -0.8,
            ..Cosmology::flat_lcdm(70.0, 0.3)
        };
        let z: f64 = 1.2;
        let expected = 0.3 * (1.0 + z).powi(3) + 0.7 * (1.0 + z).powf(3.0 * 0.2);
        assert_relative_eq!(cosmo.e2(z), expected, epsilon = 1e-12);
    }
}
