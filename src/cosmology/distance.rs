use super::quadrature::{GaussLegendre, DEFAULT_ORDER};
use super::Cosmology;
use crate::error::{LikelihoodError, Result};
use ndarray::Array1;

/// Batched distance-modulus predictions for a fixed set of redshifts
///
/// On construction the redshifts are sorted and the interval between each pair
/// of neighbours (starting from `z = 0`) receives its own Gauss–Legendre rule.
/// The resulting node set is stored and reused by every call, so all
/// predictions share one discretization and differences between parameter
/// vectors are never polluted by a changing integration error.
#[derive(Debug, Clone)]
pub struct DistanceModel {
    redshifts: Array1<f64>,
    /// Input index of the `k`-th smallest redshift
    sorted: Vec<usize>,
    /// Integration nodes, `order` per interval, in sorted-redshift order
    nodes: Vec<f64>,
    weights: Vec<f64>,
    rule: GaussLegendre,
}

impl DistanceModel {
    pub fn new(redshifts: &Array1<f64>, order: usize) -> Result<Self> {
        if let Some(z) = redshifts.iter().find(|z| !z.is_finite() || **z <= 0.0) {
            return Err(LikelihoodError::InvalidData(format!(
                "redshifts must be finite and positive, got {}",
                z
            )));
        }
        let rule = GaussLegendre::new(order)?;

        let mut sorted: Vec<usize> = (0..redshifts.len()).collect();
        sorted.sort_by(|&a, &b| redshifts[a].total_cmp(&redshifts[b]));

        let mut nodes = Vec::with_capacity(order * sorted.len());
        let mut weights = Vec::with_capacity(order * sorted.len());
        let mut lower = 0.0;
        for &i in &sorted {
            let upper = redshifts[i];
            for (z, w) in rule.mapped(lower, upper) {
                nodes.push(z);
                weights.push(w);
            }
            lower = upper;
        }

        tracing::debug!(
            "Distance model uses {} integration nodes for {} redshifts",
            nodes.len(),
            redshifts.len()
        );

        Ok(DistanceModel {
            redshifts: redshifts.clone(),
            sorted,
            nodes,
            weights,
            rule,
        })
    }

    /// Distance model with the default quadrature order
    pub fn with_default_order(redshifts: &Array1<f64>) -> Result<Self> {
        DistanceModel::new(redshifts, DEFAULT_ORDER)
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

    pub fn order(&self) -> usize {
        self.rule.order()
    }

    /// Line-of-sight comoving distances in Mpc, in input order
    pub fn comoving_distances(&self, cosmo: &Cosmology) -> Result<Array1<f64>> {
        let order = self.rule.order();
        let dh = cosmo.hubble_distance();
        let mut distances = Array1::zeros(self.len());
        let mut cumulative = 0.0;

        for (k, &i) in self.sorted.iter().enumerate() {
            let span = k * order..(k + 1) * order;
            let mut segment = 0.0;
            for (z, w) in self.nodes[span.clone()].iter().zip(&self.weights[span]) {
                segment += w * inverse_expansion_rate(cosmo, *z)?;
            }
            cumulative += segment;
            distances[i] = dh * cumulative;
        }

        Ok(distances)
    }

    /// Luminosity distances in Mpc, in input order
    pub fn luminosity_distances(&self, cosmo: &Cosmology) -> Result<Array1<f64>> {
        let mut distances = self.comoving_distances(cosmo)?;
        for (d, z) in distances.iter_mut().zip(self.redshifts.iter()) {
            *d = (1.0 + z) * cosmo.transverse_distance(*d);
        }
        Ok(distances)
    }

    /// Predicted distance moduli for every redshift, in input order
    pub fn predict_all(&self, cosmo: &Cosmology) -> Result<Array1<f64>> {
        let distances = self.luminosity_distances(cosmo)?;
        let mut moduli = Array1::zeros(self.len());
        for (mu, d) in moduli.iter_mut().zip(distances.iter()) {
            *mu = distance_modulus(*d, cosmo)?;
        }
        Ok(moduli)
    }

    /// Predicted distance modulus at a single redshift
    ///
    /// Integrates directly over `[0, z]` with the model's rule. Use
    /// [DistanceModel::predict_all] for the data set itself.
    pub fn predict(&self, z: f64, cosmo: &Cosmology) -> Result<f64> {
        if !z.is_finite() || z <= 0.0 {
            return Err(LikelihoodError::InvalidData(format!(
                "redshift must be finite and positive, got {}",
                z
            )));
        }
        let mut integral = 0.0;
        for (x, w) in self.rule.mapped(0.0, z) {
            integral += w * inverse_expansion_rate(cosmo, x)?;
        }
        let comoving = cosmo.hubble_distance() * integral;
        distance_modulus((1.0 + z) * cosmo.transverse_distance(comoving), cosmo)
    }
}

fn inverse_expansion_rate(cosmo: &Cosmology, z: f64) -> Result<f64> {
    let e2 = cosmo.e2(z);
    if e2 > 0.0 && e2.is_finite() {
        Ok(1.0 / e2.sqrt())
    } else {
        Err(LikelihoodError::invalid(
            "z",
            z,
            "expansion rate squared is not positive at this redshift",
        ))
    }
}

/// `mu = 5 log10(d_L / 10 pc)` for `d_L` in Mpc
fn distance_modulus(luminosity_distance: f64, cosmo: &Cosmology) -> Result<f64> {
    if luminosity_distance > 0.0 && luminosity_distance.is_finite() {
        Ok(5.0 * luminosity_distance.log10() + 25.0)
    } else {
        Err(LikelihoodError::invalid(
            "omega_k",
            cosmo.omega_k,
            "luminosity distance is not positive",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    /// Einstein–de Sitter comoving distance, `2 d_H (1 - 1/sqrt(1+z))`
    fn eds_comoving(z: f64, h0: f64) -> f64 {
        2.0 * super::super::SPEED_OF_LIGHT / h0 * (1.0 - 1.0 / (1.0 + z).sqrt())
    }

    #[test]
    fn matches_einstein_de_sitter_closed_form() {
        let z = array![1.5, 0.01, 0.3, 0.7, 2.3];
        let model = DistanceModel::with_default_order(&z).unwrap();
        let cosmo = Cosmology::flat_lcdm(70.0, 1.0);

        let distances = model.comoving_distances(&cosmo).unwrap();
        for (d, z) in distances.iter().zip(z.iter()) {
            assert_relative_eq!(*d, eds_comoving(*z, 70.0), max_relative = 1e-10);
        }
    }

    #[test]
    fn batched_and_single_predictions_agree() {
        let z = array![0.05, 0.5, 1.0];
        let model = DistanceModel::with_default_order(&z).unwrap();
        let cosmo = Cosmology::flat_lcdm(68.0, 0.31);

        let batched = model.predict_all(&cosmo).unwrap();
        for (mu, z) in batched.iter().zip(z.iter()) {
            let single = model.predict(*z, &cosmo).unwrap();
            assert_relative_eq!(*mu, single, epsilon = 1e-9);
        }
    }

    #[test]
    fn duplicated_redshifts_share_a_distance() {
        let z = array![0.4, 0.2, 0.4];
        let model = DistanceModel::with_default_order(&z).unwrap();
        let mu = model
            .predict_all(&Cosmology::flat_lcdm(70.0, 0.3))
            .unwrap();
        assert_eq!(mu[0], mu[2]);
        assert!(mu[1] < mu[0]);
    }

    #[test]
    fn open_and_closed_curvature_bracket_flat() {
        let z = array![1.0];
        let model = DistanceModel::with_default_order(&z).unwrap();
        let flat = Cosmology::flat_lcdm(70.0, 0.3);
        let open = Cosmology {
            omega_k: 0.1,
            ..flat
        };
        let closed = Cosmology {
            omega_k: -0.1,
            ..flat
        };

        let dc = model.comoving_distances(&open).unwrap()[0];
        assert!(open.transverse_distance(dc) > dc);
        assert!(closed.transverse_distance(dc) < dc);
    }

    #[test]
    fn low_redshift_follows_hubble_law() {
        let z = array![1e-4];
        let model = DistanceModel::with_default_order(&z).unwrap();
        let cosmo = Cosmology::flat_lcdm(70.0, 0.3);
        let dl = model.luminosity_distances(&cosmo).unwrap()[0];
        assert_relative_eq!(dl, super::super::SPEED_OF_LIGHT * 1e-4 / 70.0, max_relative = 1e-3);
    }

    #[test]
    fn negative_expansion_rate_is_an_invalid_parameter() {
        let z = array![0.5, 3.0];
        let model = DistanceModel::with_default_order(&z).unwrap();
        // Strongly closed universe whose E(z)^2 crosses zero before z = 3
        let cosmo = Cosmology {
            omega_k: -3.0,
            ..Cosmology::flat_lcdm(70.0, 0.3)
        };
        let err = model.predict_all(&cosmo).unwrap_err();
        assert!(err.is_evaluation_error());
    }

    #[test]
    fn repeated_predictions_are_bit_identical() {
        let z = array![0.1, 0.9, 0.4];
        let model = DistanceModel::new(&z, 8).unwrap();
        let cosmo = Cosmology {
            w0: -0.9,
            wa: 0.3,
            ..Cosmology::flat_lcdm(70.0, 0.3)
        };
        let first = model.predict_all(&cosmo).unwrap();
        let second = model.predict_all(&cosmo).unwrap();
        assert_eq!(first, second);
    }
}
