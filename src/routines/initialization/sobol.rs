use crate::structs::parameters::Parameters;
use anyhow::{bail, Result};
use ndarray::Array2;
use sobol_burley::sample;

/// Largest dimension supported by [sobol_burley]
const MAX_DIMENSIONS: usize = 256;

/// Generates a Sobol design of `points` rows inside the parameter ranges
///
/// Each row is one point, each column one parameter in the order of
/// [Parameters::names]. The sequence is Owen-scrambled by `seed`, so the same
/// seed always reproduces the same design.
pub fn generate(parameters: &Parameters, points: usize, seed: usize) -> Result<Array2<f64>> {
    if parameters.len() > MAX_DIMENSIONS {
        bail!(
            "Sobol designs support at most {} parameters, got {}",
            MAX_DIMENSIONS,
            parameters.len()
        );
    }
    let ranges = parameters.ranges();
    let seed = u32::try_from(seed)?;
    let mut design = Array2::zeros((points, ranges.len()));
    for ((i, j), value) in design.indexed_iter_mut() {
        let unscaled = sample(u32::try_from(i)?, j as u32, seed) as f64;
        let (lower, upper) = ranges[j];
        *value = lower + unscaled * (upper - lower);
    }
    Ok(design)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn points_fall_inside_the_ranges() {
        let parameters = Parameters::new().add("omega_m", 0.1, 0.5).add("w0", -2.0, -0.5);
        let design = generate(&parameters, 64, 22).unwrap();
        assert_eq!(design.dim(), (64, 2));
        for row in design.rows() {
            assert!((0.1..=0.5).contains(&row[0]));
            assert!((-2.0..=-0.5).contains(&row[1]));
        }
    }

    #[test]
    fn same_seed_same_design() {
        let parameters = Parameters::new().add("omega_m", 0.0, 1.0);
        assert_eq!(
            generate(&parameters, 16, 7).unwrap(),
            generate(&parameters, 16, 7).unwrap()
        );
        assert_ne!(
            generate(&parameters, 16, 7).unwrap(),
            generate(&parameters, 16, 8).unwrap()
        );
    }
}
