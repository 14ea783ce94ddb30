use crate::routines::settings::Settings;
use anyhow::{bail, Context, Result};
use ndarray::Array2;
use std::fs::File;

pub mod sobol;

/// Parameter points to evaluate, one row per point
///
/// Reads the design file when one is configured, otherwise generates a Sobol
/// design inside the ranges of the free parameters.
pub fn sample_space(settings: &Settings) -> Result<Array2<f64>> {
    let parameters = settings.parameters();
    match &settings.design.file {
        Some(path) => parse_points(path, &parameters.names()),
        None => sobol::generate(&parameters, settings.design.points, settings.design.seed),
    }
}

/// Reads parameter points from a CSV file whose header names the parameters
///
/// Columns are reordered to match `names`. Columns not in `names` are
/// ignored; a name without a column is an error.
pub fn parse_points(path: &str, names: &[String]) -> Result<Array2<f64>> {
    tracing::info!("Reading parameter points from {}", path);
    let file = File::open(path).context(format!("Unable to open the points file '{}'", path))?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .comment(Some(b'#'))
        .trim(csv::Trim::All)
        .from_reader(file);

    let header: Vec<String> = reader.headers()?.iter().map(|s| s.to_owned()).collect();

    let mut indices = Vec::with_capacity(names.len());
    for name in names {
        match header.iter().position(|h| h == name) {
            Some(index) => indices.push(index),
            None => bail!("Parameter {} is not present in {}", name, path),
        }
    }
    let ignored: Vec<&String> = header.iter().filter(|h| !names.contains(h)).collect();
    if !ignored.is_empty() {
        tracing::warn!("Ignoring columns {:?} in {}", ignored, path);
    }

    let mut values = Vec::new();
    let mut rows = 0;
    for (line, record) in reader.records().enumerate() {
        let record = record?;
        for &i in &indices {
            let field = record.get(i).unwrap_or_default();
            let value = field.parse::<f64>().with_context(|| {
                format!("Row {} of {}: {:?} is not a number", line + 1, path, field)
            })?;
            values.push(value);
        }
        rows += 1;
    }

    Ok(Array2::from_shape_vec((rows, names.len()), values)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn columns_are_reordered_by_name() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "w0,label,omega_m").unwrap();
        writeln!(file, "-1.0,a,0.3").unwrap();
        writeln!(file, "-0.9,b,0.25").unwrap();

        let names = vec!["omega_m".to_string(), "w0".to_string()];
        let points = parse_points(file.path().to_str().unwrap(), &names).unwrap();
        assert_eq!(points, ndarray::array![[0.3, -1.0], [0.25, -0.9]]);
    }

    #[test]
    fn missing_parameter_column_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "omega_m").unwrap();
        writeln!(file, "0.3").unwrap();

        let names = vec!["omega_m".to_string(), "w0".to_string()];
        assert!(parse_points(file.path().to_str().unwrap(), &names).is_err());
    }
}
