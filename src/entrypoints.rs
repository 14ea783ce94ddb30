use crate::likelihood::{Covariance, Evaluation, Likelihood, SamplerAdapter};
use crate::routines::datafile::{read_covariance, read_hubble_diagram};
use crate::routines::initialization::sample_space;
use crate::routines::logger;
use crate::routines::output::PointResults;
use crate::routines::settings::Settings;
use crate::structs::parameters::ParameterVector;

use anyhow::{Context, Result};
use rayon::prelude::*;
use ndarray::{Array2, Axis};
use std::sync::Arc;
use std::time::Instant;

/// A loaded data set, ready for repeated evaluations
///
/// Holds the [Likelihood] built once from the settings and a
/// [SamplerAdapter] exposing it to external samplers. Cloning is cheap and
/// shares the factorized covariance.
#[derive(Debug, Clone)]
pub struct Analysis {
    likelihood: Arc<Likelihood>,
    adapter: SamplerAdapter<Likelihood>,
}

impl Analysis {
    pub fn likelihood(&self) -> &Likelihood {
        &self.likelihood
    }

    pub fn adapter(&self) -> &SamplerAdapter<Likelihood> {
        &self.adapter
    }

    /// Log-likelihood of a named point, with the fixed parameters and prior ranges applied
    pub fn execute(&self, point: &ParameterVector) -> f64 {
        self.adapter.evaluate(point)
    }

    /// Full breakdown for one positional point, `None` when the point is rejected
    pub fn evaluation(&self, theta: &[f64]) -> Option<Evaluation> {
        let point = ParameterVector::from_positional(self.adapter.names(), theta).ok()?;
        let params = self.adapter.fixed().merged(&point);
        if !self.adapter.free().within_bounds(&params) {
            return None;
        }
        match self.likelihood.evaluate(&params) {
            Ok(evaluation) if !evaluation.log_likelihood.is_nan() => Some(evaluation),
            Ok(_) => None,
            Err(err) => {
                tracing::trace!("Point {:?} rejected: {}", theta, err);
                None
            }
        }
    }

    /// Evaluate every row of `points` in parallel
    pub fn evaluate_points(&self, points: Array2<f64>) -> Result<PointResults> {
        let evaluations: Vec<Option<Evaluation>> = points
            .axis_iter(Axis(0))
            .into_par_iter()
            .map(|row| self.evaluation(&row.to_vec()))
            .collect();
        PointResults::new(self.adapter.names().to_vec(), points, evaluations)
    }
}

/// Load the data set described by `settings`
///
/// Reads the Hubble diagram and the covariance matrix, assembles and
/// factorizes the covariance once, and wraps the resulting [Likelihood] in a
/// [SamplerAdapter] over the `[random]` and `[fixed]` parameters.
pub fn setup(settings: &Settings) -> Result<Analysis> {
    let options = settings.options()?;

    let diagram = read_hubble_diagram(&settings.paths.data, &settings.columns)?;
    let systematic = read_covariance(&settings.paths.covariance)?;
    let matrix = settings
        .covariance
        .compose(&systematic, &diagram)
        .context("Failed to assemble the covariance matrix")?;
    let covariance = Covariance::load(&matrix)
        .with_context(|| format!("Failed to load the covariance in {}", settings.paths.covariance))?;

    let likelihood = Arc::new(Likelihood::new(diagram, Arc::new(covariance), options)?);
    let adapter = SamplerAdapter::new(
        likelihood.clone(),
        settings.parameters(),
        settings.fixed_parameters(),
    );

    tracing::info!(
        "Free parameters: {:?}, fixed parameters: {:?}",
        adapter.names(),
        settings.fixed.0
    );

    Ok(Analysis {
        likelihood,
        adapter,
    })
}

/// Primary entrypoint
///
/// Loads the data set, evaluates the likelihood on the configured design
/// (a points file or a Sobol sequence inside the prior ranges) and, when
/// output is enabled, writes `likelihood.csv` to the output folder.
pub fn evaluate(mut settings: Settings) -> Result<PointResults> {
    let now = Instant::now();
    if settings.output.write {
        settings.output.parse_output_folder()?;
    }
    logger::setup_log(&settings)?;
    tracing::info!("Starting snlike");

    let analysis = match setup(&settings) {
        Ok(analysis) => analysis,
        Err(err) => {
            tracing::error!("Failed to load the data set: {:#}", err);
            return Err(err);
        }
    };

    let points = sample_space(&settings)?;
    tracing::info!(
        "Evaluating {} points of {} parameters",
        points.nrows(),
        points.ncols()
    );
    let results = analysis.evaluate_points(points)?;

    if results.rejected() > 0 {
        tracing::warn!(
            "{} of {} points were outside the prior ranges or the physical domain",
            results.rejected(),
            results.evaluations().len()
        );
    }
    if let Some((index, best)) = results.best() {
        tracing::info!(
            "Highest log-likelihood {:.4} (chi2 {:.4}) at {:?}",
            best.log_likelihood,
            best.chi2,
            results.points().row(index).to_vec()
        );
    }

    match settings.output.write {
        true => {
            results.write(&settings.output.path)?;
        }
        false => {
            tracing::info!("Output files will not be written - set `write = true` in [output] to enable them")
        }
    }

    tracing::info!("Program complete after {:.2?}", now.elapsed());
    Ok(results)
}
