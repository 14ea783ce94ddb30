use crate::likelihood::Evaluation;
use anyhow::{bail, Context, Result};
use csv::WriterBuilder;
use ndarray::Array2;
use std::fs::{create_dir_all, File, OpenOptions};
use std::path::{Path, PathBuf};

/// Name of the per-point results file
pub const LIKELIHOOD_FILE: &str = "likelihood.csv";

/// Result of evaluating the likelihood at a set of parameter points
#[derive(Debug, Clone)]
pub struct PointResults {
    names: Vec<String>,
    points: Array2<f64>,
    /// `None` for points outside the prior ranges or the physical domain
    evaluations: Vec<Option<Evaluation>>,
}

impl PointResults {
    pub fn new(
        names: Vec<String>,
        points: Array2<f64>,
        evaluations: Vec<Option<Evaluation>>,
    ) -> Result<Self> {
        if points.ncols() != names.len() || points.nrows() != evaluations.len() {
            bail!(
                "{} points of {} parameters do not match {} names and {} evaluations",
                points.nrows(),
                points.ncols(),
                names.len(),
                evaluations.len()
            );
        }
        Ok(PointResults {
            names,
            points,
            evaluations,
        })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn points(&self) -> &Array2<f64> {
        &self.points
    }

    pub fn evaluations(&self) -> &[Option<Evaluation>] {
        &self.evaluations
    }

    /// Log-likelihood of every point, negative infinity where rejected
    pub fn log_likelihoods(&self) -> Vec<f64> {
        self.evaluations
            .iter()
            .map(|e| e.map_or(f64::NEG_INFINITY, |e| e.log_likelihood))
            .collect()
    }

    /// Index and evaluation of the point with the highest log-likelihood
    pub fn best(&self) -> Option<(usize, &Evaluation)> {
        self.evaluations
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.as_ref().map(|e| (i, e)))
            .max_by(|a, b| a.1.log_likelihood.total_cmp(&b.1.log_likelihood))
    }

    /// Number of rejected points
    pub fn rejected(&self) -> usize {
        self.evaluations.iter().filter(|e| e.is_none()).count()
    }

    /// Writes one row per point, the parameters followed by the likelihood breakdown
    pub fn write(&self, folder: &str) -> Result<PathBuf> {
        tracing::debug!("Writing likelihood values...");
        let outputfile = OutputFile::new(folder, LIKELIHOOD_FILE)?;
        let mut writer = WriterBuilder::new()
            .has_headers(true)
            .from_writer(outputfile.file());

        let mut header = self.names.clone();
        header.extend(
            ["log_likelihood", "chi2", "offset", "correction"]
                .iter()
                .map(|s| s.to_string()),
        );
        writer.write_record(&header)?;

        for (row, evaluation) in self.points.rows().into_iter().zip(&self.evaluations) {
            let mut record: Vec<String> = row.iter().map(|v| v.to_string()).collect();
            match evaluation {
                Some(e) => {
                    record.push(e.log_likelihood.to_string());
                    record.push(e.chi2.to_string());
                    record.push(e.offset.to_string());
                    record.push(e.correction.to_string());
                }
                None => {
                    record.push(f64::NEG_INFINITY.to_string());
                    record.extend(std::iter::repeat(String::new()).take(3));
                }
            }
            writer.write_record(&record)?;
        }
        writer.flush()?;
        tracing::info!(
            "Likelihood values written to {:?}",
            outputfile.relative_path()
        );
        Ok(outputfile.relative_path().to_path_buf())
    }
}

/// A file in the output folder, truncated on creation
#[derive(Debug)]
pub struct OutputFile {
    file: File,
    relative_path: PathBuf,
}

impl OutputFile {
    pub fn new(folder: &str, file_name: &str) -> Result<Self> {
        let relative_path = Path::new(&folder).join(file_name);

        if let Some(parent) = relative_path.parent() {
            create_dir_all(parent)
                .with_context(|| format!("Failed to create directories for {:?}", parent))?;
        }

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&relative_path)
            .with_context(|| format!("Failed to open file: {:?}", relative_path))?;

        Ok(OutputFile {
            file,
            relative_path,
        })
    }

    pub fn file(&self) -> &File {
        &self.file
    }

    pub fn file_owned(self) -> File {
        self.file
    }

    pub fn relative_path(&self) -> &Path {
        &self.relative_path
    }
}
