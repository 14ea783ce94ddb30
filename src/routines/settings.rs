use crate::cosmology::Model;
use crate::likelihood::{Composition, Family, MagnitudePrior, NuisanceTreatment, Options};
use crate::structs::parameters::{ParameterVector, Parameters, DELTA_M};
use crate::cosmology::quadrature::DEFAULT_ORDER;
use super::output::OutputFile;
use anyhow::{bail, Context, Result};
use config::Config as eConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Contains all settings for an evaluation run
#[derive(Debug, Deserialize, Clone, Serialize, Default, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct Settings {
    /// Input files
    pub paths: Paths,
    /// Model and likelihood configuration
    pub config: Config,
    /// Assembly of the covariance matrix
    pub covariance: Composition,
    /// Column names in the Hubble diagram
    pub columns: Columns,
    /// Treatment of a marginalized magnitude offset
    pub magnitude: Magnitude,
    /// Free parameters and their flat prior ranges
    pub random: Random,
    /// Parameters held at a constant value
    pub fixed: Fixed,
    /// Design of the evaluated parameter points
    pub design: Design,
    /// Configuration for logging
    pub log: Log,
    /// Configuration for the output files
    pub output: Output,
}

impl Settings {
    pub fn new() -> Self {
        Settings::default()
    }

    pub fn builder() -> SettingsBuilder {
        SettingsBuilder::new()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Validate the settings
    pub fn validate(&self) -> Result<()> {
        self.options()?;
        self.parameters().validate()?;

        if let Some(name) = self.fixed.0.keys().find(|name| self.random.0.contains_key(*name)) {
            bail!("Parameter '{}' is both random and fixed", name);
        }
        if let Some((name, value)) = self.fixed.0.iter().find(|(_, v)| !v.is_finite()) {
            bail!("Fixed parameter '{}' must be finite, got {}", name, value);
        }
        if self.config.nuisance == NuisanceTreatment::Sampled
            && !self.random.0.contains_key(DELTA_M)
            && !self.fixed.0.contains_key(DELTA_M)
        {
            bail!(
                "A sampled magnitude offset requires '{}' in [random] or [fixed]",
                DELTA_M
            );
        }
        if self.magnitude.prior == PriorKind::Gaussian
            && self.config.nuisance != NuisanceTreatment::Marginalized
        {
            bail!(
                "A Gaussian magnitude prior only applies to a marginalized offset, got a {} offset",
                self.config.nuisance
            );
        }
        let unread = self
            .random
            .0
            .keys()
            .chain(self.fixed.0.keys())
            .find(|name| !self.reads(name));
        if let Some(name) = unread {
            bail!(
                "Parameter '{}' is not read by the {} model with a {} offset",
                name,
                self.config.model,
                self.config.nuisance
            );
        }
        if self.design.file.is_none() && self.design.points == 0 {
            bail!("The design must contain at least one point");
        }
        Ok(())
    }

    fn reads(&self, name: &str) -> bool {
        match name {
            DELTA_M => self.config.nuisance == NuisanceTreatment::Sampled,
            _ => self.config.model.reads(name),
        }
    }

    /// Likelihood options described by these settings
    pub fn options(&self) -> Result<Options> {
        let family = match self.config.likelihood {
            LikelihoodKind::Gaussian => Family::Gaussian,
            LikelihoodKind::StudentT => match self.config.nu {
                Some(nu) => Family::StudentT { nu },
                None => bail!("The t-distribution requires `nu` in [config]"),
            },
        };
        let prior = match self.magnitude.prior {
            PriorKind::Flat => MagnitudePrior::Flat,
            PriorKind::Gaussian => match self.magnitude.sigma {
                Some(sigma) => MagnitudePrior::Gaussian {
                    mean: self.magnitude.mean,
                    sigma,
                },
                None => bail!("A Gaussian magnitude prior requires `sigma` in [magnitude]"),
            },
        };
        let options = Options {
            model: self.config.model,
            nuisance: self.config.nuisance,
            prior,
            family,
            quadrature_order: self.config.quadrature_order,
        };
        options.validate()?;
        Ok(options)
    }

    /// Free parameters, in alphabetical order
    pub fn parameters(&self) -> Parameters {
        self.random
            .0
            .iter()
            .fold(Parameters::new(), |parameters, (name, (lower, upper))| {
                parameters.add(name.as_str(), *lower, *upper)
            })
    }

    /// Parameters held constant
    pub fn fixed_parameters(&self) -> ParameterVector {
        self.fixed.0.clone().into()
    }
}

/// Paths to the input files
#[derive(Debug, Deserialize, Clone, Serialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct Paths {
    /// Hubble diagram table
    pub data: String,
    /// Systematic (or full) covariance matrix
    pub covariance: String,
}

impl Default for Paths {
    fn default() -> Self {
        Paths {
            data: String::from("data.txt"),
            covariance: String::from("sys_0.txt"),
        }
    }
}

/// Sampling distribution of the data, as written in the settings file
#[derive(Debug, Deserialize, Clone, Copy, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LikelihoodKind {
    #[default]
    Gaussian,
    StudentT,
}

/// General configuration settings
#[derive(Debug, Deserialize, Clone, Serialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    /// Cosmological model family
    pub model: Model,
    /// Treatment of the magnitude offset
    pub nuisance: NuisanceTreatment,
    /// Sampling distribution of the data
    pub likelihood: LikelihoodKind,
    /// Number of simulations behind the covariance, required by `student_t`
    pub nu: Option<f64>,
    /// Gauss-Legendre nodes per redshift interval
    pub quadrature_order: usize,
}

impl Default for Config {
    fn default() -> Self {
        let options = Options::default();
        Config {
            model: options.model,
            nuisance: options.nuisance,
            likelihood: LikelihoodKind::Gaussian,
            nu: None,
            quadrature_order: DEFAULT_ORDER,
        }
    }
}

/// Column names looked up in the header of the Hubble diagram
///
/// Common aliases are tried when a configured name is absent.
#[derive(Debug, Deserialize, Clone, Serialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct Columns {
    pub name: String,
    pub redshift: String,
    pub distance_modulus: String,
    pub error: String,
}

impl Default for Columns {
    fn default() -> Self {
        Columns {
            name: String::from("name"),
            redshift: String::from("zcmb"),
            distance_modulus: String::from("mu"),
            error: String::from("dmu"),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PriorKind {
    #[default]
    Flat,
    Gaussian,
}

/// Prior on a marginalized magnitude offset
#[derive(Debug, Deserialize, Clone, Serialize, PartialEq, Default)]
#[serde(deny_unknown_fields, default)]
pub struct Magnitude {
    pub prior: PriorKind,
    pub mean: f64,
    pub sigma: Option<f64>,
}

/// Free parameters with their `[lower, upper]` range
#[derive(Debug, Deserialize, Clone, Serialize, PartialEq, Default)]
#[serde(transparent)]
pub struct Random(pub BTreeMap<String, (f64, f64)>);

impl Random {
    pub fn get(&self, key: &str) -> Option<&(f64, f64)> {
        self.0.get(key)
    }

    pub fn names(&self) -> Vec<String> {
        self.0.keys().cloned().collect()
    }
}

/// Parameters held at a constant value
#[derive(Debug, Deserialize, Clone, Serialize, PartialEq, Default)]
#[serde(transparent)]
pub struct Fixed(pub BTreeMap<String, f64>);

/// Parameter points to evaluate
#[derive(Debug, Deserialize, Clone, Serialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct Design {
    /// Number of Sobol points generated inside the [Random] ranges
    pub points: usize,
    /// The seed for the Sobol sequence
    pub seed: usize,
    /// Optionally, a CSV file of points with the parameter names as header
    ///
    /// When given, it replaces the Sobol design. Columns not named in
    /// [Random] are ignored.
    pub file: Option<String>,
}

impl Default for Design {
    fn default() -> Self {
        Design {
            points: 1024,
            seed: 22,
            file: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Serialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct Log {
    /// The maximum log level to display
    ///
    /// One of `trace`, `debug`, `info`, `warn` or `error`, or any directive
    /// understood by [tracing_subscriber::EnvFilter].
    pub level: String,
    /// The file to write the log to, inside the output folder
    pub file: String,
    /// Whether to install a global subscriber
    ///
    /// Disable when the caller installs its own, or for benchmarks.
    pub write: bool,
}

impl Default for Log {
    fn default() -> Self {
        Log {
            level: String::from("info"),
            file: String::from("log.txt"),
            write: true,
        }
    }
}

/// Configuration for the output files
#[derive(Debug, Deserialize, Clone, Serialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct Output {
    /// Whether to write the output files
    pub write: bool,
    /// The (relative) path to write the output files to
    pub path: String,
}

impl Default for Output {
    fn default() -> Self {
        Output {
            write: true,
            path: String::from("outputs/"),
        }
    }
}

impl Output {
    /// Resolve the output folder
    ///
    /// A single `#` in the path is replaced by the smallest positive number
    /// giving a folder that does not exist yet.
    pub fn parse_output_folder(&mut self) -> Result<()> {
        if self.path.is_empty() {
            self.path = Output::default().path;
        }

        match self.path.matches('#').count() {
            0 => Ok(()),
            1 => {
                let mut num = 1;
                while std::path::Path::new(&self.path.replace('#', &num.to_string())).exists() {
                    num += 1;
                }
                self.path = self.path.replace('#', &num.to_string());
                Ok(())
            }
            _ => bail!("Only one `#` symbol is allowed in the output path, got {}", self.path),
        }
    }
}

/// Builder for [Settings] constructed in code
#[derive(Debug, Clone, Default)]
pub struct SettingsBuilder {
    settings: Settings,
}

impl SettingsBuilder {
    pub fn new() -> Self {
        SettingsBuilder::default()
    }

    pub fn set_data(mut self, path: impl Into<String>) -> Self {
        self.settings.paths.data = path.into();
        self
    }

    pub fn set_covariance(mut self, path: impl Into<String>) -> Self {
        self.settings.paths.covariance = path.into();
        self
    }

    pub fn set_model(mut self, model: Model) -> Self {
        self.settings.config.model = model;
        self
    }

    pub fn set_nuisance(mut self, nuisance: NuisanceTreatment) -> Self {
        self.settings.config.nuisance = nuisance;
        self
    }

    pub fn set_student_t(mut self, nu: f64) -> Self {
        self.settings.config.likelihood = LikelihoodKind::StudentT;
        self.settings.config.nu = Some(nu);
        self
    }

    pub fn set_composition(mut self, composition: Composition) -> Self {
        self.settings.covariance = composition;
        self
    }

    pub fn set_magnitude_prior(mut self, mean: f64, sigma: f64) -> Self {
        self.settings.magnitude = Magnitude {
            prior: PriorKind::Gaussian,
            mean,
            sigma: Some(sigma),
        };
        self
    }

    pub fn add_random(mut self, name: impl Into<String>, lower: f64, upper: f64) -> Self {
        self.settings.random.0.insert(name.into(), (lower, upper));
        self
    }

    pub fn add_fixed(mut self, name: impl Into<String>, value: f64) -> Self {
        self.settings.fixed.0.insert(name.into(), value);
        self
    }

    pub fn set_design(mut self, points: usize, seed: usize) -> Self {
        self.settings.design.points = points;
        self.settings.design.seed = seed;
        self
    }

    pub fn set_design_file(mut self, path: impl Into<String>) -> Self {
        self.settings.design.file = Some(path.into());
        self
    }

    /// A `#` in the path is resolved to a fresh numbered folder when the run starts
    pub fn set_output_path(mut self, path: impl Into<String>) -> Self {
        self.settings.output.path = path.into();
        self
    }

    pub fn set_write(mut self, write: bool) -> Self {
        self.settings.output.write = write;
        self.settings.log.write = write;
        self
    }

    pub fn set_log_level(mut self, level: impl Into<String>) -> Self {
        self.settings.log.level = level.into();
        self
    }

    pub fn build(self) -> Settings {
        self.settings
    }
}

/// Parses the settings from a TOML configuration file
///
/// The settings are validated, and a copy is written to the output folder.
///
/// Entries in the TOML file may be overridden by environment variables
/// prefixed with `SNLIKE_`, using a double underscore between nested keys.
/// For example, `SNLIKE_CONFIG__MODEL=wcdm` changes the cosmological model.
pub fn read(path: impl Into<String>) -> Result<Settings> {
    let settings_path = path.into();

    let parsed = eConfig::builder()
        .add_source(config::File::with_name(&settings_path).format(config::FileFormat::Toml))
        .add_source(
            config::Environment::with_prefix("SNLIKE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .with_context(|| format!("Failed to read settings from {}", settings_path))?;

    let mut settings: Settings = parsed
        .try_deserialize()
        .with_context(|| format!("Failed to parse settings in {}", settings_path))?;

    settings.validate()?;
    settings.output.parse_output_folder()?;

    if settings.output.write {
        if let Err(error) = write_settings_to_file(&settings) {
            bail!("Could not write settings to file: {}", error);
        }
    }

    Ok(settings)
}

/// Writes a copy of the parsed settings to `settings.json` in the output folder
pub fn write_settings_to_file(settings: &Settings) -> Result<()> {
    let serialized = serde_json::to_string_pretty(settings)?;

    let outputfile = OutputFile::new(settings.output.path.as_str(), "settings.json")?;
    let mut file = outputfile.file_owned();
    std::io::Write::write_all(&mut file, serialized.as_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let settings = Settings::new();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.options().unwrap(), Options::default());
    }

    #[test]
    fn random_parameters_are_alphabetical() {
        let settings = Settings::builder()
            .add_random("w0", -2.0, 0.0)
            .add_random("omega_m", 0.0, 1.0)
            .build();
        assert_eq!(settings.parameters().names(), vec!["omega_m", "w0"]);
    }

    #[test]
    fn random_and_fixed_must_not_overlap() {
        let settings = Settings::builder()
            .add_random("omega_m", 0.0, 1.0)
            .add_fixed("omega_m", 0.3)
            .build();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn sampled_offset_needs_a_parameter() {
        let builder = Settings::builder().set_nuisance(NuisanceTreatment::Sampled);
        assert!(builder.clone().build().validate().is_err());
        assert!(builder.add_fixed(DELTA_M, 0.0).build().validate().is_ok());
    }

    #[test]
    fn student_t_requires_nu_and_no_marginalization() {
        let mut settings = Settings::new();
        settings.config.likelihood = LikelihoodKind::StudentT;
        assert!(settings.options().is_err());

        let settings = Settings::builder()
            .set_nuisance(NuisanceTreatment::Profiled)
            .set_student_t(200.0)
            .build();
        assert_eq!(settings.options().unwrap().family, Family::StudentT { nu: 200.0 });
    }

    #[test]
    fn gaussian_prior_requires_sigma() {
        let mut settings = Settings::new();
        settings.magnitude.prior = PriorKind::Gaussian;
        assert!(settings.options().is_err());

        let settings = Settings::builder().set_magnitude_prior(-19.3, 0.2).build();
        assert_eq!(
            settings.options().unwrap().prior,
            MagnitudePrior::Gaussian {
                mean: -19.3,
                sigma: 0.2
            }
        );
    }

    #[test]
    fn gaussian_prior_needs_a_marginalized_offset() {
        let settings = Settings::builder()
            .set_nuisance(NuisanceTreatment::Profiled)
            .set_magnitude_prior(-19.3, 0.2)
            .build();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn parameters_no_model_reads_are_rejected() {
        let typo = Settings::builder()
            .set_model(Model::Lcdm)
            .add_fixed("omgea_k", 0.0)
            .build();
        assert!(typo.validate().is_err());

        let flat = Settings::builder().add_random("omega_k", -0.1, 0.1).build();
        assert!(flat.validate().is_err());

        let offset = Settings::builder().add_fixed(DELTA_M, 0.0).build();
        assert!(offset.validate().is_err());

        let aliases = Settings::builder()
            .set_model(Model::Wcdm)
            .add_random("w", -2.0, 0.0)
            .add_fixed("h", 0.7)
            .add_fixed("omega_r", 0.0)
            .build();
        assert!(aliases.validate().is_ok());
    }

    #[test]
    fn output_folder_counter() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("run_1")).unwrap();
        let mut output = Output {
            write: true,
            path: dir.path().join("run_#").to_string_lossy().into_owned(),
        };
        output.parse_output_folder().unwrap();
        assert!(output.path.ends_with("run_2"));

        output.path = String::from("a#b#");
        assert!(output.parse_output_folder().is_err());
    }
}
