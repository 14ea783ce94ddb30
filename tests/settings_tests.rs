use anyhow::Result;
use snlike::prelude::*;
use snlike::routines::settings::{read, LikelihoodKind, PriorKind};
use std::fs;

fn write_toml(dir: &std::path::Path, body: &str) -> Result<String> {
    let path = dir.join("settings.toml");
    fs::write(&path, body)?;
    Ok(path.to_string_lossy().into_owned())
}

/// Test reading a complete settings file
#[test]
fn test_read_settings_file() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let output = dir.path().join("out");
    let body = format!(
        r#"
[paths]
data = "jla_mub.txt"
covariance = "jla_mub_covmatrix.txt"

[config]
model = "wcdm"
nuisance = "profiled"
likelihood = "student_t"
nu = 500.0
quadrature_order = 24

[covariance]
include_stat = true
intrinsic_scatter = 0.1

[random]
omega_m = [0.0, 1.0]
w0 = [-2.5, 0.0]

[fixed]
omega_k = 0.0

[design]
points = 128
seed = 5

[log]
level = "debug"

[output]
path = "{}"
"#,
        output.to_string_lossy()
    );
    let settings = read(write_toml(dir.path(), &body)?)?;

    assert_eq!(settings.paths.data, "jla_mub.txt");
    assert_eq!(settings.config().model, Model::Wcdm);
    assert_eq!(settings.config.likelihood, LikelihoodKind::StudentT);
    assert!(settings.covariance.include_stat);
    assert_eq!(settings.parameters().names(), vec!["omega_m", "w0"]);
    assert_eq!(settings.fixed_parameters().get(OMEGA_K), Some(0.0));
    assert_eq!(settings.design.points, 128);

    let options = settings.options()?;
    assert_eq!(options.family, Family::StudentT { nu: 500.0 });
    assert_eq!(options.quadrature_order, 24);

    // A copy of the settings is written to the output folder
    let copy: Settings = serde_json::from_str(&fs::read_to_string(output.join("settings.json"))?)?;
    assert_eq!(copy, settings);
    Ok(())
}

/// Test that missing sections take their defaults
#[test]
fn test_defaults_for_missing_sections() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let body = r#"
[random]
omega_m = [0.1, 0.5]

[output]
write = false
"#;
    let settings = read(write_toml(dir.path(), body)?)?;
    assert_eq!(settings.paths.data, "data.txt");
    assert_eq!(settings.paths.covariance, "sys_0.txt");
    assert_eq!(settings.config.nuisance, NuisanceTreatment::Marginalized);
    assert_eq!(settings.magnitude.prior, PriorKind::Flat);
    assert_eq!(settings.options()?, Options::default());
    Ok(())
}

/// Test that unknown keys and invalid combinations are rejected
#[test]
fn test_invalid_settings_are_rejected() -> Result<()> {
    let dir = tempfile::tempdir()?;

    let unknown = "[config]\nmodle = \"wcdm\"\n[output]\nwrite = false\n";
    assert!(read(write_toml(dir.path(), unknown)?).is_err());

    let t_marginalized =
        "[config]\nlikelihood = \"student_t\"\nnu = 10.0\n[output]\nwrite = false\n";
    assert!(read(write_toml(dir.path(), t_marginalized)?).is_err());

    let empty_range = "[random]\nomega_m = [0.5, 0.5]\n[output]\nwrite = false\n";
    assert!(read(write_toml(dir.path(), empty_range)?).is_err());

    let covariance_typo = "[covariance]\ninclude_stats = true\n[output]\nwrite = false\n";
    assert!(read(write_toml(dir.path(), covariance_typo)?).is_err());

    let fixed_typo = "[config]\nmodel = \"lcdm\"\n[fixed]\nomgea_k = 0.0\n[output]\nwrite = false\n";
    assert!(read(write_toml(dir.path(), fixed_typo)?).is_err());

    let unused_prior =
        "[config]\nnuisance = \"profiled\"\n[magnitude]\nprior = \"gaussian\"\nsigma = 0.1\n[output]\nwrite = false\n";
    assert!(read(write_toml(dir.path(), unused_prior)?).is_err());
    Ok(())
}

/// Test the CPL model name as written in a settings file
#[test]
fn test_w0wacdm_model_name() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let body = r#"
[config]
model = "w0wacdm"

[random]
omega_m = [0.1, 0.5]
w0 = [-2.0, 0.0]
wa = [-1.0, 1.0]

[output]
write = false
"#;
    let settings = read(write_toml(dir.path(), body)?)?;
    assert_eq!(settings.config.model, Model::W0waCdm);
    assert_eq!(settings.config.model.to_string(), "w0wacdm");
    Ok(())
}

/// Test Settings builder construction and JSON serialization
#[test]
fn test_settings_builder_serialization() -> Result<()> {
    let settings = Settings::builder()
        .set_model(Model::W0waCdm)
        .set_nuisance(NuisanceTreatment::Marginalized)
        .set_magnitude_prior(0.0, 0.5)
        .add_random(OMEGA_M, 0.0, 1.0)
        .add_random(W0, -3.0, 1.0)
        .add_random(WA, -3.0, 3.0)
        .set_write(false)
        .build();
    settings.validate()?;

    let json = serde_json::to_string(&settings)?;
    assert!(json.contains("\"w0wacdm\""));
    let deserialized: Settings = serde_json::from_str(&json)?;
    assert_eq!(deserialized, settings);
    Ok(())
}
