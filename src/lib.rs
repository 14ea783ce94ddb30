//! Likelihood of cosmological parameters given a Type Ia supernova Hubble diagram
//!
//! The crate turns an observed Hubble diagram (redshifts and distance moduli)
//! and its covariance matrix into a log-likelihood function suitable for MCMC
//! or nested samplers.
//!
//! - [cosmology] predicts distance moduli for a batch of redshifts,
//! - [likelihood::covariance] factorizes the covariance matrix once,
//! - [likelihood] evaluates the log-likelihood with the magnitude offset
//!   sampled, profiled or marginalized,
//! - [likelihood::adapter] exposes the result to external samplers.
//!
//! Settings files, data ingestion, logging and output live in [routines], and
//! [entrypoints] ties them together.

/// Background cosmology and distance predictions
pub mod cosmology;
/// Entrypoints for loading a data set and evaluating parameter points
pub mod entrypoints;
/// Error type of the likelihood kernel
pub mod error;
/// Likelihood evaluation and the sampler interface
pub mod likelihood;
/// Routines for settings, input files, logging and output
pub mod routines;

pub mod structs {
    /// Observed Hubble diagram
    pub mod hubble;
    /// Named parameter vectors and prior ranges
    pub mod parameters;
}

pub mod prelude {
    pub use crate::cosmology::{Cosmology, DistanceModel, Model};
    pub use crate::entrypoints::{evaluate, setup, Analysis};
    pub use crate::error::LikelihoodError;
    pub use crate::likelihood::{
        Cholesky, Composition, Covariance, Evaluation, Factorize, Family, Likelihood,
        LogLikelihood, MagnitudePrior, NuisanceTreatment, Options, SamplerAdapter,
    };
    pub use crate::routines::settings::Settings;
    pub use crate::routines::*;
    pub use crate::structs::hubble::HubbleDiagram;
    pub use crate::structs::parameters::*;
}
