// Routines for reading the Hubble diagram and covariance files
pub mod datafile;
// Routines for generating or reading parameter points
pub mod initialization;
// Routines for logging
pub mod logger;
// Routines for output
pub mod output;
// Routines for settings
pub mod settings;
