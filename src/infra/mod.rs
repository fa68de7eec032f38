//! Runtime bootstrap.

use std::path::Path;

use crate::config::{self, Settings};

pub mod error;
pub mod telemetry;

use error::InfraError;

/// Load settings and install telemetry from them.
pub fn bootstrap(config_file: Option<&Path>) -> Result<Settings, InfraError> {
    let settings = config::load(config_file)?;
    telemetry::init(&settings.logging)?;
    Ok(settings)
}
