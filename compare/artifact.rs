//! The saved-model artifact.
//!
//! A fitted model can be written to a human-readable TOML file for
//! record-keeping: the formula, the link, and one named coefficient per
//! design column.

use crate::glm::{FittedGlm, LinkFunction};
use crate::model::ModelSpec;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedCoefficient {
    pub name: String,
    pub value: f64,
}

/// The top-level, self-contained artifact written to and read from disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedModel {
    pub formula: String,
    pub link: LinkFunction,
    pub deviance: f64,
    pub coefficients: Vec<SavedCoefficient>,
}

#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("failed to read or write model file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to serialize model to TOML format: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
    #[error("failed to parse TOML model file: {0}")]
    TomlParse(#[from] toml::de::Error),
}

impl SavedModel {
    /// Pairs a fit's coefficients with their design-column names.
    pub fn from_fit(spec: &ModelSpec, column_names: &[String], fitted: &FittedGlm) -> Self {
        let coefficients = column_names
            .iter()
            .zip(fitted.coefficients.iter())
            .map(|(name, &value)| SavedCoefficient {
                name: name.clone(),
                value,
            })
            .collect();
        Self {
            formula: spec.to_string(),
            link: fitted.link,
            deviance: fitted.deviance,
            coefficients,
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ArtifactError> {
        let rendered = toml::to_string_pretty(self)?;
        fs::write(path, rendered)?;
        log::info!("saved model artifact to {}", path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, ArtifactError> {
        let raw = fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }
}
