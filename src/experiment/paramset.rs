//! Paramsets: named parameter maps handed to the experiment body.

use std::collections::HashSet;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{ExperimentError, RunError};

/// Parameters of one paramset (a JSON value, usually an object).
///
/// ```rust
/// use expvisor::Params;
///
/// let p = Params::new(serde_json::json!({"lr": 0.1, "epochs": 3}));
/// let epochs: u32 = p.get("epochs").unwrap();
/// assert_eq!(epochs, 3);
/// assert!(p.get::<u32>("missing").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Params(serde_json::Value);

impl Params {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    /// Typed lookup of one top-level key.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T, ExperimentError> {
        let value = self.0.get(key).ok_or_else(|| ExperimentError::InvalidParam {
            name: key.to_string(),
            reason: "missing".to_string(),
        })?;
        T::deserialize(value).map_err(|e| ExperimentError::InvalidParam {
            name: key.to_string(),
            reason: e.to_string(),
        })
    }

    /// Decodes the whole set into a typed struct.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, ExperimentError> {
        T::deserialize(&self.0).map_err(|e| ExperimentError::InvalidParam {
            name: "*".to_string(),
            reason: e.to_string(),
        })
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    pub fn into_value(self) -> serde_json::Value {
        self.0
    }
}

impl From<serde_json::Value> for Params {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}

/// A named parameter set.
#[derive(Debug, Clone)]
pub struct Paramset {
    pub name: String,
    pub params: Params,
}

impl Paramset {
    pub fn new(name: impl Into<String>, params: impl Into<Params>) -> Self {
        Self {
            name: name.into(),
            params: params.into(),
        }
    }
}

/// Rejects an empty list and duplicate names.
pub(crate) fn validate(experiment: &str, paramsets: &[Paramset]) -> Result<(), RunError> {
    if paramsets.is_empty() {
        return Err(RunError::NoParamsets {
            experiment: experiment.to_string(),
        });
    }
    let mut seen = HashSet::new();
    for p in paramsets {
        if !seen.insert(p.name.as_str()) {
            return Err(RunError::DuplicateParamset {
                name: p.name.clone(),
            });
        }
    }
    Ok(())
}
