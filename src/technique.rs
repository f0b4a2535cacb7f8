//! Technique enums and per-technique result reports
//!
//! Every modality exposes two closed sets of techniques (preprocessing and
//! augmentation). Names arriving over the wire are parsed into these enums
//! before any input is touched, so an unknown name is rejected up front
//! instead of silently producing no result.
//!
//! A [`TechniqueReport`] keeps one tagged outcome per technique. A failing
//! technique is recorded next to the successes computed in the same pass.

use crate::error::{MediaError, Result};
use crate::modality::Modality;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::warn;

/// A named transform belonging to one modality
pub trait Technique: Copy + fmt::Debug + Send + Sync + 'static {
    const MODALITY: Modality;
    const ALL: &'static [Self];

    fn as_str(&self) -> &'static str;

    fn parse(name: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == name)
            .ok_or_else(|| MediaError::UnsupportedTechnique {
                modality: Self::MODALITY,
                technique: name.to_string(),
            })
    }

    fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(|t| t.as_str()).collect()
    }
}

/// Parse a batch of technique names, failing on the first unknown one
pub fn parse_techniques<T: Technique>(names: &[String]) -> Result<Vec<T>> {
    names.iter().map(|n| T::parse(n)).collect()
}

/// Declare a technique enum with its wire names
macro_rules! techniques {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident for $modality:path {
            $($variant:ident => $label:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name {
            $($variant),+
        }

        impl $crate::technique::Technique for $name {
            const MODALITY: $crate::modality::Modality = $modality;
            const ALL: &'static [Self] = &[$($name::$variant),+];

            fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str($crate::technique::Technique::as_str(self))
            }
        }
    };
}

pub(crate) use techniques;

/// Outcome of a single technique
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TechniqueOutcome {
    Ok { output: String },
    Failed { error: String },
}

/// Technique name -> outcome for one process/augment call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TechniqueReport {
    entries: BTreeMap<String, TechniqueOutcome>,
}

impl TechniqueReport {
    /// Run `apply` for each technique, recording successes and failures alike
    pub fn collect<T: Technique>(techniques: &[T], mut apply: impl FnMut(T) -> Result<String>) -> Self {
        let mut report = Self::default();
        for &technique in techniques {
            match apply(technique) {
                Ok(output) => report.insert_ok(technique.as_str(), output),
                Err(e) => {
                    warn!(modality = %T::MODALITY, technique = technique.as_str(), "technique failed: {}", e);
                    report.insert_failed(technique.as_str(), e.to_string());
                }
            }
        }
        report
    }

    pub fn insert_ok(&mut self, technique: &str, output: String) {
        self.entries.insert(technique.to_string(), TechniqueOutcome::Ok { output });
    }

    pub fn insert_failed(&mut self, technique: &str, error: String) {
        self.entries.insert(technique.to_string(), TechniqueOutcome::Failed { error });
    }

    pub fn get(&self, technique: &str) -> Option<&TechniqueOutcome> {
        self.entries.get(technique)
    }

    /// Successful output of a technique, if it ran and succeeded
    pub fn output(&self, technique: &str) -> Option<&str> {
        match self.entries.get(technique) {
            Some(TechniqueOutcome::Ok { output }) => Some(output),
            _ => None,
        }
    }

    pub fn failure_count(&self) -> usize {
        self.entries
            .values()
            .filter(|o| matches!(o, TechniqueOutcome::Failed { .. }))
            .count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
