//! Reading selector sets, steps and document fixtures from disk.
//!
//! YAML is accepted everywhere, which also covers JSON input.

use std::path::Path;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use tokio::fs;
use waypoint_dom::DocumentFixture;
use waypoint_locator::{DiagnosticStep, SelectorSet};

pub async fn read_input<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    serde_yaml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

pub async fn read_selector_set(path: &Path) -> Result<SelectorSet> {
    read_input(path).await
}

/// Steps are either a bare list or a `steps:` mapping.
pub async fn read_steps(path: &Path) -> Result<Vec<DiagnosticStep>> {
    #[derive(serde::Deserialize)]
    #[serde(untagged)]
    enum StepsFile {
        List(Vec<DiagnosticStep>),
        Wrapped { steps: Vec<DiagnosticStep> },
    }

    Ok(match read_input::<StepsFile>(path).await? {
        StepsFile::List(steps) | StepsFile::Wrapped { steps } => steps,
    })
}

pub async fn read_fixture(path: &Path) -> Result<DocumentFixture> {
    let raw = fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    DocumentFixture::from_yaml(&raw).with_context(|| format!("parsing {}", path.display()))
}
