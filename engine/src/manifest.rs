//! Dockerfile synthesis for a staged artifact.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::profiles::{RuntimeProfile, ARTIFACT_PLACEHOLDER};

pub const MANIFEST_FILE: &str = "Dockerfile";
pub const CONTAINER_WORKDIR: &str = "/sandbox";

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("{0}")]
    Unsupported(String),
    #[error("invalid base image reference {0:?}")]
    InvalidBaseImage(String),
    #[error("failed to write manifest {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildManifest {
    pub path: PathBuf,
    pub contents: String,
    pub artifact_name: String,
    pub command: Vec<String>,
}

/// Render the manifest text for `artifact_name` without touching the disk.
pub fn render(
    artifact_name: &str,
    profile: &RuntimeProfile,
    base_image: &str,
) -> Result<String, ManifestError> {
    if base_image.is_empty() || base_image.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(ManifestError::InvalidBaseImage(base_image.to_string()));
    }
    if artifact_name.is_empty() || artifact_name.contains('/') {
        return Err(ManifestError::Unsupported(format!(
            "artifact name {:?} is not a base name",
            artifact_name
        )));
    }

    let command = profile.render_command(artifact_name);
    if command.is_empty() || command[0].trim().is_empty() {
        return Err(ManifestError::Unsupported(format!(
            "profile {} has an empty run command",
            profile.kind
        )));
    }

    let mut lines = vec![
        format!("FROM {}", base_image),
        format!("WORKDIR {}", CONTAINER_WORKDIR),
        format!(
            "COPY {}",
            exec_form(&[artifact_name.to_string(), format!("{}/", CONTAINER_WORKDIR)])
        ),
        format!(
            "RUN {}",
            exec_form(&["chmod".into(), "+x".into(), artifact_name.to_string()])
        ),
    ];
    for step in profile.render_setup() {
        lines.push(format!("RUN {}", exec_form(&step)));
    }
    lines.push(format!("CMD {}", exec_form(&command)));

    let mut contents = lines.join("\n");
    contents.push('\n');

    if contents.contains(ARTIFACT_PLACEHOLDER) {
        return Err(ManifestError::Unsupported(format!(
            "unresolved placeholder left in manifest for {}",
            profile.kind
        )));
    }
    Ok(contents)
}

/// Write the manifest for `artifact` next to it in `workspace_dir`.
pub fn synthesize(
    artifact: &Path,
    profile: &RuntimeProfile,
    workspace_dir: &Path,
    base_image: &str,
) -> Result<BuildManifest, ManifestError> {
    let artifact_name = artifact
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| {
            ManifestError::Unsupported(format!("{} has no file name", artifact.display()))
        })?;

    let contents = render(&artifact_name, profile, base_image)?;
    let path = workspace_dir.join(MANIFEST_FILE);
    fs::write(&path, &contents).map_err(|source| ManifestError::Io {
        path: path.clone(),
        source,
    })?;
    debug!(manifest = %path.display(), kind = %profile.kind, "manifest written");

    Ok(BuildManifest {
        path,
        contents,
        command: profile.render_command(&artifact_name),
        artifact_name,
    })
}

fn exec_form(tokens: &[String]) -> String {
    // A JSON array of strings always serializes.
    serde_json::to_string(tokens).unwrap_or_else(|_| "[]".to_string())
}
