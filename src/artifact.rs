//! Persisted analysis products.
//!
//! Every product is written inside an envelope carrying a format tag and a
//! schema version. Loading reads the tags first and refuses anything it does
//! not recognize, so stale or foreign files fail loudly instead of being
//! misinterpreted.

use crate::error::{Result, TimingError};
use crate::events::ObservationInfo;
use crate::lightcurve::LightCurve;
use crate::search::FoldingResult;
use crate::spectrum::{CrossSpectrum, Spectrum};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// Format tag written in every envelope.
pub const ARTIFACT_FORMAT: &str = "xtiming";

/// Current schema version.
pub const ARTIFACT_VERSION: u32 = 1;

/// Any analysis product that can be persisted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "product", rename_all = "snake_case")]
pub enum Artifact {
    Spectrum(Spectrum),
    CrossSpectrum(CrossSpectrum),
    Folding(FoldingResult),
    LightCurve(LightCurve),
}

impl Artifact {
    /// Short name of the artifact kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Artifact::Spectrum(_) => "spectrum",
            Artifact::CrossSpectrum(_) => "cross_spectrum",
            Artifact::Folding(_) => "folding",
            Artifact::LightCurve(_) => "light_curve",
        }
    }

    /// Observation metadata of the product.
    pub fn info(&self) -> &ObservationInfo {
        match self {
            Artifact::Spectrum(s) => &s.info,
            Artifact::CrossSpectrum(s) => &s.info,
            Artifact::Folding(f) => &f.info,
            Artifact::LightCurve(lc) => &lc.info,
        }
    }
}

impl From<Spectrum> for Artifact {
    fn from(value: Spectrum) -> Self {
        Artifact::Spectrum(value)
    }
}

impl From<CrossSpectrum> for Artifact {
    fn from(value: CrossSpectrum) -> Self {
        Artifact::CrossSpectrum(value)
    }
}

impl From<FoldingResult> for Artifact {
    fn from(value: FoldingResult) -> Self {
        Artifact::Folding(value)
    }
}

impl From<LightCurve> for Artifact {
    fn from(value: LightCurve) -> Self {
        Artifact::LightCurve(value)
    }
}

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    format: &'a str,
    version: u32,
    artifact: &'a Artifact,
}

/// Tags are read before the payload so unknown payloads can be reported.
#[derive(Deserialize)]
struct EnvelopeHeader {
    format: String,
    version: u32,
    artifact: serde_json::Value,
}

/// Storage backend for artifacts.
pub trait ArtifactStore {
    fn save(&self, artifact: &Artifact, path: &Path) -> Result<()>;
    fn load(&self, path: &Path) -> Result<Artifact>;
}

/// JSON files on the local filesystem.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonStore {
    pub pretty: bool,
}

impl JsonStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pretty() -> Self {
        Self { pretty: true }
    }

    /// Serialize an artifact with its envelope.
    pub fn to_json(&self, artifact: &Artifact) -> Result<String> {
        let envelope = EnvelopeRef {
            format: ARTIFACT_FORMAT,
            version: ARTIFACT_VERSION,
            artifact,
        };
        let text = if self.pretty {
            serde_json::to_string_pretty(&envelope)?
        } else {
            serde_json::to_string(&envelope)?
        };
        Ok(text)
    }

    /// Parse an enveloped artifact; `origin` is only used in error messages.
    pub fn from_json(&self, text: &str, origin: &Path) -> Result<Artifact> {
        let header: EnvelopeHeader =
            serde_json::from_str(text).map_err(|e| unsupported(origin, e.to_string()))?;
        decode(header, origin)
    }
}

fn unsupported(path: &Path, reason: impl Into<String>) -> TimingError {
    TimingError::UnsupportedArtifact {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

fn decode(header: EnvelopeHeader, origin: &Path) -> Result<Artifact> {
    if header.format != ARTIFACT_FORMAT {
        return Err(unsupported(
            origin,
            format!("unknown format tag {:?}", header.format),
        ));
    }
    if header.version != ARTIFACT_VERSION {
        return Err(unsupported(
            origin,
            format!(
                "schema version {} (supported: {ARTIFACT_VERSION})",
                header.version
            ),
        ));
    }
    serde_json::from_value(header.artifact).map_err(|e| unsupported(origin, e.to_string()))
}

impl ArtifactStore for JsonStore {
    fn save(&self, artifact: &Artifact, path: &Path) -> Result<()> {
        let text = self.to_json(artifact)?;
        let mut writer = BufWriter::new(File::create(path)?);
        writer.write_all(text.as_bytes())?;
        writer.flush()?;
        log::debug!("saved {} to {}", artifact.kind(), path.display());
        Ok(())
    }

    fn load(&self, path: &Path) -> Result<Artifact> {
        let reader = BufReader::new(File::open(path)?);
        let header: EnvelopeHeader =
            serde_json::from_reader(reader).map_err(|e| unsupported(path, e.to_string()))?;
        decode(header, path)
    }
}
