//! Routes finished bundles to their configured destination.
//!
//! The dispatcher is the pipeline's bundle handler: one instance sits behind
//! the queue consumer and applies each labelled fragment to the console, the
//! filesystem, both, or a remote repository.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;

use clinfhir_core::{Bundle, SequenceLabel};
use clinfhir_pipeline::BundleHandler;

use crate::error::{Result, SinkError};
use crate::repository::ResourceRepository;

/// Where finished bundles go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Console,
    File,
    Both,
    Server,
}

impl FromStr for OutputMode {
    type Err = SinkError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "console" => Ok(Self::Console),
            "file" => Ok(Self::File),
            "both" => Ok(Self::Both),
            "server" => Ok(Self::Server),
            other => Err(SinkError::configuration(format!(
                "unknown output mode '{other}', expected console, file, both or server"
            ))),
        }
    }
}

impl std::fmt::Display for OutputMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Console => "console",
            Self::File => "file",
            Self::Both => "both",
            Self::Server => "server",
        };
        f.write_str(text)
    }
}

/// File name for one labelled fragment, `bundle{label}.json`. The sentinel
/// label maps to the bare `bundle.json`.
pub fn bundle_file_name(label: SequenceLabel) -> String {
    match label {
        SequenceLabel::Sentinel => "bundle.json".to_string(),
        fragment => format!("bundle{fragment}.json"),
    }
}

/// Terminal consumer of labelled bundles.
pub struct OutputDispatcher {
    mode: OutputMode,
    output_dir: Option<PathBuf>,
    repository: Option<Arc<dyn ResourceRepository>>,
}

impl OutputDispatcher {
    pub fn console() -> Self {
        Self {
            mode: OutputMode::Console,
            output_dir: None,
            repository: None,
        }
    }

    pub fn file(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            mode: OutputMode::File,
            output_dir: Some(output_dir.into()),
            repository: None,
        }
    }

    pub fn both(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            mode: OutputMode::Both,
            output_dir: Some(output_dir.into()),
            repository: None,
        }
    }

    pub fn server(repository: Arc<dyn ResourceRepository>) -> Self {
        Self {
            mode: OutputMode::Server,
            output_dir: None,
            repository: Some(repository),
        }
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    fn output_dir(&self) -> Result<&Path> {
        self.output_dir
            .as_deref()
            .ok_or_else(|| SinkError::configuration("file output mode without an output directory"))
    }

    async fn write_file(&self, label: SequenceLabel, bundle: &Bundle) -> Result<PathBuf> {
        let path = self.output_dir()?.join(bundle_file_name(label));
        let text = serde_json::to_string_pretty(bundle)?;
        tokio::fs::write(&path, text).await?;
        Ok(path)
    }

    fn print_console(&self, label: SequenceLabel, bundle: &Bundle) -> Result<()> {
        let text = serde_json::to_string_pretty(bundle)?;
        println!("--- bundle {label} ({} resources)", bundle.resource_count());
        println!("{text}");
        Ok(())
    }

    async fn dispatch(&self, label: SequenceLabel, bundle: &Bundle) -> Result<()> {
        match self.mode {
            OutputMode::Console => self.print_console(label, bundle)?,
            OutputMode::File => {
                let path = self.write_file(label, bundle).await?;
                tracing::debug!(label = %label, path = %path.display(), "bundle written");
            }
            OutputMode::Both => {
                self.print_console(label, bundle)?;
                self.write_file(label, bundle).await?;
            }
            OutputMode::Server => {
                let repository = self.repository.as_ref().ok_or_else(|| {
                    SinkError::configuration("server output mode without a repository")
                })?;
                repository.submit(bundle).await?;
                tracing::debug!(
                    label = %label,
                    resources = bundle.resource_count(),
                    "bundle accepted by repository"
                );
            }
        }
        Ok(())
    }
}

#[async_trait]
impl BundleHandler for OutputDispatcher {
    async fn handle(&self, label: SequenceLabel, bundle: Bundle) -> anyhow::Result<()> {
        self.dispatch(label, &bundle).await?;
        Ok(())
    }
}
