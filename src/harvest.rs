//! Triggering dataset harvests on the pipe scheduler.
//!
//! Pipes are defined as YAML files under `<pipes_dir>/<project>/`, each with a
//! `header.name`. A pipe is started by enabling its `immediateTrigger`.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use url::Url;

/// Pipe that collects metrics and is never triggered manually.
pub const RESERVED_PIPE: &str = "metrics";
const TRIGGER_ID: &str = "immediateTrigger";

#[derive(Debug, thiserror::Error)]
pub enum HarvestError {
    #[error("IO error reading {0:?}: {1}")]
    Io(PathBuf, std::io::Error),
    #[error("YAML error in {0:?}: {1}")]
    Yaml(PathBuf, serde_yaml::Error),
    #[error("Invalid pipe URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, serde::Deserialize)]
struct PipeFile {
    header: PipeHeader,
}

#[derive(Debug, serde::Deserialize)]
struct PipeHeader {
    name: String,
}

#[derive(serde::Serialize)]
struct TriggerRequest<'a> {
    status: &'a str,
    id: &'a str,
}

fn collect_yaml_files(dir: &Path, files: &mut Vec<PathBuf>) -> Result<(), HarvestError> {
    let entries = std::fs::read_dir(dir).map_err(|e| HarvestError::Io(dir.to_path_buf(), e))?;
    for entry in entries {
        let path = entry
            .map_err(|e| HarvestError::Io(dir.to_path_buf(), e))?
            .path();
        if path.is_dir() {
            collect_yaml_files(&path, files)?;
        } else if path.extension().is_some_and(|ext| ext == "yaml") {
            files.push(path);
        }
    }
    Ok(())
}

fn read_pipe_name(path: &Path) -> Result<String, HarvestError> {
    let contents =
        std::fs::read_to_string(path).map_err(|e| HarvestError::Io(path.to_path_buf(), e))?;
    let pipe: PipeFile =
        serde_yaml::from_str(&contents).map_err(|e| HarvestError::Yaml(path.to_path_buf(), e))?;
    Ok(pipe.header.name)
}

/// Names of all pipes defined for `project`, sorted, without the reserved
/// metrics pipe.
pub fn list_pipes(pipes_dir: &Path, project: &str) -> Result<Vec<String>, HarvestError> {
    let mut files = Vec::new();
    collect_yaml_files(&pipes_dir.join(project), &mut files)?;

    let mut pipes = Vec::with_capacity(files.len());
    for file in files {
        let name = read_pipe_name(&file)?;
        if name == RESERVED_PIPE {
            continue;
        }
        pipes.push(name);
    }

    pipes.sort();
    Ok(pipes)
}

/// `{base}/pipes/{pipe}/triggers/immediateTrigger`
pub fn trigger_url(base: &Url, pipe: &str) -> Result<Url, HarvestError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
        .pop_if_empty()
        .extend(["pipes", pipe, "triggers", TRIGGER_ID]);
    Ok(url)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerResponse {
    pub status: u16,
    pub body: String,
}

pub async fn trigger_pipe(
    client: &reqwest::Client,
    base: &Url,
    pipe: &str,
    timeout: Duration,
) -> Result<TriggerResponse, HarvestError> {
    let url = trigger_url(base, pipe)?;
    let response = client
        .put(url)
        .timeout(timeout)
        .json(&TriggerRequest {
            status: "enabled",
            id: TRIGGER_ID,
        })
        .send()
        .await?;

    let status = response.status().as_u16();
    let body = response.text().await?;
    Ok(TriggerResponse { status, body })
}

pub struct Harvester {
    pub client: reqwest::Client,
    pub base: Url,
    pub request_timeout: Duration,
    /// Wait between two consecutive triggers.
    pub delay: Duration,
    pub dry_run: bool,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HarvestSummary {
    pub triggered: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl Harvester {
    pub async fn run(&self, pipes: &[String]) -> HarvestSummary {
        let mut summary = HarvestSummary::default();
        log::info!("Skip dry run: {}", !self.dry_run);

        for (i, pipe) in pipes.iter().enumerate() {
            if self.dry_run {
                log::info!("[DryRun] Harvesting dataset {pipe}");
                summary.skipped += 1;
                continue;
            }

            if i > 0 {
                log::info!("Waiting {:?} before triggering {pipe}", self.delay);
                tokio::time::sleep(self.delay).await;
            }

            log::info!("Harvesting dataset {pipe}");
            match trigger_pipe(&self.client, &self.base, pipe, self.request_timeout).await {
                Ok(TriggerResponse { status, body }) if (200..300).contains(&status) => {
                    log::info!("[{pipe}] response: {status} {body}");
                    summary.triggered += 1;
                }
                Ok(TriggerResponse { status, body }) => {
                    log::warn!("[{pipe}] response: {status} {body}");
                    summary.failed += 1;
                }
                Err(e) => {
                    log::error!("[{pipe}] trigger failed: {e}");
                    summary.failed += 1;
                }
            }
        }

        summary
    }
}
