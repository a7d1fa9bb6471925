use anyhow::{anyhow, Result};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::api_client::ApiClient;
use crate::datasource_trait::DataSource;

/// Live reads from the status API
pub struct ApiDataSource {
    client: ApiClient,
}

impl ApiDataSource {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }
}

impl DataSource for ApiDataSource {
    fn presets(&self) -> Result<Value> {
        self.client.get_presets()
    }

    fn project_samples(&self, project_id: &str) -> Result<Value> {
        self.client.get_project_samples(project_id)
    }

    fn project_summary(&self, project_id: &str) -> Result<Value> {
        self.client.get_project_summary(project_id)
    }

    fn latest_sticky_note(&self, project_id: &str) -> Result<Value> {
        self.client.get_latest_sticky_note(project_id)
    }

    fn describe(&self) -> String {
        self.client.base_url().to_string()
    }
}

/// JSON snapshots saved from the API, one file per endpoint:
/// `presets.json`, `project_{id}.json`, `project_summary_{id}.json`,
/// `sticky_note_{id}.json`
pub struct SnapshotDataSource {
    dir: PathBuf,
}

impl SnapshotDataSource {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    fn read(&self, filename: &str) -> Result<Value> {
        let path = self.dir.join(filename);
        let content = fs::read_to_string(&path)
            .map_err(|e| anyhow!("Cannot read {}: {}", path.display(), e))?;
        Ok(serde_json::from_str(&content)?)
    }
}

impl DataSource for SnapshotDataSource {
    fn presets(&self) -> Result<Value> {
        self.read("presets.json")
    }

    fn project_samples(&self, project_id: &str) -> Result<Value> {
        self.read(&format!("project_{}.json", project_id))
    }

    fn project_summary(&self, project_id: &str) -> Result<Value> {
        self.read(&format!("project_summary_{}.json", project_id))
    }

    fn latest_sticky_note(&self, project_id: &str) -> Result<Value> {
        let filename = format!("sticky_note_{}.json", project_id);
        if !self.dir.join(&filename).exists() {
            debug!(target: "notes", "No {} in snapshot", filename);
            return Ok(Value::Null);
        }
        self.read(&filename)
    }

    fn describe(&self) -> String {
        format!("snapshot {}", self.dir.display())
    }
}
