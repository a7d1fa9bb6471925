use anyhow::Result;
use serde_json::Value;

/// The reads a project view needs, independent of where the JSON comes from
pub trait DataSource: Send + Sync {
    /// `presets?presets_list=sv_presets`
    fn presets(&self) -> Result<Value>;

    /// `project/{id}`: sample records keyed by sample id
    fn project_samples(&self, project_id: &str) -> Result<Value>;

    /// `project_summary/{id}`
    fn project_summary(&self, project_id: &str) -> Result<Value>;

    /// `latest_sticky_run_note/{id}`: `Null` or `{}` when there is none
    fn latest_sticky_note(&self, project_id: &str) -> Result<Value>;

    /// Short label for log lines
    fn describe(&self) -> String;
}
