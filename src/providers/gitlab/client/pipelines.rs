use super::core::GitLabClient;
use crate::error::Result;
use crate::providers::gitlab::types::{ApiResponse, JobRecord, PipelineRecord};

impl GitLabClient {
    /// Lists the project's pipelines, most recent first (GitLab's default order).
    pub async fn list_pipelines(&self) -> Result<ApiResponse<Vec<PipelineRecord>>> {
        let url = self.project_endpoint("pipelines")?;
        self.get_api(url).await
    }

    /// Lists the jobs of pipeline `pipeline_id`.
    pub async fn list_pipeline_jobs(&self, pipeline_id: u64) -> Result<ApiResponse<Vec<JobRecord>>> {
        let url = self.project_endpoint(&format!("pipelines/{pipeline_id}/jobs"))?;
        self.get_api(url).await
    }
}
