/// Builds the web URL of a pipeline.
///
/// Used when the API response carries no `web_url`.
///
/// # Arguments
///
/// * `base_url` - GitLab instance base URL (e.g., <https://gitlab.com>)
/// * `repo` - Project path (e.g., "group/project")
/// * `pipeline_id` - Numeric pipeline ID
///
/// # Returns
///
/// Clickable URL to the pipeline (e.g., <https://gitlab.com/group/project/-/pipelines/123>)
pub fn pipeline_url(base_url: &str, repo: &str, pipeline_id: u64) -> String {
    format!("{}/{repo}/-/pipelines/{pipeline_id}", base_url.trim_end_matches('/'))
}

/// Builds the web URL of a job.
pub fn job_url(base_url: &str, repo: &str, job_id: u64) -> String {
    format!("{}/{repo}/-/jobs/{job_id}", base_url.trim_end_matches('/'))
}
