use std::future::Future;
use std::ops::ControlFlow;
use std::process::ExitCode;
use std::time::Duration;

use log::{info, warn};

use crate::artifact;
use crate::config::Config;
use crate::error::Result;
use crate::output::{failure, status, success, PhaseProgress};
use crate::providers::gitlab::links;
use crate::providers::gitlab::types::{find_pipeline, ApiResponse, ErrorBody, PipelineRecord};
use crate::providers::gitlab::GitLabClient;

/// Result of a run, mapped one-to-one onto the process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Pipeline succeeded and the artifact, if requested, was saved
    Success,
    /// Pipeline failed, was canceled or was skipped
    PipelineFailed,
    /// No pipeline appeared for the commit
    SpawnTimeout,
    /// Pipeline never reached a terminal status
    CompletionTimeout,
    /// GitLab answered with an error object
    ApiError,
}

impl Outcome {
    pub fn code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::PipelineFailed => 1,
            Self::SpawnTimeout => 2,
            Self::CompletionTimeout => 3,
            Self::ApiError => 4,
        }
    }
}

impl From<Outcome> for ExitCode {
    fn from(outcome: Outcome) -> Self {
        ExitCode::from(outcome.code())
    }
}

/// Delay between two polls.
pub trait Pause {
    fn pause(&self, duration: Duration) -> impl Future<Output = ()>;
}

/// Sleeps on the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioPause;

impl Pause for TokioPause {
    async fn pause(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

impl<P: Pause> Pause for &P {
    fn pause(&self, duration: Duration) -> impl Future<Output = ()> {
        (**self).pause(duration)
    }
}

/// Waits for the pipeline of `config.sha` and fetches its artifact.
///
/// # Errors
///
/// Returns an error on network failures, malformed responses, a missing
/// artifact job or a failure to write the artifact.
pub async fn run(config: &Config) -> Result<Outcome> {
    PipelineWaiter::new(config, TokioPause)?.run().await
}

/// Follows one pipeline from spawn to completion.
pub struct PipelineWaiter<'a, P> {
    config: &'a Config,
    client: GitLabClient,
    pause: P,
}

impl<'a, P: Pause> PipelineWaiter<'a, P> {
    pub fn new(config: &'a Config, pause: P) -> Result<Self> {
        let client = GitLabClient::new(
            &config.base_url,
            &config.api_version,
            &config.repo,
            config.token.clone(),
            &config.user_agent,
        )?;

        Ok(Self {
            config,
            client,
            pause,
        })
    }

    pub async fn run(&self) -> Result<Outcome> {
        info!(
            "Waiting for pipeline of {} in {} (spawn: {}x{}s, completion: {}x{}s)",
            self.config.sha,
            self.config.repo,
            self.config.spawn.count,
            self.config.spawn.period,
            self.config.completion.count,
            self.config.completion.period,
        );

        let progress = PhaseProgress::start_spawn_phase(&self.config.sha);
        let spawned = match self.wait_for_spawn(&progress).await? {
            ControlFlow::Continue(pipeline) => pipeline,
            ControlFlow::Break(outcome) => {
                progress.finish();
                return Ok(outcome);
            }
        };

        let progress = progress.finish_spawn_start_completion(spawned.id);
        let pipeline = match self.wait_for_completion(&progress, spawned).await? {
            ControlFlow::Continue(pipeline) => pipeline,
            ControlFlow::Break(outcome) => {
                progress.finish();
                return Ok(outcome);
            }
        };

        let Some(request) = &self.config.artifact else {
            progress.finish();
            return Ok(Outcome::Success);
        };

        let progress = progress.start_artifact(&request.job_name);
        let retrieved = artifact::retrieve(
            &self.client,
            pipeline.id,
            request,
            self.config.web_root(),
            &self.config.repo,
            &progress,
        )
        .await?;

        match retrieved {
            ControlFlow::Continue(_) => {
                progress.finish_with_success("Artifact saved");
                Ok(Outcome::Success)
            }
            ControlFlow::Break(outcome) => {
                progress.finish();
                Ok(outcome)
            }
        }
    }

    /// Polls until a pipeline for the commit is listed.
    async fn wait_for_spawn(
        &self,
        progress: &PhaseProgress,
    ) -> Result<ControlFlow<Outcome, PipelineRecord>> {
        let schedule = self.config.spawn;
        let sha = &self.config.sha;

        for attempt in 1..=schedule.count {
            progress.set_attempt(attempt, schedule.count);

            let pipelines = match self.client.list_pipelines().await? {
                ApiResponse::Data(pipelines) => pipelines,
                ApiResponse::Error(error) => {
                    report_api_error(progress, &error);
                    return Ok(ControlFlow::Break(Outcome::ApiError));
                }
            };

            if let Some(pipeline) = find_pipeline(&pipelines, sha) {
                info!("Pipeline #{} spawned for {sha}", pipeline.id);
                return Ok(ControlFlow::Continue(pipeline.clone()));
            }

            progress.line(schedule.elapsed(attempt), format!("No pipeline yet for SHA {sha}"));
            self.pause.pause(schedule.delay()).await;
        }

        progress.line(schedule.budget(), failure("Pipeline spawn timeout"));
        Ok(ControlFlow::Break(Outcome::SpawnTimeout))
    }

    /// Polls until the pipeline reaches a terminal status.
    async fn wait_for_completion(
        &self,
        progress: &PhaseProgress,
        spawned: PipelineRecord,
    ) -> Result<ControlFlow<Outcome, PipelineRecord>> {
        let schedule = self.config.completion;
        let sha = &self.config.sha;
        let mut last_seen = spawned;

        for attempt in 1..=schedule.count {
            progress.set_attempt(attempt, schedule.count);
            let elapsed = schedule.elapsed(attempt);

            let pipelines = match self.client.list_pipelines().await? {
                ApiResponse::Data(pipelines) => pipelines,
                ApiResponse::Error(error) => {
                    report_api_error(progress, &error);
                    return Ok(ControlFlow::Break(Outcome::ApiError));
                }
            };

            match find_pipeline(&pipelines, sha) {
                Some(pipeline) if pipeline.status.is_success() => {
                    progress.line(
                        elapsed,
                        success(format!("Pipeline success! See {}", self.link(pipeline))),
                    );
                    return Ok(ControlFlow::Continue(pipeline.clone()));
                }
                Some(pipeline) if pipeline.status.is_failure() => {
                    progress.line(
                        elapsed,
                        failure(format!(
                            "Pipeline failure ({})! See {}",
                            pipeline.status,
                            self.link(pipeline)
                        )),
                    );
                    return Ok(ControlFlow::Break(Outcome::PipelineFailed));
                }
                Some(pipeline) => {
                    progress.line(elapsed, format!("Pipeline status: {}", status(&pipeline.status)));
                    last_seen = pipeline.clone();
                }
                None => {
                    warn!("Pipeline #{} for {sha} is no longer listed", last_seen.id);
                    progress.line(elapsed, format!("Pipeline for SHA {sha} not listed"));
                }
            }

            self.pause.pause(schedule.delay()).await;
        }

        progress.line(
            schedule.budget(),
            failure(format!(
                "Pipeline completion timeout! See {}",
                self.link(&last_seen)
            )),
        );
        Ok(ControlFlow::Break(Outcome::CompletionTimeout))
    }

    fn link(&self, pipeline: &PipelineRecord) -> String {
        pipeline.web_url.clone().unwrap_or_else(|| {
            links::pipeline_url(self.config.web_root(), &self.config.repo, pipeline.id)
        })
    }
}

pub(crate) fn report_api_error(progress: &PhaseProgress, error: &ErrorBody) {
    warn!("GitLab API returned error object: {error:?}");
    progress.note(failure(format!("Error: {error}")));
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::path::PathBuf;

    use serde_json::Value;

    use super::*;
    use crate::auth::Token;
    use crate::config::{ArtifactRequest, Schedule};
    use crate::error::PipewaitError;

    const PIPELINES: &str = "/api/v4/projects/group%2Fproject/pipelines";
    const SHA: &str = "abc123";

    #[derive(Default)]
    struct RecordingPause {
        pauses: RefCell<Vec<Duration>>,
    }

    impl RecordingPause {
        fn count(&self) -> usize {
            self.pauses.borrow().len()
        }

        fn total(&self) -> Duration {
            self.pauses.borrow().iter().sum()
        }
    }

    impl Pause for RecordingPause {
        async fn pause(&self, duration: Duration) {
            self.pauses.borrow_mut().push(duration);
        }
    }

    fn config(
        server_url: &str,
        spawn: Schedule,
        completion: Schedule,
        artifact: Option<ArtifactRequest>,
    ) -> Config {
        Config::new(
            SHA.to_string(),
            Token::from("glpat-test"),
            server_url,
            "group/project".to_string(),
            "v4".to_string(),
            spawn,
            completion,
            artifact,
            "pipewait-test".to_string(),
        )
        .unwrap()
    }

    fn pipelines_body(status: &str) -> String {
        format!(
            r#"[
                {{"id": 77, "sha": "0000ffff", "status": "success", "web_url": "https://gitlab.example.com/group/project/-/pipelines/77"}},
                {{"id": 78, "sha": "{SHA}", "status": "{status}", "web_url": "https://gitlab.example.com/group/project/-/pipelines/78"}}
            ]"#
        )
    }

    const ERROR_BODY: &str = r#"{"error": "insufficient_scope", "error_description": "The request requires higher privileges than provided by the access token.", "scope": "read_api"}"#;

    async fn run_with(config: &Config, pause: &RecordingPause) -> Result<Outcome> {
        PipelineWaiter::new(config, pause).unwrap().run().await
    }

    #[tokio::test]
    async fn test_immediate_success_without_artifact() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", PIPELINES)
            .match_header("PRIVATE-TOKEN", "glpat-test")
            .with_status(200)
            .with_body(pipelines_body("success"))
            .expect(2)
            .create_async()
            .await;

        let config = config(&server.url(), Schedule::new(5, 10), Schedule::new(5, 20), None);
        let pause = RecordingPause::default();

        let outcome = run_with(&config, &pause).await.unwrap();

        assert_eq!(outcome, Outcome::Success);
        assert_eq!(outcome.code(), 0);
        assert_eq!(pause.count(), 0);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_spawn_timeout_uses_whole_budget() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", PIPELINES)
            .with_status(200)
            .with_body(r#"[{"id": 77, "sha": "0000ffff", "status": "running"}]"#)
            .expect(3)
            .create_async()
            .await;

        let config = config(&server.url(), Schedule::new(3, 30), Schedule::new(5, 20), None);
        let pause = RecordingPause::default();

        let outcome = run_with(&config, &pause).await.unwrap();

        assert_eq!(outcome, Outcome::SpawnTimeout);
        assert_eq!(outcome.code(), 2);
        assert_eq!(pause.count(), 3);
        assert_eq!(pause.total(), Duration::from_secs(90));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_zero_retry_count_times_out_without_fetching() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", PIPELINES)
            .with_body(pipelines_body("success"))
            .expect(0)
            .create_async()
            .await;

        let config = config(&server.url(), Schedule::new(0, 30), Schedule::new(5, 20), None);
        let pause = RecordingPause::default();

        let outcome = run_with(&config, &pause).await.unwrap();

        assert_eq!(outcome, Outcome::SpawnTimeout);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_spawn_after_two_attempts() {
        let mut server = mockito::Server::new_async().await;
        let empty = server
            .mock("GET", PIPELINES)
            .with_body("[]")
            .expect(2)
            .create_async()
            .await;
        let listed = server
            .mock("GET", PIPELINES)
            .with_body(pipelines_body("success"))
            .expect(2)
            .create_async()
            .await;

        let config = config(&server.url(), Schedule::new(5, 10), Schedule::new(5, 20), None);
        let pause = RecordingPause::default();

        let outcome = run_with(&config, &pause).await.unwrap();

        assert_eq!(outcome, Outcome::Success);
        assert_eq!(pause.total(), Duration::from_secs(20));
        empty.assert_async().await;
        listed.assert_async().await;
    }

    #[tokio::test]
    async fn test_running_then_success_takes_three_completion_polls() {
        let mut server = mockito::Server::new_async().await;
        // One spawn-phase fetch plus two completion-phase fetches.
        let running = server
            .mock("GET", PIPELINES)
            .with_body(pipelines_body("running"))
            .expect(3)
            .create_async()
            .await;
        let success = server
            .mock("GET", PIPELINES)
            .with_body(pipelines_body("success"))
            .expect(1)
            .create_async()
            .await;

        let config = config(&server.url(), Schedule::new(5, 10), Schedule::new(5, 20), None);
        let pause = RecordingPause::default();

        let outcome = run_with(&config, &pause).await.unwrap();

        assert_eq!(outcome, Outcome::Success);
        assert_eq!(pause.pauses.borrow().as_slice(), &[Duration::from_secs(20); 2]);
        running.assert_async().await;
        success.assert_async().await;
    }

    #[tokio::test]
    async fn test_failure_statuses_stop_immediately() {
        for status in ["failed", "canceled", "skipped"] {
            let mut server = mockito::Server::new_async().await;
            let mock = server
                .mock("GET", PIPELINES)
                .with_body(pipelines_body(status))
                .expect(2)
                .create_async()
                .await;

            let config = config(&server.url(), Schedule::new(5, 10), Schedule::new(5, 20), None);
            let pause = RecordingPause::default();

            let outcome = run_with(&config, &pause).await.unwrap();

            assert_eq!(outcome, Outcome::PipelineFailed, "status {status}");
            assert_eq!(outcome.code(), 1);
            assert_eq!(pause.count(), 0);
            mock.assert_async().await;
        }
    }

    #[tokio::test]
    async fn test_completion_timeout() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", PIPELINES)
            .with_body(pipelines_body("manual"))
            .expect(5)
            .create_async()
            .await;

        let config = config(&server.url(), Schedule::new(5, 10), Schedule::new(4, 20), None);
        let pause = RecordingPause::default();

        let outcome = run_with(&config, &pause).await.unwrap();

        assert_eq!(outcome, Outcome::CompletionTimeout);
        assert_eq!(outcome.code(), 3);
        assert_eq!(pause.total(), Duration::from_secs(80));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_pipeline_missing_during_completion_keeps_polling() {
        let mut server = mockito::Server::new_async().await;
        let spawned = server
            .mock("GET", PIPELINES)
            .with_body(pipelines_body("pending"))
            .expect(1)
            .create_async()
            .await;
        let missing = server
            .mock("GET", PIPELINES)
            .with_body("[]")
            .expect(1)
            .create_async()
            .await;
        let done = server
            .mock("GET", PIPELINES)
            .with_body(pipelines_body("success"))
            .expect(1)
            .create_async()
            .await;

        let config = config(&server.url(), Schedule::new(5, 10), Schedule::new(5, 20), None);
        let pause = RecordingPause::default();

        let outcome = run_with(&config, &pause).await.unwrap();

        assert_eq!(outcome, Outcome::Success);
        assert_eq!(pause.count(), 1);
        spawned.assert_async().await;
        missing.assert_async().await;
        done.assert_async().await;
    }

    #[tokio::test]
    async fn test_api_error_during_spawn() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", PIPELINES)
            .with_status(403)
            .with_body(ERROR_BODY)
            .expect(1)
            .create_async()
            .await;

        let config = config(&server.url(), Schedule::new(5, 10), Schedule::new(5, 20), None);
        let pause = RecordingPause::default();

        let outcome = run_with(&config, &pause).await.unwrap();

        assert_eq!(outcome, Outcome::ApiError);
        assert_eq!(outcome.code(), 4);
        assert_eq!(pause.count(), 0);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_api_error_with_non_string_fields() {
        for body in [r#"{"error": null}"#, r#"{"error": {"code": 403}, "scope": ["api"]}"#] {
            let mut server = mockito::Server::new_async().await;
            let mock = server
                .mock("GET", PIPELINES)
                .with_status(403)
                .with_body(body)
                .expect(1)
                .create_async()
                .await;

            let config = config(&server.url(), Schedule::new(5, 10), Schedule::new(5, 20), None);
            let pause = RecordingPause::default();

            let outcome = run_with(&config, &pause).await.unwrap();

            assert_eq!(outcome, Outcome::ApiError, "body {body}");
            mock.assert_async().await;
        }
    }

    #[tokio::test]
    async fn test_api_error_during_completion() {
        let mut server = mockito::Server::new_async().await;
        let running = server
            .mock("GET", PIPELINES)
            .with_body(pipelines_body("running"))
            .expect(1)
            .create_async()
            .await;
        let error = server
            .mock("GET", PIPELINES)
            .with_body(ERROR_BODY)
            .expect(1)
            .create_async()
            .await;

        let config = config(&server.url(), Schedule::new(5, 10), Schedule::new(5, 20), None);
        let pause = RecordingPause::default();

        let outcome = run_with(&config, &pause).await.unwrap();

        assert_eq!(outcome, Outcome::ApiError);
        running.assert_async().await;
        error.assert_async().await;
    }

    #[tokio::test]
    async fn test_malformed_pipeline_list_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", PIPELINES)
            .with_status(401)
            .with_body(r#"{"message": "401 Unauthorized"}"#)
            .create_async()
            .await;

        let config = config(&server.url(), Schedule::new(5, 10), Schedule::new(5, 20), None);
        let pause = RecordingPause::default();

        let err = run_with(&config, &pause).await.unwrap_err();

        assert!(matches!(err, PipewaitError::MalformedResponse { .. }));
    }

    fn artifact_request(destination: PathBuf) -> ArtifactRequest {
        ArtifactRequest {
            source: "results/perf.json".to_string(),
            destination,
            job_name: "testset".to_string(),
        }
    }

    #[tokio::test]
    async fn test_success_saves_artifact() {
        let mut server = mockito::Server::new_async().await;
        let pipelines = server
            .mock("GET", PIPELINES)
            .with_body(pipelines_body("success"))
            .expect(2)
            .create_async()
            .await;
        let jobs = server
            .mock("GET", "/api/v4/projects/group%2Fproject/pipelines/78/jobs")
            .match_header("PRIVATE-TOKEN", "glpat-test")
            .with_body(r#"[{"id": 300, "name": "build"}, {"id": 301, "name": "testset"}]"#)
            .expect(1)
            .create_async()
            .await;
        let body = r#"{"benchmarks": [{"name": "matmul", "cycles": 340282366920938463463374607431768211456}], "site": "Zürich"}"#;
        let payload: Value = serde_json::from_str(body).unwrap();
        let artifact = server
            .mock("GET", "/api/v4/projects/group%2Fproject/jobs/301/artifacts/results/perf.json")
            .match_header("PRIVATE-TOKEN", "glpat-test")
            .with_body(body)
            .expect(1)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("out").join("ci").join("perf.json");
        let config = config(
            &server.url(),
            Schedule::new(5, 10),
            Schedule::new(5, 20),
            Some(artifact_request(destination.clone())),
        );
        let pause = RecordingPause::default();

        let outcome = run_with(&config, &pause).await.unwrap();

        assert_eq!(outcome, Outcome::Success);
        let written: Value =
            serde_json::from_str(&std::fs::read_to_string(&destination).unwrap()).unwrap();
        assert_eq!(written, payload);
        let text = std::fs::read_to_string(&destination).unwrap();
        assert!(text.contains("\"cycles\": 340282366920938463463374607431768211456"));
        pipelines.assert_async().await;
        jobs.assert_async().await;
        artifact.assert_async().await;
    }

    #[tokio::test]
    async fn test_artifact_job_missing() {
        let mut server = mockito::Server::new_async().await;
        let _pipelines = server
            .mock("GET", PIPELINES)
            .with_body(pipelines_body("success"))
            .create_async()
            .await;
        let _jobs = server
            .mock("GET", "/api/v4/projects/group%2Fproject/pipelines/78/jobs")
            .with_body(r#"[{"id": 300, "name": "build"}]"#)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("perf.json");
        let config = config(
            &server.url(),
            Schedule::new(5, 10),
            Schedule::new(5, 20),
            Some(artifact_request(destination.clone())),
        );
        let pause = RecordingPause::default();

        let err = run_with(&config, &pause).await.unwrap_err();

        assert!(matches!(
            err,
            PipewaitError::JobNotFound { ref name, pipeline_id: 78 } if name == "testset"
        ));
        assert!(!destination.exists());
    }

    #[tokio::test]
    async fn test_api_error_listing_jobs() {
        let mut server = mockito::Server::new_async().await;
        let _pipelines = server
            .mock("GET", PIPELINES)
            .with_body(pipelines_body("success"))
            .create_async()
            .await;
        let jobs = server
            .mock("GET", "/api/v4/projects/group%2Fproject/pipelines/78/jobs")
            .with_status(403)
            .with_body(ERROR_BODY)
            .expect(1)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let config = config(
            &server.url(),
            Schedule::new(5, 10),
            Schedule::new(5, 20),
            Some(artifact_request(dir.path().join("perf.json"))),
        );
        let pause = RecordingPause::default();

        let outcome = run_with(&config, &pause).await.unwrap();

        assert_eq!(outcome, Outcome::ApiError);
        jobs.assert_async().await;
    }

    #[test]
    fn test_outcome_exit_codes() {
        let codes: Vec<u8> = [
            Outcome::Success,
            Outcome::PipelineFailed,
            Outcome::SpawnTimeout,
            Outcome::CompletionTimeout,
            Outcome::ApiError,
        ]
        .into_iter()
        .map(Outcome::code)
        .collect();

        assert_eq!(codes, vec![0, 1, 2, 3, 4]);
    }
}
