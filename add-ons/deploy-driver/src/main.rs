//! deploy-driver: trigger a Pulumi Cloud deployment for one stack.
//!
//! Reads `PULUMI_ORG` (required), `PULUMI_PROJECT`, `PULUMI_STACK`,
//! `PULUMI_ACCESS_TOKEN` and `PULUMI_API_URL` from the environment (a
//! `.env` file is honoured), optionally layered over `config/driver.toml`.
//! Flags override both.
//!
//! Exit codes: 0 on success, 1 when the request fails or a followed
//! deployment ends `failed`, 2 when configuration or payload is invalid
//! (nothing was sent).

use clap::Parser;
use deploy_core::{
    read_payload_file, DeployError, DeployResult, DeploymentPayload, DeploymentRequester,
    DeploymentResult, DeploymentStatus, DriverConfig, Operation, Overrides, ResolvedConfig,
    SilentSink, StatusSink, StdoutSink, DEFAULT_BRANCH, DEFAULT_REPO_DIR, DEFAULT_REPO_URL,
    EXIT_REQUEST,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "deploy-driver")]
#[command(version, about = "Create a Pulumi Cloud deployment, creating the stack first if it is missing")]
struct Cli {
    /// Pulumi organization (overrides PULUMI_ORG)
    #[arg(long)]
    org: Option<String>,

    /// Project name (overrides PULUMI_PROJECT)
    #[arg(long)]
    project: Option<String>,

    /// Stack name (overrides PULUMI_STACK)
    #[arg(long)]
    stack: Option<String>,

    /// Deployments API base URL, e.g. https://api.pulumi.com/api (overrides PULUMI_API_URL)
    #[arg(long)]
    api_url: Option<String>,

    /// Operation to run: update, preview, destroy or refresh
    #[arg(long, default_value_t = Operation::Destroy, conflicts_with = "payload")]
    operation: Operation,

    /// Git repository holding the Pulumi program
    #[arg(long, default_value = DEFAULT_REPO_URL, conflicts_with = "payload")]
    repo_url: String,

    /// Git ref to deploy
    #[arg(long, default_value = DEFAULT_BRANCH, conflicts_with = "payload")]
    branch: String,

    /// Directory of the program inside the repository
    #[arg(long, default_value = DEFAULT_REPO_DIR, conflicts_with = "payload")]
    repo_dir: String,

    /// Send this JSON file as the deployment body instead of building one
    #[arg(long, value_name = "FILE")]
    payload: Option<PathBuf>,

    /// Poll the created deployment until it finishes; exit 1 if it fails
    #[arg(long)]
    wait: bool,

    /// Print the result as JSON on stdout instead of status lines
    #[arg(long)]
    json: bool,
}

/// Final outcome of one invocation, printed by `--json`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Report {
    #[serde(flatten)]
    result: DeploymentResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    final_status: Option<DeploymentStatus>,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            org: self.org.clone(),
            project: self.project.clone(),
            stack: self.stack.clone(),
            api_url: self.api_url.clone(),
        }
    }

    fn payload(&self) -> DeployResult<serde_json::Value> {
        match &self.payload {
            Some(path) => read_payload_file(path),
            None => DeploymentPayload::git(&self.repo_url, &self.branch, self.operation)
                .with_repo_dir(&self.repo_dir)
                .to_value(),
        }
    }

    fn sink(&self) -> Arc<dyn StatusSink> {
        if self.json {
            Arc::new(SilentSink)
        } else {
            Arc::new(StdoutSink)
        }
    }
}

/// Validate everything locally, then hand the resolved config to `connect`.
async fn run<F>(cli: &Cli, config: DriverConfig, connect: F) -> DeployResult<Report>
where
    F: FnOnce(&ResolvedConfig) -> DeployResult<DeploymentRequester>,
{
    let config = config.apply(cli.overrides()).resolve()?;
    let payload = cli.payload()?;
    tracing::debug!(stack = %config.target, api_url = %config.api_url, "Configuration resolved");

    let requester = connect(&config)?.with_sink(cli.sink());
    let result = requester.create_deployment(&config.target, &payload).await?;

    let final_status = if cli.wait {
        let id = result
            .deployment_id
            .as_deref()
            .ok_or_else(|| DeployError::Decode {
                endpoint: config.target.deployments_path(),
                message: "response carried no deployment id to follow".to_string(),
            })?;
        Some(requester.follow_deployment(&config.target, id).await?)
    } else {
        None
    };

    Ok(Report {
        result,
        final_status,
    })
}

fn report_failure(err: &DeployError) -> i32 {
    eprintln!("Error: {}", err);
    err.exit_code()
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let dotenv = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = dotenv {
        tracing::debug!(".env not loaded: {} (using process environment)", e);
    }

    let cli = Cli::parse();

    let outcome = match DriverConfig::load() {
        Ok(config) => run(&cli, config, DeploymentRequester::from_config).await,
        Err(e) => Err(e.into()),
    };

    match outcome {
        Ok(report) => {
            if cli.json {
                match serde_json::to_string_pretty(&report) {
                    Ok(out) => println!("{}", out),
                    Err(e) => {
                        eprintln!("Error: {}", e);
                        std::process::exit(EXIT_REQUEST);
                    }
                }
            }
        }
        Err(e) => std::process::exit(report_failure(&e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deploy_core::{DeploymentTransport, RawResponse, TransportError, EXIT_CONFIG};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Answers every POST with a created deployment and every GET with `final_status`.
    struct CountingApi {
        posts: AtomicUsize,
        gets: AtomicUsize,
        final_status: &'static str,
    }

    impl CountingApi {
        fn new(final_status: &'static str) -> Arc<Self> {
            Arc::new(Self {
                posts: AtomicUsize::new(0),
                gets: AtomicUsize::new(0),
                final_status,
            })
        }

        fn requests(&self) -> usize {
            self.posts.load(Ordering::SeqCst) + self.gets.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl DeploymentTransport for CountingApi {
        async fn post_json(&self, _path: &str, _body: &[u8]) -> Result<RawResponse, TransportError> {
            self.posts.fetch_add(1, Ordering::SeqCst);
            let body = serde_json::json!({ "id": "dep-1", "consoleUrl": "https://app/dep-1" });
            Ok(RawResponse::new(202, body.to_string()))
        }

        async fn get_json(&self, _path: &str) -> Result<RawResponse, TransportError> {
            self.gets.fetch_add(1, Ordering::SeqCst);
            let body = serde_json::json!({ "status": self.final_status });
            Ok(RawResponse::new(200, body.to_string()))
        }
    }

    fn config(pairs: &[(&str, &str)]) -> DriverConfig {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        DriverConfig::load_from(None, Some(env)).unwrap()
    }

    async fn run_against(
        cli: &Cli,
        config: DriverConfig,
        api: &Arc<CountingApi>,
        connects: &AtomicUsize,
    ) -> DeployResult<Report> {
        run(cli, config, |_| {
            connects.fetch_add(1, Ordering::SeqCst);
            Ok(DeploymentRequester::new(api.clone()).with_poll_interval(Duration::ZERO))
        })
        .await
    }

    #[test]
    fn test_cli_defaults_build_the_example_payload() {
        let cli = Cli::try_parse_from(["deploy-driver"]).unwrap();
        assert_eq!(cli.operation, Operation::Destroy);
        assert!(!cli.json);
        assert_eq!(
            cli.payload().unwrap(),
            DeploymentPayload::default().to_value().unwrap()
        );
    }

    #[test]
    fn test_cli_target_flags_become_overrides() {
        let cli = Cli::try_parse_from([
            "deploy-driver",
            "--org", "acme",
            "--project", "website",
            "--stack", "prod",
            "--api-url", "http://localhost:8080/api",
        ])
        .unwrap();
        let overrides = cli.overrides();
        assert_eq!(overrides.org.as_deref(), Some("acme"));
        assert_eq!(overrides.project.as_deref(), Some("website"));
        assert_eq!(overrides.stack.as_deref(), Some("prod"));
        assert_eq!(overrides.api_url.as_deref(), Some("http://localhost:8080/api"));
    }

    #[test]
    fn test_cli_builder_flags_shape_payload() {
        let cli = Cli::try_parse_from([
            "deploy-driver",
            "--operation", "update",
            "--repo-url", "https://github.com/pulumi/deploy-demos.git",
            "--branch", "refs/heads/main",
            "--repo-dir", "pulumi-programs/simple-resource",
        ])
        .unwrap();
        let payload = cli.payload().unwrap();
        assert_eq!(payload["operationContext"]["operation"], "update");
        assert_eq!(
            payload["sourceContext"]["git"]["repoURL"],
            "https://github.com/pulumi/deploy-demos.git"
        );
        assert_eq!(payload["sourceContext"]["git"]["repoDir"], "pulumi-programs/simple-resource");
    }

    #[test]
    fn test_cli_rejects_unknown_operation() {
        assert!(Cli::try_parse_from(["deploy-driver", "--operation", "apply"]).is_err());
    }

    #[test]
    fn test_cli_payload_file_conflicts_with_builder_flags() {
        assert!(Cli::try_parse_from([
            "deploy-driver",
            "--payload", "body.json",
            "--operation", "update",
        ])
        .is_err());
    }

    #[test]
    fn test_cli_payload_file_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("body.json");
        std::fs::write(&file, r#"{"operationContext":{"operation":"preview"}}"#).unwrap();

        let cli = Cli::try_parse_from(["deploy-driver", "--json", "--payload", file.to_str().unwrap()]).unwrap();
        assert!(cli.json);
        assert_eq!(cli.payload().unwrap()["operationContext"]["operation"], "preview");
    }

    #[tokio::test]
    async fn test_missing_org_exits_before_any_request() {
        let cli = Cli::try_parse_from(["deploy-driver", "--json"]).unwrap();
        let api = CountingApi::new("succeeded");
        let connects = AtomicUsize::new(0);

        let err = run_against(
            &cli,
            config(&[
                ("PULUMI_ACCESS_TOKEN", "pul-123"),
                ("PULUMI_API_URL", "http://127.0.0.1:9/api"),
            ]),
            &api,
            &connects,
        )
        .await
        .unwrap_err();

        assert_eq!(report_failure(&err), EXIT_CONFIG);
        assert_eq!(connects.load(Ordering::SeqCst), 0);
        assert_eq!(api.requests(), 0);
    }

    #[tokio::test]
    async fn test_unreadable_payload_exits_before_any_request() {
        let cli = Cli::try_parse_from(["deploy-driver", "--payload", "/nonexistent/body.json"]).unwrap();
        let api = CountingApi::new("succeeded");
        let connects = AtomicUsize::new(0);

        let err = run_against(
            &cli,
            config(&[("PULUMI_ORG", "acme"), ("PULUMI_ACCESS_TOKEN", "pul-123")]),
            &api,
            &connects,
        )
        .await
        .unwrap_err();

        assert_eq!(err.exit_code(), EXIT_CONFIG);
        assert_eq!(connects.load(Ordering::SeqCst), 0);
        assert_eq!(api.requests(), 0);
    }

    #[tokio::test]
    async fn test_without_wait_only_creates_the_deployment() {
        let cli = Cli::try_parse_from(["deploy-driver", "--json"]).unwrap();
        let api = CountingApi::new("succeeded");
        let connects = AtomicUsize::new(0);

        let report = run_against(
            &cli,
            config(&[("PULUMI_ORG", "acme"), ("PULUMI_ACCESS_TOKEN", "pul-123")]),
            &api,
            &connects,
        )
        .await
        .unwrap();

        assert_eq!(report.final_status, None);
        assert_eq!(api.posts.load(Ordering::SeqCst), 1);
        assert_eq!(api.gets.load(Ordering::SeqCst), 0);
        assert_eq!(
            serde_json::to_value(&report).unwrap(),
            serde_json::json!({ "statusCode": 202, "deploymentId": "dep-1", "consoleUrl": "https://app/dep-1" })
        );
    }

    #[tokio::test]
    async fn test_wait_reports_final_status() {
        let cli = Cli::try_parse_from(["deploy-driver", "--wait", "--json"]).unwrap();
        let api = CountingApi::new("succeeded");
        let connects = AtomicUsize::new(0);

        let report = run_against(
            &cli,
            config(&[("PULUMI_ORG", "acme"), ("PULUMI_ACCESS_TOKEN", "pul-123")]),
            &api,
            &connects,
        )
        .await
        .unwrap();

        assert_eq!(connects.load(Ordering::SeqCst), 1);
        assert_eq!(api.gets.load(Ordering::SeqCst), 1);
        assert_eq!(
            serde_json::to_value(&report).unwrap()["finalStatus"],
            "succeeded"
        );
    }

    #[tokio::test]
    async fn test_wait_on_failed_deployment_exits_non_zero() {
        let cli = Cli::try_parse_from(["deploy-driver", "--wait"]).unwrap();
        let api = CountingApi::new("failed");
        let connects = AtomicUsize::new(0);

        let err = run_against(
            &cli,
            config(&[("PULUMI_ORG", "acme"), ("PULUMI_ACCESS_TOKEN", "pul-123")]),
            &api,
            &connects,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, DeployError::DeploymentFailed { .. }));
        assert_eq!(report_failure(&err), EXIT_REQUEST);
    }

    #[test]
    fn test_failures_map_to_exit_codes() {
        assert_eq!(report_failure(&DeployError::config("missing `PULUMI_ORG`")), EXIT_CONFIG);
        let http = DeployError::Http {
            endpoint: "preview/acme/web/dev/deployments".to_string(),
            status: 500,
            reason: "Internal Server Error".to_string(),
        };
        assert_eq!(report_failure(&http), EXIT_REQUEST);
    }
}
