#![allow(clippy::result_large_err)]

use std::io::IsTerminal;

use clap::Parser;
use miette::Diagnostic;
use miette::Result;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

use crate::asserter::AssertedTest;
use crate::asserter::Asserter;
use crate::cli::Cli;
use crate::outputter::OutPutter;
use crate::outputter::Summary;
use crate::parser::ApiProof;
use crate::report::allure::AllureWriter;
use crate::report::allure::ReportError;
use crate::runner::RunnerError;
use crate::runner::RunnerResult;
use crate::runner::run_tests;
use crate::schema::SchemaLoader;
use crate::validator::IR;
use crate::validator::ValidationError;
use crate::validator::Validator;

mod asserter;
mod cli;
mod dispatcher;
mod outputter;
mod parser;
mod registry;
mod report;
mod runner;
mod schema;
mod validator;

#[cfg(test)]
mod test_support;

#[derive(Error, Debug, Diagnostic)]
pub enum ApiProofError {
    #[error("Failed to read toml file")]
    FileError(#[from] std::io::Error),

    #[error("Failed to parse toml file")]
    TomlParsing(#[from] toml::de::Error),

    #[error(transparent)]
    #[diagnostic(transparent)]
    ValidationError(#[from] ValidationError),

    #[error("Failed to prepare the results directory: {0}")]
    Report(#[from] ReportError),

    #[error("Test pipeline failed: {0}")]
    Pipeline(String),

    #[error("{failed} of {total} tests failed")]
    #[diagnostic(help("Rerun with RUST_LOG=debug to see every request"))]
    TestsFailed { failed: usize, total: usize },
}

/// Reads the scenario file, validates it and applies the name filter.
///
/// # Errors
/// Returns an `ApiProofError` if the file cannot be read, the TOML fails to
/// parse, or the validation fails.
fn load_and_validate_config(cli: &Cli) -> Result<(IR, usize), ApiProofError> {
    let contents = std::fs::read_to_string(&cli.path).map_err(ApiProofError::FileError)?;
    let api_proof: ApiProof = toml::from_str(&contents).map_err(ApiProofError::TomlParsing)?;

    let validator = Validator::new(&api_proof, contents.as_str(), cli.path.as_str());
    let mut ir = validator
        .validate()
        .map_err(ApiProofError::ValidationError)?;

    if let Some(filter) = &cli.filter {
        ir.tests.retain(|test| test.name.contains(filter.as_str()));
    }
    let n_tests = ir.tests.len();

    Ok((ir, n_tests))
}

/// Spawns the runner, asserter and outputter, connected by flume channels.
///
/// The runner sends requests strictly one after another. The stages share a
/// single thread and only talk through the channels.
fn run_pipeline_tasks(
    ir: IR,
    n_tests: usize,
    loader: SchemaLoader,
    writer: Option<AllureWriter>,
    cli: &Cli,
) -> (
    JoinHandle<Result<(), RunnerError>>,
    JoinHandle<Result<(), ()>>,
    JoinHandle<Summary>,
) {
    let (runner_tx, asserter_rx) = flume::unbounded::<RunnerResult>();
    let (asserter_tx, outputter_rx) = flume::unbounded::<AssertedTest>();

    // Outputter Task
    let outputter_path = cli.path.clone();
    let outputter_handle = tokio::spawn(async move {
        OutPutter::start(outputter_rx, &outputter_path, n_tests, writer).await
    });

    // TestRunner Task
    let system_proxy = !cli.no_proxy;
    let runner_jh =
        tokio::spawn(async move { run_tests(ir, loader, runner_tx, system_proxy).await });

    // Asserter Task
    let asserter_jh = tokio::spawn(async move { Asserter::run(asserter_rx, asserter_tx).await });

    (runner_jh, asserter_jh, outputter_handle)
}

async fn run(cli: &Cli) -> Result<Summary, ApiProofError> {
    let (ir, n_tests) = load_and_validate_config(cli)?;

    let loader = cli
        .schema_dir
        .clone()
        .map(SchemaLoader::new)
        .unwrap_or_default();

    let writer = cli
        .results_dir
        .as_ref()
        .map(AllureWriter::new)
        .transpose()?;

    let (runner_jh, asserter_jh, outputter_handle) =
        run_pipeline_tasks(ir, n_tests, loader, writer, cli);

    let (runner, asserter, summary) = futures::join!(runner_jh, asserter_jh, outputter_handle);

    runner
        .map_err(|e| ApiProofError::Pipeline(e.to_string()))?
        .map_err(|e| ApiProofError::Pipeline(e.to_string()))?;
    asserter
        .map_err(|e| ApiProofError::Pipeline(e.to_string()))?
        .map_err(|_| ApiProofError::Pipeline("outputter stopped early".into()))?;

    summary.map_err(|e| ApiProofError::Pipeline(e.to_string()))
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_ansi(std::io::stderr().is_terminal())
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let summary = run(&cli).await?;

    if summary.failed > 0 {
        return Err(ApiProofError::TestsFailed {
            failed: summary.failed,
            total: summary.total,
        }
        .into());
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use std::fs;

    use crate::ApiProofError;
    use crate::cli::Cli;
    use crate::run;
    use crate::test_support::spawn_server;

    fn cli_for(path: &str, extra: &[&str]) -> Cli {
        use clap::Parser;

        let mut args = vec!["api_proof", "--no-proxy", "-p", path];
        args.extend_from_slice(extra);
        Cli::parse_from(args)
    }

    #[tokio::test]
    async fn runs_a_suite_against_the_local_server() {
        let base_url = spawn_server().await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("suite.toml");
        fs::write(
            &path,
            format!(
                r#"
                [projects.reqres]
                base_url = "{base_url}"

                [[tests]]
                name = "Create user"
                project = "reqres"
                method = "post"
                url = "/users"
                form = {{ name = "Elena", job = "QA Automation Engineer" }}
                schema = "post_create_user_schema_response.json"
                assert_status = 201
                assert_fields = {{ name = "Elena", job = "QA Automation Engineer" }}

                [[tests]]
                name = "Delete user"
                project = "reqres"
                method = "delete"
                url = "/users/2"
                assert_status = 204

                [[tests]]
                name = "Users per page"
                project = "reqres"
                method = "get"
                url = "/users"
                query = {{ per_page = 5 }}
                schema = "get_list_users_schema_response.json"
                assert_status = 200
                assert_fields = {{ per_page = 5 }}
                assert_len = {{ "/data" = 5 }}

                [[tests]]
                name = "Register without password"
                project = "reqres"
                method = "post"
                url = "/register"
                form = {{ email = "sydney@fife" }}
                assert_fields = {{ error = "Missing password" }}

                [[tests]]
                name = "Register with wrong expectation"
                project = "reqres"
                method = "post"
                url = "/register"
                form = {{ email = "sydney@fife" }}
                assert_status = 200
                "#
            ),
        )
        .unwrap();

        let results = dir.path().join("allure-results");
        let cli = cli_for(
            path.to_str().unwrap(),
            &["-r", results.to_str().unwrap()],
        );

        let summary = run(&cli).await.unwrap();

        assert_eq!(summary.total, 5);
        assert_eq!(summary.failed, 1);
        let result_files = fs::read_dir(&results)
            .unwrap()
            .filter(|e| {
                e.as_ref()
                    .unwrap()
                    .file_name()
                    .to_string_lossy()
                    .ends_with("-result.json")
            })
            .count();
        assert_eq!(result_files, 5);
    }

    #[tokio::test]
    async fn filter_selects_tests_by_name() {
        let base_url = spawn_server().await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("suite.toml");
        fs::write(
            &path,
            format!(
                r#"
                [projects.reqres]
                base_url = "{base_url}"

                [[tests]]
                name = "Delete user"
                project = "reqres"
                method = "delete"
                url = "/users/2"
                assert_status = 204

                [[tests]]
                name = "Broken on purpose"
                project = "reqres"
                method = "delete"
                url = "/users/2"
                assert_status = 200
                "#
            ),
        )
        .unwrap();

        let cli = cli_for(path.to_str().unwrap(), &["-f", "Delete"]);
        let summary = run(&cli).await.unwrap();

        assert_eq!(summary.total, 1);
        assert_eq!(summary.failed, 0);
    }

    #[tokio::test]
    async fn missing_file_is_reported() {
        let cli = cli_for("does/not/exist.toml", &[]);

        assert!(matches!(
            run(&cli).await.unwrap_err(),
            ApiProofError::FileError(_)
        ));
    }

    #[cfg(feature = "live")]
    #[tokio::test]
    async fn shipped_suite_passes_against_live_services() {
        let cli = {
            use clap::Parser;
            Cli::parse_from([
                "api_proof",
                "-p",
                concat!(env!("CARGO_MANIFEST_DIR"), "/api_proof.toml"),
            ])
        };

        let summary = run(&cli).await.unwrap();

        assert_eq!(summary.total, 14);
        assert_eq!(summary.failed, 0);
    }
}
