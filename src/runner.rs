use flume::SendError;
use flume::Sender;
use thiserror::Error;
use tracing::debug;
use tracing::warn;

use crate::dispatcher::CapturedResponse;
use crate::dispatcher::Dispatcher;
use crate::report::Status;
use crate::report::TestReport;
use crate::schema::SchemaError;
use crate::schema::SchemaLoader;
use crate::validator::Assertion;
use crate::validator::IR;
use crate::validator::ValidatedTest;

#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("channel error")]
    ChannelError(#[from] Box<SendError<RunnerResult>>),
}

#[derive(Debug)]
pub struct RunnerResult {
    pub name: String,
    pub project: String,
    pub method: String,
    pub path: String,
    pub response: Option<CapturedResponse>,
    pub error: Option<String>,
    pub assertions: Vec<Assertion>,
    pub report: TestReport,
}

/// Runs every test one after another and hands each result to the asserter.
pub async fn run_tests(
    ir: IR,
    loader: SchemaLoader,
    tx: Sender<RunnerResult>,
    system_proxy: bool,
) -> Result<(), RunnerError> {
    let mut dispatcher = Dispatcher::new(&ir.registry);
    if !system_proxy {
        dispatcher = dispatcher.without_proxy();
    }

    for test in ir.tests {
        let result = run_test(&dispatcher, &loader, test).await;

        tx.send_async(result)
            .await
            .map_err(|e| RunnerError::ChannelError(Box::new(e)))?;
    }

    Ok(())
}

pub async fn run_test(
    dispatcher: &Dispatcher<'_>,
    loader: &SchemaLoader,
    mut test: ValidatedTest,
) -> RunnerResult {
    let mut report = TestReport::new(&test.name);
    let mut request = test.request.clone();

    let outcome = match load_schemas(loader, &mut test, &mut report) {
        Ok(Some(document)) if test.send_schema => {
            request.options.json = Some(document);
            dispatcher.dispatch(&request, &mut report).await
        }
        Ok(_) => dispatcher.dispatch(&request, &mut report).await,
        Err(error) => {
            return RunnerResult {
                name: test.name,
                project: request.project,
                method: request.method.to_string(),
                path: request.path,
                response: None,
                error: Some(error.to_string()),
                assertions: test.assertions,
                report,
            };
        }
    };

    let (response, error) = match outcome {
        Ok(response) => {
            debug!(test = %test.name, body = %response.text(), "response body");
            (Some(response), None)
        }
        Err(error) => {
            warn!(test = %test.name, %error, "request failed");
            (None, Some(error.to_string()))
        }
    };

    RunnerResult {
        name: test.name,
        project: request.project,
        method: request.method.to_string(),
        path: request.path,
        response,
        error,
        assertions: test.assertions,
        report,
    }
}

/// Loads every schema the test asserts against, fresh from disk, and returns
/// the last one loaded.
fn load_schemas(
    loader: &SchemaLoader,
    test: &mut ValidatedTest,
    report: &mut TestReport,
) -> Result<Option<serde_json::Value>, SchemaError> {
    let mut loaded = None;

    for assertion in test.assertions.iter_mut() {
        if let Assertion::Schema { file, document } = assertion {
            debug!(dir = %loader.dir().display(), %file, "loading schema");
            report.start_step(format!("Load schema {file}"));
            match loader.load(file) {
                Ok(schema) => {
                    report.finish_step(Status::Passed);
                    *document = Some(schema.clone());
                    loaded = Some(schema);
                }
                Err(error) => {
                    report.finish_step(Status::Broken);
                    return Err(error);
                }
            }
        }
    }

    Ok(loaded)
}
