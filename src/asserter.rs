use core::fmt;
use std::fmt::Display;
use std::sync::Arc;

use flume::Receiver;
use flume::Sender;
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use serde_json::Value;

use crate::report::Status;
use crate::report::Step;
use crate::report::TestReport;
use crate::report::now_millis;
use crate::runner::RunnerResult;
use crate::schema;
use crate::schema::SchemaError;
use crate::schema::Violation;
use crate::validator::Assertion;

pub struct Asserter {}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum TestResult {
    Pass,
    Fail,
}

#[derive(Debug, Clone)]
pub struct AssertResult {
    pub status: TestResult,
    pub expected: Assertion,
    pub actual: Actual,
}

#[derive(Debug, Clone)]
pub enum Actual {
    Header(HeaderMap),
    Status(reqwest::StatusCode),
    Field(Option<Value>),
    Length(Option<usize>),
    Schema(Vec<Violation>),
    RequestFailed(String),
}

/// A test after assertion, on its way to the outputter.
#[derive(Debug)]
pub struct AssertedTest {
    pub name: String,
    pub project: String,
    pub method: String,
    pub path: String,
    pub results: Arc<[AssertResult]>,
    pub report: TestReport,
}

impl Display for AssertResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.status, &self.expected, &self.actual) {
            (TestResult::Pass, _, actual) => {
                write!(
                    f,
                    "{} {} {}",
                    console::style("✔").green().bold(),
                    console::style("PASS!").green().bold(),
                    actual
                )
            }

            (TestResult::Fail, Assertion::Status(exp), Actual::Status(act)) => {
                write!(
                    f,
                    "{} {}\n  Expected: {}\n  Actual:   {}",
                    console::style("✘").red().bold(),
                    console::style("FAIL!").red().bold(),
                    console::style(format!("Expected status {}", exp)).green(),
                    console::style(format!("Got status {}", act)).red(),
                )
            }

            (
                TestResult::Fail,
                Assertion::Headers(expected_headers),
                Actual::Header(actual_headers),
            ) => {
                writeln!(
                    f,
                    "{} {}",
                    console::style("✖").red().bold(),
                    console::style("FAIL!").red().bold(),
                )?;
                writeln!(f, "  {}", console::style("Expected headers:").green())?;
                print_headers(f, expected_headers)?;
                writeln!(f, "  {}", console::style("Actual headers:").red())?;
                print_headers(f, actual_headers)
            }

            (TestResult::Fail, Assertion::Field { pointer, expected }, Actual::Field(got)) => {
                writeln!(
                    f,
                    "{} {}",
                    console::style("✘").red().bold(),
                    console::style("FAIL!").red().bold(),
                )?;
                writeln!(f, "  {} {}", console::style("Field:").yellow().bold(), pointer)?;
                writeln!(
                    f,
                    "  {}",
                    console::style(format!("Expected: {expected}")).green()
                )?;
                match got {
                    Some(got) => {
                        writeln!(f, "  {}", console::style(format!("Actual:   {got}")).red())
                    }
                    None => writeln!(
                        f,
                        "  {} {}",
                        console::style("Actual:").red(),
                        console::style("<missing>").red().bold()
                    ),
                }
            }

            (TestResult::Fail, Assertion::Length { pointer, expected }, Actual::Length(got)) => {
                writeln!(
                    f,
                    "{} {}",
                    console::style("✘").red().bold(),
                    console::style("FAIL!").red().bold(),
                )?;
                writeln!(f, "  {} {}", console::style("Array:").yellow().bold(), pointer)?;
                writeln!(
                    f,
                    "  {}",
                    console::style(format!("Expected length {expected}")).green()
                )?;
                match got {
                    Some(got) => {
                        writeln!(f, "  {}", console::style(format!("Got length {got}")).red())
                    }
                    None => writeln!(
                        f,
                        "  {} {}",
                        console::style("Got:").red(),
                        console::style("<not an array>").red().bold()
                    ),
                }
            }

            (TestResult::Fail, Assertion::Schema { file, .. }, Actual::Schema(violations)) => {
                writeln!(
                    f,
                    "{} {}",
                    console::style("✘").red().bold(),
                    console::style("FAIL!").red().bold(),
                )?;
                writeln!(
                    f,
                    "  {} {}",
                    console::style("Schema:").yellow().bold(),
                    console::style(file).dim()
                )?;
                for violation in violations {
                    writeln!(
                        f,
                        "    {} {}",
                        console::style(&violation.path).red().bold(),
                        console::style(&violation.message).red()
                    )?;
                }
                Ok(())
            }

            (TestResult::Fail, _, Actual::RequestFailed(err)) => {
                writeln!(
                    f,
                    "{} {}",
                    console::style("✘").red().bold(),
                    console::style("FAIL!").red().bold(),
                )?;
                writeln!(
                    f,
                    "  {} {}",
                    console::style("Request failed with error:").red(),
                    console::style(err).red().bold()
                )
            }

            _ => {
                writeln!(
                    f,
                    "{} {} (unhandled combination)",
                    console::style("⚠").yellow(),
                    console::style("UNKNOWN RESULT").yellow().bold()
                )
            }
        }
    }
}

fn print_headers(f: &mut fmt::Formatter<'_>, headers: &HeaderMap) -> fmt::Result {
    for (k, v) in headers.iter() {
        let value = v.to_str().unwrap_or("<invalid utf8>");
        writeln!(
            f,
            "    {}: {}",
            console::style(k.as_str()).yellow().bold(),
            console::style(value)
        )?;
    }
    Ok(())
}

impl Display for Assertion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Assertion::Status(status) => write!(f, "Status is {status}"),
            Assertion::Headers(_) => write!(f, "Header test"),
            Assertion::Field { pointer, expected } => write!(f, "{pointer} equals {expected}"),
            Assertion::Length { pointer, expected } => {
                write!(f, "{pointer} has {expected} items")
            }
            Assertion::Schema { file, .. } => write!(f, "Matches schema {file}"),
            Assertion::RequestFailed => write!(f, "Request failed"),
        }
    }
}

impl Display for Actual {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Actual::Header(header_map) => {
                let headers: Vec<String> = header_map
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k, v.to_str().unwrap_or("<invalid utf8>")))
                    .collect();
                write!(f, "Got headers {{{}}}", headers.join(", "))
            }
            Actual::Status(status_code) => write!(f, "Got status {}", status_code),
            Actual::Field(Some(value)) => write!(f, "Got {value}"),
            Actual::Field(None) => write!(f, "Got nothing"),
            Actual::Length(Some(len)) => write!(f, "Got {len} items"),
            Actual::Length(None) => write!(f, "Got no array"),
            Actual::Schema(violations) if violations.is_empty() => {
                write!(f, "Body matches schema")
            }
            Actual::Schema(violations) => write!(f, "Got {} violations", violations.len()),
            Actual::RequestFailed(_) => write!(f, "Request failed"),
        }
    }
}

pub trait Assert {
    fn assert(&self) -> Arc<[AssertResult]>;
}

impl Assert for RunnerResult {
    fn assert(&self) -> Arc<[AssertResult]> {
        let Some(response) = &self.response else {
            return Arc::from([AssertResult {
                status: TestResult::Fail,
                expected: Assertion::RequestFailed,
                actual: Actual::RequestFailed(self.error.clone().unwrap_or_default()),
            }]);
        };

        let body = response.json();

        Arc::from(
            self.assertions
                .iter()
                .map(|a| {
                    let (status, actual) = match a {
                        Assertion::Status(expected_status) => (
                            assert_status(expected_status, response.status),
                            Actual::Status(response.status),
                        ),
                        Assertion::Headers(expected_headermap) => (
                            assert_header(expected_headermap, &response.headers),
                            Actual::Header(response.headers.clone()),
                        ),
                        Assertion::Field { pointer, expected } => {
                            let got = body.and_then(|b| b.pointer(pointer)).cloned();
                            (assert_field(expected, got.as_ref()), Actual::Field(got))
                        }
                        Assertion::Length { pointer, expected } => {
                            let got = body
                                .and_then(|b| b.pointer(pointer))
                                .and_then(Value::as_array)
                                .map(Vec::len);
                            (assert_length(*expected, got), Actual::Length(got))
                        }
                        Assertion::Schema { document, .. } => {
                            let violations = schema_violations(document.as_ref(), body);
                            let status = if violations.is_empty() {
                                TestResult::Pass
                            } else {
                                TestResult::Fail
                            };
                            (status, Actual::Schema(violations))
                        }
                        Assertion::RequestFailed => (
                            TestResult::Fail,
                            Actual::RequestFailed(self.error.clone().unwrap_or_default()),
                        ),
                    };

                    AssertResult {
                        status,
                        expected: a.clone(),
                        actual,
                    }
                })
                .collect::<Vec<AssertResult>>(),
        )
    }
}

impl Asserter {
    pub async fn run(
        rx: Receiver<RunnerResult>,
        output_tx: Sender<AssertedTest>,
    ) -> Result<(), ()> {
        while let Ok(msg) = rx.recv_async().await {
            let results = msg.assert();

            let mut report = msg.report;
            record_steps(&mut report, &results);

            let asserted = AssertedTest {
                name: msg.name,
                project: msg.project,
                method: msg.method,
                path: msg.path,
                results,
                report,
            };

            if output_tx.send_async(asserted).await.is_err() {
                return Err(());
            }
        }

        Ok(())
    }
}

/// Adds one finished step per assertion to the test report.
fn record_steps(report: &mut TestReport, results: &[AssertResult]) {
    for result in results {
        let now = now_millis();
        report.push_step(Step {
            name: result.expected.to_string(),
            status: match result.status {
                TestResult::Pass => Status::Passed,
                TestResult::Fail => Status::Failed,
            },
            start: now,
            stop: now,
            attachments: vec![],
            steps: vec![],
        });
    }
}

fn schema_violations(document: Option<&Value>, body: Option<&Value>) -> Vec<Violation> {
    let Some(document) = document else {
        return vec![Violation {
            path: "/".into(),
            message: "schema was never loaded".into(),
        }];
    };

    let Some(body) = body else {
        return vec![Violation {
            path: "/".into(),
            message: "response body is empty".into(),
        }];
    };

    match schema::validate(document, body) {
        Ok(()) => vec![],
        Err(SchemaError::Invalid(violations)) => violations,
        Err(other) => vec![Violation {
            path: "/".into(),
            message: other.to_string(),
        }],
    }
}

fn assert_field(expected: &Value, got: Option<&Value>) -> TestResult {
    if got == Some(expected) {
        TestResult::Pass
    } else {
        TestResult::Fail
    }
}

fn assert_length(expected: usize, got: Option<usize>) -> TestResult {
    if got == Some(expected) {
        TestResult::Pass
    } else {
        TestResult::Fail
    }
}

fn assert_header(expected: &HeaderMap, actual: &HeaderMap) -> TestResult {
    for (key, value_a) in expected {
        let Some(value_b) = actual.get(key) else {
            return TestResult::Fail;
        };
        if value_a.as_bytes() != value_b.as_bytes() {
            return TestResult::Fail;
        }
    }

    TestResult::Pass
}

fn assert_status(s: &i32, status: reqwest::StatusCode) -> TestResult {
    let Ok(expected) = u16::try_from(*s) else {
        return TestResult::Fail;
    };
    let inncomming_status_code = match StatusCode::from_u16(expected) {
        Ok(status) => status,
        Err(_) => return TestResult::Fail,
    };

    if inncomming_status_code != status {
        return TestResult::Fail;
    }

    TestResult::Pass
}
