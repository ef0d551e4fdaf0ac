use console::Style;
use flume::Receiver;
use tracing::warn;

use crate::asserter::Actual;
use crate::asserter::AssertResult;
use crate::asserter::AssertedTest;
use crate::asserter::TestResult;
use crate::dispatcher::CURL_ATTACHMENT;
use crate::report::Status;
use crate::report::allure::AllureWriter;

pub struct OutPutter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Summary {
    pub total: usize,
    pub failed: usize,
}

struct FailedTest {
    name: String,
    result: AssertResult,
    curl: Option<String>,
}

impl OutPutter {
    /// Prints every result as it arrives, then a summary of the failures.
    ///
    /// Each report is sealed with the test's verdict and, when a writer is
    /// given, exported. Export problems are logged and never change a verdict.
    pub async fn start(
        rx: Receiver<AssertedTest>,
        test_path: &str,
        n_tests: usize,
        writer: Option<AllureWriter>,
    ) -> Summary {
        let style = Style::new().bold().cyan();
        let open_text =
            &format!("Running test file: {test_path} Found {n_tests} tests: Running...");
        let open_text = style.apply_to(open_text);

        println!("{open_text}");
        let mut summary = Summary::default();
        let mut failed_tests: Vec<FailedTest> = vec![];

        while let Ok(AssertedTest {
            name,
            project,
            method,
            path,
            results,
            mut report,
        }) = rx.recv_async().await
        {
            summary.total += 1;
            let i = summary.total;
            let curl = report
                .attachment(CURL_ATTACHMENT)
                .map(|a| a.body_str().into_owned());

            for r in results.iter() {
                match r.status {
                    TestResult::Pass => {
                        println!(
                            "[{i}/{n_tests}] {}  {name} ({method} {path}): {} {}",
                            console::style("✔").green().bold(),
                            r.actual,
                            console::style("PASS!").green().bold(),
                        )
                    }
                    TestResult::Fail => {
                        failed_tests.push(FailedTest {
                            name: name.clone(),
                            result: r.clone(),
                            curl: curl.clone(),
                        });
                        println!(
                            "[{i}/{n_tests}] {}  {name} ({method} {path}): {} {}",
                            console::style("╳").red().bold(),
                            r.expected,
                            console::style("FAILED!").red().bold(),
                        )
                    }
                }
            }

            let status = verdict(&results);
            if status != Status::Passed {
                summary.failed += 1;
            }
            report.finish(status);

            if let Some(writer) = &writer {
                let message = first_failure(&results);
                if let Err(error) = writer.write(&report, &project, message) {
                    warn!(test = %name, %error, "failed to write test report");
                }
            }
        }

        if !failed_tests.is_empty() {
            println!();
            println!(
                "{}",
                console::style("Summary of Failed Tests:").bold().red()
            );
            for (idx, failed) in failed_tests.iter().enumerate() {
                println!("\n{} {}. {}", idx + 1, failed.name, failed.result);
                if let Some(curl) = &failed.curl {
                    println!("  {} {}", console::style("Reproduce:").dim(), curl);
                }
            }
        } else {
            println!();
            println!("{}", console::style("All tests passed! 🎉").bold().green());
        }

        if let Some(writer) = &writer {
            println!(
                "{}",
                console::style(format!("Reports written to {}", writer.dir().display())).dim()
            );
        }

        summary
    }
}

/// A test whose request never produced a response is broken rather than
/// failed.
fn verdict(results: &[AssertResult]) -> Status {
    if results
        .iter()
        .any(|r| matches!(r.actual, Actual::RequestFailed(_)))
    {
        return Status::Broken;
    }

    if results.iter().all(|r| r.status == TestResult::Pass) {
        Status::Passed
    } else {
        Status::Failed
    }
}

fn first_failure(results: &[AssertResult]) -> Option<String> {
    results
        .iter()
        .find(|r| r.status == TestResult::Fail)
        .map(|r| match &r.actual {
            Actual::RequestFailed(error) => error.clone(),
            actual => format!("{}: {actual}", r.expected),
        })
}
