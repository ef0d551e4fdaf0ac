use std::fs;
use std::path::Path;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::report::Attachment;
use crate::report::Status;
use crate::report::Step;
use crate::report::TestReport;
use crate::report::now_millis;

const FRAMEWORK: &str = "api_proof";

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to write report file `{}`: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AllureResult {
    uuid: String,
    history_id: String,
    name: String,
    full_name: String,
    status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    status_details: Option<StatusDetails>,
    stage: &'static str,
    start: i64,
    stop: i64,
    labels: Vec<Label>,
    steps: Vec<AllureStep>,
    attachments: Vec<AllureAttachment>,
}

#[derive(Serialize)]
struct StatusDetails {
    message: String,
}

#[derive(Serialize)]
struct Label {
    name: &'static str,
    value: String,
}

#[derive(Serialize)]
struct AllureStep {
    name: String,
    status: Status,
    stage: &'static str,
    start: i64,
    stop: i64,
    steps: Vec<AllureStep>,
    attachments: Vec<AllureAttachment>,
}

#[derive(Serialize)]
struct AllureAttachment {
    name: String,
    source: String,
    #[serde(rename = "type")]
    mime: &'static str,
}

/// Writes finished test reports as Allure result files into one directory.
pub struct AllureWriter {
    dir: PathBuf,
}

impl AllureWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, ReportError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| ReportError::Io {
            path: dir.clone(),
            source,
        })?;

        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes `{uuid}-result.json` plus one file per attachment and returns
    /// the path of the result file.
    pub fn write(
        &self,
        report: &TestReport,
        suite: &str,
        message: Option<String>,
    ) -> Result<PathBuf, ReportError> {
        let uuid = Uuid::new_v4().to_string();
        let full_name = format!("{suite}.{}", report.name);

        let result = AllureResult {
            uuid: uuid.clone(),
            history_id: full_name.clone(),
            name: report.name.clone(),
            full_name,
            status: report.status.unwrap_or(Status::Broken),
            status_details: message.map(|message| StatusDetails { message }),
            stage: "finished",
            start: report.start,
            stop: report.stop.unwrap_or_else(now_millis),
            labels: vec![
                Label {
                    name: "suite",
                    value: suite.to_string(),
                },
                Label {
                    name: "framework",
                    value: FRAMEWORK.to_string(),
                },
            ],
            steps: self.write_steps(&report.steps)?,
            attachments: self.write_attachments(&report.attachments)?,
        };

        let path = self.dir.join(format!("{uuid}-result.json"));
        let json = serde_json::to_vec_pretty(&result)?;
        write_file(&path, &json)?;

        Ok(path)
    }

    fn write_steps(&self, steps: &[Step]) -> Result<Vec<AllureStep>, ReportError> {
        steps
            .iter()
            .map(|step| {
                Ok(AllureStep {
                    name: step.name.clone(),
                    status: step.status,
                    stage: "finished",
                    start: step.start,
                    stop: step.stop,
                    steps: self.write_steps(&step.steps)?,
                    attachments: self.write_attachments(&step.attachments)?,
                })
            })
            .collect()
    }

    fn write_attachments(
        &self,
        attachments: &[Attachment],
    ) -> Result<Vec<AllureAttachment>, ReportError> {
        attachments
            .iter()
            .map(|attachment| {
                let source = format!(
                    "{}-attachment.{}",
                    Uuid::new_v4(),
                    attachment.kind.extension()
                );
                write_file(&self.dir.join(&source), &attachment.body)?;

                Ok(AllureAttachment {
                    name: attachment.name.clone(),
                    source,
                    mime: attachment.kind.mime(),
                })
            })
            .collect()
    }
}

fn write_file(path: &Path, contents: &[u8]) -> Result<(), ReportError> {
    fs::write(path, contents).map_err(|source| ReportError::Io {
        path: path.to_path_buf(),
        source,
    })
}
