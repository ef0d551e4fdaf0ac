use std::borrow::Cow;

use serde::Serialize;

pub mod allure;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Passed,
    Failed,
    Broken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentKind {
    Text,
    Json,
}

impl AttachmentKind {
    pub fn mime(&self) -> &'static str {
        match self {
            AttachmentKind::Text => "text/plain",
            AttachmentKind::Json => "application/json",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            AttachmentKind::Text => "txt",
            AttachmentKind::Json => "json",
        }
    }
}

/// A named piece of evidence hanging off a step or a test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub name: String,
    pub kind: AttachmentKind,
    pub body: Vec<u8>,
}

impl Attachment {
    pub fn text(name: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: AttachmentKind::Text,
            body: body.into().into_bytes(),
        }
    }

    pub fn json(name: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            kind: AttachmentKind::Json,
            body,
        }
    }

    pub fn body_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

#[derive(Debug, Clone)]
pub struct Step {
    pub name: String,
    pub status: Status,
    pub start: i64,
    pub stop: i64,
    pub attachments: Vec<Attachment>,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone)]
struct OpenStep {
    name: String,
    start: i64,
    attachments: Vec<Attachment>,
    steps: Vec<Step>,
}

impl OpenStep {
    fn close(self, status: Status) -> Step {
        Step {
            name: self.name,
            status,
            start: self.start,
            stop: now_millis(),
            attachments: self.attachments,
            steps: self.steps,
        }
    }
}

/// Step log and attachments collected while a single test runs.
///
/// Steps nest: attachments and child steps go to the innermost open step,
/// or to the test itself when no step is open.
#[derive(Debug, Clone)]
pub struct TestReport {
    pub name: String,
    pub start: i64,
    pub stop: Option<i64>,
    pub status: Option<Status>,
    pub attachments: Vec<Attachment>,
    pub steps: Vec<Step>,
    open: Vec<OpenStep>,
}

impl TestReport {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            start: now_millis(),
            stop: None,
            status: None,
            attachments: vec![],
            steps: vec![],
            open: vec![],
        }
    }

    pub fn start_step(&mut self, name: impl Into<String>) {
        self.open.push(OpenStep {
            name: name.into(),
            start: now_millis(),
            attachments: vec![],
            steps: vec![],
        });
    }

    /// Closes the innermost open step. Does nothing when no step is open.
    pub fn finish_step(&mut self, status: Status) {
        let Some(open) = self.open.pop() else {
            return;
        };
        self.push_step(open.close(status));
    }

    /// Records an already finished step, e.g. an assertion outcome.
    pub fn push_step(&mut self, step: Step) {
        match self.open.last_mut() {
            Some(parent) => parent.steps.push(step),
            None => self.steps.push(step),
        }
    }

    pub fn attach(&mut self, attachment: Attachment) {
        match self.open.last_mut() {
            Some(step) => step.attachments.push(attachment),
            None => self.attachments.push(attachment),
        }
    }

    /// Seals the report. Steps still open at this point are closed as broken.
    pub fn finish(&mut self, status: Status) {
        while !self.open.is_empty() {
            self.finish_step(Status::Broken);
        }
        self.status = Some(status);
        self.stop = Some(now_millis());
    }

    /// Every attachment in the report, depth first.
    pub fn all_attachments(&self) -> Vec<&Attachment> {
        fn collect<'a>(steps: &'a [Step], out: &mut Vec<&'a Attachment>) {
            for step in steps {
                out.extend(step.attachments.iter());
                collect(&step.steps, out);
            }
        }

        let mut out: Vec<&Attachment> = self.attachments.iter().collect();
        collect(&self.steps, &mut out);
        out
    }

    pub fn attachment(&self, name: &str) -> Option<&Attachment> {
        self.all_attachments().into_iter().find(|a| a.name == name)
    }
}

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod test {
    use crate::report::Attachment;
    use crate::report::AttachmentKind;
    use crate::report::Status;
    use crate::report::TestReport;

    #[test]
    fn attachments_land_in_the_innermost_open_step() {
        let mut report = TestReport::new("create user");

        report.attach(Attachment::text("Before", "top level"));
        report.start_step("POST https://reqres.in/api/users");
        report.start_step("inner");
        report.attach(Attachment::text("Curl", "curl -X POST"));
        report.finish_step(Status::Passed);
        report.attach(Attachment::json("Response Json", b"{}".to_vec()));
        report.finish_step(Status::Passed);

        assert_eq!(report.attachments.len(), 1);
        assert_eq!(report.steps.len(), 1);

        let outer = &report.steps[0];
        assert_eq!(outer.name, "POST https://reqres.in/api/users");
        assert_eq!(outer.attachments[0].name, "Response Json");
        assert_eq!(outer.attachments[0].kind, AttachmentKind::Json);
        assert_eq!(outer.steps[0].attachments[0].body_str(), "curl -X POST");

        let names: Vec<_> = report
            .all_attachments()
            .iter()
            .map(|a| a.name.as_str())
            .collect();
        assert_eq!(names, vec!["Before", "Response Json", "Curl"]);
    }

    #[test]
    fn finish_closes_dangling_steps_as_broken() {
        let mut report = TestReport::new("delete user");
        report.start_step("DELETE https://reqres.in/api/users/2");

        report.finish(Status::Failed);

        assert_eq!(report.status, Some(Status::Failed));
        assert!(report.stop.is_some());
        assert_eq!(report.steps[0].status, Status::Broken);
    }

    #[test]
    fn finish_step_without_open_step_is_ignored() {
        let mut report = TestReport::new("noop");
        report.finish_step(Status::Passed);

        assert!(report.steps.is_empty());
    }

    #[test]
    fn attachment_kinds_map_to_mime_and_extension() {
        assert_eq!(AttachmentKind::Text.mime(), "text/plain");
        assert_eq!(AttachmentKind::Text.extension(), "txt");
        assert_eq!(AttachmentKind::Json.mime(), "application/json");
        assert_eq!(AttachmentKind::Json.extension(), "json");
    }
}
