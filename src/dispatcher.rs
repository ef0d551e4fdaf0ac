use std::borrow::Cow;

use reqwest::Client;
use reqwest::Method;
use reqwest::Response;
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use serde::Serialize;
use serde_json::Value;
use serde_json::ser::PrettyFormatter;
use thiserror::Error;
use tracing::debug;
use tracing::info;
use url::Url;

use crate::registry::Project;
use crate::registry::ProjectRegistry;
use crate::registry::UnknownProject;
use crate::report::Attachment;
use crate::report::Status;
use crate::report::TestReport;

pub mod curl;

pub const CURL_ATTACHMENT: &str = "Curl";
pub const EMPTY_RESPONSE_ATTACHMENT: &str = "Empty Response";
pub const EMPTY_RESPONSE_MARKER: &str = "empty response";
pub const RESPONSE_JSON_ATTACHMENT: &str = "Response Json";
pub const STATUS_ATTACHMENT: &str = "Status";

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error(transparent)]
    UnknownProject(#[from] UnknownProject),

    #[error("invalid request url `{url}`: {source}")]
    InvalidUrl {
        url: String,
        source: url::ParseError,
    },

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("response body is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// Transport options forwarded with a request. Everything is optional.
///
/// When both `form` and `json` are set the form body is sent and the JSON
/// body is dropped.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub query: Option<Vec<(String, String)>>,
    pub form: Option<Vec<(String, String)>>,
    pub json: Option<Value>,
    pub headers: HeaderMap,
}

#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub project: String,
    pub path: String,
    pub method: Method,
    pub options: RequestOptions,
}

impl RequestDescriptor {
    pub fn new(project: impl Into<String>, path: impl Into<String>, method: Method) -> Self {
        Self {
            project: project.into(),
            path: path.into(),
            method,
            options: RequestOptions::default(),
        }
    }

    pub fn with_options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }
}

#[derive(Debug, Clone)]
pub struct CapturedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
    /// `None` exactly when the body is empty.
    pub body_json: Option<Value>,
}

impl CapturedResponse {
    /// Consumes the body exactly once. A non-empty body must be JSON.
    pub async fn from_response(resp: Response) -> Result<Self, DispatchError> {
        let status = resp.status();
        let headers = resp.headers().clone();
        let body = resp.bytes().await?.to_vec();

        let body_json = if body.is_empty() {
            None
        } else {
            Some(serde_json::from_slice(&body)?)
        };

        Ok(Self {
            status,
            headers,
            body,
            body_json,
        })
    }

    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    pub fn json(&self) -> Option<&Value> {
        self.body_json.as_ref()
    }
}

/// Sends one request per call against the projects of a registry.
pub struct Dispatcher<'a> {
    registry: &'a ProjectRegistry,
    system_proxy: bool,
}

impl<'a> Dispatcher<'a> {
    pub fn new(registry: &'a ProjectRegistry) -> Self {
        Self {
            registry,
            system_proxy: true,
        }
    }

    /// Ignore proxies configured through the environment.
    pub fn without_proxy(mut self) -> Self {
        self.system_proxy = false;
        self
    }

    /// Sends the request described by `descriptor` and returns the response
    /// with its body read.
    ///
    /// The call is wrapped in a `"{METHOD} {url}"` step of `report`, which
    /// receives a `Curl` attachment, a `Status` attachment with the received
    /// status code and either a `Response Json` or an `Empty Response`
    /// attachment. An unknown project fails before anything
    /// is sent or recorded.
    pub async fn dispatch(
        &self,
        descriptor: &RequestDescriptor,
        report: &mut TestReport,
    ) -> Result<CapturedResponse, DispatchError> {
        let project = self.registry.get(&descriptor.project)?;

        let url = format!("{}{}", project.base_url, descriptor.path);
        let parsed = Url::parse(&url).map_err(|source| DispatchError::InvalidUrl {
            url: url.clone(),
            source,
        })?;

        report.start_step(format!("{} {url}", descriptor.method));
        let result = self.send(project, descriptor, parsed, report).await;
        report.finish_step(if result.is_ok() {
            Status::Passed
        } else {
            Status::Broken
        });

        result
    }

    async fn send(
        &self,
        project: &Project,
        descriptor: &RequestDescriptor,
        url: Url,
        report: &mut TestReport,
    ) -> Result<CapturedResponse, DispatchError> {
        let options = &descriptor.options;

        // One client per call. It is dropped, and its connections closed, on
        // every return path.
        let mut builder = Client::builder();
        if !self.system_proxy {
            builder = builder.no_proxy();
        }
        let client = builder.build()?;

        let mut request = client
            .request(descriptor.method.clone(), url)
            .headers(project.headers.clone())
            .headers(options.headers.clone());

        if let Some(query) = &options.query {
            request = request.query(query);
        }

        request = match (&options.form, &options.json) {
            (Some(form), _) => request.form(form),
            (None, Some(json)) => request.json(json),
            (None, None) => request,
        };

        let request = request.build()?;
        report.attach(Attachment::text(CURL_ATTACHMENT, curl::to_curl(&request)));

        debug!(method = %request.method(), url = %request.url(), "sending request");
        let response = client.execute(request).await?;
        report.attach(Attachment::text(
            STATUS_ATTACHMENT,
            response.status().to_string(),
        ));
        let captured = CapturedResponse::from_response(response).await?;
        info!(
            project = %descriptor.project,
            path = %descriptor.path,
            status = captured.status.as_u16(),
            "response received"
        );

        report.attach(response_attachment(&captured)?);

        Ok(captured)
    }
}

fn response_attachment(response: &CapturedResponse) -> Result<Attachment, DispatchError> {
    match response.json() {
        None => Ok(Attachment::text(
            EMPTY_RESPONSE_ATTACHMENT,
            EMPTY_RESPONSE_MARKER,
        )),
        Some(json) => Ok(Attachment::json(RESPONSE_JSON_ATTACHMENT, render_json(json)?)),
    }
}

/// Pretty prints `value` with a four space indent.
pub fn render_json(value: &Value) -> Result<Vec<u8>, serde_json::Error> {
    let mut out = Vec::new();
    let mut serializer =
        serde_json::Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(b"    "));
    value.serialize(&mut serializer)?;

    Ok(out)
}
