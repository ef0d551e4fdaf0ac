use std::str::FromStr;

use miette::Diagnostic;
use miette::NamedSource;
use miette::SourceSpan;
use reqwest::Method;
use reqwest::header::HeaderMap;
use thiserror::Error;

mod parser_assertion;

use crate::dispatcher::RequestDescriptor;
use crate::dispatcher::RequestOptions;
use crate::parser;
use crate::parser::ApiProof;
use crate::registry::ProjectRegistry;

// Error messages for parsing URLs
const BASE_URL_ENDS_WITH: &str =
    "A project base URL can’t end with a /, and each URL in a test must start with one";
const PATH_URL_MISSING_SLASH: &str =
    "The URL field in a test is required to begin with a leading /.";

pub struct Validator {
    api_proof: ApiProof,
    toml_src: String,
    file_name: String,
}

#[derive(Debug, Clone)]
pub enum Assertion {
    Status(i32),
    Headers(HeaderMap),
    Field {
        pointer: String,
        expected: serde_json::Value,
    },
    Length {
        pointer: String,
        expected: usize,
    },
    /// `document` is filled in by the runner right before the request goes
    /// out.
    Schema {
        file: String,
        document: Option<serde_json::Value>,
    },
    RequestFailed,
}

pub struct IR {
    pub registry: ProjectRegistry,
    pub tests: Vec<ValidatedTest>,
}

#[derive(Clone, Debug)]
pub struct ValidatedTest {
    pub name: String,
    pub request: RequestDescriptor,
    /// Send the loaded schema document as the JSON body.
    pub send_schema: bool,
    pub assertions: Vec<Assertion>,
}

#[derive(Debug, Error, Diagnostic)]
#[error("Invalid field `{field}`: {message}")]
pub struct ValidationError {
    field: String,
    message: String,
    #[source_code]
    src: Option<NamedSource<String>>,
    #[label("invalid value here")]
    span: Option<SourceSpan>,
}

macro_rules! validation_err {
    ($field:expr, $msg:expr, $self:expr, $snippet:expr) => {
        ValidationError {
            field: $field.to_string(),
            message: $msg.to_string(),
            src: Some(NamedSource::new(
                $self.file_name.clone(),
                $self.toml_src.clone(),
            )),
            span: find_span($snippet, &$self.toml_src),
        }
    };
}

impl Validator {
    pub fn new(api_proof: &ApiProof, toml_src: &str, file_name: &str) -> Self {
        Self {
            api_proof: api_proof.clone(),
            toml_src: toml_src.into(),
            file_name: file_name.into(),
        }
    }

    pub fn validate(&self) -> miette::Result<IR, ValidationError> {
        let registry = self.validate_projects()?;
        let tests = self
            .api_proof
            .tests
            .iter()
            .map(|test| self.create_test(test, &registry))
            .collect::<Result<Vec<_>, ValidationError>>()?;

        Ok(IR { registry, tests })
    }

    /// Starts from the built-in projects and layers the file's projects on
    /// top.
    fn validate_projects(&self) -> Result<ProjectRegistry, ValidationError> {
        let src = (self.file_name.clone(), self.toml_src.clone());
        let mut registry = ProjectRegistry::default();

        for (alias, entry) in &self.api_proof.projects {
            if entry.base_url.ends_with('/') {
                return Err(validation_err!(
                    format!("projects.{alias}.base_url"),
                    BASE_URL_ENDS_WITH,
                    self,
                    &entry.base_url
                ));
            }

            if let Err(parse_error) = url::Url::parse(&entry.base_url) {
                return Err(validation_err!(
                    format!("projects.{alias}.base_url"),
                    parse_error,
                    self,
                    &entry.base_url
                ));
            }

            let headers = match &entry.headers {
                Some(value) => parser_assertion::parse_header_map(value, Some(&src))?,
                None => HeaderMap::new(),
            };

            registry = registry.with_project(alias.clone(), entry.base_url.clone(), headers);
        }

        Ok(registry)
    }

    fn create_test(
        &self,
        test: &parser::Test,
        registry: &ProjectRegistry,
    ) -> Result<ValidatedTest, ValidationError> {
        let src = (self.file_name.clone(), self.toml_src.clone());

        if !registry.contains(&test.project) {
            let known = registry.aliases().collect::<Vec<_>>().join(", ");
            return Err(validation_err!(
                format!("{} - project", test.name),
                format!("Unknown project `{}`, expected one of: {known}", test.project),
                self,
                &test.project
            ));
        }

        let method = parse_method(&test.method.to_uppercase()).map_err(|e| {
            validation_err!(format!("{} - method", test.name), e, self, &test.method)
        })?;

        if !test.url.starts_with('/') {
            return Err(validation_err!(
                format!("{}/url", test.name),
                PATH_URL_MISSING_SLASH,
                self,
                &test.url
            ));
        }

        if test.send_schema && test.schema.is_none() {
            return Err(validation_err!(
                format!("{}/send_schema", test.name),
                "send_schema needs a `schema` file to send",
                self,
                &test.name
            ));
        }

        // Start with the global headers if defined, then merge the headers
        // from the individual test. The test header wins on conflict.
        let mut headers = match &self.api_proof.global.headers {
            Some(value) => parser_assertion::parse_header_map(value, Some(&src))?,
            None => HeaderMap::new(),
        };

        if let Some(value) = &test.headers {
            let test_headers = parser_assertion::parse_header_map(value, Some(&src))?;

            for (key, value) in test_headers {
                if let Some(key) = key {
                    headers.insert(key, value);
                }
            }
        }

        let query = test
            .query
            .as_ref()
            .map(|value| parser_assertion::parse_params("query", value, Some(&src)))
            .transpose()?;

        let form = test
            .form
            .as_ref()
            .map(|value| parser_assertion::parse_params("form", value, Some(&src)))
            .transpose()?;

        let assertions = parser_assertion::parse_assertions(
            test,
            Some((self.file_name.as_str(), self.toml_src.as_str())),
        )?;

        let request = RequestDescriptor::new(test.project.clone(), test.url.clone(), method)
            .with_options(RequestOptions {
                query,
                form,
                json: test.json.clone(),
                headers,
            });

        Ok(ValidatedTest {
            name: test.name.clone(),
            request,
            send_schema: test.send_schema,
            assertions,
        })
    }
}

fn parse_method(method: &str) -> Result<reqwest::Method, String> {
    let method = Method::from_str(method).map_err(|e| e.to_string())?;

    if !matches!(
        method,
        Method::GET
            | Method::POST
            | Method::PUT
            | Method::DELETE
            | Method::PATCH
            | Method::HEAD
            | Method::OPTIONS
    ) {
        return Err(format!("Invalid HTTP method: {}", method));
    }

    Ok(method)
}

fn find_span(needle: &str, toml_src: &str) -> Option<SourceSpan> {
    let pattern = format!("\"{}\"", needle);
    toml_src
        .find(&pattern)
        .map(|start| SourceSpan::new((start + 1).into(), needle.len()))
}

#[cfg(test)]
mod test {
    use reqwest::Method;

    use crate::parser::ApiProof;
    use crate::validator::Assertion;
    use crate::validator::Validator;

    fn validate(src: &str) -> Result<crate::validator::IR, crate::validator::ValidationError> {
        let api_proof: ApiProof = toml::from_str(src).unwrap();
        Validator::new(&api_proof, src, "api_proof.toml").validate()
    }

    #[test]
    fn builds_request_descriptors() {
        let ir = validate(
            r#"
            [global]
            headers = { accept = "application/json", x-trace = "global" }

            [projects.reqres]
            base_url = "http://127.0.0.1:3000/api"
            headers = { x-api-key = "reqres-free-v1" }

            [[tests]]
            name = "Update user"
            project = "reqres"
            method = "patch"
            url = "/users/2"
            headers = { x-trace = "test" }
            form = { name = "Elena", job = "QA Automation Engineer" }
            schema = "patch_update_user_schema_response.json"
            send_schema = true
            assert_status = 200
            "#,
        )
        .unwrap();

        let project = ir.registry.get("reqres").unwrap();
        assert_eq!(project.base_url, "http://127.0.0.1:3000/api");
        assert_eq!(project.headers.get("x-api-key").unwrap(), "reqres-free-v1");
        assert!(ir.registry.contains("catfact"));

        let test = &ir.tests[0];
        assert_eq!(test.name, "Update user");
        assert!(test.send_schema);
        assert_eq!(test.request.method, Method::PATCH);
        assert_eq!(test.request.path, "/users/2");

        let options = &test.request.options;
        assert_eq!(options.headers.get("accept").unwrap(), "application/json");
        assert_eq!(options.headers.get("x-trace").unwrap(), "test");
        assert_eq!(
            options.form.as_deref().unwrap(),
            &[
                ("job".to_string(), "QA Automation Engineer".to_string()),
                ("name".to_string(), "Elena".to_string()),
            ]
        );
        assert!(options.query.is_none());
        assert!(matches!(test.assertions[0], Assertion::Status(200)));
        assert!(matches!(test.assertions[1], Assertion::Schema { .. }));
    }

    #[test]
    fn unknown_project_is_rejected() {
        let err = validate(
            r#"
            [[tests]]
            name = "Pets"
            project = "petstore"
            method = "get"
            url = "/pets"
            "#,
        )
        .err()
        .unwrap();

        let message = err.to_string();
        assert!(message.contains("Pets - project"));
        assert!(message.contains("catfact, reqres"));
    }

    #[test]
    fn path_must_start_with_slash() {
        let err = validate(
            r#"
            [[tests]]
            name = "Breeds"
            project = "catfact"
            method = "get"
            url = "breeds"
            "#,
        )
        .err()
        .unwrap();

        assert!(err.to_string().contains("Breeds/url"));
    }

    #[test]
    fn base_url_must_not_end_with_slash() {
        let err = validate(
            r#"
            [projects.catfact]
            base_url = "https://catfact.ninja/"

            [[tests]]
            name = "Breeds"
            project = "catfact"
            method = "get"
            url = "/breeds"
            "#,
        )
        .err()
        .unwrap();

        assert!(err.to_string().contains("projects.catfact.base_url"));
    }

    #[test]
    fn bad_method_is_rejected() {
        let err = validate(
            r#"
            [[tests]]
            name = "Breeds"
            project = "catfact"
            method = "fetch"
            url = "/breeds"
            "#,
        )
        .err()
        .unwrap();

        assert!(err.to_string().contains("Breeds - method"));
    }

    #[test]
    fn send_schema_without_schema_is_rejected() {
        let err = validate(
            r#"
            [[tests]]
            name = "Breeds"
            project = "catfact"
            method = "get"
            url = "/breeds"
            send_schema = true
            "#,
        )
        .err()
        .unwrap();

        assert!(err.to_string().contains("Breeds/send_schema"));
    }

    #[test]
    fn shipped_scenarios_validate() {
        let src = include_str!("../api_proof.toml");
        let ir = validate(src).unwrap();

        assert_eq!(ir.tests.len(), 14);
        assert!(ir.tests.iter().all(|t| ir.registry.contains(&t.request.project)));

        let test = |name: &str| ir.tests.iter().find(|t| t.name == name).unwrap();

        assert!(!test("Register user matches schema").send_schema);
        assert!(test("Update user matches schema").send_schema);
        for name in ["Update user", "Update user matches schema"] {
            assert_eq!(
                test(name).request.options.form.as_deref().unwrap(),
                &[
                    ("job".to_string(), "QA Automation Engineer".to_string()),
                    ("name".to_string(), "Elena".to_string()),
                ]
            );
        }
    }
}
