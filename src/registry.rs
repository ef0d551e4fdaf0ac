use std::collections::BTreeMap;

use reqwest::header::HeaderMap;
use thiserror::Error;

pub const CATFACT: &str = "catfact";
pub const REQRES: &str = "reqres";

const CATFACT_BASE_URL: &str = "https://catfact.ninja";
const REQRES_BASE_URL: &str = "https://reqres.in/api";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown project `{0}`, it is not in the project registry")]
pub struct UnknownProject(pub String);

/// A backend the suite talks to.
#[derive(Debug, Clone)]
pub struct Project {
    pub base_url: String,
    /// Sent with every request to this project. Request headers win on
    /// conflict.
    pub headers: HeaderMap,
}

/// Alias to project mapping. Built once before any test runs and only read
/// afterwards.
#[derive(Debug, Clone)]
pub struct ProjectRegistry {
    projects: BTreeMap<String, Project>,
}

impl Default for ProjectRegistry {
    fn default() -> Self {
        Self::empty()
            .with_project(CATFACT, CATFACT_BASE_URL, HeaderMap::new())
            .with_project(REQRES, REQRES_BASE_URL, HeaderMap::new())
    }
}

impl ProjectRegistry {
    pub fn empty() -> Self {
        Self {
            projects: BTreeMap::new(),
        }
    }

    /// Adds a project, replacing any existing project with the same alias.
    pub fn with_project(
        mut self,
        alias: impl Into<String>,
        base_url: impl Into<String>,
        headers: HeaderMap,
    ) -> Self {
        self.projects.insert(
            alias.into(),
            Project {
                base_url: base_url.into(),
                headers,
            },
        );
        self
    }

    pub fn get(&self, alias: &str) -> Result<&Project, UnknownProject> {
        self.projects
            .get(alias)
            .ok_or_else(|| UnknownProject(alias.to_string()))
    }

    pub fn contains(&self, alias: &str) -> bool {
        self.projects.contains_key(alias)
    }

    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.projects.keys().map(String::as_str)
    }
}
