use std::collections::BTreeMap;

use serde::Deserialize;

#[derive(Deserialize, Debug, Clone)]
pub struct ApiProof {
    #[serde(default)]
    pub projects: BTreeMap<String, ProjectEntry>,
    #[serde(default)]
    pub global: Global,
    pub tests: Vec<Test>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct Global {
    pub headers: Option<toml::Value>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ProjectEntry {
    pub base_url: String,
    pub headers: Option<toml::Value>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Test {
    pub name: String,
    pub project: String,
    pub method: String,
    pub url: String,
    pub query: Option<toml::Value>,
    pub form: Option<toml::Value>,
    pub json: Option<serde_json::Value>,
    pub headers: Option<toml::Value>,
    #[serde(default)]
    pub send_schema: bool,
    pub schema: Option<String>,
    pub assert_status: Option<i32>,
    pub assert_headers: Option<toml::Value>,
    pub assert_fields: Option<BTreeMap<String, serde_json::Value>>,
    pub assert_len: Option<BTreeMap<String, usize>>,
}

#[cfg(test)]
mod test {
    use crate::parser::ApiProof;

    #[test]
    fn parses_projects_and_tests() {
        let src = r#"
            [projects.reqres]
            base_url = "https://reqres.in/api"
            headers = { x-api-key = "reqres-free-v1" }

            [[tests]]
            name = "Create user"
            project = "reqres"
            method = "post"
            url = "/users"
            form = { name = "Elena", job = "QA Automation Engineer" }
            schema = "post_create_user_schema_response.json"
            assert_status = 201
            assert_fields = { name = "Elena", "/job" = "QA Automation Engineer" }

            [[tests]]
            name = "Users per page"
            project = "reqres"
            method = "get"
            url = "/users"
            query = { per_page = 5 }
            assert_len = { "/data" = 5 }
        "#;

        let api_proof: ApiProof = toml::from_str(src).unwrap();

        assert_eq!(api_proof.projects["reqres"].base_url, "https://reqres.in/api");
        assert!(api_proof.global.headers.is_none());
        assert_eq!(api_proof.tests.len(), 2);

        let create = &api_proof.tests[0];
        assert!(!create.send_schema);
        assert_eq!(create.assert_status, Some(201));
        assert_eq!(create.assert_fields.as_ref().unwrap()["/job"], "QA Automation Engineer");

        let per_page = &api_proof.tests[1];
        assert_eq!(per_page.assert_len.as_ref().unwrap()["/data"], 5);
        assert_eq!(
            per_page.query.as_ref().unwrap().get("per_page").unwrap().as_integer(),
            Some(5)
        );
    }
}
