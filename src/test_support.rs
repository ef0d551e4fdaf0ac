//! Local stand-in for the demo services, so the dispatcher and runner can be
//! tested without leaving the machine.

use std::collections::HashMap;

use axum::Form;
use axum::Json;
use axum::Router;
use axum::extract::Path;
use axum::extract::Query;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::routing::get;
use axum::routing::patch;
use axum::routing::post;
use serde_json::Value;
use serde_json::json;

const TOTAL_USERS: usize = 12;

/// Starts the server on an ephemeral port and returns its base URL.
pub async fn spawn_server() -> String {
    let app = Router::new()
        .route("/users", post(create_user).get(list_users))
        .route("/users/{id}", patch(update_user).delete(delete_user))
        .route("/register", post(register))
        .route("/plain", get(|| async { "definitely not json" }))
        .route("/echo", get(echo).post(echo));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{addr}")
}

async fn create_user(Form(form): Form<HashMap<String, String>>) -> (StatusCode, Json<Value>) {
    (
        StatusCode::CREATED,
        Json(json!({
            "name": form.get("name"),
            "job": form.get("job"),
            "id": "853",
            "createdAt": "2026-10-19T09:30:00.000Z"
        })),
    )
}

async fn list_users(Query(query): Query<HashMap<String, String>>) -> Json<Value> {
    let page: usize = query.get("page").and_then(|p| p.parse().ok()).unwrap_or(1);
    let per_page: usize = query
        .get("per_page")
        .and_then(|p| p.parse().ok())
        .unwrap_or(6)
        .max(1);

    let first = page.saturating_sub(1) * per_page + 1;
    let data: Vec<Value> = (first..=TOTAL_USERS)
        .take(per_page)
        .map(|id| {
            json!({
                "id": id,
                "email": format!("user{id}@reqres.in"),
                "first_name": "Janet",
                "last_name": "Weaver",
                "avatar": format!("https://reqres.in/img/faces/{id}-image.jpg")
            })
        })
        .collect();

    Json(json!({
        "page": page,
        "per_page": per_page,
        "total": TOTAL_USERS,
        "total_pages": TOTAL_USERS.div_ceil(per_page),
        "data": data,
        "support": {"url": "https://reqres.in/#support-heading", "text": "Thanks!"}
    }))
}

async fn update_user(
    Path(_id): Path<u32>,
    Form(form): Form<HashMap<String, String>>,
) -> Json<Value> {
    Json(json!({
        "name": form.get("name"),
        "job": form.get("job"),
        "updatedAt": "2026-10-19T09:31:00.000Z"
    }))
}

async fn delete_user(Path(_id): Path<u32>) -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn register(Form(form): Form<HashMap<String, String>>) -> (StatusCode, Json<Value>) {
    if !form.contains_key("password") {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "Missing password"})),
        );
    }

    (
        StatusCode::OK,
        Json(json!({"id": 4, "token": "QpwL5tke4Pnpja7X4"})),
    )
}

async fn echo(headers: HeaderMap, body: String) -> Json<Value> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };

    Json(json!({
        "api_key": header("x-api-key"),
        "content_type": header("content-type"),
        "body": body
    }))
}

#[cfg(test)]
mod test {
    use serde_json::Value;

    use crate::test_support::spawn_server;

    #[tokio::test]
    async fn zero_paging_parameters_are_clamped() {
        let base_url = spawn_server().await;
        let client = reqwest::Client::builder().no_proxy().build().unwrap();

        let body: Value = client
            .get(format!("{base_url}/users?page=0&per_page=0"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        assert_eq!(body["page"], 0);
        assert_eq!(body["per_page"], 1);
        assert_eq!(body["total_pages"], 12);
        assert_eq!(body["data"][0]["id"], 1);

        // the server task is still serving
        let status = client
            .get(format!("{base_url}/users?page=2&per_page=5"))
            .send()
            .await
            .unwrap()
            .status();
        assert_eq!(status, 200);
    }
}
