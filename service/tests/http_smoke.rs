use std::net::SocketAddr;

use axum::Router;
use serde_json::json;
use sql_gate_core::config::{GateConfig, Limits, UserCredential};

const PASSWORD: &str = "correct horse";

fn config() -> GateConfig {
    GateConfig {
        users: vec![
            UserCredential {
                username: "matt".to_string(),
                password: Some(PASSWORD.to_string()),
                password_env_var: None,
            },
            UserCredential {
                username: "guest".to_string(),
                password: Some("guest".to_string()),
                password_env_var: None,
            },
        ],
        limits: Limits {
            fetch_batch_size: 10,
            ..Limits::default()
        },
        ..GateConfig::default()
    }
}

fn seeded_db() -> tempfile::NamedTempFile {
    let db = tempfile::NamedTempFile::new().expect("temp db");
    let conn = rusqlite::Connection::open(db.path()).expect("open");
    conn.execute_batch(
        "CREATE TABLE t(id INTEGER PRIMARY KEY, name TEXT);
         INSERT INTO t(name) VALUES ('a'), ('b');
         CREATE TABLE x(id INTEGER);
         INSERT INTO x VALUES (1);",
    )
    .expect("seed");
    db
}

fn count(db: &tempfile::NamedTempFile, table: &str) -> Option<i64> {
    let conn = rusqlite::Connection::open(db.path()).expect("open");
    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
        row.get(0)
    })
    .ok()
}

async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("local_addr");
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .expect("serve");
    });
    addr
}

struct Gate {
    client: reqwest::Client,
    base: String,
}

impl Gate {
    async fn start(db: &tempfile::NamedTempFile) -> Self {
        let app = sql_gate_service::server::build_app(db.path().to_path_buf(), config())
            .expect("build app");
        let addr = serve(app).await;
        Self {
            client: reqwest::Client::new(),
            base: format!("http://{addr}"),
        }
    }

    async fn post(
        &self,
        path: &str,
        cookie: Option<&str>,
        body: serde_json::Value,
    ) -> reqwest::Response {
        let mut req = self.client.post(format!("{}{path}", self.base)).json(&body);
        if let Some(cookie) = cookie {
            req = req.header("cookie", cookie);
        }
        req.send().await.expect("send")
    }

    /// Logs in and returns the `name=value` pair to send back as a `Cookie` header.
    async fn login(&self) -> String {
        let resp = self
            .post("/login", None, json!({ "usr": "matt", "pwd": PASSWORD }))
            .await;
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        let set_cookie = resp
            .headers()
            .get("set-cookie")
            .expect("set-cookie")
            .to_str()
            .expect("ascii")
            .to_string();
        set_cookie
            .split(';')
            .next()
            .expect("cookie pair")
            .to_string()
    }
}

async fn body(resp: reqwest::Response) -> serde_json::Value {
    resp.json::<serde_json::Value>().await.expect("json")
}

#[tokio::test]
async fn login_success_sets_session_cookie() {
    let db = seeded_db();
    let gate = Gate::start(&db).await;

    for path in ["/login", "/"] {
        let resp = gate
            .post(path, None, json!({ "usr": "matt", "pwd": PASSWORD }))
            .await;
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        assert!(resp.headers().contains_key("x-request-id"));

        let set_cookie = resp
            .headers()
            .get("set-cookie")
            .expect("set-cookie")
            .to_str()
            .expect("ascii")
            .to_string();
        assert!(set_cookie.starts_with("session="), "{set_cookie}");
        assert!(set_cookie.contains("HttpOnly"), "{set_cookie}");

        let status = body(resp).await["status"]
            .as_str()
            .expect("status")
            .to_string();
        assert!(status.starts_with("Login success at "), "{status}");
        assert!(status.ends_with(" UNIX time"), "{status}");
    }
}

#[tokio::test]
async fn login_with_wrong_password_sets_no_cookie() {
    let db = seeded_db();
    let gate = Gate::start(&db).await;

    let resp = gate
        .post("/login", None, json!({ "usr": "matt", "pwd": "wrong" }))
        .await;
    assert_eq!(resp.status(), reqwest::StatusCode::UNAUTHORIZED);
    assert!(resp.headers().get("set-cookie").is_none());
    assert_eq!(body(resp).await, json!({ "status": "Invalid Credentials" }));
}

#[tokio::test]
async fn stacked_query_runs_only_first_statement() {
    let db = seeded_db();
    let gate = Gate::start(&db).await;
    let cookie = gate.login().await;

    let resp = gate
        .post(
            "/query",
            Some(&cookie),
            json!({ "cmd": "SELECT * FROM t ORDER BY id; DROP TABLE t" }),
        )
        .await;
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    assert_eq!(
        body(resp).await,
        json!({ "result": [[1, "a"], [2, "b"]] })
    );
    assert_eq!(count(&db, "t"), Some(2));
}

#[tokio::test]
async fn command_outside_endpoint_table_is_rejected_and_echoed() {
    let db = seeded_db();
    let gate = Gate::start(&db).await;
    let cookie = gate.login().await;

    let resp = gate
        .post("/modify", Some(&cookie), json!({ "cmd": "DROP TABLE x" }))
        .await;
    assert_eq!(resp.status(), reqwest::StatusCode::FORBIDDEN);
    assert_eq!(
        body(resp).await,
        json!({ "status": "badCommand : DROP TABLE x" })
    );
    assert_eq!(count(&db, "x"), Some(1));
}

#[tokio::test]
async fn remove_commits_delete() {
    let db = seeded_db();
    let gate = Gate::start(&db).await;
    let cookie = gate.login().await;

    let resp = gate
        .post("/remove", Some(&cookie), json!({ "cmd": "DELETE FROM t" }))
        .await;
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    assert_eq!(body(resp).await, json!({ "result": "Transaction Success" }));
    assert_eq!(count(&db, "t"), Some(0));

    let resp = gate
        .post("/query", Some(&cookie), json!({ "cmd": "SELECT COUNT(*) FROM t" }))
        .await;
    assert_eq!(body(resp).await, json!({ "result": [[0]] }));
}

#[tokio::test]
async fn unauthenticated_statement_is_never_executed() {
    let db = seeded_db();
    let gate = Gate::start(&db).await;

    let resp = gate
        .post("/remove", None, json!({ "cmd": "DELETE FROM t" }))
        .await;
    assert_eq!(resp.status(), reqwest::StatusCode::UNAUTHORIZED);
    assert_eq!(body(resp).await, json!({ "status": "Invalid Credentials" }));

    let resp = gate
        .post(
            "/query",
            Some("session=6d617474.00"),
            json!({ "cmd": "SELECT 1" }),
        )
        .await;
    assert_eq!(resp.status(), reqwest::StatusCode::UNAUTHORIZED);
    assert_eq!(count(&db, "t"), Some(2));
}

#[tokio::test]
async fn malformed_bodies_and_driver_errors() {
    let db = seeded_db();
    let gate = Gate::start(&db).await;
    let cookie = gate.login().await;

    let resp = gate.post("/add", Some(&cookie), json!({})).await;
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
    assert_eq!(body(resp).await, json!({ "status": "No sql command" }));

    let resp = gate
        .client
        .post(format!("{}/add", gate.base))
        .header("cookie", &cookie)
        .body(r#"{"cmd": "INSERT INTO t(name) VALUES ('c')"}"#)
        .send()
        .await
        .expect("send");
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
    assert_eq!(body(resp).await, json!({ "status": "Invalid JSON" }));

    let resp = gate
        .post(
            "/add",
            Some(&cookie),
            json!({ "cmd": "INSERT INTO missing VALUES (1)" }),
        )
        .await;
    assert_eq!(resp.status(), reqwest::StatusCode::UNPROCESSABLE_ENTITY);
    let error = body(resp).await["error"]
        .as_str()
        .expect("error message")
        .to_string();
    assert!(error.contains("no such table"), "{error}");

    let resp = gate
        .post(
            "/add",
            Some(&cookie),
            json!({ "cmd": "INSERT INTO t(name) VALUES ('c')" }),
        )
        .await;
    assert_eq!(body(resp).await, json!({ "result": "Transaction Success" }));
    assert_eq!(count(&db, "t"), Some(3));
}
