//! One synchronous pass per request: authenticate → parse → classify → isolate →
//! execute → map. Every pass ends in exactly one [`Outcome`].

use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::json;

use sql_gate_core::policy::{Classification, PolicyTables, StatementCategory};
use sql_gate_core::session::{AuthResult, LoginResult, SessionAuthenticator, SessionToken};
use sql_gate_core::statement::{IsolatedStatement, isolate};

use crate::executor::{ExecutionOutcome, TransactionExecutor};
use crate::store::{Row, Store};

pub const COMMAND_FIELD: &str = "cmd";
pub const USERNAME_FIELD: &str = "usr";
pub const PASSWORD_FIELD: &str = "pwd";

const INVALID_CREDENTIALS: &str = "Invalid Credentials";
const INVALID_JSON: &str = "Invalid JSON";
const NO_SQL_COMMAND: &str = "No sql command";
const TRANSACTION_SUCCESS: &str = "Transaction Success";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Query,
    Modify,
    Add,
    Remove,
}

impl Endpoint {
    pub const ALL: [Endpoint; 4] = [
        Endpoint::Query,
        Endpoint::Modify,
        Endpoint::Add,
        Endpoint::Remove,
    ];

    /// The one policy table this endpoint is bound to.
    pub const fn category(self) -> StatementCategory {
        match self {
            Endpoint::Query => StatementCategory::ReadOnly,
            Endpoint::Modify => StatementCategory::Modifying,
            Endpoint::Add => StatementCategory::Additive,
            Endpoint::Remove => StatementCategory::Destructive,
        }
    }

    pub const fn path(self) -> &'static str {
        match self {
            Endpoint::Query => "/query",
            Endpoint::Modify => "/modify",
            Endpoint::Add => "/add",
            Endpoint::Remove => "/remove",
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Endpoint::Query => "query",
            Endpoint::Modify => "modify",
            Endpoint::Add => "add",
            Endpoint::Remove => "remove",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Malformed {
    /// The body is absent, not declared as JSON, not parseable, or not an object.
    InvalidJson,
    /// The object has no string under [`COMMAND_FIELD`].
    MissingCommand,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Unauthenticated,
    MalformedRequest(Malformed),
    /// Echoes the full, unvalidated command back to the caller. This discloses the
    /// input verbatim and is kept as-is rather than sanitized.
    Rejected {
        command: String,
    },
    Success {
        rows: Option<Vec<Row>>,
    },
    Warning(String),
    Error(String),
}

impl Outcome {
    pub fn kind(&self) -> &'static str {
        match self {
            Outcome::Unauthenticated => "unauthenticated",
            Outcome::MalformedRequest(_) => "malformed_request",
            Outcome::Rejected { .. } => "rejected",
            Outcome::Success { .. } => "success",
            Outcome::Warning(_) => "warning",
            Outcome::Error(_) => "error",
        }
    }

    pub fn body(&self) -> serde_json::Value {
        match self {
            Outcome::Unauthenticated => json!({ "status": INVALID_CREDENTIALS }),
            Outcome::MalformedRequest(Malformed::InvalidJson) => json!({ "status": INVALID_JSON }),
            Outcome::MalformedRequest(Malformed::MissingCommand) => {
                json!({ "status": NO_SQL_COMMAND })
            }
            Outcome::Rejected { command } => {
                json!({ "status": format!("badCommand : {command}") })
            }
            Outcome::Success { rows: None } => json!({ "result": TRANSACTION_SUCCESS }),
            Outcome::Success { rows: Some(rows) } => json!({ "result": rows }),
            Outcome::Warning(message) => json!({ "warning": message }),
            Outcome::Error(message) => json!({ "error": message }),
        }
    }
}

impl From<ExecutionOutcome> for Outcome {
    fn from(outcome: ExecutionOutcome) -> Self {
        match outcome {
            ExecutionOutcome::Success { rows } => Outcome::Success { rows },
            ExecutionOutcome::Warning(message) => Outcome::Warning(message),
            ExecutionOutcome::Error(message) => Outcome::Error(message),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoginOutcome {
    Success {
        username: String,
        token: SessionToken,
        unix_time: f64,
    },
    InvalidJson,
    InvalidCredentials,
}

impl LoginOutcome {
    pub fn kind(&self) -> &'static str {
        match self {
            LoginOutcome::Success { .. } => "success",
            LoginOutcome::InvalidJson => "malformed_request",
            LoginOutcome::InvalidCredentials => "invalid_credentials",
        }
    }

    pub fn body(&self) -> serde_json::Value {
        match self {
            LoginOutcome::Success { unix_time, .. } => {
                json!({ "status": format!("Login success at {unix_time} UNIX time") })
            }
            LoginOutcome::InvalidJson => json!({ "status": INVALID_JSON }),
            LoginOutcome::InvalidCredentials => json!({ "status": INVALID_CREDENTIALS }),
        }
    }
}

/// A request that passed authentication and classification, ready to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prepared {
    pub endpoint: Endpoint,
    pub username: String,
    pub keyword: &'static str,
    pub statement: IsolatedStatement,
}

#[derive(Debug, Clone, Copy)]
pub struct RequestPipeline<'a> {
    authenticator: &'a SessionAuthenticator,
    tables: &'a PolicyTables,
}

impl<'a> RequestPipeline<'a> {
    pub fn new(authenticator: &'a SessionAuthenticator, tables: &'a PolicyTables) -> Self {
        Self {
            authenticator,
            tables,
        }
    }

    /// `body` is `None` when the request did not declare a JSON body.
    pub fn login(&self, body: Option<&[u8]>) -> LoginOutcome {
        let Ok(object) = parse_object(body) else {
            return LoginOutcome::InvalidJson;
        };
        let (Some(username), Some(password)) = (
            object.get(USERNAME_FIELD).and_then(|v| v.as_str()),
            object.get(PASSWORD_FIELD).and_then(|v| v.as_str()),
        ) else {
            return LoginOutcome::InvalidCredentials;
        };

        match self.authenticator.login(username, password) {
            LoginResult::Success { username, token } => LoginOutcome::Success {
                username,
                token,
                unix_time: unix_time_secs(),
            },
            LoginResult::InvalidCredentials => {
                tracing::info!(user = %username, "login rejected");
                LoginOutcome::InvalidCredentials
            }
        }
    }

    /// Every step before execution. An `Err` is already a terminal outcome.
    pub fn prepare(
        &self,
        endpoint: Endpoint,
        session_token: Option<&str>,
        body: Option<&[u8]>,
    ) -> Result<Prepared, Outcome> {
        let AuthResult::Authenticated(username) = self.authenticator.authenticate(session_token)
        else {
            return Err(Outcome::Unauthenticated);
        };

        let command = parse_command(body).map_err(Outcome::MalformedRequest)?;

        let table = self.tables.table(endpoint.category());
        let keyword = match table.classify(&command) {
            Classification::Accepted { keyword, .. } => Some(keyword),
            Classification::Rejected { .. } => None,
        };
        let Some(keyword) = keyword else {
            tracing::debug!(endpoint = endpoint.as_str(), "command rejected by policy table");
            return Err(Outcome::Rejected { command });
        };

        Ok(Prepared {
            endpoint,
            username,
            keyword,
            statement: isolate(&command),
        })
    }

    pub fn run<S: Store>(
        &self,
        endpoint: Endpoint,
        session_token: Option<&str>,
        body: Option<&[u8]>,
        executor: &mut TransactionExecutor<S>,
    ) -> Outcome {
        match self.prepare(endpoint, session_token, body) {
            Ok(prepared) => execute(&prepared, executor),
            Err(outcome) => outcome,
        }
    }
}

pub fn execute<S: Store>(prepared: &Prepared, executor: &mut TransactionExecutor<S>) -> Outcome {
    let outcome = if prepared.endpoint.category().is_mutating() {
        executor.execute_mutating(&prepared.statement)
    } else {
        executor.execute_read_only(&prepared.statement)
    };
    outcome.into()
}

pub fn parse_command(body: Option<&[u8]>) -> Result<String, Malformed> {
    let object = parse_object(body)?;
    match object.get(COMMAND_FIELD) {
        Some(serde_json::Value::String(command)) => Ok(command.clone()),
        _ => Err(Malformed::MissingCommand),
    }
}

fn parse_object(
    body: Option<&[u8]>,
) -> Result<serde_json::Map<String, serde_json::Value>, Malformed> {
    let body = body.ok_or(Malformed::InvalidJson)?;
    match serde_json::from_slice::<serde_json::Value>(body) {
        Ok(serde_json::Value::Object(object)) => Ok(object),
        _ => Err(Malformed::InvalidJson),
    }
}

fn unix_time_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use sql_gate_core::credentials::CredentialStore;
    use sql_gate_core::session::SigningKey;

    use super::*;

    fn authenticator() -> SessionAuthenticator {
        let credentials = CredentialStore::from_pairs([("matt", "s3cret")]);
        SessionAuthenticator::new(credentials, &SigningKey::generate()).expect("authenticator")
    }

    fn token(auth: &SessionAuthenticator) -> String {
        match auth.login("matt", "s3cret") {
            LoginResult::Success { token, .. } => token.as_str().to_string(),
            LoginResult::InvalidCredentials => panic!("login failed"),
        }
    }

    #[test]
    fn parse_command_distinguishes_invalid_json_from_missing_command() {
        assert_eq!(parse_command(None), Err(Malformed::InvalidJson));
        assert_eq!(parse_command(Some(b"{")), Err(Malformed::InvalidJson));
        assert_eq!(parse_command(Some(b"null")), Err(Malformed::InvalidJson));
        assert_eq!(parse_command(Some(b"[\"cmd\"]")), Err(Malformed::InvalidJson));
        assert_eq!(parse_command(Some(b"{}")), Err(Malformed::MissingCommand));
        assert_eq!(
            parse_command(Some(br#"{"cmd": null}"#)),
            Err(Malformed::MissingCommand)
        );
        assert_eq!(
            parse_command(Some(br#"{"cmd": 1}"#)),
            Err(Malformed::MissingCommand)
        );
        assert_eq!(
            parse_command(Some(br#"{"cmd": "SELECT 1"}"#)),
            Ok("SELECT 1".to_string())
        );
    }

    #[test]
    fn authentication_runs_before_body_parsing() {
        let auth = authenticator();
        let tables = PolicyTables::compile().expect("tables");
        let pipeline = RequestPipeline::new(&auth, &tables);

        let outcome = pipeline
            .prepare(Endpoint::Query, None, Some(b"{"))
            .expect_err("unauthenticated");
        assert_eq!(outcome, Outcome::Unauthenticated);
        assert_eq!(outcome.body(), json!({ "status": "Invalid Credentials" }));
    }

    #[test]
    fn prepare_classifies_against_the_endpoint_table_and_isolates() {
        let auth = authenticator();
        let tables = PolicyTables::compile().expect("tables");
        let pipeline = RequestPipeline::new(&auth, &tables);
        let token = token(&auth);

        let prepared = pipeline
            .prepare(
                Endpoint::Query,
                Some(&token),
                Some(br#"{"cmd": "select * from t; DROP TABLE t"}"#),
            )
            .expect("prepared");
        assert_eq!(prepared.username, "matt");
        assert_eq!(prepared.keyword, "SELECT");
        assert_eq!(prepared.statement.as_str(), "select * from t");

        let rejected = pipeline
            .prepare(
                Endpoint::Modify,
                Some(&token),
                Some(br#"{"cmd": "DROP TABLE x"}"#),
            )
            .expect_err("rejected");
        assert_eq!(
            rejected.body(),
            json!({ "status": "badCommand : DROP TABLE x" })
        );
    }

    #[test]
    fn rejection_echoes_stacked_command_unchanged() {
        let auth = authenticator();
        let tables = PolicyTables::compile().expect("tables");
        let pipeline = RequestPipeline::new(&auth, &tables);
        let token = token(&auth);

        let outcome = pipeline
            .prepare(
                Endpoint::Add,
                Some(&token),
                Some(br#"{"cmd": "  INSERT INTO t VALUES (1); DROP TABLE t"}"#),
            )
            .expect_err("leading whitespace is not a keyword");
        assert_eq!(
            outcome,
            Outcome::Rejected {
                command: "  INSERT INTO t VALUES (1); DROP TABLE t".to_string()
            }
        );
    }

    #[test]
    fn login_outcomes() {
        let auth = authenticator();
        let tables = PolicyTables::compile().expect("tables");
        let pipeline = RequestPipeline::new(&auth, &tables);

        assert_eq!(pipeline.login(None), LoginOutcome::InvalidJson);
        assert_eq!(pipeline.login(Some(b"nope")), LoginOutcome::InvalidJson);
        assert_eq!(
            pipeline.login(Some(br#"{"usr": "matt"}"#)),
            LoginOutcome::InvalidCredentials
        );
        assert_eq!(
            pipeline.login(Some(br#"{"usr": "matt", "pwd": "wrong"}"#)),
            LoginOutcome::InvalidCredentials
        );

        let outcome = pipeline.login(Some(br#"{"usr": "matt", "pwd": "s3cret"}"#));
        let LoginOutcome::Success { username, token, .. } = &outcome else {
            panic!("expected success, got {outcome:?}");
        };
        assert_eq!(username, "matt");
        assert_eq!(
            auth.authenticate(Some(token.as_str())),
            AuthResult::Authenticated("matt".to_string())
        );
        let status = outcome.body()["status"].as_str().unwrap_or_default().to_string();
        assert!(status.starts_with("Login success at "), "{status}");
        assert!(status.ends_with(" UNIX time"), "{status}");
    }

    #[test]
    fn endpoints_are_bound_to_one_table_each() {
        let categories: Vec<_> = Endpoint::ALL.iter().map(|e| e.category()).collect();
        assert_eq!(categories, StatementCategory::ALL);
        assert!(!Endpoint::Query.category().is_mutating());
        assert_eq!(Endpoint::Remove.path(), "/remove");
    }

    #[test]
    fn outcome_bodies_match_response_shapes() {
        assert_eq!(
            Outcome::MalformedRequest(Malformed::MissingCommand).body(),
            json!({ "status": "No sql command" })
        );
        assert_eq!(
            Outcome::Success { rows: None }.body(),
            json!({ "result": "Transaction Success" })
        );
        assert_eq!(
            Outcome::Success {
                rows: Some(vec![vec![json!(1), json!("a")]])
            }
            .body(),
            json!({ "result": [[1, "a"]] })
        );
        assert_eq!(
            Outcome::Warning("careful".to_string()).body(),
            json!({ "warning": "careful" })
        );
        assert_eq!(
            Outcome::Error("boom".to_string()).body(),
            json!({ "error": "boom" })
        );
    }
}
