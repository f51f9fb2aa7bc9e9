use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};

use sql_gate::pipeline::{Endpoint, LoginOutcome, Outcome, RequestPipeline};

fn outcome_status(outcome: &Outcome) -> StatusCode {
    match outcome {
        Outcome::Unauthenticated => StatusCode::UNAUTHORIZED,
        Outcome::MalformedRequest(_) => StatusCode::BAD_REQUEST,
        Outcome::Rejected { .. } => StatusCode::FORBIDDEN,
        Outcome::Success { .. } => StatusCode::OK,
        Outcome::Warning(_) | Outcome::Error(_) => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

fn login_status(outcome: &LoginOutcome) -> StatusCode {
    match outcome {
        LoginOutcome::Success { .. } => StatusCode::OK,
        LoginOutcome::InvalidJson => StatusCode::BAD_REQUEST,
        LoginOutcome::InvalidCredentials => StatusCode::UNAUTHORIZED,
    }
}

pub(super) async fn login(
    State(state): State<super::AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let pipeline = RequestPipeline::new(&state.inner.authenticator, &state.inner.tables);
    let outcome = pipeline.login(super::session::json_body(&headers, &body));
    let status = login_status(&outcome);
    let mut resp = (status, Json(outcome.body())).into_response();

    match &outcome {
        LoginOutcome::Success { username, token, .. } => {
            tracing::info!(user = %username, "login succeeded");
            match super::session::set_cookie(&state.inner.config.session, token) {
                Some(cookie) => {
                    resp.headers_mut().insert(header::SET_COOKIE, cookie);
                }
                None => {
                    tracing::error!(user = %username, "session cookie is not a valid header value");
                    return super::err_response(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "internal error",
                    );
                }
            }
        }
        other => tracing::debug!(outcome = other.kind(), "login failed"),
    }
    resp
}

async fn statement(
    state: super::AppState,
    endpoint: Endpoint,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let cookie_name = &state.inner.config.session.cookie_name;
    let session_token = super::session::session_cookie(&headers, cookie_name);
    let json_body = super::session::json_body(&headers, &body);

    let pipeline = RequestPipeline::new(&state.inner.authenticator, &state.inner.tables);
    let prepared = pipeline.prepare(endpoint, session_token, json_body);

    let (username, outcome) = match prepared {
        Err(outcome) => (None, outcome),
        Ok(prepared) => {
            let username = prepared.username.clone();
            let keyword = prepared.keyword;
            let permit = match state.inner.io_concurrency.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    return super::err_response(StatusCode::SERVICE_UNAVAILABLE, "server is busy");
                }
            };
            tracing::debug!(user = %username, keyword, endpoint = endpoint.as_str(), "statement accepted");
            match super::runner::run_statement(state.clone(), permit, prepared).await {
                Ok(outcome) => (Some(username), outcome),
                Err(resp) => return resp.into_response(),
            }
        }
    };

    tracing::info!(
        endpoint = endpoint.as_str(),
        category = %endpoint.category(),
        user = username.as_deref().unwrap_or("-"),
        outcome = outcome.kind(),
        "statement handled"
    );
    (outcome_status(&outcome), Json(outcome.body())).into_response()
}

pub(super) async fn query(
    State(state): State<super::AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    statement(state, Endpoint::Query, headers, body).await
}

pub(super) async fn modify(
    State(state): State<super::AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    statement(state, Endpoint::Modify, headers, body).await
}

pub(super) async fn add(
    State(state): State<super::AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    statement(state, Endpoint::Add, headers, body).await
}

pub(super) async fn remove(
    State(state): State<super::AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    statement(state, Endpoint::Remove, headers, body).await
}

#[cfg(test)]
mod tests {
    use sql_gate::pipeline::Malformed;

    use super::*;

    #[test]
    fn every_terminal_state_has_a_distinct_status_class() {
        assert_eq!(
            outcome_status(&Outcome::Unauthenticated),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            outcome_status(&Outcome::MalformedRequest(Malformed::InvalidJson)),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            outcome_status(&Outcome::Rejected {
                command: "DROP TABLE t".to_string()
            }),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            outcome_status(&Outcome::Success { rows: None }),
            StatusCode::OK
        );
        assert_eq!(
            outcome_status(&Outcome::Warning("w".to_string())),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            outcome_status(&Outcome::Error("e".to_string())),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            login_status(&LoginOutcome::InvalidCredentials),
            StatusCode::UNAUTHORIZED
        );
    }
}
