use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;

use tokio::sync::mpsc;
use uuid::Uuid;
use warp::http::{StatusCode, Uri, header};
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};

use crate::clients::oauth_client::TokenExchanger;
use crate::models::session::Session;

pub const STATE_COOKIE: &str = "state";
const STATE_MAX_AGE_SECONDS: u32 = 300;

const INDEX_PAGE: &str = "<html><head><title>Calendar Reminder</title></head><body><p><a href='/token'>Sign in</a> to your Microsoft account to start monitoring calendar events</p></body></html>";

/// Shared state of the interactive authorization endpoints.
#[derive(Clone)]
pub struct AuthState {
    pub exchanger: Arc<dyn TokenExchanger>,
    pub sessions: mpsc::Sender<Session>,
}

pub fn routes(state: AuthState) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    let with_state = warp::any().map(move || state.clone());

    let index = warp::path::end().and(warp::get()).and_then(index);

    let token = warp::path("token")
        .and(warp::path::end())
        .and(warp::get())
        .and(warp::cookie::optional::<String>(STATE_COOKIE))
        .and(with_state.clone())
        .and_then(token);

    let callback = warp::path("callback")
        .and(warp::path::end())
        .and(warp::get())
        .and(warp::cookie::optional::<String>(STATE_COOKIE))
        .and(warp::query::<HashMap<String, String>>())
        .and(with_state)
        .and_then(callback);

    index.or(token).unify().or(callback).unify()
}

fn error(status: StatusCode, message: impl Into<String>) -> Response {
    warp::reply::with_status(message.into(), status).into_response()
}

pub async fn index() -> Result<Response, Infallible> {
    let state = Uuid::new_v4().to_string();
    let cookie = format!(
        "{STATE_COOKIE}={state}; Path=/; HttpOnly; Max-Age={STATE_MAX_AGE_SECONDS}"
    );
    Ok(warp::reply::with_header(warp::reply::html(INDEX_PAGE), header::SET_COOKIE, cookie)
        .into_response())
}

pub async fn token(cookie: Option<String>, state: AuthState) -> Result<Response, Infallible> {
    let Some(csrf_state) = cookie else {
        return Ok(error(StatusCode::BAD_REQUEST, "no state cookie found"));
    };
    let location = match state.exchanger.authorize_url(&csrf_state) {
        Ok(url) => url,
        Err(e) => return Ok(error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    };
    match location.parse::<Uri>() {
        Ok(uri) => Ok(warp::redirect::found(uri).into_response()),
        Err(e) => Ok(error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    }
}

pub async fn callback(
    cookie: Option<String>,
    query: HashMap<String, String>,
    state: AuthState,
) -> Result<Response, Infallible> {
    let Some(csrf_state) = cookie else {
        return Ok(error(StatusCode::BAD_REQUEST, "no state cookie found"));
    };
    if query.get("state") != Some(&csrf_state) {
        return Ok(error(StatusCode::BAD_REQUEST, "state did not match"));
    }
    if let Some(reason) = query.get("error") {
        let detail = query.get("error_description").map(String::as_str).unwrap_or("");
        return Ok(error(
            StatusCode::BAD_REQUEST,
            format!("Authorization failed: {reason} {detail}").trim_end().to_string(),
        ));
    }
    let code = query.get("code").map(String::as_str).unwrap_or_default();

    let session = match state.exchanger.exchange_code(code).await {
        Ok(session) => session,
        Err(e) => {
            return Ok(error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to exchange token: {e}"),
            ));
        }
    };
    if state.sessions.send(session).await.is_err() {
        return Ok(error(StatusCode::INTERNAL_SERVER_ERROR, "session queue closed"));
    }

    let expired = format!("{STATE_COOKIE}=; Path=/; Max-Age=0");
    Ok(warp::reply::with_header("OK", header::SET_COOKIE, expired).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ReminderError, Result};
    use async_trait::async_trait;

    struct FakeExchanger {
        fail: bool,
    }

    #[async_trait]
    impl TokenExchanger for FakeExchanger {
        fn authorize_url(&self, state: &str) -> Result<String> {
            Ok(format!("https://login.example.com/authorize?state={state}"))
        }

        async fn exchange_code(&self, code: &str) -> Result<Session> {
            if self.fail {
                return Err(ReminderError::OAuth("invalid_grant".to_string()));
            }
            Ok(Session::new(format!("token-for-{code}")))
        }

        async fn renew(&self, session: &Session) -> Result<Session> {
            Ok(session.clone())
        }
    }

    fn state(fail: bool) -> (AuthState, mpsc::Receiver<Session>) {
        let (tx, rx) = mpsc::channel(1);
        (
            AuthState {
                exchanger: Arc::new(FakeExchanger { fail }),
                sessions: tx,
            },
            rx,
        )
    }

    fn query(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn index_sets_http_only_state_cookie() {
        let response = index().await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
        assert!(cookie.starts_with("state="));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("Max-Age=300"));
    }

    #[tokio::test]
    async fn token_redirects_with_cookie_state() {
        let (state, _rx) = state(false);
        let response = token(Some("abc".to_string()), state).await.unwrap();
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            response.headers()[header::LOCATION],
            "https://login.example.com/authorize?state=abc"
        );
    }

    #[tokio::test]
    async fn token_without_cookie_is_bad_request() {
        let (state, _rx) = state(false);
        let response = token(None, state).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn callback_rejects_state_mismatch() {
        let (state, mut rx) = state(false);
        let response = callback(
            Some("abc".to_string()),
            query(&[("state", "other"), ("code", "c1")]),
            state,
        )
        .await
        .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn callback_queues_exchanged_session() {
        let (state, mut rx) = state(false);
        let response = callback(
            Some("abc".to_string()),
            query(&[("state", "abc"), ("code", "c1")]),
            state,
        )
        .await
        .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(
            response.headers()[header::SET_COOKIE]
                .to_str()
                .unwrap()
                .contains("Max-Age=0")
        );
        assert_eq!(rx.try_recv().unwrap().access_token, "token-for-c1");
    }

    #[tokio::test]
    async fn callback_reports_exchange_failure() {
        let (state, mut rx) = state(true);
        let response = callback(
            Some("abc".to_string()),
            query(&[("state", "abc"), ("code", "c1")]),
            state,
        )
        .await
        .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(rx.try_recv().is_err());
    }
}
