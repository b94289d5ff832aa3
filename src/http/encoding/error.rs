use tracing::{event, Level};
use warp::http::StatusCode;
use warp::{Rejection, Reply};

use crate::auth::{ErrorKind, ErrorResponse, MaybeRedirect, Redirect, WithState};
use crate::provider::error::Error;

use super::reply::no_store;

/// The endpoint a failure happened at, for the logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Authorize,
    Token,
    TokenInfo,
    UserInfo,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Authorize => "authorize",
            Self::Token => "token",
            Self::TokenInfo => "tokeninfo",
            Self::UserInfo => "userinfo",
        }
    }
}

#[derive(Debug, Clone)]
pub enum AuthRejection {
    Redirect(Redirect<WithState<ErrorResponse>>),
    Json { status: u16, body: ErrorResponse },
}

impl warp::reject::Reject for AuthRejection {}

impl AuthRejection {
    /// Logs `error` and keeps only what may be shown to the client.
    pub fn from_error(stage: Stage, error: Error, default_status: u16) -> Self {
        if error.is_internal() {
            event!(Level::ERROR, stage = stage.as_str(), error = %error, "Request failed");
        } else {
            event!(Level::DEBUG, stage = stage.as_str(), error = %error, "Request rejected");
        }

        Self::Json {
            status: error.status(default_status),
            body: ErrorResponse::from(&error),
        }
    }

    pub fn from_authorization(
        error: MaybeRedirect<WithState<ErrorResponse>, Error>,
        default_status: u16,
    ) -> Self {
        match error {
            MaybeRedirect::Redirected(r) => Self::Redirect(r),
            MaybeRedirect::Direct(e) => Self::from_error(Stage::Authorize, e, default_status),
        }
    }
}

impl From<Redirect<WithState<ErrorResponse>>> for AuthRejection {
    fn from(error: Redirect<WithState<ErrorResponse>>) -> Self {
        Self::Redirect(error)
    }
}

pub async fn handle_reject(err: Rejection) -> Result<impl Reply, Rejection> {
    match err.find::<AuthRejection>() {
        Some(AuthRejection::Redirect(r)) => Ok(r.clone().into_response()),
        Some(AuthRejection::Json { status, body }) => {
            let status = StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_REQUEST);
            let mut response =
                warp::reply::with_status(warp::reply::json(body), status).into_response();

            if body.kind == ErrorKind::InvalidClient {
                response.headers_mut().insert(
                    "www-authenticate",
                    warp::http::HeaderValue::from_static("Basic realm=\"kagi\""),
                );
            }

            Ok(no_store(response))
        }
        None => Err(err),
    }
}
