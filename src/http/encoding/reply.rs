use warp::http::HeaderValue;
use warp::reply::{Reply, Response};
use warp::Rejection;

use super::error::AuthRejection;

/// Marks a response as uncacheable. Applied to everything that carries
/// tokens, codes or their errors.
pub fn no_store(reply: impl Reply) -> Response {
    let mut response = reply.into_response();
    let headers = response.headers_mut();
    headers.insert("cache-control", HeaderValue::from_static("no-store"));
    headers.insert("pragma", HeaderValue::from_static("no-cache"));
    response
}

pub fn json_encode(
    value: Result<impl serde::Serialize, impl Into<AuthRejection>>,
) -> Result<Response, Rejection> {
    value
        .map(|v| no_store(warp::reply::json(&v)))
        .map_err(|e| warp::reject::custom::<AuthRejection>(e.into()))
}

pub fn accept<T, E>(result: Result<T, E>) -> Result<T, Rejection>
where
    E: Into<AuthRejection>,
{
    result.map_err(|e| warp::reject::custom(e.into()))
}

pub fn reply<T, E>(result: Result<T, E>) -> Result<Response, Rejection>
where
    T: Reply,
    E: Into<AuthRejection>,
{
    result
        .map(|t| t.into_response())
        .map_err(|e| warp::reject::custom(e.into()))
}
