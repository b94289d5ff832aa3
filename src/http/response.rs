use tracing::{event, Level};
use url::Url;
use warp::http::StatusCode;
use warp::reply::{Reply, Response};

use crate::auth::{Redirect, RedirectMode};

use super::encoding::reply::no_store;

fn append_params(r: &Redirect<impl serde::Serialize>) -> Result<Url, String> {
    let mut url = Url::parse(r.uri.as_ref()).map_err(|e| e.to_string())?;
    let encoded = serde_urlencoded::to_string(&r.params).map_err(|e| e.to_string())?;

    match r.mode {
        RedirectMode::Query => {
            let pairs = form_urlencoded::parse(encoded.as_bytes());
            url.query_pairs_mut().extend_pairs(pairs);
        }
        RedirectMode::Fragment => url.set_fragment(Some(&encoded)),
    }

    Ok(url)
}

impl<T: serde::Serialize + Send> Reply for Redirect<T> {
    fn into_response(self) -> Response {
        match append_params(&self) {
            Ok(url) => no_store(warp::reply::with_header(
                StatusCode::FOUND,
                "location",
                url.to_string(),
            )),
            Err(e) => {
                event!(Level::ERROR, error = %e, uri = self.uri.as_ref(), "Failed to build redirect");
                no_store(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }
}
