use std::sync::Arc;

use warp::reply::Response;
use warp::{Filter, Rejection};

use crate::auth::AuthorizationQuery;
use crate::http::encoding::{self, error::{AuthRejection, Stage}};
use crate::http::login::LoginView;
use crate::http::server::Context;

use super::with_context;

/// Serves the login page on its own, so a client can link to it with the
/// OAuth parameters it would otherwise send to `/authorize`.
pub(crate) fn login_endpoint<A: Send + Sync + 'static>(
    context: Arc<Context<A>>,
) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    warp::path!("login")
        .and(warp::get())
        .and(with_context(context))
        .and(encoding::params())
        .and_then(|context: Arc<Context<A>>, params: encoding::Params| async move {
            let query: AuthorizationQuery = params.decode().map_err(|e| {
                warp::reject::custom(AuthRejection::from_error(
                    Stage::Authorize,
                    e,
                    context.error_status(),
                ))
            })?;

            Ok::<_, Rejection>(context.login.render(&LoginView::new(&query)))
        })
}
