use std::sync::Arc;

use tracing::{event, Level};
use warp::http::Method;
use warp::reply::Response;
use warp::{Filter, Rejection};

use crate::auth::{
    Authorization, AuthorizationQuery, ClientCredentials, Grant, InfoQuery, TokenForm,
};
use crate::backend::{verify_assertion, verify_credentials, AuthError, AuthenticatorBackend};
use crate::core::types::{Password, UserData};
use crate::http::encoding::error::{AuthRejection, Stage};
use crate::http::encoding::{self, reply, Params};
use crate::http::login::{LoginView, INVALID_CREDENTIALS, SERVICE_UNAVAILABLE};
use crate::http::server::Context;
use crate::provider::error::Error;

use super::with_context;

fn rejection<A>(context: &Context<A>, stage: Stage) -> impl Fn(Error) -> Rejection + '_ {
    move |e| warp::reject::custom(AuthRejection::from_error(stage, e, context.error_status()))
}

pub(crate) fn oauth_endpoint<A: AuthenticatorBackend + 'static>(
    context: Arc<Context<A>>,
) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    let authorize = warp::path!("authorize")
        .and(warp::get().or(warp::post()).unify())
        .and(with_context(context.clone()))
        .and(warp::method())
        .and(encoding::params())
        .and_then(authorize::<A>);

    let token = warp::path!("token")
        .and(warp::get().or(warp::post()).unify())
        .and(with_context(context.clone()))
        .and(warp::method())
        .and(encoding::basic_credentials())
        .and(encoding::params())
        .and_then(token::<A>);

    let tokeninfo = warp::path!("tokeninfo")
        .and(warp::get())
        .and(with_context(context.clone()))
        .and(encoding::bearer())
        .and(encoding::params())
        .and_then(tokeninfo::<A>);

    let userinfo = warp::path!("userinfo")
        .and(warp::get())
        .and(with_context(context))
        .and(encoding::bearer())
        .and(encoding::params())
        .and_then(userinfo::<A>);

    authorize
        .or(token)
        .unify()
        .or(tokeninfo)
        .unify()
        .or(userinfo)
        .unify()
}

/// Admits the request, then either shows the login page or completes the
/// flow with the credentials posted from it.
#[tracing::instrument(skip_all, fields(stage = "authorize"))]
async fn authorize<A: AuthenticatorBackend + 'static>(
    context: Arc<Context<A>>,
    method: Method,
    params: Params,
) -> Result<Response, Rejection> {
    let query: AuthorizationQuery = params
        .decode()
        .map_err(rejection(&context, Stage::Authorize))?;

    let req = reply::accept(
        context
            .provider
            .handle_authorize(query)
            .await
            .map_err(|e| AuthRejection::from_authorization(e, context.error_status())),
    )?;

    let view = LoginView::new(&req.query);

    if method != Method::POST {
        return Ok(context.login.render(&view));
    }

    if params.has("deny") {
        let result = context
            .provider
            .finish_authorize(req, Authorization::Denied)
            .await;
        return reply::reply(result);
    }

    let (username, password) = match (params.get("username"), params.get("password")) {
        (None, None) => return Ok(context.login.render(&view)),
        (username, password) => (
            username.unwrap_or_default(),
            Password(password.unwrap_or_default().to_string()),
        ),
    };

    if username.is_empty() {
        return Ok(context.login.render(&view.with_error(INVALID_CREDENTIALS)));
    }

    match verify_credentials(context.backend.as_ref(), username, &password).await {
        Ok(user) => {
            event!(Level::DEBUG, user = %user, "Resource owner authenticated");
            let result = context
                .provider
                .finish_authorize(req, Authorization::Granted(UserData::from(user)))
                .await;
            reply::reply(result)
        }
        Err(AuthError::BackendUnavailable(e)) => {
            event!(Level::WARN, error = %e, "Authenticator unavailable");
            Ok(context.login.render(&view.with_error(SERVICE_UNAVAILABLE)))
        }
        Err(_) => {
            event!(Level::DEBUG, "Resource owner credentials rejected");
            Ok(context.login.render(&view.with_error(INVALID_CREDENTIALS)))
        }
    }
}

#[tracing::instrument(skip_all, fields(stage = "token"))]
async fn token<A: AuthenticatorBackend + 'static>(
    context: Arc<Context<A>>,
    method: Method,
    credentials: Option<ClientCredentials>,
    params: Params,
) -> Result<Response, Rejection> {
    let reject = rejection(&context, Stage::Token);

    let form: TokenForm = params.decode().map_err(&reject)?;
    let mut req = context
        .provider
        .handle_access(form, credentials, method == Method::GET)
        .await
        .map_err(&reject)?;

    let verified = match &req.grant {
        Grant::Password { username, password } => {
            Some(verify_credentials(context.backend.as_ref(), username, password).await)
        }
        Grant::Assertion {
            assertion_type,
            assertion,
        } => Some(verify_assertion(context.backend.as_ref(), assertion_type, assertion).await),
        _ => None,
    };

    let authorized = match verified {
        None => true,
        Some(Ok(user)) => {
            req.user_data = Some(UserData::from(user));
            true
        }
        Some(Err(AuthError::BackendUnavailable(e))) => {
            return Err(reject(AuthError::BackendUnavailable(e).into()));
        }
        Some(Err(_)) => false,
    };

    let response = context
        .provider
        .finish_access(req, authorized)
        .await
        .map_err(&reject)?;

    reply::json_encode(Ok::<_, AuthRejection>(response))
}

#[tracing::instrument(skip_all, fields(stage = "tokeninfo"))]
async fn tokeninfo<A: AuthenticatorBackend + 'static>(
    context: Arc<Context<A>>,
    bearer: Option<String>,
    params: Params,
) -> Result<Response, Rejection> {
    let reject = rejection(&context, Stage::TokenInfo);

    let query: InfoQuery = params.decode().map_err(&reject)?;
    let req = context
        .provider
        .handle_info(bearer, query)
        .await
        .map_err(&reject)?;

    reply::json_encode(Ok::<_, AuthRejection>(context.provider.finish_info(&req)))
}

#[tracing::instrument(skip_all, fields(stage = "userinfo"))]
async fn userinfo<A: AuthenticatorBackend + 'static>(
    context: Arc<Context<A>>,
    bearer: Option<String>,
    params: Params,
) -> Result<Response, Rejection> {
    let reject = rejection(&context, Stage::UserInfo);

    let query: InfoQuery = params.decode().map_err(&reject)?;
    let req = context
        .provider
        .handle_info(bearer, query)
        .await
        .map_err(&reject)?;
    let user = context.provider.token_user(&req).map_err(&reject)?;

    let profile = context
        .backend
        .get_user_by_id(&user)
        .await
        .map_err(|e| Error::Server(format!("profile lookup for {} failed: {}", user, e)))
        .map_err(&reject)?;

    reply::json_encode(Ok::<_, AuthRejection>(profile))
}
