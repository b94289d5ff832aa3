use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{event, Level};
use warp::Filter;

use crate::backend::AuthenticatorBackend;
use crate::http::login::LoginHandler;
use crate::provider::OAuth2Provider;

mod endpoints;

use endpoints::{login::login_endpoint, oauth::oauth_endpoint};

use super::encoding::error::handle_reject;

/// Shared by every request.
pub(crate) struct Context<A> {
    pub provider: Arc<OAuth2Provider>,
    pub backend: Arc<A>,
    pub login: Arc<dyn LoginHandler>,
}

impl<A> Context<A> {
    pub fn error_status(&self) -> u16 {
        self.provider.config().error_status_code
    }
}

pub struct Server<A> {
    context: Arc<Context<A>>,
}

impl<A> std::fmt::Debug for Server<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("provider", &self.context.provider)
            .finish()
    }
}

impl<A: AuthenticatorBackend + 'static> Server<A> {
    pub fn new(
        provider: Arc<OAuth2Provider>,
        backend: Arc<A>,
        login: Arc<dyn LoginHandler>,
    ) -> Self {
        Self {
            context: Arc::new(Context {
                provider,
                backend,
                login,
            }),
        }
    }

    pub fn routes(
        &self,
    ) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
        let context = Arc::clone(&self.context);

        oauth_endpoint(context.clone())
            .or(login_endpoint(context))
            .recover(handle_reject)
            .with(warp::log("kagi::http"))
    }

    pub async fn serve(self, addr: impl Into<SocketAddr>) {
        let addr = addr.into();
        event!(Level::INFO, %addr, "Listening");
        warp::serve(self.routes()).run(addr).await;
    }
}
