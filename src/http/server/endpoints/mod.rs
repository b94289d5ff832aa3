pub mod login;
pub mod oauth;

use std::sync::Arc;

use warp::Filter;

use super::Context;

pub(crate) fn with_context<A: Send + Sync + 'static>(
    context: Arc<Context<A>>,
) -> impl Filter<Extract = (Arc<Context<A>>,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || context.clone())
}
