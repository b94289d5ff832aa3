//! The credential entry page of the authorization flow.

use std::path::Path;

use handlebars::Handlebars;
use tracing::{event, Level};
use warp::http::StatusCode;
use warp::reply::{Reply, Response};

use crate::auth::AuthorizationQuery;

use super::encoding::reply::no_store;

pub const INVALID_CREDENTIALS: &str = "Invalid Credentials.";
pub const SERVICE_UNAVAILABLE: &str = "Service temporarily unavailable.";

/// What the login page gets to show. `action` posts back to `/authorize`
/// with the original OAuth parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
#[derive(serde::Serialize)]
pub struct LoginView {
    pub has_error: bool,
    pub error: String,
    pub action: String,
}

impl LoginView {
    pub fn new(query: &AuthorizationQuery) -> Self {
        let params = serde_urlencoded::to_string(query).unwrap_or_default();
        Self {
            has_error: false,
            error: String::new(),
            action: format!("/authorize?{}", params),
        }
    }

    pub fn with_error(self, error: &str) -> Self {
        Self {
            has_error: true,
            error: error.to_string(),
            ..self
        }
    }
}

pub trait LoginHandler: Send + Sync {
    fn render(&self, view: &LoginView) -> Response;
}

impl<F> LoginHandler for F
where
    F: Fn(&LoginView) -> Response + Send + Sync,
{
    fn render(&self, view: &LoginView) -> Response {
        self(view)
    }
}

const TEMPLATE: &str = "login";

/// Renders `login.hbs` from the configured template directory.
#[derive(Debug)]
pub struct TemplateLoginHandler {
    registry: Handlebars<'static>,
}

impl TemplateLoginHandler {
    pub fn from_dir(template_path: &Path) -> Result<Self, handlebars::TemplateError> {
        let mut registry = Self::registry();
        registry.register_template_file(TEMPLATE, template_path.join("login.hbs"))?;
        Ok(Self { registry })
    }

    pub fn from_template(template: &str) -> Result<Self, handlebars::TemplateError> {
        let mut registry = Self::registry();
        registry.register_template_string(TEMPLATE, template)?;
        Ok(Self { registry })
    }

    fn registry() -> Handlebars<'static> {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(true);
        registry
    }
}

impl LoginHandler for TemplateLoginHandler {
    fn render(&self, view: &LoginView) -> Response {
        match self.registry.render(TEMPLATE, view) {
            Ok(html) => no_store(warp::reply::html(html)),
            Err(e) => {
                event!(Level::ERROR, error = %e, "Failed to render login page");
                no_store(StatusCode::INTERNAL_SERVER_ERROR.into_response())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query() -> AuthorizationQuery {
        AuthorizationQuery {
            response_type: Some("code".into()),
            client_id: Some("c1".into()),
            state: Some("a&b".into()),
            ..AuthorizationQuery::default()
        }
    }

    #[test]
    fn action_keeps_the_oauth_parameters() {
        let view = LoginView::new(&query());
        assert_eq!(
            view.action,
            "/authorize?response_type=code&client_id=c1&state=a%26b"
        );
        assert!(!view.has_error);
    }

    #[tokio::test]
    async fn renders_errors_through_the_template() {
        let handler = TemplateLoginHandler::from_template(
            "{{#if has_error}}<p>{{error}}</p>{{/if}}<form action=\"{{action}}\"></form>",
        )
        .unwrap();

        let view = LoginView::new(&query()).with_error(INVALID_CREDENTIALS);
        let response = handler.render(&view);
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "text/html; charset=utf-8");

        let body = warp::hyper::body::to_bytes(response.into_body()).await.unwrap();
        let body = String::from_utf8(body.to_vec()).unwrap();
        assert!(body.contains("<p>Invalid Credentials.</p>"));
        assert!(body.contains("a%26b"));
    }

    #[test]
    fn closures_are_login_handlers() {
        let handler = |view: &LoginView| {
            warp::reply::with_status(view.error.clone(), StatusCode::OK).into_response()
        };
        let response = LoginHandler::render(&handler, &LoginView::new(&query()));
        assert_eq!(response.status(), StatusCode::OK);
    }
}
