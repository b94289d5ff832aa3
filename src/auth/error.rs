/// The canonical OAuth 2.0 error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[derive(serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidRequest,
    UnauthorizedClient,
    AccessDenied,
    UnsupportedResponseType,
    InvalidScope,
    ServerError,
    TemporarilyUnavailable,
    InvalidClient,
    InvalidGrant,
    UnsupportedGrantType,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::UnauthorizedClient => "unauthorized_client",
            Self::AccessDenied => "access_denied",
            Self::UnsupportedResponseType => "unsupported_response_type",
            Self::InvalidScope => "invalid_scope",
            Self::ServerError => "server_error",
            Self::TemporarilyUnavailable => "temporarily_unavailable",
            Self::InvalidClient => "invalid_client",
            Self::InvalidGrant => "invalid_grant",
            Self::UnsupportedGrantType => "unsupported_grant_type",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[derive(serde::Serialize)]
pub struct ErrorResponse {
    #[serde(rename = "error")]
    pub kind: ErrorKind,
    #[serde(rename = "error_description")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "error_uri")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
}

impl From<ErrorKind> for ErrorResponse {
    fn from(kind: ErrorKind) -> Self {
        Self {
            kind,
            description: None,
            uri: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_bare_error_code() {
        let body = serde_json::to_value(ErrorResponse::from(ErrorKind::InvalidGrant)).unwrap();
        assert_eq!(body, serde_json::json!({ "error": "invalid_grant" }));
    }

    #[test]
    fn wire_names_match_as_str() {
        for kind in [
            ErrorKind::InvalidRequest,
            ErrorKind::UnauthorizedClient,
            ErrorKind::AccessDenied,
            ErrorKind::UnsupportedResponseType,
            ErrorKind::InvalidScope,
            ErrorKind::ServerError,
            ErrorKind::TemporarilyUnavailable,
            ErrorKind::InvalidClient,
            ErrorKind::InvalidGrant,
            ErrorKind::UnsupportedGrantType,
        ] {
            let value = serde_json::to_value(kind).unwrap();
            assert_eq!(value, serde_json::Value::String(kind.as_str().to_string()));
        }
    }
}
