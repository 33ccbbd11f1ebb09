use thiserror::Error;

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Failure classes a gateway call can end in. Coordinators decide per
/// operation what each class does to their state.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("interactive authentication required")]
    AuthRequired { authorize_url: Option<String> },

    #[error("gateway call `{endpoint}` failed{}: {detail}", .status.map(|s| format!(" with {s}")).unwrap_or_default())]
    RemoteCallFailed {
        endpoint: String,
        status: Option<u16>,
        detail: String,
    },

    #[error("gateway call `{endpoint}` returned a malformed body: {reason}")]
    MalformedResponse { endpoint: String, reason: String },
}

impl GatewayError {
    pub fn remote(endpoint: impl Into<String>, status: Option<u16>, detail: impl Into<String>) -> Self {
        GatewayError::RemoteCallFailed {
            endpoint: endpoint.into(),
            status,
            detail: detail.into(),
        }
    }

    pub fn malformed(endpoint: impl Into<String>, reason: impl Into<String>) -> Self {
        GatewayError::MalformedResponse {
            endpoint: endpoint.into(),
            reason: reason.into(),
        }
    }

    pub fn is_auth_required(&self) -> bool {
        matches!(self, GatewayError::AuthRequired { .. })
    }
}
