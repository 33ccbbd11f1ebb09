pub mod conversation;
pub mod dashboard;
pub mod loading;
pub mod session;

#[cfg(test)]
mod test_support;

use core_types::GatewayError;
use tracing::{error, warn};

pub use conversation::{ConversationCoordinator, ConversationOptions, ConversationSnapshot};
pub use dashboard::{DashboardSession, SessionOptions};
pub use loading::{LoadingSet, OperationKey};
pub use session::{DATA_BACKED_SERVICES, SessionCoordinator, SessionSnapshot};

/// Coordinators swallow gateway failures; this is the one place they surface.
pub(crate) fn log_gateway_failure(operation: &'static str, err: &GatewayError) {
    match err {
        GatewayError::AuthRequired { authorize_url } => warn!(
            operation,
            authorize_url = authorize_url.as_deref().unwrap_or_default(),
            "gateway requires interactive authentication"
        ),
        GatewayError::RemoteCallFailed { .. } => {
            error!(operation, error = %err, "gateway call failed")
        }
        GatewayError::MalformedResponse { .. } => {
            warn!(operation, error = %err, "malformed gateway response not applied")
        }
    }
}
