use crate::config::PollingConfig;

use super::{CallProvider, ProviderError};

/// Where to monitor and steer a live call.
#[derive(Debug, Clone, PartialEq)]
pub struct ListenTarget {
    pub listen_url: String,
    pub control_url: String,
    /// Number of status lookups it took to resolve.
    pub attempts: u32,
}

impl ListenTarget {
    pub fn from_listen_url(listen_url: impl Into<String>, attempts: u32) -> Self {
        let listen_url = listen_url.into();
        Self {
            control_url: derive_control_url(&listen_url),
            listen_url,
            attempts,
        }
    }
}

/// Map a provider listen URL to its control endpoint.
///
/// `wss://host/<id>/listen` becomes `https://host/<id>/control`. Input that is
/// already a control URL comes back unchanged.
pub fn derive_control_url(listen_url: &str) -> String {
    let (scheme, rest) = if let Some(rest) = listen_url.strip_prefix("wss://") {
        ("https://", rest)
    } else if let Some(rest) = listen_url.strip_prefix("ws://") {
        ("http://", rest)
    } else {
        ("", listen_url)
    };

    let (path, query) = match rest.find('?') {
        Some(idx) => rest.split_at(idx),
        None => (rest, ""),
    };

    let path = match path.strip_suffix("/listen") {
        Some(base) => format!("{base}/control"),
        None => path.to_string(),
    };

    format!("{scheme}{path}{query}")
}

/// Poll the provider until the call is `in-progress` with a listen URL.
///
/// Looks the call up immediately, then every `resolve_interval` for at most
/// `resolve_attempts` lookups. Failed lookups are logged and use up an attempt
/// like any other.
pub async fn resolve_listen_url(
    provider: &dyn CallProvider,
    call_id: &str,
    polling: &PollingConfig,
) -> Result<ListenTarget, ProviderError> {
    let attempts = polling.resolve_attempts();

    for attempt in 1..=attempts {
        match provider.call_status(call_id).await {
            Ok(status) => {
                tracing::debug!(call_id, attempt, status = %status.status, "Polled call status");
                if let Some(url) = status.ready_listen_url() {
                    tracing::info!(call_id, attempt, listen_url = %url, "Listen URL available");
                    return Ok(ListenTarget::from_listen_url(url, attempt));
                }
            }
            Err(e) => {
                tracing::warn!(call_id, attempt, "Call lookup failed while resolving listen URL: {e}");
            }
        }

        if attempt < attempts {
            tokio::time::sleep(polling.resolve_interval()).await;
        }
    }

    tracing::error!(call_id, attempts, "Listen URL not available after polling");
    Err(ProviderError::ResolutionTimeout { attempts })
}
