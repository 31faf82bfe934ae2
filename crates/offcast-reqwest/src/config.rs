//! Configuration for the remote queue client.

use std::time::Duration;

use url::Url;

/// Default timeout for control-plane calls (submit, history, cancel):
/// 4 seconds.
pub const DEFAULT_CONTROL_TIMEOUT: Duration = Duration::from_secs(4);

/// Default timeout for data-plane transfers (upload, download):
/// 30 seconds.
pub const DEFAULT_DATA_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for the HTTP remote queue client.
#[derive(Debug, Clone)]
pub struct RemoteClientConfig {
    /// Base URL of the remote worker.
    pub endpoint: Url,
    /// Timeout for control-plane calls.
    pub control_timeout: Duration,
    /// Timeout for data-plane transfers.
    pub data_timeout: Duration,
    /// User-Agent header to send with requests.
    pub user_agent: String,
}

impl RemoteClientConfig {
    /// Creates a configuration for one endpoint with default timeouts.
    pub fn new(endpoint: Url) -> Self {
        Self {
            endpoint,
            control_timeout: DEFAULT_CONTROL_TIMEOUT,
            data_timeout: DEFAULT_DATA_TIMEOUT,
            user_agent: Self::default_user_agent(),
        }
    }

    /// Returns the default user agent string.
    fn default_user_agent() -> String {
        format!("offcast/{}", env!("CARGO_PKG_VERSION"))
    }

    /// Sets the control-plane timeout.
    pub fn with_control_timeout(mut self, timeout: Duration) -> Self {
        self.control_timeout = timeout;
        self
    }

    /// Sets the data-plane timeout.
    pub fn with_data_timeout(mut self, timeout: Duration) -> Self {
        self.data_timeout = timeout;
        self
    }

    /// Sets the user agent.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Returns the effective control timeout, using default if zero.
    pub fn effective_control_timeout(&self) -> Duration {
        if self.control_timeout.is_zero() {
            DEFAULT_CONTROL_TIMEOUT
        } else {
            self.control_timeout
        }
    }

    /// Returns the effective data timeout, using default if zero.
    pub fn effective_data_timeout(&self) -> Duration {
        if self.data_timeout.is_zero() {
            DEFAULT_DATA_TIMEOUT
        } else {
            self.data_timeout
        }
    }

    /// Returns the endpoint label used in job keys and logs: the URL
    /// without a trailing slash.
    pub fn endpoint_label(&self) -> String {
        self.endpoint.as_str().trim_end_matches('/').to_owned()
    }
}
