use std::env;

use thiserror::Error;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessorSettings {
    /// Converts panics of called functions into "Internal RPC error".
    pub catch_exceptions: bool,
    /// Logs contained panics. Requires `catch_exceptions`.
    pub log_exceptions: bool,
    pub count_requests: bool,
    /// Metadata field receiving the call duration in milliseconds.
    pub duration_field_name: Option<String>,
    /// Metadata field exposing the request id to the called function while
    /// it runs. The field is removed again before the response is sent.
    pub request_id_field_name: Option<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("enable exception capture to log them")]
    LogExceptionsWithoutCapture,
    #[error("meta data field name conflict")]
    MetaFieldNameConflict,
    #[error("meta data field name must not be empty")]
    EmptyMetaFieldName,
    #[error("error in client settings")]
    InvalidClientSettings,
    #[error("invalid custom header: {0}")]
    InvalidHeader(String),
    #[error("{0} must be a boolean")]
    InvalidBool(&'static str),
}

impl ProcessorSettings {
    pub fn check(&self) -> Result<(), ConfigError> {
        if self.log_exceptions && !self.catch_exceptions {
            return Err(ConfigError::LogExceptionsWithoutCapture);
        }

        let names = [&self.duration_field_name, &self.request_id_field_name];
        if names.iter().any(|name| name.as_deref() == Some("")) {
            return Err(ConfigError::EmptyMetaFieldName);
        }

        if let (Some(duration), Some(request_id)) =
            (&self.duration_field_name, &self.request_id_field_name)
        {
            if duration == request_id {
                return Err(ConfigError::MetaFieldNameConflict);
            }
        }

        Ok(())
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let flag = |key: &'static str| -> Result<bool, ConfigError> {
            lookup(key)
                .map(|value| parse_bool(&value).ok_or(ConfigError::InvalidBool(key)))
                .transpose()
                .map(|value| value.unwrap_or(false))
        };
        let field_name = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let settings = Self {
            catch_exceptions: flag("M1_CATCH_EXCEPTIONS")?,
            log_exceptions: flag("M1_LOG_EXCEPTIONS")?,
            count_requests: flag("M1_COUNT_REQUESTS")?,
            duration_field_name: field_name("M1_DURATION_FIELD"),
            request_id_field_name: field_name("M1_REQUEST_ID_FIELD"),
        };

        settings.check()?;
        Ok(settings)
    }

    pub(crate) fn is_duration_enabled(&self) -> bool {
        self.duration_field_name.is_some()
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub scheme: String,
    pub host: String,
    pub port: u16,
    /// Path the requests are posted to, usually `/`.
    pub path: String,
    /// Custom HTTP client. A default client is built when absent.
    pub http_client: Option<reqwest::Client>,
    /// Extra headers set on every request.
    pub headers: Vec<(String, String)>,
    /// Escapes `<`, `>` and `&` in the encoded request text.
    pub escape_html: bool,
    /// Allows at most one call in flight per client instance.
    pub serialize_calls: bool,
}

impl ClientSettings {
    pub fn new(
        scheme: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        path: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let settings = Self {
            scheme: scheme.into(),
            host: host.into(),
            port,
            path: path.into(),
            http_client: None,
            headers: Vec::new(),
            escape_html: false,
            serialize_calls: false,
        };

        settings.check()?;
        Ok(settings)
    }

    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_html_escaping(mut self, enabled: bool) -> Self {
        self.escape_html = enabled;
        self
    }

    pub fn with_serialized_calls(mut self, enabled: bool) -> Self {
        self.serialize_calls = enabled;
        self
    }

    pub fn check(&self) -> Result<(), ConfigError> {
        if self.scheme.is_empty() || self.host.is_empty() || self.port == 0 || self.path.is_empty()
        {
            return Err(ConfigError::InvalidClientSettings);
        }

        Ok(())
    }

    pub fn url(&self) -> String {
        format!("{}://{}:{}{}", self.scheme, self.host, self.port, self.path)
    }
}
