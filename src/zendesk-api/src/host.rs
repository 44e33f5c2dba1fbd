//! Service URL handling.
//!
//! Operators configure the helpdesk as whatever they paste from the browser:
//! `acme.zendesk.com`, `https://acme.zendesk.com/`, or a deep link such as
//! `https://acme.zendesk.com/agent/tickets/1`. [`ServiceUrl`] normalizes all
//! of these, and [`ApiHost`] carries the account label the REST client is
//! scoped to.

use std::fmt;

use url::Url;

use crate::error::{ApiError, ApiResult};

/// Domain suffix of hosted Zendesk accounts.
const ZENDESK_DOMAIN: &str = "zendesk.com";

/// A normalized helpdesk base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceUrl {
    url: Url,
}

impl ServiceUrl {
    /// Parse a configured service URL.
    ///
    /// A missing scheme defaults to `https`. Path, query and fragment are
    /// discarded.
    pub fn parse(raw: &str) -> ApiResult<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ApiError::InvalidUrl("service URL is empty".to_string()));
        }

        let candidate = if trimmed.contains("://") {
            trimmed.to_string()
        } else {
            format!("https://{}", trimmed)
        };

        let mut url = Url::parse(&candidate)
            .map_err(|e| ApiError::InvalidUrl(format!("{}: {}", trimmed, e)))?;

        match url.host_str() {
            Some(host) if !host.is_empty() => {}
            _ => {
                return Err(ApiError::InvalidUrl(format!(
                    "{}: no host name",
                    trimmed
                )));
            }
        }

        url.set_path("");
        url.set_query(None);
        url.set_fragment(None);

        Ok(Self { url })
    }

    /// Scheme, host and port, without a trailing slash.
    pub fn origin(&self) -> String {
        self.url.origin().ascii_serialization()
    }

    /// Host name of the service.
    pub fn host(&self) -> &str {
        // Presence checked in `parse`.
        self.url.host_str().unwrap_or_default()
    }

    /// Join a path onto the origin.
    pub fn join(&self, path: &str) -> String {
        format!("{}/{}", self.origin(), path.trim_start_matches('/'))
    }

    /// Derive the API host the REST client is bound to.
    pub fn api_host(&self) -> ApiResult<ApiHost> {
        ApiHost::from_host_name(self.host())
    }
}

impl fmt::Display for ServiceUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.origin())
    }
}

/// Account label of a hosted Zendesk instance (`acme` for `acme.zendesk.com`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiHost {
    label: String,
}

impl ApiHost {
    /// Derive the host from a raw configured URL.
    pub fn from_service_url(raw: &str) -> ApiResult<Self> {
        ServiceUrl::parse(raw)?.api_host()
    }

    fn from_host_name(host: &str) -> ApiResult<Self> {
        let label = host.split('.').next().unwrap_or_default();
        if label.is_empty() {
            return Err(ApiError::InvalidUrl(format!(
                "{}: cannot derive account name",
                host
            )));
        }
        Ok(Self {
            label: label.to_ascii_lowercase(),
        })
    }

    /// The account label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Root of the v2 REST API for this account.
    pub fn api_root(&self) -> ApiResult<Url> {
        let root = format!("https://{}.{}/api/v2/", self.label, ZENDESK_DOMAIN);
        Ok(Url::parse(&root)?)
    }
}

impl fmt::Display for ApiHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_url_without_scheme() {
        let url = ServiceUrl::parse("acme.zendesk.com").unwrap();
        assert_eq!(url.origin(), "https://acme.zendesk.com");
        assert_eq!(url.host(), "acme.zendesk.com");
    }

    #[test]
    fn test_service_url_drops_path() {
        let url = ServiceUrl::parse("https://acme.zendesk.com/agent/tickets/12?x=1#top").unwrap();
        assert_eq!(url.origin(), "https://acme.zendesk.com");
        assert_eq!(
            url.join("/oauth/tokens"),
            "https://acme.zendesk.com/oauth/tokens"
        );
    }

    #[test]
    fn test_service_url_keeps_port() {
        let url = ServiceUrl::parse("http://127.0.0.1:8080/").unwrap();
        assert_eq!(url.origin(), "http://127.0.0.1:8080");
    }

    #[test]
    fn test_service_url_rejects_garbage() {
        assert!(ServiceUrl::parse("").is_err());
        assert!(ServiceUrl::parse("   ").is_err());
        assert!(ServiceUrl::parse("https://").is_err());
        assert!(ServiceUrl::parse("http://[::1").is_err());
    }

    #[test]
    fn test_api_host_leading_label() {
        let host = ApiHost::from_service_url("https://Acme.zendesk.com/hc/en-us").unwrap();
        assert_eq!(host.label(), "acme");
        assert_eq!(
            host.api_root().unwrap().as_str(),
            "https://acme.zendesk.com/api/v2/"
        );
    }

    #[test]
    fn test_api_host_from_bare_name() {
        let host = ApiHost::from_service_url("support").unwrap();
        assert_eq!(host.label(), "support");
    }

    #[test]
    fn test_api_host_error_is_clean() {
        let err = ApiHost::from_service_url("://").unwrap_err();
        assert!(matches!(err, ApiError::InvalidUrl(_)));
    }
}
