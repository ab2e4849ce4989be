//! Update information retrieval.

use super::UpdaterInstance;
use crate::constants::{HEADER_PREFIX, MAX_REDIRECTS, REQUEST_TIMEOUT};
use crate::core::UpdaterError;
use crate::models::UpdateResponse;
use reqwest::header::{ACCEPT, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, StatusCode, redirect};
use serde_json::Value;
use tracing::{debug, info, warn};

impl UpdaterInstance {
    /// `User-Agent` sent with every request, `<stem>/<version>`.
    #[must_use]
    pub fn user_agent(&self) -> String {
        format!("{}/{}", self.settings.identity.app_stem, self.settings.app_version)
    }

    /// Identification headers plus the extra headers given on the command line.
    ///
    /// Invalid header names or values are skipped with a warning.
    #[must_use]
    pub fn identification_headers(&self) -> HeaderMap {
        let identity = &self.settings.identity;
        let mut pairs = vec![
            (format!("{HEADER_PREFIX}-Manufacturer"), identity.vendor().to_string()),
            (format!("{HEADER_PREFIX}-Product"), identity.product_name().to_string()),
            (format!("{HEADER_PREFIX}-Version"), self.settings.app_version.to_string()),
            (format!("{HEADER_PREFIX}-Architecture"), std::env::consts::ARCH.to_string()),
        ];
        if let Some(channel) = self.settings.channel.as_deref().filter(|c| !c.is_empty()) {
            pairs.push((format!("{HEADER_PREFIX}-Channel"), channel.to_string()));
        }
        pairs.extend(self.settings.overrides.additional_headers.iter().cloned());

        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            match (HeaderName::try_from(name.as_str()), HeaderValue::try_from(value.as_str())) {
                (Ok(name), Ok(value)) => {
                    headers.insert(name, value);
                }
                _ => warn!("Skipping invalid header '{}: {}'", name, value),
            }
        }
        headers
    }

    pub(crate) fn http_client(&self, with_overall_timeout: bool) -> Result<Client, UpdaterError> {
        let mut builder = Client::builder()
            .user_agent(self.user_agent())
            .default_headers(self.identification_headers())
            .redirect(redirect::Policy::limited(MAX_REDIRECTS))
            .connect_timeout(crate::constants::CONNECT_TIMEOUT);
        if with_overall_timeout {
            builder = builder.timeout(REQUEST_TIMEOUT);
        }
        Ok(builder.build()?)
    }

    /// Fetch the update information from the server.
    ///
    /// On success the release list is replaced by the enabled releases sorted
    /// newest first, the selection is reset to the newest release and the server
    /// `shared` block is merged according to the configured authority. An empty
    /// release list is not an error here.
    ///
    /// # Errors
    ///
    /// - [`UpdaterError::Network`] on transport failure (`status: None`) or a
    ///   non-200 response
    /// - [`UpdaterError::Parse`] if the body is not a valid update response
    pub async fn request_update_info(&mut self) -> Result<(), UpdaterError> {
        let url = self.settings.request_url();
        info!("Requesting update information from {}", url);

        let response = self
            .http_client(true)?
            .get(&url)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| UpdaterError::Network {
                status: None,
                reason: e.to_string(),
            })?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(UpdaterError::Network {
                status: Some(status.as_u16()),
                reason: status.canonical_reason().unwrap_or("unexpected status").to_string(),
            });
        }

        let body = response.text().await.map_err(|e| UpdaterError::Network {
            status: Some(status.as_u16()),
            reason: e.to_string(),
        })?;
        let raw: Value = serde_json::from_str(&body)?;
        let mut parsed: UpdateResponse = serde_json::from_value(raw.clone())?;
        parsed.normalize_releases();

        debug!("Server returned {} enabled release(s)", parsed.releases.len());

        self.remerge(parsed.shared.as_ref());
        self.remote_json = raw;
        self.instance_config = parsed.instance;
        self.replace_releases(parsed.releases);

        Ok(())
    }
}
