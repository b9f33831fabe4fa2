use serde::Deserialize;
use url::Url;

use crate::args::{DEFAULT_CONTENT_TYPE, DEFAULT_REGION};
use crate::error::{AppError, AppResult, HttpError, ValidationError};

const SAGEMAKER_SERVICE: &str = "sagemaker";

#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointConfig {
    #[serde(default)]
    pub endpoint_name: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub aws_access_key_id: Option<String>,
    #[serde(default)]
    pub aws_secret_access_key: Option<String>,
    #[serde(default)]
    pub aws_session_token: Option<String>,
    #[serde(default)]
    pub endpoint_url: Option<String>,
}

impl std::fmt::Debug for EndpointConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointConfig")
            .field("endpoint_name", &self.endpoint_name)
            .field("region", &self.region)
            .field("content_type", &self.content_type)
            .field(
                "aws_access_key_id",
                &self.aws_access_key_id.as_ref().map(|_| "<redacted>"),
            )
            .field(
                "aws_secret_access_key",
                &self.aws_secret_access_key.as_ref().map(|_| "<redacted>"),
            )
            .field(
                "aws_session_token",
                &self.aws_session_token.as_ref().map(|_| "<redacted>"),
            )
            .field("endpoint_url", &self.endpoint_url)
            .finish()
    }
}

#[derive(Clone)]
pub struct SigV4Credentials {
    pub access_key: String,
    pub secret_key: String,
    pub session_token: Option<String>,
    pub region: String,
    pub service: &'static str,
}

impl EndpointConfig {
    #[must_use]
    pub fn region(&self) -> &str {
        non_empty(self.region.as_deref()).unwrap_or(DEFAULT_REGION)
    }

    #[must_use]
    pub fn content_type(&self) -> &str {
        non_empty(self.content_type.as_deref()).unwrap_or(DEFAULT_CONTENT_TYPE)
    }

    /// Checks the fields the engine needs before any call is made.
    ///
    /// # Errors
    ///
    /// Returns an error when the endpoint name is missing or the
    /// credentials are only half configured.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.endpoint_name.trim().is_empty() {
            return Err(ValidationError::EndpointNameMissing);
        }
        if self.endpoint_url.is_none()
            && self
                .region
                .as_deref()
                .is_some_and(|region| region.trim().is_empty())
        {
            return Err(ValidationError::RegionMissing);
        }
        self.credentials().map(|_| ())
    }

    /// Resolves signing credentials. `None` means requests go out unsigned.
    ///
    /// # Errors
    ///
    /// Returns an error when only one of access key id / secret key is set.
    pub fn credentials(&self) -> Result<Option<SigV4Credentials>, ValidationError> {
        let access_key = non_empty(self.aws_access_key_id.as_deref());
        let secret_key = non_empty(self.aws_secret_access_key.as_deref());
        match (access_key, secret_key) {
            (Some(access_key), Some(secret_key)) => Ok(Some(SigV4Credentials {
                access_key: access_key.to_owned(),
                secret_key: secret_key.to_owned(),
                session_token: non_empty(self.aws_session_token.as_deref()).map(str::to_owned),
                region: self.region().to_owned(),
                service: SAGEMAKER_SERVICE,
            })),
            (None, None) => Ok(None),
            (Some(_), None) | (None, Some(_)) => Err(ValidationError::IncompleteCredentials),
        }
    }

    /// URL the payload is POSTed to.
    ///
    /// # Errors
    ///
    /// Returns an error when the override or the derived runtime URL does
    /// not parse.
    pub fn invocation_url(&self) -> AppResult<Url> {
        if let Some(raw) = non_empty(self.endpoint_url.as_deref()) {
            return Url::parse(raw).map_err(|err| {
                AppError::http(HttpError::InvalidUrl {
                    url: raw.to_owned(),
                    source: err,
                })
            });
        }

        let base = format!("https://runtime.sagemaker.{}.amazonaws.com/", self.region());
        let mut url = Url::parse(&base).map_err(|err| {
            AppError::http(HttpError::InvalidUrl {
                url: base.clone(),
                source: err,
            })
        })?;
        url.path_segments_mut()
            .map_err(|()| AppError::http(HttpError::UrlCannotBeBase { url: base.clone() }))?
            .clear()
            .push("endpoints")
            .push(self.endpoint_name.trim())
            .push("invocations");
        Ok(url)
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}
