use aws_credential_types::Credentials;
use aws_sigv4::http_request::{SignableBody, SignableRequest, SigningSettings, sign};
use aws_sigv4::sign::v4;
use aws_smithy_runtime_api::client::identity::Identity;
use reqwest::{RequestBuilder, Url};

use crate::error::HttpError;

use super::SigV4Credentials;

const INVOKE_METHOD: &str = "POST";

/// Signs a POST of `body` to `url` and copies the signature headers onto
/// `builder`. `headers` must be every header that will be sent.
pub(super) fn apply_sigv4_headers(
    mut builder: RequestBuilder,
    url: &Url,
    headers: &[(&str, &str)],
    body: &[u8],
    credentials: &SigV4Credentials,
) -> Result<RequestBuilder, HttpError> {
    let identity: Identity = Credentials::new(
        &credentials.access_key,
        &credentials.secret_key,
        credentials.session_token.clone(),
        None,
        "inferload",
    )
    .into();
    let signing_params = v4::SigningParams::builder()
        .identity(&identity)
        .region(&credentials.region)
        .name(credentials.service)
        .time(std::time::SystemTime::now())
        .settings(SigningSettings::default())
        .build()
        .map_err(|err| HttpError::SigV4Params {
            source: Box::new(err),
        })?
        .into();

    let signable = SignableRequest::new(
        INVOKE_METHOD,
        url.as_str(),
        headers.iter().copied(),
        SignableBody::Bytes(body),
    )
    .map_err(|err| HttpError::SigV4Request {
        source: Box::new(err),
    })?;

    let (instructions, _signature) = sign(signable, &signing_params)
        .map_err(|err| HttpError::SigV4Sign {
            source: Box::new(err),
        })?
        .into_parts();

    let mut http_req = http::Request::builder()
        .method(INVOKE_METHOD)
        .uri(url.as_str());
    for (key, value) in headers {
        http_req = http_req.header(*key, *value);
    }
    let mut http_req = http_req
        .body(())
        .map_err(|err| HttpError::SigV4BuildSign {
            source: Box::new(err),
        })?;
    instructions.apply_to_request_http1x(&mut http_req);

    for (name, value) in http_req.headers() {
        if headers
            .iter()
            .any(|(key, _)| name.as_str().eq_ignore_ascii_case(key))
        {
            continue;
        }
        builder = builder.header(name, value);
    }
    Ok(builder)
}
