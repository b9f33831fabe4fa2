use super::invoker::endpoint_error_message;
use super::*;
use crate::error::{AppError, AppResult, ValidationError};
use std::future::Future;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

fn run_async_test<F>(future: F) -> AppResult<()>
where
    F: Future<Output = AppResult<()>>,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::validation(format!("Failed to build runtime: {}", err)))?;
    runtime.block_on(future)
}

fn endpoint(name: &str) -> EndpointConfig {
    EndpointConfig {
        endpoint_name: name.to_owned(),
        ..EndpointConfig::default()
    }
}

/// Accepts one connection, captures the raw request, replies with
/// `response`.
async fn serve_once(response: String) -> AppResult<(String, tokio::task::JoinHandle<String>)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let handle = tokio::spawn(async move {
        let Ok((mut socket, _)) = listener.accept().await else {
            return String::new();
        };
        let mut raw = Vec::new();
        let mut chunk = [0_u8; 4096];
        loop {
            let Ok(read) = socket.read(&mut chunk).await else {
                break;
            };
            if read == 0 {
                break;
            }
            raw.extend_from_slice(chunk.get(..read).unwrap_or_default());
            if request_complete(&raw) {
                break;
            }
        }
        drop(socket.write_all(response.as_bytes()).await);
        drop(socket.shutdown().await);
        String::from_utf8_lossy(&raw).into_owned()
    });
    Ok((format!("http://{}/invocations", addr), handle))
}

fn request_complete(raw: &[u8]) -> bool {
    let text = String::from_utf8_lossy(raw);
    let Some((head, body)) = text.split_once("\r\n\r\n") else {
        return false;
    };
    let length = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);
    body.len() >= length
}

#[test]
fn derives_runtime_url_from_region_and_name() -> AppResult<()> {
    let mut config = endpoint("my endpoint");
    config.region = Some("eu-central-1".to_owned());
    let url = config.invocation_url()?;
    if url.as_str()
        != "https://runtime.sagemaker.eu-central-1.amazonaws.com/endpoints/my%20endpoint/invocations"
    {
        return Err(AppError::validation(format!("Unexpected url: {}", url)));
    }
    Ok(())
}

#[test]
fn default_region_and_content_type_apply() -> AppResult<()> {
    let config = endpoint("demo");
    if config.region() != "us-east-1" || config.content_type() != "application/json" {
        return Err(AppError::validation("Defaults not applied"));
    }
    let url = config.invocation_url()?;
    if url.host_str() != Some("runtime.sagemaker.us-east-1.amazonaws.com") {
        return Err(AppError::validation(format!("Unexpected host: {:?}", url.host_str())));
    }
    Ok(())
}

#[test]
fn endpoint_url_override_wins() -> AppResult<()> {
    let mut config = endpoint("demo");
    config.endpoint_url = Some("http://127.0.0.1:8080/invoke".to_owned());
    let url = config.invocation_url()?;
    if url.as_str() != "http://127.0.0.1:8080/invoke" {
        return Err(AppError::validation(format!("Unexpected url: {}", url)));
    }
    config.endpoint_url = Some("not a url".to_owned());
    if config.invocation_url().is_ok() {
        return Err(AppError::validation("Invalid override accepted"));
    }
    Ok(())
}

#[test]
fn credentials_must_come_in_pairs() -> AppResult<()> {
    let mut config = endpoint("demo");
    if config.credentials()?.is_some() {
        return Err(AppError::validation("Expected unsigned requests"));
    }

    config.aws_access_key_id = Some("AKIDEXAMPLE".to_owned());
    if !matches!(
        config.validate(),
        Err(ValidationError::IncompleteCredentials)
    ) {
        return Err(AppError::validation("Half-configured credentials accepted"));
    }

    config.aws_secret_access_key = Some("secret".to_owned());
    config.region = Some("ap-northeast-2".to_owned());
    let credentials = config
        .credentials()?
        .ok_or_else(|| AppError::validation("Expected credentials"))?;
    if credentials.region != "ap-northeast-2" || credentials.service != "sagemaker" {
        return Err(AppError::validation("Unexpected signing scope"));
    }
    Ok(())
}

#[test]
fn validate_rejects_blank_name_and_region() -> AppResult<()> {
    if !matches!(
        endpoint("  ").validate(),
        Err(ValidationError::EndpointNameMissing)
    ) {
        return Err(AppError::validation("Blank name accepted"));
    }
    let mut config = endpoint("demo");
    config.region = Some(" ".to_owned());
    if !matches!(config.validate(), Err(ValidationError::RegionMissing)) {
        return Err(AppError::validation("Blank region accepted"));
    }
    config.endpoint_url = Some("http://localhost:9000/".to_owned());
    config.validate()?;
    Ok(())
}

#[test]
fn debug_output_redacts_secrets() -> AppResult<()> {
    let mut config = endpoint("demo");
    config.aws_access_key_id = Some("AKIDEXAMPLE".to_owned());
    config.aws_secret_access_key = Some("very-secret".to_owned());
    let rendered = format!("{:?}", config);
    if rendered.contains("very-secret") || rendered.contains("AKIDEXAMPLE") {
        return Err(AppError::validation(format!("Secrets leaked: {}", rendered)));
    }
    if !rendered.contains("<redacted>") {
        return Err(AppError::validation("Redaction marker missing"));
    }
    Ok(())
}

#[test]
fn deserializes_camel_case_wire_shape() -> AppResult<()> {
    let config: EndpointConfig = serde_json::from_str(
        r#"{"endpointName":"llm","region":"us-west-2","contentType":"text/csv",
            "awsAccessKeyId":"a","awsSecretAccessKey":"b"}"#,
    )?;
    if config.endpoint_name != "llm" || config.content_type() != "text/csv" {
        return Err(AppError::validation("Fields not mapped"));
    }
    config.validate()?;
    Ok(())
}

#[test]
fn error_message_prefers_json_message() -> AppResult<()> {
    let cases: [(&[u8], &str); 4] = [
        (br#"{"message":"Model error"}"#, "Model error"),
        (br#"{"Message":"Throttled"}"#, "Throttled"),
        (b"  upstream timeout \n", "upstream timeout"),
        (b"", "empty response body"),
    ];
    for (body, expected) in cases {
        let message = endpoint_error_message(body);
        if message != expected {
            return Err(AppError::validation(format!(
                "Expected '{}', got '{}'",
                expected, message
            )));
        }
    }
    let long = "x".repeat(2000);
    if endpoint_error_message(long.as_bytes()).chars().count() != 512 {
        return Err(AppError::validation("Long message not truncated"));
    }
    Ok(())
}

#[test]
fn http_invoker_posts_payload_and_returns_status() -> AppResult<()> {
    run_async_test(async {
        let (url, server) =
            serve_once("HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok".to_owned())
                .await?;
        let mut config = endpoint("demo");
        config.endpoint_url = Some(url);
        config.content_type = Some("text/plain".to_owned());
        let invoker = HttpInvoker::new(&config, ClientSettings::default())?;

        let status = invoker
            .invoke(&Bytes::from_static(b"hello"))
            .await
            .map_err(|err| AppError::validation(format!("Invoke failed: {}", err)))?;
        let request = server.await?;

        if status != 200 {
            return Err(AppError::validation(format!("Unexpected status {}", status)));
        }
        let lower = request.to_ascii_lowercase();
        if !request.starts_with("POST /invocations") || !lower.contains("content-type: text/plain")
        {
            return Err(AppError::validation(format!("Unexpected request: {}", request)));
        }
        if !request.ends_with("hello") || lower.contains("authorization:") {
            return Err(AppError::validation(format!("Unexpected request: {}", request)));
        }
        Ok(())
    })
}

#[test]
fn http_invoker_signs_when_credentials_present() -> AppResult<()> {
    run_async_test(async {
        let (url, server) =
            serve_once("HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_owned())
                .await?;
        let mut config = endpoint("demo");
        config.endpoint_url = Some(url);
        config.aws_access_key_id = Some("AKIDEXAMPLE".to_owned());
        config.aws_secret_access_key = Some("secret".to_owned());
        config.aws_session_token = Some("session".to_owned());
        let invoker = HttpInvoker::new(&config, ClientSettings::default())?;

        invoker
            .invoke(&Bytes::from_static(b"{}"))
            .await
            .map_err(|err| AppError::validation(format!("Invoke failed: {}", err)))?;
        let lower = server.await?.to_ascii_lowercase();

        if !lower.contains("authorization: aws4-hmac-sha256 credential=akidexample/") {
            return Err(AppError::validation(format!("Missing signature: {}", lower)));
        }
        if !lower.contains("x-amz-date:") || !lower.contains("x-amz-security-token: session") {
            return Err(AppError::validation(format!("Missing sigv4 headers: {}", lower)));
        }
        Ok(())
    })
}

#[test]
fn http_invoker_maps_error_status() -> AppResult<()> {
    run_async_test(async {
        let body = r#"{"message":"Endpoint busy"}"#;
        let response = format!(
            "HTTP/1.1 424 Failed Dependency\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        );
        let (url, server) = serve_once(response).await?;
        let mut config = endpoint("demo");
        config.endpoint_url = Some(url);
        let invoker = HttpInvoker::new(&config, ClientSettings::default())?;

        let result = invoker.invoke(&Bytes::from_static(b"{}")).await;
        server.await?;

        match result {
            Err(InvokeError::Endpoint { status, message }) => {
                if status != 424 || message != "Endpoint busy" {
                    return Err(AppError::validation(format!(
                        "Unexpected endpoint error: {} {}",
                        status, message
                    )));
                }
                Ok(())
            }
            Err(other) => Err(AppError::validation(format!("Unexpected error: {}", other))),
            Ok(status) => Err(AppError::validation(format!("Unexpected success: {}", status))),
        }
    })
}

#[test]
fn factory_rejects_incomplete_credentials() -> AppResult<()> {
    let mut config = endpoint("demo");
    config.aws_secret_access_key = Some("secret".to_owned());
    let factory = HttpInvokerFactory::new(ClientSettings::default());
    if factory.build(&config).is_ok() {
        return Err(AppError::validation("Factory accepted incomplete credentials"));
    }
    Ok(())
}
