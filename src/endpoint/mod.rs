//! The inference endpoint collaborator: configuration, the invocation seam,
//! and the HTTP implementation that talks to SageMaker-style runtimes.
mod config;
mod invoker;
mod signing;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use crate::error::{AppResult, HttpError};

pub use config::{EndpointConfig, SigV4Credentials};
pub use invoker::{ClientSettings, HttpInvoker, HttpInvokerFactory};

/// Failure of a single endpoint call. Never escapes the executor.
#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("{source}")]
    Transport {
        #[source]
        source: reqwest::Error,
    },
    #[error("{source}")]
    Signing {
        #[source]
        source: HttpError,
    },
    #[error("endpoint returned {status}: {message}")]
    Endpoint { status: u16, message: String },
}

/// Performs one call against the external endpoint.
#[async_trait]
pub trait Invoker: Send + Sync {
    /// Sends `payload` and returns the status reported by the endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error for transport, signing, or endpoint-side failures.
    async fn invoke(&self, payload: &Bytes) -> Result<u16, InvokeError>;
}

/// Builds an [`Invoker`] for one run.
pub trait InvokerFactory: Send + Sync {
    /// # Errors
    ///
    /// Returns an error when the endpoint configuration cannot produce a
    /// working client (bad URL, incomplete credentials, TLS setup).
    fn build(&self, endpoint: &EndpointConfig) -> AppResult<Arc<dyn Invoker>>;
}
