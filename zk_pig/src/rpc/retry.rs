//! Retrying failed requests at the transport level.

use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};

use alloy::{
    providers::{ProviderBuilder, RootProvider},
    rpc::{
        client::ClientBuilder,
        json_rpc::{RequestPacket, ResponsePacket},
    },
    transports::{http::ReqwestTransport, TransportError},
};
use tower::{retry::Policy, Layer, Service};
use tracing::debug;

#[derive(Clone, Debug)]
pub struct RetryPolicy {
    backoff: Duration,
    retries: u32,
    max_retries: u32,
}

impl RetryPolicy {
    pub fn new(backoff: Duration, max_retries: u32) -> Self {
        Self {
            backoff,
            retries: 0,
            max_retries,
        }
    }
}

impl Policy<RequestPacket, ResponsePacket, TransportError> for RetryPolicy {
    type Future = Pin<Box<dyn Future<Output = Self> + Send + 'static>>;

    fn retry(
        &self,
        _req: &RequestPacket,
        result: Result<&ResponsePacket, &TransportError>,
    ) -> Option<Self::Future> {
        // only transport failures; error responses are final
        let Err(e) = result else {
            return None;
        };
        if self.retries >= self.max_retries {
            return None;
        }
        debug!(retry = self.retries + 1, "request failed: {e}");
        let mut policy = self.clone();
        Some(Box::pin(async move {
            tokio::time::sleep(policy.backoff).await;
            policy.retries += 1;
            policy
        }))
    }

    fn clone_request(&self, req: &RequestPacket) -> Option<RequestPacket> {
        Some(req.clone())
    }
}

#[derive(Clone, Debug)]
pub struct RetryLayer {
    policy: RetryPolicy,
}

impl RetryLayer {
    pub const fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }
}

impl<S> Layer<S> for RetryLayer {
    type Service = RetryService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RetryService {
            inner,
            policy: self.policy.clone(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct RetryService<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S> Service<RequestPacket> for RetryService<S>
where
    S: Service<RequestPacket, Response = ResponsePacket, Error = TransportError>
        + Send
        + 'static
        + Clone,
    S::Future: Send + 'static,
{
    type Response = ResponsePacket;
    type Error = TransportError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: RequestPacket) -> Self::Future {
        // the clone may not be ready; keep the one that was polled
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let mut policy = self.policy.clone();
        Box::pin(async move {
            let mut res = inner.call(req.clone()).await;
            while let Some(next) = policy.retry(&req, res.as_ref()) {
                policy = next.await;
                res = inner.call(req.clone()).await;
            }
            res
        })
    }
}

pub type RetryProvider = RootProvider<RetryService<ReqwestTransport>>;

pub fn build_http_retry_provider(
    rpc_url: url::Url,
    backoff: Duration,
    max_retries: u32,
) -> RetryProvider {
    let retry = RetryLayer::new(RetryPolicy::new(backoff, max_retries));
    let client = ClientBuilder::default().layer(retry).http(rpc_url);
    ProviderBuilder::new().on_client(client)
}
