//! Purpose: gRPC transport for the backend parse protocol.
//! Exports: `GrpcBackend`, `GrpcConnector`, `ProtocolServiceClient`, `CONNECT_TIMEOUT`.
//! Role: Plaintext tonic channels; one lazy default channel, eager per-request channels.
//! Invariants: Connection establishment is bounded by the connector timeout.
//! Invariants: Only `http://` (plaintext) backend addresses are accepted.
//! Invariants: Dropping every clone of a client closes its channel.
use std::time::Duration;

use http::uri::PathAndQuery;
use tonic::client::Grpc;
use tonic::codec::ProstCodec;
use tonic::transport::{Channel, Endpoint};
use url::Url;

use super::proto;
use super::{BackendRequest, BackendStatus, Connector, ParseBackend, ParseOutcome};
use crate::core::error::{Error, ErrorKind};
use crate::core::node::SyntaxNode;

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

const PARSE_PATH: &str = "/gopkg.in.bblfsh.sdk.v1.protocol.ProtocolService/Parse";

#[derive(Clone, Debug)]
pub struct ProtocolServiceClient {
    inner: Grpc<Channel>,
}

impl ProtocolServiceClient {
    pub fn new(channel: Channel) -> Self {
        Self {
            inner: Grpc::new(channel),
        }
    }

    pub async fn parse(
        &mut self,
        request: tonic::Request<proto::ParseRequest>,
    ) -> Result<tonic::Response<proto::ParseResponse>, tonic::Status> {
        self.inner
            .ready()
            .await
            .map_err(|err| tonic::Status::unknown(format!("service was not ready: {err}")))?;
        let codec = ProstCodec::default();
        let path = PathAndQuery::from_static(PARSE_PATH);
        self.inner.unary(request, path, codec).await
    }
}

#[derive(Clone, Debug)]
pub struct GrpcBackend {
    address: String,
    client: ProtocolServiceClient,
}

impl GrpcBackend {
    /// Builds a client whose channel connects on first use.
    pub fn lazy(address: &str) -> Result<Self, Error> {
        let channel = endpoint(address)?
            .connect_timeout(CONNECT_TIMEOUT)
            .connect_lazy();
        Ok(Self {
            address: address.to_string(),
            client: ProtocolServiceClient::new(channel),
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

impl ParseBackend for GrpcBackend {
    async fn parse(&self, request: BackendRequest) -> Result<ParseOutcome, Error> {
        let mut client = self.client.clone();
        let mut rpc = tonic::Request::new(proto::ParseRequest {
            filename: String::new(),
            language: request.language,
            content: request.content,
            encoding: proto::Encoding::Utf8 as i32,
        });
        if let Some(timeout) = request.timeout {
            rpc.set_timeout(timeout);
        }

        let response = client.parse(rpc).await.map_err(|status| {
            Error::new(ErrorKind::Invocation)
                .with_message(format!("parse call to {} failed", self.address))
                .with_source(status)
        })?;
        let response = response.into_inner();
        let tree = response
            .uast
            .map(SyntaxNode::try_from)
            .transpose()
            .map_err(|err| err.with_context(format!("parse call to {} failed", self.address)))?;
        Ok(ParseOutcome::new(
            BackendStatus::from_code(response.status),
            tree,
            response.errors,
        )
        .with_language(response.language)
        .with_elapsed(response.elapsed.and_then(proto::Duration::to_std)))
    }
}

#[derive(Clone, Copy, Debug)]
pub struct GrpcConnector {
    connect_timeout: Duration,
}

impl Default for GrpcConnector {
    fn default() -> Self {
        Self {
            connect_timeout: CONNECT_TIMEOUT,
        }
    }
}

impl GrpcConnector {
    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }
}

impl Connector for GrpcConnector {
    type Client = GrpcBackend;

    async fn connect(&self, address: &str) -> Result<GrpcBackend, Error> {
        let endpoint = endpoint(address)?;
        let channel = match tokio::time::timeout(self.connect_timeout, endpoint.connect()).await {
            Ok(Ok(channel)) => channel,
            Ok(Err(err)) => {
                return Err(Error::new(ErrorKind::Connect)
                    .with_message(format!("failed to connect to backend at {address}"))
                    .with_source(err));
            }
            Err(_) => {
                return Err(Error::new(ErrorKind::Connect).with_message(format!(
                    "timed out after {}ms connecting to backend at {address}",
                    self.connect_timeout.as_millis()
                )));
            }
        };
        Ok(GrpcBackend {
            address: address.to_string(),
            client: ProtocolServiceClient::new(channel),
        })
    }
}

/// Accepts `host:port` or `http://host:port` and returns the URI tonic dials.
pub fn normalize_address(address: &str) -> Result<String, Error> {
    let address = address.trim();
    if address.is_empty() {
        return Err(Error::new(ErrorKind::Connect).with_message("backend address is empty"));
    }
    let candidate = if address.contains("://") {
        address.to_string()
    } else {
        format!("http://{address}")
    };
    let url = Url::parse(&candidate).map_err(|err| {
        Error::new(ErrorKind::Connect)
            .with_message(format!("invalid backend address {address:?}"))
            .with_source(err)
    })?;
    if url.scheme() != "http" {
        return Err(Error::new(ErrorKind::Connect)
            .with_message(format!(
                "unsupported backend scheme {:?}; only plaintext http is supported",
                url.scheme()
            ))
            .with_hint("Use host:port or http://host:port."));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(Error::new(ErrorKind::Connect)
            .with_message(format!("backend address {address:?} has no host")));
    }
    Ok(candidate)
}

fn endpoint(address: &str) -> Result<Endpoint, Error> {
    let uri = normalize_address(address)?;
    Endpoint::from_shared(uri).map_err(|err| {
        Error::new(ErrorKind::Connect)
            .with_message(format!("invalid backend address {address:?}"))
            .with_source(err)
    })
}
