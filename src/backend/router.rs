//! Purpose: Pick the backend client for one parse request.
//! Exports: `Resolved`, `OwnedClient`, `resolve`.
//! Role: Shared default client, or an ephemeral client owned by the request.
//! Invariants: An empty address never opens a connection.
//! Invariants: An owned client is released exactly once, when the request drops it.
use std::ops::Deref;

use super::{BackendRequest, Connector, ParseBackend, ParseOutcome};
use crate::core::error::Error;

/// Client opened for a single request; dropping it releases the connection.
#[derive(Debug)]
pub struct OwnedClient<C> {
    address: String,
    client: C,
}

impl<C> OwnedClient<C> {
    pub fn address(&self) -> &str {
        &self.address
    }
}

impl<C> Drop for OwnedClient<C> {
    fn drop(&mut self) {
        tracing::debug!(address = %self.address, "released backend connection");
    }
}

#[derive(Debug)]
pub enum Resolved<'a, C> {
    /// The service's long-lived default client; no cleanup obligation.
    Shared(&'a C),
    /// A per-request client; released when this value is dropped.
    Owned(OwnedClient<C>),
}

impl<C> Resolved<'_, C> {
    pub fn is_owned(&self) -> bool {
        matches!(self, Resolved::Owned(_))
    }
}

impl<C> Deref for Resolved<'_, C> {
    type Target = C;

    fn deref(&self) -> &C {
        match self {
            Resolved::Shared(client) => client,
            Resolved::Owned(owned) => &owned.client,
        }
    }
}

impl<C: ParseBackend> Resolved<'_, C> {
    pub async fn parse(&self, request: BackendRequest) -> Result<ParseOutcome, Error> {
        self.deref().parse(request).await
    }
}

pub async fn resolve<'a, K: Connector>(
    address: &str,
    default: &'a K::Client,
    connector: &K,
) -> Result<Resolved<'a, K::Client>, Error> {
    let address = address.trim();
    if address.is_empty() {
        return Ok(Resolved::Shared(default));
    }
    tracing::debug!(address, "opening backend connection");
    let client = connector.connect(address).await.inspect_err(|err| {
        tracing::warn!(address, error = %err.detail(), "backend connection failed");
    })?;
    Ok(Resolved::Owned(OwnedClient {
        address: address.to_string(),
        client,
    }))
}
