//! Purpose: Fetch remote code snippets for the web client (gist passthrough).
//! Exports: `GistSource`, `GistResponse`.
//! Role: Blocking `ureq` fetch; the server runs it on the blocking pool.
//! Invariants: Requested paths never leave the configured base host.
//! Invariants: Remote status and body bytes are returned verbatim, including non-2xx
//! and non-UTF-8 bodies.
use std::io::Read;
use std::time::Duration;

use url::Url;

use crate::core::error::{Error, ErrorKind};

pub const DEFAULT_GIST_BASE_URL: &str = "https://gist.githubusercontent.com/";

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GistResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

#[derive(Clone, Debug)]
pub struct GistSource {
    base_url: Url,
    agent: ureq::Agent,
}

impl GistSource {
    pub fn new(base_url: &str) -> Result<Self, Error> {
        let base_url = parse_base_url(base_url)?;
        let agent = ureq::AgentBuilder::new().timeout(FETCH_TIMEOUT).build();
        Ok(Self { base_url, agent })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Appends `path` to the base URL. The base always ends in `/`, so the
    /// path cannot reach the authority part.
    pub fn resolve(&self, path: &str) -> Result<Url, Error> {
        let joined = format!(
            "{}{}",
            self.base_url.as_str(),
            path.trim_start_matches('/')
        );
        Url::parse(&joined).map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message(format!("invalid gist path {path:?}"))
                .with_source(err)
        })
    }

    pub fn fetch(&self, path: &str) -> Result<GistResponse, Error> {
        let url = self.resolve(path)?;
        let response = match self.agent.get(url.as_str()).call() {
            Ok(response) => response,
            Err(ureq::Error::Status(_, response)) => response,
            Err(ureq::Error::Transport(transport)) => {
                return Err(Error::new(ErrorKind::NotFound)
                    .with_message(format!("Gist not found: {transport}")));
            }
        };
        let status = response.status();
        let mut body = Vec::new();
        response
            .into_reader()
            .read_to_end(&mut body)
            .map_err(|err| {
                Error::new(ErrorKind::Io)
                    .with_message("Could not read gist")
                    .with_source(err)
            })?;
        Ok(GistResponse { status, body })
    }
}

fn parse_base_url(base_url: &str) -> Result<Url, Error> {
    let mut url = Url::parse(base_url).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message(format!("invalid gist base URL {base_url:?}"))
            .with_source(err)
    })?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(Error::new(ErrorKind::Usage)
            .with_message(format!("gist base URL must be http(s): {base_url:?}"))
            .with_hint("Use a value like https://gist.githubusercontent.com/."));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}
