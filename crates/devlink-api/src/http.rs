// ── HTTP request/response transport ──
//
// For devices that only expose an HTTP API (solar gateways, bridges with
// a REST surface). Opening the link performs an authenticated initial GET;
// afterwards the inbound stream yields one body per poll period, and every
// frame written to the sink is POSTed to the same URL with the response
// body fed back into the inbound stream as a reply.
//
// Each link builds its own `reqwest::Client`, so cookies and any
// authentication state live exactly as long as the link.

use std::time::Duration;

use bytes::Bytes;
use futures_util::future::{self, BoxFuture};
use futures_util::{StreamExt, sink, stream};
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use reqwest::{Method, StatusCode};
use secrecy::ExposeSecret;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, trace};
use url::Url;

use crate::error::Error;
use crate::transport::{BasicAuth, Link, Transport};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Polls an HTTP endpoint and POSTs outbound frames to it.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    url: Url,
    auth: Option<BasicAuth>,
    poll_interval: Option<Duration>,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            auth: None,
            poll_interval: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_basic_auth(mut self, auth: BasicAuth) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Re-fetch the URL at this cadence. Without it only the initial
    /// response and POST replies are delivered.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    /// Per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn build_client(&self) -> Result<reqwest::Client, Error> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .cookie_store(true)
            .user_agent(concat!("devlink/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(Error::from)
    }

    async fn open_link(&self) -> Result<Link, Error> {
        let http = self.build_client()?;
        let url = self.url.clone();
        let auth = self.auth.clone();

        // The first GET doubles as the credential check.
        let first = exchange(&http, Method::GET, &url, auth.as_ref(), None).await?;
        debug!(url = %url, bytes = first.len(), "HTTP link established");

        let (reply_tx, reply_rx) = mpsc::unbounded_channel::<Result<Bytes, Error>>();

        let sink = sink::unfold(
            (http.clone(), url.clone(), auth.clone(), reply_tx),
            |(http, url, auth, reply_tx), frame: Bytes| async move {
                let body = exchange(&http, Method::POST, &url, auth.as_ref(), Some(frame)).await?;
                if !body.is_empty() {
                    // Receiver gone means the link is being torn down.
                    let _ = reply_tx.send(Ok(body));
                }
                Ok::<_, Error>((http, url, auth, reply_tx))
            },
        );

        let poll_interval = self.poll_interval;
        let polls = async_stream::stream! {
            yield Ok(first);
            if let Some(period) = poll_interval {
                let mut ticker = tokio::time::interval(period);
                ticker.tick().await; // consume the immediate first tick
                loop {
                    ticker.tick().await;
                    trace!(url = %url, "polling");
                    match exchange(&http, Method::GET, &url, auth.as_ref(), None).await {
                        Ok(body) => yield Ok(body),
                        Err(e) => {
                            yield Err(e);
                            break;
                        }
                    }
                }
            } else {
                future::pending::<()>().await;
            }
        };

        let inbound = stream::select(polls, UnboundedReceiverStream::new(reply_rx));

        Ok(Link::new(self.url.to_string(), Box::pin(sink), inbound.boxed()))
    }
}

impl Transport for HttpTransport {
    fn open(&self) -> BoxFuture<'_, Result<Link, Error>> {
        Box::pin(self.open_link())
    }

    fn describe(&self) -> String {
        self.url.to_string()
    }
}

/// Issue one request and return the body, classifying auth failures.
async fn exchange(
    http: &reqwest::Client,
    method: Method,
    url: &Url,
    auth: Option<&BasicAuth>,
    body: Option<Bytes>,
) -> Result<Bytes, Error> {
    let mut request = http
        .request(method, url.clone())
        .header(ACCEPT, "*/*")
        .header(CACHE_CONTROL, "no-cache");
    if let Some(auth) = auth {
        request = request.basic_auth(&auth.username, Some(auth.password.expose_secret()));
    }
    if let Some(body) = body {
        request = request.body(body);
    }

    let response = request.send().await?;
    let status = response.status();

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(Error::Authentication {
            message: format!("HTTP {status} from {url}"),
        });
    }
    if !status.is_success() {
        return Err(Error::HttpStatus {
            status: status.as_u16(),
            url: url.to_string(),
        });
    }

    Ok(response.bytes().await?)
}
