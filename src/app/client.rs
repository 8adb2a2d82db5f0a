//! Object-store access: locators, the store trait, and the S3 client
//!
//! [`ObjectStore`] is the seam between the transfer engine and the network.
//! The production implementation, [`S3Client`], issues SigV4-signed HTTPS
//! requests with `reqwest`: one HEAD for the object size and one ranged GET
//! per segment. Pass-through snapshots produce unsigned requests, leaving
//! authentication to whatever sits in front of the endpoint.

use std::fmt;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use aws_credential_types::Credentials;
use futures::StreamExt;
use aws_sigv4::http_request::{
    sign, PayloadChecksumKind, PercentEncodingMode, SignableBody, SignableRequest,
    SigningSettings,
};
use aws_sigv4::sign::v4;
use reqwest::header::{CONTENT_LENGTH, RANGE};
use reqwest::{Client, Method, StatusCode};
use tracing::{debug, trace};
use url::Url;

use crate::app::buffer::SegmentLease;
use crate::app::planner::ByteRange;
use crate::auth::CredentialSnapshot;
use crate::constants::{auth, http as http_constants};
use crate::errors::{CredentialError, TransferError, TransferResult};

/// Source object address: bucket plus key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectLocator {
    pub bucket: String,
    pub key: String,
}

impl ObjectLocator {
    /// Parse an `s3://bucket/key` URI
    pub fn parse(input: &str) -> Result<Self, crate::errors::ObjectError> {
        let invalid = || crate::errors::ObjectError::InvalidLocator {
            input: input.to_string(),
        };
        let rest = input.strip_prefix("s3://").ok_or_else(invalid)?;
        let (bucket, key) = rest.split_once('/').ok_or_else(invalid)?;
        if bucket.is_empty() || key.is_empty() {
            return Err(invalid());
        }
        Ok(Self {
            bucket: bucket.to_string(),
            key: key.to_string(),
        })
    }
}

impl fmt::Display for ObjectLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

/// The engine's view of the object store
///
/// `fetch_range` fills the leased buffer with exactly the requested bytes or
/// fails; it never truncates silently. Implementations must be safe to call
/// from many tasks at once.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Size of the object in bytes, from a metadata lookup
    async fn object_size(
        &self,
        locator: &ObjectLocator,
        snapshot: &CredentialSnapshot,
    ) -> TransferResult<u64>;

    /// Fetch one segment into `buf`, enforcing the inactivity watchdog
    async fn fetch_range(
        &self,
        locator: &ObjectLocator,
        range: &ByteRange,
        snapshot: &CredentialSnapshot,
        buf: &mut SegmentLease,
        stall_timeout: Duration,
    ) -> TransferResult<()>;
}

/// Configuration for the HTTP transport
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Custom object-store endpoint; path-style addressing is used when set
    pub endpoint: Option<Url>,
    /// Connection establishment timeout
    pub connect_timeout: Duration,
    /// Connection pool idle timeout
    pub pool_idle_timeout: Duration,
    /// Maximum idle connections per host
    pub pool_max_per_host: usize,
    /// TCP keep-alive interval
    pub tcp_keepalive: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            connect_timeout: http_constants::CONNECT_TIMEOUT,
            pool_idle_timeout: http_constants::POOL_IDLE_TIMEOUT,
            pool_max_per_host: http_constants::POOL_MAX_PER_HOST,
            tcp_keepalive: http_constants::TCP_KEEPALIVE,
        }
    }
}

/// S3 client for ranged object reads
///
/// One client is shared by all fetch workers; reqwest's connection pool
/// carries the concurrency. There is no whole-request timeout: a transfer of
/// a 384 MiB segment may legitimately take minutes, and liveness is enforced
/// by the per-chunk inactivity watchdog instead.
#[derive(Debug)]
pub struct S3Client {
    http: Client,
    config: ClientConfig,
}

impl S3Client {
    /// Create a client with default transport configuration
    pub fn new() -> TransferResult<Self> {
        Self::with_config(ClientConfig::default())
    }

    /// Create a client with custom transport configuration
    pub fn with_config(config: ClientConfig) -> TransferResult<Self> {
        let http = Client::builder()
            .user_agent(http_constants::USER_AGENT)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(config.pool_idle_timeout)
            .pool_max_idle_per_host(config.pool_max_per_host)
            .tcp_keepalive(config.tcp_keepalive)
            .tcp_nodelay(true)
            .build()
            .map_err(|source| TransferError::Http { segment: 0, source })?;

        Ok(Self { http, config })
    }

    /// URL for an object: virtual-hosted for AWS, path-style for custom
    /// endpoints
    fn object_url(&self, locator: &ObjectLocator, region: &str) -> TransferResult<Url> {
        let mut url = match &self.config.endpoint {
            Some(endpoint) => {
                let mut url = endpoint.clone();
                url.set_path(&format!("{}/{}", locator.bucket, locator.key));
                url
            }
            None => {
                let base = format!("https://{}.s3.{}.amazonaws.com", locator.bucket, region);
                let mut url = Url::parse(&base).map_err(|_| {
                    TransferError::Credential(CredentialError::SigningFailed {
                        reason: format!("cannot build endpoint URL for bucket {}", locator.bucket),
                    })
                })?;
                url.set_path(&locator.key);
                url
            }
        };
        url.set_query(None);
        Ok(url)
    }

    /// Build the request headers, signing with the snapshot unless it is the
    /// pass-through sentinel
    fn request_headers(
        method: &Method,
        url: &Url,
        range: Option<&ByteRange>,
        snapshot: &CredentialSnapshot,
    ) -> TransferResult<Vec<(String, String)>> {
        let mut request = http::Request::builder()
            .method(method.as_str())
            .uri(url.as_str());
        if let Some(range) = range {
            request = request.header(RANGE, range.header_value());
        }
        let mut request = request.body(()).map_err(|e| {
            TransferError::Credential(CredentialError::SigningFailed {
                reason: e.to_string(),
            })
        })?;

        if !snapshot.is_passthrough() {
            let mut settings = SigningSettings::default();
            settings.payload_checksum_kind = PayloadChecksumKind::XAmzSha256;
            // S3 signs the literal (single-encoded) path
            settings.percent_encoding_mode = PercentEncodingMode::Single;

            let identity = Credentials::new(
                snapshot.access_key_id.clone(),
                snapshot.secret_access_key.clone(),
                snapshot.session_token.clone(),
                None,
                "s3pipe",
            )
            .into();

            let params = v4::SigningParams::builder()
                .identity(&identity)
                .region(&snapshot.region)
                .name(auth::SIGNING_SERVICE)
                .time(SystemTime::now())
                .settings(settings)
                .build()
                .map_err(|e| {
                    TransferError::Credential(CredentialError::SigningFailed {
                        reason: e.to_string(),
                    })
                })?
                .into();

            let headers = request
                .headers()
                .iter()
                .map(|(name, value)| (name.as_str(), value.to_str().unwrap_or_default()));
            let signable =
                SignableRequest::new(method.as_str(), url.as_str(), headers, SignableBody::Bytes(&[]))
                    .map_err(|e| {
                        TransferError::Credential(CredentialError::SigningFailed {
                            reason: e.to_string(),
                        })
                    })?;

            let (instructions, _signature) = sign(signable, &params)
                .map_err(|e| {
                    TransferError::Credential(CredentialError::SigningFailed {
                        reason: e.to_string(),
                    })
                })?
                .into_parts();
            instructions.apply_to_request_http1x(&mut request);
        }

        Ok(request
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.to_string(),
                    value.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect())
    }

    async fn send(
        &self,
        method: Method,
        locator: &ObjectLocator,
        range: Option<&ByteRange>,
        snapshot: &CredentialSnapshot,
        segment: u64,
    ) -> TransferResult<reqwest::Response> {
        let url = self.object_url(locator, &snapshot.region)?;
        let headers = Self::request_headers(&method, &url, range, snapshot)?;

        let mut builder = self.http.request(method, url);
        for (name, value) in &headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        builder
            .send()
            .await
            .map_err(|source| TransferError::Http { segment, source })
    }
}

#[async_trait]
impl ObjectStore for S3Client {
    async fn object_size(
        &self,
        locator: &ObjectLocator,
        snapshot: &CredentialSnapshot,
    ) -> TransferResult<u64> {
        let response = self
            .send(Method::HEAD, locator, None, snapshot, 0)
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransferError::Server {
                segment: 0,
                status: status.as_u16(),
            });
        }

        let size = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .ok_or_else(|| TransferError::SizeProbe {
                reason: "missing or unparsable Content-Length".to_string(),
            })?;

        debug!(object = %locator, size, "resolved object size");
        Ok(size)
    }

    async fn fetch_range(
        &self,
        locator: &ObjectLocator,
        range: &ByteRange,
        snapshot: &CredentialSnapshot,
        buf: &mut SegmentLease,
        stall_timeout: Duration,
    ) -> TransferResult<()> {
        let segment = range.index;
        let expected = range.len();

        let response = self
            .send(Method::GET, locator, Some(range), snapshot, segment)
            .await?;

        let status = response.status();
        let range_honored = status == StatusCode::PARTIAL_CONTENT
            || (status == StatusCode::OK && range.first == 0);
        if !range_honored {
            return Err(TransferError::Server {
                segment,
                status: status.as_u16(),
            });
        }

        // The watchdog re-arms on every chunk: progress resets it, total
        // silence for `stall_timeout` kills the fetch.
        let mut body = response.bytes_stream();
        loop {
            let chunk = match tokio::time::timeout(stall_timeout, body.next()).await {
                Err(_) => {
                    return Err(TransferError::Stalled {
                        segment,
                        timeout: stall_timeout,
                    })
                }
                Ok(Some(Err(source))) => return Err(TransferError::Http { segment, source }),
                Ok(None) => break,
                Ok(Some(Ok(chunk))) => chunk,
            };

            if buf.len() as u64 + chunk.len() as u64 > expected {
                return Err(TransferError::Overrun { segment, expected });
            }
            buf.extend_from_slice(&chunk);
            trace!(segment, received = buf.len(), expected, "segment progress");
        }

        // Empty and short bodies both land here
        if buf.len() as u64 != expected {
            return Err(TransferError::ShortRead {
                segment,
                expected,
                received: buf.len() as u64,
            });
        }

        Ok(())
    }
}
