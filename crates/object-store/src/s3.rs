//! S3-compatible node client (MinIO, AWS S3, ...).
//!
//! Object metadata, URL signing and uploads of unknown length go through the
//! `object_store` crate. Bucket HEAD/PUT, which `object_store` has no API for,
//! and uploads of known length are sent as presigned requests with `reqwest`.
//!
//! `object_store` retries are disabled: a node that cannot be reached fails
//! the call at once and the router decides what happens next.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use http::{header, Method, StatusCode};
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::path::Path as ObjectPath;
use object_store::signer::Signer;
use object_store::{ClientOptions, ObjectStore, RetryConfig, WriteMultipart};
use url::Url;

use crate::client::{
    ByteStream, Credentials, DynNodeClient, NodeClient, NodeConnector, ObjectBody, ObjectStat,
};
use crate::error::{NodeError, Result};

/// Lifetime of the URLs we sign for our own requests.
const INTERNAL_SIGNATURE_TTL: Duration = Duration::from_secs(60);

const DEFAULT_REGION: &str = "us-east-1";

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Parts of a streamed upload allowed in flight at once. Together with the
/// part size this bounds the memory one upload holds.
const MAX_PARTS_IN_FLIGHT: usize = 4;

/// Configuration for connecting to one S3/MinIO node.
#[derive(Debug, Clone)]
pub struct S3NodeConfig {
    /// Endpoint URL (e.g., "http://10.0.0.1:9000")
    pub endpoint: String,
    pub credentials: Credentials,
    pub bucket: String,
    /// Region (defaults to "us-east-1" for MinIO compatibility)
    pub region: Option<String>,
    pub connect_timeout: Duration,
}

impl S3NodeConfig {
    pub fn new(
        endpoint: impl Into<String>,
        credentials: Credentials,
        bucket: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            credentials,
            bucket: bucket.into(),
            region: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }
}

/// Client for a single S3-compatible node, bound to one bucket.
#[derive(Debug, Clone)]
pub struct S3NodeClient {
    store: Arc<AmazonS3>,
    http: reqwest::Client,
    bucket: String,
}

impl S3NodeClient {
    pub fn new(config: S3NodeConfig, http: reqwest::Client) -> Result<Self> {
        let no_retries = RetryConfig {
            max_retries: 0,
            ..Default::default()
        };
        let client_options = ClientOptions::new()
            .with_connect_timeout(config.connect_timeout)
            .with_allow_http(config.endpoint.starts_with("http://"));

        let store = AmazonS3Builder::new()
            .with_endpoint(&config.endpoint)
            .with_access_key_id(&config.credentials.access_key)
            .with_secret_access_key(&config.credentials.secret_key)
            .with_bucket_name(&config.bucket)
            .with_region(config.region.as_deref().unwrap_or(DEFAULT_REGION))
            .with_client_options(client_options)
            .with_retry(no_retries)
            .build()
            .map_err(|e| NodeError::InvalidConfig(e.to_string()))?;

        Ok(Self {
            store: Arc::new(store),
            http,
            bucket: config.bucket,
        })
    }

    /// Signed URL addressing the bucket itself rather than an object.
    async fn bucket_url(&self, method: Method) -> Result<Url> {
        let url = self
            .store
            .signed_url(method, &ObjectPath::from(""), INTERNAL_SIGNATURE_TTL)
            .await?;
        Ok(url)
    }

    async fn error_status(response: reqwest::Response) -> NodeError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        NodeError::Status(status, body)
    }
}

#[async_trait]
impl NodeClient for S3NodeClient {
    async fn bucket_exists(&self) -> Result<bool> {
        let url = self.bucket_url(Method::HEAD).await?;
        let response = self.http.head(url).send().await?;
        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(Self::error_status(response).await),
        }
    }

    async fn make_bucket(&self) -> Result<()> {
        let url = self.bucket_url(Method::PUT).await?;
        let response = self
            .http
            .put(url)
            .header(header::CONTENT_LENGTH, 0)
            .send()
            .await?;

        if response.status().is_success() {
            tracing::info!(bucket = %self.bucket, "created bucket");
            return Ok(());
        }

        match Self::error_status(response).await {
            NodeError::Status(StatusCode::CONFLICT, body)
                if body.contains("BucketAlreadyOwnedByYou")
                    || body.contains("BucketAlreadyExists") =>
            {
                Err(NodeError::BucketAlreadyExists(self.bucket.clone()))
            }
            err => Err(err),
        }
    }

    async fn stat_object(&self, key: &str) -> Result<Option<ObjectStat>> {
        match self.store.head(&ObjectPath::from(key)).await {
            Ok(meta) => Ok(Some(ObjectStat {
                size: meta.size as u64,
                e_tag: meta.e_tag,
            })),
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put_object(&self, key: &str, body: ObjectBody) -> Result<()> {
        let path = ObjectPath::from(key);

        // S3 rejects chunked uploads on presigned URLs, so a body of unknown
        // size goes up part by part instead
        let Some(size) = body.size() else {
            return upload_in_parts(self.store.as_ref(), &path, body.into_stream()).await;
        };

        let url = self
            .store
            .signed_url(Method::PUT, &path, INTERNAL_SIGNATURE_TTL)
            .await?;

        let response = self
            .http
            .put(url)
            .header(header::CONTENT_LENGTH, size)
            .body(reqwest::Body::wrap_stream(body.into_stream()))
            .send()
            .await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::error_status(response).await)
        }
    }

    async fn presigned_get_object(&self, key: &str, expiry: Duration) -> Result<Url> {
        let url = self
            .store
            .signed_url(Method::GET, &ObjectPath::from(key), expiry)
            .await?;
        Ok(url)
    }
}

/// Stream a body of unknown length as a multipart upload. The upload is
/// aborted if the body fails part way, so nothing is left at `path`.
async fn upload_in_parts(
    store: &dyn ObjectStore,
    path: &ObjectPath,
    mut stream: ByteStream,
) -> Result<()> {
    let upload = store.put_multipart(path).await?;
    let mut writer = WriteMultipart::new(upload);

    while let Some(chunk) = stream.next().await {
        let step = match chunk {
            Ok(chunk) => match writer.wait_for_capacity(MAX_PARTS_IN_FLIGHT).await {
                Ok(()) => {
                    writer.write(&chunk);
                    Ok(())
                }
                Err(e) => Err(NodeError::from(e)),
            },
            Err(e) => Err(NodeError::from(e)),
        };
        if let Err(e) = step {
            if let Err(abort) = writer.abort().await {
                tracing::warn!(%path, "failed to abort multipart upload: {}", abort);
            }
            return Err(e);
        }
    }

    writer.finish().await?;
    Ok(())
}

/// Connects to nodes over plain HTTP on their discovered address.
#[derive(Debug, Clone)]
pub struct S3Connector {
    http: reqwest::Client,
    region: Option<String>,
    connect_timeout: Duration,
}

impl S3Connector {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            region: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }
}

#[async_trait]
impl NodeConnector for S3Connector {
    async fn connect(
        &self,
        address: &str,
        credentials: &Credentials,
        bucket: &str,
    ) -> Result<DynNodeClient> {
        let endpoint = if address.starts_with("http://") || address.starts_with("https://") {
            address.to_string()
        } else {
            format!("http://{}", address)
        };
        let mut config = S3NodeConfig::new(endpoint, credentials.clone(), bucket)
            .with_connect_timeout(self.connect_timeout);
        if let Some(region) = &self.region {
            config = config.with_region(region.clone());
        }
        Ok(Arc::new(S3NodeClient::new(config, self.http.clone())?))
    }
}
