use anyhow::{Context, Result};
use futures_util::stream::{self, StreamExt, TryStreamExt};
use poll_until::StatusState;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::io::SeekFrom;
use std::path::Path;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::auth::{AccessToken, TokenCache};
use crate::config::ClientConfig;

const AUTHENTICATE_PATH: &str = "/authentication/v1/authenticate";
const OSS_PATH: &str = "/oss/v1";
const VIEWING_PATH: &str = "/viewingservice/v1";

/// Retention policy of a storage bucket
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BucketPolicy {
    /// Objects removed after 24 hours
    #[default]
    Transient,
    /// Objects removed after 30 days
    Temporary,
    Persistent,
}

/// Body of a create bucket request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketCreationData {
    pub bucket_key: String,
    #[serde(default)]
    pub services_allowed: Vec<String>,
    pub policy: BucketPolicy,
}

impl BucketCreationData {
    pub fn transient(bucket_key: impl Into<String>) -> Self {
        Self {
            bucket_key: bucket_key.into(),
            services_allowed: Vec::new(),
            policy: BucketPolicy::Transient,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BucketPermission {
    pub service_id: String,
    pub access: String,
}

/// Bucket details as returned by the details and create endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketDetails {
    #[serde(alias = "bucketKey")]
    pub key: String,
    #[serde(default)]
    pub owner: String,
    #[serde(default, rename = "createDate")]
    pub create_date: Option<i64>,
    #[serde(default)]
    pub permissions: Vec<BucketPermission>,
    #[serde(default, alias = "policyKey")]
    pub policy: Option<BucketPolicy>,
}

/// One entry of the bucket listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketSummary {
    #[serde(rename = "bucketKey", alias = "key")]
    pub bucket_key: String,
    #[serde(default, rename = "createdDate")]
    pub created_date: Option<i64>,
    #[serde(default, rename = "policyKey", alias = "policy")]
    pub policy_key: Option<BucketPolicy>,
}

/// Stored object as reported after an upload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ObjectDetails {
    /// Object id, the input of [`crate::urn::to_base64`]
    pub id: String,
    pub key: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub location: String,
    #[serde(default, rename = "sha-1")]
    pub sha1: Option<String>,
    #[serde(default, rename = "content-type")]
    pub content_type: Option<String>,
}

/// Response from a plain upload or from one resumable chunk
///
/// Intermediate chunks of a resumable upload come back with an empty body and
/// no objects.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UploadResponse {
    #[serde(default, rename = "bucket-key")]
    pub bucket_key: String,
    #[serde(default)]
    pub objects: Vec<ObjectDetails>,
}

impl UploadResponse {
    /// Id of the first uploaded object
    pub fn object_id(&self) -> Option<&str> {
        self.objects.first().map(|o| o.id.as_str())
    }
}

/// Result of [`ViewDataClient::resumable_upload`]
#[derive(Debug, Clone)]
pub struct ResumableUpload {
    pub session_id: String,
    /// One response per chunk, in chunk order
    pub chunks: Vec<UploadResponse>,
}

impl ResumableUpload {
    /// Details of the assembled object, reported by the final chunk
    pub fn object(&self) -> Option<&ObjectDetails> {
        self.chunks.iter().rev().find_map(|c| c.objects.first())
    }
}

/// Byte range of one resumable upload chunk (`end` inclusive)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRange {
    pub index: usize,
    pub start: u64,
    pub end: u64,
}

impl ChunkRange {
    pub fn size(&self) -> u64 {
        self.end - self.start + 1
    }

    /// `Content-Range` header value for a file of `total` bytes
    pub fn content_range(&self, total: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, total)
    }
}

/// Split `total` bytes into consecutive chunks of at most `chunk_size`
pub fn chunk_ranges(total: u64, chunk_size: u64) -> Vec<ChunkRange> {
    if total == 0 || chunk_size == 0 {
        return Vec::new();
    }

    (0..total.div_ceil(chunk_size))
        .map(|i| {
            let start = i * chunk_size;
            ChunkRange {
                index: i as usize,
                start,
                end: (start + chunk_size).min(total) - 1,
            }
        })
        .collect()
}

/// Translation manifest (also returned, in shorter form, by the status endpoint)
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Manifest {
    pub guid: String,
    pub urn: String,
    pub status: String,
    /// "complete" or e.g. "45% complete"
    pub progress: String,
    pub success: String,
    pub children: Vec<ManifestNode>,
}

impl Manifest {
    /// Map the manifest status onto the polling states
    ///
    /// - `failed` / `timeout` -> Failed
    /// - `success` with progress `complete` -> Success
    /// - `success` still progressing, `inprogress` -> InProgress
    /// - anything else (`pending`, empty) -> Pending
    pub fn state(&self) -> StatusState {
        match self.status.to_ascii_lowercase().as_str() {
            "failed" | "timeout" => StatusState::Failed,
            "success" if self.is_complete() => StatusState::Success,
            "success" | "inprogress" => StatusState::InProgress,
            _ => StatusState::Pending,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.progress.is_empty() || self.progress.eq_ignore_ascii_case("complete")
    }
}

/// Response of the register endpoint
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct RegisterResponse {
    /// "Success" when derivatives exist, "Created" when a job was queued
    #[serde(default, rename = "Result")]
    pub result: String,
}

impl RegisterResponse {
    pub fn is_accepted(&self) -> bool {
        matches!(self.result.as_str(), "Success" | "Created")
    }
}

/// Node of the manifest derivative tree
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct ManifestNode {
    pub guid: String,
    #[serde(rename = "type")]
    pub node_type: String,
    pub role: String,
    pub mime: String,
    pub name: String,
    pub status: String,
    pub progress: String,
    /// Item URN, set on `resource` nodes
    pub urn: Option<String>,
    pub children: Vec<ManifestNode>,
}

/// File formats the viewing service can translate
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SupportedFormats {
    #[serde(default)]
    pub extensions: Vec<String>,
}

/// API client for the View & Data service
#[derive(Clone)]
pub struct ViewDataClient {
    client: Client,
    config: ClientConfig,
    tokens: TokenCache,
}

impl ViewDataClient {
    /// Create a new client
    ///
    /// Fails if `config` does not pass [`ClientConfig::validate`].
    pub fn new(mut config: ClientConfig) -> Result<Self> {
        config.validate().context("Invalid client configuration")?;

        let client = Client::builder()
            .timeout(config.http_timeout)
            .build()
            .context("Failed to build HTTP client")?;

        config.base_url = config.base_url.trim_end_matches('/').to_string();

        Ok(Self {
            client,
            config,
            tokens: TokenCache::new(),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    /// Bearer token for the next request, refreshed when close to expiry
    async fn bearer(&self) -> Result<String> {
        self.tokens.get_or_refresh(|| self.get_token()).await
    }

    /// Request a fresh two-legged access token
    ///
    /// Does not touch the token cache; see [`ViewDataClient::initialize`].
    pub async fn get_token(&self) -> Result<AccessToken> {
        let url = self.url(AUTHENTICATE_PATH);
        let scope = self.config.scope.join(" ");
        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("grant_type", "client_credentials"),
            ("scope", scope.as_str()),
        ];

        tracing::debug!("🔑 Requesting access token: {}", url);

        let response = self
            .client
            .post(&url)
            .form(&params)
            .send()
            .await
            .context("Failed to send token request")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = error_text(response).await;
            tracing::error!("❌ Token request failed with status {}: {}", status, error_text);
            anyhow::bail!("Token request failed with status {}: {}", status, error_text)
        }

        response
            .json::<AccessToken>()
            .await
            .context("Failed to parse token response")
    }

    /// Fetch a token and cache it for subsequent calls
    pub async fn initialize(&self) -> Result<AccessToken> {
        let token = self.get_token().await?;
        tracing::info!("✅ Access token acquired (expires in {}s)", token.expires_in);
        self.tokens.store(token.clone()).await;
        Ok(token)
    }

    /// Get bucket details
    ///
    /// # Returns
    /// * `Ok(Some(details))` - Bucket exists
    /// * `Ok(None)` - Bucket not found
    /// * `Err(_)` - Request failed
    pub async fn get_bucket_details(&self, bucket_key: &str) -> Result<Option<BucketDetails>> {
        let url = self.url(&format!(
            "{}/buckets/{}/details",
            OSS_PATH,
            urlencoding::encode(bucket_key)
        ));

        let response = self
            .client
            .get(&url)
            .bearer_auth(self.bearer().await?)
            .send()
            .await
            .context("Failed to send bucket details request")?;

        match response.status() {
            StatusCode::OK => {
                let details = response
                    .json::<BucketDetails>()
                    .await
                    .context("Failed to parse bucket details")?;
                Ok(Some(details))
            }
            StatusCode::NOT_FOUND => Ok(None),
            status => {
                let error_text = error_text(response).await;
                anyhow::bail!("Bucket details failed with status {}: {}", status, error_text)
            }
        }
    }

    /// Create a bucket
    pub async fn create_bucket(&self, data: &BucketCreationData) -> Result<BucketDetails> {
        let url = self.url(&format!("{}/buckets", OSS_PATH));

        tracing::info!(
            "🪣 Creating bucket {} (policy={:?})",
            data.bucket_key,
            data.policy
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.bearer().await?)
            .json(data)
            .send()
            .await
            .context("Failed to send create bucket request")?;

        match response.status() {
            status if status.is_success() => response
                .json::<BucketDetails>()
                .await
                .context("Failed to parse create bucket response"),
            StatusCode::CONFLICT => {
                anyhow::bail!("Bucket {} already exists", data.bucket_key)
            }
            status => {
                let error_text = error_text(response).await;
                tracing::error!("❌ Create bucket failed with status {}: {}", status, error_text);
                anyhow::bail!("Create bucket failed with status {}: {}", status, error_text)
            }
        }
    }

    /// Get a bucket, creating it from `creation_data` if it does not exist
    /// and `create_if_not_exists` is set
    pub async fn get_bucket(
        &self,
        bucket_key: &str,
        create_if_not_exists: bool,
        creation_data: &BucketCreationData,
    ) -> Result<BucketDetails> {
        if let Some(details) = self.get_bucket_details(bucket_key).await? {
            return Ok(details);
        }

        if !create_if_not_exists {
            anyhow::bail!("Bucket not found: {}", bucket_key)
        }

        self.create_bucket(creation_data).await
    }

    /// List buckets owned by the application
    pub async fn list_buckets(&self) -> Result<Vec<BucketSummary>> {
        let url = self.url(&format!("{}/buckets", OSS_PATH));

        let response = self
            .client
            .get(&url)
            .bearer_auth(self.bearer().await?)
            .send()
            .await
            .context("Failed to send list buckets request")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = error_text(response).await;
            anyhow::bail!("List buckets failed with status {}: {}", status, error_text)
        }

        #[derive(Deserialize)]
        struct ListResponse {
            #[serde(default)]
            items: Vec<BucketSummary>,
        }

        let result = response
            .json::<ListResponse>()
            .await
            .context("Failed to parse bucket list")?;

        Ok(result.items)
    }

    /// Upload a file in a single request
    pub async fn upload(
        &self,
        file: &Path,
        bucket_key: &str,
        object_key: &str,
    ) -> Result<UploadResponse> {
        let url = self.object_url(bucket_key, object_key, "");
        let bytes = tokio::fs::read(file)
            .await
            .with_context(|| format!("Failed to read {}", file.display()))?;

        tracing::info!(
            "Uploading {}: bucket={} key={} size={} bytes",
            file.display(),
            bucket_key,
            object_key,
            bytes.len()
        );

        let response = self
            .client
            .put(&url)
            .bearer_auth(self.bearer().await?)
            .header("Content-Type", "application/octet-stream")
            .body(bytes)
            .send()
            .await
            .context("Failed to upload file")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = error_text(response).await;
            tracing::error!("❌ Upload failed with status {}: {}", status, error_text);
            anyhow::bail!("Upload failed with status {}: {}", status, error_text)
        }

        response
            .json::<UploadResponse>()
            .await
            .context("Failed to parse upload response")
    }

    /// Upload a file in chunks sharing one upload session
    ///
    /// All chunks but the last are sent with up to `max_parallel_chunks` in
    /// flight; the last chunk is sent once the others succeeded, and its
    /// response describes the assembled object.
    pub async fn resumable_upload(
        &self,
        file: &Path,
        bucket_key: &str,
        object_key: &str,
    ) -> Result<ResumableUpload> {
        let total = tokio::fs::metadata(file)
            .await
            .with_context(|| format!("Failed to read metadata of {}", file.display()))?
            .len();

        let ranges = chunk_ranges(total, self.config.chunk_size as u64);
        let Some((last, rest)) = ranges.split_last() else {
            anyhow::bail!("Cannot upload empty file {}", file.display())
        };

        let url = self.object_url(bucket_key, object_key, "/resumable");
        let session_id = uuid::Uuid::new_v4().to_string();

        tracing::info!(
            "Resumable upload of {}: bucket={} key={} size={} bytes chunks={} session={}",
            file.display(),
            bucket_key,
            object_key,
            total,
            ranges.len(),
            session_id
        );

        let mut responses: Vec<(usize, UploadResponse)> = stream::iter(rest.iter().copied())
            .map(|range| self.upload_chunk(file, &url, &session_id, range, total))
            .buffer_unordered(self.config.max_parallel_chunks)
            .try_collect()
            .await?;

        responses.push(
            self.upload_chunk(file, &url, &session_id, *last, total)
                .await?,
        );
        responses.sort_by_key(|(index, _)| *index);

        Ok(ResumableUpload {
            session_id,
            chunks: responses.into_iter().map(|(_, response)| response).collect(),
        })
    }

    async fn upload_chunk(
        &self,
        file: &Path,
        url: &str,
        session_id: &str,
        range: ChunkRange,
        total: u64,
    ) -> Result<(usize, UploadResponse)> {
        let data = read_chunk(file, range).await?;

        tracing::debug!(
            "📤 Uploading chunk {} ({}) session={}",
            range.index,
            range.content_range(total),
            session_id
        );

        let response = self
            .client
            .put(url)
            .bearer_auth(self.bearer().await?)
            .header("Content-Type", "application/octet-stream")
            .header("Content-Range", range.content_range(total))
            .header("Session-Id", session_id)
            .body(data)
            .send()
            .await
            .with_context(|| format!("Failed to upload chunk {}", range.index))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = error_text(response).await;
            tracing::error!(
                "❌ Chunk {} failed with status {}: {}",
                range.index,
                status,
                error_text
            );
            anyhow::bail!(
                "Chunk {} upload failed with status {}: {}",
                range.index,
                status,
                error_text
            )
        }

        let body = response
            .text()
            .await
            .with_context(|| format!("Failed to read chunk {} response", range.index))?;

        let parsed = if body.trim().is_empty() {
            UploadResponse::default()
        } else {
            serde_json::from_str(&body)
                .with_context(|| format!("Failed to parse chunk {} response: {}", range.index, body))?
        };

        Ok((range.index, parsed))
    }

    fn object_url(&self, bucket_key: &str, object_key: &str, suffix: &str) -> String {
        self.url(&format!(
            "{}/buckets/{}/objects/{}{}",
            OSS_PATH,
            urlencoding::encode(bucket_key),
            urlencoding::encode(object_key),
            suffix
        ))
    }

    /// Submit a model for translation
    ///
    /// # Arguments
    /// * `urn` - base64 object id (see [`crate::urn::to_base64`])
    /// * `force` - re-translate even if derivatives already exist
    pub async fn register(&self, urn: &str, force: bool) -> Result<RegisterResponse> {
        let url = self.url(&format!("{}/register", VIEWING_PATH));

        #[derive(Serialize)]
        struct RegisterRequest<'a> {
            urn: &'a str,
        }

        let mut builder = self
            .client
            .post(&url)
            .bearer_auth(self.bearer().await?)
            .json(&RegisterRequest { urn });

        if force {
            builder = builder.header("x-ads-force", "true");
        }

        let response = builder
            .send()
            .await
            .context("Failed to send register request")?;

        match response.status() {
            StatusCode::OK | StatusCode::CREATED => {
                let body = response
                    .text()
                    .await
                    .context("Failed to read register response")?;

                let parsed: RegisterResponse = if body.trim().is_empty() {
                    RegisterResponse::default()
                } else {
                    serde_json::from_str(&body)
                        .with_context(|| format!("Failed to parse register response: {}", body))?
                };

                tracing::info!("✅ Registered {} for translation: {}", urn, parsed.result);
                Ok(parsed)
            }
            status => {
                let error_text = error_text(response).await;
                tracing::error!("❌ Register failed with status {}: {}", status, error_text);
                anyhow::bail!("Register failed with status {}: {}", status, error_text)
            }
        }
    }

    /// Full manifest of a registered model
    pub async fn get_manifest(&self, urn: &str) -> Result<Manifest> {
        self.fetch_manifest(&format!("{}/{}", VIEWING_PATH, urlencoding::encode(urn)), urn)
            .await
    }

    /// Translation status of a registered model (manifest without derivatives)
    pub async fn get_status(&self, urn: &str) -> Result<Manifest> {
        self.fetch_manifest(
            &format!("{}/{}/status", VIEWING_PATH, urlencoding::encode(urn)),
            urn,
        )
            .await
    }

    async fn fetch_manifest(&self, path: &str, urn: &str) -> Result<Manifest> {
        let url = self.url(path);

        let response = self
            .client
            .get(&url)
            .bearer_auth(self.bearer().await?)
            .send()
            .await
            .context("Failed to send manifest request")?;

        match response.status() {
            StatusCode::OK => response
                .json::<Manifest>()
                .await
                .context("Failed to parse manifest"),
            StatusCode::NOT_FOUND => anyhow::bail!("Model not registered: {}", urn),
            status => {
                let error_text = error_text(response).await;
                anyhow::bail!("Manifest request failed with status {}: {}", status, error_text)
            }
        }
    }

    /// Thumbnail image of a translated model
    pub async fn get_thumbnail(
        &self,
        urn: &str,
        width: Option<u32>,
        height: Option<u32>,
    ) -> Result<Vec<u8>> {
        let url = self.url(&format!(
            "{}/thumbnails/{}",
            VIEWING_PATH,
            urlencoding::encode(urn)
        ));

        let mut query = Vec::new();
        if let Some(width) = width {
            query.push(("width", width));
        }
        if let Some(height) = height {
            query.push(("height", height));
        }

        let mut builder = self.client.get(&url).bearer_auth(self.bearer().await?);
        if !query.is_empty() {
            builder = builder.query(&query);
        }

        let response = builder
            .send()
            .await
            .context("Failed to send thumbnail request")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = error_text(response).await;
            anyhow::bail!("Thumbnail failed with status {}: {}", status, error_text)
        }

        let bytes = response
            .bytes()
            .await
            .context("Failed to read thumbnail bytes")?
            .to_vec();

        Ok(bytes)
    }

    /// File extensions accepted for translation
    pub async fn get_supported_formats(&self) -> Result<SupportedFormats> {
        let url = self.url(&format!("{}/supported", VIEWING_PATH));

        let response = self
            .client
            .get(&url)
            .bearer_auth(self.bearer().await?)
            .send()
            .await
            .context("Failed to send supported formats request")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = error_text(response).await;
            anyhow::bail!("Supported formats failed with status {}: {}", status, error_text)
        }

        response
            .json::<SupportedFormats>()
            .await
            .context("Failed to parse supported formats")
    }

    /// Download one derivative item by its manifest URN
    pub async fn get_item(&self, item_urn: &str) -> Result<Vec<u8>> {
        let url = self.url(&format!(
            "{}/items/{}",
            VIEWING_PATH,
            urlencoding::encode(item_urn)
        ));

        let response = self
            .client
            .get(&url)
            .bearer_auth(self.bearer().await?)
            .send()
            .await
            .context("Failed to download item")?;

        if response.status() == StatusCode::NOT_FOUND {
            anyhow::bail!("Item not found: {}", item_urn)
        }

        let status = response.status();
        if !status.is_success() {
            let error_text = error_text(response).await;
            anyhow::bail!("Item download failed with status {}: {}", status, error_text)
        }

        let bytes = response
            .bytes()
            .await
            .context("Failed to read item bytes")?
            .to_vec();

        Ok(bytes)
    }
}

async fn error_text(response: Response) -> String {
    response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string())
}

async fn read_chunk(file: &Path, range: ChunkRange) -> Result<Vec<u8>> {
    let mut handle = tokio::fs::File::open(file)
        .await
        .with_context(|| format!("Failed to open {}", file.display()))?;

    handle
        .seek(SeekFrom::Start(range.start))
        .await
        .with_context(|| format!("Failed to seek to chunk {}", range.index))?;

    let mut buffer = vec![0u8; range.size() as usize];
    handle
        .read_exact(&mut buffer)
        .await
        .with_context(|| format!("Failed to read chunk {}", range.index))?;

    Ok(buffer)
}
