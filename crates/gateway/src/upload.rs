use bytes::{Bytes, BytesMut};
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use darkroom_core::CallerIdentity;
use reqwest::multipart::{Form, Part};
use tracing::{debug, info, instrument};

use crate::credentials::CredentialResolver;
use crate::error::GatewayError;
use crate::forwarder::{ProxyForwarder, ProxyResponse};

/// Upstream endpoint that creates assets.
pub const ASSETS_PATH: &str = "/assets";

/// Name of the inbound multipart field carrying the file.
pub const FILE_FIELD: &str = "file";

const FALLBACK_MIME: &str = "application/octet-stream";

/// A file received from the caller, held whole in memory until repackaged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadItem {
    pub filename: String,
    /// MIME type the caller declared for the part, if any.
    pub content_type: Option<String>,
    pub data: Bytes,
}

impl UploadItem {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Timestamp hints sent by the caller alongside the file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadHints {
    pub file_created_at: Option<DateTime<Utc>>,
    pub file_modified_at: Option<DateTime<Utc>>,
    /// Browser `File.lastModified`, in unix milliseconds on the wire.
    pub last_modified: Option<DateTime<Utc>>,
}

impl UploadHints {
    /// Record a text field if it is a recognised hint. Unparseable values are
    /// dropped. Returns whether the field was used.
    pub fn apply_field(&mut self, name: &str, value: &str) -> bool {
        let value = value.trim();
        match name {
            "fileCreatedAt" => {
                self.file_created_at = parse_rfc3339(value);
                self.file_created_at.is_some()
            }
            "fileModifiedAt" => {
                self.file_modified_at = parse_rfc3339(value);
                self.file_modified_at.is_some()
            }
            "lastModified" => {
                self.last_modified = value
                    .parse::<i64>()
                    .ok()
                    .and_then(|ms| Utc.timestamp_millis_opt(ms).single());
                self.last_modified.is_some()
            }
            _ => false,
        }
    }
}

fn parse_rfc3339(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[derive(Debug)]
enum IngestState {
    AwaitingFile,
    Receiving {
        filename: String,
        content_type: Option<String>,
        buf: BytesMut,
    },
    Received(UploadItem),
}

/// Accumulates one upload from a multipart stream, part by part.
///
/// The HTTP layer drives it: text fields go to [`text_field`](Self::text_field),
/// the file part to [`begin_file`](Self::begin_file) /
/// [`push_chunk`](Self::push_chunk) / [`end_file`](Self::end_file). Only the
/// first file part is kept; hints arriving after it are ignored.
#[derive(Debug)]
pub struct UploadIngest {
    hints: UploadHints,
    state: IngestState,
    ignored_files: usize,
}

impl Default for UploadIngest {
    fn default() -> Self {
        Self::new()
    }
}

impl UploadIngest {
    pub fn new() -> Self {
        Self {
            hints: UploadHints::default(),
            state: IngestState::AwaitingFile,
            ignored_files: 0,
        }
    }

    /// `true` until a file part has started.
    pub fn wants_file(&self) -> bool {
        matches!(self.state, IngestState::AwaitingFile)
    }

    /// Offer a non-file field. Returns whether it was used as a hint.
    pub fn text_field(&mut self, name: &str, value: &str) -> bool {
        if !self.wants_file() {
            debug!(field = name, "ignoring field after file part");
            return false;
        }
        self.hints.apply_field(name, value)
    }

    /// Start receiving a file part. Returns `false`, and ignores the part, if
    /// a file has already been received.
    pub fn begin_file(&mut self, filename: Option<&str>, content_type: Option<&str>) -> bool {
        if !self.wants_file() {
            self.ignored_files += 1;
            debug!(ignored = self.ignored_files, "ignoring additional file part");
            return false;
        }
        self.state = IngestState::Receiving {
            filename: filename
                .filter(|f| !f.trim().is_empty())
                .unwrap_or("upload")
                .to_owned(),
            content_type: content_type.map(str::to_owned),
            buf: BytesMut::new(),
        };
        true
    }

    /// Append a chunk to the file part in progress. No-op otherwise.
    pub fn push_chunk(&mut self, chunk: &[u8]) {
        if let IngestState::Receiving { buf, .. } = &mut self.state {
            buf.extend_from_slice(chunk);
        }
    }

    /// Complete the file part in progress.
    pub fn end_file(&mut self) {
        let state = std::mem::replace(&mut self.state, IngestState::AwaitingFile);
        self.state = match state {
            IngestState::Receiving {
                filename,
                content_type,
                buf,
            } => IngestState::Received(UploadItem {
                filename,
                content_type,
                data: buf.freeze(),
            }),
            other => other,
        };
    }

    /// Close the stream. A file part still in progress counts as complete.
    pub fn finish(mut self) -> Result<(UploadItem, UploadHints), GatewayError> {
        self.end_file();
        match self.state {
            IngestState::Received(item) => Ok((item, self.hints)),
            _ => Err(GatewayError::NoFileReceived),
        }
    }
}

/// Metadata the upstream requires when creating an asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadMetadata {
    pub device_asset_id: String,
    pub device_id: String,
    pub file_created_at: DateTime<Utc>,
    pub file_modified_at: DateTime<Utc>,
}

impl UploadMetadata {
    /// Fill in metadata from the caller's hints, falling back to `now`.
    ///
    /// The modification time prefers `fileModifiedAt`, then `lastModified`.
    /// The creation time defaults to the modification time.
    pub fn synthesize(
        item: &UploadItem,
        hints: &UploadHints,
        device_id: &str,
        now: DateTime<Utc>,
    ) -> Self {
        let file_modified_at = hints
            .file_modified_at
            .or(hints.last_modified)
            .unwrap_or(now);
        let file_created_at = hints.file_created_at.unwrap_or(file_modified_at);
        Self {
            device_asset_id: format!("{}-{}", item.filename, item.len()),
            device_id: device_id.to_owned(),
            file_created_at,
            file_modified_at,
        }
    }
}

/// Repackages a caller's file into the upstream's asset-creation request.
///
/// Uploads always go out under the service API key, whoever the operator is.
#[derive(Debug, Clone)]
pub struct UploadIngestor {
    forwarder: ProxyForwarder,
    resolver: CredentialResolver,
}

impl UploadIngestor {
    pub fn new(forwarder: ProxyForwarder, resolver: CredentialResolver) -> Self {
        Self {
            forwarder,
            resolver,
        }
    }

    /// Build the upstream multipart form for `item`.
    pub fn repackage(item: UploadItem, metadata: &UploadMetadata) -> Form {
        Form::new()
            .part("assetData", file_part(item))
            .text("deviceAssetId", metadata.device_asset_id.clone())
            .text("deviceId", metadata.device_id.clone())
            .text("fileCreatedAt", timestamp(metadata.file_created_at))
            .text("fileModifiedAt", timestamp(metadata.file_modified_at))
            .text("isFavorite", "false")
    }

    /// Send `item` upstream and relay the response.
    #[instrument(skip_all, fields(filename = %item.filename, bytes = item.len()))]
    pub async fn upload(
        &self,
        item: UploadItem,
        hints: &UploadHints,
    ) -> Result<ProxyResponse, GatewayError> {
        let headers = self.resolver.resolve(&CallerIdentity::ApiKey)?;
        let metadata = UploadMetadata::synthesize(
            &item,
            hints,
            &self.forwarder.config().device_id,
            Utc::now(),
        );
        let form = Self::repackage(item, &metadata);

        let response = self
            .forwarder
            .forward_multipart(ASSETS_PATH, form, headers)
            .await?;
        info!(
            status = response.status.as_u16(),
            device_asset_id = %metadata.device_asset_id,
            "upload relayed"
        );
        Ok(response)
    }
}

/// The caller's MIME type is kept when it parses, otherwise the part is sent
/// as opaque bytes.
fn file_part(item: UploadItem) -> Part {
    let len = item.data.len() as u64;
    let part = || Part::stream_with_length(item.data.clone(), len).file_name(item.filename.clone());
    item.content_type
        .as_deref()
        .and_then(|ct| part().mime_str(ct).ok())
        .or_else(|| part().mime_str(FALLBACK_MIME).ok())
        .unwrap_or_else(part)
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}
