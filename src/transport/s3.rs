// shuttle/src/transport/s3.rs
use super::sigv4::{encode_key, hex_sha256, Credentials, Signer, EMPTY_PAYLOAD_HASH};
use super::{key_prefix, TransportOverrides, Transporter};
use crate::core::{FileHandle, Result, ShuttleError};
use chrono::Utc;
use reqwest::blocking::{Body, Client, Response};
use reqwest::Method;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::time::Duration;
use url::Url;

const MB: u64 = 1024 * 1024;
/// Files at or above this size go through a multipart upload.
pub const MULTIPART_THRESHOLD: u64 = 100 * MB;
pub const PART_SIZE: u64 = 10 * MB;

#[derive(Debug, Clone)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    pub credentials: Credentials,
    /// Replaces the AWS host, e.g. `http://localhost:9000` for an S3-compatible store.
    pub endpoint: Option<String>,
    pub folder: String,
    pub acl: String,
    pub storage_class: String,
    pub encryption: Option<String>,
    pub return_url: bool,
    pub metadata: BTreeMap<String, String>,
}

impl S3Config {
    pub fn new(bucket: impl Into<String>, region: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            bucket: bucket.into(),
            region: region.into(),
            credentials,
            endpoint: None,
            folder: String::new(),
            acl: "public-read".to_string(),
            storage_class: "STANDARD".to_string(),
            encryption: None,
            return_url: true,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_folder(mut self, folder: impl Into<String>) -> Self {
        self.folder = folder.into();
        self
    }

    pub fn with_acl(mut self, acl: impl Into<String>) -> Self {
        self.acl = acl.into();
        self
    }

    pub fn with_storage_class(mut self, storage_class: impl Into<String>) -> Self {
        self.storage_class = storage_class.into();
        self
    }

    pub fn with_encryption(mut self, encryption: impl Into<String>) -> Self {
        self.encryption = Some(encryption.into());
        self
    }

    pub fn with_return_url(mut self, return_url: bool) -> Self {
        self.return_url = return_url;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Where an object lives, as recovered from a locator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Location {
    pub bucket: String,
    pub key: String,
    pub region: String,
}

/// Object storage over the S3 REST API with path-style addressing.
pub struct S3Transporter {
    config: S3Config,
    signer: Signer,
    client: Client,
    base: Url,
}

impl S3Transporter {
    pub fn new(config: S3Config) -> Result<Self> {
        if config.bucket.trim().is_empty() {
            return Err(ShuttleError::Config("Please provide an S3 bucket".to_string()));
        }
        if config.region.trim().is_empty() {
            return Err(ShuttleError::Config("Please provide an AWS region".to_string()));
        }

        let endpoint = match &config.endpoint {
            Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
            None => format!("https://{}", default_host(&config.region)),
        };
        let base = Url::parse(&endpoint)
            .map_err(|e| ShuttleError::Config(format!("Invalid S3 endpoint {}: {}", endpoint, e)))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| ShuttleError::RuntimeUnavailable(format!("HTTP client unavailable: {}", e)))?;

        let signer = Signer::new(config.credentials.clone(), config.region.clone(), "s3");
        Ok(Self {
            config,
            signer,
            client,
            base,
        })
    }

    pub fn config(&self) -> &S3Config {
        &self.config
    }

    /// Object URL for `key` in `bucket`.
    pub fn object_url(&self, bucket: &str, key: &str) -> Result<Url> {
        let raw = format!(
            "{}/{}/{}",
            self.base.as_str().trim_end_matches('/'),
            bucket,
            encode_key(key)
        );
        Url::parse(&raw).map_err(|e| ShuttleError::Config(format!("Invalid object URL {}: {}", raw, e)))
    }

    /// Reads a locator back into bucket, key and region. Accepts URLs under
    /// the configured endpoint, path-style URLs
    /// (`https://s3-eu-west-1.amazonaws.com/bucket/key`), virtual-host URLs
    /// (`https://bucket.s3.amazonaws.com/key`) and bare keys, which use the
    /// configured bucket and region.
    pub fn parse_url(&self, locator: &str) -> S3Location {
        let mut location = S3Location {
            bucket: self.config.bucket.clone(),
            key: locator.to_string(),
            region: self.config.region.clone(),
        };

        let base = self.base.as_str().trim_end_matches('/');
        if let Some(path) = locator
            .strip_prefix(base)
            .and_then(|rest| rest.strip_prefix('/'))
        {
            let path = path.split(['?', '#']).next().unwrap_or_default();
            if let Some((bucket, key)) = path.split_once('/') {
                location.bucket = bucket.to_string();
                location.key = percent_decode(key).trim_matches('/').to_string();
                return location;
            }
        }

        let parsed = Url::parse(locator).ok().filter(|url| {
            url.host_str()
                .is_some_and(|host| host.ends_with("amazonaws.com"))
        });
        if let Some(url) = parsed {
            let host = url.host_str().unwrap_or_default();
            let path = url.path().trim_start_matches('/');

            if let Some(rest) = host.strip_prefix("s3") {
                // s3<region>.amazonaws.com/<bucket>/<key>
                let region = rest.trim_end_matches("amazonaws.com").trim_matches(|c| c == '.' || c == '-');
                if let Some((bucket, key)) = path.split_once('/') {
                    location.bucket = bucket.to_string();
                    location.key = key.to_string();
                }
                if !region.is_empty() {
                    location.region = region.to_string();
                }
            } else if let Some((bucket, rest)) = host.split_once(".s3") {
                // <bucket>.s3<region>.amazonaws.com/<key>
                let region = rest.trim_end_matches("amazonaws.com").trim_matches(|c| c == '.' || c == '-');
                location.bucket = bucket.to_string();
                location.key = path.to_string();
                if !region.is_empty() {
                    location.region = region.to_string();
                }
            }

            location.key = percent_decode(&location.key);
        }

        location.key = location.key.trim_matches('/').to_string();
        location
    }

    fn send(
        &self,
        method: Method,
        url: &Url,
        headers: &[(String, String)],
        payload_hash: &str,
        body: Option<Body>,
    ) -> Result<Response> {
        let signed = self
            .signer
            .sign(method.as_str(), url, headers, payload_hash, Utc::now())?;

        let mut request = self.client.request(method, url.clone());
        for (name, value) in &signed {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(body) = body {
            request = request.body(body);
        }

        let response = request.send()?;
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let text = response.text().unwrap_or_default();
            Err(ShuttleError::Transportation(format!(
                "S3 responded {} for {}: {}",
                status,
                url.path(),
                error_message(&text)
            )))
        }
    }

    fn put_object(&self, file: &FileHandle, url: &Url, overrides: &TransportOverrides) -> Result<()> {
        let size = file.size()?;
        let payload_hash = hash_file(file.path())?;

        let mut headers = vec![
            ("content-type".to_string(), file.mime_type()?),
            ("content-length".to_string(), size.to_string()),
        ];
        headers.extend(self.object_headers(overrides));

        let body = Body::sized(File::open(file.path())?, size);
        self.send(Method::PUT, url, &headers, &payload_hash, Some(body))?;
        Ok(())
    }

    fn multipart_upload(&self, file: &FileHandle, url: &Url, overrides: &TransportOverrides) -> Result<()> {
        let mut create_url = url.clone();
        create_url.set_query(Some("uploads"));

        let mut headers = vec![("content-type".to_string(), file.mime_type()?)];
        headers.extend(self.object_headers(overrides));
        let response = self.send(Method::POST, &create_url, &headers, EMPTY_PAYLOAD_HASH, None)?;
        let upload_id = xml_value(&response.text()?, "UploadId").ok_or_else(|| {
            ShuttleError::Transportation("S3 did not return an upload id".to_string())
        })?;

        log::debug!("Started multipart upload {} for {}", upload_id, file.basename());
        match self.upload_parts(file, url, &upload_id) {
            Ok(()) => Ok(()),
            Err(e) => {
                let mut abort_url = url.clone();
                abort_url
                    .query_pairs_mut()
                    .append_pair("uploadId", &upload_id);
                if let Err(abort) = self.send(Method::DELETE, &abort_url, &[], EMPTY_PAYLOAD_HASH, None) {
                    log::warn!("Could not abort multipart upload {}: {}", upload_id, abort);
                }
                Err(e)
            }
        }
    }

    fn upload_parts(&self, file: &FileHandle, url: &Url, upload_id: &str) -> Result<()> {
        let size = file.size()?;
        let mut source = File::open(file.path())?;
        let mut etags = Vec::new();
        let mut offset = 0;

        while offset < size {
            let length = PART_SIZE.min(size - offset);
            let mut chunk = vec![0u8; length as usize];
            source.seek(SeekFrom::Start(offset))?;
            source.read_exact(&mut chunk)?;

            let number = etags.len() + 1;
            let mut part_url = url.clone();
            part_url
                .query_pairs_mut()
                .append_pair("partNumber", &number.to_string())
                .append_pair("uploadId", upload_id);

            let headers = vec![("content-length".to_string(), length.to_string())];
            let payload_hash = hex_sha256(&chunk);
            let response = self.send(Method::PUT, &part_url, &headers, &payload_hash, Some(Body::from(chunk)))?;
            let etag = response
                .headers()
                .get("etag")
                .and_then(|v| v.to_str().ok())
                .ok_or_else(|| ShuttleError::Transportation(format!("Part {} returned no ETag", number)))?
                .to_string();

            log::debug!("Uploaded part {} ({} bytes)", number, length);
            etags.push(etag);
            offset += length;
        }

        let parts: String = etags
            .iter()
            .enumerate()
            .map(|(i, etag)| format!("<Part><PartNumber>{}</PartNumber><ETag>{}</ETag></Part>", i + 1, etag))
            .collect();
        let body = format!("<CompleteMultipartUpload>{}</CompleteMultipartUpload>", parts);

        let mut complete_url = url.clone();
        complete_url.query_pairs_mut().append_pair("uploadId", upload_id);
        let payload_hash = hex_sha256(body.as_bytes());
        let response = self.send(Method::POST, &complete_url, &[], &payload_hash, Some(Body::from(body)))?;

        // A failed completion can still arrive as 200 with an error document.
        let text = response.text()?;
        if text.contains("<Error>") {
            return Err(ShuttleError::Transportation(error_message(&text)));
        }
        Ok(())
    }

    fn object_headers(&self, overrides: &TransportOverrides) -> Vec<(String, String)> {
        let mut headers = Vec::new();

        let acl = overrides.acl.as_deref().unwrap_or(&self.config.acl);
        if !acl.is_empty() {
            headers.push(("x-amz-acl".to_string(), acl.to_string()));
        }
        let storage_class = overrides
            .storage_class
            .as_deref()
            .unwrap_or(&self.config.storage_class);
        if !storage_class.is_empty() {
            headers.push(("x-amz-storage-class".to_string(), storage_class.to_string()));
        }
        if let Some(encryption) = overrides
            .encryption
            .as_deref()
            .or(self.config.encryption.as_deref())
            .filter(|e| !e.is_empty())
        {
            headers.push(("x-amz-server-side-encryption".to_string(), encryption.to_string()));
        }

        let mut metadata = self.config.metadata.clone();
        metadata.extend(overrides.metadata.clone());
        for (key, value) in metadata {
            headers.push((format!("x-amz-meta-{}", key.to_lowercase()), value));
        }
        headers
    }
}

impl Transporter for S3Transporter {
    fn transport(&self, file: &mut FileHandle, overrides: &TransportOverrides) -> Result<String> {
        let folder = overrides.folder.as_deref().unwrap_or(&self.config.folder);
        let key = format!("{}{}", key_prefix(folder), file.basename());
        let url = self.object_url(&self.config.bucket, &key)?;
        let size = file.size()?;

        log::debug!("Sending {} ({} bytes) to s3://{}/{}", file.basename(), size, self.config.bucket, key);
        let result = if size >= MULTIPART_THRESHOLD {
            self.multipart_upload(file, &url, overrides)
        } else {
            self.put_object(file, &url, overrides)
        };

        result.map_err(|e| {
            ShuttleError::Transportation(format!(
                "Failed to transport {} to Amazon S3: {}",
                file.basename(),
                e.message()
            ))
        })?;

        file.delete();
        log::info!("Stored s3://{}/{}", self.config.bucket, key);

        if overrides.return_url.unwrap_or(self.config.return_url) {
            Ok(url.to_string())
        } else {
            Ok(key)
        }
    }

    fn delete(&self, locator: &str) -> bool {
        let location = self.parse_url(locator);
        let url = match self.object_url(&location.bucket, &location.key) {
            Ok(url) => url,
            Err(e) => {
                log::warn!("Could not delete {}: {}", locator, e);
                return false;
            }
        };

        match self.send(Method::DELETE, &url, &[], EMPTY_PAYLOAD_HASH, None) {
            Ok(_) => true,
            Err(e) => {
                log::warn!("Could not delete {}: {}", locator, e);
                false
            }
        }
    }
}

fn default_host(region: &str) -> String {
    if region == "us-east-1" {
        "s3.amazonaws.com".to_string()
    } else {
        format!("s3.{}.amazonaws.com", region)
    }
}

fn hash_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

fn xml_value(document: &str, tag: &str) -> Option<String> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let start = document.find(&open)? + open.len();
    let end = start + document[start..].find(&close)?;
    Some(document[start..end].to_string())
}

fn error_message(document: &str) -> String {
    match (xml_value(document, "Code"), xml_value(document, "Message")) {
        (Some(code), Some(message)) => format!("{}: {}", code, message),
        (Some(code), None) => code,
        _ => document.chars().take(200).collect(),
    }
}

fn percent_decode(s: &str) -> String {
    url::form_urlencoded::parse(format!("k={}", s.replace('+', "%2B")).as_bytes())
        .next()
        .map(|(_, v)| v.into_owned())
        .unwrap_or_else(|| s.to_string())
}
