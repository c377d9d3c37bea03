// shuttle/src/transport/glacier.rs
use super::sigv4::{encode_key, hex_sha256, uri_encode, Credentials, Signer, EMPTY_PAYLOAD_HASH};
use super::{TransportOverrides, Transporter};
use crate::core::{FileHandle, Result, ShuttleError};
use chrono::Utc;
use reqwest::blocking::{Body, Client, Response};
use reqwest::Method;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::time::Duration;
use url::Url;

const MB: u64 = 1024 * 1024;
const GB: u64 = 1024 * MB;
/// Archives at or above this size are uploaded in parts.
pub const MULTIPART_THRESHOLD: u64 = 5 * GB;
/// Glacier parts must be a power-of-two number of megabytes.
pub const PART_SIZE: u64 = 16 * MB;
const TREE_CHUNK: usize = MB as usize;
const API_VERSION: &str = "2012-06-01";

#[derive(Debug, Clone)]
pub struct GlacierConfig {
    pub vault: String,
    pub region: String,
    pub credentials: Credentials,
    pub account_id: String,
    pub endpoint: Option<String>,
}

impl GlacierConfig {
    pub fn new(vault: impl Into<String>, region: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            vault: vault.into(),
            region: region.into(),
            credentials,
            account_id: "-".to_string(),
            endpoint: None,
        }
    }

    pub fn with_account_id(mut self, account_id: impl Into<String>) -> Self {
        let account_id = account_id.into();
        self.account_id = if account_id.is_empty() {
            "-".to_string()
        } else {
            account_id
        };
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }
}

/// Cold storage. Locators are archive ids.
pub struct GlacierTransporter {
    config: GlacierConfig,
    signer: Signer,
    client: Client,
    base: Url,
}

impl GlacierTransporter {
    pub fn new(config: GlacierConfig) -> Result<Self> {
        if config.vault.trim().is_empty() {
            return Err(ShuttleError::Config("Please provide a Glacier vault".to_string()));
        }
        if config.region.trim().is_empty() {
            return Err(ShuttleError::Config("Please provide an AWS region".to_string()));
        }

        let endpoint = match &config.endpoint {
            Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
            None => format!("https://glacier.{}.amazonaws.com", config.region),
        };
        let base = Url::parse(&endpoint).map_err(|e| {
            ShuttleError::Config(format!("Invalid Glacier endpoint {}: {}", endpoint, e))
        })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(600))
            .build()
            .map_err(|e| ShuttleError::RuntimeUnavailable(format!("HTTP client unavailable: {}", e)))?;

        let signer = Signer::new(config.credentials.clone(), config.region.clone(), "glacier");
        Ok(Self {
            config,
            signer,
            client,
            base,
        })
    }

    fn vault_url(&self, suffix: &str) -> Result<Url> {
        let raw = format!(
            "{}/{}/vaults/{}/{}",
            self.base.as_str().trim_end_matches('/'),
            uri_encode(&self.config.account_id),
            uri_encode(&self.config.vault),
            suffix
        );
        Url::parse(&raw).map_err(|e| ShuttleError::Config(format!("Invalid vault URL {}: {}", raw, e)))
    }

    fn send(
        &self,
        method: Method,
        url: &Url,
        headers: &[(String, String)],
        payload_hash: &str,
        body: Option<Body>,
    ) -> Result<Response> {
        let mut headers = headers.to_vec();
        headers.push(("x-amz-glacier-version".to_string(), API_VERSION.to_string()));
        let signed = self
            .signer
            .sign(method.as_str(), url, &headers, payload_hash, Utc::now())?;

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
                "Glacier responded {} for {}: {}",
                status,
                url.path(),
                text.chars().take(200).collect::<String>()
            )))
        }
    }

    fn upload_archive(&self, file: &FileHandle) -> Result<String> {
        let size = file.size()?;
        let (linear, chunks) = hash_file(file.path())?;

        let headers = vec![
            ("content-length".to_string(), size.to_string()),
            ("x-amz-sha256-tree-hash".to_string(), hex::encode(combine_tree(chunks))),
            ("x-amz-archive-description".to_string(), file.basename()),
        ];
        let url = self.vault_url("archives")?;
        let body = Body::sized(File::open(file.path())?, size);
        let response = self.send(Method::POST, &url, &headers, &linear, Some(body))?;
        archive_id(&response)
    }

    fn multipart_upload(&self, file: &FileHandle) -> Result<String> {
        let headers = vec![
            ("x-amz-part-size".to_string(), PART_SIZE.to_string()),
            ("x-amz-archive-description".to_string(), file.basename()),
        ];
        let url = self.vault_url("multipart-uploads")?;
        let response = self.send(Method::POST, &url, &headers, EMPTY_PAYLOAD_HASH, None)?;
        let upload_id = header(&response, "x-amz-multipart-upload-id")?;
        let upload_url = self.vault_url(&format!("multipart-uploads/{}", encode_key(&upload_id)))?;

        log::debug!("Started multipart upload {} for {}", upload_id, file.basename());
        match self.upload_parts(file, &upload_url) {
            Ok(archive) => Ok(archive),
            Err(e) => {
                if let Err(abort) = self.send(Method::DELETE, &upload_url, &[], EMPTY_PAYLOAD_HASH, None) {
                    log::warn!("Could not abort multipart upload {}: {}", upload_id, abort);
                }
                Err(e)
            }
        }
    }

    fn upload_parts(&self, file: &FileHandle, upload_url: &Url) -> Result<String> {
        let size = file.size()?;
        let mut source = File::open(file.path())?;
        let mut all_chunks = Vec::new();
        let mut offset = 0;

        while offset < size {
            let length = PART_SIZE.min(size - offset);
            let mut part = vec![0u8; length as usize];
            source.seek(SeekFrom::Start(offset))?;
            source.read_exact(&mut part)?;

            let chunks = chunk_hashes(&part);
            let headers = vec![
                ("content-length".to_string(), length.to_string()),
                (
                    "content-range".to_string(),
                    format!("bytes {}-{}/*", offset, offset + length - 1),
                ),
                ("x-amz-sha256-tree-hash".to_string(), hex::encode(combine_tree(chunks.clone()))),
            ];
            let payload_hash = hex_sha256(&part);
            self.send(Method::PUT, upload_url, &headers, &payload_hash, Some(Body::from(part)))?;

            log::debug!("Uploaded bytes {}-{} of {}", offset, offset + length - 1, size);
            all_chunks.extend(chunks);
            offset += length;
        }

        let headers = vec![
            ("x-amz-archive-size".to_string(), size.to_string()),
            ("x-amz-sha256-tree-hash".to_string(), hex::encode(combine_tree(all_chunks))),
        ];
        let response = self.send(Method::POST, upload_url, &headers, EMPTY_PAYLOAD_HASH, None)?;
        archive_id(&response)
    }
}

impl Transporter for GlacierTransporter {
    /// Vaults have no folders, ACLs or URLs, so overrides are ignored.
    fn transport(&self, file: &mut FileHandle, _overrides: &TransportOverrides) -> Result<String> {
        let size = file.size()?;
        log::debug!("Archiving {} ({} bytes) in vault {}", file.basename(), size, self.config.vault);

        let result = if size >= MULTIPART_THRESHOLD {
            self.multipart_upload(file)
        } else {
            self.upload_archive(file)
        };
        let archive = result.map_err(|e| {
            ShuttleError::Transportation(format!(
                "Failed to transport {} to Amazon Glacier: {}",
                file.basename(),
                e.message()
            ))
        })?;

        file.delete();
        log::info!("Archived as {}", archive);
        Ok(archive)
    }

    fn delete(&self, locator: &str) -> bool {
        let url = match self.vault_url(&format!("archives/{}", encode_key(locator))) {
            Ok(url) => url,
            Err(e) => {
                log::warn!("Could not delete archive {}: {}", locator, e);
                return false;
            }
        };

        match self.send(Method::DELETE, &url, &[], EMPTY_PAYLOAD_HASH, None) {
            Ok(_) => true,
            Err(e) => {
                log::warn!("Could not delete archive {}: {}", locator, e);
                false
            }
        }
    }
}

fn header(response: &Response, name: &str) -> Result<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .ok_or_else(|| ShuttleError::Transportation(format!("Glacier did not return {}", name)))
}

fn archive_id(response: &Response) -> Result<String> {
    header(response, "x-amz-archive-id")
}

/// SHA-256 of every 1 MB chunk of `data`. Empty input has one empty chunk.
fn chunk_hashes(data: &[u8]) -> Vec<[u8; 32]> {
    if data.is_empty() {
        return vec![Sha256::digest(data).into()];
    }
    data.chunks(TREE_CHUNK)
        .map(|chunk| Sha256::digest(chunk).into())
        .collect()
}

/// Folds chunk hashes pairwise until one remains; an odd hash out is carried
/// up a level unchanged.
fn combine_tree(mut level: Vec<[u8; 32]>) -> [u8; 32] {
    if level.is_empty() {
        return Sha256::digest(b"").into();
    }
    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| match pair {
                [left, right] => {
                    let mut hasher = Sha256::new();
                    hasher.update(left);
                    hasher.update(right);
                    hasher.finalize().into()
                }
                _ => pair[0],
            })
            .collect();
    }
    level[0]
}

/// Glacier tree hash of `data`, hex encoded.
pub fn tree_hash(data: &[u8]) -> String {
    hex::encode(combine_tree(chunk_hashes(data)))
}

/// Linear SHA-256 and 1 MB chunk hashes of a file in a single pass.
fn hash_file(path: &Path) -> Result<(String, Vec<[u8; 32]>)> {
    let mut file = File::open(path)?;
    let mut linear = Sha256::new();
    let mut chunks = Vec::new();
    let mut buffer = vec![0u8; TREE_CHUNK];

    loop {
        let mut filled = 0;
        while filled < TREE_CHUNK {
            let read = file.read(&mut buffer[filled..])?;
            if read == 0 {
                break;
            }
            filled += read;
        }
        if filled == 0 {
            break;
        }
        linear.update(&buffer[..filled]);
        chunks.push(Sha256::digest(&buffer[..filled]).into());
        if filled < TREE_CHUNK {
            break;
        }
    }

    if chunks.is_empty() {
        chunks.push(Sha256::digest(b"").into());
    }
    Ok((hex::encode(linear.finalize()), chunks))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sha(data: &[u8]) -> [u8; 32] {
        Sha256::digest(data).into()
    }

    fn pair(left: [u8; 32], right: [u8; 32]) -> [u8; 32] {
        let mut joined = left.to_vec();
        joined.extend_from_slice(&right);
        sha(&joined)
    }

    #[test]
    fn small_payload_tree_hash_is_plain_sha256() {
        assert_eq!(tree_hash(b"hello"), hex_sha256(b"hello"));
        assert_eq!(tree_hash(b""), EMPTY_PAYLOAD_HASH);
    }

    #[test]
    fn two_chunks_are_paired() {
        let data = vec![7u8; 2 * TREE_CHUNK];
        let chunk = sha(&data[..TREE_CHUNK]);
        assert_eq!(tree_hash(&data), hex::encode(pair(chunk, chunk)));
    }

    #[test]
    fn odd_chunk_is_carried_up() {
        let mut data = vec![1u8; 2 * TREE_CHUNK];
        data.extend_from_slice(b"tail");
        let a = sha(&data[..TREE_CHUNK]);
        let c = sha(b"tail");
        assert_eq!(tree_hash(&data), hex::encode(pair(pair(a, a), c)));
    }

    #[test]
    fn file_hashing_matches_in_memory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob.bin");
        let data: Vec<u8> = (0..(TREE_CHUNK * 3 + 11)).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, &data).unwrap();

        let (linear, chunks) = hash_file(&path).unwrap();
        assert_eq!(linear, hex_sha256(&data));
        assert_eq!(chunks.len(), 4);
        assert_eq!(hex::encode(combine_tree(chunks)), tree_hash(&data));
    }

    #[test]
    fn requires_vault_and_defaults_account() {
        let credentials = Credentials::new("AKID", "secret").unwrap();
        let err = GlacierTransporter::new(GlacierConfig::new("", "us-east-1", credentials.clone()))
            .err()
            .unwrap();
        assert_eq!(err.message(), "Please provide a Glacier vault");

        let config = GlacierConfig::new("backups", "us-east-1", credentials).with_account_id("");
        assert_eq!(config.account_id, "-");
        let glacier = GlacierTransporter::new(config).unwrap();
        assert_eq!(
            glacier.vault_url("archives").unwrap().as_str(),
            "https://glacier.us-east-1.amazonaws.com/-/vaults/backups/archives"
        );
    }
}
