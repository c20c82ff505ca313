use anyhow::{anyhow, Result};
use serde::Serialize;
use std::time::Duration;
use url::Url;
use uuid::Uuid;

use crate::infra::storage::ObjectStorage;

#[derive(Debug, Serialize)]
pub struct UploadIntent {
    pub object_key: String,
    pub upload_url: String,
    pub expires_in_seconds: u64,
    pub headers: Vec<UploadHeader>,
}

#[derive(Debug, Serialize)]
pub struct UploadHeader {
    pub name: String,
    pub value: String,
}

/// Presigned uploads for report photos. Clients PUT the image directly to
/// object storage and then reference `object_key` in the report's `images`.
#[derive(Clone)]
pub struct ImageUploadService {
    storage: ObjectStorage,
    s3_public_endpoint: Option<String>,
}

impl ImageUploadService {
    pub fn new(storage: ObjectStorage, s3_public_endpoint: Option<String>) -> Self {
        Self {
            storage,
            s3_public_endpoint,
        }
    }

    pub async fn create_upload(
        &self,
        owner_id: Uuid,
        content_type: &str,
        bytes: i64,
        expires_in_seconds: u64,
    ) -> Result<UploadIntent> {
        let ext = extension_from_content_type(content_type)?;
        let object_key = format!("reports/{}/{}.{}", owner_id, Uuid::new_v4(), ext);

        let presigned = self
            .storage
            .presign_put(
                &object_key,
                content_type,
                bytes,
                Duration::from_secs(expires_in_seconds),
            )
            .await?;

        let headers = presigned
            .headers()
            .map(|(name, value)| UploadHeader {
                name: name.to_string(),
                value: value.to_string(),
            })
            .collect();

        let mut upload_url = presigned.uri().to_string();
        if let Some(ref public_endpoint) = self.s3_public_endpoint {
            match rewrite_presigned_url(&upload_url, public_endpoint) {
                Ok(rewritten) => upload_url = rewritten,
                Err(err) => tracing::warn!(error = ?err, "failed to rewrite presigned upload URL"),
            }
        }

        tracing::debug!(bucket = self.storage.bucket(), key = %object_key, "issued report image upload");

        Ok(UploadIntent {
            object_key,
            upload_url,
            expires_in_seconds,
            headers,
        })
    }
}

pub fn extension_from_content_type(content_type: &str) -> Result<&'static str> {
    match content_type {
        "image/jpeg" => Ok("jpg"),
        "image/png" => Ok("png"),
        "image/webp" => Ok("webp"),
        _ => Err(anyhow!("unsupported content type")),
    }
}

/// Point a presigned URL at the publicly reachable storage host, keeping
/// its path and signature query intact.
pub fn rewrite_presigned_url(original: &str, public_endpoint: &str) -> Result<String> {
    let mut original_url = Url::parse(original)?;
    let public_url = if public_endpoint.contains("://") {
        Url::parse(public_endpoint)?
    } else {
        Url::parse(&format!("http://{}", public_endpoint))?
    };

    original_url
        .set_scheme(public_url.scheme())
        .map_err(|_| anyhow!("invalid public endpoint scheme"))?;
    original_url
        .set_host(public_url.host_str())
        .map_err(|err| anyhow!("invalid public endpoint host: {}", err))?;
    original_url
        .set_port(public_url.port())
        .map_err(|_| anyhow!("invalid public endpoint port"))?;

    Ok(original_url.to_string())
}
