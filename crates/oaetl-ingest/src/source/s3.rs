//! S3-backed snapshot source
//!
//! The public OpenAlex bucket allows unsigned requests, so the client is
//! built without a credentials provider unless keys are configured.

use super::{RemoteSource, DATA_FILE_SUFFIX};
use crate::config::SourceConfig;
use crate::entity::EntityKind;
use crate::error::{IngestError, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::{
    config::{Credentials, Region},
    error::DisplayErrorContext,
    Client,
};
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument};

#[derive(Clone)]
pub struct S3Source {
    client: Client,
    bucket: String,
    data_prefix: String,
}

impl S3Source {
    pub async fn new(config: &SourceConfig) -> Result<Self> {
        let mut loader =
            aws_config::defaults(BehaviorVersion::latest()).region(Region::new(config.region.clone()));

        loader = match (&config.access_key, &config.secret_key) {
            (Some(access_key), Some(secret_key)) => loader.credentials_provider(Credentials::new(
                access_key,
                secret_key,
                None,
                None,
                "oaetl-source",
            )),
            _ => loader.no_credentials(),
        };

        let shared = loader.load().await;
        let mut builder =
            aws_sdk_s3::config::Builder::from(&shared).force_path_style(config.path_style);
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        info!(
            bucket = %config.bucket,
            anonymous = config.is_anonymous(),
            "S3 source initialized"
        );

        Ok(Self {
            client: Client::from_conf(builder.build()),
            bucket: config.bucket.clone(),
            data_prefix: config.data_prefix.trim_matches('/').to_string(),
        })
    }

    fn entity_prefix(&self, entity: EntityKind) -> String {
        if self.data_prefix.is_empty() {
            format!("{}/", entity.as_str())
        } else {
            format!("{}/{}/", self.data_prefix, entity.as_str())
        }
    }

    fn object_key(&self, entity: EntityKind, partition: &str, file_name: &str) -> String {
        format!("{}{}{}", self.entity_prefix(entity), partition, file_name)
    }

    /// One delimited listing, following continuation tokens.
    /// Returns (common prefixes, object keys).
    async fn list_delimited(&self, prefix: &str) -> Result<(Vec<String>, Vec<String>)> {
        let mut prefixes = Vec::new();
        let mut keys = Vec::new();
        let mut token: Option<String> = None;

        loop {
            let response = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .delimiter("/")
                .set_continuation_token(token.take())
                .send()
                .await
                .map_err(|e| {
                    IngestError::Remote(format!(
                        "list s3://{}/{}: {}",
                        self.bucket,
                        prefix,
                        DisplayErrorContext(&e)
                    ))
                })?;

            prefixes.extend(
                response
                    .common_prefixes()
                    .iter()
                    .filter_map(|p| p.prefix().map(str::to_string)),
            );
            keys.extend(
                response
                    .contents()
                    .iter()
                    .filter_map(|o| o.key().map(str::to_string)),
            );

            match response.next_continuation_token() {
                Some(next) if response.is_truncated().unwrap_or(false) => {
                    token = Some(next.to_string());
                },
                _ => break,
            }
        }

        Ok((prefixes, keys))
    }
}

#[async_trait]
impl RemoteSource for S3Source {
    #[instrument(skip(self))]
    async fn list_partitions(&self, entity: EntityKind) -> Result<Vec<String>> {
        let prefix = self.entity_prefix(entity);
        let (prefixes, _) = self.list_delimited(&prefix).await?;

        let partitions: Vec<String> = prefixes
            .iter()
            .filter_map(|p| p.strip_prefix(&prefix))
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect();

        debug!(count = partitions.len(), "Listed partitions");
        Ok(partitions)
    }

    #[instrument(skip(self))]
    async fn list_files(&self, entity: EntityKind, partition: &str) -> Result<Vec<String>> {
        let prefix = format!("{}{}", self.entity_prefix(entity), partition);
        let (_, keys) = self.list_delimited(&prefix).await?;

        let files: Vec<String> = keys
            .iter()
            .filter_map(|k| k.strip_prefix(&prefix))
            .filter(|name| name.ends_with(DATA_FILE_SUFFIX) && !name.contains('/'))
            .map(str::to_string)
            .collect();

        debug!(count = files.len(), "Listed files");
        Ok(files)
    }

    #[instrument(skip(self, dest))]
    async fn fetch(
        &self,
        entity: EntityKind,
        partition: &str,
        file_name: &str,
        dest: &Path,
    ) -> Result<u64> {
        let key = self.object_key(entity, partition, file_name);

        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| {
                IngestError::Remote(format!(
                    "get s3://{}/{}: {}",
                    self.bucket,
                    key,
                    DisplayErrorContext(&e)
                ))
            })?;

        let mut body = response.body;
        let mut file = tokio::fs::File::create(dest).await?;
        let mut written = 0u64;

        while let Some(chunk) = body.try_next().await.map_err(IngestError::remote)? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        file.sync_all().await?;

        debug!(bytes = written, dest = %dest.display(), "Downloaded object");
        Ok(written)
    }

    fn location(&self, entity: EntityKind, partition: &str, file_name: &str) -> String {
        format!(
            "s3://{}/{}",
            self.bucket,
            self.object_key(entity, partition, file_name)
        )
    }
}
