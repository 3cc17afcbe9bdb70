//! S3 backend (`s3` feature).

use async_trait::async_trait;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;

use crate::{validate_key, ObjectStore, StorageError, StoredObject};

#[derive(Debug, Clone)]
pub struct S3ObjectStore {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3ObjectStore {
    pub fn new(client: aws_sdk_s3::Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    /// Builds a client from the ambient AWS credential chain.
    pub async fn from_env(bucket: impl Into<String>, region: impl Into<String>) -> Self {
        let cfg = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(region.into()))
            .load()
            .await;
        Self::new(aws_sdk_s3::Client::new(&cfg), bucket)
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    fn describe(&self) -> String {
        format!("s3://{}", self.bucket)
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        validate_key(key)?;
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        match resp {
            Ok(out) => {
                let collected = out.body.collect().await.map_err(|e| StorageError::Backend {
                    key: key.to_string(),
                    message: format!("reading body: {e}"),
                })?;
                Ok(Some(collected.into_bytes().to_vec()))
            }
            Err(err) => {
                let missing = err
                    .as_service_error()
                    .map(|e| e.is_no_such_key())
                    .unwrap_or(false);
                if missing {
                    Ok(None)
                } else {
                    Err(StorageError::Backend {
                        key: key.to_string(),
                        message: DisplayErrorContext(&err).to_string(),
                    })
                }
            }
        }
    }

    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<StoredObject, StorageError> {
        validate_key(key)?;
        let stored = StoredObject::for_bytes(key, &bytes);
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|err| StorageError::Backend {
                key: key.to_string(),
                message: DisplayErrorContext(&err).to_string(),
            })?;
        Ok(stored)
    }
}
