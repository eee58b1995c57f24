//! Amazon S3 backend.
//!
//! The engine is blocking, so the store owns a Tokio runtime and drives the
//! async SDK with `block_on`. Retries and backoff are the SDK's own, sized
//! from `max_retries`; errors leaving this module are final.
//!
//! S3 ETags are not content digests (multipart uploads, SSE-KMS), so `put`
//! records the body's SHA-256 as user metadata and that digest is the
//! freshness token. A conditional `get` compares it against the local
//! fingerprint, then asks S3 for the object `If-None-Match` the ETag it just
//! saw: a 304 means nothing changed in between, a 200 streams the new body.

use std::io::{Read, Write};

use aws_config::retry::RetryConfig;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use tokio::runtime::Runtime;

use super::{store_io, GetOutcome, ListPage, ObjectMeta, ObjectStore, StoreError};
use crate::fingerprint::{should_transfer, Fingerprint, FingerprintAlgorithm};

/// User-metadata key (`x-amz-meta-sha256`) holding the body digest.
const DIGEST_METADATA: &str = "sha256";
const NOT_MODIFIED: u16 = 304;

pub struct S3Store {
    client: S3Client,
    bucket: String,
    runtime: Runtime,
}

/// `head` result plus the raw ETag needed for a conditional `get`.
struct Stat {
    meta: ObjectMeta,
    etag: Option<String>,
}

impl S3Store {
    /// Client for `bucket` in `region`, with credentials from the default
    /// provider chain. No request is made until the first operation.
    pub fn connect(bucket: &str, region: &str, max_retries: u32) -> Result<Self, StoreError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(|e| StoreError::Other {
                message: format!("cannot start S3 runtime: {e}"),
            })?;
        let sdk_config = runtime.block_on(
            aws_config::defaults(BehaviorVersion::latest())
                .region(Region::new(region.to_owned()))
                .retry_config(
                    RetryConfig::standard().with_max_attempts(max_retries.saturating_add(1)),
                )
                .load(),
        );
        tracing::debug!("S3 store for bucket {bucket} in {region}, {max_retries} retries");
        Ok(Self {
            client: S3Client::new(&sdk_config),
            bucket: bucket.to_owned(),
            runtime,
        })
    }

    fn stat(&self, key: &str) -> Result<Option<Stat>, StoreError> {
        let result = self.runtime.block_on(
            self.client
                .head_object()
                .bucket(&self.bucket)
                .key(key)
                .send(),
        );
        let output = match result {
            Ok(output) => output,
            Err(err) if err.as_service_error().is_some_and(|e| e.is_not_found()) => {
                return Ok(None)
            }
            Err(err) => return Err(sdk_error(key, err)),
        };
        Ok(Some(Stat {
            meta: ObjectMeta {
                key: key.to_owned(),
                size: object_size(output.content_length()),
                etag: output
                    .metadata()
                    .and_then(|m| m.get(DIGEST_METADATA))
                    .cloned(),
            },
            etag: output.e_tag().map(str::to_owned),
        }))
    }
}

impl ObjectStore for S3Store {
    fn get(
        &self,
        key: &str,
        if_none_match: Option<&Fingerprint>,
        sink: &mut dyn Write,
    ) -> Result<GetOutcome, StoreError> {
        let mut request = self.client.get_object().bucket(&self.bucket).key(key);
        if let Some(local) = if_none_match {
            let Some(stat) = self.stat(key)? else {
                return Err(StoreError::NotFound {
                    key: key.to_owned(),
                });
            };
            if !should_transfer(Some(local), &stat.meta, self.fingerprint_algorithm()) {
                match stat.etag {
                    Some(etag) => request = request.if_none_match(etag),
                    None => return Ok(GetOutcome::NotModified),
                }
            }
        }

        self.runtime.block_on(async {
            let output = match request.send().await {
                Ok(output) => output,
                Err(err) if status_of(&err) == Some(NOT_MODIFIED) => {
                    return Ok(GetOutcome::NotModified)
                }
                Err(err) if err.as_service_error().is_some_and(|e| e.is_no_such_key()) => {
                    return Err(StoreError::NotFound {
                        key: key.to_owned(),
                    })
                }
                Err(err) => return Err(sdk_error(key, err)),
            };

            let mut body = output.body;
            let mut bytes = 0u64;
            while let Some(chunk) = body.try_next().await.map_err(|e| StoreError::Network {
                message: format!("reading body of {key}: {e}"),
                retryable: false,
            })? {
                sink.write_all(&chunk).map_err(|e| store_io(key, e))?;
                bytes += chunk.len() as u64;
            }
            Ok(GetOutcome::Fetched { bytes })
        })
    }

    /// The body is buffered in memory: S3 needs the content length and the
    /// digest metadata before the first byte is sent.
    fn put(&self, key: &str, body: &mut dyn Read, size: u64) -> Result<(), StoreError> {
        let mut buffer = Vec::with_capacity(usize::try_from(size).unwrap_or(0));
        body.read_to_end(&mut buffer)
            .map_err(|e| store_io(key, e))?;
        if buffer.len() as u64 != size {
            return Err(StoreError::Other {
                message: format!(
                    "short body for {key}: expected {size} bytes, got {}",
                    buffer.len()
                ),
            });
        }
        let digest = Fingerprint::sha256_of(&buffer);

        self.runtime
            .block_on(
                self.client
                    .put_object()
                    .bucket(&self.bucket)
                    .key(key)
                    .content_length(i64::try_from(size).unwrap_or(i64::MAX))
                    .metadata(DIGEST_METADATA, digest.hex)
                    .body(ByteStream::from(buffer))
                    .send(),
            )
            .map(|_| ())
            .map_err(|err| sdk_error(key, err))
    }

    fn head(&self, key: &str) -> Result<Option<ObjectMeta>, StoreError> {
        Ok(self.stat(key)?.map(|stat| stat.meta))
    }

    fn list_page(
        &self,
        prefix: &str,
        continuation: Option<&str>,
    ) -> Result<ListPage, StoreError> {
        let prefix = prefix.trim_start_matches('/');
        let mut request = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix);
        if let Some(token) = continuation {
            request = request.continuation_token(token);
        }
        let response = self
            .runtime
            .block_on(request.send())
            .map_err(|err| sdk_error(prefix, err))?;

        // Listing ETags are MD5-style, not digests; leave the token unset.
        let objects = response
            .contents()
            .iter()
            .filter_map(|obj| {
                Some(ObjectMeta {
                    key: obj.key()?.to_owned(),
                    size: object_size(obj.size()),
                    etag: None,
                })
            })
            .collect();
        let next = if response.is_truncated() == Some(true) {
            response.next_continuation_token().map(str::to_owned)
        } else {
            None
        };
        Ok(ListPage { objects, next })
    }

    fn fingerprint_algorithm(&self) -> Option<FingerprintAlgorithm> {
        Some(FingerprintAlgorithm::Sha256)
    }
}

fn status_of<E>(err: &SdkError<E, HttpResponse>) -> Option<u16> {
    err.raw_response().map(|response| response.status().as_u16())
}

fn sdk_error<E>(key: &str, err: SdkError<E, HttpResponse>) -> StoreError
where
    E: std::error::Error + Send + Sync + 'static,
{
    let message = DisplayErrorContext(&err).to_string();
    match status_of(&err) {
        Some(404) => StoreError::NotFound {
            key: key.to_owned(),
        },
        Some(401 | 403) => StoreError::AccessDenied {
            key: key.to_owned(),
            message,
        },
        _ => StoreError::Network {
            message,
            retryable: false,
        },
    }
}

/// S3 reports sizes as `i64`; absent or negative means empty.
fn object_size(len: Option<i64>) -> u64 {
    len.and_then(|len| u64::try_from(len).ok()).unwrap_or(0)
}
