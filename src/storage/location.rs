//! Object storage location (S3 or local filesystem)

use crate::error::{Error, Result};
use bytes::Bytes;
use futures::TryStreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::path::Path as ObjectPath;
use object_store::{Attribute, Attributes, ObjectStore, PutOptions, PutPayload};
use std::sync::Arc;
use tracing::debug;

/// A storage root the pipeline reads and writes under
///
/// The same root is handed to the query engine, so `url(key)` always names
/// the object that `put(key, ..)` wrote.
#[derive(Debug, Clone)]
pub struct ObjectLocation {
    /// The object store implementation
    store: Arc<dyn ObjectStore>,
    /// Key prefix within the bucket (empty for local roots)
    prefix: String,
    /// Root URL as seen by the query engine, without trailing slash
    root_url: String,
    /// URL scheme (s3, file)
    scheme: String,
}

impl ObjectLocation {
    /// Parse a root URL and create the matching object store
    ///
    /// Supported formats:
    /// - `s3://bucket[/prefix]` - AWS S3 or an S3-compatible endpoint (`AWS_ENDPOINT`)
    /// - `/local/path`, `./path` or `file:///path` - local filesystem
    pub fn parse(url: &str) -> Result<Self> {
        if url.starts_with("s3://") {
            Self::parse_s3(url)
        } else if url.contains("://") && !url.starts_with("file://") {
            Err(Error::config(format!("Unsupported storage URL: {url}")))
        } else {
            Self::parse_local(url)
        }
    }

    fn parse_s3(url: &str) -> Result<Self> {
        let without_scheme = url
            .strip_prefix("s3://")
            .ok_or_else(|| Error::config(format!("Invalid s3 URL: {url}")))?;

        let (bucket, prefix) = match without_scheme.split_once('/') {
            Some((bucket, prefix)) => (bucket, prefix.trim_matches('/').to_string()),
            None => (without_scheme, String::new()),
        };
        if bucket.is_empty() {
            return Err(Error::config(format!("Missing bucket in s3 URL: {url}")));
        }

        let store = AmazonS3Builder::from_env()
            .with_bucket_name(bucket)
            .build()
            .map_err(|e| Error::config(format!("Failed to create s3 client: {e}")))?;

        let root_url = if prefix.is_empty() {
            format!("s3://{bucket}")
        } else {
            format!("s3://{bucket}/{prefix}")
        };

        Ok(Self {
            store: Arc::new(store),
            prefix,
            root_url,
            scheme: "s3".to_string(),
        })
    }

    fn parse_local(path: &str) -> Result<Self> {
        let path = path.strip_prefix("file://").unwrap_or(path);

        std::fs::create_dir_all(path)
            .map_err(|e| Error::config(format!("Failed to create directory {path}: {e}")))?;
        // The query engine resolves relative paths against its own cwd
        let absolute = std::fs::canonicalize(path)?;

        let store = LocalFileSystem::new_with_prefix(&absolute)
            .map_err(|e| Error::config(format!("Failed to create local store: {e}")))?;

        Ok(Self {
            store: Arc::new(store),
            prefix: String::new(),
            root_url: absolute.to_string_lossy().trim_end_matches('/').to_string(),
            scheme: "file".to_string(),
        })
    }

    /// Check if this is a cloud location (not local)
    pub fn is_cloud(&self) -> bool {
        self.scheme != "file"
    }

    /// Get the scheme (s3, file)
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Root URL without trailing slash
    pub fn root_url(&self) -> &str {
        &self.root_url
    }

    /// URL of a key as the query engine sees it
    pub fn url(&self, key: &str) -> String {
        let key = key.trim_matches('/');
        if key.is_empty() {
            self.root_url.clone()
        } else {
            format!("{}/{key}", self.root_url)
        }
    }

    fn object_path(&self, key: &str) -> ObjectPath {
        let key = key.trim_matches('/');
        if self.prefix.is_empty() {
            ObjectPath::from(key)
        } else {
            ObjectPath::from(format!("{}/{key}", self.prefix))
        }
    }

    /// Strip the bucket prefix from a listed path
    fn relative_key(&self, path: &ObjectPath) -> String {
        let full = path.as_ref();
        if self.prefix.is_empty() {
            return full.to_string();
        }
        full.strip_prefix(self.prefix.as_str())
            .map(|rest| rest.trim_start_matches('/').to_string())
            .unwrap_or_else(|| full.to_string())
    }

    /// Write an object, returning its URL
    ///
    /// The content type is only attached on cloud stores; the local
    /// filesystem store has nowhere to keep it.
    pub async fn put(&self, key: &str, data: Bytes, content_type: &str) -> Result<String> {
        let path = self.object_path(key);

        let mut opts = PutOptions::default();
        if self.is_cloud() {
            let mut attributes = Attributes::new();
            attributes.insert(Attribute::ContentType, content_type.to_string().into());
            opts.attributes = attributes;
        }

        self.store
            .put_opts(&path, PutPayload::from(data), opts)
            .await
            .map_err(|e| Error::storage(format!("Failed to write {path}: {e}")))?;

        debug!("Wrote {}", self.url(key));
        Ok(self.url(key))
    }

    /// Read an object
    pub async fn get(&self, key: &str) -> Result<Bytes> {
        let path = self.object_path(key);
        let result = self.store.get(&path).await?;
        Ok(result.bytes().await?)
    }

    /// List object keys under a prefix, relative to the root, sorted
    pub async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let path = self.object_path(prefix);
        let listed = match self.store.list(Some(&path)).try_collect::<Vec<_>>().await {
            Ok(listed) => listed,
            Err(object_store::Error::NotFound { .. }) => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        let mut keys: Vec<String> = listed
            .iter()
            .map(|meta| self.relative_key(&meta.location))
            .collect();
        keys.sort();
        Ok(keys)
    }

    /// Create the directory for a key on local roots
    ///
    /// The query engine only creates the last level of a partitioned
    /// `COPY` target. Object stores have no directories, so this is a no-op
    /// on cloud roots.
    pub async fn ensure_dir(&self, key: &str) -> Result<()> {
        if self.is_cloud() {
            return Ok(());
        }
        let dir = self.url(key);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| Error::storage(format!("Failed to create directory {dir}: {e}")))
    }

    /// Delete every object under a prefix, returning how many were removed
    pub async fn delete_prefix(&self, prefix: &str) -> Result<usize> {
        let keys = self.list(prefix).await?;
        for key in &keys {
            self.store.delete(&self.object_path(key)).await?;
        }
        Ok(keys.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_local_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("nested");
        let location = ObjectLocation::parse(path.to_str().unwrap()).unwrap();

        assert_eq!(location.scheme(), "file");
        assert!(!location.is_cloud());
        assert!(path.exists());
        assert!(location.root_url().ends_with("nested"));
    }

    #[test]
    fn test_parse_file_url() {
        let temp_dir = tempfile::tempdir().unwrap();
        let url = format!("file://{}", temp_dir.path().display());
        let location = ObjectLocation::parse(&url).unwrap();
        assert_eq!(location.scheme(), "file");
    }

    #[test]
    fn test_unsupported_scheme() {
        let err = ObjectLocation::parse("ftp://host/path").unwrap_err();
        assert!(err.to_string().contains("Unsupported storage URL"));
    }

    #[test]
    fn test_s3_urls() {
        // Building the client does not contact AWS
        let location = ObjectLocation::parse("s3://ebird-etl/pipeline/").unwrap();
        assert!(location.is_cloud());
        assert_eq!(location.root_url(), "s3://ebird-etl/pipeline");
        assert_eq!(
            location.url("ebird-parquet-dev"),
            "s3://ebird-etl/pipeline/ebird-parquet-dev"
        );
        assert_eq!(
            location.object_path("ebird-ingest/a.json").as_ref(),
            "pipeline/ebird-ingest/a.json"
        );
        assert_eq!(
            location.relative_key(&ObjectPath::from("pipeline/ebird-ingest/a.json")),
            "ebird-ingest/a.json"
        );
    }

    #[tokio::test]
    async fn test_put_get_list_delete() {
        let temp_dir = tempfile::tempdir().unwrap();
        let location = ObjectLocation::parse(temp_dir.path().to_str().unwrap()).unwrap();

        let url = location
            .put("raw/b.json", Bytes::from_static(b"{}"), "application/json")
            .await
            .unwrap();
        location
            .put("raw/a.json", Bytes::from_static(b"[]"), "application/json")
            .await
            .unwrap();
        location
            .put("other/c.json", Bytes::from_static(b"1"), "application/json")
            .await
            .unwrap();

        assert_eq!(url, location.url("raw/b.json"));
        assert!(temp_dir.path().join("raw/b.json").exists());
        assert_eq!(location.get("raw/a.json").await.unwrap(), Bytes::from_static(b"[]"));
        assert_eq!(
            location.list("raw").await.unwrap(),
            vec!["raw/a.json".to_string(), "raw/b.json".to_string()]
        );

        assert_eq!(location.delete_prefix("raw").await.unwrap(), 2);
        assert!(location.list("raw").await.unwrap().is_empty());
        assert_eq!(location.list("other").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_ensure_dir_creates_nested_local_dirs() {
        let temp_dir = tempfile::tempdir().unwrap();
        let location = ObjectLocation::parse(temp_dir.path().to_str().unwrap()).unwrap();

        location.ensure_dir("ebird-parquet-prod/nested").await.unwrap();
        assert!(temp_dir.path().join("ebird-parquet-prod/nested").is_dir());

        // Already present
        location.ensure_dir("ebird-parquet-prod").await.unwrap();
    }

    #[tokio::test]
    async fn test_ensure_dir_is_noop_on_s3() {
        let location = ObjectLocation::parse("s3://ebird-etl/pipeline").unwrap();
        location.ensure_dir("ebird-parquet-prod").await.unwrap();
    }

    #[tokio::test]
    async fn test_list_missing_prefix_is_empty() {
        let temp_dir = tempfile::tempdir().unwrap();
        let location = ObjectLocation::parse(temp_dir.path().to_str().unwrap()).unwrap();
        assert!(location.list("nothing-here").await.unwrap().is_empty());
    }
}
