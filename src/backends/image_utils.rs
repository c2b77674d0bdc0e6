// Resource resolution for bitmaps and sounds
// Handles remote downloads, local files and named resources, with a TTL cache
// of decoded bitmaps

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use url::Url;

use super::{BoxFuture, ResourceResolver};
use crate::components::{Bitmap, NotificationError, NotificationResult, ResourceHandle};
use crate::config::NotifyConfig;

const BITMAP_EXTENSIONS: [&str; 4] = ["png", "jpg", "webp", "gif"];
const SOUND_EXTENSIONS: [&str; 3] = ["wav", "ogg", "mp3"];

/// Cached bitmap entry with TTL tracking
#[derive(Debug, Clone)]
struct CachedBitmap {
    bitmap: Bitmap,
    cached_at: Instant,
}

pub struct HttpResourceResolver {
    client: reqwest::Client,
    cache: DashMap<String, CachedBitmap>,
    cache_ttl: Duration,
    max_cache_entries: usize,
    max_image_bytes: u64,
    resource_dir: Option<PathBuf>,
}

impl HttpResourceResolver {
    pub fn new(config: &NotifyConfig) -> NotificationResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.http_timeout())
            .connect_timeout(config.connect_timeout())
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| NotificationError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            cache: DashMap::new(),
            cache_ttl: config.image_cache_ttl(),
            max_cache_entries: config.image_cache_entries,
            max_image_bytes: config.max_image_bytes,
            resource_dir: config.resource_dir.clone(),
        })
    }

    /// Evict stale entries (TTL expired or over size limit)
    fn evict_stale_entries(&self) {
        let now = Instant::now();
        let ttl = self.cache_ttl;
        self.cache.retain(|_, entry| now.duration_since(entry.cached_at) < ttl);

        while self.cache.len() > self.max_cache_entries {
            let oldest = self
                .cache
                .iter()
                .min_by_key(|entry| entry.cached_at)
                .map(|entry| entry.key().clone());

            match oldest {
                Some(key) => {
                    self.cache.remove(&key);
                },
                None => break,
            }
        }
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    async fn fetch(&self, reference: &str) -> NotificationResult<Bitmap> {
        self.evict_stale_entries();
        if let Some(cached) = self.cache.get(reference) {
            return Ok(cached.bitmap.clone());
        }

        let bitmap = match Url::parse(reference) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => self.download(reference, &url).await?,
            Ok(url) if url.scheme() == "file" => {
                let path = url.to_file_path().map_err(|_| NotificationError::AssetFailure {
                    reference: reference.to_string(),
                    message: "Invalid file URL".to_string(),
                })?;
                read_bitmap_file(reference, &path).await?
            },
            _ if Path::new(reference).is_absolute() => read_bitmap_file(reference, Path::new(reference)).await?,
            _ => {
                let path = self
                    .find_named_resource(reference, &BITMAP_EXTENSIONS)
                    .ok_or_else(|| NotificationError::AssetFailure {
                        reference: reference.to_string(),
                        message: "No bitmap resource with that name".to_string(),
                    })?;
                read_bitmap_file(reference, &path).await?
            },
        };

        self.cache.insert(reference.to_string(), CachedBitmap {
            bitmap: bitmap.clone(),
            cached_at: Instant::now(),
        });

        Ok(bitmap)
    }

    /// Download and decode a remote image
    async fn download(&self, reference: &str, url: &Url) -> NotificationResult<Bitmap> {
        let failure = |message: String| NotificationError::AssetFailure {
            reference: reference.to_string(),
            message,
        };

        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| failure(format!("Failed to download image: {}", e)))?;

        if !response.status().is_success() {
            return Err(failure(format!("HTTP {} downloading image", response.status())));
        }

        // Validate Content-Length before downloading
        if let Some(size) = response.content_length()
            && size > self.max_image_bytes
        {
            return Err(failure(format!(
                "Image too large: {} bytes exceeds {} byte limit",
                size, self.max_image_bytes
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| failure(format!("Failed to read image bytes: {}", e)))?;

        if bytes.len() as u64 > self.max_image_bytes {
            return Err(failure(format!(
                "Image too large: {} bytes exceeds {} byte limit",
                bytes.len(),
                self.max_image_bytes
            )));
        }

        tracing::debug!(asset = %reference, bytes = bytes.len(), "Downloaded image");
        Bitmap::decode(reference, &bytes)
    }

    /// Look up `<resource_dir>/<name>` trying each extension when the name has none
    fn find_named_resource(&self, name: &str, extensions: &[&str]) -> Option<PathBuf> {
        let dir = self.resource_dir.as_ref()?;
        let direct = dir.join(name);
        if direct.extension().is_some() {
            return direct.is_file().then_some(direct);
        }

        extensions
            .iter()
            .map(|ext| dir.join(format!("{}.{}", name, ext)))
            .find(|candidate| candidate.is_file())
    }
}

async fn read_bitmap_file(reference: &str, path: &Path) -> NotificationResult<Bitmap> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| NotificationError::AssetFailure {
            reference: reference.to_string(),
            message: format!("Failed to read {}: {}", path.display(), e),
        })?;
    Bitmap::decode(reference, &bytes)
}

impl ResourceResolver for HttpResourceResolver {
    fn resolve_bitmap<'a>(&'a self, reference: &'a str) -> BoxFuture<'a, NotificationResult<Bitmap>> {
        Box::pin(self.fetch(reference))
    }

    fn resolve_sound(&self, reference: &str) -> Option<ResourceHandle> {
        if reference == "default" {
            return Some(ResourceHandle::Default);
        }

        if let Ok(url) = Url::parse(reference) {
            return match url.scheme() {
                "http" | "https" | "content" => Some(ResourceHandle::Uri(reference.to_string())),
                "file" => url
                    .to_file_path()
                    .ok()
                    .filter(|path| path.is_file())
                    .map(ResourceHandle::Path),
                _ => None,
            };
        }

        let path = Path::new(reference);
        if path.is_absolute() {
            return path.is_file().then(|| ResourceHandle::Path(path.to_path_buf()));
        }

        self.find_named_resource(reference, &SOUND_EXTENSIONS)
            .map(ResourceHandle::Path)
    }
}
