//! Media download
//!
//! Saves an item's images as `000.jpeg`, `001.jpeg`, … and its video as
//! `video.mp4` under `<root>/<platform>/media/<item_id>/`. Ids that are not
//! a single plain path component are refused.

use crate::model::Item;
use crate::platform::PlatformApi;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub struct MediaDownloader {
    api: Arc<dyn PlatformApi>,
    root: PathBuf,
}

impl MediaDownloader {
    pub fn new(api: Arc<dyn PlatformApi>, root: impl Into<PathBuf>) -> Self {
        Self {
            api,
            root: root.into(),
        }
    }

    /// Directory the files of `item_id` are written to
    ///
    /// `None` when the id cannot be used as a directory name.
    pub fn item_dir(&self, item_id: &str) -> Option<PathBuf> {
        let name = safe_component(item_id)?;
        Some(
            self.root
                .join(self.api.platform().as_str())
                .join("media")
                .join(name),
        )
    }

    /// Downloads every image and the video of `item`
    ///
    /// Failures are logged per file. Returns the number of files written.
    pub async fn download(&self, item: &Item) -> usize {
        let mut targets: Vec<(String, String)> = item
            .image_urls
            .iter()
            .enumerate()
            .map(|(i, url)| (url.clone(), format!("{:03}.jpeg", i)))
            .collect();
        if let Some(video) = item.media_url.as_ref().filter(|u| !u.is_empty()) {
            targets.push((video.clone(), "video.mp4".to_string()));
        }
        if targets.is_empty() {
            return 0;
        }

        let Some(dir) = self.item_dir(&item.item_id) else {
            tracing::warn!("Refusing media for unusable item id {:?}", item.item_id);
            return 0;
        };
        if let Err(e) = tokio::fs::create_dir_all(&dir).await {
            tracing::error!("Cannot create media directory {}: {}", dir.display(), e);
            return 0;
        }

        let mut written = 0;
        for (url, name) in targets {
            match self.fetch_to(&url, &dir.join(&name)).await {
                Ok(()) => written += 1,
                Err(e) => tracing::warn!("Media {} for {} not saved: {}", name, item.item_id, e),
            }
        }
        tracing::debug!("Saved {} media file(s) for {}", written, item.item_id);
        written
    }

    async fn fetch_to(&self, url: &str, path: &Path) -> crate::Result<()> {
        let bytes = self.api.fetch_media(url).await?;
        tokio::fs::write(path, bytes).await?;
        Ok(())
    }
}

/// `id` when it names exactly one ordinary path component
fn safe_component(id: &str) -> Option<&str> {
    let plain = !id.is_empty()
        && id != "."
        && id != ".."
        && !id.chars().any(|c| matches!(c, '/' | '\\' | ':' | '\0'));
    plain.then_some(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_ids_accepted() {
        assert_eq!(safe_component("64f1c2a9000000001e03b0c2"), Some("64f1c2a9000000001e03b0c2"));
        assert_eq!(safe_component("7301234567890123456"), Some("7301234567890123456"));
    }

    #[test]
    fn test_traversal_ids_rejected() {
        for id in ["", ".", "..", "../etc", "a/b", "a\\b", "C:evil", "x\0y"] {
            assert_eq!(safe_component(id), None, "{:?}", id);
        }
    }
}
