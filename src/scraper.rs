//! The scraper boundary: Picta treats "where photos come from" (local
//! filesystem walk, Google Drive listing, a phone backup importer...) as
//! an external collaborator. The Indexer only needs a stream of raw items
//! with enough metadata to form a `Photo` row.

/// One unindexed photo pulled from some source.
pub struct ScrapedItem {
    pub source_ref: String,
    pub bytes: Vec<u8>,
    pub taken_at: Option<String>,
    pub gps: Option<(f64, f64)>,
    pub location_name: Option<String>,
    pub metadata: String,
    /// When set, the scraper wants its backing scratch file removed once
    /// the Indexer has safely written the row (e.g. a download cache).
    pub delete_after: Option<std::path::PathBuf>,
}

/// A source of `ScrapedItem`s. Implementations own whatever I/O is
/// needed to enumerate and fetch photo bytes; the core never reaches
/// into a specific backend directly.
pub trait Scraper {
    /// Pull the next item, or `None` once the source is exhausted.
    fn next_item(&mut self) -> Option<ScrapedItem>;
}

/// An in-memory scraper over a fixed item list, used by tests and small
/// scripted imports.
pub struct VecScraper {
    items: std::vec::IntoIter<ScrapedItem>,
}

impl VecScraper {
    pub fn new(items: Vec<ScrapedItem>) -> Self {
        VecScraper {
            items: items.into_iter(),
        }
    }
}

impl Scraper for VecScraper {
    fn next_item(&mut self) -> Option<ScrapedItem> {
        self.items.next()
    }
}

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "heic", "webp"];

/// Flat local-directory scraper used by the reference `picta index`
/// command. No EXIF extraction: `taken_at`, `gps`, and `location_name`
/// are left `None` and are expected to be filled in by a richer scraper
/// when that metadata matters.
pub struct DirScraper {
    paths: std::vec::IntoIter<std::path::PathBuf>,
}

impl DirScraper {
    pub fn new(dir: &std::path::Path) -> std::io::Result<Self> {
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            let is_image = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
                .unwrap_or(false);
            if path.is_file() && is_image {
                paths.push(path);
            }
        }
        Ok(DirScraper {
            paths: paths.into_iter(),
        })
    }
}

impl Scraper for DirScraper {
    fn next_item(&mut self) -> Option<ScrapedItem> {
        loop {
            let path = self.paths.next()?;
            match std::fs::read(&path) {
                Ok(bytes) => {
                    return Some(ScrapedItem {
                        source_ref: path.to_string_lossy().to_string(),
                        bytes,
                        taken_at: None,
                        gps: None,
                        location_name: None,
                        metadata: "{}".to_string(),
                        delete_after: None,
                    });
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable file");
                    continue;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_scraper_yields_in_order_then_ends() {
        let mut scraper = VecScraper::new(vec![
            ScrapedItem {
                source_ref: "a".to_string(),
                bytes: vec![],
                taken_at: None,
                gps: None,
                location_name: None,
                metadata: "{}".to_string(),
                delete_after: None,
            },
            ScrapedItem {
                source_ref: "b".to_string(),
                bytes: vec![],
                taken_at: None,
                gps: None,
                location_name: None,
                metadata: "{}".to_string(),
                delete_after: None,
            },
        ]);

        assert_eq!(scraper.next_item().unwrap().source_ref, "a");
        assert_eq!(scraper.next_item().unwrap().source_ref, "b");
        assert!(scraper.next_item().is_none());
    }

    #[test]
    fn test_dir_scraper_finds_only_image_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("photo.jpg"), b"fake-jpeg-bytes").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"not an image").unwrap();

        let mut scraper = DirScraper::new(dir.path()).unwrap();
        let item = scraper.next_item().expect("should find the jpg");
        assert!(item.source_ref.ends_with("photo.jpg"));
        assert!(scraper.next_item().is_none());
    }
}
