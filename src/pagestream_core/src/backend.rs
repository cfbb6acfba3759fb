//! Page backend over a directory of image files.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::debug;

use crate::decoder::{is_image_file, natural_cmp, read_page_image, PageImage};
use crate::error::{PageError, PageResult};
use crate::resource::PageBackend;
use crate::store::PageIndex;

/// One comic = one directory; page `i` is the `i`-th image in natural order.
#[derive(Debug)]
pub struct DirectoryBackend {
    dir: PathBuf,
    pages: Vec<PathBuf>,
    /// Fetched buffers not yet released.
    live: AtomicUsize,
}

impl DirectoryBackend {
    /// List the image files directly inside `dir`. Subdirectories and
    /// non-image files are ignored.
    pub fn open(dir: &Path) -> PageResult<Self> {
        let mut pages = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() && is_image_file(&path) {
                pages.push(path);
            }
        }
        pages.sort_by(|a, b| natural_cmp(a, b));
        debug!(dir = %dir.display(), pages = pages.len(), "opened page directory");

        Ok(Self {
            dir: dir.to_path_buf(),
            pages,
            live: AtomicUsize::new(0),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Page file paths in page order.
    pub fn paths(&self) -> &[PathBuf] {
        &self.pages
    }

    pub fn path(&self, index: PageIndex) -> Option<&Path> {
        self.pages.get(index).map(PathBuf::as_path)
    }

    /// Buffers handed out by `fetch_page` and not yet released.
    pub fn live_buffers(&self) -> usize {
        self.live.load(Ordering::Relaxed)
    }
}

impl PageBackend for DirectoryBackend {
    type Resource = PageImage;

    fn fetch_page(&self, index: PageIndex) -> PageResult<PageImage> {
        let path = self.path(index).ok_or(PageError::OutOfRange {
            index,
            total_pages: self.pages.len(),
        })?;
        let image = read_page_image(path)?;
        self.live.fetch_add(1, Ordering::Relaxed);
        Ok(image)
    }

    fn release_resource(&self, resource: PageImage) {
        drop(resource);
        self.live.fetch_sub(1, Ordering::Relaxed);
    }
}
