//! Fixed category lists shown on the home and discover screens.
//!
//! Each list is its own type so a screen can never be handed the other
//! screen's categories. Covers and thumbnails are resolved lazily, one
//! category at a time, and a failed resolution simply leaves the slot empty.

use std::fmt;
use std::marker::PhantomData;

use bytes::Bytes;
use tracing::{debug, instrument, warn};

use crate::browse::FeedSource;
use crate::feed::FeedClient;
use crate::image_cache::ImageByteCache;
use crate::model::PhotoRecord;
use crate::FeedError;

pub trait CatalogKind: Send + Sync + 'static {
    const TITLE: &'static str;
    const NAMES: &'static [&'static str];
    const DEFAULT_SELECTION: &'static str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Home;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Discover;

impl CatalogKind for Home {
    const TITLE: &'static str = "Home";
    const NAMES: &'static [&'static str] = &[
        "Editorial",
        "Wallpapers",
        "3D Renders",
        "Nature",
        "Texture",
        "Film",
        "Architecture",
        "Street Photography",
        "Experimental",
        "Travel",
        "People",
        "3D",
        "Flat",
        "Hand Drawn",
        "Icons",
        "Line Art",
        "Patterns",
    ];
    const DEFAULT_SELECTION: &'static str = "Editorial";
}

impl CatalogKind for Discover {
    const TITLE: &'static str = "Discover";
    const NAMES: &'static [&'static str] = &[
        "Nature",
        "Texture",
        "Black and White",
        "Abstract",
        "Space",
        "Minimal",
        "Animals",
        "Sky",
        "Flowers",
        "Travel",
        "Underwater",
        "Drones",
        "Architecture",
        "Gradient",
    ];
    const DEFAULT_SELECTION: &'static str = "Nature";
}

pub type HomeCategories = CategoryCatalog<Home>;
pub type DiscoverCategories = CategoryCatalog<Discover>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Category {
    name: &'static str,
    cover: Option<PhotoRecord>,
    thumbnail: Option<Bytes>,
}

impl Category {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            cover: None,
            thumbnail: None,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn cover(&self) -> Option<&PhotoRecord> {
        self.cover.as_ref()
    }

    pub fn thumbnail(&self) -> Option<&Bytes> {
        self.thumbnail.as_ref()
    }

    pub fn is_resolved(&self) -> bool {
        self.thumbnail.is_some()
    }

    pub fn source(&self) -> FeedSource {
        FeedSource::Category(self.name.to_string())
    }
}

pub struct CategoryCatalog<K: CatalogKind> {
    categories: Vec<Category>,
    selected: usize,
    _kind: PhantomData<K>,
}

impl<K: CatalogKind> CategoryCatalog<K> {
    pub fn new() -> Self {
        let categories: Vec<Category> = K::NAMES.iter().copied().map(Category::new).collect();
        let selected = K::NAMES
            .iter()
            .position(|name| *name == K::DEFAULT_SELECTION)
            .unwrap_or(0);
        Self {
            categories,
            selected,
            _kind: PhantomData,
        }
    }

    pub fn title(&self) -> &'static str {
        K::TITLE
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Category> {
        self.categories.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Category> {
        self.categories.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.categories.iter().map(Category::name)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.categories.iter().position(|c| c.name == name)
    }

    pub fn selected_index(&self) -> usize {
        self.selected
    }

    pub fn selected(&self) -> &Category {
        &self.categories[self.selected]
    }

    pub fn select(&mut self, index: usize) -> Result<&Category, FeedError> {
        let len = self.categories.len();
        let category = self
            .categories
            .get(index)
            .ok_or(FeedError::OutOfRange { index, len })?;
        self.selected = index;
        Ok(category)
    }

    /// Resolves the thumbnail for the category at `index`: its first search
    /// hit, then that photo's bytes through the cache. Once resolved, later
    /// calls return the stored bytes without touching the network.
    ///
    /// `Ok(None)` means the category search came back empty.
    #[instrument(skip(self, client, cache), fields(catalog = K::TITLE))]
    pub async fn resolve_thumbnail(
        &mut self,
        index: usize,
        client: &FeedClient,
        cache: &ImageByteCache,
    ) -> Result<Option<Bytes>, FeedError> {
        let len = self.categories.len();
        let category = self
            .categories
            .get_mut(index)
            .ok_or(FeedError::OutOfRange { index, len })?;

        if let Some(bytes) = &category.thumbnail {
            return Ok(Some(bytes.clone()));
        }

        let cover = match &category.cover {
            Some(cover) => cover.clone(),
            None => match client.fetch_category_cover(category.name).await? {
                Some(cover) => {
                    category.cover = Some(cover.clone());
                    cover
                }
                None => {
                    debug!(category = category.name, "no cover photo");
                    return Ok(None);
                }
            },
        };

        let bytes = cache
            .get_or_fetch(cover.image_url(), |url| async move {
                client.fetch_image_bytes(&url).await
            })
            .await?;
        category.thumbnail = Some(bytes.clone());
        Ok(Some(bytes))
    }

    /// Tries every category that has no thumbnail yet and returns how many
    /// were resolved. Failures are logged and left for the next call.
    pub async fn resolve_missing(&mut self, client: &FeedClient, cache: &ImageByteCache) -> usize {
        let mut resolved = 0;
        for index in 0..self.categories.len() {
            if self.categories[index].is_resolved() {
                continue;
            }
            match self.resolve_thumbnail(index, client, cache).await {
                Ok(Some(_)) => resolved += 1,
                Ok(None) => {}
                Err(e) => warn!(
                    category = self.categories[index].name,
                    error = %e,
                    "category thumbnail unavailable"
                ),
            }
        }
        resolved
    }
}

impl<K: CatalogKind> Default for CategoryCatalog<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: CatalogKind> fmt::Debug for CategoryCatalog<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CategoryCatalog")
            .field("title", &K::TITLE)
            .field("categories", &self.categories.len())
            .field("selected", &self.selected().name)
            .finish()
    }
}

impl<'a, K: CatalogKind> IntoIterator for &'a CategoryCatalog<K> {
    type Item = &'a Category;
    type IntoIter = std::slice::Iter<'a, Category>;

    fn into_iter(self) -> Self::IntoIter {
        self.categories.iter()
    }
}
