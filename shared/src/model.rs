use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::FeedError;

const NO_DESCRIPTION: &str = "No description";

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PhotoId(String);

impl PhotoId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PhotoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One photo's metadata. Both dimensions are always positive.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PhotoRecord {
    id: PhotoId,
    image_url: String,
    description: Option<String>,
    author: String,
    width: u32,
    height: u32,
}

impl PhotoRecord {
    /// Returns `None` when either dimension is zero.
    pub fn new(
        id: impl Into<String>,
        image_url: impl Into<String>,
        description: Option<String>,
        author: impl Into<String>,
        width: u32,
        height: u32,
    ) -> Option<Self> {
        if width == 0 || height == 0 {
            return None;
        }
        Some(Self {
            id: PhotoId::new(id),
            image_url: image_url.into(),
            description,
            author: author.into(),
            width,
            height,
        })
    }

    pub fn id(&self) -> &PhotoId {
        &self.id
    }

    /// Locator of the "regular" rendition; also the image cache key.
    pub fn image_url(&self) -> &str {
        &self.image_url
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// `height / width`, for laying out a cell of a given width.
    pub fn aspect_ratio(&self) -> f64 {
        f64::from(self.height) / f64::from(self.width)
    }

    pub fn display_description(&self) -> &str {
        self.description.as_deref().unwrap_or(NO_DESCRIPTION)
    }

    pub fn byline(&self) -> String {
        format!("by {}", self.author)
    }

    pub fn dimensions_label(&self) -> String {
        format!("Size: {}x{}", self.width, self.height)
    }
}

/// Ordered photos from one fetch, in the order the API returned them.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ResultSet {
    photos: Vec<PhotoRecord>,
    total_pages: Option<u32>,
}

impl ResultSet {
    pub fn new(photos: Vec<PhotoRecord>) -> Self {
        Self {
            photos,
            total_pages: None,
        }
    }

    #[must_use]
    pub fn with_total_pages(mut self, total_pages: Option<u32>) -> Self {
        self.total_pages = total_pages;
        self
    }

    pub fn len(&self) -> usize {
        self.photos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.photos.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&PhotoRecord> {
        self.photos.get(index)
    }

    pub fn first(&self) -> Option<&PhotoRecord> {
        self.photos.first()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PhotoRecord> {
        self.photos.iter()
    }

    pub fn as_slice(&self) -> &[PhotoRecord] {
        &self.photos
    }

    /// Page count reported by the search endpoint; the feed doesn't say.
    pub fn total_pages(&self) -> Option<u32> {
        self.total_pages
    }

    /// Concatenates a later page. Repeats across pages are kept as-is.
    pub fn append(&mut self, page: ResultSet) {
        self.photos.extend(page.photos);
        if page.total_pages.is_some() {
            self.total_pages = page.total_pages;
        }
    }

    pub fn into_vec(self) -> Vec<PhotoRecord> {
        self.photos
    }
}

impl<'a> IntoIterator for &'a ResultSet {
    type Item = &'a PhotoRecord;
    type IntoIter = std::slice::Iter<'a, PhotoRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.photos.iter()
    }
}

impl FromIterator<PhotoRecord> for ResultSet {
    fn from_iter<I: IntoIterator<Item = PhotoRecord>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

// --- Wire format ---

#[derive(Deserialize)]
struct RawPhoto {
    id: String,
    urls: RawUrls,
    user: RawUser,
    width: u32,
    height: u32,
    // Optional text; any non-string value counts as absent.
    #[serde(default)]
    description: Option<serde_json::Value>,
    #[serde(default)]
    alt_description: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct RawUrls {
    regular: String,
}

#[derive(Deserialize)]
struct RawUser {
    name: String,
}

#[derive(Deserialize)]
struct SearchEnvelope {
    results: Vec<serde_json::Value>,
    #[serde(default)]
    total_pages: Option<u32>,
}

fn text(value: Option<serde_json::Value>) -> Option<String> {
    match value {
        Some(serde_json::Value::String(text)) => Some(text),
        _ => None,
    }
}

impl RawPhoto {
    fn into_record(self) -> Option<PhotoRecord> {
        PhotoRecord::new(
            self.id,
            self.urls.regular,
            text(self.description).or_else(|| text(self.alt_description)),
            self.user.name,
            self.width,
            self.height,
        )
    }
}

fn collect_records(items: Vec<serde_json::Value>) -> Vec<PhotoRecord> {
    let total = items.len();
    let records: Vec<PhotoRecord> = items
        .into_iter()
        .enumerate()
        .filter_map(|(position, item)| {
            match serde_json::from_value::<RawPhoto>(item) {
                Ok(raw) => {
                    let record = raw.into_record();
                    if record.is_none() {
                        debug!(position, "dropping photo with zero dimension");
                    }
                    record
                }
                Err(e) => {
                    debug!(position, error = %e, "dropping photo missing a required field");
                    None
                }
            }
        })
        .collect();

    if records.len() < total {
        debug!(kept = records.len(), total, "filtered incomplete photos");
    }
    records
}

/// Parses the feed endpoint's bare JSON array.
pub fn parse_feed_page(body: &[u8]) -> Result<ResultSet, FeedError> {
    let items: Vec<serde_json::Value> = serde_json::from_slice(body)
        .map_err(|e| FeedError::parse("feed", format!("expected a JSON array: {e}")))?;
    Ok(ResultSet::new(collect_records(items)))
}

/// Parses the search endpoint's `{ "results": [...] }` object.
pub fn parse_search_page(body: &[u8]) -> Result<ResultSet, FeedError> {
    let envelope: SearchEnvelope = serde_json::from_slice(body).map_err(|e| {
        FeedError::parse("search", format!("expected an object with `results`: {e}"))
    })?;
    Ok(ResultSet::new(collect_records(envelope.results)).with_total_pages(envelope.total_pages))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn photo_json(id: &str) -> serde_json::Value {
        json!({
            "id": id,
            "urls": { "regular": format!("https://images.unsplash.com/{id}?w=1080"), "small": "x" },
            "user": { "name": "Ansel", "username": "ansel" },
            "width": 4000,
            "height": 3000,
            "description": null,
            "alt_description": "a quiet lake"
        })
    }

    #[test]
    fn aspect_ratio_is_height_over_width() {
        let photo = PhotoRecord::new("a", "https://x/a", None, "me", 200, 100).unwrap();
        assert!((photo.aspect_ratio() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn zero_dimensions_are_rejected() {
        assert!(PhotoRecord::new("a", "u", None, "me", 0, 100).is_none());
        assert!(PhotoRecord::new("a", "u", None, "me", 100, 0).is_none());
    }

    #[test]
    fn display_helpers() {
        let photo = PhotoRecord::new("a", "u", None, "Dorothea", 640, 480).unwrap();
        assert_eq!(photo.display_description(), "No description");
        assert_eq!(photo.byline(), "by Dorothea");
        assert_eq!(photo.dimensions_label(), "Size: 640x480");
    }

    #[test]
    fn description_falls_back_to_alt_description() {
        let body = serde_json::to_vec(&json!([photo_json("a")])).unwrap();
        let page = parse_feed_page(&body).unwrap();
        assert_eq!(page.first().unwrap().description(), Some("a quiet lake"));

        let mut with_both = photo_json("b");
        with_both["description"] = json!("primary");
        let page = parse_feed_page(&serde_json::to_vec(&json!([with_both])).unwrap()).unwrap();
        assert_eq!(page.first().unwrap().description(), Some("primary"));

        let mut neither = photo_json("c");
        neither.as_object_mut().unwrap().remove("alt_description");
        let page = parse_feed_page(&serde_json::to_vec(&json!([neither])).unwrap()).unwrap();
        assert_eq!(page.first().unwrap().description(), None);
    }

    #[test]
    fn non_string_description_falls_back() {
        let mut localized = photo_json("localized");
        localized["description"] = json!({ "en": "x" });
        localized["alt_description"] = json!("alt");
        let mut numeric = photo_json("numeric");
        numeric["description"] = json!(7);
        numeric["alt_description"] = json!(false);

        let body = serde_json::to_vec(&json!([localized, numeric])).unwrap();
        let page = parse_feed_page(&body).unwrap();

        assert_eq!(page.len(), 2);
        assert_eq!(page.get(0).unwrap().description(), Some("alt"));
        assert_eq!(page.get(1).unwrap().description(), None);
        assert_eq!(page.get(1).unwrap().display_description(), "No description");
    }

    #[test]
    fn incomplete_records_are_dropped_in_order() {
        let mut no_width = photo_json("no-width");
        no_width.as_object_mut().unwrap().remove("width");
        let mut no_user = photo_json("no-user");
        no_user["user"] = json!({ "username": "anon" });
        let mut string_id = photo_json("string-id");
        string_id["id"] = json!(42);
        let mut no_height = photo_json("no-height");
        no_height.as_object_mut().unwrap().remove("height");
        let mut no_regular = photo_json("no-regular");
        no_regular["urls"].as_object_mut().unwrap().remove("regular");
        let mut no_id = photo_json("no-id");
        no_id.as_object_mut().unwrap().remove("id");

        let body = json!([
            photo_json("first"),
            no_width,
            no_user,
            string_id,
            no_height,
            no_regular,
            no_id,
            photo_json("last")
        ]);
        let page = parse_feed_page(&serde_json::to_vec(&body).unwrap()).unwrap();

        let ids: Vec<&str> = page.iter().map(|p| p.id().as_str()).collect();
        assert_eq!(ids, vec!["first", "last"]);
    }

    #[test]
    fn all_incomplete_yields_empty_not_error() {
        let body = json!([{ "id": "a" }, { "urls": { "regular": "u" } }]);
        let page = parse_feed_page(&serde_json::to_vec(&body).unwrap()).unwrap();
        assert!(page.is_empty());

        let page = parse_search_page(br#"{"results":[{"id":"only-id"}]}"#).unwrap();
        assert!(page.is_empty());
    }

    #[test]
    fn envelopes_are_not_interchangeable() {
        let array = serde_json::to_vec(&json!([photo_json("a")])).unwrap();
        let object = serde_json::to_vec(&json!({
            "total": 1,
            "total_pages": 1,
            "results": [photo_json("a")]
        }))
        .unwrap();

        assert_eq!(parse_feed_page(&array).unwrap().len(), 1);
        assert_eq!(parse_search_page(&object).unwrap().len(), 1);
        assert!(matches!(parse_feed_page(&object), Err(FeedError::Parse { .. })));
        assert!(matches!(parse_search_page(&array), Err(FeedError::Parse { .. })));
    }

    #[test]
    fn unexpected_shapes_are_parse_errors() {
        assert!(parse_feed_page(b"not json").is_err());
        assert!(parse_feed_page(br#"{"errors":["OAuth error"]}"#).is_err());
        assert!(parse_search_page(br#"{"results": 3}"#).is_err());
        assert!(parse_search_page(b"null").is_err());
    }

    #[test]
    fn search_carries_total_pages() {
        let body = json!({ "total": 120, "total_pages": 4, "results": [photo_json("a")] });
        let page = parse_search_page(&serde_json::to_vec(&body).unwrap()).unwrap();
        assert_eq!(page.total_pages(), Some(4));
    }

    #[test]
    fn append_keeps_duplicates() {
        let photo = PhotoRecord::new("dup", "u", None, "me", 1, 1).unwrap();
        let mut first: ResultSet = vec![photo.clone()].into_iter().collect();
        first.append(ResultSet::new(vec![photo]));
        assert_eq!(first.len(), 2);
    }

    proptest! {
        #[test]
        fn aspect_ratio_matches_dimensions(width in 1u32..20_000, height in 1u32..20_000) {
            let photo = PhotoRecord::new("p", "u", None, "a", width, height).unwrap();
            let expected = f64::from(height) / f64::from(width);
            prop_assert!((photo.aspect_ratio() - expected).abs() < 1e-12);
            prop_assert!(photo.aspect_ratio() > 0.0);
        }
    }
}
