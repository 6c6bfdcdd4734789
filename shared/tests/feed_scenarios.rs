use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use photofeed_shared::capabilities::HttpHeaders;
use photofeed_shared::{
    BrowseSession, Completion, DetailPager, FavoritesStore, FeedClient, FeedConfig, FeedError,
    FeedSource, HomeCategories, HttpError, HttpRequest, HttpResponse, HttpTransport,
    ImageByteCache, ResultSet,
};
use serde_json::{json, Value};

const PNG_HEADER: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

/// Answers by path and query, the way the real API would.
#[derive(Default)]
struct FakeApi {
    searches: Mutex<HashMap<String, Value>>,
    feed: Mutex<Option<Value>>,
    down: Mutex<bool>,
    log: Mutex<Vec<String>>,
}

impl FakeApi {
    fn with_search(self, query: &str, body: Value) -> Self {
        self.searches.lock().unwrap().insert(query.to_string(), body);
        self
    }

    fn with_feed(self, body: Value) -> Self {
        *self.feed.lock().unwrap() = Some(body);
        self
    }

    fn set_down(&self, down: bool) {
        *self.down.lock().unwrap() = down;
    }

    fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpTransport for FakeApi {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        let url = request.url().as_str().to_string();
        self.log.lock().unwrap().push(url.clone());

        if *self.down.lock().unwrap() {
            return Err(HttpError::ConnectionError {
                host: request.url().host().to_string(),
                message: "network unreachable".into(),
            });
        }

        let respond = |status: u16, body: Vec<u8>| {
            Ok(HttpResponse::new(status, HttpHeaders::new(), body, request.request_id(), 3))
        };

        if request.url().host() == "images.unsplash.com" {
            return respond(200, PNG_HEADER.to_vec());
        }
        if url.contains("/search/photos") {
            let query = request.query_param("query").unwrap_or_default();
            return match self.searches.lock().unwrap().get(&query) {
                Some(body) => respond(200, serde_json::to_vec(body).unwrap()),
                None => {
                    let empty = json!({ "total": 0, "total_pages": 0, "results": [] });
                    respond(200, serde_json::to_vec(&empty).unwrap())
                }
            };
        }
        match self.feed.lock().unwrap().as_ref() {
            Some(body) => respond(200, serde_json::to_vec(body).unwrap()),
            None => respond(404, b"Not Found".to_vec()),
        }
    }
}

fn photo(id: &str) -> Value {
    json!({
        "id": id,
        "description": format!("photo {id}"),
        "urls": {
            "raw": format!("https://images.unsplash.com/{id}?raw"),
            "regular": format!("https://images.unsplash.com/{id}")
        },
        "user": { "name": "Berenice Abbott", "username": "babbott" },
        "width": 3000,
        "height": 2000
    })
}

fn client(api: &Arc<FakeApi>) -> FeedClient {
    let config = FeedConfig::default().with_access_key("integration-key");
    FeedClient::new(&config, api.clone()).unwrap()
}

#[tokio::test]
async fn category_search_drops_incomplete_records_in_order() {
    let mut missing_width = photo("no-width");
    missing_width.as_object_mut().unwrap().remove("width");
    let api = Arc::new(FakeApi::default().with_search(
        "Nature",
        json!({
            "total": 3,
            "total_pages": 1,
            "results": [photo("n1"), missing_width, photo("n2")]
        }),
    ));

    let results = client(&api).fetch_by_category("Nature", 1, 2).await.unwrap();

    let ids: Vec<&str> = results.iter().map(|p| p.id().as_str()).collect();
    assert_eq!(ids, vec!["n1", "n2"]);
    assert!((results.first().unwrap().aspect_ratio() - 2.0 / 3.0).abs() < 1e-9);

    let log = api.log();
    assert_eq!(log.len(), 1);
    assert!(log[0].contains("query=Nature"));
    assert!(log[0].contains("per_page=2"));
    assert!(log[0].contains("client_id=integration-key"));
}

#[tokio::test]
async fn browse_feed_then_detail_then_favorite() {
    let api = Arc::new(FakeApi::default().with_feed(json!([photo("a"), photo("b"), photo("c")])));
    let client = client(&api);
    let favorites = Arc::new(FavoritesStore::new());

    // 1. Load the feed into a session
    let mut session = BrowseSession::new(FeedSource::Feed, 30);
    let ticket = session.refresh();
    let outcome = ticket.run(&client).await;
    assert_eq!(session.complete(&ticket, outcome), Completion::Applied { added: 3 });

    // 2. Open the second photo and step forward
    let mut pager = session.open_detail(1).unwrap();
    assert_eq!(pager.position_label().as_deref(), Some("(2 of 3)"));
    assert!(pager.next());
    assert!(!pager.next());
    let current = pager.current().unwrap();
    assert_eq!(current.id().as_str(), "c");
    assert_eq!(current.display_description(), "photo c");
    assert_eq!(current.byline(), "by Berenice Abbott");
    assert_eq!(current.dimensions_label(), "Size: 3000x2000");

    // 3. Favorite it from the detail view, twice
    assert!(pager.toggle_favorite(&favorites).unwrap());
    favorites.add(current.clone());
    let listed = favorites.list();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id().as_str(), "c");

    // 4. The favorites screen opens its own pager
    let saved: ResultSet = favorites.list().into_iter().collect();
    let favorite_pager = DetailPager::new(saved, 0).unwrap();
    assert!(favorite_pager.is_favorite(&favorites));
}

#[tokio::test]
async fn slow_search_does_not_overwrite_newer_results() {
    let api = Arc::new(
        FakeApi::default()
            .with_search("cats", json!({ "total_pages": 1, "results": [photo("cat")] }))
            .with_search("dogs", json!({ "total_pages": 1, "results": [photo("dog")] })),
    );
    let client = client(&api);
    let config = FeedConfig::default();
    let mut session = BrowseSession::for_catalog::<photofeed_shared::Home>(&config);

    let cats = session.search("cats");
    let dogs = session.search("dogs");

    // dogs lands first, cats straggles in afterwards
    let dog_page = dogs.run(&client).await;
    let cat_page = cats.run(&client).await;
    assert!(matches!(session.complete(&dogs, dog_page), Completion::Applied { .. }));
    assert_eq!(session.complete(&cats, cat_page), Completion::Stale);

    assert_eq!(session.results().first().unwrap().id().as_str(), "dog");
    assert!(!session.is_loading());
}

#[tokio::test]
async fn outage_keeps_results_until_retry_succeeds() {
    let api = Arc::new(FakeApi::default().with_feed(json!([photo("kept")])));
    let client = client(&api);
    let mut session = BrowseSession::new(FeedSource::Feed, 30);

    let first = session.refresh();
    let outcome = first.run(&client).await;
    session.complete(&first, outcome);

    api.set_down(true);
    let refresh = session.refresh();
    let outcome = refresh.run(&client).await;
    let Completion::Failed(err) = session.complete(&refresh, outcome) else {
        panic!("refresh should fail while the API is down");
    };
    assert!(matches!(err, FeedError::Network(HttpError::ConnectionError { .. })));
    assert!(err.is_retryable());
    assert_eq!(session.results().len(), 1);

    api.set_down(false);
    let retry = session.retry().unwrap();
    let outcome = retry.run(&client).await;
    assert_eq!(session.complete(&retry, outcome), Completion::Applied { added: 1 });
    assert!(session.last_error().is_none());
}

#[tokio::test]
async fn home_catalog_thumbnails_go_through_cache() {
    let api = Arc::new(
        FakeApi::default()
            .with_search("Editorial", json!({ "total_pages": 9, "results": [photo("ed")] }))
            .with_search("Wallpapers", json!({ "total_pages": 9, "results": [photo("ed")] })),
    );
    let client = client(&api);
    let cache = ImageByteCache::default();
    let mut home = HomeCategories::new();

    let editorial = home.resolve_thumbnail(0, &client, &cache).await.unwrap();
    let wallpapers = home.resolve_thumbnail(1, &client, &cache).await.unwrap();
    assert_eq!(editorial.as_deref(), Some(PNG_HEADER));
    assert_eq!(editorial, wallpapers);

    // Same cover photo, so the image itself was fetched once.
    let image_fetches = api
        .log()
        .iter()
        .filter(|url| url.starts_with("https://images.unsplash.com/"))
        .count();
    assert_eq!(image_fetches, 1);
    assert_eq!(cache.stats().fetches, 1);

    // Categories with no hits stay unresolved.
    assert!(home.resolve_thumbnail(2, &client, &cache).await.unwrap().is_none());
}

#[tokio::test]
async fn missing_credential_still_issues_request() {
    let api = Arc::new(FakeApi::default().with_feed(json!([])));
    let client = FeedClient::new(&FeedConfig::from_env_with(|_| None), api.clone()).unwrap();

    assert!(!client.is_authenticated());
    assert!(client.fetch_feed(1, 30).await.unwrap().is_empty());
    assert!(!api.log()[0].contains("client_id"));
}
