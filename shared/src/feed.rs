use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, error, instrument, warn};
use url::Url;

use crate::capabilities::{
    AppHttp, HttpError, HttpRequest, HttpResponse, HttpTransport, ValidatedUrl,
};
use crate::config::{AccessKey, FeedConfig};
use crate::model::{self, PhotoRecord, ResultSet};
use crate::{FeedError, CATEGORY_COVER_PER_PAGE, MAX_IMAGE_BYTES};

const PHOTOS_PATH: &[&str] = &["photos"];
const SEARCH_PATH: &[&str] = &["search", "photos"];

/// Client for the photo API.
///
/// Each call is exactly one round trip through the shell's transport. No
/// call retries, and none of them touch shared state; results go straight
/// back to the caller.
#[derive(Clone)]
pub struct FeedClient {
    http: AppHttp,
    base_url: Url,
    access_key: Option<AccessKey>,
    timeout: Duration,
}

impl FeedClient {
    pub fn new(config: &FeedConfig, http: Arc<dyn HttpTransport>) -> Result<Self, FeedError> {
        config.validate()?;
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| FeedError::configuration(format!("base_url: {e}")))?;

        if config.access_key.is_none() {
            let err = FeedError::configuration("no API access key configured");
            error!(error = %err, "requests will be sent unauthenticated");
        }

        Ok(Self {
            http,
            base_url,
            access_key: config.access_key.clone(),
            timeout: config.timeout,
        })
    }

    pub fn is_authenticated(&self) -> bool {
        self.access_key.is_some()
    }

    /// One page of the unfiltered global feed.
    #[instrument(skip(self))]
    pub async fn fetch_feed(&self, page: u32, page_size: u32) -> Result<ResultSet, FeedError> {
        check_paging(page, page_size)?;
        let (page, per_page) = (page.to_string(), page_size.to_string());
        let url = self.endpoint(
            PHOTOS_PATH,
            &[("page", page.as_str()), ("per_page", per_page.as_str())],
        )?;
        let body = self.get_json(url).await?;
        let results = model::parse_feed_page(&body)?;
        debug!(count = results.len(), "feed page loaded");
        Ok(results)
    }

    /// One page of free-text search results for `query`.
    #[instrument(skip(self))]
    pub async fn fetch_by_category(
        &self,
        query: &str,
        page: u32,
        page_size: u32,
    ) -> Result<ResultSet, FeedError> {
        check_paging(page, page_size)?;
        let (page, per_page) = (page.to_string(), page_size.to_string());
        let url = self.endpoint(
            SEARCH_PATH,
            &[
                ("query", query),
                ("page", page.as_str()),
                ("per_page", per_page.as_str()),
            ],
        )?;
        let body = self.get_json(url).await?;
        let results = model::parse_search_page(&body)?;
        debug!(count = results.len(), "search page loaded");
        Ok(results)
    }

    /// First search hit for a category name, used as its cover.
    pub async fn fetch_category_cover(&self, name: &str) -> Result<Option<PhotoRecord>, FeedError> {
        let results = self
            .fetch_by_category(name, 1, CATEGORY_COVER_PER_PAGE)
            .await?;
        Ok(results.into_vec().into_iter().next())
    }

    /// Raw bytes behind an image locator. No credential is attached.
    #[instrument(skip(self))]
    pub async fn fetch_image_bytes(&self, url: &str) -> Result<Bytes, FeedError> {
        let request = HttpRequest::get(url)?
            .with_timeout(self.timeout)?
            .with_max_response_size(MAX_IMAGE_BYTES);

        let body = self.send(request).await?.into_body();

        if body.len() > MAX_IMAGE_BYTES {
            return Err(HttpError::ResponseTooLarge {
                size: body.len(),
                max: MAX_IMAGE_BYTES,
            }
            .into());
        }
        if body.is_empty() {
            return Err(FeedError::parse("image", "empty body"));
        }
        let format = image::guess_format(&body)
            .map_err(|e| FeedError::parse("image", format!("unrecognized image data: {e}")))?;

        debug!(bytes = body.len(), ?format, "image loaded");
        Ok(body)
    }

    fn endpoint(
        &self,
        path: &[&str],
        params: &[(&str, &str)],
    ) -> Result<ValidatedUrl, FeedError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| FeedError::configuration("base_url cannot carry a path"))?
            .pop_if_empty()
            .extend(path);

        {
            let mut query = url.query_pairs_mut();
            for (name, value) in params {
                query.append_pair(name, value);
            }
            if let Some(key) = &self.access_key {
                query.append_pair("client_id", key.expose());
            }
        }

        Ok(ValidatedUrl::from_url(&url)?)
    }

    async fn get_json(&self, url: ValidatedUrl) -> Result<Bytes, FeedError> {
        let request = HttpRequest::new(url)
            .with_header("Accept", "application/json")?
            .with_timeout(self.timeout)?;

        let response = self.send(request).await?;
        debug!(
            request_id = response.request_id(),
            status = response.status(),
            duration_ms = response.duration_ms(),
            "metadata response"
        );
        Ok(response.into_body())
    }

    /// Executes one request and turns non-2xx statuses into errors.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, FeedError> {
        let request_id = request.request_id().to_string();
        let result = self
            .http
            .execute(request)
            .await
            .and_then(HttpResponse::error_for_status);

        if let Err(e) = &result {
            warn!(
                request_id = e.request_id().unwrap_or(&request_id),
                timed_out = e.is_timeout(),
                status = e.status(),
                error = %e,
                "request failed"
            );
        }
        Ok(result?)
    }
}

fn check_paging(page: u32, page_size: u32) -> Result<(), FeedError> {
    if page == 0 {
        return Err(FeedError::invalid_argument("page numbers start at 1"));
    }
    if page_size == 0 {
        return Err(FeedError::invalid_argument("page size must be > 0"));
    }
    Ok(())
}
