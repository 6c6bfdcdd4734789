//! Result holder for one browsing screen.
//!
//! Fetches finish in any order, so every request is handed out as a
//! [`RequestTicket`] stamped with the session's generation. Only the ticket
//! from the most recent request may change what the screen shows; anything
//! older is reported as [`Completion::Stale`] and dropped.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::catalog::CatalogKind;
use crate::config::FeedConfig;
use crate::feed::FeedClient;
use crate::model::ResultSet;
use crate::pager::DetailPager;
use crate::FeedError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeedSource {
    /// The unfiltered global feed.
    Feed,
    /// Search results for a category name or free text.
    Category(String),
}

impl FeedSource {
    pub fn category(query: impl Into<String>) -> Self {
        Self::Category(query.into())
    }

    pub fn query(&self) -> Option<&str> {
        match self {
            Self::Feed => None,
            Self::Category(query) => Some(query.as_str()),
        }
    }
}

impl fmt::Display for FeedSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Feed => f.write_str("feed"),
            Self::Category(query) => write!(f, "search '{query}'"),
        }
    }
}

/// One issued fetch. Pass it back to [`BrowseSession::complete`] together
/// with the outcome of [`RequestTicket::run`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestTicket {
    generation: u64,
    source: FeedSource,
    page: u32,
    per_page: u32,
    append: bool,
}

impl RequestTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn source(&self) -> &FeedSource {
        &self.source
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn per_page(&self) -> u32 {
        self.per_page
    }

    /// Whether the page extends the displayed results instead of replacing
    /// them.
    pub fn is_append(&self) -> bool {
        self.append
    }

    pub async fn run(&self, client: &FeedClient) -> Result<ResultSet, FeedError> {
        match &self.source {
            FeedSource::Feed => client.fetch_feed(self.page, self.per_page).await,
            FeedSource::Category(query) => {
                client
                    .fetch_by_category(query, self.page, self.per_page)
                    .await
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Applied { added: usize },
    /// A newer request was issued after this one; nothing changed.
    Stale,
    /// Displayed results were kept; the request can be retried.
    Failed(FeedError),
}

#[derive(Debug)]
pub struct BrowseSession {
    selected: FeedSource,
    source: FeedSource,
    per_page: u32,
    search_per_page: u32,
    results: ResultSet,
    results_source: Option<FeedSource>,
    next_page: u32,
    exhausted: bool,
    generation: u64,
    pending: Option<RequestTicket>,
    failed: Option<RequestTicket>,
    last_error: Option<FeedError>,
}

impl BrowseSession {
    /// Session using one page size for browsing and searching.
    pub fn new(selected: FeedSource, per_page: u32) -> Self {
        Self {
            source: selected.clone(),
            selected,
            per_page: per_page.max(1),
            search_per_page: per_page.max(1),
            results: ResultSet::default(),
            results_source: None,
            next_page: 1,
            exhausted: false,
            generation: 0,
            pending: None,
            failed: None,
            last_error: None,
        }
    }

    /// The global feed pages by `discover_per_page`, categories by
    /// `default_per_page`, and free-text searches by `search_per_page`.
    pub fn from_config(config: &FeedConfig, selected: FeedSource) -> Self {
        let per_page = match selected {
            FeedSource::Feed => config.discover_per_page,
            FeedSource::Category(_) => config.default_per_page,
        };
        let mut session = Self::new(selected, per_page);
        session.search_per_page = config.search_per_page.max(1);
        session
    }

    /// Session that starts on a catalog's default category.
    pub fn for_catalog<K: CatalogKind>(config: &FeedConfig) -> Self {
        Self::from_config(config, FeedSource::category(K::DEFAULT_SELECTION))
    }

    pub fn selected(&self) -> &FeedSource {
        &self.selected
    }

    /// Source of the most recently issued request.
    pub fn source(&self) -> &FeedSource {
        &self.source
    }

    pub fn per_page(&self) -> u32 {
        self.per_page
    }

    pub fn search_per_page(&self) -> u32 {
        self.search_per_page
    }

    pub fn results(&self) -> &ResultSet {
        &self.results
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_loading(&self) -> bool {
        self.pending.is_some()
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn last_error(&self) -> Option<&FeedError> {
        self.last_error.as_ref()
    }

    /// Switches to `source` and remembers it as the screen's selection.
    pub fn select(&mut self, source: FeedSource) -> RequestTicket {
        self.selected = source.clone();
        self.issue(source, 1, self.per_page, false)
    }

    pub fn refresh(&mut self) -> RequestTicket {
        let source = self.source.clone();
        let per_page = self.page_size_for(&source);
        self.issue(source, 1, per_page, false)
    }

    /// Searches for `text`. Blank text goes back to the current selection.
    pub fn search(&mut self, text: &str) -> RequestTicket {
        let text = text.trim();
        let source = if text.is_empty() {
            self.selected.clone()
        } else {
            FeedSource::category(text)
        };
        let per_page = self.page_size_for(&source);
        self.issue(source, 1, per_page, false)
    }

    /// Leaves search mode. Returns `None` if no search is showing.
    pub fn cancel_search(&mut self) -> Option<RequestTicket> {
        if self.source == self.selected {
            return None;
        }
        Some(self.issue(self.selected.clone(), 1, self.per_page, false))
    }

    /// Requests the page after the displayed ones. Refused while another
    /// request is pending, before anything is displayed, or after the last
    /// page.
    pub fn load_more(&mut self) -> Option<RequestTicket> {
        if self.pending.is_some() || self.exhausted {
            return None;
        }
        let source = self.results_source.clone()?;
        let per_page = self.page_size_for(&source);
        Some(self.issue(source, self.next_page, per_page, true))
    }

    /// Re-issues the last failed request under a fresh generation.
    pub fn retry(&mut self) -> Option<RequestTicket> {
        let failed = self.failed.take()?;
        Some(self.issue(failed.source, failed.page, failed.per_page, failed.append))
    }

    #[instrument(skip_all, fields(generation = ticket.generation, current = self.generation))]
    pub fn complete(
        &mut self,
        ticket: &RequestTicket,
        result: Result<ResultSet, FeedError>,
    ) -> Completion {
        if ticket.generation != self.generation {
            debug!(source = %ticket.source, page = ticket.page, "discarding stale response");
            return Completion::Stale;
        }
        self.pending = None;

        let page = match result {
            Ok(page) => page,
            Err(e) => {
                warn!(
                    source = %ticket.source,
                    page = ticket.page,
                    error = %e,
                    "fetch failed; keeping results"
                );
                self.failed = Some(ticket.clone());
                self.last_error = Some(e.clone());
                return Completion::Failed(e);
            }
        };

        let added = page.len();
        self.exhausted = match page.total_pages() {
            Some(total) => ticket.page >= total,
            None => u32::try_from(added).is_ok_and(|n| n < ticket.per_page),
        };

        if ticket.append {
            self.results.append(page);
        } else {
            self.results = page;
        }
        self.results_source = Some(ticket.source.clone());
        self.next_page = ticket.page.saturating_add(1);
        self.failed = None;
        self.last_error = None;

        debug!(
            added,
            total = self.results.len(),
            exhausted = self.exhausted,
            "results applied"
        );
        Completion::Applied { added }
    }

    /// Pager over the displayed results, starting at `index`.
    pub fn open_detail(&self, index: usize) -> Result<DetailPager, FeedError> {
        DetailPager::new(self.results.clone(), index)
    }

    /// Searches that differ from the selection use the search page size.
    fn page_size_for(&self, source: &FeedSource) -> u32 {
        if *source == self.selected {
            self.per_page
        } else {
            self.search_per_page
        }
    }

    fn issue(
        &mut self,
        source: FeedSource,
        page: u32,
        per_page: u32,
        append: bool,
    ) -> RequestTicket {
        self.generation += 1;
        self.source = source.clone();
        let ticket = RequestTicket {
            generation: self.generation,
            source,
            page,
            per_page,
            append,
        };
        self.pending = Some(ticket.clone());
        ticket
    }
}
