//! Shared core of the photo browser: feed fetching, image byte caching,
//! favorites and the detail pager.
//!
//! The host shell owns rendering and the network stack. It hands this crate
//! an [`HttpTransport`] and reads back [`ResultSet`]s, favorites snapshots
//! and [`DetailPager`] state.

#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod browse;
pub mod capabilities;
pub mod catalog;
pub mod config;
pub mod favorites;
pub mod feed;
pub mod image_cache;
pub mod model;
pub mod pager;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use browse::{BrowseSession, Completion, FeedSource, RequestTicket};
pub use capabilities::{AppHttp, HttpError, HttpRequest, HttpResponse, HttpTransport};
pub use catalog::{
    Category, CategoryCatalog, CatalogKind, Discover, DiscoverCategories, Home, HomeCategories,
};
pub use config::{AccessKey, FeedConfig, ImageCacheConfig};
pub use favorites::FavoritesStore;
pub use feed::FeedClient;
pub use image_cache::{CacheStats, ImageByteCache};
pub use model::{PhotoId, PhotoRecord, ResultSet};
pub use pager::DetailPager;

pub const DEFAULT_BASE_URL: &str = "https://api.unsplash.com";
pub const DEFAULT_PER_PAGE: u32 = 30;
pub const SEARCH_RESULTS_PER_PAGE: u32 = 100;
pub const DISCOVER_PER_PAGE: u32 = 100;
pub const CATEGORY_COVER_PER_PAGE: u32 = 1;
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;
pub const DEFAULT_IMAGE_CACHE_ENTRIES: usize = 200;
pub const DEFAULT_IMAGE_CACHE_BYTES: usize = 64 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Network,
    Timeout,
    Authentication,
    RateLimited,
    NotFound,
    Validation,
    ImageTooLarge,
    Parse,
    Configuration,
    InvalidArgument,
    OutOfRange,
}

impl ErrorKind {
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Network => "NETWORK_ERROR",
            Self::Timeout => "TIMEOUT",
            Self::Authentication => "AUTH_ERROR",
            Self::RateLimited => "RATE_LIMITED",
            Self::NotFound => "NOT_FOUND",
            Self::Validation => "VALIDATION_ERROR",
            Self::ImageTooLarge => "IMAGE_TOO_LARGE",
            Self::Parse => "PARSE_ERROR",
            Self::Configuration => "CONFIGURATION_ERROR",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::OutOfRange => "OUT_OF_RANGE",
        }
    }

    /// Whether the user should be offered a retry for this kind of failure.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Network | Self::Timeout | Self::RateLimited)
    }

    #[must_use]
    pub fn user_facing_message(self) -> &'static str {
        match self {
            Self::Network => {
                "Unable to connect. Please check your internet connection and try again."
            }
            Self::Timeout => "The request timed out. Please try again.",
            Self::Authentication => "The photo service rejected our credentials.",
            Self::RateLimited => "Too many requests. Please wait a moment and try again.",
            Self::NotFound => "This photo is no longer available.",
            Self::Validation => "The photo service could not handle this request.",
            Self::ImageTooLarge => "This image is too large to display.",
            Self::Parse => "The photo service sent something we couldn't read.",
            Self::Configuration => "The app is missing its photo service configuration.",
            Self::InvalidArgument | Self::OutOfRange => {
                "An unexpected error occurred. Please try again."
            }
        }
    }
}

/// Every failure the core reports to its callers.
///
/// Cloneable so that one fetch outcome can be handed to every caller that
/// was waiting on the same in-flight request.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FeedError {
    #[error("network error: {0}")]
    Network(#[from] HttpError),

    #[error("unexpected {context} payload: {reason}")]
    Parse {
        context: &'static str,
        reason: String,
    },

    #[error("configuration error: {reason}")]
    Configuration { reason: String },

    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },

    #[error("index {index} out of range for {len} items")]
    OutOfRange { index: usize, len: usize },
}

impl FeedError {
    pub(crate) fn parse(context: &'static str, reason: impl Into<String>) -> Self {
        Self::Parse {
            context,
            reason: reason.into(),
        }
    }

    pub(crate) fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Network(e) => match e {
                HttpError::Timeout { .. } => ErrorKind::Timeout,
                HttpError::ConnectionError { .. } => ErrorKind::Network,
                HttpError::HttpStatus { status, .. } => match status {
                    401 | 403 => ErrorKind::Authentication,
                    404 | 410 => ErrorKind::NotFound,
                    408 => ErrorKind::Timeout,
                    429 => ErrorKind::RateLimited,
                    _ if e.is_transient() => ErrorKind::Network,
                    _ => ErrorKind::Validation,
                },
                HttpError::ResponseTooLarge { .. } => ErrorKind::ImageTooLarge,
                HttpError::InvalidResponse { .. } => ErrorKind::Parse,
                HttpError::InvalidUrl { .. }
                | HttpError::InvalidHeader { .. }
                | HttpError::InvalidRequest { .. } => ErrorKind::Validation,
            },
            Self::Parse { .. } => ErrorKind::Parse,
            Self::Configuration { .. } => ErrorKind::Configuration,
            Self::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            Self::OutOfRange { .. } => ErrorKind::OutOfRange,
        }
    }

    #[must_use]
    pub fn code(&self) -> &'static str {
        self.kind().code()
    }

    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    #[must_use]
    pub fn user_facing_message(&self) -> &'static str {
        self.kind().user_facing_message()
    }
}
