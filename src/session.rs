use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::action::Locator;

/// What the planner gets to see of the page before each step.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: String,
    pub url: Option<String>,
    pub title: Option<String>,
    pub image_base64: Option<String>,
    pub dom_summary: Option<String>,
    pub captured_at_ms: i64,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("no active page in browser session")]
    NoPage,
    #[error("timed out after {waited_ms}ms waiting for {locator} to become actionable: {detail}")]
    Timeout {
        locator: String,
        waited_ms: u128,
        detail: String,
    },
    #[error("navigation to {url} failed: {detail}")]
    Navigation { url: String, detail: String },
    #[error("driver error: {0}")]
    Driver(String),
}

/// A single tab. Element operations wait implicitly until the target is
/// present and actionable, or until the driver's own timeout elapses.
#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn click(&self, locator: &Locator) -> Result<(), SessionError>;

    /// Clears the element, types `text`, optionally followed by Enter.
    async fn fill(&self, locator: &Locator, text: &str, press_enter: bool)
        -> Result<(), SessionError>;

    async fn goto(&self, url: &str) -> Result<(), SessionError>;

    async fn snapshot(&self, with_screenshot: bool) -> Result<Snapshot, SessionError>;
}

/// The browser owned by the surrounding agent; actions only borrow it.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    async fn current_page(&self) -> Result<Arc<dyn PageDriver>, SessionError>;
}
