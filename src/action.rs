//! Element actions exposed to the planner.
//!
//! `click_element` is the one custom action of this crate: resolve an XPath or
//! CSS locator, click through the session's page driver, let the page settle,
//! and report back. Failures are returned to the caller, never swallowed, so
//! the agent loop can show them to the planner on the next step.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, error};

use crate::session::{BrowserSession, SessionError};

pub const MISSING_LOCATOR: &str = "Either a CSS selector or an XPath must be provided";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementActionParams {
    /// Index of the element from the planner's observation. Not used for
    /// resolution.
    #[serde(default)]
    pub index: Option<u32>,
    #[serde(default)]
    pub selector: Option<String>,
    #[serde(default)]
    pub xpath: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl ElementActionParams {
    pub fn xpath(expr: impl Into<String>) -> Self {
        Self { xpath: Some(expr.into()), ..Default::default() }
    }

    pub fn css(selector: impl Into<String>) -> Self {
        Self { selector: Some(selector.into()), ..Default::default() }
    }

    pub fn described(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn locator(&self) -> Result<Locator, ActionError> {
        resolve_locator(self.xpath.as_deref(), self.selector.as_deref())
    }

    /// Label used in logs and result text.
    pub fn label(&self, locator: &Locator) -> String {
        label_for(self.description.as_deref(), locator)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputTextParams {
    #[serde(default)]
    pub index: Option<u32>,
    #[serde(default)]
    pub selector: Option<String>,
    #[serde(default)]
    pub xpath: Option<String>,
    pub text: String,
    #[serde(default)]
    pub press_enter: bool,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoToUrlParams {
    pub url: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WaitParams {
    #[serde(default = "default_wait_seconds")]
    pub seconds: f64,
}

fn default_wait_seconds() -> f64 {
    3.0
}

const MAX_WAIT: Duration = Duration::from_secs(30);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "by", rename_all = "snake_case")]
pub enum Locator {
    #[serde(rename = "xpath")]
    XPath { expr: String },
    Css { selector: String },
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::XPath { expr } => write!(f, "XPath '{expr}'"),
            Locator::Css { selector } => write!(f, "CSS Selector '{selector}'"),
        }
    }
}

/// XPath wins when both are given; empty strings count as absent.
pub fn resolve_locator(xpath: Option<&str>, selector: Option<&str>) -> Result<Locator, ActionError> {
    let present = |s: Option<&str>| s.filter(|v| !v.is_empty()).map(str::to_string);
    if let Some(expr) = present(xpath) {
        return Ok(Locator::XPath { expr });
    }
    if let Some(selector) = present(selector) {
        return Ok(Locator::Css { selector });
    }
    Err(ActionError::InvalidArgument(MISSING_LOCATOR.to_string()))
}

fn label_for(description: Option<&str>, locator: &Locator) -> String {
    match description.filter(|d| !d.is_empty()) {
        Some(d) => d.to_string(),
        None => locator.to_string(),
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResult {
    pub extracted_content: Option<String>,
    /// Whether the agent should keep this result in its running memory.
    pub include_in_memory: bool,
}

impl ActionResult {
    pub fn remembered(content: impl Into<String>) -> Self {
        Self { extracted_content: Some(content.into()), include_in_memory: true }
    }

    pub fn ephemeral(content: impl Into<String>) -> Self {
        Self { extracted_content: Some(content.into()), include_in_memory: false }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ActionError {
    #[error("{0}")]
    InvalidArgument(String),
    #[error("{0}")]
    ActionFailure(String),
    #[error("unknown action: {0}")]
    UnknownAction(String),
}

#[derive(Clone, Debug)]
pub struct ClickSettings {
    /// Fixed pause after a successful click so the page can react.
    pub settle_delay: Duration,
}

impl Default for ClickSettings {
    fn default() -> Self {
        Self { settle_delay: Duration::from_millis(500) }
    }
}

pub async fn click_element(
    params: &ElementActionParams,
    session: &dyn BrowserSession,
    settings: &ClickSettings,
) -> Result<ActionResult, ActionError> {
    debug!("entering click_element");
    let outcome = click_located(params, session, settings).await;
    debug!(ok = outcome.is_ok(), "exiting click_element");
    outcome
}

async fn click_located(
    params: &ElementActionParams,
    session: &dyn BrowserSession,
    settings: &ClickSettings,
) -> Result<ActionResult, ActionError> {
    let locator = params.locator()?;
    let label = params.label(&locator);
    let fail = |e: SessionError| failure("click", &locator, e);

    debug!("getting current page");
    let page = session.current_page().await.map_err(&fail)?;
    debug!(%locator, element = %label, "performing click via locator");
    page.click(&locator).await.map_err(&fail)?;
    debug!("click via locator completed");

    sleep(settings.settle_delay).await;

    Ok(ActionResult::ephemeral(format!("🖱️ Successfully clicked element: {label}")))
}

pub async fn input_text(
    params: &InputTextParams,
    session: &dyn BrowserSession,
) -> Result<ActionResult, ActionError> {
    let locator = resolve_locator(params.xpath.as_deref(), params.selector.as_deref())?;
    let label = label_for(params.description.as_deref(), &locator);
    let fail = |e: SessionError| failure("input", &locator, e);

    let page = session.current_page().await.map_err(&fail)?;
    debug!(%locator, enter = params.press_enter, "typing into element");
    page.fill(&locator, &params.text, params.press_enter)
        .await
        .map_err(&fail)?;

    let mut msg = format!("⌨️ Input '{}' into {label}", params.text);
    if params.press_enter {
        msg.push_str(" and pressed Enter");
    }
    Ok(ActionResult::remembered(msg))
}

pub async fn go_to_url(
    params: &GoToUrlParams,
    session: &dyn BrowserSession,
) -> Result<ActionResult, ActionError> {
    if params.url.trim().is_empty() {
        return Err(ActionError::InvalidArgument("url must not be empty".into()));
    }
    let fail = |e: SessionError| {
        let msg = format!("❌ Failed to navigate: {e}");
        error!("{msg}");
        ActionError::ActionFailure(msg)
    };
    let page = session.current_page().await.map_err(&fail)?;
    page.goto(&params.url).await.map_err(&fail)?;
    Ok(ActionResult::remembered(format!("🔗 Navigated to {}", redact_userinfo(&params.url))))
}

pub async fn wait(params: &WaitParams) -> Result<ActionResult, ActionError> {
    if !params.seconds.is_finite() || params.seconds < 0.0 {
        return Err(ActionError::InvalidArgument(format!(
            "seconds must be a non-negative number, got {}",
            params.seconds
        )));
    }
    // Clamp before converting; huge floats do not fit in a Duration.
    let pause = Duration::from_secs_f64(params.seconds.min(MAX_WAIT.as_secs_f64()));
    sleep(pause).await;
    Ok(ActionResult::remembered(format!("🕒 Waited for {:.1} seconds", pause.as_secs_f64())))
}

fn failure(verb: &str, locator: &Locator, cause: SessionError) -> ActionError {
    let msg = format!("❌ Failed {verb} action on element using {locator}: {cause}");
    error!("{msg}");
    ActionError::ActionFailure(msg)
}

/// Drops `user:password@` from a URL before it lands in memory or logs.
pub fn redact_userinfo(url: &str) -> String {
    match reqwest::Url::parse(url) {
        Ok(mut parsed) if !parsed.username().is_empty() || parsed.password().is_some() => {
            let _ = parsed.set_username("");
            let _ = parsed.set_password(None);
            parsed.to_string()
        }
        _ => url.to_string(),
    }
}
