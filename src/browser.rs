use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use chromiumoxide::browser::Browser as OxideBrowser;
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::element::Element;
use chromiumoxide::error::CdpError;
use chromiumoxide::page::{Page, ScreenshotParamsBuilder};
use futures::StreamExt;
use nanoid::nanoid;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::action::Locator;
use crate::session::{BrowserSession, PageDriver, SessionError, Snapshot};

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const DOM_SUMMARY_LIMIT: usize = 12_000;

// Lists visible interactive elements with an id/xpath hint the planner can reuse.
const DOM_SUMMARY_JS: &str = r#"
(function() {
  const sel = 'a,button,input,select,textarea,li,td,[role=button],[onclick],[id]';
  const out = [];
  let i = 0;
  for (const el of document.querySelectorAll(sel)) {
    const r = el.getBoundingClientRect();
    if (r.width === 0 || r.height === 0) continue;
    const value = el.type === 'password' ? '' : el.value;
    const text = (el.innerText || value || el.placeholder || '').trim().replace(/\s+/g, ' ').slice(0, 80);
    const id = el.id ? '#' + el.id : '';
    const cls = (typeof el.className === 'string' && el.className) ? '.' + el.className.trim().split(/\s+/).join('.') : '';
    out.push('[' + (i++) + '] <' + el.tagName.toLowerCase() + id + cls + '> ' + text);
  }
  return out.join('\n');
})()
"#;

#[derive(Clone)]
pub struct BrowserConfig {
    pub headless: bool,
    pub user_agent: Option<String>,
    /// Upper bound for the implicit wait before an element action gives up.
    pub action_timeout: Duration,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            user_agent: None,
            action_timeout: Duration::from_secs(30),
        }
    }
}

/// Chromium browser owned by the binary for the lifetime of one run.
pub struct ChromiumSession {
    browser: OxideBrowser,
    page: Page,
    action_timeout: Duration,
    handler: JoinHandle<()>,
}

impl ChromiumSession {
    pub async fn launch(cfg: BrowserConfig) -> Result<Self> {
        let mut builder = chromiumoxide::browser::BrowserConfig::builder();
        if !cfg.headless {
            builder = builder.with_head();
        }
        // Fresh profile per run so a previous Chromium cannot hold the profile lock.
        let mut profile_dir: PathBuf = std::env::temp_dir();
        profile_dir.push(format!(
            "timesheet-agent-profile-{}-{}",
            std::process::id(),
            chrono::Utc::now().timestamp_millis()
        ));
        std::fs::create_dir_all(&profile_dir)?;
        builder = builder
            .user_data_dir(profile_dir)
            .arg("--no-first-run")
            .arg("--no-default-browser-check");
        let bcfg = builder.build().map_err(|e| anyhow::anyhow!(e))?;
        let (browser, mut handler) = OxideBrowser::launch(bcfg).await?;
        let handler = tokio::spawn(async move {
            while let Some(_ev) = handler.next().await {}
        });
        let page = browser.new_page("about:blank").await?;
        if let Some(ua) = cfg.user_agent {
            page.set_user_agent(ua).await?;
        }
        // Screenshots fail on a zero-sized viewport.
        set_viewport(&page).await?;
        info!(headless = cfg.headless, "browser launched");
        Ok(Self {
            browser,
            page,
            action_timeout: cfg.action_timeout,
            handler,
        })
    }

    pub async fn close(mut self) -> Result<()> {
        self.browser.close().await?;
        let _ = self.browser.wait().await;
        self.handler.abort();
        info!("browser closed");
        Ok(())
    }
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn current_page(&self) -> Result<Arc<dyn PageDriver>, SessionError> {
        // Always the tab opened at launch. `Browser::pages` comes back in
        // hash-map order and may include Chromium's own startup tab.
        Ok(Arc::new(ChromiumPage {
            page: self.page.clone(),
            action_timeout: self.action_timeout,
        }))
    }
}

pub struct ChromiumPage {
    page: Page,
    action_timeout: Duration,
}

impl ChromiumPage {
    async fn locate(&self, locator: &Locator) -> Result<Element, CdpError> {
        match locator {
            Locator::XPath { expr } => self.page.find_xpath(expr.as_str()).await,
            Locator::Css { selector } => self.page.find_element(selector.as_str()).await,
        }
    }

    /// Re-resolves and retries `op` until it succeeds or the action timeout passes.
    async fn until_actionable<F, Fut>(&self, locator: &Locator, mut op: F) -> Result<(), SessionError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(), CdpError>>,
    {
        let start = Instant::now();
        loop {
            match op().await {
                Ok(()) => return Ok(()),
                Err(e) if start.elapsed() < self.action_timeout => {
                    debug!(%locator, error = %e, "element not actionable yet");
                    sleep(POLL_INTERVAL).await;
                }
                Err(e) => {
                    return Err(SessionError::Timeout {
                        locator: locator.to_string(),
                        waited_ms: start.elapsed().as_millis(),
                        detail: e.to_string(),
                    })
                }
            }
        }
    }

    async fn screenshot_b64(&self) -> Result<String, CdpError> {
        let take = move || async move {
            self.page
                .screenshot(ScreenshotParamsBuilder::default().full_page(false).build())
                .await
        };
        match take().await {
            Ok(bytes) => Ok(STANDARD.encode(bytes)),
            Err(e) => {
                let msg = e.to_string();
                if msg.contains("0 width") || msg.contains("0 height") {
                    // Force viewport and retry once
                    let _ = set_viewport(&self.page).await;
                    sleep(Duration::from_millis(50)).await;
                    let bytes = take().await?;
                    return Ok(STANDARD.encode(bytes));
                }
                Err(e)
            }
        }
    }
}

#[async_trait]
impl PageDriver for ChromiumPage {
    async fn click(&self, locator: &Locator) -> Result<(), SessionError> {
        self.until_actionable(locator, move || async move {
            let el = self.locate(locator).await?;
            el.click().await?;
            Ok(())
        })
        .await
    }

    async fn fill(
        &self,
        locator: &Locator,
        text: &str,
        press_enter: bool,
    ) -> Result<(), SessionError> {
        // Cleared on every attempt so a retry never types twice.
        self.until_actionable(locator, move || async move {
            let el = self.locate(locator).await?;
            el.click().await?;
            el.call_js_fn("function() { if ('value' in this) this.value = ''; }", false)
                .await?;
            el.type_str(text).await?;
            if press_enter {
                el.press_key("Enter").await?;
            }
            Ok(())
        })
        .await
    }

    async fn goto(&self, url: &str) -> Result<(), SessionError> {
        let nav_err = |e: CdpError| SessionError::Navigation {
            url: crate::action::redact_userinfo(url),
            detail: e.to_string(),
        };
        self.page.goto(url).await.map_err(&nav_err)?;
        self.page.wait_for_navigation().await.map_err(&nav_err)?;
        Ok(())
    }

    async fn snapshot(&self, with_screenshot: bool) -> Result<Snapshot, SessionError> {
        let url = self.page.url().await.map_err(driver_err)?;
        let title = self.page.get_title().await.map_err(driver_err)?;
        let mut dom_summary: String = self
            .page
            .evaluate(DOM_SUMMARY_JS)
            .await
            .map_err(driver_err)?
            .into_value()
            .unwrap_or_default();
        if dom_summary.len() > DOM_SUMMARY_LIMIT {
            let mut cut = DOM_SUMMARY_LIMIT;
            while !dom_summary.is_char_boundary(cut) {
                cut -= 1;
            }
            dom_summary.truncate(cut);
        }
        let image_base64 = if with_screenshot {
            Some(self.screenshot_b64().await.map_err(driver_err)?)
        } else {
            None
        };
        Ok(Snapshot {
            id: nanoid!(),
            url,
            title,
            image_base64,
            dom_summary: Some(dom_summary),
            captured_at_ms: chrono::Utc::now().timestamp_millis(),
        })
    }
}

async fn set_viewport(page: &Page) -> Result<()> {
    let metrics = SetDeviceMetricsOverrideParams::builder()
        .width(1280)
        .height(800)
        .device_scale_factor(1.0)
        .mobile(false)
        .build()
        .map_err(|e| anyhow::anyhow!(e))?;
    page.execute(metrics).await?;
    Ok(())
}

fn driver_err(e: CdpError) -> SessionError {
    SessionError::Driver(e.to_string())
}
