use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use timesheet_agent::action::MISSING_LOCATOR;
use timesheet_agent::session::Snapshot;
use timesheet_agent::{
    click_element, ActionError, BrowserSession, ClickSettings, ElementActionParams, Locator,
    PageDriver, SessionError,
};

/// Page whose click outcome is fixed up front; records every locator it receives.
struct FakePage {
    clicks: Mutex<Vec<Locator>>,
    fail_with: Option<SessionError>,
}

#[async_trait]
impl PageDriver for FakePage {
    async fn click(&self, locator: &Locator) -> Result<(), SessionError> {
        self.clicks.lock().unwrap().push(locator.clone());
        match &self.fail_with {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    async fn fill(&self, _: &Locator, _: &str, _: bool) -> Result<(), SessionError> {
        Ok(())
    }

    async fn goto(&self, _: &str) -> Result<(), SessionError> {
        Ok(())
    }

    async fn snapshot(&self, _: bool) -> Result<Snapshot, SessionError> {
        Err(SessionError::Driver("not used".into()))
    }
}

struct FakeSession {
    page: Arc<FakePage>,
    page_requests: AtomicUsize,
}

impl FakeSession {
    fn new(fail_with: Option<SessionError>) -> Self {
        Self {
            page: Arc::new(FakePage { clicks: Mutex::new(Vec::new()), fail_with }),
            page_requests: AtomicUsize::new(0),
        }
    }

    fn clicks(&self) -> Vec<Locator> {
        self.page.clicks.lock().unwrap().clone()
    }
}

#[async_trait]
impl BrowserSession for FakeSession {
    async fn current_page(&self) -> Result<Arc<dyn PageDriver>, SessionError> {
        self.page_requests.fetch_add(1, Ordering::SeqCst);
        Ok(self.page.clone())
    }
}

fn instant() -> ClickSettings {
    ClickSettings { settle_delay: Duration::ZERO }
}

#[tokio::test]
async fn clicks_by_xpath_with_description() {
    let session = FakeSession::new(None);
    let params = ElementActionParams::xpath("//button[@id='ok']").described("OK button");

    let result = click_element(&params, &session, &instant()).await.unwrap();

    assert_eq!(
        result.extracted_content.as_deref(),
        Some("🖱️ Successfully clicked element: OK button")
    );
    assert!(!result.include_in_memory);
    assert_eq!(session.clicks(), vec![Locator::XPath { expr: "//button[@id='ok']".into() }]);
}

#[tokio::test]
async fn missing_locator_is_rejected_before_touching_the_session() {
    let session = FakeSession::new(None);
    let params = ElementActionParams { index: Some(3), description: Some("x".into()), ..Default::default() };

    let err = click_element(&params, &session, &instant()).await.unwrap_err();

    assert_eq!(err, ActionError::InvalidArgument(MISSING_LOCATOR.into()));
    assert_eq!(err.to_string(), "Either a CSS selector or an XPath must be provided");
    assert_eq!(session.page_requests.load(Ordering::SeqCst), 0);
    assert!(session.clicks().is_empty());
}

#[tokio::test]
async fn xpath_wins_over_selector() {
    let session = FakeSession::new(None);
    let params = ElementActionParams {
        selector: Some("#submit-btn".into()),
        xpath: Some("//button[@id='submit-btn']".into()),
        ..Default::default()
    };

    let result = click_element(&params, &session, &instant()).await.unwrap();

    assert_eq!(session.clicks(), vec![Locator::XPath { expr: "//button[@id='submit-btn']".into() }]);
    assert_eq!(
        result.extracted_content.as_deref(),
        Some("🖱️ Successfully clicked element: XPath '//button[@id='submit-btn']'")
    );
}

#[tokio::test]
async fn css_selector_alone_is_used_verbatim() {
    let session = FakeSession::new(None);
    let params = ElementActionParams::css("#search-control-input");

    let result = click_element(&params, &session, &instant()).await.unwrap();

    assert_eq!(session.clicks(), vec![Locator::Css { selector: "#search-control-input".into() }]);
    assert_eq!(
        result.extracted_content.as_deref(),
        Some("🖱️ Successfully clicked element: CSS Selector '#search-control-input'")
    );
}

#[tokio::test]
async fn click_failure_carries_location_and_cause() {
    let session = FakeSession::new(Some(SessionError::Timeout {
        locator: "XPath '//td[@id='missing']'".into(),
        waited_ms: 30_000,
        detail: "element not found".into(),
    }));
    let params = ElementActionParams::xpath("//td[@id='missing']").described("Done button");

    let err = click_element(&params, &session, &instant()).await.unwrap_err();

    match err {
        ActionError::ActionFailure(msg) => {
            assert!(msg.starts_with("❌ Failed click action on element using XPath '//td[@id='missing']': "));
            assert!(msg.contains("element not found"));
        }
        other => panic!("expected ActionFailure, got {other:?}"),
    }
    assert_eq!(session.clicks().len(), 1);
}

#[tokio::test]
async fn settle_delay_is_applied_after_click() {
    let session = FakeSession::new(None);
    let settings = ClickSettings { settle_delay: Duration::from_millis(60) };
    let started = std::time::Instant::now();

    click_element(&ElementActionParams::css("#ok"), &session, &settings)
        .await
        .unwrap();

    assert!(started.elapsed() >= Duration::from_millis(60));
}

/// Collects formatted tracing output for one test.
#[derive(Clone, Default)]
struct LogBuf(Arc<Mutex<Vec<u8>>>);

impl io::Write for LogBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for LogBuf {
    type Writer = LogBuf;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[tokio::test]
async fn locator_is_logged_once_per_click() {
    let logs = LogBuf::default();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_writer(logs.clone())
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let session = FakeSession::new(None);
    let params = ElementActionParams::xpath("//button[@id='ok']").described("OK button");
    click_element(&params, &session, &instant()).await.unwrap();

    let out = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
    assert_eq!(out.matches("XPath '//button[@id='ok']'").count(), 1, "{out}");
    assert_eq!(out.matches("performing click via locator").count(), 1);
    assert!(!out.contains("locating element"));
}
