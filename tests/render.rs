//! Render escalation through a mock browser-rendering subsystem.

mod helpers;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use helpers::mock_transport::MockTransport;
use wraith::cookie::Cookie;
use wraith::fingerprint::Browser;
use wraith::render::{BoxFuture, RenderOptions, RenderedPage, Renderer};
use wraith::{CallOptions, HeaderMap, Session, SessionConfig, TransportClient};

/// Rendered page that checks, at release time, whether its cookie already
/// reached the originating session's jar.
struct MockPage {
    session: Session,
    cookie_applied_before_release: Arc<AtomicBool>,
    released: Arc<AtomicBool>,
}

impl RenderedPage for MockPage {
    fn content(&self) -> Bytes {
        Bytes::from_static(b"<html><body>rendered</body></html>")
    }

    fn final_url(&self) -> &str {
        "https://site.test/rendered"
    }

    fn status(&self) -> u16 {
        200
    }

    fn headers(&self) -> HeaderMap {
        HeaderMap::from_pairs([("Content-Type", "text/html; charset=utf-8")])
    }

    fn cookies(&self) -> Vec<Cookie> {
        vec![Cookie::new("rendered", "yes", "site.test")]
    }

    fn release(self: Box<Self>) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            let applied = self.session.cookies().get("rendered").is_ok();
            self.cookie_applied_before_release
                .store(applied, Ordering::SeqCst);
            self.released.store(true, Ordering::SeqCst);
        })
    }
}

struct MockRenderer {
    session: std::sync::Mutex<Option<Session>>,
    cookie_applied_before_release: Arc<AtomicBool>,
    released: Arc<AtomicBool>,
}

impl Renderer for MockRenderer {
    fn render(
        &self,
        _url: &str,
        _options: RenderOptions,
    ) -> BoxFuture<'_, wraith::Result<Box<dyn RenderedPage>>> {
        Box::pin(async move {
            let session = self
                .session
                .lock()
                .unwrap()
                .clone()
                .expect("renderer not wired to a session");
            Ok(Box::new(MockPage {
                session,
                cookie_applied_before_release: Arc::clone(&self.cookie_applied_before_release),
                released: Arc::clone(&self.released),
            }) as Box<dyn RenderedPage>)
        })
    }
}

fn rendering_session(mock: &MockTransport) -> (Session, Arc<AtomicBool>, Arc<AtomicBool>) {
    let applied = Arc::new(AtomicBool::new(false));
    let released = Arc::new(AtomicBool::new(false));
    let renderer = Arc::new(MockRenderer {
        session: std::sync::Mutex::new(None),
        cookie_applied_before_release: Arc::clone(&applied),
        released: Arc::clone(&released),
    });
    let session = Session::new(
        TransportClient::new(mock.addr()),
        SessionConfig::browser(Browser::Chrome),
    )
    .unwrap()
    .with_renderer(renderer.clone());
    *renderer.session.lock().unwrap() = Some(session.clone());
    (session, applied, released)
}

#[tokio::test]
async fn page_cookies_reach_the_jar_before_release() {
    let mock = MockTransport::start().await;
    let (session, applied, released) = rendering_session(&mock);

    // Response deliberately discarded; the jar update must not depend on it.
    let _ = session
        .render("https://site.test/app", RenderOptions::default())
        .await
        .unwrap();

    assert!(released.load(Ordering::SeqCst));
    assert!(applied.load(Ordering::SeqCst));
    assert_eq!(session.cookies().get("rendered").unwrap().value, "yes");

    session.close().await;
}

#[tokio::test]
async fn rendered_response_reflects_final_navigation_state() {
    let mock = MockTransport::start().await;
    let (session, _, _) = rendering_session(&mock);

    let response = session
        .render("https://site.test/app", RenderOptions::default())
        .await
        .unwrap();

    assert_eq!(response.url().as_str(), "https://site.test/rendered");
    assert_eq!(response.status(), 200);
    assert!(response.text().unwrap().contains("rendered"));
    assert!(response.cookies().get("rendered").is_ok());

    session.close().await;
}

#[tokio::test]
async fn render_option_diverts_a_plain_call() {
    let mock = MockTransport::start().await;
    let (session, _, released) = rendering_session(&mock);

    let response = session
        .get(
            "https://site.test/app",
            CallOptions::new().render(RenderOptions::default()),
        )
        .await
        .unwrap();

    assert!(released.load(Ordering::SeqCst));
    assert_eq!(response.url().as_str(), "https://site.test/rendered");
    // The call never touched the transport.
    assert_eq!(mock.request_count(), 0);

    session.close().await;
}

#[tokio::test]
async fn responses_escalate_through_their_originating_session() {
    let mock = MockTransport::start().await;
    let (session, _, _) = rendering_session(&mock);

    let plain = session
        .get("https://site.test/page", CallOptions::new())
        .await
        .unwrap();
    let rendered = plain.render(RenderOptions::default()).await.unwrap();

    assert_eq!(rendered.url().as_str(), "https://site.test/rendered");

    session.close().await;
}
