use std::collections::HashSet;

use scraper::Html;
use tracing::{error, info, warn};
use url::Url;

use crate::db::{ProductStore, UpsertOutcome};
use crate::error::{FetchError, PageError};
use crate::parser::dom::Node;
use crate::parser::extract::{extract_item, ItemContext};
use crate::parser::{self, is_challenge, next_page_url, pair_items};
use crate::session::{OperatorGate, Session};
use crate::settings::Settings;

/// Inputs shared by every item on a page.
pub struct PageContext<'a> {
    pub wishlist_name: &'a str,
    pub page_url: Option<&'a Url>,
    pub affiliate_tag: &'a str,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PageSummary {
    pub items: usize,
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl PageSummary {
    fn add(&mut self, other: PageSummary) {
        self.items += other.items;
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

/// Extract every item on one page and persist the ones that have an ASIN.
///
/// Records without an ASIN never reach the store. A store failure is logged
/// against its ASIN and the loop moves on to the next item.
pub fn process_page<N, S>(
    page: &N,
    ctx: &PageContext<'_>,
    store: &mut S,
) -> Result<PageSummary, PageError>
where
    N: Node,
    S: ProductStore + ?Sized,
{
    let items = pair_items(page)?;
    let mut summary = PageSummary::default();

    for (i, item) in items.iter().enumerate() {
        let item_ctx = ItemContext {
            index: i + 1,
            wishlist_name: ctx.wishlist_name,
            page_url: ctx.page_url,
            affiliate_tag: ctx.affiliate_tag,
        };
        let record = extract_item(item, &item_ctx);
        summary.items += 1;

        let Some(asin) = record.asin.as_deref() else {
            warn!("Product {} - no ASIN, not saved.", i + 1);
            summary.skipped += 1;
            continue;
        };

        match store.upsert(&record) {
            Ok(UpsertOutcome::Inserted) => summary.inserted += 1,
            Ok(UpsertOutcome::Updated) => summary.updated += 1,
            Ok(UpsertOutcome::Skipped) => summary.skipped += 1,
            Err(e) => {
                error!("Failed to update product {}: {}", asin, e);
                summary.failed += 1;
            }
        }
    }

    Ok(summary)
}

#[derive(Debug, Default)]
pub struct WishlistSummary {
    pub name: String,
    pub pages: usize,
    pub totals: PageSummary,
    /// All pages were walked to the end without a transport or layout failure.
    pub complete: bool,
}

/// Walk one wishlist from its first page to its last.
///
/// Fails only when the first page cannot be loaded; later failures end
/// pagination and leave the summary marked incomplete. A page that is still
/// a bot check after the gate is never treated as the end of the list.
pub async fn scrape_wishlist<S, G>(
    session: &mut Session,
    store: &mut S,
    gate: &mut G,
    settings: &Settings,
    address: &str,
    pause: bool,
) -> Result<WishlistSummary, FetchError>
where
    S: ProductStore + ?Sized,
    G: OperatorGate,
{
    let first_url = Url::parse(address).map_err(|_| FetchError::InvalidUrl(address.to_string()))?;

    let mut html = session.fetch(&first_url).await?;
    if let Err(e) = session.save_cookies() {
        warn!("Could not save cookies: {:#}", e);
    }

    let challenged = is_challenge(&Html::parse_document(&html).root_element());
    if challenged {
        warn!("Bot check detected on {}", first_url);
    }
    if pause || challenged {
        if let Err(e) = gate
            .wait("Press Enter after solving the CAPTCHA (export fresh cookies to the session file if needed).")
            .await
        {
            warn!("{:#}", e);
        }
        if let Err(e) = session.load_cookies() {
            warn!("Could not reload cookies: {:#}", e);
        }
        html = session.fetch(&first_url).await?;
    }

    let (name, blocked) = {
        let doc = Html::parse_document(&html);
        let root = doc.root_element();
        (parser::wishlist_name(&root), is_challenge(&root))
    };
    if blocked {
        error!("Still blocked by a bot check on {}; leaving it for the next run.", first_url);
        return Ok(WishlistSummary {
            name,
            ..Default::default()
        });
    }
    info!("Wishlist Name: {}", name);

    let mut summary = WishlistSummary {
        name,
        ..Default::default()
    };
    let mut seen = HashSet::new();
    let mut page_url = first_url;

    loop {
        seen.insert(page_url.clone());
        summary.pages += 1;

        let (result, next, challenged) = {
            let doc = Html::parse_document(&html);
            let root = doc.root_element();
            let ctx = PageContext {
                wishlist_name: &summary.name,
                page_url: Some(&page_url),
                affiliate_tag: &settings.affiliate_tag,
            };
            (
                process_page(&root, &ctx, &mut *store),
                next_page_url(&root, &page_url),
                is_challenge(&root),
            )
        };

        match result {
            Ok(page) => {
                info!(
                    "Page {}: {} items ({} new, {} updated, {} skipped, {} failed)",
                    summary.pages, page.items, page.inserted, page.updated, page.skipped, page.failed
                );
                summary.totals.add(page);
            }
            Err(PageError::NoItems) if challenged => {
                error!("Page {} is a bot check, stopping.", summary.pages);
                break;
            }
            Err(PageError::NoItems) => {
                warn!("No items found on page {}.", summary.pages);
                summary.complete = true;
                break;
            }
            Err(e) => {
                error!("{}", e);
                break;
            }
        }

        let Some(next) = next.filter(|u| !seen.contains(u)) else {
            info!("No next page button found.");
            summary.complete = true;
            break;
        };

        tokio::time::sleep(settings.page_delay()).await;
        match session.fetch(&next).await {
            Ok(body) => {
                html = body;
                page_url = next;
            }
            Err(e) => {
                error!("Failed to load page: {}", e);
                break;
            }
        }
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ProductRecord;
    use crate::error::StoreError;
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Records every call instead of writing anywhere.
    #[derive(Default)]
    struct CountingStore {
        calls: Vec<ProductRecord>,
        fail_on: Option<&'static str>,
    }

    impl ProductStore for CountingStore {
        fn upsert(&mut self, record: &ProductRecord) -> Result<UpsertOutcome, StoreError> {
            self.calls.push(record.clone());
            if record.asin.as_deref() == self.fail_on {
                return Err(StoreError::Sqlite(rusqlite::Error::QueryReturnedNoRows));
            }
            Ok(UpsertOutcome::Inserted)
        }
    }

    fn fixture(name: &str) -> Html {
        let html = std::fs::read_to_string(format!("tests/fixtures/{}.html", name)).unwrap();
        Html::parse_document(&html)
    }

    fn ctx() -> PageContext<'static> {
        PageContext {
            wishlist_name: "Birthday Ideas",
            page_url: None,
            affiliate_tag: "prographer-20",
        }
    }

    #[test]
    fn records_without_asin_never_reach_the_store() {
        let doc = fixture("wishlist_page");
        let mut store = CountingStore::default();
        let summary = process_page(&doc.root_element(), &ctx(), &mut store).unwrap();

        assert_eq!(store.calls.len(), 2);
        assert!(store.calls.iter().all(|r| r.asin.is_some()));
        assert_eq!(
            summary,
            PageSummary {
                items: 3,
                inserted: 2,
                updated: 0,
                skipped: 1,
                failed: 0
            }
        );
    }

    #[test]
    fn store_failure_does_not_stop_the_page() {
        let doc = fixture("wishlist_page");
        let mut store = CountingStore {
            fail_on: Some("B0FULL0001"),
            ..Default::default()
        };
        let summary = process_page(&doc.root_element(), &ctx(), &mut store).unwrap();

        assert_eq!(store.calls.len(), 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.inserted, 1);
    }

    #[test]
    fn count_mismatch_halts_without_writing() {
        let doc = fixture("mismatched_page");
        let mut store = CountingStore::default();
        let err = process_page(&doc.root_element(), &ctx(), &mut store).unwrap_err();

        assert_eq!(err, PageError::CountMismatch { titles: 3, details: 2 });
        assert!(store.calls.is_empty());
    }

    #[test]
    fn sqlite_store_end_to_end() {
        use crate::db::{fetch_history, fetch_product, init_schema, SqliteStore};

        let conn = rusqlite::Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        let mut store = SqliteStore::new(conn);
        let doc = fixture("wishlist_page");

        let first = process_page(&doc.root_element(), &ctx(), &mut store).unwrap();
        let second = process_page(&doc.root_element(), &ctx(), &mut store).unwrap();
        assert_eq!(first.inserted, 2);
        assert_eq!(second.updated, 2);

        let current = fetch_product(store.conn(), "B0SPARSE02").unwrap().unwrap();
        assert_eq!(current.price, 19.99);
        assert_eq!(fetch_history(store.conn(), "B0SPARSE02").unwrap().len(), 1);
    }

    // ── Pagination ──

    const LIST: &str = "/hz/wishlist/ls/ABC";
    const PAGE_TWO: &str = "/hz/wishlist/ls/ABC?page=2";

    const LAST_PAGE: &str = r#"<html><body>
        <span id="profile-list-name">Birthday Ideas</span>
        <ul><li class="g-item-sortable" data-price="30.00">
          <h2 class="a-size-base"><a class="a-link-normal" title="Tea Kettle" href="/Tea-Kettle/dp/B0PAGE0002/">Tea Kettle</a></h2>
        </li></ul>
        <ul class="a-pagination"><li class="a-disabled a-last">Next</li></ul>
        </body></html>"#;

    const CHALLENGE_PAGE: &str = r#"<html><body>
        <form action="/errors/validateCaptcha"><input name="field-keywords"></form>
        </body></html>"#;

    /// Counts how often the run stopped for the operator.
    #[derive(Default)]
    struct CountingGate {
        waits: usize,
    }

    impl OperatorGate for CountingGate {
        async fn wait(&mut self, _prompt: &str) -> anyhow::Result<()> {
            self.waits += 1;
            Ok(())
        }
    }

    fn settings(dir: &Path) -> Settings {
        Settings {
            db_path: dir.join("db.sqlite"),
            urls_file: dir.join("urls.txt"),
            session_file: dir.join("cookies.json"),
            affiliate_tag: "prographer-20".into(),
            retries: 1,
            retry_delay_secs: 0,
            page_timeout_secs: 5,
            page_delay_secs: 0,
            user_agent: "test-agent".into(),
        }
    }

    fn page(name: &str) -> String {
        std::fs::read_to_string(format!("tests/fixtures/{}.html", name)).unwrap()
    }

    /// Serve fixed bodies by request target; anything else is a 404.
    /// Returns the site origin and a request counter.
    async fn serve_site(pages: Vec<(&'static str, String)>) -> (Url, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let origin = Url::parse(&format!("http://{}/", listener.local_addr().unwrap())).unwrap();
        let pages: HashMap<&str, String> = pages.into_iter().collect();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = vec![0u8; 8192];
                let n = socket.read(&mut buf).await.unwrap_or(0);
                let request = String::from_utf8_lossy(&buf[..n]).to_string();
                let target = request.split_whitespace().nth(1).unwrap_or("/");
                counter.fetch_add(1, Ordering::SeqCst);

                let response = match pages.get(target) {
                    Some(body) => format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        body.len(),
                        body
                    ),
                    None => "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                        .to_string(),
                };
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });
        (origin, hits)
    }

    async fn scrape(
        origin: &Url,
        start: &str,
        pause: bool,
    ) -> (WishlistSummary, CountingStore, CountingGate) {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path());
        let mut session = Session::new(&settings).unwrap();
        let mut store = CountingStore::default();
        let mut gate = CountingGate::default();
        let address = origin.join(start).unwrap().to_string();
        let summary = scrape_wishlist(&mut session, &mut store, &mut gate, &settings, &address, pause)
            .await
            .unwrap();
        (summary, store, gate)
    }

    #[tokio::test]
    async fn follows_next_link_to_the_last_page() {
        let (origin, _) = serve_site(vec![
            (LIST, page("wishlist_page")),
            (PAGE_TWO, LAST_PAGE.to_string()),
        ])
        .await;
        let (summary, store, gate) = scrape(&origin, LIST, false).await;

        assert!(summary.complete);
        assert_eq!(summary.name, "Birthday Ideas");
        assert_eq!(summary.pages, 2);
        assert_eq!(summary.totals.items, 4);
        assert_eq!(store.calls.len(), 3);
        assert_eq!(store.calls[2].asin.as_deref(), Some("B0PAGE0002"));
        assert_eq!(gate.waits, 0);
    }

    #[tokio::test]
    async fn count_mismatch_on_later_page_is_incomplete() {
        let (origin, _) = serve_site(vec![
            (LIST, page("wishlist_page")),
            (PAGE_TWO, page("mismatched_page")),
        ])
        .await;
        let (summary, store, _) = scrape(&origin, LIST, false).await;

        assert!(!summary.complete);
        assert_eq!(summary.pages, 2);
        assert_eq!(store.calls.len(), 2);
    }

    #[tokio::test]
    async fn failed_page_load_is_incomplete() {
        let (origin, _) = serve_site(vec![(LIST, page("wishlist_page"))]).await;
        let (summary, store, _) = scrape(&origin, LIST, false).await;

        assert!(!summary.complete);
        assert_eq!(summary.pages, 1);
        assert_eq!(store.calls.len(), 2);
    }

    #[tokio::test]
    async fn self_referencing_next_link_stops() {
        // the fixture's next link is "?page=2", so starting there points back at itself
        let (origin, hits) = serve_site(vec![(PAGE_TWO, page("wishlist_page"))]).await;
        let (summary, _, _) = scrape(&origin, PAGE_TWO, false).await;

        assert!(summary.complete);
        assert_eq!(summary.pages, 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn pause_reloads_the_first_page_after_the_gate() {
        let (origin, hits) = serve_site(vec![(PAGE_TWO, page("wishlist_page"))]).await;
        let (summary, store, gate) = scrape(&origin, PAGE_TWO, true).await;

        assert_eq!(gate.waits, 1);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert!(summary.complete);
        assert_eq!(store.calls.len(), 2);
    }

    #[tokio::test]
    async fn persistent_bot_check_is_never_complete() {
        let (origin, hits) = serve_site(vec![(LIST, CHALLENGE_PAGE.to_string())]).await;
        let (summary, store, gate) = scrape(&origin, LIST, false).await;

        assert!(!summary.complete);
        assert_eq!(summary.pages, 0);
        assert_eq!(gate.waits, 1);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert!(store.calls.is_empty());
    }

    #[tokio::test]
    async fn bot_check_on_later_page_is_incomplete() {
        let (origin, _) = serve_site(vec![
            (LIST, page("wishlist_page")),
            (PAGE_TWO, CHALLENGE_PAGE.to_string()),
        ])
        .await;
        let (summary, _, gate) = scrape(&origin, LIST, false).await;

        assert!(!summary.complete);
        assert_eq!(summary.pages, 2);
        assert_eq!(gate.waits, 0);
    }

    #[tokio::test]
    async fn empty_page_ends_the_list() {
        let empty = "<html><body><span id=\"profile-list-name\">Birthday Ideas</span></body></html>";
        let (origin, _) = serve_site(vec![(LIST, empty.to_string())]).await;
        let (summary, store, _) = scrape(&origin, LIST, false).await;

        assert!(summary.complete);
        assert_eq!(summary.pages, 1);
        assert!(store.calls.is_empty());
    }
}
