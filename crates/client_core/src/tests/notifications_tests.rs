use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use shared::protocol::Page;

use super::*;

struct FakeBackend {
    total: u64,
    unread: Mutex<u64>,
    fail_mark: AtomicBool,
    fail_fetch: AtomicBool,
    fetches: Mutex<Vec<(u32, u32)>>,
    mark_calls: AtomicU32,
}

impl FakeBackend {
    fn new(total: u64, unread: u64) -> Arc<Self> {
        Arc::new(Self {
            total,
            unread: Mutex::new(unread),
            fail_mark: AtomicBool::new(false),
            fail_fetch: AtomicBool::new(false),
            fetches: Mutex::new(Vec::new()),
            mark_calls: AtomicU32::new(0),
        })
    }
}

fn record(id: i64, read: bool) -> NotificationRecord {
    let mut record = NotificationRecord::new(format!("title {id}"), format!("message {id}"));
    record.id = Some(NotificationId(id));
    record.read = read;
    record
}

#[async_trait]
impl NotificationBackend for FakeBackend {
    async fn fetch_page(
        &self,
        page: u32,
        size: u32,
    ) -> ClientResult<ListResponse<NotificationRecord>> {
        self.fetches.lock().await.push((page, size));
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(ClientError::Network("offline".into()));
        }
        let first = u64::from((page - 1) * size);
        let last = (first + u64::from(size)).min(self.total);
        let content = (first..last)
            .map(|n| record(n as i64 + 1, n % 2 == 0))
            .collect();
        Ok(ListResponse::Page(Page {
            content,
            total_elements: self.total,
            total_pages: self.total.div_ceil(u64::from(size)) as u32,
            size,
            number: page - 1,
        }))
    }

    async fn unread_count(&self) -> ClientResult<u64> {
        Ok(*self.unread.lock().await)
    }

    async fn mark_read(&self, _id: NotificationId) -> ClientResult<()> {
        self.mark_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_mark.load(Ordering::SeqCst) {
            return Err(ClientError::Network("offline".into()));
        }
        let mut unread = self.unread.lock().await;
        *unread = unread.saturating_sub(1);
        Ok(())
    }

    async fn mark_all_read(&self) -> ClientResult<()> {
        if self.fail_mark.load(Ordering::SeqCst) {
            return Err(ClientError::Network("offline".into()));
        }
        *self.unread.lock().await = 0;
        Ok(())
    }
}

#[tokio::test]
async fn first_page_replaces_and_later_pages_append() {
    let backend = FakeBackend::new(25, 7);
    let feed = NotificationFeed::new(backend.clone(), DEFAULT_PAGE_SIZE);

    feed.load_page(1).await.expect("page 1");
    feed.load_page(2).await.expect("page 2");
    let snapshot = feed.snapshot().await;
    assert_eq!(snapshot.records.len(), 20);
    assert_eq!(snapshot.current_page, 2);
    assert_eq!(snapshot.total, 25);
    assert_eq!(snapshot.unread, 7);
    assert!(snapshot.has_more());

    feed.load_page(1).await.expect("reload");
    assert_eq!(feed.snapshot().await.records.len(), 10);
    assert_eq!(*backend.fetches.lock().await, vec![(1, 10), (2, 10), (1, 10)]);
}

#[tokio::test]
async fn load_more_stops_when_everything_is_loaded() {
    let backend = FakeBackend::new(15, 0);
    let feed = NotificationFeed::new(backend.clone(), DEFAULT_PAGE_SIZE);

    feed.load_page(1).await.expect("page 1");
    assert!(feed.load_more().await.expect("more"));
    assert!(!feed.load_more().await.expect("no more"));

    let snapshot = feed.snapshot().await;
    assert_eq!(snapshot.records.len(), 15);
    assert_eq!(snapshot.current_page, 2);
    assert_eq!(backend.fetches.lock().await.len(), 2);
}

#[tokio::test]
async fn failed_load_keeps_records_and_clears_loading() {
    let backend = FakeBackend::new(5, 2);
    let feed = NotificationFeed::new(backend.clone(), DEFAULT_PAGE_SIZE);
    feed.load_page(1).await.expect("page 1");

    backend.fail_fetch.store(true, Ordering::SeqCst);
    assert!(feed.load_page(1).await.is_err());

    let snapshot = feed.snapshot().await;
    assert_eq!(snapshot.records.len(), 5);
    assert!(!snapshot.loading);
}

#[tokio::test]
async fn live_push_then_read_all_clears_everything() {
    let backend = FakeBackend::new(3, 1);
    let feed = NotificationFeed::new(backend.clone(), DEFAULT_PAGE_SIZE);
    feed.load_page(1).await.expect("page 1");

    feed.push_live(NotificationRecord::new("Live", "pushed")).await;
    let snapshot = feed.snapshot().await;
    assert_eq!(snapshot.records[0].title, "Live");
    assert_eq!(snapshot.unread, 2);
    assert_eq!(snapshot.total, 4);

    feed.mark_all_as_read().await.expect("read all");
    let snapshot = feed.snapshot().await;
    assert_eq!(snapshot.unread, 0);
    assert!(snapshot.records.iter().all(|record| record.read));
}

#[tokio::test]
async fn failed_read_all_changes_nothing() {
    let backend = FakeBackend::new(3, 1);
    let feed = NotificationFeed::new(backend.clone(), DEFAULT_PAGE_SIZE);
    feed.load_page(1).await.expect("page 1");
    backend.fail_mark.store(true, Ordering::SeqCst);

    assert!(feed.mark_all_as_read().await.is_err());
    let snapshot = feed.snapshot().await;
    assert_eq!(snapshot.unread, 1);
    assert!(snapshot.records.iter().any(|record| !record.read));
}

#[tokio::test]
async fn failed_ack_leaves_record_unread() {
    let backend = FakeBackend::new(3, 1);
    let feed = NotificationFeed::new(backend.clone(), DEFAULT_PAGE_SIZE);
    feed.load_page(1).await.expect("page 1");
    backend.fail_mark.store(true, Ordering::SeqCst);

    // record 2 is the unread one (odd offset)
    let err = feed.mark_as_read(NotificationId(2)).await.expect_err("must fail");
    assert!(matches!(err, ClientError::Network(_)));

    let snapshot = feed.snapshot().await;
    let target = snapshot
        .records
        .iter()
        .find(|record| record.id == Some(NotificationId(2)))
        .expect("record");
    assert!(!target.read);
    assert_eq!(snapshot.unread, 1);
}

#[tokio::test]
async fn successful_ack_flips_record_and_refreshes_counter() {
    let backend = FakeBackend::new(3, 1);
    let feed = NotificationFeed::new(backend.clone(), DEFAULT_PAGE_SIZE);
    feed.load_page(1).await.expect("page 1");

    feed.mark_as_read(NotificationId(2)).await.expect("ack");
    let snapshot = feed.snapshot().await;
    assert!(snapshot.records.iter().all(|record| record.read));
    assert_eq!(snapshot.unread, 0);

    // already read: no second server call
    feed.mark_as_read(NotificationId(2)).await.expect("noop");
    assert_eq!(backend.mark_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unknown_record_is_not_found_without_server_call() {
    let backend = FakeBackend::new(3, 1);
    let feed = NotificationFeed::new(backend.clone(), DEFAULT_PAGE_SIZE);
    feed.load_page(1).await.expect("page 1");

    let err = feed.mark_as_read(NotificationId(99)).await.expect_err("missing");
    assert!(matches!(err, ClientError::NotFound(_)));
    assert_eq!(backend.mark_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn follow_applies_pushes_from_the_stream() {
    let backend = FakeBackend::new(0, 0);
    let feed = NotificationFeed::new(backend, DEFAULT_PAGE_SIZE);
    let (tx, rx) = broadcast::channel(8);
    let task = feed.follow(rx);

    tx.send(NotificationRecord::new("a", "1")).expect("send");
    tx.send(NotificationRecord::new("b", "2")).expect("send");
    drop(tx);
    task.await.expect("follow task");

    let snapshot = feed.snapshot().await;
    let titles: Vec<_> = snapshot.records.iter().map(|r| r.title.as_str()).collect();
    assert_eq!(titles, vec!["b", "a"]);
    assert_eq!(snapshot.unread, 2);
    assert_eq!(snapshot.total, 2);
}
