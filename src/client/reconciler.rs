//! Bookmark list reconciliation
//!
//! The list starts from the server snapshot and is then patched by change
//! events from the realtime feed:
//!
//! - insert: prepend, unless a row with that id is already present
//! - delete: drop the row with that id, if any
//! - update: ignored, there is no edit path
//!
//! `Reconciler::spawn` runs the list as a task that owns it outright. Events
//! arrive on an mpsc channel; every change publishes a fresh snapshot on a
//! watch channel.

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::api::BookmarkRemote;
use crate::realtime::ChangeEvent;
use crate::storage::Bookmark;

/// Shown instead of the list when it is empty
pub const EMPTY_MESSAGE: &str = "No bookmarks yet. Add your first one above!";

const EVENT_BUFFER: usize = 256;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookmarkList {
    items: Vec<Bookmark>,
}

impl BookmarkList {
    pub fn new(initial: Vec<Bookmark>) -> Self {
        Self { items: initial }
    }

    pub fn items(&self) -> &[Bookmark] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// `Some(EMPTY_MESSAGE)` while there is nothing to show
    pub fn empty_message(&self) -> Option<&'static str> {
        self.is_empty().then_some(EMPTY_MESSAGE)
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.items.iter().any(|b| b.id == id)
    }

    /// Merge one event. Returns whether the list changed.
    pub fn apply(&mut self, event: &ChangeEvent) -> bool {
        match event {
            ChangeEvent::Insert { new, .. } => {
                if self.contains(new.id) {
                    tracing::debug!(bookmark_id = %new.id, "Ignoring duplicate insert");
                    return false;
                }
                self.items.insert(0, new.clone());
                true
            }
            ChangeEvent::Delete { old, .. } => {
                let before = self.items.len();
                self.items.retain(|b| b.id != old.id);
                self.items.len() != before
            }
            ChangeEvent::Update { .. } => false,
        }
    }
}

pub struct Reconciler;

impl Reconciler {
    /// Start the task that owns the list
    pub fn spawn(initial: Vec<Bookmark>) -> ReconcilerHandle {
        let list = BookmarkList::new(initial);
        let (event_tx, mut event_rx) = mpsc::channel::<ChangeEvent>(EVENT_BUFFER);
        let (snapshot_tx, snapshot_rx) = watch::channel(list.clone());
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let mut list = list;

            loop {
                tokio::select! {
                    biased;
                    _ = &mut shutdown_rx => break,
                    event = event_rx.recv() => {
                        let Some(event) = event else {
                            break;
                        };
                        if list.apply(&event) {
                            snapshot_tx.send_replace(list.clone());
                        }
                    }
                }
            }

            tracing::debug!(remaining = list.len(), "Reconciler stopped");
        });

        ReconcilerHandle {
            events: event_tx,
            snapshots: snapshot_rx,
            shutdown: Some(shutdown_tx),
            task,
        }
    }
}

pub struct ReconcilerHandle {
    events: mpsc::Sender<ChangeEvent>,
    snapshots: watch::Receiver<BookmarkList>,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl ReconcilerHandle {
    /// Where change events go, typically handed to `RealtimeFeed::subscribe`
    pub fn sender(&self) -> mpsc::Sender<ChangeEvent> {
        self.events.clone()
    }

    /// Latest list
    pub fn snapshot(&self) -> BookmarkList {
        self.snapshots.borrow().clone()
    }

    /// Receiver that wakes on every change
    pub fn subscribe(&self) -> watch::Receiver<BookmarkList> {
        self.snapshots.clone()
    }

    /// Stop the task and wait for it. No snapshot changes after this.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Reconciler task failed");
        }
    }
}

/// Ask the server to remove a row.
///
/// The local list is not touched; the row disappears when the delete
/// comes back through the feed. Failures are logged. Returns whether the
/// request succeeded.
pub async fn delete_bookmark(remote: &dyn BookmarkRemote, id: Uuid) -> bool {
    match remote.delete(id).await {
        Ok(()) => {
            tracing::debug!(bookmark_id = %id, "Delete request accepted");
            true
        }
        Err(e) => {
            tracing::error!(bookmark_id = %id, error = %e, "Error deleting bookmark");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::testing::FakeRemote;
    use chrono::Utc;
    use std::time::Duration;

    fn bookmark(title: &str) -> Bookmark {
        Bookmark {
            id: Uuid::new_v4(),
            user_id: Uuid::nil(),
            url: format!("https://{}.example.com", title),
            title: title.to_string(),
            created_at: Utc::now(),
        }
    }

    async fn wait_for<F>(rx: &mut watch::Receiver<BookmarkList>, pred: F)
    where
        F: Fn(&BookmarkList) -> bool,
    {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if pred(&rx.borrow_and_update()) {
                    return;
                }
                rx.changed().await.unwrap();
            }
        })
        .await
        .unwrap();
    }

    #[test]
    fn test_insert_goes_to_front() {
        let old = bookmark("old");
        let mut list = BookmarkList::new(vec![old.clone()]);

        // Even an older timestamp lands at the front
        let mut late = bookmark("late");
        late.created_at = old.created_at - chrono::Duration::days(1);

        assert!(list.apply(&ChangeEvent::inserted(late.clone())));
        assert_eq!(list.items(), &[late, old]);
    }

    #[test]
    fn test_duplicate_insert_ignored() {
        let row = bookmark("a");
        let mut list = BookmarkList::new(vec![row.clone()]);

        assert!(!list.apply(&ChangeEvent::inserted(row.clone())));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_delete_removes_only_that_row() {
        let a = bookmark("a");
        let b = bookmark("b");
        let c = bookmark("c");
        let mut list = BookmarkList::new(vec![a.clone(), b.clone(), c.clone()]);

        assert!(list.apply(&ChangeEvent::deleted(b.id)));
        assert_eq!(list.items(), &[a, c]);

        assert!(!list.apply(&ChangeEvent::deleted(Uuid::new_v4())));
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_update_ignored() {
        let row = bookmark("a");
        let mut list = BookmarkList::new(vec![row.clone()]);
        let mut edited = row.clone();
        edited.title = "edited".to_string();

        let event = ChangeEvent::Update {
            table: "bookmarks".to_string(),
            commit_timestamp: Utc::now(),
            new: edited,
            old: crate::realtime::BookmarkRef { id: row.id },
        };
        assert!(!list.apply(&event));
        assert_eq!(list.items(), &[row]);
    }

    #[test]
    fn test_empty_message() {
        let mut list = BookmarkList::default();
        assert_eq!(list.empty_message(), Some(EMPTY_MESSAGE));

        list.apply(&ChangeEvent::inserted(bookmark("first")));
        assert_eq!(list.empty_message(), None);
    }

    #[tokio::test]
    async fn test_reconciler_publishes_snapshots() {
        let seed = bookmark("seed");
        let handle = Reconciler::spawn(vec![seed.clone()]);
        let mut snapshots = handle.subscribe();
        assert_eq!(handle.snapshot().items(), &[seed.clone()]);

        let added = bookmark("added");
        let events = handle.sender();
        events.send(ChangeEvent::inserted(added.clone())).await.unwrap();
        wait_for(&mut snapshots, |l| l.len() == 2).await;
        assert_eq!(handle.snapshot().items()[0], added);

        events.send(ChangeEvent::deleted(seed.id)).await.unwrap();
        wait_for(&mut snapshots, |l| l.len() == 1).await;
        assert_eq!(handle.snapshot().items(), &[added]);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_no_updates_after_shutdown() {
        let handle = Reconciler::spawn(Vec::new());
        let events = handle.sender();
        let snapshots = handle.subscribe();

        handle.shutdown().await;

        assert!(events.send(ChangeEvent::inserted(bookmark("late"))).await.is_err());
        assert!(snapshots.borrow().is_empty());
    }

    #[tokio::test]
    async fn test_delete_is_not_optimistic() {
        let row = bookmark("a");
        let handle = Reconciler::spawn(vec![row.clone()]);
        let remote = FakeRemote::default();

        assert!(delete_bookmark(&remote, row.id).await);
        assert_eq!(remote.deletes(), vec![row.id]);
        // Still there until the feed echoes the delete
        assert!(handle.snapshot().contains(row.id));

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_failed_delete_is_swallowed() {
        let remote = FakeRemote::failing();
        assert!(!delete_bookmark(&remote, Uuid::new_v4()).await);
    }
}
