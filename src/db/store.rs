use crate::db::queries;
use crate::db::DbPool;
use crate::error::StoreFetchError;
use crate::models::event::{Event, NewEvent};
use crate::models::user::User;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

/// One page of a keyset scan. `next_cursor` is `None` once the scan is done.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
}

impl<T> Page<T> {
    /// A full page means there may be more rows after its last key.
    pub fn from_rows(items: Vec<T>, limit: i64, key: impl Fn(&T) -> String) -> Self {
        let next_cursor = if limit > 0 && items.len() as i64 >= limit {
            items.last().map(key)
        } else {
            None
        };
        Self { items, next_cursor }
    }
}

/// Follows page cursors until exhausted and returns every item.
pub async fn drain_pages<T, F, Fut>(mut fetch: F) -> Result<Vec<T>, sqlx::Error>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Page<T>, sqlx::Error>>,
{
    let mut items = Vec::new();
    let mut cursor: Option<String> = None;
    let mut pages = 0usize;

    loop {
        let page = fetch(cursor.clone()).await?;
        pages += 1;
        items.extend(page.items);

        match page.next_cursor {
            // A cursor that does not move would loop forever.
            Some(next) if cursor.as_deref() != Some(next.as_str()) => cursor = Some(next),
            _ => break,
        }
    }

    debug!("Scan finished: {} rows in {} pages", items.len(), pages);
    Ok(items)
}

pub trait EventStore: Sync {
    fn scan_page(
        &self,
        after: Option<String>,
        limit: i64,
    ) -> impl Future<Output = Result<Page<Event>, sqlx::Error>> + Send;

    /// Every stored event, paging through the whole table.
    fn scan_all(
        &self,
        page_size: i64,
    ) -> impl Future<Output = Result<Vec<Event>, StoreFetchError>> + Send {
        async move {
            let limit = page_size.max(1);
            drain_pages(|after| self.scan_page(after, limit))
                .await
                .map_err(|source| StoreFetchError {
                    store: "event",
                    source,
                })
        }
    }
}

pub trait UserStore: Sync {
    fn scan_page(
        &self,
        after: Option<String>,
        limit: i64,
    ) -> impl Future<Output = Result<Page<User>, sqlx::Error>> + Send;

    /// Every registered user, paging through the whole table.
    fn scan_all(
        &self,
        page_size: i64,
    ) -> impl Future<Output = Result<Vec<User>, StoreFetchError>> + Send {
        async move {
            let limit = page_size.max(1);
            drain_pages(|after| self.scan_page(after, limit))
                .await
                .map_err(|source| StoreFetchError {
                    store: "user",
                    source,
                })
        }
    }
}

/// Write side used by the ingestion cycle.
pub trait EventWriter: Sync {
    fn delete_all(&self) -> impl Future<Output = Result<u64, sqlx::Error>> + Send;

    fn insert_all(&self, events: &[NewEvent])
        -> impl Future<Output = Result<u64, sqlx::Error>> + Send;
}

impl<T: EventStore + Send> EventStore for Arc<T> {
    async fn scan_page(&self, after: Option<String>, limit: i64) -> Result<Page<Event>, sqlx::Error> {
        EventStore::scan_page(&**self, after, limit).await
    }
}

impl<T: UserStore + Send> UserStore for Arc<T> {
    async fn scan_page(&self, after: Option<String>, limit: i64) -> Result<Page<User>, sqlx::Error> {
        UserStore::scan_page(&**self, after, limit).await
    }
}

impl<T: EventWriter + Send> EventWriter for Arc<T> {
    async fn delete_all(&self) -> Result<u64, sqlx::Error> {
        EventWriter::delete_all(&**self).await
    }

    async fn insert_all(&self, events: &[NewEvent]) -> Result<u64, sqlx::Error> {
        EventWriter::insert_all(&**self, events).await
    }
}

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl EventStore for PgStore {
    async fn scan_page(&self, after: Option<String>, limit: i64) -> Result<Page<Event>, sqlx::Error> {
        let rows = match after {
            Some(cursor) => {
                sqlx::query_as::<_, Event>(queries::SCAN_EVENTS_AFTER)
                    .bind(cursor)
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                sqlx::query_as::<_, Event>(queries::SCAN_EVENTS_FIRST_PAGE)
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        Ok(Page::from_rows(rows, limit, |e| e.event_id.clone()))
    }
}

impl UserStore for PgStore {
    async fn scan_page(&self, after: Option<String>, limit: i64) -> Result<Page<User>, sqlx::Error> {
        let rows = match after {
            Some(cursor) => {
                sqlx::query_as::<_, User>(queries::SCAN_USERS_AFTER)
                    .bind(cursor)
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                sqlx::query_as::<_, User>(queries::SCAN_USERS_FIRST_PAGE)
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        Ok(Page::from_rows(rows, limit, |u| u.user_id.clone()))
    }
}

impl EventWriter for PgStore {
    async fn delete_all(&self) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(queries::DELETE_ALL_EVENTS)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn insert_all(&self, events: &[NewEvent]) -> Result<u64, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;

        for event in events {
            let result = sqlx::query(queries::INSERT_EVENT)
                .bind(&event.event_id)
                .bind(&event.event_type)
                .bind(event.latitude)
                .bind(event.longitude)
                .bind(&event.title)
                .bind(event.created_at)
                .execute(&mut *tx)
                .await?;
            inserted += result.rows_affected();
        }

        tx.commit().await?;
        Ok(inserted)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory stores for exercising the dispatcher and ingestion cycle.

    use super::*;
    use chrono::Utc;
    use sqlx::types::Json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct MemoryStore {
        pub events: Mutex<Vec<Event>>,
        pub users: Mutex<Vec<User>>,
        pub fail_events: bool,
        pub fail_users: bool,
        pub fail_delete: bool,
        pub fail_insert: bool,
        pub event_pages: AtomicUsize,
        pub user_pages: AtomicUsize,
        pub log: Mutex<Vec<String>>,
    }

    impl MemoryStore {
        pub fn with(events: Vec<Event>, users: Vec<User>) -> Self {
            Self {
                events: Mutex::new(events),
                users: Mutex::new(users),
                ..Default::default()
            }
        }

        pub fn log(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }
    }

    fn page_of<T: Clone>(
        rows: &[T],
        key: impl Fn(&T) -> String,
        after: Option<String>,
        limit: i64,
    ) -> Page<T> {
        let mut sorted: Vec<T> = rows.to_vec();
        sorted.sort_by_key(|r| key(r));
        let items: Vec<T> = sorted
            .into_iter()
            .filter(|r| after.as_ref().map_or(true, |a| key(r) > *a))
            .take(limit as usize)
            .collect();
        Page::from_rows(items, limit, key)
    }

    impl EventStore for MemoryStore {
        async fn scan_page(
            &self,
            after: Option<String>,
            limit: i64,
        ) -> Result<Page<Event>, sqlx::Error> {
            if self.fail_events {
                return Err(sqlx::Error::PoolTimedOut);
            }
            self.event_pages.fetch_add(1, Ordering::SeqCst);
            let events = self.events.lock().unwrap().clone();
            Ok(page_of(&events, |e| e.event_id.clone(), after, limit))
        }
    }

    impl UserStore for MemoryStore {
        async fn scan_page(
            &self,
            after: Option<String>,
            limit: i64,
        ) -> Result<Page<User>, sqlx::Error> {
            if self.fail_users {
                return Err(sqlx::Error::PoolTimedOut);
            }
            self.user_pages.fetch_add(1, Ordering::SeqCst);
            let users = self.users.lock().unwrap().clone();
            Ok(page_of(&users, |u| u.user_id.clone(), after, limit))
        }
    }

    impl EventWriter for MemoryStore {
        async fn delete_all(&self) -> Result<u64, sqlx::Error> {
            self.log.lock().unwrap().push("delete".to_string());
            if self.fail_delete {
                return Err(sqlx::Error::PoolTimedOut);
            }
            let mut events = self.events.lock().unwrap();
            let removed = events.len() as u64;
            events.clear();
            Ok(removed)
        }

        async fn insert_all(&self, fresh: &[NewEvent]) -> Result<u64, sqlx::Error> {
            self.log.lock().unwrap().push("insert".to_string());
            if self.fail_insert {
                return Err(sqlx::Error::PoolTimedOut);
            }
            let mut events = self.events.lock().unwrap();
            for e in fresh {
                events.retain(|existing| existing.event_id != e.event_id);
                events.push(Event {
                    event_id: e.event_id.clone(),
                    event_type: e.event_type.clone(),
                    latitude: e.latitude,
                    longitude: e.longitude,
                    title: e.title.clone(),
                    created_at: e.created_at,
                    comments: Json(Vec::new()),
                });
            }
            Ok(fresh.len() as u64)
        }
    }

    pub fn event(id: &str, event_type: &str, lat: f64, lon: f64) -> Event {
        Event {
            event_id: id.to_string(),
            event_type: event_type.to_string(),
            latitude: lat,
            longitude: lon,
            title: None,
            created_at: Utc::now(),
            comments: Json(Vec::new()),
        }
    }

    pub fn user(id: &str, lat: f64, lon: f64, enabled: bool) -> User {
        User {
            user_id: id.to_string(),
            display_name: id.to_uppercase(),
            latitude: Some(lat),
            longitude: Some(lon),
            notifications_enabled: enabled,
            push_token: Some(format!("token-{}", id)),
            email: Some(format!("{}@example.com", id)),
            account_type: Some("standard".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use std::sync::atomic::Ordering;

    #[test]
    fn test_page_cursor_only_on_full_pages() {
        let full = Page::from_rows(vec![1, 2, 3], 3, |n| n.to_string());
        assert_eq!(full.next_cursor.as_deref(), Some("3"));

        let short = Page::from_rows(vec![1, 2], 3, |n| n.to_string());
        assert_eq!(short.next_cursor, None);

        let empty: Page<i32> = Page::from_rows(Vec::new(), 3, |n| n.to_string());
        assert_eq!(empty.next_cursor, None);
    }

    #[tokio::test]
    async fn test_scan_all_drains_every_page() {
        let events = (0..7)
            .map(|i| event(&format!("EQ-{:02}", i), "EQ", 0.0, 0.0))
            .collect();
        let store = MemoryStore::with(events, Vec::new());

        let all = EventStore::scan_all(&store, 3).await.unwrap();
        let ids: Vec<&str> = all.iter().map(|e| e.event_id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["EQ-00", "EQ-01", "EQ-02", "EQ-03", "EQ-04", "EQ-05", "EQ-06"]
        );
        assert_eq!(store.event_pages.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_scan_all_exact_multiple_fetches_trailing_empty_page() {
        let users = (0..4)
            .map(|i| user(&format!("u{}", i), 0.0, 0.0, true))
            .collect();
        let store = MemoryStore::with(Vec::new(), users);

        let all = UserStore::scan_all(&store, 2).await.unwrap();
        assert_eq!(all.len(), 4);
        assert_eq!(store.user_pages.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_scan_failure_names_store() {
        let store = MemoryStore {
            fail_users: true,
            ..Default::default()
        };
        let err = UserStore::scan_all(&store, 10).await.unwrap_err();
        assert_eq!(err.store, "user");
        assert!(err.to_string().contains("user store"));
    }

    #[tokio::test]
    async fn test_drain_stops_on_stuck_cursor() {
        let mut calls = 0;
        let items = drain_pages(|_| {
            calls += 1;
            async {
                Ok(Page {
                    items: vec![1],
                    next_cursor: Some("same".to_string()),
                })
            }
        })
        .await
        .unwrap();
        assert_eq!(items, vec![1, 1]);
        assert_eq!(calls, 2);
    }
}
