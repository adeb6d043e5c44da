/*
 * Responsibility
 * - 認可判定の結果を in-memory に一定時間だけ残す (GET /events の元データ)
 * - 件数上限と保持期間で自動的に捨てる (永続化はしない)
 *
 * Notes
 * - token そのものは残さない。subject と理由だけ
 */
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use moka::sync::Cache;
use serde::Serialize;

use crate::services::authorize::RequestedUrl;
use crate::services::clock::Clock;

pub const DEFAULT_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_CAPACITY: u64 = 10_000;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordedEvent {
    pub id: u64,
    pub time: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub host: String,
    pub url: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// One page of recorded events, newest first, with per-type counts over everything retained.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPage {
    pub total_count: usize,
    pub counts: BTreeMap<&'static str, usize>,
    pub page: usize,
    pub size: usize,
    pub events: Vec<RecordedEvent>,
}

#[derive(Clone)]
pub struct EventStore {
    events: Cache<u64, RecordedEvent>,
    next_id: Arc<AtomicU64>,
    clock: Arc<dyn Clock>,
}

impl EventStore {
    pub fn new(retention: Duration, capacity: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            events: Cache::builder()
                .time_to_live(retention)
                .max_capacity(capacity)
                .build(),
            next_id: Arc::new(AtomicU64::new(1)),
            clock,
        }
    }

    pub fn record(
        &self,
        kind: &'static str,
        requested_url: &RequestedUrl,
        subject: Option<&str>,
        reason: Option<&str>,
    ) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let event = RecordedEvent {
            id,
            time: self.clock.now(),
            kind,
            host: requested_url.host.clone(),
            url: requested_url.to_string(),
            method: requested_url.method.clone(),
            subject: subject.map(str::to_string),
            reason: reason.map(str::to_string),
        };
        self.events.insert(id, event);
        id
    }

    /// Every retained event, newest first.
    pub fn all(&self) -> Vec<RecordedEvent> {
        let mut events: Vec<_> = self.events.iter().map(|(_, event)| event).collect();
        events.sort_by(|a, b| b.id.cmp(&a.id));
        events
    }

    pub fn page(&self, page: usize, size: usize) -> EventPage {
        let all = self.all();

        let mut counts = BTreeMap::new();
        for event in &all {
            *counts.entry(event.kind).or_insert(0) += 1;
        }

        let events = all
            .iter()
            .skip(page.saturating_mul(size))
            .take(size)
            .cloned()
            .collect();

        EventPage {
            total_count: all.len(),
            counts,
            page,
            size,
            events,
        }
    }
}

impl fmt::Debug for EventStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStore")
            .field("retained", &self.events.entry_count())
            .finish()
    }
}
