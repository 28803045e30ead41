//! Filtering and pagination over an event-log snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::types::{WebhookEvent, WebhookSource};

pub const DEFAULT_PAGE_SIZE: usize = 50;
pub const MAX_PAGE_SIZE: usize = 500;

/// Query parameters accepted by the events listing.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct EventQuery {
    /// Case-insensitive substring of the event type.
    #[serde(rename = "type")]
    pub event_type: Option<String>,
    pub source: Option<WebhookSource>,
    /// Inclusive lower bound on the receipt time.
    pub from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on the receipt time.
    pub to: Option<DateTime<Utc>>,
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

/// One page of matching events.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventPage {
    pub events: Vec<WebhookEvent>,
    /// Matches before pagination.
    pub total: usize,
    pub offset: usize,
    pub limit: usize,
}

impl EventQuery {
    fn matches(&self, event: &WebhookEvent) -> bool {
        if let Some(needle) = self.event_type.as_deref().filter(|t| !t.is_empty())
            && !event
                .event_type
                .to_lowercase()
                .contains(&needle.to_lowercase())
        {
            return false;
        }
        if self.source.is_some_and(|source| source != event.source) {
            return false;
        }
        if self.from.is_some() || self.to.is_some() {
            let Some(at) = event.received_at() else {
                return false;
            };
            if self.from.is_some_and(|from| at < from) || self.to.is_some_and(|to| at > to) {
                return false;
            }
        }
        true
    }

    /// Filter `events` (kept in the given order) and cut one page out.
    pub fn apply(&self, events: Vec<WebhookEvent>) -> EventPage {
        let offset = self.offset.unwrap_or(0);
        let limit = self
            .limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);

        let matching: Vec<WebhookEvent> = events.into_iter().filter(|e| self.matches(e)).collect();
        let total = matching.len();

        EventPage {
            events: matching.into_iter().skip(offset).take(limit).collect(),
            total,
            offset,
            limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    use super::*;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, hour, 0, 0).unwrap()
    }

    fn sample() -> Vec<WebhookEvent> {
        vec![
            WebhookEvent::new(Some("4".into()), "deployment.succeeded", WebhookSource::Vercel, serde_json::Value::Null)
                .with_timestamp(at(12)),
            WebhookEvent::new(Some("3".into()), "pull_request", WebhookSource::Github, serde_json::Value::Null)
                .with_timestamp(at(11)),
            WebhookEvent::new(Some("2".into()), "push", WebhookSource::Github, serde_json::Value::Null)
                .with_timestamp(at(10)),
            WebhookEvent::new(Some("1".into()), "deployment.created", WebhookSource::Vercel, serde_json::Value::Null)
                .with_timestamp(at(9)),
        ]
    }

    fn ids(page: &EventPage) -> Vec<&str> {
        page.events.iter().map(|e| e.id.as_str()).collect()
    }

    #[test]
    fn test_no_filters_returns_all_in_order() {
        let page = EventQuery::default().apply(sample());
        assert_eq!(ids(&page), vec!["4", "3", "2", "1"]);
        assert_eq!(page.total, 4);
        assert_eq!(page.limit, DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn test_type_substring_is_case_insensitive() {
        let query = EventQuery {
            event_type: Some("DEPLOYMENT".into()),
            ..EventQuery::default()
        };
        assert_eq!(ids(&query.apply(sample())), vec!["4", "1"]);
    }

    #[test]
    fn test_source_and_time_range() {
        let query = EventQuery {
            source: Some(WebhookSource::Github),
            from: Some(at(11)),
            ..EventQuery::default()
        };
        assert_eq!(ids(&query.apply(sample())), vec!["3"]);

        let query = EventQuery {
            from: Some(at(10)),
            to: Some(at(11)),
            ..EventQuery::default()
        };
        assert_eq!(ids(&query.apply(sample())), vec!["3", "2"]);
    }

    #[test]
    fn test_pagination_reports_total_before_paging() {
        let query = EventQuery {
            offset: Some(1),
            limit: Some(2),
            ..EventQuery::default()
        };
        let page = query.apply(sample());
        assert_eq!(ids(&page), vec!["3", "2"]);
        assert_eq!(page.total, 4);
        assert_eq!((page.offset, page.limit), (1, 2));
    }

    #[test]
    fn test_offset_past_end_is_empty() {
        let query = EventQuery {
            offset: Some(10),
            ..EventQuery::default()
        };
        let page = query.apply(sample());
        assert!(page.events.is_empty());
        assert_eq!(page.total, 4);
    }

    #[test]
    fn test_limit_is_clamped() {
        let zero = EventQuery {
            limit: Some(0),
            ..EventQuery::default()
        };
        assert_eq!(zero.apply(sample()).limit, 1);

        let huge = EventQuery {
            limit: Some(100_000),
            ..EventQuery::default()
        };
        assert_eq!(huge.apply(Vec::new()).limit, MAX_PAGE_SIZE);
    }

    #[test]
    fn test_deserializes_from_query_string_shape() {
        let query: EventQuery = serde_json::from_value(serde_json::json!({
            "type": "push",
            "source": "github",
            "from": "2026-03-01T09:30:00Z",
            "limit": 5
        }))
        .unwrap();
        assert_eq!(query.event_type.as_deref(), Some("push"));
        assert_eq!(query.source, Some(WebhookSource::Github));
        assert_eq!(query.from, Some(Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).unwrap()));
        assert_eq!(query.limit, Some(5));
    }
}
