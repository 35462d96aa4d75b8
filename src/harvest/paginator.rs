//! Driving one query across result pages.

use std::time::Duration;

use crate::models::{Query, Record, TerminalReason};
use crate::sources::{SearchPage, Source, SourceError};
use crate::utils::RateLimitedClient;

/// Page size, per-query cap and inter-page delay
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PaginationSettings {
    pub page_size: usize,
    /// Hard cap on the offset reached for one query, applied regardless of
    /// the total the server reports
    pub max_results_per_query: usize,
    pub page_delay: Duration,
}

impl Default for PaginationSettings {
    fn default() -> Self {
        Self {
            page_size: 25,
            max_results_per_query: 500,
            page_delay: Duration::from_millis(700),
        }
    }
}

/// Everything one query produced
#[derive(Debug, Clone, PartialEq)]
pub struct QueryFetch {
    /// Records in server order
    pub records: Vec<Record>,
    pub terminal_reason: TerminalReason,
    /// Total reported by the probe
    pub reported_total: Option<u64>,
    /// Page requests that returned a page, probe excluded
    pub pages_fetched: usize,
}

impl QueryFetch {
    fn abandoned(reason: TerminalReason) -> Self {
        Self {
            records: Vec::new(),
            terminal_reason: reason,
            reported_total: None,
            pages_fetched: 0,
        }
    }
}

/// Fetches all pages of a query from one source
#[derive(Debug)]
pub struct Paginator<'a> {
    client: &'a RateLimitedClient,
    source: &'a dyn Source,
    settings: PaginationSettings,
}

impl<'a> Paginator<'a> {
    pub fn new(
        client: &'a RateLimitedClient,
        source: &'a dyn Source,
        settings: PaginationSettings,
    ) -> Self {
        Self {
            client,
            source,
            settings,
        }
    }

    /// Probe for the total, then page through until the total, the cap or
    /// the first failed page
    pub async fn fetch_all(&self, query: &Query) -> QueryFetch {
        let total = match self.fetch_page(query, 0, 1).await {
            Ok(probe) => probe.total.unwrap_or(probe.records.len() as u64),
            Err(e) => {
                tracing::warn!("Probe failed for {}: {}", query, e);
                return QueryFetch::abandoned(TerminalReason::ProbeFailed);
            }
        };
        tracing::info!("Total results: {}", total);

        if total == 0 {
            return QueryFetch {
                reported_total: Some(0),
                ..QueryFetch::abandoned(TerminalReason::Empty)
            };
        }

        let page_size = self.settings.page_size.max(1);
        let cap = self.settings.max_results_per_query;
        let target = total.min(cap as u64);
        let mut fetch = QueryFetch {
            records: Vec::new(),
            terminal_reason: TerminalReason::Completed,
            reported_total: Some(total),
            pages_fetched: 0,
        };

        let mut offset = 0usize;
        loop {
            if offset as u64 >= total {
                fetch.terminal_reason = TerminalReason::Completed;
                break;
            }
            if offset >= cap {
                tracing::info!("Stopping at safety cap of {} results", cap);
                fetch.terminal_reason = TerminalReason::Capped;
                break;
            }

            self.client.pause(self.settings.page_delay).await;
            let page = match self.fetch_page(query, offset, page_size).await {
                Ok(page) => page,
                Err(e) => {
                    tracing::warn!("Page at offset {} failed, keeping what was fetched: {}", offset, e);
                    fetch.terminal_reason = TerminalReason::Partial;
                    break;
                }
            };

            fetch.pages_fetched += 1;
            let received = page.records.len();
            fetch.records.extend(page.records);
            offset += page_size;
            tracing::info!(
                "Fetched {}/{} for this query...",
                (offset as u64).min(target),
                target
            );

            // Servers that over-report stop returning records early
            if received == 0 {
                tracing::debug!("Empty page at offset {}, treating query as complete", offset - page_size);
                fetch.terminal_reason = TerminalReason::Completed;
                break;
            }
        }

        fetch
    }

    async fn fetch_page(
        &self,
        query: &Query,
        offset: usize,
        page_size: usize,
    ) -> Result<SearchPage, SourceError> {
        let request = self.source.search_request(query, offset, page_size);
        tracing::debug!("{}", request.describe());
        let body = self.client.send(&request).await?;
        self.source.parse_search_page(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::mock::{RecordingSleeper, ScriptedTransport};
    use crate::sources::MockSource;
    use crate::utils::{ApiRequest, RawResponse, RetryPolicy};
    use http::StatusCode;
    use serde_json::json;
    use std::sync::Arc;

    fn param(request: &ApiRequest, name: &str) -> usize {
        request.query_param(name).unwrap().parse().unwrap()
    }

    /// A server holding `total` records that answers any window of them
    fn serve(total: usize) -> Arc<ScriptedTransport> {
        Arc::new(ScriptedTransport::routed(move |request| {
            let offset = param(request, "offset");
            let show = param(request, "show");
            let items: Vec<_> = (offset..(offset + show).min(total))
                .map(|i| json!({"doi": format!("10.1/{}", i)}))
                .collect();
            Ok(RawResponse::ok(&json!({"total": total, "items": items})))
        }))
    }

    fn client(transport: Arc<ScriptedTransport>, sleeper: Arc<RecordingSleeper>) -> RateLimitedClient {
        RateLimitedClient::new(
            transport,
            sleeper,
            RetryPolicy::default().base_delay(Duration::ZERO),
        )
    }

    fn settings(page_size: usize, cap: usize) -> PaginationSettings {
        PaginationSettings {
            page_size,
            max_results_per_query: cap,
            page_delay: Duration::from_millis(700),
        }
    }

    fn page_offsets(transport: &ScriptedTransport) -> Vec<usize> {
        transport
            .requests()
            .iter()
            .filter(|r| param(r, "show") != 1)
            .map(|r| param(r, "offset"))
            .collect()
    }

    #[tokio::test]
    async fn test_cap_below_total_stops_after_two_pages() {
        let transport = serve(120);
        let sleeper = Arc::new(RecordingSleeper::new());
        let client = client(transport.clone(), sleeper.clone());
        let source = MockSource::new("http://mock.test").unwrap();

        let fetch = Paginator::new(&client, &source, settings(25, 50))
            .fetch_all(&Query::raw("q"))
            .await;

        assert_eq!(page_offsets(&transport), vec![0, 25]);
        assert_eq!(transport.request_count(), 3);
        assert_eq!(fetch.pages_fetched, 2);
        assert_eq!(fetch.records.len(), 50);
        assert_eq!(fetch.reported_total, Some(120));
        assert_eq!(fetch.terminal_reason, TerminalReason::Capped);
        assert_eq!(sleeper.waits(), vec![Duration::from_millis(700); 2]);
    }

    #[tokio::test]
    async fn test_total_below_cap_completes() {
        let transport = serve(30);
        let client = client(transport.clone(), Arc::new(RecordingSleeper::new()));
        let source = MockSource::new("http://mock.test").unwrap();

        let fetch = Paginator::new(&client, &source, settings(25, 50))
            .fetch_all(&Query::raw("q"))
            .await;

        assert_eq!(page_offsets(&transport), vec![0, 25]);
        assert_eq!(fetch.records.len(), 30);
        assert_eq!(fetch.terminal_reason, TerminalReason::Completed);

        let first: Vec<_> = fetch.records.iter().take(2).map(|r| r.str_field("doi").unwrap()).collect();
        assert_eq!(first, vec!["10.1/0", "10.1/1"]);
    }

    #[tokio::test]
    async fn test_zero_total_is_empty() {
        let transport = serve(0);
        let client = client(transport.clone(), Arc::new(RecordingSleeper::new()));
        let source = MockSource::new("http://mock.test").unwrap();

        let fetch = Paginator::new(&client, &source, settings(25, 500))
            .fetch_all(&Query::raw("q"))
            .await;

        assert_eq!(transport.request_count(), 1);
        assert_eq!(fetch.terminal_reason, TerminalReason::Empty);
        assert_eq!(fetch.reported_total, Some(0));
    }

    #[tokio::test]
    async fn test_probe_failure_abandons_query() {
        let transport = Arc::new(ScriptedTransport::routed(|_| {
            Ok(RawResponse::new(StatusCode::INTERNAL_SERVER_ERROR, "down"))
        }));
        let client = client(transport.clone(), Arc::new(RecordingSleeper::new()));
        let source = MockSource::new("http://mock.test").unwrap();

        let fetch = Paginator::new(&client, &source, settings(25, 500))
            .fetch_all(&Query::raw("q"))
            .await;

        assert_eq!(fetch.terminal_reason, TerminalReason::ProbeFailed);
        assert!(fetch.records.is_empty());
        assert_eq!(transport.request_count(), 3);
    }

    #[tokio::test]
    async fn test_failed_page_keeps_earlier_records() {
        let transport = Arc::new(ScriptedTransport::routed(|request| {
            if request.query_param("offset") == Some("50") {
                return Ok(RawResponse::new(StatusCode::BAD_GATEWAY, "bad gateway"));
            }
            let offset = param(request, "offset");
            let show = param(request, "show");
            let items: Vec<_> = (offset..offset + show)
                .map(|i| json!({"doi": format!("10.1/{}", i)}))
                .collect();
            Ok(RawResponse::ok(&json!({"total": 100, "items": items})))
        }));
        let client = client(transport.clone(), Arc::new(RecordingSleeper::new()));
        let source = MockSource::new("http://mock.test").unwrap();

        let fetch = Paginator::new(&client, &source, settings(25, 500))
            .fetch_all(&Query::raw("q"))
            .await;

        assert_eq!(fetch.terminal_reason, TerminalReason::Partial);
        assert_eq!(fetch.pages_fetched, 2);
        assert_eq!(fetch.records.len(), 50);
    }

    #[tokio::test]
    async fn test_empty_page_before_total_completes() {
        let transport = Arc::new(ScriptedTransport::routed(|request| {
            let items = if request.query_param("offset") == Some("0") {
                vec![json!({"doi": "10.1/only"})]
            } else {
                Vec::new()
            };
            Ok(RawResponse::ok(&json!({"total": 1000, "items": items})))
        }));
        let client = client(transport.clone(), Arc::new(RecordingSleeper::new()));
        let source = MockSource::new("http://mock.test").unwrap();

        let fetch = Paginator::new(&client, &source, settings(1, 500))
            .fetch_all(&Query::raw("q"))
            .await;

        assert_eq!(fetch.terminal_reason, TerminalReason::Completed);
        assert_eq!(fetch.records.len(), 1);
        assert_eq!(fetch.pages_fetched, 2);
    }
}
