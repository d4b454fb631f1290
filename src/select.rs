//! Interactive issue selection.
//!
//! [`PaginatedSelector`] drives search mode: fetch a page, fold it into
//! issues, let the operator pick one or move to the next page.
//! [`load_and_select_event`] is the flat variant for a known query run.

use anyhow::Result;
use colored::Colorize;
use console::Term;
use dialoguer::theme::ColorfulTheme;
use dialoguer::Select;

use crate::backend::{EventSource, ListEventsRequest, QueryFilter, QueryRunRequest};
use crate::dedup::dedup;
use crate::fetch::{FetchError, RetryingFetcher};
use crate::issues::{aggregate, Issue};
use crate::output::{self, Spinner, NEXT_PAGE};
use crate::timeframe::Timeframe;

/// Maximum choices offered for a query run
pub const MAX_RUN_CHOICES: usize = 10;

/// A single-choice terminal prompt
pub trait Prompter {
    /// Index of the chosen item, or `None` if the operator cancelled
    fn select(&mut self, prompt: &str, items: &[String]) -> Result<Option<usize>>;
}

impl<P: Prompter + ?Sized> Prompter for &mut P {
    fn select(&mut self, prompt: &str, items: &[String]) -> Result<Option<usize>> {
        (**self).select(prompt, items)
    }
}

/// [`Prompter`] backed by dialoguer on stderr
pub struct DialoguerPrompter {
    term: Term,
    theme: ColorfulTheme,
}

impl DialoguerPrompter {
    pub fn new() -> Self {
        Self {
            term: Term::stderr(),
            theme: ColorfulTheme::default(),
        }
    }
}

impl Default for DialoguerPrompter {
    fn default() -> Self {
        Self::new()
    }
}

impl Prompter for DialoguerPrompter {
    fn select(&mut self, prompt: &str, items: &[String]) -> Result<Option<usize>> {
        let selection = Select::with_theme(&self.theme)
            .with_prompt(prompt.bold().to_string())
            .items(items)
            .default(0)
            .max_length(20)
            .interact_on_opt(&self.term)?;
        Ok(selection)
    }
}

/// What the operator is searching
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub timeframe: Timeframe,
    pub datasets: Vec<String>,
    pub filters: Vec<QueryFilter>,
    pub service: String,
    pub page_size: usize,
}

/// Outcome of search mode
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    Chosen(Issue),
    /// The current page held no issues
    NoIssues,
    Cancelled,
}

/// Transient paging state
#[derive(Debug, Default)]
struct SelectionState {
    offset: usize,
}

/// Pages through search results until an issue is picked
pub struct PaginatedSelector<'a, S: EventSource + ?Sized, P: Prompter> {
    source: &'a S,
    prompter: P,
    fetcher: RetryingFetcher,
    request: SearchRequest,
}

impl<'a, S: EventSource + ?Sized, P: Prompter> PaginatedSelector<'a, S, P> {
    pub fn new(source: &'a S, prompter: P, fetcher: RetryingFetcher, request: SearchRequest) -> Self {
        Self {
            source,
            prompter,
            fetcher,
            request,
        }
    }

    fn page_request(&self, state: &SelectionState) -> ListEventsRequest {
        ListEventsRequest {
            datasets: self.request.datasets.clone(),
            filters: self.request.filters.clone(),
            from: self.request.timeframe.from_millis(),
            to: self.request.timeframe.to_millis(),
            service: self.request.service.clone(),
            offset: state.offset,
            limit: self.request.page_size,
            needle: None,
        }
    }

    pub async fn run(&mut self) -> Result<Selection> {
        let mut state = SelectionState::default();

        loop {
            let request = self.page_request(&state);
            tracing::debug!(offset = state.offset, limit = request.limit, "fetching page");

            let spinner = Spinner::start("Collecting errors from your environment");
            let source = self.source;
            let page = match self
                .fetcher
                .fetch(|| source.list_events(&request))
                .await
            {
                Ok(page) => {
                    spinner.succeed();
                    page
                }
                Err(err) => {
                    spinner.fail("Failed to collect errors");
                    return Err(err.into());
                }
            };

            let issues = aggregate(&page.events);
            tracing::debug!(
                events = page.len(),
                issues = issues.len(),
                "aggregated page"
            );

            // A full page of malformed events still leaves later pages to see
            let has_next = page.len() >= self.request.page_size;
            if issues.is_empty() && !has_next {
                output::print_no_issues();
                return Ok(Selection::NoIssues);
            }

            let mut choices: Vec<String> = issues.iter().map(output::issue_label).collect();
            if has_next {
                choices.push(NEXT_PAGE.to_string());
            }

            let Some(index) = self
                .prompter
                .select("Select an error to investigate", &choices)?
            else {
                return Ok(Selection::Cancelled);
            };

            if index == issues.len() && has_next {
                state.offset += self.request.page_size;
                continue;
            }
            return match issues.into_iter().nth(index) {
                Some(issue) => Ok(Selection::Chosen(issue)),
                None => Err(anyhow::anyhow!("selection {index} is out of range")),
            };
        }
    }
}

/// Outcome of picking an event from a query run
#[derive(Debug, Clone, PartialEq)]
pub enum RunSelection {
    /// Error text of the chosen event
    Chosen(String),
    NoIssues,
    Cancelled,
    /// The run's events could not be fetched
    FetchFailed,
}

/// Fetch a query run's events, dedup them, and let the operator pick one.
pub async fn load_and_select_event<S, P>(
    source: &S,
    prompter: &mut P,
    fetcher: &mut RetryingFetcher,
    request: &QueryRunRequest,
) -> Result<RunSelection>
where
    S: EventSource + ?Sized,
    P: Prompter,
{
    tracing::debug!(
        query_id = %request.query_id,
        run_id = %request.run_id,
        "getting events for query run"
    );

    let spinner = Spinner::start("Getting the events");
    let batch = match fetcher.fetch(|| source.query_run_events(request)).await {
        Ok(batch) => batch,
        Err(FetchError::Exhausted { attempts, last }) => {
            spinner.fail(&format!(
                "Failed to get events for your query after {attempts} attempts"
            ));
            tracing::debug!("last fetch error: {last}");
            return Ok(RunSelection::FetchFailed);
        }
    };
    spinner.succeed();

    let distinct = dedup(&batch.events);
    if distinct.is_empty() {
        output::print_no_issues();
        return Ok(RunSelection::NoIssues);
    }

    let shown: Vec<_> = distinct.into_iter().take(MAX_RUN_CHOICES).collect();
    let choices: Vec<String> = shown.iter().map(|e| output::event_label(e)).collect();

    let Some(index) = prompter.select("Select an issue to investigate", &choices)? else {
        return Ok(RunSelection::Cancelled);
    };

    let error = shown
        .get(index)
        .and_then(|event| event.error())
        .ok_or_else(|| anyhow::anyhow!("selection {index} is out of range"))?;
    Ok(RunSelection::Chosen(error.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendError;
    use crate::event::{test_event, EventBatch, RawEvent};
    use crate::fetch::RetryPolicy;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Serves canned pages keyed by offset and records every request
    #[derive(Default)]
    struct FakeSource {
        pages: Vec<Vec<RawEvent>>,
        page_size: usize,
        failures_before_success: Mutex<u32>,
        list_calls: Mutex<Vec<usize>>,
        run_calls: Mutex<u32>,
    }

    impl FakeSource {
        fn with_pages(pages: Vec<Vec<RawEvent>>, page_size: usize) -> Self {
            Self {
                pages,
                page_size,
                ..Default::default()
            }
        }

        fn take_failure(&self) -> bool {
            let mut remaining = self.failures_before_success.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                true
            } else {
                false
            }
        }

        fn offsets(&self) -> Vec<usize> {
            self.list_calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EventSource for FakeSource {
        async fn list_events(
            &self,
            request: &ListEventsRequest,
        ) -> Result<EventBatch, BackendError> {
            self.list_calls.lock().unwrap().push(request.offset);
            if self.take_failure() {
                return Err(BackendError::Network("flaky".to_string()));
            }
            let page = self
                .pages
                .get(request.offset / self.page_size.max(1))
                .cloned()
                .unwrap_or_default();
            Ok(EventBatch { events: page })
        }

        async fn query_run_events(
            &self,
            _request: &QueryRunRequest,
        ) -> Result<EventBatch, BackendError> {
            *self.run_calls.lock().unwrap() += 1;
            if self.take_failure() {
                return Err(BackendError::Status {
                    status: 404,
                    body: "not ready".to_string(),
                });
            }
            Ok(EventBatch {
                events: self.pages.first().cloned().unwrap_or_default(),
            })
        }
    }

    /// Replays scripted answers and records what was shown
    struct ScriptedPrompter {
        answers: VecDeque<Option<usize>>,
        shown: Vec<Vec<String>>,
    }

    impl ScriptedPrompter {
        fn new(answers: Vec<Option<usize>>) -> Self {
            Self {
                answers: answers.into(),
                shown: Vec::new(),
            }
        }
    }

    impl Prompter for ScriptedPrompter {
        fn select(&mut self, _prompt: &str, items: &[String]) -> Result<Option<usize>> {
            self.shown.push(items.to_vec());
            self.answers
                .pop_front()
                .ok_or_else(|| anyhow::anyhow!("unexpected prompt"))
        }
    }

    fn quick_fetcher() -> RetryingFetcher {
        RetryingFetcher::new(RetryPolicy {
            max_attempts: 5,
            delay: Duration::ZERO,
        })
    }

    fn search(page_size: usize) -> SearchRequest {
        SearchRequest {
            timeframe: Timeframe {
                from: Utc.timestamp_millis_opt(0).unwrap(),
                to: Utc.timestamp_millis_opt(3_600_000).unwrap(),
            },
            datasets: vec!["lambda-logs".to_string()],
            filters: vec![QueryFilter::equals("LogLevel", "ERROR")],
            service: "default".to_string(),
            page_size,
        }
    }

    fn events(errors: &[&str]) -> Vec<RawEvent> {
        errors
            .iter()
            .enumerate()
            .map(|(i, e)| test_event(Some(e), i as i64))
            .collect()
    }

    fn full_page(size: usize) -> Vec<RawEvent> {
        (0..size)
            .map(|i| test_event(Some(if i % 2 == 0 { "A" } else { "B" }), i as i64))
            .collect()
    }

    #[tokio::test]
    async fn test_choosing_an_issue_ends_the_loop() {
        let source = FakeSource::with_pages(vec![events(&["A", "B", "A"])], 100);
        let mut prompter = ScriptedPrompter::new(vec![Some(1)]);

        let selection = PaginatedSelector::new(&source, &mut prompter, quick_fetcher(), search(100))
            .run()
            .await
            .unwrap();

        match selection {
            Selection::Chosen(issue) => {
                assert_eq!(issue.error, "B");
                assert_eq!(issue.occurrences, 1);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(source.offsets(), vec![0]);
        // Short page: no sentinel
        assert_eq!(prompter.shown[0].len(), 2);
        assert!(!prompter.shown[0].iter().any(|c| c == NEXT_PAGE));
    }

    #[tokio::test]
    async fn test_next_page_advances_offset_by_page_size() {
        let source = FakeSource::with_pages(vec![full_page(100), events(&["C"])], 100);
        let mut prompter = ScriptedPrompter::new(vec![Some(2), Some(0)]);

        let selection = PaginatedSelector::new(&source, &mut prompter, quick_fetcher(), search(100))
            .run()
            .await
            .unwrap();

        assert_eq!(source.offsets(), vec![0, 100]);
        assert_eq!(prompter.shown[0].last().map(String::as_str), Some(NEXT_PAGE));
        assert!(matches!(selection, Selection::Chosen(ref issue) if issue.error == "C"));
    }

    #[tokio::test]
    async fn test_empty_page_after_full_page_reports_no_issues() {
        let source = FakeSource::with_pages(vec![full_page(100)], 100);
        let mut prompter = ScriptedPrompter::new(vec![Some(2)]);

        let selection = PaginatedSelector::new(&source, &mut prompter, quick_fetcher(), search(100))
            .run()
            .await
            .unwrap();

        assert_eq!(selection, Selection::NoIssues);
        assert_eq!(source.offsets(), vec![0, 100]);
        assert_eq!(prompter.shown.len(), 1);
    }

    #[tokio::test]
    async fn test_full_page_without_errors_still_offers_next_page() {
        let malformed: Vec<RawEvent> = (0..4).map(|i| test_event(None, i)).collect();
        let source = FakeSource::with_pages(vec![malformed, events(&["A"])], 4);
        let mut prompter = ScriptedPrompter::new(vec![Some(0), Some(0)]);

        let selection = PaginatedSelector::new(&source, &mut prompter, quick_fetcher(), search(4))
            .run()
            .await
            .unwrap();

        assert_eq!(source.offsets(), vec![0, 4]);
        assert_eq!(prompter.shown[0], vec![NEXT_PAGE.to_string()]);
        assert!(matches!(selection, Selection::Chosen(ref issue) if issue.error == "A"));
    }

    #[tokio::test]
    async fn test_short_page_without_errors_reports_no_issues() {
        let malformed: Vec<RawEvent> = (0..3).map(|i| test_event(None, i)).collect();
        let source = FakeSource::with_pages(vec![malformed], 4);
        let mut prompter = ScriptedPrompter::new(vec![]);

        let selection = PaginatedSelector::new(&source, &mut prompter, quick_fetcher(), search(4))
            .run()
            .await
            .unwrap();

        assert_eq!(selection, Selection::NoIssues);
        assert!(prompter.shown.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_stops_without_further_fetches() {
        let source = FakeSource::with_pages(vec![full_page(100), full_page(100)], 100);
        let mut prompter = ScriptedPrompter::new(vec![None]);

        let selection = PaginatedSelector::new(&source, &mut prompter, quick_fetcher(), search(100))
            .run()
            .await
            .unwrap();

        assert_eq!(selection, Selection::Cancelled);
        assert_eq!(source.offsets(), vec![0]);
    }

    #[tokio::test]
    async fn test_counts_are_per_page() {
        let source = FakeSource::with_pages(vec![full_page(4), events(&["A"])], 4);
        let mut prompter = ScriptedPrompter::new(vec![Some(2), Some(0)]);

        let selection = PaginatedSelector::new(&source, &mut prompter, quick_fetcher(), search(4))
            .run()
            .await
            .unwrap();

        assert!(matches!(selection, Selection::Chosen(ref issue) if issue.occurrences == 1));
        assert!(prompter.shown[0][0].contains("x2 times"));
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let source = FakeSource {
            failures_before_success: Mutex::new(2),
            ..FakeSource::with_pages(vec![events(&["A"])], 100)
        };
        let mut prompter = ScriptedPrompter::new(vec![Some(0)]);

        let selection = PaginatedSelector::new(&source, &mut prompter, quick_fetcher(), search(100))
            .run()
            .await
            .unwrap();

        assert!(matches!(selection, Selection::Chosen(_)));
        assert_eq!(source.offsets(), vec![0, 0, 0]);
    }

    #[tokio::test]
    async fn test_exhausted_fetch_aborts_search() {
        let source = FakeSource {
            failures_before_success: Mutex::new(u32::MAX),
            ..FakeSource::with_pages(vec![events(&["A"])], 100)
        };
        let mut prompter = ScriptedPrompter::new(vec![]);

        let err = PaginatedSelector::new(&source, &mut prompter, quick_fetcher(), search(100))
            .run()
            .await
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<FetchError>(),
            Some(FetchError::Exhausted { attempts: 5, .. })
        ));
        assert_eq!(source.offsets().len(), 5);
        assert!(prompter.shown.is_empty());
    }

    fn run_request() -> QueryRunRequest {
        QueryRunRequest {
            query_id: "q-1".to_string(),
            run_id: "run-1".to_string(),
            service: "default".to_string(),
            limit: 20,
        }
    }

    #[tokio::test]
    async fn test_run_selection_returns_error_text() {
        let source = FakeSource::with_pages(vec![events(&["A", "A", "B"])], 100);
        let mut prompter = ScriptedPrompter::new(vec![Some(1)]);

        let selection =
            load_and_select_event(&source, &mut prompter, &mut quick_fetcher(), &run_request())
                .await
                .unwrap();

        assert_eq!(selection, RunSelection::Chosen("B".to_string()));
        assert_eq!(prompter.shown[0].len(), 2);
    }

    #[tokio::test]
    async fn test_run_selection_offers_at_most_ten() {
        let errors: Vec<String> = (0..15).map(|i| format!("error {i}")).collect();
        let refs: Vec<&str> = errors.iter().map(String::as_str).collect();
        let source = FakeSource::with_pages(vec![events(&refs)], 100);
        let mut prompter = ScriptedPrompter::new(vec![Some(9)]);

        let selection =
            load_and_select_event(&source, &mut prompter, &mut quick_fetcher(), &run_request())
                .await
                .unwrap();

        assert_eq!(prompter.shown[0].len(), MAX_RUN_CHOICES);
        assert_eq!(selection, RunSelection::Chosen("error 9".to_string()));
    }

    #[tokio::test]
    async fn test_run_selection_fetch_failure_is_distinct() {
        let source = FakeSource {
            failures_before_success: Mutex::new(u32::MAX),
            ..FakeSource::with_pages(vec![events(&["A"])], 100)
        };
        let mut prompter = ScriptedPrompter::new(vec![]);

        let selection =
            load_and_select_event(&source, &mut prompter, &mut quick_fetcher(), &run_request())
                .await
                .unwrap();

        assert_eq!(selection, RunSelection::FetchFailed);
        assert_eq!(*source.run_calls.lock().unwrap(), 5);
        assert!(prompter.shown.is_empty());
    }

    #[tokio::test]
    async fn test_run_selection_without_well_formed_events() {
        let source = FakeSource::with_pages(vec![vec![test_event(None, 1)]], 100);
        let mut prompter = ScriptedPrompter::new(vec![]);

        let selection =
            load_and_select_event(&source, &mut prompter, &mut quick_fetcher(), &run_request())
                .await
                .unwrap();

        assert_eq!(selection, RunSelection::NoIssues);
    }
}
