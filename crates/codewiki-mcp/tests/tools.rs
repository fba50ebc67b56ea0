//! End-to-end tool tests against fixture pages
#![allow(clippy::unwrap_used, missing_docs)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use codewiki_core::{
    ChatAnswer, Config, Error, ErrorCode, IndexingOutcome, RenderedPage, RepoLocator, Result,
    WikiBackend, WikiClient,
};
use codewiki_mcp::tools::{
    ListTopicsParams, ReadContentsParams, ReadStructureParams, RequestIndexingParams,
    SearchWikiParams, handle_list_topics, handle_read_contents, handle_read_structure,
    handle_request_indexing, handle_search_wiki,
};
use codewiki_mcp::{Status, ToolResponse};
use serde_json::json;

const HELLO_WORLD: &str = r#"<html><head><title>CodeWiki</title></head><body>
  <h1>hello-world spark Powered by Gemini</h1>
  <body-content-section id="overview"><h2>Overview</h2>
    <documentation-markdown><h2>Overview</h2><p>A tiny demo repository.</p></documentation-markdown>
  </body-content-section>
  <body-content-section id="usage"><h2>Usage</h2>
    <documentation-markdown><p>Run <code>make</code> and read the output.</p></documentation-markdown>
  </body-content-section>
</body></html>"#;

const NESTED: &str = r#"<html><body><main>
  <h2>Install</h2><p>Use cargo.</p>
  <h3>From source</h3><p>Clone the repository and build.</p>
  <h2>Configuration</h2><p>Edit config.toml.</p>
</main></body></html>"#;

const UNINDEXED: &str = r#"<html><body><main>
  <p>This repository has not been indexed yet. Request it from the search page.</p>
</main></body></html>"#;

#[derive(Default)]
struct FixtureBackend {
    pages: HashMap<String, String>,
    failures_before_success: u32,
    renders: AtomicU32,
    answer: Option<ChatAnswer>,
    outcome: Option<IndexingOutcome>,
    questions: AtomicU32,
}

impl FixtureBackend {
    fn with_page(mut self, slug: &str, html: &str) -> Self {
        self.pages
            .insert(format!("https://codewiki.google/github.com/{slug}"), html.to_string());
        self
    }
}

#[async_trait]
impl WikiBackend for FixtureBackend {
    async fn render(&self, url: &str) -> Result<RenderedPage> {
        let n = self.renders.fetch_add(1, Ordering::SeqCst) + 1;
        if n <= self.failures_before_success {
            return Err(Error::Driver("target crashed".into()));
        }
        match self.pages.get(url) {
            Some(html) => Ok(RenderedPage::new(url, html.clone())),
            None => Err(Error::NoContent(format!("blank render of {url}"))),
        }
    }

    async fn ask(&self, _url: &str, _question: &str) -> Result<ChatAnswer> {
        self.questions.fetch_add(1, Ordering::SeqCst);
        self.answer
            .clone()
            .ok_or_else(|| Error::Timeout("chat never answered".into()))
    }

    async fn request_indexing(
        &self,
        _search_url: &str,
        _locator: &RepoLocator,
    ) -> Result<IndexingOutcome> {
        self.outcome.ok_or_else(|| Error::Driver("dialog vanished".into()))
    }
}

fn client_with(
    backend: FixtureBackend,
    tune: impl FnOnce(&mut Config),
) -> (WikiClient, Arc<FixtureBackend>) {
    let backend = Arc::new(backend);
    let mut config = Config::default();
    config.retry.max_attempts = 3;
    config.retry.delay_secs = 1;
    tune(&mut config);
    (WikiClient::new(config, Arc::clone(&backend) as Arc<dyn WikiBackend>), backend)
}

fn client(backend: FixtureBackend) -> (WikiClient, Arc<FixtureBackend>) {
    client_with(backend, |_| {})
}

fn repo(url: &str) -> ReadStructureParams {
    ReadStructureParams {
        repo_url: url.into(),
    }
}

fn assert_error(response: &ToolResponse, code: ErrorCode) {
    assert_eq!(response.status, Status::Error, "{response:?}");
    assert_eq!(response.code, Some(code), "{response:?}");
    assert!(response.data.is_none());
}

#[tokio::test(start_paused = true)]
async fn read_structure_lists_top_level_sections() {
    let (client, _) = client(FixtureBackend::default().with_page("octocat/hello-world", HELLO_WORLD));

    let response = handle_read_structure(&client, repo("octocat/hello-world")).await;

    assert!(response.is_ok(), "{response:?}");
    let data = response.data.unwrap();
    let entries = data.as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["title"], "Overview");
    assert_eq!(entries[0]["depth"], 1);
    assert_eq!(entries[0]["anchor"], "overview");
    assert_eq!(entries[0]["preview"], "A tiny demo repository.");
    assert_eq!(entries[1]["title"], "Usage");
    assert_eq!(entries[1]["depth"], 1);
    assert_eq!(response.repo_url.as_deref(), Some("https://github.com/octocat/hello-world"));
    assert_eq!(response.meta.attempt, 1);
    assert_eq!(response.meta.max_attempts, 3);
}

#[tokio::test(start_paused = true)]
async fn url_and_shorthand_share_one_render() {
    let (client, backend) =
        client(FixtureBackend::default().with_page("octocat/hello-world", HELLO_WORLD));

    let first = handle_read_structure(&client, repo("https://github.com/Octocat/Hello-World.git")).await;
    let second = handle_read_structure(&client, repo("octocat/hello-world")).await;

    assert_eq!(first.data, second.data);
    assert_eq!(backend.renders.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn malformed_repo_is_rejected_before_any_render() {
    let (client, backend) = client(FixtureBackend::default());

    let response = handle_read_structure(&client, repo("just-a-name")).await;

    assert_error(&response, ErrorCode::Validation);
    assert_eq!((response.meta.attempt, response.meta.max_attempts), (1, 1));
    assert_eq!(backend.renders.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn transient_failures_are_retried_and_reported() {
    let (client, backend) = client(FixtureBackend {
        failures_before_success: 2,
        ..FixtureBackend::default().with_page("octocat/hello-world", HELLO_WORLD)
    });

    let response = handle_list_topics(
        &client,
        ListTopicsParams {
            repo_url: "octocat/hello-world".into(),
        },
    )
    .await;

    assert!(response.is_ok(), "{response:?}");
    assert_eq!(response.meta.attempt, 3);
    assert_eq!(response.meta.max_attempts, 3);
    assert_eq!(backend.renders.load(Ordering::SeqCst), 3);
    let text = response.data_text().unwrap();
    assert!(text.starts_with("# hello-world\n\n2 topics:"));
    assert!(text.contains("**Usage** (#usage)"));
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_report_the_last_failure() {
    let (client, backend) = client(FixtureBackend::default());

    let response = handle_read_structure(&client, repo("octocat/missing")).await;

    assert_error(&response, ErrorCode::RetryExhausted);
    assert_eq!(response.meta.attempt, 3);
    assert!(response.message.unwrap().contains("No content"));
    assert_eq!(backend.renders.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn page_without_sections_is_not_indexed() {
    let (client, backend) = client(FixtureBackend::default().with_page("octocat/new", UNINDEXED));

    let response = handle_read_structure(&client, repo("octocat/new")).await;

    assert_error(&response, ErrorCode::NotIndexed);
    assert_eq!(response.meta.attempt, 1);
    assert_eq!(backend.renders.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn read_contents_section_includes_subsections() {
    let (client, _) = client(FixtureBackend::default().with_page("octocat/tool", NESTED));

    let response = handle_read_contents(
        &client,
        ReadContentsParams {
            repo_url: "octocat/tool".into(),
            section_title: Some("install".into()),
            ..ReadContentsParams::default()
        },
    )
    .await;

    assert!(response.is_ok(), "{response:?}");
    let text = response.data_text().unwrap();
    assert!(text.contains("Use cargo."));
    assert!(text.contains("From source"));
    assert!(!text.contains("Configuration"));
    assert_eq!(response.query.as_deref(), Some("install"));
    assert!(!response.meta.truncated);
}

#[tokio::test(start_paused = true)]
async fn read_contents_unknown_section_lists_available() {
    let (client, _) = client(FixtureBackend::default().with_page("octocat/tool", NESTED));

    let response = handle_read_contents(
        &client,
        ReadContentsParams {
            repo_url: "octocat/tool".into(),
            section_title: Some("Deployment".into()),
            ..ReadContentsParams::default()
        },
    )
    .await;

    assert_error(&response, ErrorCode::InputNotFound);
    let message = response.message.unwrap();
    assert!(message.contains("Deployment"));
    assert!(message.contains("Install, From source, Configuration"));
}

#[tokio::test(start_paused = true)]
async fn read_contents_paginates_long_pages() {
    let (client, _) = client_with(
        FixtureBackend::default().with_page("octocat/tool", NESTED),
        |config| config.response.max_chars = 40,
    );
    let params = |offset| ReadContentsParams {
        repo_url: "octocat/tool".into(),
        offset,
        ..ReadContentsParams::default()
    };

    let first = handle_read_contents(&client, params(None)).await;
    assert!(first.is_ok());
    assert!(first.meta.truncated);
    let text = first.data_text().unwrap();
    assert!(text.contains("pass offset="));

    let mut offset = 0;
    let mut windows = 0;
    loop {
        let window = handle_read_contents(&client, params(Some(offset))).await;
        windows += 1;
        if !window.meta.truncated {
            assert!(window.data_text().unwrap().ends_with('.'));
            break;
        }
        let footer = window.data_text().unwrap();
        let next = footer.rsplit("offset=").next().unwrap();
        offset = next.split(' ').next().unwrap().parse().unwrap();
        assert!(windows < 20, "pagination did not terminate");
    }
    assert!(windows > 1);
}

#[tokio::test(start_paused = true)]
async fn read_contents_rejects_blank_section_and_zero_limit() {
    let (client, backend) = client(FixtureBackend::default().with_page("octocat/tool", NESTED));

    let blank = handle_read_contents(
        &client,
        ReadContentsParams {
            repo_url: "octocat/tool".into(),
            section_title: Some("  ".into()),
            ..ReadContentsParams::default()
        },
    )
    .await;
    assert_error(&blank, ErrorCode::Validation);

    let zero = handle_read_contents(
        &client,
        ReadContentsParams {
            repo_url: "octocat/tool".into(),
            limit: Some(0),
            ..ReadContentsParams::default()
        },
    )
    .await;
    assert_error(&zero, ErrorCode::Validation);
    assert_eq!(backend.renders.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn search_returns_the_settled_answer() {
    let (client, _) = client(FixtureBackend {
        answer: Some(ChatAnswer {
            text: "The entry point is main.rs, which parses flags and starts the server.".into(),
            partial: false,
            samples: 4,
        }),
        ..FixtureBackend::default()
    });

    let response = handle_search_wiki(
        &client,
        SearchWikiParams {
            repo_url: "octocat/hello-world".into(),
            query: "Where does it start?".into(),
        },
    )
    .await;

    assert!(response.is_ok(), "{response:?}");
    assert!(response.data_text().unwrap().starts_with("The entry point"));
    assert_eq!(response.query.as_deref(), Some("Where does it start?"));
    assert!(!response.meta.truncated);
}

#[tokio::test(start_paused = true)]
async fn search_partial_answer_is_flagged() {
    let (client, _) = client(FixtureBackend {
        answer: Some(ChatAnswer {
            text: "Still typing an answer that keeps growing and growing...".into(),
            partial: true,
            samples: 20,
        }),
        ..FixtureBackend::default()
    });

    let response = handle_search_wiki(
        &client,
        SearchWikiParams {
            repo_url: "octocat/hello-world".into(),
            query: "Explain".into(),
        },
    )
    .await;

    assert!(response.is_ok());
    assert!(response.meta.truncated);
    assert!(response.message.is_some());
}

#[tokio::test(start_paused = true)]
async fn search_blank_query_never_reaches_the_chat() {
    let (client, backend) = client(FixtureBackend::default());

    let response = handle_search_wiki(
        &client,
        SearchWikiParams {
            repo_url: "octocat/hello-world".into(),
            query: "   ".into(),
        },
    )
    .await;

    assert_error(&response, ErrorCode::Validation);
    assert_eq!(backend.questions.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn search_silent_chat_times_out_after_retries() {
    let (client, backend) = client(FixtureBackend::default());

    let response = handle_search_wiki(
        &client,
        SearchWikiParams {
            repo_url: "octocat/hello-world".into(),
            query: "Anything?".into(),
        },
    )
    .await;

    assert_error(&response, ErrorCode::RetryExhausted);
    assert_eq!(backend.questions.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn hard_deadline_maps_to_timeout() {
    struct Hanging;

    #[async_trait]
    impl WikiBackend for Hanging {
        async fn render(&self, url: &str) -> Result<RenderedPage> {
            tokio::time::sleep(Duration::from_secs(600)).await;
            Ok(RenderedPage::new(url, HELLO_WORLD))
        }

        async fn ask(&self, _url: &str, _question: &str) -> Result<ChatAnswer> {
            Err(Error::Driver("unused".into()))
        }

        async fn request_indexing(&self, _url: &str, _locator: &RepoLocator) -> Result<IndexingOutcome> {
            Err(Error::Driver("unused".into()))
        }
    }

    let client = WikiClient::new(Config::default(), Arc::new(Hanging));
    let response = handle_read_structure(&client, repo("octocat/hello-world")).await;

    assert_error(&response, ErrorCode::Timeout);
}

#[tokio::test(start_paused = true)]
async fn request_indexing_outcomes_are_ok_with_instructions() {
    let (client, _) = client(FixtureBackend {
        outcome: Some(IndexingOutcome::ButtonMissing),
        ..FixtureBackend::default()
    });

    let response = handle_request_indexing(
        &client,
        RequestIndexingParams {
            repo_url: "octocat/new".into(),
        },
    )
    .await;

    assert!(response.is_ok(), "{response:?}");
    assert_eq!(response.meta.max_attempts, 1);
    let text = response.data_text().unwrap();
    assert!(text.contains("https://codewiki.google/search?q="));
    assert!(text.contains("https://github.com/octocat/new"));
}

#[tokio::test(start_paused = true)]
async fn request_indexing_driver_failure_is_not_retried() {
    let (client, _) = client(FixtureBackend::default());

    let response = handle_request_indexing(
        &client,
        RequestIndexingParams {
            repo_url: "octocat/new".into(),
        },
    )
    .await;

    assert_error(&response, ErrorCode::DriverError);
    assert_eq!((response.meta.attempt, response.meta.max_attempts), (1, 1));
}

#[tokio::test(start_paused = true)]
async fn browser_failure_detail_stays_out_of_the_envelope() {
    let (client, _) = client(FixtureBackend {
        failures_before_success: 5,
        ..FixtureBackend::default().with_page("octocat/hello-world", HELLO_WORLD)
    });

    let response = handle_read_structure(&client, repo("octocat/hello-world")).await;
    assert_error(&response, ErrorCode::RetryExhausted);
    let json = response.to_json().unwrap();
    assert!(!json.contains("target crashed"), "{json}");

    let response = handle_request_indexing(
        &client,
        RequestIndexingParams {
            repo_url: "octocat/new".into(),
        },
    )
    .await;
    assert_error(&response, ErrorCode::DriverError);
    assert!(!response.to_json().unwrap().contains("dialog vanished"));
}

#[test]
fn envelope_serializes_like_the_wire_format() {
    let response = ToolResponse::ok(json!([{"title": "Overview"}]))
        .with_repo("https://github.com/octocat/hello-world")
        .with_attempts(1, 2);
    let value = serde_json::to_value(&response).unwrap();

    assert_eq!(value["status"], "ok");
    assert_eq!(value["data"][0]["title"], "Overview");
    assert_eq!(value["meta"]["max_attempts"], 2);
    assert!(value.get("code").is_none());
}
