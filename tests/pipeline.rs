//! End-to-end pipeline tests against mocked search, page, and model endpoints.

use rag_answer::answer::{Answerer, INSUFFICIENT_CONTEXT_MESSAGE};
use rag_answer::config::Config;
use rag_answer::fetch::Fetcher;
use rag_answer::generate::{HuggingFaceGenerator, SamplingParams};
use rag_answer::memory::ConversationMemory;
use rag_answer::models::{Answer, AnswerKind, RetrievedCorpus};
use rag_answer::pipeline::Pipeline;
use rag_answer::retrieve::Retriever;
use rag_answer::retry::RetryPolicy;
use rag_answer::search::SerpApiSearch;
use rag_answer::server::{router, AppState};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_string_contains, header, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

const MODEL_PATH: &str = "/models/test-model";

fn test_config(server: &MockServer) -> Config {
    let mut cfg = Config::minimal();
    cfg.search.base_url = server.uri();
    cfg.model.base_url = server.uri();
    cfg.model.model = "test-model".to_string();
    cfg.model.retry_delay_secs = 0.0;
    cfg
}

fn build_retriever(cfg: &Config) -> Retriever {
    let search = SerpApiSearch::with_api_key(&cfg.search, Some("serp-test".into())).unwrap();
    let fetcher = Fetcher::new(&cfg.fetch).unwrap();
    Retriever::new(Arc::new(search), fetcher, cfg.retrieval.clone())
}

fn build_pipeline(cfg: &Config) -> Pipeline {
    let generator = HuggingFaceGenerator::with_api_key(&cfg.model, Some("hf-test".into())).unwrap();
    let answerer = Answerer::new(
        Arc::new(generator),
        SamplingParams::from(&cfg.model),
        RetryPolicy::fixed(cfg.model.retries, Duration::ZERO),
        cfg.answer.clone(),
    );
    Pipeline::new(build_retriever(cfg), answerer)
}

fn page(text: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/html")
        .set_body_string(format!(
            "<html><head><title>t</title></head><body><div>nav</div><p>{}</p></body></html>",
            text
        ))
}

fn completion(text: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!([{ "generated_text": text }]))
}

/// Mount the Pahalgam news scenario: three results, two good pages, one
/// that answers 403 to every request, and an encyclopedia fallback page.
async fn mount_news_scenario(server: &MockServer) {
    let uri = server.uri();

    Mock::given(method("GET"))
        .and(path("/search.json"))
        .and(query_param("tbm", "nws"))
        .and(query_param("q", "Pahalgam attack news 2025 news 2025"))
        .and(query_param("num", "5"))
        .and(query_param("api_key", "serp-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "news_results": [
                { "position": 1, "link": format!("{uri}/a") },
                { "position": 2, "link": format!("{uri}/b") },
                { "position": 3, "link": format!("{uri}/blocked") },
            ]
        })))
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(page(&"a".repeat(200)))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/b"))
        .respond_with(page(&"b".repeat(200)))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/blocked"))
        .respond_with(ResponseTemplate::new(403))
        .expect(2)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/search.json"))
        .and(query_param_is_missing("tbm"))
        .and(query_param(
            "q",
            "Pahalgam attack news 2025 site:wikipedia.org 2025",
        ))
        .and(query_param("num", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "organic_results": [
                { "position": 1, "link": format!("{uri}/wiki") },
                { "position": 2, "link": format!("{uri}/never") },
            ]
        })))
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/wiki"))
        .respond_with(page(&"w".repeat(300)))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/never"))
        .respond_with(page(&"n".repeat(300)))
        .expect(0)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_news_query_retries_blocked_page_and_falls_back() {
    let server = MockServer::start().await;
    mount_news_scenario(&server).await;
    let cfg = test_config(&server);

    let retrieval = build_retriever(&cfg)
        .retrieve_detailed("Pahalgam attack news 2025", cfg.retrieval.max_pages)
        .await
        .unwrap();

    assert!(retrieval.classification.is_current_affairs);
    assert!(retrieval.used_fallback());
    assert_eq!(
        retrieval.fallback_query.as_deref(),
        Some("Pahalgam attack news 2025 site:wikipedia.org 2025")
    );

    let urls: Vec<&str> = retrieval
        .documents
        .iter()
        .map(|d| d.source_url.rsplit('/').next().unwrap())
        .collect();
    assert_eq!(urls, vec!["a", "b", "blocked", "wiki"]);
    assert_eq!(retrieval.documents[2].status, Some(403));
    assert!(!retrieval.documents[2].sufficient);
    assert_eq!(retrieval.sufficient_documents().count(), 3);

    let expected = format!("{} {} {}", "a".repeat(200), "b".repeat(200), "w".repeat(300));
    assert_eq!(retrieval.corpus, RetrievedCorpus::Text(expected));
}

#[tokio::test]
async fn test_news_query_end_to_end_appends_one_turn() {
    let server = MockServer::start().await;
    mount_news_scenario(&server).await;

    Mock::given(method("POST"))
        .and(path(MODEL_PATH))
        .and(header("authorization", "Bearer hf-test"))
        .and(body_string_contains("Question: Pahalgam attack news 2025"))
        .and(body_string_contains("\"return_full_text\":false"))
        .respond_with(completion(
            "The Pahalgam attack killed tourists in Kashmir in April 2025.",
        ))
        .expect(1)
        .mount(&server)
        .await;

    let pipeline = build_pipeline(&test_config(&server));
    let mut memory = ConversationMemory::new();
    let answer = pipeline.ask("Pahalgam attack news 2025", &mut memory).await;

    assert_eq!(answer.kind(), AnswerKind::Generated);
    assert_eq!(
        answer.text(),
        "The Pahalgam attack killed tourists in Kashmir in April 2025."
    );
    assert_eq!(memory.len(), 1);
    assert_eq!(memory.turns()[0].input, "Pahalgam attack news 2025");
}

#[tokio::test]
async fn test_general_query_uses_web_vertical_without_fallback() {
    let server = MockServer::start().await;
    let uri = server.uri();

    Mock::given(method("GET"))
        .and(path("/search.json"))
        .and(query_param_is_missing("tbm"))
        .and(query_param("q", "capital of France"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "organic_results": [{ "position": 1, "link": format!("{uri}/short") }]
        })))
        .with_priority(1)
        .expect(2)
        .mount(&server)
        .await;
    // Any other search (news vertical, encyclopedia fallback) is a failure.
    Mock::given(method("GET"))
        .and(path("/search.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "organic_results": [] })))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/short"))
        .respond_with(page("Paris."))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(MODEL_PATH))
        .and(body_string_contains("Context: No content scraped from search results."))
        .respond_with(completion("Paris is the capital of France."))
        .expect(1)
        .mount(&server)
        .await;

    let cfg = test_config(&server);
    let retrieval = build_retriever(&cfg)
        .retrieve_detailed("capital of France", cfg.retrieval.max_pages)
        .await
        .unwrap();
    assert!(!retrieval.classification.is_current_affairs);
    assert!(!retrieval.used_fallback());
    assert_eq!(retrieval.corpus, RetrievedCorpus::NoContent);

    let pipeline = build_pipeline(&cfg);
    let mut memory = ConversationMemory::new();
    let answer = pipeline.ask("capital of France", &mut memory).await;

    assert_eq!(answer, Answer::Generated("Paris is the capital of France.".into()));
    assert_eq!(memory.len(), 1);
}

#[tokio::test]
async fn test_news_query_with_no_content_still_asks_the_model() {
    let server = MockServer::start().await;
    let uri = server.uri();

    Mock::given(method("GET"))
        .and(path("/search.json"))
        .and(query_param("tbm", "nws"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "news_results": [{ "position": 1, "link": format!("{uri}/short") }]
        })))
        .expect(1)
        .mount(&server)
        .await;
    // Encyclopedia fallback finds nothing either.
    Mock::given(method("GET"))
        .and(path("/search.json"))
        .and(query_param_is_missing("tbm"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/short"))
        .respond_with(page("short"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(MODEL_PATH))
        .and(body_string_contains("Context: No content scraped from search results."))
        .respond_with(completion("No recent details about this attack are available."))
        .expect(1)
        .mount(&server)
        .await;

    let pipeline = build_pipeline(&test_config(&server));
    let mut memory = ConversationMemory::new();
    let answer = pipeline.ask("terror news", &mut memory).await;

    assert_eq!(answer.kind(), AnswerKind::Generated);
    assert_eq!(memory.len(), 1);
}

#[tokio::test]
async fn test_blank_corpus_on_news_query_is_insufficient_context() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(MODEL_PATH))
        .respond_with(completion("should never be requested at all"))
        .expect(0)
        .mount(&server)
        .await;

    let cfg = test_config(&server);
    let generator = HuggingFaceGenerator::with_api_key(&cfg.model, Some("hf-test".into())).unwrap();
    let answerer = Answerer::new(
        Arc::new(generator),
        SamplingParams::from(&cfg.model),
        RetryPolicy::fixed(3, Duration::ZERO),
        cfg.answer.clone(),
    );

    let mut memory = ConversationMemory::new();
    let answer = answerer
        .answer("terror news", &RetrievedCorpus::Text("  ".into()), &mut memory)
        .await;

    assert_eq!(
        answer,
        Answer::InsufficientContext(INSUFFICIENT_CONTEXT_MESSAGE.into())
    );
    assert!(memory.is_empty());
}

async fn mount_general_search(server: &MockServer) {
    let uri = server.uri();
    Mock::given(method("GET"))
        .and(path("/search.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "organic_results": [{ "position": 1, "link": format!("{uri}/page") }]
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(page(&"Rust is a systems programming language. ".repeat(5)))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_model_recovers_after_transient_errors() {
    let server = MockServer::start().await;
    mount_general_search(&server).await;

    Mock::given(method("POST"))
        .and(path(MODEL_PATH))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({ "error": "Model is loading" })))
        .up_to_n_times(2)
        .with_priority(1)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(MODEL_PATH))
        .respond_with(completion("Rust is a systems programming language."))
        .expect(1)
        .mount(&server)
        .await;

    let pipeline = build_pipeline(&test_config(&server));
    let mut memory = ConversationMemory::new();
    let answer = pipeline.ask("what is rust", &mut memory).await;

    assert_eq!(answer.kind(), AnswerKind::Generated);
    assert_eq!(memory.len(), 1);
}

#[tokio::test]
async fn test_model_failure_after_three_attempts_records_nothing() {
    let server = MockServer::start().await;
    mount_general_search(&server).await;

    Mock::given(method("POST"))
        .and(path(MODEL_PATH))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal"))
        .expect(3)
        .mount(&server)
        .await;

    let pipeline = build_pipeline(&test_config(&server));
    let mut memory = ConversationMemory::new();
    let answer = pipeline.ask("what is rust", &mut memory).await;

    assert_eq!(answer.kind(), AnswerKind::ModelFailure);
    assert!(answer.is_error());
    assert!(memory.is_empty());
}

#[tokio::test]
async fn test_rejected_credentials_are_not_retried() {
    let server = MockServer::start().await;
    mount_general_search(&server).await;

    Mock::given(method("POST"))
        .and(path(MODEL_PATH))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad token"))
        .expect(1)
        .mount(&server)
        .await;

    let pipeline = build_pipeline(&test_config(&server));
    let mut memory = ConversationMemory::new();
    let answer = pipeline.ask("what is rust", &mut memory).await;

    assert_eq!(answer.kind(), AnswerKind::ConfigError);
    assert!(memory.is_empty());
}

#[tokio::test]
async fn test_missing_search_key_is_config_error() {
    let server = MockServer::start().await;
    let cfg = test_config(&server);

    let search = SerpApiSearch::with_api_key(&cfg.search, None).unwrap();
    let retriever = Retriever::new(
        Arc::new(search),
        Fetcher::new(&cfg.fetch).unwrap(),
        cfg.retrieval.clone(),
    );
    let generator = HuggingFaceGenerator::with_api_key(&cfg.model, Some("hf-test".into())).unwrap();
    let answerer = Answerer::new(
        Arc::new(generator),
        SamplingParams::from(&cfg.model),
        RetryPolicy::fixed(3, Duration::ZERO),
        cfg.answer.clone(),
    );
    let pipeline = Pipeline::new(retriever, answerer);

    let mut memory = ConversationMemory::new();
    let answer = pipeline.ask("what is rust", &mut memory).await;
    assert_eq!(
        answer,
        Answer::ConfigError("SERPAPI_KEY not found in environment".into())
    );
    assert!(server.received_requests().await.unwrap().is_empty());
}

/// Serve the router for a pipeline wired to `server` on an ephemeral port.
async fn spawn_app(server: &MockServer) -> String {
    let app = router(AppState::new(build_pipeline(&test_config(server)), 16));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn test_http_malformed_body_is_json_bad_request() {
    let server = MockServer::start().await;
    let base = spawn_app(&server).await;
    let client = reqwest::Client::new();

    let missing_field = client
        .post(format!("{base}/query"))
        .json(&json!({ "q": 1 }))
        .send()
        .await
        .unwrap();
    assert_eq!(missing_field.status(), 400);
    let body: serde_json::Value = missing_field.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("query"));

    let not_json = client
        .post(format!("{base}/query"))
        .header("content-type", "application/json")
        .body("not json")
        .send()
        .await
        .unwrap();
    assert_eq!(not_json.status(), 400);
    let body: serde_json::Value = not_json.json().await.unwrap();
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_http_model_failure_is_bad_gateway() {
    let server = MockServer::start().await;
    mount_general_search(&server).await;
    Mock::given(method("POST"))
        .and(path(MODEL_PATH))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal"))
        .mount(&server)
        .await;

    let base = spawn_app(&server).await;
    let client = reqwest::Client::new();

    let failed = client
        .post(format!("{base}/query"))
        .json(&json!({ "query": "what is rust" }))
        .send()
        .await
        .unwrap();
    assert_eq!(failed.status(), 502);
    let body: serde_json::Value = failed.json().await.unwrap();
    assert_eq!(body["kind"], "model_failure");
}

#[tokio::test]
async fn test_http_sessions_keep_separate_histories() {
    let server = MockServer::start().await;
    mount_general_search(&server).await;
    Mock::given(method("POST"))
        .and(path(MODEL_PATH))
        .respond_with(completion("Rust is a systems programming language."))
        .mount(&server)
        .await;

    let base = spawn_app(&server).await;
    let client = reqwest::Client::new();

    let health: serde_json::Value = client
        .get(format!("{base}/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");

    let blank = client
        .post(format!("{base}/query"))
        .json(&json!({ "query": "   " }))
        .send()
        .await
        .unwrap();
    assert_eq!(blank.status(), 400);

    let first: serde_json::Value = client
        .post(format!("{base}/query"))
        .json(&json!({ "query": "what is rust" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(first["kind"], "generated");
    let session_a = first["session_id"].as_str().unwrap().to_string();

    let second = client
        .post(format!("{base}/query"))
        .json(&json!({ "query": "  tell me more ", "session_id": session_a }))
        .send()
        .await
        .unwrap();
    assert_eq!(second.status(), 200);

    client
        .post(format!("{base}/query"))
        .json(&json!({ "query": "other question", "session_id": "b" }))
        .send()
        .await
        .unwrap();

    let history_a: serde_json::Value = client
        .get(format!("{base}/sessions/{session_a}/history"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let turns = history_a["turns"].as_array().unwrap();
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[0]["input"], "what is rust");
    // the query is recorded exactly as sent
    assert_eq!(turns[1]["input"], "  tell me more ");

    let history_b: serde_json::Value = client
        .get(format!("{base}/sessions/b/history"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(history_b["turns"].as_array().unwrap().len(), 1);

    let missing = client
        .get(format!("{base}/sessions/nope/history"))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), 404);
}
