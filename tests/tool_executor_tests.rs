use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use stageflow::schema::PropertySchema;
use stageflow::tools::{
    builtin_registry, ExtractMode, MatchStrength, Role, SelectionRequest, ToolCall, ToolCategory,
    ToolDefinition, ToolDispatcher, ToolErrorType, ToolExecutor, ToolOutput, ToolParams,
    ToolRegistry, ToolSelector, WebPageParams,
};
use stageflow::{FnTool, StageFlowError, ToolSettings};
use tokio::time::{sleep, Instant};

fn page_definition(name: &str) -> ToolDefinition {
    ToolDefinition::builder(name, ToolCategory::WebPage)
        .description("Test double that reads a web page")
        .priority(5)
        .required("url", PropertySchema::string())
        .optional("extract_mode", PropertySchema::string())
        .build()
}

fn page(url: &str) -> ToolParams {
    ToolParams::WebPage(WebPageParams {
        url: url.into(),
        extract_mode: ExtractMode::Summary,
    })
}

fn executor_with(definition: ToolDefinition, tool: FnTool) -> Arc<ToolExecutor> {
    let mut registry = ToolRegistry::new();
    registry
        .register_with_tool(definition, Arc::new(tool))
        .unwrap();
    Arc::new(ToolExecutor::new(Arc::new(registry), ToolSettings::default()))
}

#[test]
fn github_url_selects_github_analysis() {
    let registry = builtin_registry();
    let request = SelectionRequest::new("https://github.com/octocat").with_max_results(3);
    let suggestions = ToolSelector::new().select(&registry, &request);

    let top = &suggestions[0];
    assert_eq!(top.name, "analyze_github");
    assert_eq!(top.matched, MatchStrength::Specific);
    assert!(top.confidence >= 0.9);
    assert!(top.params.is_some());
}

#[test]
fn selection_is_deterministic() {
    let registry = builtin_registry();
    let selector = ToolSelector::new();
    let request = SelectionRequest::new("my site is https://octo.dev and resume.pdf")
        .with_role(Some(Role::Designer))
        .with_max_results(4);

    let first = selector.select(&registry, &request);
    for _ in 0..5 {
        assert_eq!(selector.select(&registry, &request), first);
    }
}

#[tokio::test]
async fn timeout_flavored_errors_are_classified() {
    let executor = executor_with(
        page_definition("flaky_page"),
        FnTool::new("flaky_page", |_| async {
            Err(StageFlowError::tool_failed("flaky_page", "connect ETIMEDOUT 10.0.0.1:443"))
        }),
    );

    let result = executor
        .execute_safely("flaky_page", &page("https://example.com"), None)
        .await;
    assert!(!result.success);
    assert_eq!(result.error_type, Some(ToolErrorType::Timeout));
    assert!(!result.suggestions.is_empty());
}

#[tokio::test(start_paused = true)]
async fn retry_stops_after_attempt_budget() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);
    let executor = executor_with(
        page_definition("broken_page"),
        FnTool::new("broken_page", move |_| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(StageFlowError::tool_failed("broken_page", "connection reset"))
            }
        }),
    );

    let result = executor
        .execute_with_retry("broken_page", &page("https://example.com"), 3)
        .await;
    assert!(!result.success);
    assert_eq!(result.attempts, 3);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(result.error_type, Some(ToolErrorType::Network));
}

#[tokio::test(start_paused = true)]
async fn retry_returns_first_success() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);
    let executor = executor_with(
        page_definition("eventually_ok"),
        FnTool::new("eventually_ok", move |_| {
            let counter = Arc::clone(&counter);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(StageFlowError::tool_failed("eventually_ok", "socket hang up"))
                } else {
                    Ok(ToolOutput::new(json!({"title": "ok"}), 0.8))
                }
            }
        }),
    );

    let result = executor
        .execute_with_retry("eventually_ok", &page("https://example.com"), 5)
        .await;
    assert!(result.success);
    assert_eq!(result.attempts, 2);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn hung_tool_is_cut_off_at_its_timeout() {
    let definition = ToolDefinition::builder("hung_page", ToolCategory::WebPage)
        .description("Never answers")
        .required("url", PropertySchema::string())
        .timeout_ms(50)
        .build();
    let executor = executor_with(
        definition,
        FnTool::new("hung_page", |_| futures::future::pending()),
    );

    let started = Instant::now();
    let result = executor
        .execute_safely("hung_page", &page("https://example.com"), None)
        .await;
    let elapsed = started.elapsed();

    assert!(!result.success);
    assert_eq!(result.error_type, Some(ToolErrorType::Timeout));
    assert!(elapsed >= Duration::from_millis(50));
    assert!(elapsed < Duration::from_millis(60));
}

#[tokio::test]
async fn invalid_parameters_never_reach_the_tool() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);
    let executor = executor_with(
        page_definition("strict_page"),
        FnTool::new("strict_page", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok(ToolOutput::default()) }
        }),
    );

    let result = executor
        .execute_with_retry("strict_page", &page("not a url"), 3)
        .await;
    assert!(!result.success);
    assert_eq!(result.error_type, Some(ToolErrorType::InvalidInput));
    assert_eq!(result.attempts, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unknown_tools_fail_as_not_found() {
    let executor = ToolExecutor::new(Arc::new(ToolRegistry::new()), ToolSettings::default());
    let result = executor
        .execute_safely("missing", &page("https://example.com"), None)
        .await;
    assert!(!result.success);
    assert_eq!(result.error_type, Some(ToolErrorType::NotFound));
}

#[tokio::test(start_paused = true)]
async fn dispatch_keeps_call_order_and_bounds_concurrency() {
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let (running_in, peak_in) = (Arc::clone(&running), Arc::clone(&peak));

    let executor = executor_with(
        page_definition("slow_page"),
        FnTool::new("slow_page", move |params| {
            let running = Arc::clone(&running_in);
            let peak = Arc::clone(&peak_in);
            async move {
                let url = params.target().unwrap_or_default().to_string();
                let delay = if url.ends_with("/a") { 30 } else if url.ends_with("/b") { 10 } else { 20 };
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                sleep(Duration::from_millis(delay)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                Ok(ToolOutput::new(json!({ "url": url }), 0.7))
            }
        }),
    );
    let dispatcher = ToolDispatcher::new(executor, 2);

    let calls: Vec<ToolCall> = ["a", "b", "c", "d"]
        .iter()
        .map(|path| ToolCall::new("slow_page", page(&format!("https://example.com/{path}"))))
        .collect();
    let results = dispatcher.dispatch(&calls).await;

    let urls: Vec<&str> = results
        .iter()
        .map(|result| result.data.as_ref().unwrap()["url"].as_str().unwrap())
        .collect();
    assert_eq!(
        urls,
        vec![
            "https://example.com/a",
            "https://example.com/b",
            "https://example.com/c",
            "https://example.com/d"
        ]
    );
    assert!(peak.load(Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn cached_tools_are_called_once_per_target() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);
    let definition = ToolDefinition::builder("cached_page", ToolCategory::WebPage)
        .description("Cacheable page reader")
        .required("url", PropertySchema::string())
        .cache(true)
        .build();
    let executor = executor_with(
        definition,
        FnTool::new("cached_page", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok(ToolOutput::new(json!({"title": "cached"}), 0.9)) }
        }),
    );

    let call = ToolCall::new("cached_page", page("https://example.com"));
    let first = executor.execute(&call).await;
    let second = executor.execute(&call).await;
    assert!(first.success && !first.from_cache);
    assert!(second.success && second.from_cache);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    executor.clear_cache();
    executor.execute(&call).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn cached_results_expire_after_their_ttl() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);
    let definition = ToolDefinition::builder("short_lived", ToolCategory::WebPage)
        .description("Cacheable page reader with a short ttl")
        .required("url", PropertySchema::string())
        .cache(true)
        .build();
    let mut registry = ToolRegistry::new();
    registry
        .register_with_tool(
            definition,
            Arc::new(FnTool::new("short_lived", move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok(ToolOutput::new(json!({"title": "fresh"}), 0.9)) }
            })),
        )
        .unwrap();
    let settings = ToolSettings {
        cache_ttl_ms: 20,
        cache_capacity: 8,
        ..ToolSettings::default()
    };
    let executor = ToolExecutor::new(Arc::new(registry), settings);

    let call = ToolCall::new("short_lived", page("https://example.com"));
    assert!(!executor.execute(&call).await.from_cache);
    assert!(executor.execute(&call).await.from_cache);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    std::thread::sleep(Duration::from_millis(60));
    let refreshed = executor.execute(&call).await;
    assert!(refreshed.success && !refreshed.from_cache);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn panicking_tool_becomes_a_failed_result() {
    let executor = executor_with(
        page_definition("fragile_page"),
        FnTool::new("fragile_page", |params| async move {
            if params.target().is_some() {
                panic!("parser state corrupted");
            }
            Ok(ToolOutput::default())
        }),
    );

    let result = executor
        .execute_safely("fragile_page", &page("https://example.com"), None)
        .await;
    assert!(!result.success);
    assert!(result.error.as_deref().unwrap().contains("parser state corrupted"));
}
