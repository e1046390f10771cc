//! A full prompt -> tool call -> answer round trip against mocked services.

use policy::Policy;
use serde_json::json;
use tools::{Endpoints, ToolContext};
use toolchain::{OpenAiBackend, SemanticToolSelector, ToolResult, Toolchain};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mock_weather_services(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/v1/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{"name": "New York", "latitude": 40.71, "longitude": -74.01, "country": "United States"}]
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/forecast"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "current": {"temperature_2m": 18.0, "relative_humidity_2m": 60.0, "wind_speed_10m": 9.5, "weather_code": 0}
        })))
        .mount(server)
        .await;
}

async fn mock_openai(server: &MockServer) {
    // Second request: carries the tool result.
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains("\"role\":\"tool\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{
                "message": {"role": "assistant", "content": "It is 18°C and clear in New York."},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 80, "completion_tokens": 12}
        })))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "get_weather", "arguments": "{\"location\": \"New York City\"}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 50, "completion_tokens": 10}
        })))
        .up_to_n_times(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn weather_prompt_round_trip() {
    let server = MockServer::start().await;
    mock_weather_services(&server).await;
    mock_openai(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let ctx = ToolContext::new(dir.path()).with_endpoints(Endpoints::all(server.uri()));
    let backend = OpenAiBackend::builder("sk-test").base_url(server.uri()).build();

    let mut chain = Toolchain::builder(backend)
        .selector(SemanticToolSelector::new(tools::builtin::all()))
        .policy(Policy::standard().with_root(dir.path()))
        .context(ctx)
        .build()
        .unwrap();

    let report = chain
        .run_report("What's the weather in New York City?")
        .await
        .unwrap();

    assert_eq!(report.text, "It is 18°C and clear in New York.");
    assert_eq!(report.iterations, 2);
    assert_eq!(report.usage.input_tokens, 130);
    assert!(report.selected_tools.contains(&"get_weather".to_string()));

    match &report.tool_calls[0].result {
        ToolResult::Success { output, .. } => {
            assert_eq!(output["temperature_c"], 18.0);
            assert_eq!(output["conditions"], "clear sky");
        }
        other => panic!("tool failed: {other:?}"),
    }
}

#[tokio::test]
async fn restrictive_policy_blocks_network_tools() {
    let server = MockServer::start().await;
    mock_openai(&server).await;

    let backend = OpenAiBackend::builder("sk-test").base_url(server.uri()).build();
    let mut chain = Toolchain::builder(backend)
        .tools(tools::builtin::by_names(&["get_weather"]).unwrap())
        .policy(Policy::restrictive())
        .context(ToolContext::new(".").with_endpoints(Endpoints::all(server.uri())))
        .build()
        .unwrap();

    let report = chain.run_report("Weather in New York City?").await.unwrap();
    assert!(report.tool_calls[0].result.is_error());
}
