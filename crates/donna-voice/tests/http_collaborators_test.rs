use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use donna_voice::{
    ChatCompleter, ChatConfig, ElevenLabsSynthesizer, OpenAiChat, RetryPolicy,
    SpeechSynthesizer, SynthesizerConfig, VoiceError,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

async fn spawn(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

#[derive(Clone, Default)]
struct Recorded {
    calls: Arc<AtomicUsize>,
    bodies: Arc<Mutex<Vec<Value>>>,
    auth: Arc<Mutex<Vec<String>>>,
}

fn chat_config(base_url: String) -> ChatConfig {
    ChatConfig {
        api_key: "sk-test".to_string(),
        base_url,
        ..ChatConfig::default()
    }
}

fn fast_retry(attempts: u32) -> RetryPolicy {
    RetryPolicy::new(attempts, Duration::from_millis(5))
}

#[tokio::test]
async fn chat_returns_message_content() {
    let recorded = Recorded::default();
    let router = Router::new()
        .route(
            "/chat/completions",
            post(
                |State(rec): State<Recorded>,
                 headers: HeaderMap,
                 Json(body): Json<Value>| async move {
                    rec.calls.fetch_add(1, Ordering::SeqCst);
                    rec.bodies.lock().unwrap().push(body);
                    if let Some(auth) = headers.get("authorization") {
                        rec.auth
                            .lock()
                            .unwrap()
                            .push(auth.to_str().unwrap_or_default().to_string());
                    }
                    Json(json!({
                        "choices": [{
                            "message": {
                                "role": "assistant",
                                "content": "{\"messages\":[{\"text\":\"hi there\"}]}"
                            }
                        }]
                    }))
                },
            ),
        )
        .with_state(recorded.clone());
    let base = spawn(router).await;

    let chat = OpenAiChat::new(chat_config(base))
        .unwrap()
        .with_retry(fast_retry(1));
    let raw = chat.complete("hello").await.unwrap();

    assert_eq!(raw, "{\"messages\":[{\"text\":\"hi there\"}]}");
    assert_eq!(recorded.auth.lock().unwrap()[0], "Bearer sk-test");

    let body = recorded.bodies.lock().unwrap()[0].clone();
    assert_eq!(body["model"], "gpt-3.5-turbo-1106");
    assert_eq!(body["response_format"]["type"], "json_object");
    assert_eq!(body["messages"][0]["role"], "system");
    assert_eq!(body["messages"][1]["content"], "hello");
}

#[tokio::test]
async fn chat_retries_transient_outage() {
    let recorded = Recorded::default();
    let router = Router::new()
        .route(
            "/chat/completions",
            post(|State(rec): State<Recorded>| async move {
                if rec.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    return (StatusCode::SERVICE_UNAVAILABLE, "overloaded").into_response();
                }
                Json(json!({"choices": [{"message": {"content": "[]"}}]})).into_response()
            }),
        )
        .with_state(recorded.clone());
    let base = spawn(router).await;

    let chat = OpenAiChat::new(chat_config(base))
        .unwrap()
        .with_retry(fast_retry(3));
    assert_eq!(chat.complete("hello").await.unwrap(), "[]");
    assert_eq!(recorded.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn chat_outage_exhausts_retries() {
    let recorded = Recorded::default();
    let router = Router::new()
        .route(
            "/chat/completions",
            post(|State(rec): State<Recorded>| async move {
                rec.calls.fetch_add(1, Ordering::SeqCst);
                StatusCode::BAD_GATEWAY
            }),
        )
        .with_state(recorded.clone());
    let base = spawn(router).await;

    let chat = OpenAiChat::new(chat_config(base))
        .unwrap()
        .with_retry(fast_retry(2));
    let err = chat.complete("hello").await.unwrap_err();
    assert!(matches!(err, VoiceError::UpstreamUnavailable { .. }));
    assert_eq!(recorded.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn chat_without_choices_is_malformed_output() {
    let router = Router::new().route(
        "/chat/completions",
        post(|| async { Json(json!({"choices": []})) }),
    );
    let base = spawn(router).await;

    let chat = OpenAiChat::new(chat_config(base))
        .unwrap()
        .with_retry(fast_retry(1));
    let err = chat.complete("hello").await.unwrap_err();
    assert!(matches!(err, VoiceError::Normalize(_)));
}

#[tokio::test]
async fn unreachable_chat_is_upstream_unavailable() {
    // Nothing listens on port 9 locally.
    let chat = OpenAiChat::new(chat_config("http://127.0.0.1:9".to_string()))
        .unwrap()
        .with_retry(fast_retry(1));
    let err = chat.complete("hello").await.unwrap_err();
    assert!(matches!(err, VoiceError::UpstreamUnavailable { .. }));
}

fn synth_config(base_url: String) -> SynthesizerConfig {
    SynthesizerConfig {
        api_key: "xi-test".to_string(),
        base_url,
        ..SynthesizerConfig::default()
    }
}

fn tts_router(recorded: Recorded) -> Router {
    Router::new()
        .route(
            "/v1/text-to-speech/{voice_id}",
            post(
                |State(rec): State<Recorded>,
                 Path(voice_id): Path<String>,
                 headers: HeaderMap,
                 Json(body): Json<Value>| async move {
                    rec.calls.fetch_add(1, Ordering::SeqCst);
                    rec.bodies.lock().unwrap().push(body);
                    let key = headers.get("xi-api-key").map(|v| v.as_bytes());
                    if key != Some(b"xi-test".as_slice()) {
                        return (StatusCode::UNAUTHORIZED, "bad key").into_response();
                    }
                    if voice_id == "missing" {
                        return (StatusCode::BAD_REQUEST, "voice not found").into_response();
                    }
                    (
                        [("content-type", "audio/mpeg")],
                        format!("ID3-{}", voice_id).into_bytes(),
                    )
                        .into_response()
                },
            ),
        )
        .route(
            "/v1/voices",
            get(|| async {
                Json(json!({
                    "voices": [
                        {"voice_id": "abc", "name": "Donna", "category": "premade"},
                        {"voice_id": "def", "name": "Nova"}
                    ]
                }))
            }),
        )
        .with_state(recorded)
}

#[tokio::test]
async fn elevenlabs_writes_audio_file() {
    let recorded = Recorded::default();
    let base = spawn(tts_router(recorded.clone())).await;
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("message_0.mp3");

    let synth = ElevenLabsSynthesizer::new(synth_config(base)).unwrap();
    synth.synthesize("abc", "hi there", &output).await.unwrap();

    assert_eq!(std::fs::read(&output).unwrap(), b"ID3-abc");
    let body = recorded.bodies.lock().unwrap()[0].clone();
    assert_eq!(body["text"], "hi there");
    assert_eq!(body["model_id"], "eleven_multilingual_v2");
    assert_eq!(body["voice_settings"]["stability"], 0.5);
}

#[tokio::test]
async fn elevenlabs_client_error_is_synthesis_failure() {
    let base = spawn(tts_router(Recorded::default())).await;
    let dir = tempfile::tempdir().unwrap();

    let synth = ElevenLabsSynthesizer::new(synth_config(base)).unwrap();
    let err = synth
        .synthesize("missing", "hi", &dir.path().join("out.mp3"))
        .await
        .unwrap_err();
    match err {
        VoiceError::SynthesisFailed(msg) => assert!(msg.contains("voice not found")),
        other => panic!("expected SynthesisFailed, got {:?}", other),
    }
    assert!(!dir.path().join("out.mp3").exists());
}

#[tokio::test]
async fn elevenlabs_lists_voices() {
    let base = spawn(tts_router(Recorded::default())).await;
    let synth = ElevenLabsSynthesizer::new(synth_config(base)).unwrap();

    let voices = synth.list_voices().await.unwrap();
    assert_eq!(voices.len(), 2);
    assert_eq!(voices[0].voice_id, "abc");
    assert_eq!(voices[0].category.as_deref(), Some("premade"));
    assert_eq!(voices[1].category, None);
}

#[tokio::test]
async fn chat_client_honours_configured_timeout() {
    let router = Router::new().route(
        "/chat/completions",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Json(json!({"choices": [{"message": {"content": "[]"}}]}))
        }),
    );
    let base = spawn(router).await;

    let config = ChatConfig {
        timeout_secs: 1,
        ..chat_config(base)
    };
    let chat = OpenAiChat::new(config).unwrap().with_retry(fast_retry(1));

    let started = std::time::Instant::now();
    let err = chat.complete("hello").await.unwrap_err();
    assert!(matches!(err, VoiceError::UpstreamUnavailable { .. }));
    assert!(started.elapsed() < Duration::from_secs(4));
}
