#![cfg(unix)]

use async_trait::async_trait;
use base64::Engine as _;
use donna_types::{Animation, FacialExpression, MouthShape};
use donna_voice::{
    ArtifactArena, ChatCompleter, ConversationService, Pipeline, RetryPolicy, SpeechSynthesizer,
    StageId, ToolConfig, Transcriber, VoiceError,
};
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Synthesizer that writes deterministic bytes and logs every call.
struct RecordingSynth {
    log: PathBuf,
    written: Mutex<Vec<Vec<u8>>>,
}

#[async_trait]
impl SpeechSynthesizer for RecordingSynth {
    async fn synthesize(
        &self,
        voice_id: &str,
        text: &str,
        output: &Path,
    ) -> Result<(), VoiceError> {
        let bytes = format!("ID3 {} {}", voice_id, text).into_bytes();
        tokio::fs::write(output, &bytes).await?;
        self.written.lock().unwrap().push(bytes);
        append(&self.log, &format!("speak {}", file_name(output)));
        Ok(())
    }
}

struct FixedChat {
    reply: String,
    calls: AtomicUsize,
}

#[async_trait]
impl ChatCompleter for FixedChat {
    async fn complete(&self, _user_message: &str) -> Result<String, VoiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.reply.clone())
    }
}

struct FixedTranscriber(&'static str);

#[async_trait]
impl Transcriber for FixedTranscriber {
    async fn transcribe(&self, _audio: &[u8]) -> Result<String, VoiceError> {
        Ok(self.0.to_string())
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string()
}

fn append(log: &Path, line: &str) {
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log)
        .unwrap();
    writeln!(file, "{}", line).unwrap();
}

fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

struct Harness {
    _dir: tempfile::TempDir,
    log: PathBuf,
    scratch: PathBuf,
    /// Touched by a slow extractor once its sleep finishes.
    marker: PathBuf,
    synth: Arc<RecordingSynth>,
}

/// Standard pipeline wired to mock ffmpeg and rhubarb scripts.
///
/// `failing_wav` makes the viseme extractor exit non-zero for that file.
fn harness(failing_wav: Option<&str>) -> (Harness, Pipeline) {
    harness_with(failing_wav, false)
}

/// Like `harness`, but a `slow` extractor sleeps two seconds and touches
/// `Harness::marker` before writing its output.
fn harness_with(failing_wav: Option<&str>, slow: bool) -> (Harness, Pipeline) {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("calls.log");
    let scratch = dir.path().join("scratch");
    let marker = dir.path().join("rhubarb.finished");

    // ffmpeg -y -i <in> <out>
    let ffmpeg = script(
        dir.path(),
        "ffmpeg.sh",
        &format!(
            "cp \"$3\" \"$4\" || exit 1\necho \"transcode $(basename \"$4\")\" >> {}",
            log.display()
        ),
    );

    // rhubarb -f json -o <out> <wav> -r phonetic
    let fail_check = match failing_wav {
        Some(name) => format!(
            "if [ \"$(basename \"$5\")\" = \"{}\" ]; then echo 'recognizer crashed' >&2; exit 2; fi\n",
            name
        ),
        None => String::new(),
    };
    let delay = if slow {
        format!("sleep 2 && touch {}\n", marker.display())
    } else {
        String::new()
    };
    let rhubarb = script(
        dir.path(),
        "rhubarb.sh",
        &format!(
            "{}echo \"visemes $(basename \"$5\")\" >> {}\n{}\
             printf '%s' '{{\"metadata\":{{\"soundFile\":\"x.wav\",\"duration\":0.4}},\"mouthCues\":[{{\"start\":0.0,\"end\":0.1,\"value\":\"X\"}},{{\"start\":0.1,\"end\":0.4,\"value\":\"C\"}}]}}' > \"$4\"",
            fail_check,
            log.display(),
            delay
        ),
    );

    let tools = ToolConfig {
        ffmpeg,
        rhubarb,
        ..ToolConfig::default()
    };
    let synth = Arc::new(RecordingSynth {
        log: log.clone(),
        written: Mutex::new(Vec::new()),
    });
    let pipeline = Pipeline::standard(
        synth.clone(),
        &tools,
        RetryPolicy::none(),
        ArtifactArena::new(&scratch),
        "voice-1",
    );

    let harness = Harness {
        _dir: dir,
        log,
        scratch,
        marker,
        synth,
    };
    (harness, pipeline)
}

fn three_turn_reply() -> String {
    r#"{"messages": [
        {"text": "first", "facialExpression": "smile", "animation": "Talking_0"},
        {"text": "second", "facialExpression": "sad", "animation": "Crying"},
        {"text": "third", "facialExpression": "surprised", "animation": "Terrified"}
    ]}"#
    .to_string()
}

fn service(
    failing_wav: Option<&str>,
    reply: String,
    max_turns: usize,
) -> (ConversationService, Arc<FixedChat>, Harness) {
    let (harness, pipeline) = harness(failing_wav);
    let chat = Arc::new(FixedChat {
        reply,
        calls: AtomicUsize::new(0),
    });
    let service = ConversationService::new(chat.clone(), pipeline, max_turns);
    (service, chat, harness)
}

fn read_log(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

fn scratch_is_empty(path: &Path) -> bool {
    match std::fs::read_dir(path) {
        Ok(mut entries) => entries.next().is_none(),
        Err(_) => true,
    }
}

#[tokio::test]
async fn single_turn_reply_is_fully_enriched() {
    let reply = r#"{"messages":[{"text":"hi there","facialExpression":"smile","animation":"Talking_0"}]}"#;
    let (service, chat, h) = service(None, reply.to_string(), 3);

    let response = service.respond("hello").await.unwrap();

    assert_eq!(chat.calls.load(Ordering::SeqCst), 1);
    assert_eq!(response.messages.len(), 1);
    let turn = &response.messages[0];
    assert_eq!(turn.index, 0);
    assert_eq!(turn.text, "hi there");
    assert_eq!(turn.facial_expression, FacialExpression::Smile);
    assert_eq!(turn.animation, Animation::Talking0);
    assert!(!turn.audio.is_empty());
    assert_eq!(turn.lipsync.mouth_cues.len(), 2);
    assert_eq!(turn.lipsync.mouth_cues[1].value, MouthShape::C);
    assert!(scratch_is_empty(&h.scratch));
}

#[tokio::test]
async fn stages_run_in_order_without_interleaving() {
    let (service, _chat, h) = service(None, three_turn_reply(), 3);

    let response = service.respond("tell me three things").await.unwrap();
    assert_eq!(response.messages.len(), 3);

    let expected: Vec<String> = (0..3)
        .flat_map(|i| {
            vec![
                format!("speak message_{}.mp3", i),
                format!("transcode message_{}.wav", i),
                format!("visemes message_{}.wav", i),
            ]
        })
        .collect();
    assert_eq!(read_log(&h.log), expected);

    let texts: Vec<&str> = response.messages.iter().map(|t| t.text.as_str()).collect();
    assert_eq!(texts, vec!["first", "second", "third"]);
}

#[tokio::test]
async fn audio_payload_decodes_to_synthesized_bytes() {
    let (service, _chat, h) = service(None, three_turn_reply(), 3);
    let response = service.respond("hi").await.unwrap();

    let written = h.synth.written.lock().unwrap().clone();
    assert_eq!(written.len(), 3);
    for (turn, bytes) in response.messages.iter().zip(written) {
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(&turn.audio)
            .unwrap();
        assert_eq!(decoded, bytes);
    }
}

#[tokio::test]
async fn viseme_failure_on_second_turn_fails_whole_batch() {
    let (service, _chat, h) = service(Some("message_1.wav"), three_turn_reply(), 3);

    let err = service.respond("hi").await.unwrap_err();

    assert_eq!(err.turn_index(), Some(1));
    assert_eq!(err.stage(), Some(StageId::ExtractVisemes));
    match err.root() {
        VoiceError::VisemeExtractionFailed(msg) => assert!(msg.contains("recognizer crashed")),
        other => panic!("expected VisemeExtractionFailed, got {:?}", other),
    }

    // Turn 3 never started.
    let log = read_log(&h.log);
    assert!(!log.iter().any(|line| line.contains("message_2")));
    assert!(scratch_is_empty(&h.scratch));
}

#[tokio::test]
async fn reply_longer_than_cap_is_truncated() {
    let reply = r#"[
        {"text": "1"}, {"text": "2"}, {"text": "3"}, {"text": "4"}, {"text": "5"}
    ]"#;
    let (service, _chat, h) = service(None, reply.to_string(), 3);

    let response = service.respond("hi").await.unwrap();

    assert_eq!(response.messages.len(), 3);
    assert_eq!(h.synth.written.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn bad_model_output_fails_before_any_tool_runs() {
    let (service, _chat, h) = service(None, "I'd love to chat!".to_string(), 3);

    let err = service.respond("hi").await.unwrap_err();

    assert!(matches!(err, VoiceError::Normalize(_)));
    assert!(read_log(&h.log).is_empty());
    assert!(h.synth.written.lock().unwrap().is_empty());
}

#[tokio::test]
async fn empty_message_is_rejected() {
    let (service, chat, _h) = service(None, three_turn_reply(), 3);
    let err = service.respond("   ").await.unwrap_err();
    assert!(matches!(err, VoiceError::InvalidInput(_)));
    assert_eq!(chat.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn audio_input_goes_through_the_same_pipeline() {
    let reply = r#"[{"text":"I heard you","animation":"Talking_1"}]"#;
    let (service, _chat, _h) = service(None, reply.to_string(), 3);

    let without = service.respond_to_audio(b"RIFF").await.unwrap_err();
    assert!(matches!(without, VoiceError::Config(_)));

    let service = service.with_transcriber(Arc::new(FixedTranscriber("what's up")));
    let (transcript, response) = service.respond_to_audio(b"RIFF").await.unwrap();
    assert_eq!(transcript, "what's up");
    assert_eq!(response.messages.len(), 1);
    assert_eq!(response.messages[0].animation, Animation::Talking1);
    assert_eq!(response.messages[0].facial_expression, FacialExpression::Default);
}

#[tokio::test]
async fn silent_audio_is_rejected() {
    let (service, chat, _h) = service(None, three_turn_reply(), 3);
    let service = service.with_transcriber(Arc::new(FixedTranscriber("   ")));
    let err = service.respond_to_audio(b"RIFF").await.unwrap_err();
    assert!(matches!(err, VoiceError::InvalidInput(_)));
    assert_eq!(chat.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn dropped_request_kills_tool_and_removes_scratch() {
    let (h, pipeline) = harness_with(None, true);
    let chat = Arc::new(FixedChat {
        reply: three_turn_reply(),
        calls: AtomicUsize::new(0),
    });
    let service = ConversationService::new(chat, pipeline, 3);

    let outcome = tokio::time::timeout(Duration::from_millis(500), service.respond("hi")).await;
    assert!(outcome.is_err(), "request should still be waiting on the extractor");
    assert!(read_log(&h.log).contains(&"visemes message_0.wav".to_string()));

    // Long enough for an orphaned extractor to have finished its sleep.
    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert!(!h.marker.exists());
    assert!(scratch_is_empty(&h.scratch));
}
