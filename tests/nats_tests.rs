use base64::Engine;
use chrono::Utc;
use loqa_agent::collaborators::{AgentContent, ConversationEvent};
use loqa_agent::nats::messages::{
    AudioFrameMessage, ConversationEventMessage, GenerationMessage, TalkRequestMessage,
    TranscriptMessage,
};
use loqa_agent::packet::{DirectiveKind, InterruptionSource};

#[test]
fn test_audio_frame_serialization() {
    let msg = AudioFrameMessage {
        session_id: "test-call".to_string(),
        sequence: 0,
        pcm: base64::engine::general_purpose::STANDARD.encode([0u8; 100]),
        sample_rate: 16000,
        channels: 1,
        timestamp: "2025-10-27T14:30:00Z".to_string(),
        final_frame: false,
    };

    let json = serde_json::to_string(&msg).unwrap();
    assert!(json.contains("test-call"));
    assert!(json.contains("16000"));
    assert!(json.contains("\"final\":false"));
    assert!(json.contains("\"sequence\":0"));

    let deserialized: AudioFrameMessage = serde_json::from_str(&json).unwrap();
    assert_eq!(deserialized.session_id, "test-call");
    assert_eq!(deserialized.sample_rate, 16000);
    assert_eq!(deserialized.channels, 1);
    assert_eq!(deserialized.sequence, 0);
    assert!(!deserialized.final_frame);
}

#[test]
fn test_transcript_deserialization() {
    let json = r#"{
        "session_id": "test-call",
        "text": "Hello world",
        "partial": false,
        "timestamp": "2025-10-27T14:30:05Z",
        "confidence": 0.95,
        "language": "en"
    }"#;

    let msg: TranscriptMessage = serde_json::from_str(json).unwrap();
    assert_eq!(msg.session_id, "test-call");
    assert_eq!(msg.text, "Hello world");
    assert!(!msg.partial);
    assert_eq!(msg.confidence, Some(0.95));
    assert_eq!(msg.language.as_deref(), Some("en"));
}

#[test]
fn test_transcript_no_confidence() {
    let json = r#"{
        "session_id": "test-call",
        "text": "No confidence score",
        "partial": true,
        "timestamp": "2025-10-27T14:30:05Z"
    }"#;

    let msg: TranscriptMessage = serde_json::from_str(json).unwrap();
    assert!(msg.partial);
    assert_eq!(msg.confidence, None);
    assert_eq!(msg.language, None);
}

#[test]
fn test_generation_defaults() {
    let msg: GenerationMessage =
        serde_json::from_str(r#"{"session_id":"s","turn_id":"t","text":"Hi"}"#).unwrap();
    assert!(!msg.done);

    let msg: GenerationMessage =
        serde_json::from_str(r#"{"session_id":"s","turn_id":"t","done":true}"#).unwrap();
    assert!(msg.done);
    assert!(msg.text.is_empty());
}

#[test]
fn test_talk_request_fields() {
    let msg = TalkRequestMessage {
        session_id: "s".to_string(),
        turn_id: "turn-1".to_string(),
        text: "What time is it?".to_string(),
        timestamp: "2025-10-27T14:30:00Z".to_string(),
        history_only: false,
    };

    let value = serde_json::to_value(&msg).unwrap();
    assert_eq!(value["turn_id"], "turn-1");
    assert_eq!(value["history_only"], false);
}

#[test]
fn test_agent_audio_event_is_base64() {
    let event = ConversationEvent::AgentMessage {
        id: "turn-1".to_string(),
        content: Some(AgentContent::Audio(vec![1, 2, 3])),
        completed: false,
        time: Utc::now(),
    };

    let value = serde_json::to_value(ConversationEventMessage::from_event("s", event)).unwrap();
    assert_eq!(value["type"], "agent_message");
    assert_eq!(value["audio"], "AQID");
    assert!(value.get("text").is_none());
}

#[test]
fn test_interruption_and_directive_events() {
    let event = ConversationEvent::Interruption {
        id: "turn-2".to_string(),
        source: InterruptionSource::Vad,
        time: Utc::now(),
    };
    let value = serde_json::to_value(ConversationEventMessage::from_event("s", event)).unwrap();
    assert_eq!(value["type"], "interruption");
    assert_eq!(value["source"], "vad");

    let mut arguments = serde_json::Map::new();
    arguments.insert("reason".to_string(), "idle timeout".into());
    let event = ConversationEvent::Directive {
        id: "turn-2".to_string(),
        kind: DirectiveKind::EndConversation,
        arguments,
        time: Utc::now(),
    };
    let value = serde_json::to_value(ConversationEventMessage::from_event("s", event)).unwrap();
    assert_eq!(value["type"], "directive");
    assert_eq!(value["directive"], "end_conversation");
    assert_eq!(value["arguments"]["reason"], "idle timeout");
}
