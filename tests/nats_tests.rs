use novavoice::audio::codec::decode_pcm16;
use novavoice::nats::messages::{AudioFrameMessage, ClientMessage, ServerMessage};
use novavoice::nats::SessionSubjects;
use novavoice::session::{Role, ToolCallResult};
use novavoice::transport::{Outbound, TransportEvent};
use serde_json::json;

#[test]
fn test_audio_frame_serialization() {
    let msg = ClientMessage::from_outbound(
        "nova_demo_test",
        Outbound::Audio {
            pcm: vec![0u8; 100],
            sample_rate: 16000,
            sequence: 7,
        },
    );

    let json = serde_json::to_string(&msg).unwrap();
    assert!(json.contains("\"type\":\"audio\""));
    assert!(json.contains("nova_demo_test"));
    assert!(json.contains("16000"));
    assert!(json.contains("\"sequence\":7"));

    let deserialized: ClientMessage = serde_json::from_str(&json).unwrap();
    match deserialized {
        ClientMessage::Audio(AudioFrameMessage {
            session_id,
            sequence,
            sample_rate,
            channels,
            pcm,
            ..
        }) => {
            assert_eq!(session_id, "nova_demo_test");
            assert_eq!(sequence, 7);
            assert_eq!(sample_rate, 16000);
            assert_eq!(channels, 1);
            assert!(!pcm.is_empty());
        }
        other => panic!("unexpected message: {:?}", other),
    }
}

#[test]
fn test_tool_response_serialization() {
    let msg = ClientMessage::from_outbound(
        "s1",
        Outbound::ToolResult(ToolCallResult {
            id: "call-1".to_string(),
            name: "terminate_call".to_string(),
            response: json!({"status": "hanging_up"}),
        }),
    );

    let value = serde_json::to_value(&msg).unwrap();
    assert_eq!(value["type"], "tool_response");
    assert_eq!(value["session_id"], "s1");
    assert_eq!(value["result"]["id"], "call-1");
    assert_eq!(value["result"]["response"]["status"], "hanging_up");
}

#[test]
fn test_transcription_deserialization() {
    let json = r#"{
        "type": "transcription",
        "role": "agent",
        "text": "Hello there"
    }"#;

    let msg: ServerMessage = serde_json::from_str(json).unwrap();
    assert_eq!(
        msg.into_event(),
        TransportEvent::TranscriptionDelta {
            role: Role::Agent,
            text: "Hello there".to_string()
        }
    );
}

#[test]
fn test_audio_fragment_decodes_base64() {
    // Two samples: 1 and -1
    let json = r#"{"type": "audio", "pcm": "AQD//w=="}"#;

    let msg: ServerMessage = serde_json::from_str(json).unwrap();
    assert_eq!(
        msg.into_event(),
        TransportEvent::AudioFragment(vec![0x01, 0x00, 0xff, 0xff])
    );
}

#[test]
fn test_invalid_audio_still_reaches_the_engine() {
    let msg: ServerMessage = serde_json::from_str(r#"{"type": "audio", "pcm": "%%%"}"#).unwrap();

    // Forwarded as an empty fragment so it counts as activity and is skipped on decode
    let event = msg.into_event();
    assert_eq!(event, TransportEvent::AudioFragment(Vec::new()));

    match event {
        TransportEvent::AudioFragment(bytes) => assert!(decode_pcm16(&bytes).is_err()),
        other => panic!("unexpected event: {:?}", other),
    }
}

#[test]
fn test_tool_call_deserialization() {
    let json = r#"{
        "type": "tool_call",
        "calls": [
            {"id": "a", "name": "capture_lead_info", "args": {"email": "x@y.z"}},
            {"id": "b", "name": "terminate_call"}
        ]
    }"#;

    let msg: ServerMessage = serde_json::from_str(json).unwrap();
    match msg.into_event() {
        TransportEvent::ToolCall(calls) => {
            assert_eq!(calls.len(), 2);
            assert_eq!(calls[0].args["email"], "x@y.z");
            assert!(calls[1].args.is_empty());
        }
        other => panic!("unexpected event: {:?}", other),
    }
}

#[test]
fn test_turn_signals() {
    for (json, expected) in [
        (r#"{"type": "opened"}"#, TransportEvent::Opened),
        (r#"{"type": "turn_complete"}"#, TransportEvent::TurnComplete),
        (r#"{"type": "interrupted"}"#, TransportEvent::Interrupted),
        (r#"{"type": "closed"}"#, TransportEvent::Closed),
    ] {
        let msg: ServerMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.into_event(), expected);
    }
}

#[test]
fn test_session_subjects() {
    let subjects = SessionSubjects::new("voice.session", "nova_demo_abc");
    assert_eq!(subjects.setup, "voice.session.nova_demo_abc.setup");
    assert_eq!(subjects.outbound, "voice.session.nova_demo_abc.out");
    assert_eq!(subjects.inbound, "voice.session.nova_demo_abc.in");
}
