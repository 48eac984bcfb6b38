//! Session protocol messages.
//!
//! Every control message is a JSON object with a required `type`
//! discriminator. Unknown message and input-event types deserialize to
//! `Unknown` so newer peers can add types without breaking us; senders
//! never emit `Unknown`.
//!
//! # Wire protocol
//!
//! ```text
//! beam_offer        sender -> receiver   window metadata
//! beam_accept       receiver -> sender   chosen UDP ports
//! beam_end          either               teardown
//! input             receiver -> sender   normalized input event
//! keyframe_request  receiver -> sender   force an IDR
//! cursor_state      sender -> receiver   enter/leave cursor capture
//! ping / pong       either               heartbeat
//! ```

use serde::{Deserialize, Serialize};

// ── ControlMessage ───────────────────────────────────────────────

/// A typed message on the control channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    /// Sender offers a beam of one window.
    #[serde(rename_all = "camelCase")]
    BeamOffer {
        sender_name: String,
        window_title: String,
        width: u32,
        height: u32,
        has_audio: bool,
        #[serde(rename = "bundleID")]
        bundle_id: String,
    },

    /// Receiver accepts and declares its media ports.
    #[serde(rename_all = "camelCase")]
    BeamAccept { video_port: u16, audio_port: u16 },

    /// Either side tears the beam down.
    BeamEnd,

    /// Receiver forwards one normalized input event.
    Input { event: InputEvent },

    /// Receiver lost decoder state and needs a fresh IDR.
    KeyframeRequest,

    /// Sender's poll of its local cursor visibility changed.
    CursorState { visible: bool },

    /// Heartbeat request.
    Ping,

    /// Heartbeat reply.
    Pong,

    /// Any message type this build does not know. Ignored on receipt.
    #[serde(other)]
    Unknown,
}

// ── InputEvent ───────────────────────────────────────────────────

/// A normalized input event (receiver -> sender).
///
/// Pointer coordinates are in `[0, 1]^2` with the origin at the top
/// left of the beamed surface. Scroll deltas are normalized; positive
/// means scroll the content downward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum InputEvent {
    #[serde(rename_all = "camelCase")]
    MouseMove {
        x: f64,
        y: f64,
        delta_x: f64,
        delta_y: f64,
    },

    MouseDown { x: f64, y: f64, button: MouseButton },

    MouseUp { x: f64, y: f64, button: MouseButton },

    MouseDrag { x: f64, y: f64 },

    #[serde(rename_all = "camelCase")]
    Scroll { delta_y: f64 },

    #[serde(rename_all = "camelCase")]
    KeyDown {
        key_code: u16,
        #[serde(default)]
        shift: bool,
        #[serde(default)]
        control: bool,
        #[serde(default)]
        option: bool,
        #[serde(default)]
        command: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
    },

    #[serde(rename_all = "camelCase")]
    KeyUp {
        key_code: u16,
        #[serde(default)]
        shift: bool,
        #[serde(default)]
        control: bool,
        #[serde(default)]
        option: bool,
        #[serde(default)]
        command: bool,
    },

    /// Any event type this build does not know. Dropped by the injector.
    #[serde(other)]
    Unknown,
}

/// Pointer button identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MouseButton {
    Left,
    Right,
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn beam_offer_wire_shape() {
        let msg = ControlMessage::BeamOffer {
            sender_name: "Studio".into(),
            window_title: "Doom".into(),
            width: 640,
            height: 480,
            has_audio: true,
            bundle_id: "com.id.doom".into(),
        };
        let json: serde_json::Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "beam_offer");
        assert_eq!(json["senderName"], "Studio");
        assert_eq!(json["windowTitle"], "Doom");
        assert_eq!(json["width"], 640);
        assert_eq!(json["hasAudio"], true);
        assert_eq!(json["bundleID"], "com.id.doom");
    }

    #[test]
    fn beam_accept_wire_shape() {
        let msg = ControlMessage::BeamAccept {
            video_port: 5004,
            audio_port: 5006,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "beam_accept");
        assert_eq!(json["videoPort"], 5004);
        assert_eq!(json["audioPort"], 5006);
    }

    #[test]
    fn heartbeat_wire_shape() {
        assert_eq!(
            serde_json::to_string(&ControlMessage::Ping).unwrap(),
            r#"{"type":"ping"}"#
        );
        assert_eq!(
            serde_json::to_string(&ControlMessage::Pong).unwrap(),
            r#"{"type":"pong"}"#
        );
    }

    #[test]
    fn input_event_wire_shape() {
        let msg = ControlMessage::Input {
            event: InputEvent::MouseMove {
                x: 0.5,
                y: 0.25,
                delta_x: 1.0,
                delta_y: -2.0,
            },
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "input");
        assert_eq!(json["event"]["type"], "mouseMove");
        assert_eq!(json["event"]["deltaX"], 1.0);
        assert_eq!(json["event"]["deltaY"], -2.0);
    }

    #[test]
    fn key_down_wire_shape() {
        let event = InputEvent::KeyDown {
            key_code: 36,
            shift: true,
            control: false,
            option: false,
            command: true,
            text: Some("\r".into()),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "keyDown");
        assert_eq!(json["keyCode"], 36);
        assert_eq!(json["shift"], true);
        assert_eq!(json["command"], true);
        assert_eq!(json["text"], "\r");
    }

    #[test]
    fn key_up_omits_missing_text() {
        let event = InputEvent::KeyUp {
            key_code: 36,
            shift: false,
            control: false,
            option: false,
            command: false,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert!(json.get("text").is_none());
    }

    #[test]
    fn mouse_button_serializes_lowercase() {
        let event = InputEvent::MouseDown {
            x: 0.1,
            y: 0.2,
            button: MouseButton::Right,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["button"], "right");
    }

    #[test]
    fn roundtrip_all_message_types() {
        let messages = vec![
            ControlMessage::BeamOffer {
                sender_name: "a".into(),
                window_title: "b".into(),
                width: 1,
                height: 2,
                has_audio: false,
                bundle_id: "c".into(),
            },
            ControlMessage::BeamAccept {
                video_port: 1,
                audio_port: 2,
            },
            ControlMessage::BeamEnd,
            ControlMessage::Input {
                event: InputEvent::Scroll { delta_y: 0.5 },
            },
            ControlMessage::KeyframeRequest,
            ControlMessage::CursorState { visible: false },
            ControlMessage::Ping,
            ControlMessage::Pong,
        ];
        for msg in messages {
            let text = serde_json::to_string(&msg).unwrap();
            let back: ControlMessage = serde_json::from_str(&text).unwrap();
            assert_eq!(back, msg);
        }
    }

    #[test]
    fn unknown_message_type_is_tolerated() {
        let msg: ControlMessage =
            serde_json::from_str(r#"{"type":"hologram_mode","level":9}"#).unwrap();
        assert_eq!(msg, ControlMessage::Unknown);
    }

    #[test]
    fn unknown_input_event_is_tolerated() {
        let msg: ControlMessage =
            serde_json::from_str(r#"{"type":"input","event":{"type":"tripleTap","x":0.5}}"#)
                .unwrap();
        assert_eq!(
            msg,
            ControlMessage::Input {
                event: InputEvent::Unknown
            }
        );
    }

    #[test]
    fn key_down_modifiers_default_false() {
        let event: InputEvent = serde_json::from_str(r#"{"type":"keyDown","keyCode":12}"#).unwrap();
        match event {
            InputEvent::KeyDown {
                key_code,
                shift,
                control,
                option,
                command,
                text,
            } => {
                assert_eq!(key_code, 12);
                assert!(!shift && !control && !option && !command);
                assert!(text.is_none());
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
