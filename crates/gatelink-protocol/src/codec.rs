//! JSON codec between [`Frame`]s and wire text.
//!
//! Classification depends only on the `type` discriminator and the fields
//! each kind declares, never on field ordering. Malformed input yields a
//! [`DecodeError`] value; the caller decides whether to log and drop.

use serde_json::Value;

use crate::frame::Frame;

/// A frame that could not be decoded from wire text.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The payload was not valid JSON at all.
    #[error("invalid JSON: {0}")]
    Syntax(#[source] serde_json::Error),

    /// The payload was JSON but did not match any known frame shape
    /// (missing or unknown `type` discriminator, wrong field types).
    #[error("unrecognized frame shape: {0}")]
    Shape(#[source] serde_json::Error),
}

/// Serialize a frame to wire text.
pub fn encode(frame: &Frame) -> Result<String, serde_json::Error> {
    serde_json::to_string(frame)
}

/// Parse wire text into a frame.
///
/// Parses to a JSON value first so syntax errors and shape errors are
/// distinguishable in logs.
pub fn decode(text: &str) -> Result<Frame, DecodeError> {
    let value: Value = serde_json::from_str(text).map_err(DecodeError::Syntax)?;
    serde_json::from_value(value).map_err(DecodeError::Shape)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn decode_request() {
        let frame = decode(r#"{"type":"req","id":"3","method":"chat.send","params":{"text":"hi"}}"#)
            .unwrap();
        assert_eq!(
            frame,
            Frame::request("3", "chat.send", json!({"text": "hi"}))
        );
    }

    #[test]
    fn decode_is_field_order_independent() {
        let a = decode(r#"{"type":"res","id":"9","ok":true,"payload":{"n":1}}"#).unwrap();
        let b = decode(r#"{"payload":{"n":1},"ok":true,"id":"9","type":"res"}"#).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn decode_response_with_error_body() {
        let frame =
            decode(r#"{"type":"res","id":"4","ok":false,"error":{"message":"denied"}}"#).unwrap();
        match frame {
            Frame::Response { id, ok, error, .. } => {
                assert_eq!(id, "4");
                assert!(!ok);
                assert_eq!(error.unwrap().message, "denied");
            }
            other => panic!("expected response, got: {other:?}"),
        }
    }

    #[test]
    fn decode_event_without_payload_defaults_to_null() {
        let frame = decode(r#"{"type":"event","event":"agent.idle"}"#).unwrap();
        assert_eq!(
            frame,
            Frame::Event {
                event: "agent.idle".into(),
                payload: Value::Null,
            }
        );
    }

    #[test]
    fn decode_rejects_invalid_json() {
        assert_matches!(decode("{not json"), Err(DecodeError::Syntax(_)));
    }

    #[test]
    fn decode_rejects_missing_discriminator() {
        assert_matches!(
            decode(r#"{"id":"1","method":"x"}"#),
            Err(DecodeError::Shape(_))
        );
    }

    #[test]
    fn decode_rejects_unknown_discriminator() {
        assert_matches!(
            decode(r#"{"type":"ping","id":"1"}"#),
            Err(DecodeError::Shape(_))
        );
    }

    #[test]
    fn decode_rejects_wrong_field_types() {
        assert_matches!(
            decode(r#"{"type":"req","id":7,"method":"x"}"#),
            Err(DecodeError::Shape(_))
        );
    }

    #[test]
    fn encode_decode_round_trip_examples() {
        let frames = [
            Frame::request("1", "connect", json!({"role": "bridge"})),
            Frame::ok_response("1", json!({"type": "hello-ok"})),
            Frame::err_response("2", "no such method"),
            Frame::Event {
                event: "connect.challenge".into(),
                payload: json!({"nonce": "abc"}),
            },
        ];
        for frame in frames {
            let text = encode(&frame).unwrap();
            assert_eq!(decode(&text).unwrap(), frame);
        }
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn arb_params() -> impl Strategy<Value = Value> {
            prop_oneof![
                Just(Value::Null),
                any::<bool>().prop_map(Value::Bool),
                any::<i64>().prop_map(|n| json!(n)),
                ".{0,24}".prop_map(|s| json!({ "text": s })),
            ]
        }

        fn arb_frame() -> impl Strategy<Value = Frame> {
            prop_oneof![
                ("[a-z0-9]{1,8}", "[a-z.]{1,16}", arb_params())
                    .prop_map(|(id, method, params)| Frame::request(id, method, params)),
                ("[a-z0-9]{1,8}", arb_params())
                    .prop_map(|(id, payload)| Frame::ok_response(id, payload)),
                ("[a-z0-9]{1,8}", ".{0,32}")
                    .prop_map(|(id, message)| Frame::err_response(id, message)),
                ("[a-z.]{1,16}", arb_params()).prop_map(|(event, payload)| Frame::Event {
                    event,
                    payload
                }),
            ]
        }

        proptest! {
            #[test]
            fn round_trip(frame in arb_frame()) {
                let text = encode(&frame).unwrap();
                prop_assert_eq!(decode(&text).unwrap(), frame);
            }
        }
    }
}
