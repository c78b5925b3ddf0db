//! Classification of inbound bridge webhook payloads.
//!
//! The bridge POSTs JSON bodies to registered webhooks. Lock-state events
//! carry an `event_type` tag; periodic telemetry carries battery and signal
//! readings without one.
//!
//! | Payload | Variant |
//! |---------|---------|
//! | `event_type` starts with `GO_TO_STATE_` | [`BridgeEvent::GoToState`] |
//! | `event_type` starts with `STATE_CHANGED_`, or is `MOTOR_STALL` | [`BridgeEvent::StateChanged`] |
//! | no `event_type`, has `battery_percentage` or `ble_strength` | [`BridgeEvent::Telemetry`] |
//! | anything else | [`BridgeEvent::Unknown`] |

use serde::Serialize;
use serde_json::Value;

const GO_TO_STATE_PREFIX: &str = "GO_TO_STATE_";
const STATE_CHANGED_PREFIX: &str = "STATE_CHANGED_";
const MOTOR_STALL: &str = "MOTOR_STALL";

/// A classified webhook payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum BridgeEvent {
    /// The lock is moving toward a target state.
    GoToState {
        event_type: String,
        go_to_state: Option<String>,
    },
    /// The lock reached (or failed to reach) a state.
    StateChanged {
        event_type: String,
        requested_state: Option<String>,
    },
    /// Battery / signal report.
    Telemetry {
        battery_percentage: Option<i64>,
        ble_strength: Option<i64>,
        raw: Value,
    },
    /// Anything not recognised, kept verbatim.
    Unknown(Value),
}

impl BridgeEvent {
    /// Classify a decoded JSON payload.
    ///
    /// # Examples
    ///
    /// ```
    /// use latchkey_protocol::BridgeEvent;
    /// use serde_json::json;
    ///
    /// let event = BridgeEvent::classify(json!({
    ///     "event_type": "STATE_CHANGED_OPEN",
    ///     "requested_state": "OPEN",
    /// }));
    /// assert!(matches!(event, BridgeEvent::StateChanged { .. }));
    /// ```
    pub fn classify(payload: Value) -> Self {
        let Some(object) = payload.as_object() else {
            return BridgeEvent::Unknown(payload);
        };

        match object.get("event_type") {
            Some(Value::String(event_type)) => {
                if event_type.starts_with(GO_TO_STATE_PREFIX) {
                    BridgeEvent::GoToState {
                        event_type: event_type.clone(),
                        go_to_state: string_field(&payload, "go_to_state"),
                    }
                } else if event_type.starts_with(STATE_CHANGED_PREFIX) || event_type == MOTOR_STALL {
                    BridgeEvent::StateChanged {
                        event_type: event_type.clone(),
                        requested_state: string_field(&payload, "requested_state"),
                    }
                } else {
                    BridgeEvent::Unknown(payload)
                }
            }
            Some(_) => BridgeEvent::Unknown(payload),
            None if object.contains_key("battery_percentage") || object.contains_key("ble_strength") => {
                BridgeEvent::Telemetry {
                    battery_percentage: payload.get("battery_percentage").and_then(Value::as_i64),
                    ble_strength: payload.get("ble_strength").and_then(Value::as_i64),
                    raw: payload,
                }
            }
            None => BridgeEvent::Unknown(payload),
        }
    }

    /// Parse and classify a raw JSON body.
    ///
    /// # Errors
    /// Returns the JSON error if `body` is not valid JSON.
    pub fn from_slice(body: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(body).map(Self::classify)
    }

    /// The `event_type` tag, if this is a lock-state event.
    pub fn event_type(&self) -> Option<&str> {
        match self {
            BridgeEvent::GoToState { event_type, .. } | BridgeEvent::StateChanged { event_type, .. } => {
                Some(event_type)
            }
            BridgeEvent::Telemetry { .. } | BridgeEvent::Unknown(_) => None,
        }
    }

    /// Short name of the variant, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            BridgeEvent::GoToState { .. } => "go_to_state",
            BridgeEvent::StateChanged { .. } => "state_changed",
            BridgeEvent::Telemetry { .. } => "telemetry",
            BridgeEvent::Unknown(_) => "unknown",
        }
    }
}

fn string_field(payload: &Value, key: &str) -> Option<String> {
    payload.get(key).and_then(Value::as_str).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_go_to_state() {
        let event = BridgeEvent::classify(json!({
            "event_type": "GO_TO_STATE_MANUAL_UNLOCK_REMOTE_OPEN",
            "go_to_state": "OPEN",
        }));

        assert_eq!(
            event,
            BridgeEvent::GoToState {
                event_type: "GO_TO_STATE_MANUAL_UNLOCK_REMOTE_OPEN".to_string(),
                go_to_state: Some("OPEN".to_string()),
            }
        );
        assert_eq!(event.event_type(), Some("GO_TO_STATE_MANUAL_UNLOCK_REMOTE_OPEN"));
    }

    #[test]
    fn test_state_changed() {
        for tag in ["STATE_CHANGED_LATCH", "STATE_CHANGED_NIGHT_LOCK", "MOTOR_STALL"] {
            let event = BridgeEvent::classify(json!({
                "event_type": tag,
                "requested_state": "DAY_LOCK",
            }));
            assert_eq!(
                event,
                BridgeEvent::StateChanged {
                    event_type: tag.to_string(),
                    requested_state: Some("DAY_LOCK".to_string()),
                }
            );
        }
    }

    #[test]
    fn test_state_changed_missing_state() {
        let event = BridgeEvent::classify(json!({ "event_type": "STATE_CHANGED_OPEN" }));
        assert!(matches!(
            event,
            BridgeEvent::StateChanged {
                requested_state: None,
                ..
            }
        ));
    }

    #[test]
    fn test_telemetry() {
        let payload = json!({ "battery_percentage": 87, "ble_strength": -64 });
        let event = BridgeEvent::classify(payload.clone());

        assert_eq!(
            event,
            BridgeEvent::Telemetry {
                battery_percentage: Some(87),
                ble_strength: Some(-64),
                raw: payload,
            }
        );
        assert_eq!(event.event_type(), None);
    }

    #[test]
    fn test_telemetry_ble_only() {
        let event = BridgeEvent::classify(json!({ "ble_strength": -70 }));
        assert_eq!(event.kind(), "telemetry");
    }

    #[test]
    fn test_event_type_wins_over_telemetry_fields() {
        let event = BridgeEvent::classify(json!({
            "event_type": "BATTERY_LOW",
            "battery_percentage": 5,
        }));
        assert_eq!(event.kind(), "unknown");
    }

    #[test]
    fn test_unknown_payloads() {
        for payload in [
            json!({ "event_type": "SOMETHING_ELSE" }),
            json!({ "event_type": 7 }),
            json!({ "foo": "bar" }),
            json!([1, 2, 3]),
            json!("STATE_CHANGED_OPEN"),
        ] {
            assert_eq!(BridgeEvent::classify(payload.clone()), BridgeEvent::Unknown(payload));
        }
    }

    #[test]
    fn test_from_slice() {
        let event = BridgeEvent::from_slice(br#"{"event_type":"STATE_CHANGED_OPEN"}"#).unwrap();
        assert_eq!(event.kind(), "state_changed");
        assert!(BridgeEvent::from_slice(b"{not json").is_err());
    }

    #[test]
    fn test_serialize_tagged() {
        let event = BridgeEvent::classify(json!({ "event_type": "MOTOR_STALL" }));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "state_changed");
        assert_eq!(json["data"]["event_type"], "MOTOR_STALL");
    }
}
