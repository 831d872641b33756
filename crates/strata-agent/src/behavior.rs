use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

/// What a behavior does when its trigger fires.
///
/// Persisted configs carry loosely typed action kinds. [`BehaviorAction::decode`]
/// maps them onto this closed set:
///
/// | stored `type`              | decoded as                    |
/// |----------------------------|-------------------------------|
/// | `routine` with `routineId` | `Routine`                     |
/// | `emit` with `eventType`    | `Emit`                        |
/// | `invoke`                   | `Invoke`                      |
/// | `decision`, `accumulate`   | `Invoke`, purpose preserved   |
/// | anything else              | `Invoke`                      |
///
/// A `routine` or `emit` entry missing its required field also decodes as
/// `Invoke`. Decoding never fails. Encoding always writes the canonical form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BehaviorAction {
    #[serde(rename_all = "camelCase")]
    Routine {
        routine_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        label: Option<String>,
    },
    Invoke {
        purpose: String,
    },
    #[serde(rename_all = "camelCase")]
    Emit {
        event_type: String,
    },
}

impl BehaviorAction {
    pub fn routine(routine_id: impl Into<String>) -> Self {
        Self::Routine {
            routine_id: routine_id.into(),
            label: None,
        }
    }

    pub fn invoke(purpose: impl Into<String>) -> Self {
        Self::Invoke {
            purpose: purpose.into(),
        }
    }

    pub fn emit(event_type: impl Into<String>) -> Self {
        Self::Emit {
            event_type: event_type.into(),
        }
    }

    /// Decode a stored action, coercing legacy and unknown kinds.
    pub fn decode(value: &Value) -> Self {
        let kind = str_field(value, "type")
            .or_else(|| str_field(value, "kind"))
            .unwrap_or_default();

        match kind {
            "routine" => {
                if let Some(routine_id) = str_field(value, "routineId") {
                    return Self::Routine {
                        routine_id: routine_id.to_string(),
                        label: str_field(value, "label").map(str::to_string),
                    };
                }
            }
            "emit" => {
                if let Some(event_type) = str_field(value, "eventType") {
                    return Self::emit(event_type);
                }
            }
            "invoke" | "decision" | "accumulate" => {}
            other => {
                debug!(kind = other, "Unrecognized behavior action kind, decoding as invoke");
            }
        }

        Self::invoke(purpose_of(value, kind))
    }

    pub fn encode(&self) -> Value {
        // Plain enum of strings; serialization cannot fail.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Routine { .. } => "routine",
            Self::Invoke { .. } => "invoke",
            Self::Emit { .. } => "emit",
        }
    }
}

impl<'de> Deserialize<'de> for BehaviorAction {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(Self::decode(&value))
    }
}

fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

/// Human-readable purpose for an invoke action. Falls back through the
/// fields older configs used, then the kind itself.
fn purpose_of(value: &Value, kind: &str) -> String {
    ["purpose", "description", "label", "name"]
        .iter()
        .find_map(|key| str_field(value, key))
        .map(str::to_string)
        .unwrap_or_else(|| {
            if kind.is_empty() {
                "invoke".to_string()
            } else {
                kind.to_string()
            }
        })
}

/// When a behavior fires: a topic pattern plus an optional serialized
/// condition evaluated by the consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
    pub topic: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<String>,
}

impl Trigger {
    pub fn on(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            when: None,
        }
    }

    pub fn when(mut self, condition: impl Into<String>) -> Self {
        self.when = Some(condition.into());
        self
    }

    /// Match a concrete `/`-separated topic against this trigger's pattern.
    /// `*` matches exactly one segment, `#` matches the remaining tail
    /// (including nothing).
    pub fn matches(&self, topic: &str) -> bool {
        match Regex::new(&topic_regex(&self.topic)) {
            Ok(re) => re.is_match(topic),
            Err(e) => {
                warn!(pattern = %self.topic, error = %e, "Invalid trigger topic pattern");
                false
            }
        }
    }
}

fn topic_regex(pattern: &str) -> String {
    let mut re = String::from("^");
    for (i, segment) in pattern.split('/').enumerate() {
        if segment == "#" {
            re.push_str(if i == 0 { ".*" } else { "(/.*)?" });
            re.push('$');
            return re;
        }
        if i > 0 {
            re.push('/');
        }
        if segment == "*" {
            re.push_str("[^/]+");
        } else {
            re.push_str(&regex::escape(segment));
        }
    }
    re.push('$');
    re
}

/// A trigger/action rule attached to an agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Behavior {
    pub trigger: Trigger,
    pub action: BehaviorAction,
}

impl Behavior {
    pub fn new(trigger: Trigger, action: BehaviorAction) -> Self {
        Self { trigger, action }
    }

    pub fn fires_on(&self, topic: &str) -> bool {
        self.trigger.matches(topic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_routine() {
        let action = BehaviorAction::decode(&json!({
            "type": "routine", "routineId": "r-42", "label": "Summarize"
        }));
        assert_eq!(
            action,
            BehaviorAction::Routine {
                routine_id: "r-42".into(),
                label: Some("Summarize".into())
            }
        );
    }

    #[test]
    fn test_decode_legacy_kinds_as_invoke() {
        let decision = BehaviorAction::decode(&json!({
            "type": "decision", "description": "Choose next milestone"
        }));
        assert_eq!(decision, BehaviorAction::invoke("Choose next milestone"));

        let accumulate = BehaviorAction::decode(&json!({"type": "accumulate"}));
        assert_eq!(accumulate, BehaviorAction::invoke("accumulate"));
    }

    #[test]
    fn test_decode_unknown_kind_never_fails() {
        let action = BehaviorAction::decode(&json!({"type": "teleport", "purpose": "go"}));
        assert_eq!(action, BehaviorAction::invoke("go"));

        let action = BehaviorAction::decode(&json!(42));
        assert_eq!(action, BehaviorAction::invoke("invoke"));
    }

    #[test]
    fn test_decode_incomplete_routine_falls_back() {
        let action = BehaviorAction::decode(&json!({"type": "routine", "label": "orphan"}));
        assert_eq!(action, BehaviorAction::invoke("orphan"));
    }

    #[test]
    fn test_decode_emit() {
        let action = BehaviorAction::decode(&json!({"type": "emit", "eventType": "swarm/done"}));
        assert_eq!(action, BehaviorAction::emit("swarm/done"));
    }

    #[test]
    fn test_encode_canonical_form() {
        let encoded = BehaviorAction::routine("r-1").encode();
        assert_eq!(encoded, json!({"type": "routine", "routineId": "r-1"}));

        let legacy: BehaviorAction =
            serde_json::from_value(json!({"type": "decision", "purpose": "pick"})).unwrap();
        assert_eq!(legacy.encode(), json!({"type": "invoke", "purpose": "pick"}));
    }

    #[test]
    fn test_topic_wildcards() {
        let single = Trigger::on("swarm/*/completed");
        assert!(single.matches("swarm/abc/completed"));
        assert!(!single.matches("swarm/a/b/completed"));
        assert!(!single.matches("swarm//completed"));

        let tail = Trigger::on("swarm/#");
        assert!(tail.matches("swarm"));
        assert!(tail.matches("swarm/abc/step/3"));
        assert!(!tail.matches("swarms/abc"));

        assert!(Trigger::on("#").matches("anything/at/all"));
    }

    #[test]
    fn test_topic_literals_are_escaped() {
        let trigger = Trigger::on("run.started");
        assert!(trigger.matches("run.started"));
        assert!(!trigger.matches("runXstarted"));
    }

    #[test]
    fn test_behavior_fires_on() {
        let behavior = Behavior::new(
            Trigger::on("chat/*/message").when("sender != self"),
            BehaviorAction::invoke("reply"),
        );
        assert!(behavior.fires_on("chat/c1/message"));
        assert!(!behavior.fires_on("chat/c1/typing"));
    }
}
