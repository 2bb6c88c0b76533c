use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

pub const DEFAULT_MESSAGE_VERSION: &str = "1.0";

/// Function-details invocation sent by the agent's action group.
///
/// Extra fields (session attributes, agent metadata, input text) are ignored.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationEnvelope {
    #[serde(default)]
    pub message_version: Option<String>,
    #[serde(default)]
    pub action_group: String,
    #[serde(default)]
    pub function: String,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub value: String,
}

impl Parameter {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self { name: name.into(), kind: Some("string".to_string()), value: value.into() }
    }

    fn from_value(entry: Value) -> Option<Self> {
        let Value::Object(mut fields) = entry else {
            return None;
        };
        let name = string_field(&mut fields, "name")?;
        Some(Self {
            name,
            kind: string_field(&mut fields, "type"),
            value: fields.remove("value").map(lenient_text).unwrap_or_default(),
        })
    }
}

impl InvocationEnvelope {
    pub fn new(function: impl Into<String>, parameters: Vec<Parameter>) -> Self {
        Self {
            message_version: Some(DEFAULT_MESSAGE_VERSION.to_string()),
            action_group: String::new(),
            function: function.into(),
            parameters,
        }
    }

    /// Reads each field on its own so one malformed field does not discard
    /// the rest. Non-string header fields read as absent, a `parameters`
    /// value that is not an array reads as empty, and parameter entries
    /// without a string name are skipped.
    pub fn from_value(payload: Value) -> Self {
        let Value::Object(mut fields) = payload else {
            tracing::warn!(
                event_name = "handler.envelope.malformed",
                "invocation payload is not a JSON object"
            );
            return Self::default();
        };

        let parameters = match fields.remove("parameters") {
            Some(Value::Array(entries)) => {
                let total = entries.len();
                let parameters: Vec<Parameter> =
                    entries.into_iter().filter_map(Parameter::from_value).collect();
                if parameters.len() < total {
                    tracing::warn!(
                        event_name = "handler.envelope.parameter_skipped",
                        skipped = total - parameters.len(),
                        "dropped parameter entries without a string name"
                    );
                }
                parameters
            }
            Some(Value::Null) | None => Vec::new(),
            Some(other) => {
                tracing::warn!(
                    event_name = "handler.envelope.malformed",
                    parameters = %other,
                    "parameters is not an array"
                );
                Vec::new()
            }
        };

        Self {
            message_version: string_field(&mut fields, "messageVersion"),
            action_group: string_field(&mut fields, "actionGroup").unwrap_or_default(),
            function: string_field(&mut fields, "function").unwrap_or_default(),
            parameters,
        }
    }
}

fn string_field(fields: &mut Map<String, Value>, key: &str) -> Option<String> {
    match fields.remove(key) {
        Some(Value::String(value)) => Some(value),
        _ => None,
    }
}

fn lenient_text(value: Value) -> String {
    match value {
        Value::String(value) => value,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    pub response: ActionResponse,
    pub message_version: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResponse {
    pub action_group: String,
    pub function: String,
    pub function_response: FunctionResponse,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionResponse {
    pub response_body: ResponseBody,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseBody {
    #[serde(rename = "TEXT")]
    pub text: TextBody,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextBody {
    pub body: String,
}

impl ResponseEnvelope {
    /// Echoes the caller's action group, function and message version around `body`.
    pub fn reply(envelope: &InvocationEnvelope, body: String) -> Self {
        Self {
            response: ActionResponse {
                action_group: envelope.action_group.clone(),
                function: envelope.function.clone(),
                function_response: FunctionResponse {
                    response_body: ResponseBody { text: TextBody { body } },
                },
            },
            message_version: envelope
                .message_version
                .clone()
                .unwrap_or_else(|| DEFAULT_MESSAGE_VERSION.to_string()),
        }
    }

    pub fn body(&self) -> &str {
        &self.response.function_response.response_body.text.body
    }
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(lenient_text)
}
