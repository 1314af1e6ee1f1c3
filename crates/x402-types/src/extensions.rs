//! Protocol extensions advertised in a 402 challenge.
//!
//! Currently only the `bazaar` discovery extension, which tells automated
//! buyers how to call a paid resource and what it returns.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// Key of the discovery extension in `extensions`.
pub const BAZAAR: &str = "bazaar";

/// An extension entry: the data and a JSON Schema describing it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extension {
    pub info: Value,
    pub schema: Value,
}

/// How to call the resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_params: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

/// What the resource returns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryOutput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
}

/// Input to [`declare_discovery_extension`]; every part is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryInfo {
    #[serde(default)]
    pub input: DiscoveryInput,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<DiscoveryOutput>,
}

/// Builds the `extensions` fragment declaring a resource as discoverable.
///
/// ```
/// use x402_types::extensions::{declare_discovery_extension, DiscoveryInfo};
///
/// let extensions = declare_discovery_extension(DiscoveryInfo::default());
/// assert_eq!(extensions["bazaar"]["info"]["input"]["type"], "http");
/// ```
pub fn declare_discovery_extension(info: DiscoveryInfo) -> Map<String, Value> {
    let mut input = serde_json::to_value(&info.input)
        .ok()
        .and_then(|v| v.as_object().cloned())
        .unwrap_or_default();
    input.insert("type".into(), Value::String("http".into()));

    let mut info_json = Map::new();
    info_json.insert("input".into(), Value::Object(input));
    if let Some(output) = &info.output {
        let mut output = serde_json::to_value(output)
            .ok()
            .and_then(|v| v.as_object().cloned())
            .unwrap_or_default();
        output.insert("type".into(), Value::String("json".into()));
        info_json.insert("output".into(), Value::Object(output));
    }

    let extension = Extension {
        info: Value::Object(info_json),
        schema: discovery_schema(info.output.is_some()),
    };
    let mut extensions = Map::new();
    extensions.insert(
        BAZAAR.into(),
        serde_json::to_value(extension).unwrap_or(Value::Null),
    );
    extensions
}

fn discovery_schema(with_output: bool) -> Value {
    let mut required = vec!["input"];
    if with_output {
        required.push("output");
    }
    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "type": "object",
        "properties": {
            "input": {
                "type": "object",
                "properties": {
                    "type": { "type": "string", "const": "http" },
                    "method": { "type": "string" },
                    "queryParams": { "type": "object" },
                    "bodyType": { "type": "string" },
                    "body": {}
                },
                "required": ["type"]
            },
            "output": {
                "type": "object",
                "properties": {
                    "type": { "type": "string" },
                    "example": {},
                    "schema": { "type": "object" }
                }
            }
        },
        "required": required
    })
}
