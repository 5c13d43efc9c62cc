use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info};

/// Collected lead details, merged from tool call arguments
pub type LeadRecord = Map<String, Value>;

/// A function call requested by the remote agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub args: Map<String, Value>,
}

/// Acknowledgement for exactly one `ToolCallRequest`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResult {
    pub id: String,
    pub name: String,
    pub response: Value,
}

/// Function declaration advertised to the remote agent at setup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    /// JSON schema of the arguments object
    pub parameters: Value,
}

impl ToolDeclaration {
    /// Lead capture tool recording name, email and business type
    pub fn capture_lead_info() -> Self {
        Self {
            name: "capture_lead_info".to_string(),
            description: "Records lead details into the business CRM.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "name": { "type": "string" },
                    "email": { "type": "string" },
                    "business_nature": { "type": "string" }
                },
                "required": ["name", "email"]
            }),
        }
    }

    /// Call termination tool; takes no arguments
    pub fn terminate_call(name: &str) -> Self {
        Self {
            name: name.to_string(),
            description: "Ends the voice session and closes the connection.".to_string(),
            parameters: json!({ "type": "object", "properties": {} }),
        }
    }
}

/// What one batch of tool calls did
#[derive(Debug, Default)]
pub struct DispatchOutcome {
    /// One result per request, in request order
    pub results: Vec<ToolCallResult>,
    /// The agent asked to hang up
    pub terminate_requested: bool,
    /// Name of the last data tool that ran, for the "tool active" indicator
    pub indicator: Option<String>,
}

/// Interprets tool calls from the remote agent
pub struct ToolDispatcher {
    termination_tool: String,
}

impl ToolDispatcher {
    pub fn new(termination_tool: impl Into<String>) -> Self {
        Self {
            termination_tool: termination_tool.into(),
        }
    }

    pub fn termination_tool(&self) -> &str {
        &self.termination_tool
    }

    /// Handle a batch of requests, merging lead data into `lead`
    ///
    /// Termination is only flagged here; the caller decides when to hang up.
    pub fn dispatch(&self, batch: Vec<ToolCallRequest>, lead: &mut LeadRecord) -> DispatchOutcome {
        let mut outcome = DispatchOutcome {
            results: Vec::with_capacity(batch.len()),
            ..Default::default()
        };

        for request in batch {
            let response = if request.name == self.termination_tool {
                info!("Agent requested call termination ({})", request.id);
                outcome.terminate_requested = true;
                json!({ "status": "hanging_up" })
            } else {
                debug!(
                    "Tool {} ({}) with {} args",
                    request.name,
                    request.id,
                    request.args.len()
                );
                for (key, value) in request.args {
                    lead.insert(key, value);
                }
                outcome.indicator = Some(request.name.clone());
                json!({ "success": true })
            };

            outcome.results.push(ToolCallResult {
                id: request.id,
                name: request.name,
                response,
            });
        }

        outcome
    }
}

/// A lead record with every configured field present and empty
pub fn empty_lead_record(fields: &[String]) -> LeadRecord {
    fields
        .iter()
        .map(|field| (field.clone(), Value::String(String::new())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(id: &str, name: &str, args: Value) -> ToolCallRequest {
        ToolCallRequest {
            id: id.to_string(),
            name: name.to_string(),
            args: args.as_object().cloned().unwrap_or_default(),
        }
    }

    #[test]
    fn test_every_request_is_acknowledged_once() {
        let dispatcher = ToolDispatcher::new("terminate_call");
        let mut lead = LeadRecord::new();

        let outcome = dispatcher.dispatch(
            vec![
                request("a", "capture_lead_info", json!({ "name": "Ada" })),
                request("b", "terminate_call", json!({})),
                request("c", "capture_lead_info", json!({ "email": "ada@example.com" })),
            ],
            &mut lead,
        );

        let ids: Vec<&str> = outcome.results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert!(outcome.terminate_requested);
    }

    #[test]
    fn test_newer_values_overwrite_lead_fields() {
        let dispatcher = ToolDispatcher::new("terminate_call");
        let mut lead = empty_lead_record(&["name".to_string(), "email".to_string()]);

        dispatcher.dispatch(
            vec![request("1", "capture_lead_info", json!({ "name": "Ada", "email": "old@x.io" }))],
            &mut lead,
        );
        dispatcher.dispatch(
            vec![request("2", "capture_lead_info", json!({ "email": "new@x.io" }))],
            &mut lead,
        );

        assert_eq!(lead["name"], json!("Ada"));
        assert_eq!(lead["email"], json!("new@x.io"));
    }

    #[test]
    fn test_termination_response_and_no_lead_change() {
        let dispatcher = ToolDispatcher::new("terminate_call");
        let mut lead = LeadRecord::new();

        let outcome = dispatcher.dispatch(vec![request("t", "terminate_call", json!({}))], &mut lead);

        assert_eq!(outcome.results[0].response, json!({ "status": "hanging_up" }));
        assert!(outcome.indicator.is_none());
        assert!(lead.is_empty());
    }

    #[test]
    fn test_data_tool_sets_indicator() {
        let dispatcher = ToolDispatcher::new("terminate_call");
        let mut lead = LeadRecord::new();

        let outcome = dispatcher.dispatch(
            vec![request("x", "capture_lead_info", json!({ "business_nature": "spa" }))],
            &mut lead,
        );

        assert_eq!(outcome.indicator.as_deref(), Some("capture_lead_info"));
        assert_eq!(outcome.results[0].response, json!({ "success": true }));
        assert!(!outcome.terminate_requested);
    }
}
