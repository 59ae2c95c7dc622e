//! Built-in workflows: order status summary and meeting invites.

use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};

use switchboard_core::types::ConfirmationKind;

use super::{Step, StepOutcome, Workflow};
use crate::tools::OrderDetailsTool;

const CONFIRM_MESSAGE: &str = "Please confirm if everything looks good? (yes/no)";

// ─────────────────────────────────────────────
// order-status-workflow
// ─────────────────────────────────────────────

struct FetchOrder {
    orders: Arc<OrderDetailsTool>,
}

#[async_trait]
impl Step for FetchOrder {
    fn id(&self) -> &str {
        "fetch-order-info"
    }

    async fn run(&self, input: Value, _resume: Option<&Value>) -> anyhow::Result<StepOutcome> {
        let order_number = input["orderNumber"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("Input data not found: orderNumber is required"))?;
        let order = self.orders.fetch(order_number).await?;
        Ok(StepOutcome::Continue(json!({
            "requested": order_number,
            "order": order,
        })))
    }
}

struct SummarizeOrder;

#[async_trait]
impl Step for SummarizeOrder {
    fn id(&self) -> &str {
        "summarize-order"
    }

    async fn run(&self, input: Value, _resume: Option<&Value>) -> anyhow::Result<StepOutcome> {
        let order = &input["order"];
        let summary = if order["status"] == "not_found" {
            format!(
                "Order {} was not found.",
                input["requested"].as_str().unwrap_or_default()
            )
        } else {
            format!(
                "Order {} is {} ({}).",
                order["orderNumber"].as_str().unwrap_or_default(),
                order["status"].as_str().unwrap_or_default(),
                order["date"].as_str().unwrap_or_default()
            )
        };
        Ok(StepOutcome::Continue(Value::String(summary)))
    }
}

/// Looks up one order and summarizes its status.
pub fn order_status_workflow(orders: Arc<OrderDetailsTool>) -> Workflow {
    Workflow::new(
        "order-status-workflow",
        "Fetches order information for a given order number and summarizes its status",
        json!({
            "type": "object",
            "properties": {
                "orderNumber": {
                    "type": "string",
                    "description": "The order number to get information for"
                }
            },
            "required": ["orderNumber"]
        }),
    )
    .then(FetchOrder { orders })
    .then(SummarizeOrder)
}

// ─────────────────────────────────────────────
// meeting-invite-workflow
// ─────────────────────────────────────────────

struct ExtractEmails {
    pattern: Regex,
}

#[async_trait]
impl Step for ExtractEmails {
    fn id(&self) -> &str {
        "get-query"
    }

    async fn run(&self, input: Value, _resume: Option<&Value>) -> anyhow::Result<StepOutcome> {
        let query = input["query"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("Trigger data not found: query is required"))?;

        let mut emails: Vec<String> = Vec::new();
        for m in self.pattern.find_iter(query) {
            let email = m.as_str().to_lowercase();
            if !emails.contains(&email) {
                emails.push(email);
            }
        }
        if emails.is_empty() {
            anyhow::bail!("No email address found");
        }
        Ok(StepOutcome::Continue(json!(emails)))
    }
}

struct SendInvites;

#[async_trait]
impl Step for SendInvites {
    fn id(&self) -> &str {
        "send-email"
    }

    async fn run(&self, input: Value, resume: Option<&Value>) -> anyhow::Result<StepOutcome> {
        let emails: Vec<&str> = input
            .as_array()
            .map(|list| list.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        let Some(answer) = resume else {
            return Ok(StepOutcome::Suspend {
                payload: json!({ "message": CONFIRM_MESSAGE, "emails": emails }),
                expects: ConfirmationKind::YesNo,
            });
        };

        match answer.as_str() {
            Some("yes") => Ok(StepOutcome::Continue(Value::String(format!(
                "Meeting invites sent to {}.",
                emails.join(", ")
            )))),
            Some("no") => Ok(StepOutcome::Continue(Value::String(
                "Meeting setup cancelled; no invites were sent.".to_string(),
            ))),
            _ => anyhow::bail!("expected 'yes' or 'no', got {answer}"),
        }
    }
}

/// Extracts e-mail addresses from a query and sends invites after confirmation.
pub fn meeting_invite_workflow() -> anyhow::Result<Workflow> {
    let pattern = Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}")?;
    Ok(Workflow::new(
        "meeting-invite-workflow",
        "A workflow that can set up an event in Calendar. It can also identify email address \
         from the user query, and then send an email to the identified email address.",
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "The query from the user" }
            },
            "required": ["query"]
        }),
    )
    .then(ExtractEmails { pattern })
    .then(SendInvites))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::hub::tests::{hub_config, mount_auth};
    use crate::tools::HubClient;
    use crate::workflow::RunRecord;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_meeting_invite_confirmed() {
        let wf = meeting_invite_workflow().unwrap();
        let (run_id, record) = wf
            .start(json!({"query": "Set up a sync with Bob@Example.com and ann@example.org"}))
            .await
            .unwrap();

        match record {
            RunRecord::Suspended { payload, expects, .. } => {
                assert_eq!(payload["message"], CONFIRM_MESSAGE);
                assert_eq!(payload["emails"], json!(["bob@example.com", "ann@example.org"]));
                assert_eq!(expects, ConfirmationKind::YesNo);
            }
            other => panic!("expected suspension, got {other:?}"),
        }

        let done = wf.resume_run(&run_id, &json!("yes")).await.unwrap();
        assert_eq!(
            done,
            RunRecord::Succeeded(json!("Meeting invites sent to bob@example.com, ann@example.org."))
        );
    }

    #[tokio::test]
    async fn test_meeting_invite_declined() {
        let wf = meeting_invite_workflow().unwrap();
        let (run_id, _) = wf.start(json!({"query": "invite bob@example.com"})).await.unwrap();
        let done = wf.resume_run(&run_id, &json!("no")).await.unwrap();
        assert_eq!(
            done,
            RunRecord::Succeeded(json!("Meeting setup cancelled; no invites were sent."))
        );
    }

    #[tokio::test]
    async fn test_meeting_invite_needs_an_address() {
        let wf = meeting_invite_workflow().unwrap();
        let err = wf.start(json!({"query": "invite the whole team"})).await.unwrap_err();
        assert!(format!("{err:#}").contains("No email address found"));
    }

    #[tokio::test]
    async fn test_order_status_summary() {
        let server = MockServer::start().await;
        mount_auth(&server, "tok").await;
        Mock::given(method("GET"))
            .and(path("/api/order-list/ABC123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "orderNumber": "ABC123",
                "statusText": "completed",
                "createdAt": "2024-07-23"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/order-list/ZZZ"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let hub = Arc::new(HubClient::from_config(&hub_config(&server.uri())).unwrap());
        let wf = order_status_workflow(Arc::new(OrderDetailsTool::new(hub)));

        let (_, record) = wf.start(json!({"orderNumber": "ABC123"})).await.unwrap();
        assert_eq!(
            record,
            RunRecord::Succeeded(json!("Order ABC123 is completed (2024-07-23)."))
        );

        let (_, record) = wf.start(json!({"orderNumber": "ZZZ"})).await.unwrap();
        assert_eq!(record, RunRecord::Succeeded(json!("Order ZZZ was not found.")));
    }
}
