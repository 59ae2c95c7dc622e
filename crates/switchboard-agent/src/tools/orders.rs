//! Order tools: `get-order-details` and `get-order-list` over the hub API.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use super::base::{optional_string, require_string, Tool};
use super::hub::HubClient;

/// Product types accepted by the list filter.
pub const PRODUCT_TYPES: [&str; 3] = ["flight", "hotel", "activities"];

/// Order status display names and their hub codes.
pub const ORDER_STATUSES: [(&str, &str); 41] = [
    ("New", "10"),
    ("Confirm Decision", "50"),
    ("Mixed", "1000"),
    ("Booking in Progress", "18"),
    ("Unprocessed", "89"),
    ("Refund cannot be processed", "102"),
    ("Failed", "91"),
    ("Cancelled", "94"),
    ("Duplicate", "100"),
    ("Reorder", "200"),
    ("Refunded", "95"),
    ("Manually Cancelled", "96"),
    ("Smart Booking Cancelled", "201"),
    ("Manual Payment", "64"),
    ("Manually Ordered", "51"),
    ("Manual Confirm Queue", "52"),
    ("Reprice Confirm Queue", "65"),
    ("Auto Confirm Started", "54"),
    ("Auto Confirm Queue", "55"),
    ("Auto Confirm in Progress", "56"),
    ("Auto Confirmed Partial Booking", "57"),
    ("Auto Confirmed", "58"),
    ("Auto Confirm Failed", "60"),
    ("Auto Confirm Cancelled", "61"),
    ("Auto Confirm Deleted", "62"),
    ("Cancellation under process", "101"),
    ("Pending", "44"),
    ("Tour Code in Progress", "15"),
    ("Manually Confirmed", "53"),
    ("New TF Booking", "40"),
    ("Incomplete TF booking", "41"),
    ("Unconfirmed TF Booking", "42"),
    ("Contact TF Support", "43"),
    ("PNR in Progress", "25"),
    ("TST in Progress", "35"),
    ("TST Created", "39"),
    ("TST Error", "30"),
    ("Unavailable", "59"),
    ("Partially Cancelled", "97"),
    ("Partially Amended", "98"),
    ("Amended", "99"),
];

/// Hub code for a status name, matched case-insensitively.
pub fn status_code(name: &str) -> Option<&'static str> {
    let wanted = name.trim().to_lowercase();
    ORDER_STATUSES
        .iter()
        .find(|(display, _)| display.to_lowercase() == wanted)
        .map(|(_, code)| *code)
}

fn text_field(value: &Value, key: &str) -> String {
    match &value[key] {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

// ─────────────────────────────────────────────
// get-order-details
// ─────────────────────────────────────────────

/// Fetches one order by its number.
pub struct OrderDetailsTool {
    hub: Arc<HubClient>,
}

impl OrderDetailsTool {
    pub fn new(hub: Arc<HubClient>) -> Self {
        Self { hub }
    }

    /// `{orderNumber, status, date}`, or a `not_found` record for an empty reply.
    pub async fn fetch(&self, order_number: &str) -> anyhow::Result<Value> {
        let order_number = order_number.trim();
        if order_number.is_empty() {
            anyhow::bail!("orderNumber must not be empty");
        }
        debug!(order = order_number, "fetching order details");
        let data = self
            .hub
            .get_json(&format!("/api/order-list/{order_number}"), &[])
            .await?;

        if data.is_null() || data.as_object().is_some_and(|o| o.is_empty()) {
            return Ok(json!({"orderNumber": "", "status": "not_found", "date": ""}));
        }
        Ok(json!({
            "orderNumber": text_field(&data, "orderNumber"),
            "status": text_field(&data, "statusText"),
            "date": text_field(&data, "createdAt"),
        }))
    }
}

#[async_trait]
impl Tool for OrderDetailsTool {
    fn name(&self) -> &str {
        "get-order-details"
    }

    fn description(&self) -> &str {
        "Get detailed information about an order by order number"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "orderNumber": {
                    "type": "string",
                    "description": "Order Number to fetch information for"
                }
            },
            "required": ["orderNumber"]
        })
    }

    async fn execute(&self, params: HashMap<String, Value>) -> anyhow::Result<String> {
        let order_number = require_string(&params, "orderNumber")?;
        Ok(self.fetch(&order_number).await?.to_string())
    }
}

// ─────────────────────────────────────────────
// get-order-list
// ─────────────────────────────────────────────

/// Lists the first page of orders matching optional filters.
pub struct OrderListTool {
    hub: Arc<HubClient>,
    description: String,
}

impl OrderListTool {
    pub fn new(hub: Arc<HubClient>) -> Self {
        let limit = hub.page_limit();
        Self {
            hub,
            description: format!(
                "Get list of orders for given filters. Fetches the first {limit} orders from the \
                 database. Return a maximum of {limit} orders."
            ),
        }
    }

    pub async fn fetch(
        &self,
        product_type: Option<&str>,
        status: Option<&str>,
        customer_email: Option<&str>,
    ) -> anyhow::Result<Value> {
        let mut query: Vec<(&str, String)> = Vec::new();
        if let Some(product_type) = product_type {
            let product_type = product_type.to_lowercase();
            if !PRODUCT_TYPES.contains(&product_type.as_str()) {
                anyhow::bail!(
                    "Unknown product type '{product_type}'; expected one of {}",
                    PRODUCT_TYPES.join(", ")
                );
            }
            query.push(("product_type", product_type));
        }
        query.push(("limit", self.hub.page_limit().to_string()));
        query.push(("page", "1".to_string()));
        if let Some(status) = status {
            let code = status_code(status)
                .ok_or_else(|| anyhow::anyhow!("Unknown order status '{status}'"))?;
            query.push(("status[]", code.to_string()));
        }
        if let Some(email) = customer_email {
            query.push(("column_name", "email".to_string()));
            query.push(("column_value", email.to_string()));
        }

        debug!(filters = query.len(), "fetching order list");
        let data = self.hub.get_json("/api/order-list", &query).await?;

        let orders: Vec<Value> = data["data"]
            .as_array()
            .map(|rows| {
                rows.iter()
                    .take(self.hub.page_limit() as usize)
                    .map(|order| {
                        json!({
                            "orderId": text_field(order, "orderNumber"),
                            "status": text_field(order, "statusText"),
                            "date": text_field(order, "createdAt"),
                            "customerEmail": text_field(&order["contact"], "email"),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(json!({ "orders": orders }))
    }
}

#[async_trait]
impl Tool for OrderListTool {
    fn name(&self) -> &str {
        "get-order-list"
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> Value {
        let statuses: Vec<&str> = ORDER_STATUSES.iter().map(|(name, _)| *name).collect();
        json!({
            "type": "object",
            "properties": {
                "productType": {
                    "type": "string",
                    "enum": PRODUCT_TYPES,
                    "description": "The product type of the order"
                },
                "status": {
                    "type": "string",
                    "enum": statuses,
                    "description": "The status of the order."
                },
                "customerEmail": {
                    "type": "string",
                    "description": "The email of the customer."
                }
            },
            "required": []
        })
    }

    async fn execute(&self, params: HashMap<String, Value>) -> anyhow::Result<String> {
        let product_type = optional_string(&params, "productType");
        let status = optional_string(&params, "status");
        let email = optional_string(&params, "customerEmail");
        let orders = self
            .fetch(product_type.as_deref(), status.as_deref(), email.as_deref())
            .await?;
        Ok(orders.to_string())
    }
}
