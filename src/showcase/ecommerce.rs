//! Order processing as a state graph:
//! `validate_order -> check_inventory -> (confirm_shipping | END)`.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value, json};
use tracing::{error, info, warn};

use super::{Framework, Report, connect, print_banner, print_report};
use crate::config::Config;
use crate::error::{GraphError, ShowcaseError};
use crate::extract::extract_json_from_text;
use crate::graph::{CompiledGraph, END, START, StateGraph, node_fn};
use crate::llm::ChatModel;

const FRAMEWORK: Framework = Framework::StateGraph;
const TEMPERATURE: f32 = 0.1;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderItem {
    pub item_id: String,
    pub name: String,
    pub quantity: u32,
    pub price: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CustomerInfo {
    pub name: String,
    pub email: String,
    pub address: String,
    pub payment_method: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Order {
    pub order_id: String,
    pub items: Vec<OrderItem>,
    pub customer_info: Option<CustomerInfo>,
}

/// State threaded through the graph. Each node replaces `metadata` wholesale
/// when it sets it.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct OrderState {
    pub order_id: String,
    pub items: Vec<OrderItem>,
    pub customer_info: Option<CustomerInfo>,
    pub validation_status: String,
    pub inventory_status: String,
    pub shipping_status: String,
    pub processed_report: String,
    pub metadata: Map<String, Value>,
}

impl OrderState {
    fn from_order(order: &Order) -> Self {
        Self {
            order_id: order.order_id.clone(),
            items: order.items.clone(),
            customer_info: order.customer_info.clone(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderOutcome {
    pub order_processing_status: String,
    pub final_report: String,
    pub detailed_state: OrderState,
    pub status: &'static str,
}

impl OrderOutcome {
    fn from_state(state: OrderState) -> Self {
        let mut processing_status = if state.metadata.contains_key("error") {
            "failed"
        } else {
            "completed"
        };
        if state.validation_status == "suspicious" {
            processing_status = "flagged_suspicious";
        } else if state.inventory_status == "out_of_stock" {
            processing_status = "items_unavailable";
        }

        Self {
            order_processing_status: processing_status.to_string(),
            final_report: state.processed_report.clone(),
            detailed_state: state,
            status: "completed",
        }
    }
}

fn metadata(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn text_field(map: &Map<String, Value>, key: &str, default: &str) -> String {
    match map.get(key) {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Null) | None => default.to_string(),
        Some(other) => other.to_string(),
    }
}

fn items_json(items: &[OrderItem]) -> String {
    serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
}

async fn validate_order(model: Arc<dyn ChatModel>, mut state: OrderState) -> Result<OrderState, GraphError> {
    let customer = match &state.customer_info {
        Some(customer) if !state.order_id.is_empty() && !state.items.is_empty() => customer,
        _ => {
            warn!(order = %state.order_id, "missing crucial information for validation");
            state.validation_status = "failed".to_string();
            state.metadata = metadata(json!({"error": "Missing order details"}));
            return Ok(state);
        }
    };

    let prompt = format!(
        r#"Analyze the following order for potential fraud or inconsistencies:
Order ID: {order_id}
Items: {items}
Customer Info: {customer}

Based on typical e-commerce fraud patterns, is this order "valid" or "suspicious"?
Return a JSON object: {{"status": "valid/suspicious", "reason": "short explanation"}}"#,
        order_id = state.order_id,
        items = items_json(&state.items),
        customer = serde_json::to_string(customer).unwrap_or_else(|_| "{}".to_string()),
    );

    match model.complete(&prompt).await {
        Ok(response) => {
            let verdict = extract_json_from_text(&response);
            let status = text_field(&verdict, "status", "suspicious");
            let reason = text_field(&verdict, "reason", "No specific reason provided.");
            info!(order = %state.order_id, %status, %reason, "order validated");
            state.validation_status = status;
            state.metadata = metadata(json!({"validation_reason": reason}));
        }
        Err(err) => {
            error!(order = %state.order_id, "LLM validation failed: {err}");
            state.validation_status = "failed".to_string();
            state.metadata = metadata(json!({"error": format!("LLM validation error: {err}")}));
        }
    }
    Ok(state)
}

async fn check_inventory(mut state: OrderState) -> Result<OrderState, GraphError> {
    let unavailable = state
        .items
        .iter()
        .filter(|item| item.name.to_lowercase().contains("unavailable"))
        .map(|item| item.name.clone())
        .collect::<Vec<_>>();

    if unavailable.is_empty() {
        info!(order = %state.order_id, "all items in stock");
        state.inventory_status = "in_stock".to_string();
    } else {
        warn!(
            order = %state.order_id,
            "some items are out of stock: {}",
            unavailable.join(", ")
        );
        state.inventory_status = "out_of_stock".to_string();
        state.metadata = metadata(json!({"unavailable_items": unavailable}));
    }
    Ok(state)
}

async fn confirm_shipping(model: Arc<dyn ChatModel>, mut state: OrderState) -> Result<OrderState, GraphError> {
    let shipping_status = "shipped";
    let (customer_name, address) = state
        .customer_info
        .as_ref()
        .map_or(("None", "None"), |customer| {
            (customer.name.as_str(), customer.address.as_str())
        });
    let notes = format!(
        "Order {} containing {} items for {customer_name} at {address} has been processed and shipped.",
        state.order_id,
        state.items.len()
    );
    let prompt = format!(
        "Generate a concise, customer-friendly shipping confirmation message for the following order:
Order ID: {order_id}
Items: {items}
Customer Name: {customer_name}
Shipping Address: {address}
Shipping Status: {shipping_status}
Notes: {notes}

Focus on clarity and confirmation.",
        order_id = state.order_id,
        items = items_json(&state.items),
    );

    match model.complete(&prompt).await {
        Ok(report) => {
            info!(order = %state.order_id, "shipping confirmed");
            state.shipping_status = shipping_status.to_string();
            state.processed_report = report;
        }
        Err(err) => {
            error!(order = %state.order_id, "report generation failed: {err}");
            state.shipping_status = "confirmed_with_error".to_string();
            state.processed_report = format!(
                "Shipping confirmed for {}, but report generation failed: {err}",
                state.order_id
            );
        }
    }
    Ok(state)
}

fn build_graph(model: Arc<dyn ChatModel>) -> Result<CompiledGraph<OrderState>, GraphError> {
    let validator = model.clone();
    let shipper = model;

    let mut graph = StateGraph::<OrderState>::new();
    graph
        .add_node(
            "validate_order",
            node_fn(move |state| validate_order(validator.clone(), state)),
        )
        .add_node("check_inventory", node_fn(check_inventory))
        .add_node(
            "confirm_shipping",
            node_fn(move |state| confirm_shipping(shipper.clone(), state)),
        )
        .add_edge(START, "validate_order")
        .add_edge("validate_order", "check_inventory")
        .add_conditional_edges(
            "check_inventory",
            |state: &OrderState| {
                let next = if state.inventory_status == "in_stock" {
                    "confirm_shipping"
                } else {
                    END
                };
                next.to_string()
            },
            [("confirm_shipping", "confirm_shipping"), (END, END)],
        )
        .add_edge("confirm_shipping", END);

    graph.compile()
}

pub struct EcommerceWorkflow {
    graph: Option<CompiledGraph<OrderState>>,
}

impl EcommerceWorkflow {
    pub fn new(config: &Config) -> Self {
        match connect(config, Some(TEMPERATURE)) {
            Ok(model) => Self::with_model(model),
            Err(err) => {
                error!("Error setting up order workflow: {err}");
                Self { graph: None }
            }
        }
    }

    pub fn with_model(model: Arc<dyn ChatModel>) -> Self {
        match build_graph(model) {
            Ok(graph) => {
                info!("order workflow initialized");
                Self { graph: Some(graph) }
            }
            Err(err) => {
                error!("Error setting up order workflow: {err}");
                Self { graph: None }
            }
        }
    }

    pub fn is_available(&self) -> bool {
        self.graph.is_some()
    }

    pub async fn process_order(&self, order: &Order) -> Report<OrderOutcome> {
        let Some(graph) = &self.graph else {
            return Report::failed(FRAMEWORK, "Order workflow graph not available");
        };

        info!(order = %order.order_id, "processing order");
        match graph.invoke(OrderState::from_order(order)).await {
            Ok(state) => Report::completed(FRAMEWORK, OrderOutcome::from_state(state)),
            Err(err) => {
                error!(order = %order.order_id, "order processing failed: {err}");
                Report::failed(FRAMEWORK, err)
            }
        }
    }
}

pub fn sample_order(scenario: &str) -> Order {
    let item = |item_id: &str, name: &str, quantity: u32, price: u32| OrderItem {
        item_id: item_id.to_string(),
        name: name.to_string(),
        quantity,
        price,
    };
    let customer = |name: &str, email: &str, address: &str, payment_method: &str| CustomerInfo {
        name: name.to_string(),
        email: email.to_string(),
        address: address.to_string(),
        payment_method: payment_method.to_string(),
    };

    match scenario {
        "valid" => Order {
            order_id: "ORD_001".to_string(),
            items: vec![
                item("P001", "Laptop Pro", 1, 1200),
                item("P002", "Wireless Mouse", 2, 25),
            ],
            customer_info: Some(customer(
                "Alice Smith",
                "alice.smith@example.com",
                "123 Main St, Anytown, USA",
                "credit_card",
            )),
        },
        "suspicious" => Order {
            order_id: "ORD_002".to_string(),
            items: vec![item("P003", "High-End Graphics Card", 5, 800)],
            customer_info: Some(customer(
                "David Smith",
                "davidsmith123@protonmail.com",
                "999 Fake Address, Nowhere, CA",
                "prepaid_card",
            )),
        },
        "out_of_stock" => Order {
            order_id: "ORD_003".to_string(),
            items: vec![
                item("P004", "Limited Edition Collectible (unavailable)", 1, 500),
                item("P005", "Keyboard", 1, 100),
            ],
            customer_info: Some(customer(
                "Bob Johnson",
                "bob.j@example.com",
                "456 Oak Ave, Somewhere, TX",
                "paypal",
            )),
        },
        _ => Order::default(),
    }
}

pub async fn showcase(config: &Config) -> Result<(), ShowcaseError> {
    print_banner("STATE GRAPH: E-COMMERCE ORDER WORKFLOW");
    if !config.validate() {
        println!("{}", super::INVALID_CONFIG_MESSAGE);
        return Ok(());
    }

    let workflow = EcommerceWorkflow::new(config);
    for (label, scenario) in [
        ("Valid", "valid"),
        ("Suspicious", "suspicious"),
        ("Out-of-Stock", "out_of_stock"),
    ] {
        let order = sample_order(scenario);
        println!("\nProcessing {label} Order: {}", order.order_id);
        let report = workflow.process_order(&order).await;
        print_report(&report)?;
    }
    Ok(())
}
