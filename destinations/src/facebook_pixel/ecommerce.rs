//! Custom data for the standard ecommerce events.

use crate::dispatcher::EventAlias;
use crate::errors::{Result, TransformError};
use crate::message::{Message, is_set};
use serde_json::{Map, Value, json};

const PRODUCT_ID_REQUIRED: &str = "Product id is required. Event not sent";

fn first_set<'a>(object: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().filter_map(|key| object.get(*key)).find(|value| is_set(value))
}

fn properties(message: &Message) -> Map<String, Value> {
    message.properties().cloned().unwrap_or_default()
}

/// Amount rounded to two decimals. Unset or non-numeric amounts are 0.
pub fn format_revenue(amount: Option<&Value>) -> Value {
    let amount = match amount {
        Some(Value::Number(n)) => n.as_f64().unwrap_or_default(),
        Some(Value::String(s)) => s.trim().parse::<f64>().unwrap_or_default(),
        _ => 0.0,
    };
    let rounded = (amount * 100.0).round() / 100.0;
    if rounded.fract() == 0.0 && rounded.abs() < 1e15 {
        json!(rounded as i64)
    } else {
        json!(rounded)
    }
}

/// Content type of the event.
///
/// An explicit `integrations.FacebookPixel.contentType` wins. Otherwise the
/// product category (from the properties or the first product) is looked up
/// in `category_to_content`, falling back to `default`.
pub fn content_type(message: &Message, default: &str, category_to_content: &[EventAlias]) -> Value {
    let explicit = message
        .as_value()
        .pointer("/integrations/FacebookPixel/contentType")
        .filter(|value| is_set(value));
    if let Some(explicit) = explicit {
        return explicit.clone();
    }

    let properties = properties(message);
    let category = properties
        .get("category")
        .filter(|value| is_set(value))
        .or_else(|| {
            properties
                .get("products")
                .and_then(Value::as_array)
                .and_then(|products| products.first())
                .and_then(|product| product.get("category"))
        })
        .and_then(Value::as_str);

    category
        .and_then(|category| category_to_content.iter().find(|map| map.from == category))
        .map(|map| map.to.as_str())
        .filter(|to| !to.is_empty())
        .map_or_else(|| json!(default), |to| json!(to))
}

fn content(id: Value, quantity: Option<&Value>, item_price: Option<&Value>) -> Value {
    let mut content = Map::new();
    content.insert("id".to_string(), id);
    if let Some(quantity) = quantity.filter(|q| !q.is_null()) {
        content.insert("quantity".to_string(), quantity.clone());
    }
    if let Some(price) = item_price.filter(|p| !p.is_null()) {
        content.insert("item_price".to_string(), price.clone());
    }
    Value::Object(content)
}

pub fn product_list_viewed(message: &Message, category_to_content: &[EventAlias]) -> Result<Map<String, Value>> {
    let properties = properties(message);
    let mut content_ids = Vec::new();
    let mut contents = Vec::new();

    if let Some(products) = properties.get("products").and_then(Value::as_array) {
        for product in products {
            let product = product.as_object().ok_or_else(|| {
                TransformError::InvalidEvent("Product is not an object. Event not sent".to_string())
            })?;
            if let Some(id) = product.get("product_id").filter(|id| is_set(id)) {
                content_ids.push(id.clone());
                contents.push(content(id.clone(), properties.get("quantity"), None));
            }
        }
    }

    let default_type = if content_ids.is_empty() {
        let id = properties
            .get("category")
            .filter(|c| is_set(c))
            .cloned()
            .ok_or_else(|| TransformError::InvalidEvent(PRODUCT_ID_REQUIRED.to_string()))?;
        content_ids.push(id.clone());
        contents.push(content(id, Some(&json!(1)), None));
        "product_group"
    } else {
        "product"
    };

    let mut custom = Map::new();
    custom.insert("content_ids".to_string(), Value::Array(content_ids));
    custom.insert(
        "content_type".to_string(),
        content_type(message, default_type, category_to_content),
    );
    custom.insert("contents".to_string(), Value::Array(contents));
    Ok(custom)
}

/// Product viewed and product added.
pub fn product(
    message: &Message,
    category_to_content: &[EventAlias],
    value_field_identifier: Option<&str>,
) -> Result<Map<String, Value>> {
    let properties = properties(message);
    let id = first_set(&properties, &["product_id", "id", "sku"])
        .cloned()
        .ok_or_else(|| TransformError::InvalidEvent(PRODUCT_ID_REQUIRED.to_string()))?;

    let value = if value_field_identifier == Some("properties.value") {
        format_revenue(properties.get("value"))
    } else {
        format_revenue(properties.get("price"))
    };

    let mut custom = Map::new();
    custom.insert("content_ids".to_string(), json!([id]));
    custom.insert(
        "content_type".to_string(),
        content_type(message, "product", category_to_content),
    );
    custom.insert(
        "content_name".to_string(),
        first_set(&properties, &["product_name", "name"])
            .cloned()
            .unwrap_or_else(|| json!("")),
    );
    custom.insert(
        "content_category".to_string(),
        first_set(&properties, &["category"]).cloned().unwrap_or_else(|| json!("")),
    );
    custom.insert("currency".to_string(), currency(&properties));
    custom.insert("value".to_string(), value);
    custom.insert(
        "contents".to_string(),
        json!([content(id, properties.get("quantity"), properties.get("price"))]),
    );
    Ok(custom)
}

/// Order completed and checkout started.
pub fn order(message: &Message, category_to_content: &[EventAlias]) -> Result<Map<String, Value>> {
    let properties = properties(message);
    let products = properties
        .get("products")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut content_ids = Vec::with_capacity(products.len());
    let mut contents = Vec::with_capacity(products.len());
    for product in &products {
        let product = product.as_object().cloned().unwrap_or_default();
        let id = first_set(&product, &["product_id", "sku", "id"])
            .cloned()
            .ok_or_else(|| TransformError::InvalidEvent(PRODUCT_ID_REQUIRED.to_string()))?;
        content_ids.push(id.clone());
        contents.push(content(id, product.get("quantity"), product.get("price")));
    }

    let mut custom = Map::new();
    if let Some(category) = properties.get("category").filter(|c| !c.is_null()) {
        custom.insert("content_category".to_string(), category.clone());
    }
    custom.insert("num_items".to_string(), json!(content_ids.len()));
    custom.insert("content_ids".to_string(), Value::Array(content_ids));
    custom.insert(
        "content_type".to_string(),
        content_type(message, "product", category_to_content),
    );
    custom.insert("currency".to_string(), currency(&properties));
    custom.insert("value".to_string(), format_revenue(properties.get("revenue")));
    custom.insert("contents".to_string(), Value::Array(contents));
    Ok(custom)
}

pub fn currency(properties: &Map<String, Value>) -> Value {
    first_set(properties, &["currency"])
        .cloned()
        .unwrap_or_else(|| json!("USD"))
}
