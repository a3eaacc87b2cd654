//! Salesforce leads.
//!
//! Identify logs in with the password grant, looks the lead up by email and
//! either creates it or updates the existing one.

mod auth;
mod config;

pub use config::SalesforceConfig;

use crate::api::ApiClient;
use crate::dispatcher::{Dispatcher, EventAliases};
use crate::errors::{Result, TransformError};
use crate::handler::{Destination, MappingTables, parse_config};
use crate::message::{EventType, Message, is_set};
use crate::request::{BodyFormat, HttpMethod, RequestDescriptor};
use async_trait::async_trait;
use auth::Session;
use config::{API_VERSION, IDENTIFY, IGNORED_TRAITS, MAPPING_TABLES};
use mapper::{MappingError, MappingTable, Path, split_full_name};
use serde_json::{Map, Value};
use shared::transport::Transport;
use std::sync::Arc;

const DEFAULT_FIELD_VALUE: &str = "n/a";

pub struct Salesforce {
    transport: Arc<dyn Transport>,
    tables: MappingTables,
    ignored_traits: Vec<Path>,
    dispatcher: Dispatcher,
}

impl Salesforce {
    pub const NAME: &'static str = "SALESFORCE";

    pub fn new(transport: Arc<dyn Transport>) -> std::result::Result<Self, MappingError> {
        let ignored_traits = serde_json::from_str(IGNORED_TRAITS)
            .map_err(|e| MappingError::Configuration(format!("ignored traits: {e}")))?;
        Ok(Self {
            transport,
            tables: MappingTables::load(MAPPING_TABLES)?,
            ignored_traits,
            dispatcher: Dispatcher::new().identify(&IDENTIFY),
        })
    }

    /// Lead fields for an identify message, before custom mappings.
    fn lead(&self, message: &Message) -> Result<Map<String, Value>> {
        let table = self.tables.get(IDENTIFY.name)?;
        let mut lead: Map<String, Value> = table
            .construct(message.as_value())?
            .into_iter()
            .filter(|(_, value)| is_field_value(value))
            .collect();

        let name = context_traits(message)
            .and_then(|traits| traits.get("name"))
            .and_then(Value::as_str)
            .and_then(split_full_name);
        if let Some((first, last)) = name {
            lead.insert("FirstName".to_string(), Value::String(first.to_string()));
            lead.insert("LastName".to_string(), Value::String(last.to_string()));
        }

        for field in ["LastName", "Company"] {
            let blank = lead
                .get(field)
                .and_then(Value::as_str)
                .is_none_or(|value| value.trim().is_empty());
            if blank {
                lead.insert(field.to_string(), Value::String(DEFAULT_FIELD_VALUE.to_string()));
            }
        }

        for (key, value) in context_traits(message).into_iter().flatten() {
            if !is_set(value) || self.is_known_trait(table, key) {
                continue;
            }
            lead.insert(format!("{key}__c"), value.clone());
        }
        Ok(lead)
    }

    /// Whether a trait is read by the mapping table or deliberately ignored.
    fn is_known_trait(&self, table: &MappingTable, key: &str) -> bool {
        let Ok(path) = Path::parse(&format!("context.traits.{key}")) else {
            return true;
        };
        table.references(&path) || self.ignored_traits.iter().any(|ignored| path.starts_with(ignored))
    }

    /// Endpoint that creates the lead, or updates it when one with the same
    /// email already exists.
    async fn lead_endpoint(&self, session: &Session, email: &str) -> Result<String> {
        let sobject = format!("{}/services/data/v{API_VERSION}/sobjects/Lead", session.instance_url);
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("q", email)
            .append_pair("sobject", "Lead")
            .append_pair("Lead.fields", "id")
            .finish();

        let response = ApiClient::new(self.transport.clone(), &session.instance_url, session.headers())
            .get(&format!("/services/data/v{API_VERSION}/parameterizedSearch/?{query}"))
            .await
            .map_err(|e| TransformError::fetch("lead", e))?;

        let existing = response
            .data
            .get("searchRecords")
            .and_then(Value::as_array)
            .and_then(|records| records.first())
            .and_then(|record| record.get("Id"))
            .and_then(Value::as_str);
        match existing {
            Some(id) => {
                tracing::debug!(lead_id = id, "updating existing lead");
                Ok(format!("{sobject}/{id}?_HttpMethod=PATCH"))
            }
            None => Ok(sobject),
        }
    }

    async fn identify(&self, message: &Message, config: &SalesforceConfig) -> Result<RequestDescriptor> {
        let lead = self.lead(message)?;
        let email = lead
            .get("Email")
            .and_then(Value::as_str)
            .ok_or_else(|| TransformError::InvalidEvent("Email must be a string".to_string()))?;

        let session = auth::login(self.transport.clone(), config).await?;
        let endpoint = self.lead_endpoint(&session, email).await?;

        let mut body = custom_fields(message, config);
        body.extend(lead);

        Ok(RequestDescriptor::builder(HttpMethod::Post, endpoint)
            .header("Content-Type", "application/json")
            .header("Authorization", session.authorization.as_str())
            .body(BodyFormat::Json, body)
            .user_id(message.anonymous_id())
            .anonymous_id(message.anonymous_id())
            .status_code(200)
            .build())
    }
}

#[async_trait]
impl Destination for Salesforce {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn process(&self, message: &Message, config: &Value) -> Result<Vec<RequestDescriptor>> {
        let config: SalesforceConfig = parse_config(Self::NAME, config)?;
        let classification = self.dispatcher.classify(message, &EventAliases::default())?;

        match classification.event_type {
            EventType::Identify => Ok(vec![self.identify(message, &config).await?]),
            other => Err(TransformError::UnsupportedMessageType(other.to_string())),
        }
    }
}

fn context_traits(message: &Message) -> Option<&Map<String, Value>> {
    message.as_value().pointer("/context/traits").and_then(Value::as_object)
}

/// Lead fields are scalars. Blank strings are left out.
fn is_field_value(value: &Value) -> bool {
    match value {
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(_) | Value::Object(_) => false,
        scalar => is_set(scalar),
    }
}

/// Fields copied from event properties through `customMappings`.
fn custom_fields(message: &Message, config: &SalesforceConfig) -> Map<String, Value> {
    let Some(properties) = message.as_value().get("properties") else {
        return Map::new();
    };
    config
        .custom_mappings
        .iter()
        .filter_map(|mapping| {
            let value = mapping.from.lookup(properties)?;
            Some((mapping.to.clone(), value.clone()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::MockTransport;
    use http::{Method, StatusCode};
    use serde_json::json;

    const TOKEN_URL: &str = "https://login.salesforce.com/services/oauth2/token?username=ops%40example.com&password=pwtok&client_id=ck&client_secret=cs&grant_type=password";
    const INSTANCE: &str = "https://eu1.salesforce.com";
    const SEARCH_URL: &str = "https://eu1.salesforce.com/services/data/v50.0/parameterizedSearch/?q=a%40b.com&sobject=Lead&Lead.fields=id";
    const LEAD_URL: &str = "https://eu1.salesforce.com/services/data/v50.0/sobjects/Lead";

    fn config() -> Value {
        json!({
            "userName": "ops@example.com",
            "password": "pw",
            "initialAccessToken": "tok",
            "consumerKey": "ck",
            "consumerSecret": "cs",
            "customMappings": [{"from": "plan.tier", "to": "Tier__c"}, {"from": "missing", "to": "Gone__c"}]
        })
    }

    fn message(value: Value) -> Message {
        Message::try_from(value).unwrap()
    }

    fn org(search_records: Value) -> MockTransport {
        MockTransport::new()
            .on(
                Method::POST,
                TOKEN_URL,
                StatusCode::OK,
                json!({"access_token": "abc", "instance_url": INSTANCE}),
            )
            .on(Method::GET, SEARCH_URL, StatusCode::OK, json!({"searchRecords": search_records}))
    }

    fn destination(transport: MockTransport) -> Salesforce {
        Salesforce::new(Arc::new(transport)).unwrap()
    }

    #[test]
    fn test_lead_splits_name() {
        let destination = destination(MockTransport::new());
        let msg = message(json!({
            "type": "identify",
            "context": {"traits": {"email": "a@b.com", "name": "Jane Doe"}}
        }));

        let lead = destination.lead(&msg).unwrap();
        assert_eq!(lead["Email"], "a@b.com");
        assert_eq!(lead["FirstName"], "Jane");
        assert_eq!(lead["LastName"], "Doe");
        assert_eq!(lead["Company"], DEFAULT_FIELD_VALUE);
    }

    #[test]
    fn test_lead_fields() {
        let destination = destination(MockTransport::new());
        let msg = message(json!({
            "type": "identify",
            "context": {"traits": {
                "email": "a@b.com",
                "lastName": "   ",
                "company": "Acme",
                "title": "",
                "rating": 0,
                "address": {"city": "Oslo", "zone": "x"},
                "favoriteColor": "green",
                "optedOut": false,
                "name": "Jane"
            }}
        }));

        let lead = destination.lead(&msg).unwrap();
        assert_eq!(
            Value::Object(lead),
            json!({
                "Email": "a@b.com",
                "Company": "Acme",
                "City": "Oslo",
                "FirstName": "Jane",
                "LastName": "Jane",
                "favoriteColor__c": "green"
            })
        );
    }

    #[test]
    fn test_lead_requires_email() {
        let destination = destination(MockTransport::new());
        let msg = message(json!({"type": "identify", "context": {"traits": {"name": "Jane Doe"}}}));
        assert!(matches!(
            destination.lead(&msg),
            Err(TransformError::Mapping(MappingError::MissingRequiredField { .. }))
        ));
    }

    #[tokio::test]
    async fn test_identify_creates_lead() {
        let transport = Arc::new(org(json!([])));
        let destination = Salesforce::new(transport.clone()).unwrap();
        let msg = message(json!({
            "type": "identify",
            "anonymousId": "anon-1",
            "properties": {"plan": {"tier": "gold"}},
            "context": {"traits": {"email": "a@b.com", "name": "Jane Doe", "company": "Acme"}}
        }));

        let requests = destination.process(&msg, &config()).await.unwrap();
        assert_eq!(requests.len(), 1);

        let request = &requests[0];
        assert_eq!(request.endpoint, LEAD_URL);
        assert_eq!(request.method, HttpMethod::Post);
        assert_eq!(request.headers["Authorization"], "Bearer abc");
        assert_eq!(request.user_id.as_deref(), Some("anon-1"));
        assert_eq!(request.anonymous_id.as_deref(), Some("anon-1"));
        assert_eq!(
            Value::Object(request.body.json.clone()),
            json!({
                "Tier__c": "gold",
                "Email": "a@b.com",
                "Company": "Acme",
                "FirstName": "Jane",
                "LastName": "Doe"
            })
        );

        let searches = transport.calls_to(Method::GET, SEARCH_URL);
        assert_eq!(searches.len(), 1);
        assert_eq!(searches[0].headers["Authorization"], "Bearer abc");
    }

    #[tokio::test]
    async fn test_identify_updates_existing_lead() {
        let destination = destination(org(json!([{"Id": "00Q1"}, {"Id": "00Q2"}])));
        let msg = message(json!({"type": "identify", "context": {"traits": {"email": "a@b.com"}}}));

        let requests = destination.process(&msg, &config()).await.unwrap();
        assert_eq!(requests[0].endpoint, format!("{LEAD_URL}/00Q1?_HttpMethod=PATCH"));
        assert_eq!(requests[0].method, HttpMethod::Post);
    }

    #[tokio::test]
    async fn test_identify_fails_when_lead_search_fails() {
        let transport = MockTransport::new()
            .on(
                Method::POST,
                TOKEN_URL,
                StatusCode::OK,
                json!({"access_token": "abc", "instance_url": INSTANCE}),
            )
            .fail(Method::GET, SEARCH_URL, None);
        let msg = message(json!({"type": "identify", "context": {"traits": {"email": "a@b.com"}}}));

        let result = destination(transport).process(&msg, &config()).await;
        assert!(matches!(result, Err(TransformError::RemoteFetch { .. })));
    }

    #[tokio::test]
    async fn test_only_identify_is_supported() {
        let transport = Arc::new(org(json!([])));
        let destination = Salesforce::new(transport.clone()).unwrap();

        let result = destination
            .process(&message(json!({"type": "track", "event": "Signed Up"})), &config())
            .await;
        assert!(matches!(result, Err(TransformError::UnsupportedMessageType(t)) if t == "track"));
        assert!(transport.calls().is_empty());
    }
}
