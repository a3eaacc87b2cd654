use crate::errors::MappingError;
use crate::path::Path;
use crate::resolver::{SourceKeys, resolve};
use crate::template::Template;
use serde::Deserialize;
use serde_json::{Map, Value};

/// One entry of a mapping table.
///
/// ```json
/// {
///   "sourceKeys": ["userId", "context.traits.userId", "anonymousId"],
///   "destKey": "uniqueid",
///   "required": true,
///   "template": "user-{{value}}"
/// }
/// ```
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MappingRule {
    pub source_keys: SourceKeys,
    pub dest_key: Path,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub template: Option<Template>,
}

impl MappingRule {
    pub fn new(source_keys: SourceKeys, dest_key: Path) -> Self {
        Self {
            source_keys,
            dest_key,
            required: false,
            template: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_template(mut self, template: Template) -> Self {
        self.template = Some(template);
        self
    }
}

/// Ordered list of mapping rules, validated when the table is built.
///
/// When two rules write the same destination key the later one wins.
/// Tables are expected not to contain such collisions.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MappingTable {
    rules: Vec<MappingRule>,
}

impl MappingTable {
    pub fn new(rules: Vec<MappingRule>) -> Result<Self, MappingError> {
        for rule in &rules {
            rule.source_keys.validate().map_err(|e| match e {
                MappingError::Configuration(reason) => {
                    MappingError::Configuration(format!("rule for `{}`: {reason}", rule.dest_key))
                }
                other => other,
            })?;
        }
        Ok(Self { rules })
    }

    /// Parses a table from its JSON representation (an array of rules).
    pub fn from_json(json: &str) -> Result<Self, MappingError> {
        let rules: Vec<MappingRule> = serde_json::from_str(json)
            .map_err(|e| MappingError::Configuration(format!("malformed mapping table: {e}")))?;
        Self::new(rules)
    }

    pub fn rules(&self) -> &[MappingRule] {
        &self.rules
    }

    /// Whether any rule reads from `prefix` or a path underneath it.
    pub fn references(&self, prefix: &Path) -> bool {
        self.rules
            .iter()
            .flat_map(|rule| rule.source_keys.paths())
            .any(|path| path.starts_with(prefix))
    }

    /// Builds an output record from `message`.
    ///
    /// Unresolved optional rules leave their destination key absent. An
    /// unresolved required rule fails the whole construction.
    pub fn construct(&self, message: &Value) -> Result<Map<String, Value>, MappingError> {
        let mut payload = Map::new();

        for rule in &self.rules {
            match resolve(message, &rule.source_keys)? {
                Some(value) => {
                    let value = match &rule.template {
                        Some(template) => Value::String(template.render(value)),
                        None => value.clone(),
                    };
                    rule.dest_key.assign(&mut payload, value);
                }
                None if rule.required => {
                    return Err(MappingError::MissingRequiredField {
                        source_keys: rule.source_keys.clone(),
                    });
                }
                None => {
                    tracing::trace!(dest_key = %rule.dest_key, "optional mapping unresolved");
                }
            }
        }

        Ok(payload)
    }
}

/// Builds an output record from `message` using `table`.
pub fn construct(message: &Value, table: &MappingTable) -> Result<Map<String, Value>, MappingError> {
    table.construct(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_construct_from_json_table() {
        let table = MappingTable::from_json(
            r#"[
                {"sourceKeys": ["userId", "context.traits.userId", "anonymousId"], "destKey": "uniqueid", "required": true},
                {"sourceKeys": "event", "destKey": "eventName", "required": true},
                {"sourceKeys": "properties.page", "destKey": "title", "template": "Visited {{value}} page"},
                {"sourceKeys": "properties.revenue", "destKey": "order.total"},
                {"sourceKeys": "properties.coupon", "destKey": "order.coupon"}
            ]"#,
        )
        .unwrap();

        let message = json!({
            "type": "track",
            "event": "Order Completed",
            "anonymousId": "anon-1",
            "properties": {"page": "Checkout", "revenue": 12.5}
        });

        let payload = table.construct(&message).unwrap();
        assert_eq!(
            Value::Object(payload),
            json!({
                "uniqueid": "anon-1",
                "eventName": "Order Completed",
                "title": "Visited Checkout page",
                "order": {"total": 12.5}
            })
        );
    }

    #[test]
    fn test_unresolved_optional_key_is_absent() {
        let table = MappingTable::from_json(
            r#"[{"sourceKeys": ["traits.phone", "context.traits.phone"], "destKey": "phone"}]"#,
        )
        .unwrap();

        let payload = table
            .construct(&json!({"context": {"traits": {"phone": null}}}))
            .unwrap();
        assert!(!payload.contains_key("phone"));
        assert!(payload.is_empty());
    }

    #[test]
    fn test_missing_required_field() {
        let table = MappingTable::from_json(
            r#"[
                {"sourceKeys": "event", "destKey": "eventName"},
                {"sourceKeys": ["context.traits.email", "traits.email"], "destKey": "Email", "required": true}
            ]"#,
        )
        .unwrap();

        let err = table
            .construct(&json!({"event": "x", "traits": {"email": null}}))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            r#"Missing required value from ["context.traits.email","traits.email"]"#
        );
        assert!(matches!(err, MappingError::MissingRequiredField { .. }));

        // One non-null candidate is enough
        let payload = table
            .construct(&json!({"traits": {"email": "a@b.com"}}))
            .unwrap();
        assert_eq!(payload["Email"], json!("a@b.com"));
    }

    #[test]
    fn test_later_rule_overwrites_same_dest_key() {
        let table = MappingTable::from_json(
            r#"[
                {"sourceKeys": "context.traits.name", "destKey": "name"},
                {"sourceKeys": "properties.name", "destKey": "name"}
            ]"#,
        )
        .unwrap();

        let payload = table
            .construct(&json!({
                "context": {"traits": {"name": "from traits"}},
                "properties": {"name": "from properties"}
            }))
            .unwrap();
        assert_eq!(payload["name"], json!("from properties"));
    }

    #[test]
    fn test_load_time_validation() {
        assert!(matches!(
            MappingTable::from_json(r#"[{"sourceKeys": [], "destKey": "x"}]"#),
            Err(MappingError::Configuration(_))
        ));
        assert!(matches!(
            MappingTable::from_json(r#"[{"sourceKeys": 7, "destKey": "x"}]"#),
            Err(MappingError::Configuration(_))
        ));
        assert!(matches!(
            MappingTable::from_json(r#"[{"sourceKeys": "event", "destKey": ""}]"#),
            Err(MappingError::Configuration(_))
        ));
        assert!(matches!(
            MappingTable::from_json(
                r#"[{"sourceKeys": "event", "destKey": "x", "template": "{{other}}"}]"#
            ),
            Err(MappingError::Configuration(_))
        ));
        assert!(matches!(
            MappingTable::from_json(r#"{"sourceKeys": "event", "destKey": "x"}"#),
            Err(MappingError::Configuration(_))
        ));
    }

    #[test]
    fn test_programmatic_rules() {
        let rule = MappingRule::new(
            SourceKeys::Single(Path::parse("properties.url").unwrap()),
            Path::parse("page").unwrap(),
        )
        .required()
        .with_template(Template::parse("url:{{value}}").unwrap());
        let table = MappingTable::new(vec![rule]).unwrap();

        let payload = construct(&json!({"properties": {"url": "/home"}}), &table).unwrap();
        assert_eq!(payload["page"], json!("url:/home"));

        let empty = MappingRule::new(SourceKeys::Candidates(vec![]), Path::parse("x").unwrap());
        assert!(matches!(
            MappingTable::new(vec![empty]),
            Err(MappingError::Configuration(_))
        ));
    }

    #[test]
    fn test_references() {
        let table = MappingTable::from_json(
            r#"[
                {"sourceKeys": "context.traits.email", "destKey": "Email"},
                {"sourceKeys": ["context.traits.company.name", "traits.company"], "destKey": "Company"}
            ]"#,
        )
        .unwrap();

        assert!(table.references(&Path::parse("context.traits.email").unwrap()));
        assert!(table.references(&Path::parse("context.traits.company").unwrap()));
        assert!(!table.references(&Path::parse("context.traits.phone").unwrap()));
    }
}
