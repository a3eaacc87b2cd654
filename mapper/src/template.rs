use crate::errors::MappingError;
use serde::Deserialize;
use serde_json::Value;

/// The only variable a template may reference.
const VALUE_VARIABLE: &str = "value";

#[derive(Clone, Debug, PartialEq)]
enum Part {
    Literal(String),
    Value,
}

/// A string template with a single bound variable, e.g. `Visited {{value}} page`.
///
/// Templates support plain substitution only. Any placeholder other than
/// `{{value}}` is rejected when the template is parsed.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(try_from = "String")]
pub struct Template {
    parts: Vec<Part>,
}

impl Template {
    pub fn parse(source: &str) -> Result<Self, MappingError> {
        let mut parts = Vec::new();
        let mut rest = source;

        while let Some(start) = rest.find("{{") {
            if start > 0 {
                parts.push(Part::Literal(rest[..start].to_string()));
            }
            let after_open = &rest[start + 2..];
            let end = after_open.find("}}").ok_or_else(|| {
                MappingError::Configuration(format!("unterminated placeholder in template `{source}`"))
            })?;

            let variable = after_open[..end].trim();
            if variable != VALUE_VARIABLE {
                return Err(MappingError::Configuration(format!(
                    "template `{source}` references unknown variable `{variable}`"
                )));
            }
            parts.push(Part::Value);
            rest = &after_open[end + 2..];
        }

        if !rest.is_empty() {
            parts.push(Part::Literal(rest.to_string()));
        }

        Ok(Self { parts })
    }

    pub fn render(&self, value: &Value) -> String {
        let rendered_value = match value {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        };

        self.parts
            .iter()
            .map(|part| match part {
                Part::Literal(text) => text.as_str(),
                Part::Value => rendered_value.as_str(),
            })
            .collect()
    }
}

impl TryFrom<String> for Template {
    type Error = MappingError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Template::parse(&value)
    }
}
