use crate::errors::MappingError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// A dot-separated location inside a JSON document, e.g. `context.traits.email`.
///
/// Segments are matched as object keys. When the value being traversed is an
/// array, a numeric segment selects the item at that index, so
/// `properties.products.0.sku` reads the first product's sku.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Path {
    segments: Vec<String>,
}

impl Path {
    pub fn parse(path: &str) -> Result<Self, MappingError> {
        let path = path.trim();
        if path.is_empty() {
            return Err(MappingError::Configuration("empty path".to_string()));
        }

        let segments: Vec<String> = path.split('.').map(str::to_string).collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(MappingError::Configuration(format!(
                "path `{path}` contains an empty segment"
            )));
        }

        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Returns the value at this path, or `None` as soon as a segment is missing.
    pub fn lookup<'a>(&self, root: &'a Value) -> Option<&'a Value> {
        self.segments
            .iter()
            .try_fold(root, |current, segment| match current {
                Value::Object(map) => map.get(segment),
                Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
                _ => None,
            })
    }

    /// Writes `value` at this path, creating intermediate objects as needed.
    ///
    /// An intermediate value that is not an object is replaced, so a later
    /// write always wins over an earlier one.
    pub fn assign(&self, target: &mut Map<String, Value>, value: Value) {
        let Some((last, parents)) = self.segments.split_last() else {
            return;
        };

        let mut current = target;
        for segment in parents {
            let entry = current
                .entry(segment.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            let Some(map) = entry.as_object_mut() else {
                return;
            };
            current = map;
        }

        current.insert(last.clone(), value);
    }

    /// Whether `self` equals `prefix` or lies underneath it.
    pub fn starts_with(&self, prefix: &Path) -> bool {
        self.segments.starts_with(&prefix.segments)
    }
}

impl FromStr for Path {
    type Err = MappingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Path::parse(s)
    }
}

impl TryFrom<String> for Path {
    type Error = MappingError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Path::parse(&value)
    }
}

impl From<Path> for String {
    fn from(path: Path) -> Self {
        path.to_string()
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(s: &str) -> Path {
        Path::parse(s).unwrap()
    }

    #[test]
    fn test_parse_rejects_empty_paths() {
        assert!(matches!(
            Path::parse(""),
            Err(MappingError::Configuration(_))
        ));
        assert!(matches!(
            Path::parse("context..traits"),
            Err(MappingError::Configuration(_))
        ));
        assert!(matches!(
            Path::parse("traits."),
            Err(MappingError::Configuration(_))
        ));
        assert_eq!(path("context.traits.email").segments().len(), 3);
    }

    #[test]
    fn test_lookup_nested() {
        let message = json!({
            "context": {"traits": {"email": "a@b.com"}},
            "properties": {"products": [{"sku": "p-1"}, {"sku": "p-2"}]}
        });

        assert_eq!(
            path("context.traits.email").lookup(&message),
            Some(&json!("a@b.com"))
        );
        assert_eq!(
            path("properties.products.1.sku").lookup(&message),
            Some(&json!("p-2"))
        );
        assert_eq!(path("context.traits.phone").lookup(&message), None);
        // Traversing through a scalar yields nothing
        assert_eq!(path("context.traits.email.domain").lookup(&message), None);
        assert_eq!(path("properties.products.9.sku").lookup(&message), None);
    }

    #[test]
    fn test_lookup_returns_explicit_null() {
        let message = json!({"traits": {"email": null}});
        assert_eq!(path("traits.email").lookup(&message), Some(&Value::Null));
    }

    #[test]
    fn test_assign_creates_intermediate_objects() {
        let mut target = Map::new();
        path("contact.email").assign(&mut target, json!("a@b.com"));
        path("contact.name.first").assign(&mut target, json!("Jane"));
        path("flag").assign(&mut target, json!(true));

        assert_eq!(
            Value::Object(target),
            json!({
                "contact": {"email": "a@b.com", "name": {"first": "Jane"}},
                "flag": true
            })
        );
    }

    #[test]
    fn test_assign_last_write_wins() {
        let mut target = Map::new();
        path("contact").assign(&mut target, json!("scalar"));
        path("contact.email").assign(&mut target, json!("a@b.com"));
        assert_eq!(target["contact"], json!({"email": "a@b.com"}));

        path("contact.email").assign(&mut target, json!("c@d.com"));
        assert_eq!(target["contact"]["email"], json!("c@d.com"));
    }

    #[test]
    fn test_starts_with() {
        assert!(path("context.traits.email").starts_with(&path("context.traits")));
        assert!(path("context.traits").starts_with(&path("context.traits")));
        assert!(!path("context.trait").starts_with(&path("context.traits")));
    }

    #[test]
    fn test_serde_round_trip_as_string() {
        let parsed: Path = serde_json::from_value(json!("properties.revenue")).unwrap();
        assert_eq!(parsed, path("properties.revenue"));
        assert_eq!(serde_json::to_value(&parsed).unwrap(), json!("properties.revenue"));
        assert!(serde_json::from_value::<Path>(json!("")).is_err());
    }
}
