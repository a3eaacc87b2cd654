//! Classifies a message into the category a destination handles it with.

use crate::errors::{Result, TransformError};
use crate::message::{EventType, Message};
use serde::Deserialize;

/// One event-type and subtype combination a destination knows how to shape.
///
/// `name` keys the mapping table. `event` is the lowercased track event name
/// the category answers to, and `standard_name` the destination-side name
/// that selects it when an alias points there (`AddToCart`, `Purchase`, ...).
#[derive(Debug, PartialEq, Eq)]
pub struct Category {
    pub name: &'static str,
    pub event: &'static str,
    pub standard_name: Option<&'static str>,
    pub standard: bool,
}

impl Category {
    pub const fn new(name: &'static str, event: &'static str) -> Self {
        Self {
            name,
            event,
            standard_name: None,
            standard: false,
        }
    }

    pub const fn standard(mut self, standard_name: Option<&'static str>) -> Self {
        self.standard = true;
        self.standard_name = standard_name;
        self
    }

    fn answers_to(&self, check: &str) -> bool {
        self.event.eq_ignore_ascii_case(check) || self.standard_name == Some(check)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct EventAlias {
    pub from: String,
    pub to: String,
}

/// Destination-configured renames applied to track event names.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct EventAliases(Vec<EventAlias>);

impl EventAliases {
    pub fn new(aliases: Vec<EventAlias>) -> Self {
        Self(aliases)
    }

    /// First alias whose `from` equals `event` ignoring case.
    pub fn resolve(&self, event: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|alias| alias.from.to_lowercase() == event.to_lowercase())
            .map(|alias| alias.to.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub event_type: EventType,
    pub category: &'static Category,
}

/// Per-destination routing table from event type (and track event name) to
/// a [`Category`]. Event types without a category are unsupported.
#[derive(Debug, Default)]
pub struct Dispatcher {
    identify: Option<&'static Category>,
    page: Option<&'static Category>,
    screen: Option<&'static Category>,
    track_default: Option<&'static Category>,
    track_events: Vec<&'static Category>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn identify(mut self, category: &'static Category) -> Self {
        self.identify = Some(category);
        self
    }

    pub fn page(mut self, category: &'static Category) -> Self {
        self.page = Some(category);
        self
    }

    pub fn screen(mut self, category: &'static Category) -> Self {
        self.screen = Some(category);
        self
    }

    /// Category for track events no specific category answers to.
    pub fn track(mut self, category: &'static Category) -> Self {
        self.track_default = Some(category);
        self
    }

    /// Specific track categories, tried in registration order.
    pub fn track_event(mut self, category: &'static Category) -> Self {
        self.track_events.push(category);
        self
    }

    pub fn classify(&self, message: &Message, aliases: &EventAliases) -> Result<Classification> {
        let event_type = message.event_type()?;

        let category = match event_type {
            EventType::Identify => self.identify,
            EventType::Page => self.page,
            EventType::Screen => self.screen,
            EventType::Track => self.classify_track(message.event().unwrap_or_default(), aliases),
        };

        let category = category
            .ok_or_else(|| TransformError::UnsupportedMessageType(event_type.to_string()))?;

        tracing::debug!(
            event_type = %event_type,
            category = category.name,
            "classified message"
        );

        Ok(Classification {
            event_type,
            category,
        })
    }

    fn classify_track(&self, event: &str, aliases: &EventAliases) -> Option<&'static Category> {
        let check = match aliases.resolve(event) {
            Some(to) => to.to_string(),
            None => event.to_lowercase(),
        };

        self.track_events
            .iter()
            .copied()
            .find(|category| category.answers_to(&check))
            .or(self.track_default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    static IDENTIFY: Category = Category::new("Identify", "identify");
    static PAGE: Category = Category::new("Page", "page");
    static PRODUCT_ADDED: Category = Category::new("ProductAdded", "product added").standard(Some("AddToCart"));
    static ORDER_COMPLETED: Category = Category::new("OrderCompleted", "order completed").standard(Some("Purchase"));
    static SIMPLE_TRACK: Category = Category::new("SimpleTrack", "simple track");

    fn dispatcher() -> Dispatcher {
        Dispatcher::new()
            .identify(&IDENTIFY)
            .page(&PAGE)
            .screen(&PAGE)
            .track(&SIMPLE_TRACK)
            .track_event(&PRODUCT_ADDED)
            .track_event(&ORDER_COMPLETED)
    }

    fn message(value: serde_json::Value) -> Message {
        Message::try_from(value).unwrap()
    }

    fn aliases(pairs: &[(&str, &str)]) -> EventAliases {
        EventAliases::new(
            pairs
                .iter()
                .map(|(from, to)| EventAlias {
                    from: from.to_string(),
                    to: to.to_string(),
                })
                .collect(),
        )
    }

    #[test]
    fn test_alias_selects_standard_category() {
        let classification = dispatcher()
            .classify(
                &message(json!({"type": "track", "event": "Product Added"})),
                &aliases(&[("product added", "AddToCart")]),
            )
            .unwrap();
        assert_eq!(classification.event_type, EventType::Track);
        assert_eq!(classification.category, &PRODUCT_ADDED);
    }

    #[test]
    fn test_unmatched_track_falls_back_to_default() {
        let classification = dispatcher()
            .classify(
                &message(json!({"type": "track", "event": "totally_custom"})),
                &EventAliases::default(),
            )
            .unwrap();
        assert_eq!(classification.category, &SIMPLE_TRACK);

        // Missing event name is also best-effort generic tracking
        let classification = dispatcher()
            .classify(&message(json!({"type": "track"})), &EventAliases::default())
            .unwrap();
        assert_eq!(classification.category, &SIMPLE_TRACK);
    }

    #[test]
    fn test_event_name_matches_ignoring_case_without_alias() {
        let classification = dispatcher()
            .classify(
                &message(json!({"type": "Track", "event": "Order Completed"})),
                &EventAliases::default(),
            )
            .unwrap();
        assert_eq!(classification.category, &ORDER_COMPLETED);
    }

    #[test]
    fn test_first_matching_alias_wins() {
        let table = aliases(&[("Checkout", "Purchase"), ("checkout", "AddToCart")]);
        assert_eq!(table.resolve("CHECKOUT"), Some("Purchase"));

        let classification = dispatcher()
            .classify(&message(json!({"type": "track", "event": "checkout"})), &table)
            .unwrap();
        assert_eq!(classification.category, &ORDER_COMPLETED);
    }

    #[test]
    fn test_screen_and_page_share_category() {
        let classification = dispatcher()
            .classify(&message(json!({"type": "screen", "name": "Home"})), &EventAliases::default())
            .unwrap();
        assert_eq!(classification.event_type, EventType::Screen);
        assert_eq!(classification.category, &PAGE);
    }

    #[test]
    fn test_type_errors() {
        let dispatcher = Dispatcher::new().identify(&IDENTIFY);

        assert!(matches!(
            dispatcher.classify(&message(json!({"event": "x"})), &EventAliases::default()),
            Err(TransformError::MissingType)
        ));
        assert!(matches!(
            dispatcher.classify(&message(json!({"type": "group"})), &EventAliases::default()),
            Err(TransformError::UnsupportedMessageType(t)) if t == "group"
        ));
        // Known type without a registered category
        assert!(matches!(
            dispatcher.classify(&message(json!({"type": "track", "event": "x"})), &EventAliases::default()),
            Err(TransformError::UnsupportedMessageType(t)) if t == "track"
        ));
    }

    #[test]
    fn test_aliases_deserialize_from_config_list() {
        let table: EventAliases =
            serde_json::from_value(json!([{"from": "Signed Up", "to": "CompleteRegistration"}])).unwrap();
        assert_eq!(table.resolve("signed up"), Some("CompleteRegistration"));
        assert_eq!(table.resolve("other"), None);
    }
}
