use crate::dispatcher::Category;
use serde::Deserialize;

pub const IDENTIFY: Category = Category::new("ACIdentify", "identify");
pub const PAGE: Category = Category::new("ACPage", "page");
pub const SCREEN: Category = Category::new("ACScreen", "screen");
pub const TRACK: Category = Category::new("ACTrack", "track");

pub const CONTACT_SYNC_PATH: &str = "/api/3/contact/sync";
pub const TAGS_PATH: &str = "/api/3/tags";
pub const CONTACT_TAGS_PATH: &str = "/api/3/contactTags";
pub const FIELDS_PATH: &str = "/api/3/fields";
pub const FIELD_VALUES_PATH: &str = "/api/3/fieldValues";
pub const SITE_TRACKING_DOMAINS_PATH: &str = "/api/3/siteTrackingDomains";
pub const EVENT_TRACKING_EVENTS_PATH: &str = "/api/3/eventTrackingEvents";
pub const EVENT_TRACKING_URL: &str = "https://trackcmp.net/event";

pub const MAPPING_TABLES: &[(&str, &str)] = &[
    (IDENTIFY.name, include_str!("../../data/active_campaign/ACIdentify.json")),
    (PAGE.name, include_str!("../../data/active_campaign/ACPage.json")),
    (SCREEN.name, include_str!("../../data/active_campaign/ACScreen.json")),
    (TRACK.name, include_str!("../../data/active_campaign/ACTrack.json")),
];

/// Settings of one ActiveCampaign account.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveCampaignConfig {
    /// Account API url, e.g. `https://acct.api-us1.com`
    pub api_url: String,
    pub api_key: String,
    /// Account id used by event tracking
    #[serde(default)]
    pub actid: Option<String>,
    /// Event tracking key
    #[serde(default)]
    pub event_key: Option<String>,
}
