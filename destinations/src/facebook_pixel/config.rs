use crate::dispatcher::{Category, EventAlias, EventAliases};
use serde::Deserialize;

pub const USER_DATA: Category = Category::new("FBPIXELUserData", "identify");
pub const COMMON: Category = Category::new("FBPIXELCommon", "common");
pub const PAGE: Category = Category::new("FBPIXELPage", "page");
pub const PRODUCT_LIST_VIEWED: Category =
    Category::new("FBPIXELProductListViewed", "product list viewed").standard(Some("ViewContent"));
// Sent as ViewContent, but an alias to ViewContent selects product list viewed
pub const PRODUCT_VIEWED: Category =
    Category::new("FBPIXELProductViewed", "product viewed").standard(None);
pub const PRODUCT_ADDED: Category =
    Category::new("FBPIXELProductAdded", "product added").standard(Some("AddToCart"));
pub const ORDER_COMPLETED: Category =
    Category::new("FBPIXELOrderCompleted", "order completed").standard(Some("Purchase"));
pub const PRODUCTS_SEARCHED: Category =
    Category::new("FBPIXELProductsSearched", "products searched").standard(Some("Search"));
pub const CHECKOUT_STARTED: Category =
    Category::new("FBPIXELCheckoutStarted", "checkout started").standard(Some("InitiateCheckout"));
pub const SIMPLE_TRACK: Category = Category::new("FBPIXELSimpleTrack", "simple track");

pub const GRAPH_API_URL: &str = "https://graph.facebook.com/v9.0";

/// Standard categories without a table only carry what their ecommerce
/// handler computes.
pub const MAPPING_TABLES: &[(&str, &str)] = &[
    (USER_DATA.name, include_str!("../../data/facebook_pixel/FBPIXELUserData.json")),
    (COMMON.name, include_str!("../../data/facebook_pixel/FBPIXELCommon.json")),
    (SIMPLE_TRACK.name, include_str!("../../data/facebook_pixel/FBPIXELSimpleTrack.json")),
    (
        PRODUCTS_SEARCHED.name,
        include_str!("../../data/facebook_pixel/FBPIXELProductsSearched.json"),
    ),
    (ORDER_COMPLETED.name, include_str!("../../data/facebook_pixel/FBPIXELOrder.json")),
    (CHECKOUT_STARTED.name, include_str!("../../data/facebook_pixel/FBPIXELOrder.json")),
];

/// Properties never sent as custom data unless whitelisted or hashed.
pub const DEFAULT_PII_PROPERTIES: &[&str] = &[
    "email",
    "firstName",
    "lastName",
    "firstname",
    "lastname",
    "first_name",
    "last_name",
    "gender",
    "city",
    "country",
    "phone",
    "state",
    "zip",
    "birthday",
];

#[derive(Clone, Debug, Deserialize)]
pub struct BlacklistedProperty {
    #[serde(rename = "blacklistPiiProperties")]
    pub property: String,
    /// Send a hash of the value instead of dropping it
    #[serde(rename = "blacklistPiiHash", default)]
    pub hash: bool,
}

#[derive(Clone, Debug, Deserialize)]
pub struct WhitelistedProperty {
    #[serde(rename = "whitelistPiiProperties")]
    pub property: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CustomProperty {
    #[serde(rename = "eventCustomProperties")]
    pub property: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FacebookPixelConfig {
    pub pixel_id: String,
    pub access_token: String,
    /// Identify calls are only sent with advanced matching on
    #[serde(default)]
    pub advanced_mapping: bool,
    #[serde(default)]
    pub events_to_events: EventAliases,
    /// Maps `properties.category` to a content type, matched exactly
    #[serde(default)]
    pub category_to_content: Vec<EventAlias>,
    #[serde(default)]
    pub blacklist_pii_properties: Vec<BlacklistedProperty>,
    #[serde(default)]
    pub whitelist_pii_properties: Vec<WhitelistedProperty>,
    #[serde(default)]
    pub event_custom_properties: Vec<CustomProperty>,
    /// `properties.value` or `properties.price`, the source of `value` for
    /// single product events
    #[serde(default)]
    pub value_field_identifier: Option<String>,
    #[serde(default, alias = "limitedDataUSage")]
    pub limited_data_usage: bool,
}
