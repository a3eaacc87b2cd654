use crate::dispatcher::Category;
use mapper::Path;
use serde::Deserialize;

pub const IDENTIFY: Category = Category::new("SFIdentify", "identify");

pub const API_VERSION: &str = "50.0";
pub const TOKEN_REQUEST_URL: &str = "https://login.salesforce.com/services/oauth2/token";

pub const MAPPING_TABLES: &[(&str, &str)] = &[
    (IDENTIFY.name, include_str!("../../data/salesforce/SFIdentify.json")),
];

/// Trait paths never sent as custom `__c` fields.
pub const IGNORED_TRAITS: &str = include_str!("../../data/salesforce/SFIgnore.json");

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SalesforceConfig {
    pub user_name: String,
    pub password: String,
    /// Security token, appended to the password for the password grant
    #[serde(default)]
    pub initial_access_token: String,
    pub consumer_key: String,
    pub consumer_secret: String,
    #[serde(default)]
    pub custom_mappings: Vec<CustomMapping>,
}

/// Copies `properties.<from>` into the lead field `to`.
#[derive(Clone, Debug, Deserialize)]
pub struct CustomMapping {
    pub from: Path,
    pub to: String,
}
