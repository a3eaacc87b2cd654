//! Turns normalized analytics messages into request descriptors for
//! third-party APIs.
//!
//! Each destination adapter maps a [`Message`] through its embedded mapping
//! tables and, where the API needs it, reconciles remote state (tags, event
//! definitions, leads) through a [`Transport`] before describing the final
//! request. Nothing is sent here: the returned [`RequestDescriptor`]s are
//! delivered by the caller.

pub mod active_campaign;
pub mod api;
pub mod dispatcher;
pub mod errors;
pub mod facebook_pixel;
pub mod handler;
pub mod hubspot;
pub mod message;
pub mod metrics_defs;
pub mod reconciler;
pub mod request;
pub mod salesforce;

#[cfg(test)]
mod testutils;

pub use errors::{Result, TransformError};
pub use handler::Destination;
pub use message::{EventType, Message};
pub use request::RequestDescriptor;

use active_campaign::ActiveCampaign;
use facebook_pixel::FacebookPixel;
use hubspot::HubSpot;
use metrics_defs::{TRANSFORM_DURATION, TRANSFORM_FAILED, TRANSFORM_SUCCEEDED};
use salesforce::Salesforce;
use serde::Deserialize;
use serde_json::Value;
use shared::transport::{HttpTransport, Transport};
use shared::{counter, histogram};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// One message addressed to one configured destination.
#[derive(Clone, Debug, Deserialize)]
pub struct TransformEvent {
    pub message: Message,
    pub destination: DestinationDefinition,
}

#[derive(Clone, Debug, Deserialize)]
pub struct DestinationDefinition {
    /// Adapter name, e.g. `HS` or `FACEBOOK_PIXEL`
    pub name: String,
    #[serde(default, alias = "Config")]
    pub config: Value,
}

/// All destination adapters, constructed once and shared across messages.
pub struct Transformer {
    destinations: HashMap<&'static str, Box<dyn Destination>>,
}

impl Transformer {
    /// Builds every adapter, validating their mapping tables.
    pub fn new(transport: Arc<dyn Transport>) -> Result<Self> {
        let adapters: Vec<Box<dyn Destination>> = vec![
            Box::new(ActiveCampaign::new(transport.clone())?),
            Box::new(FacebookPixel::new()?),
            Box::new(HubSpot::new(transport.clone())?),
            Box::new(Salesforce::new(transport)?),
        ];
        let destinations = adapters
            .into_iter()
            .map(|destination| (destination.name(), destination))
            .collect();
        Ok(Self { destinations })
    }

    /// Adapters talking to the real APIs over HTTP.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let transport = HttpTransport::new(timeout)?;
        Self::new(Arc::new(transport))
    }

    /// Names of the registered destinations, sorted.
    pub fn destinations(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.destinations.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Transforms one event with the adapter named by `destination.name`.
    ///
    /// The adapters and their mapping tables are built once in [`Transformer::new`]
    /// and reused for every event.
    pub async fn process(&self, event: &TransformEvent) -> Result<Vec<RequestDescriptor>> {
        let name = event.destination.name.as_str();
        let destination = self.destinations.get(name).ok_or_else(|| {
            TransformError::InvalidDestinationConfig(format!("unknown destination `{name}`"))
        })?;

        let start = Instant::now();
        let result = destination.process(&event.message, &event.destination.config).await;
        histogram!(TRANSFORM_DURATION, "destination" => destination.name())
            .record(start.elapsed().as_secs_f64());

        match &result {
            Ok(requests) => {
                counter!(TRANSFORM_SUCCEEDED, "destination" => destination.name()).increment(1);
                tracing::debug!(destination = name, requests = requests.len(), "transformed message");
            }
            Err(e) => {
                counter!(TRANSFORM_FAILED, "destination" => destination.name()).increment(1);
                tracing::warn!(destination = name, error = %e, "failed to transform message");
            }
        }
        result
    }
}
