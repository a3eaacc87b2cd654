//! Metrics definitions for the destinations layer.

use shared::metrics_defs::{MetricDef, MetricType};

pub const TRANSFORM_SUCCEEDED: MetricDef = MetricDef {
    name: "transform.succeeded",
    metric_type: MetricType::Counter,
    description: "Number of messages transformed into request descriptors",
};

pub const TRANSFORM_FAILED: MetricDef = MetricDef {
    name: "transform.failed",
    metric_type: MetricType::Counter,
    description: "Number of messages whose transformation was aborted",
};

pub const TRANSFORM_DURATION: MetricDef = MetricDef {
    name: "transform.duration",
    metric_type: MetricType::Histogram,
    description: "Time to transform one message, remote calls included, in seconds",
};

pub const RECONCILE_CREATED: MetricDef = MetricDef {
    name: "reconcile.created",
    metric_type: MetricType::Counter,
    description: "Number of remote entities created during reconciliation",
};

pub const RECONCILE_LINKED: MetricDef = MetricDef {
    name: "reconcile.linked",
    metric_type: MetricType::Counter,
    description: "Number of remote entities linked to a primary entity",
};

pub const RECONCILE_PARTIAL_FAILURE: MetricDef = MetricDef {
    name: "reconcile.partial_failure",
    metric_type: MetricType::Counter,
    description: "Number of create or link calls that failed and were dropped",
};

pub const ALL_METRICS: &[MetricDef] = &[
    TRANSFORM_SUCCEEDED,
    TRANSFORM_FAILED,
    TRANSFORM_DURATION,
    RECONCILE_CREATED,
    RECONCILE_LINKED,
    RECONCILE_PARTIAL_FAILURE,
];
