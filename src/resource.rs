//! Resource objects logged by e2e tests
//!
//! Tests dump the objects they created so a failing run can be traced back
//! to the exact Route/Configuration/Service/Revision that was deployed.

use crate::logging::Logger;
use kube::core::{ApiResource, DynamicObject, GroupVersionKind};
use serde::Serialize;

/// API group of the serving resources
pub const SERVING_GROUP: &str = "serving.knative.dev";

/// API version of the serving resources
pub const SERVING_VERSION: &str = "v1";

/// The serving resources created by a single test
#[derive(Serialize, Clone, Debug, Default)]
pub struct ResourceObjects {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route: Option<DynamicObject>,

    #[serde(rename = "config", skip_serializing_if = "Option::is_none")]
    pub configuration: Option<DynamicObject>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<DynamicObject>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision: Option<DynamicObject>,
}

impl ResourceObjects {
    pub fn with_route(mut self, route: DynamicObject) -> Self {
        self.route = Some(route);
        self
    }

    pub fn with_configuration(mut self, configuration: DynamicObject) -> Self {
        self.configuration = Some(configuration);
        self
    }

    pub fn with_service(mut self, service: DynamicObject) -> Self {
        self.service = Some(service);
        self
    }

    pub fn with_revision(mut self, revision: DynamicObject) -> Self {
        self.revision = Some(revision);
        self
    }

    /// True when no sub-resource has been recorded
    pub fn is_empty(&self) -> bool {
        self.route.is_none()
            && self.configuration.is_none()
            && self.service.is_none()
            && self.revision.is_none()
    }
}

/// API resource for a serving kind (e.g. "Route")
pub fn serving_resource(kind: &str) -> ApiResource {
    ApiResource::from_gvk(&GroupVersionKind::gvk(SERVING_GROUP, SERVING_VERSION, kind))
}

/// Empty serving object of the given kind, named and namespaced
pub fn serving_object(kind: &str, name: &str, namespace: &str) -> DynamicObject {
    DynamicObject::new(name, &serving_resource(kind)).within(namespace)
}

/// Log the resource object as JSON
///
/// Serialization failures are logged in place of the value and never
/// propagated. Exactly one line is written per call.
pub fn log_resource_object<T>(logger: &dyn Logger, value: &T)
where
    T: Serialize + ?Sized,
{
    match serde_json::to_string(value) {
        Ok(json) => logger.info(&format!("resource {}", json)),
        Err(e) => logger.info(&format!(
            "Failed to create json from resource object: {}",
            e
        )),
    }
}

#[cfg(test)]
#[path = "resource_test.rs"]
mod tests;
