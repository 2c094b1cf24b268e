use chrono::{DateTime, Utc};
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Node, PersistentVolume, PersistentVolumeClaim, Pod, Secret, Service};
use k8s_openapi::api::networking::v1::Ingress;

/// Uniform view over a listable resource: what the selection pipeline needs and nothing more.
pub trait Cell {
    fn name(&self) -> &str;
    fn created(&self) -> DateTime<Utc>;
}

macro_rules! object_meta_cell {
    ($($kind:ty),+ $(,)?) => {
        $(
            impl Cell for $kind {
                fn name(&self) -> &str { self.metadata.name.as_deref().unwrap_or("") }
                fn created(&self) -> DateTime<Utc> {
                    self.metadata.creation_timestamp.as_ref().map(|t| t.0).unwrap_or_else(crate::unset_creation)
                }
            }
        )+
    };
}

object_meta_cell!(
    Deployment,
    StatefulSet,
    DaemonSet,
    Pod,
    Service,
    Ingress,
    PersistentVolume,
    PersistentVolumeClaim,
    Namespace,
    Node,
    ConfigMap,
    Secret,
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_name_and_timestamp_from_metadata() {
        let d: Deployment = serde_json::from_value(serde_json::json!({
            "metadata": { "name": "web", "creationTimestamp": "2024-03-01T10:00:00Z" }
        }))
        .unwrap();
        assert_eq!(d.name(), "web");
        assert_eq!(d.created().to_rfc3339(), "2024-03-01T10:00:00+00:00");
    }

    #[test]
    fn missing_fields_fall_back() {
        let n = Node::default();
        assert_eq!(n.name(), "");
        assert_eq!(n.created(), crate::unset_creation());
    }
}
