//! Served kinds by name, for frontends that pick the kind at runtime.

use deck_core::DeckError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
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
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 12] = [
        ResourceKind::Deployment,
        ResourceKind::StatefulSet,
        ResourceKind::DaemonSet,
        ResourceKind::Pod,
        ResourceKind::Service,
        ResourceKind::Ingress,
        ResourceKind::PersistentVolume,
        ResourceKind::PersistentVolumeClaim,
        ResourceKind::Namespace,
        ResourceKind::Node,
        ResourceKind::ConfigMap,
        ResourceKind::Secret,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Deployment => "Deployment",
            ResourceKind::StatefulSet => "StatefulSet",
            ResourceKind::DaemonSet => "DaemonSet",
            ResourceKind::Pod => "Pod",
            ResourceKind::Service => "Service",
            ResourceKind::Ingress => "Ingress",
            ResourceKind::PersistentVolume => "PersistentVolume",
            ResourceKind::PersistentVolumeClaim => "PersistentVolumeClaim",
            ResourceKind::Namespace => "Namespace",
            ResourceKind::Node => "Node",
            ResourceKind::ConfigMap => "ConfigMap",
            ResourceKind::Secret => "Secret",
        }
    }

    /// kubectl-style short name.
    pub fn short(&self) -> &'static str {
        match self {
            ResourceKind::Deployment => "deploy",
            ResourceKind::StatefulSet => "sts",
            ResourceKind::DaemonSet => "ds",
            ResourceKind::Pod => "po",
            ResourceKind::Service => "svc",
            ResourceKind::Ingress => "ing",
            ResourceKind::PersistentVolume => "pv",
            ResourceKind::PersistentVolumeClaim => "pvc",
            ResourceKind::Namespace => "ns",
            ResourceKind::Node => "no",
            ResourceKind::ConfigMap => "cm",
            ResourceKind::Secret => "secret",
        }
    }

    pub fn namespaced(&self) -> bool {
        !matches!(self, ResourceKind::PersistentVolume | ResourceKind::Namespace | ResourceKind::Node)
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(self.as_str()) }
}

/// Accepts the kind, its lowercase plural, or its short name, case-insensitively.
impl std::str::FromStr for ResourceKind {
    type Err = DeckError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let want = s.trim().to_ascii_lowercase();
        ResourceKind::ALL
            .iter()
            .copied()
            .find(|k| {
                let kind = k.as_str().to_ascii_lowercase();
                want == kind || want == format!("{}s", kind) || want == format!("{}es", kind) || want == k.short()
            })
            .ok_or_else(|| DeckError::validation(format!("unknown resource kind: {}", s)))
    }
}
