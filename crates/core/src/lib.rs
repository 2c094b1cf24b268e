//! kubedeck core types: errors, composite workload records and name derivation.

#![forbid(unsafe_code)]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Errors surfaced by every kubedeck operation.
///
/// Transport layers map these onto status codes; nothing below them does.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum DeckError {
    #[error("validation: {0}")]
    Validation(String),
    #[error("not_found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("upstream: {0}")]
    Upstream(String),
}

pub type DeckResult<T> = Result<T, DeckError>;

impl DeckError {
    pub fn validation(msg: impl Into<String>) -> Self { DeckError::Validation(msg.into()) }
    pub fn not_found(msg: impl Into<String>) -> Self { DeckError::NotFound(msg.into()) }

    /// Wrap an opaque failure (store, I/O) as an upstream error, keeping its context chain.
    pub fn upstream(e: impl std::fmt::Display) -> Self { DeckError::Upstream(format!("{:#}", e)) }

    /// Short machine-friendly kind, used as a metrics label.
    pub fn kind(&self) -> &'static str {
        match self {
            DeckError::Validation(_) => "validation",
            DeckError::NotFound(_) => "not_found",
            DeckError::Conflict(_) => "conflict",
            DeckError::Upstream(_) => "upstream",
        }
    }
}

/// How a composite workload is reachable.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ExposureType {
    /// Service only, cluster-internal address.
    #[serde(rename = "ClusterIP")]
    ClusterLocal,
    /// Service exposed on every node's port.
    #[serde(rename = "NodePort")]
    NodeExposed,
    /// Cluster-internal service fronted by a route (ingress).
    #[serde(rename = "Ingress")]
    RouteExposed,
}

impl ExposureType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExposureType::ClusterLocal => "ClusterIP",
            ExposureType::NodeExposed => "NodePort",
            ExposureType::RouteExposed => "Ingress",
        }
    }

    /// Service type backing this exposure. Route termination happens at the route,
    /// so a route-exposed workload still gets a cluster-local service.
    pub fn service_type(&self) -> &'static str {
        match self {
            ExposureType::NodeExposed => "NodePort",
            ExposureType::ClusterLocal | ExposureType::RouteExposed => "ClusterIP",
        }
    }

    pub fn has_route(&self) -> bool { matches!(self, ExposureType::RouteExposed) }
}

impl std::fmt::Display for ExposureType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(self.as_str()) }
}

impl std::str::FromStr for ExposureType {
    type Err = DeckError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ClusterIP" => Ok(ExposureType::ClusterLocal),
            "NodePort" => Ok(ExposureType::NodeExposed),
            "Ingress" => Ok(ExposureType::RouteExposed),
            other => Err(DeckError::validation(format!("unknown exposure type: {} (expect ClusterIP, NodePort or Ingress)", other))),
        }
    }
}

/// Last create step a composite workload reached. Stored with the record so a
/// partially created workload can be told apart from a complete one.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CompositeStage {
    Persisted,
    WorkloadCreated,
    ServiceCreated,
    RouteCreated,
    Completed,
}

impl CompositeStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompositeStage::Persisted => "Persisted",
            CompositeStage::WorkloadCreated => "WorkloadCreated",
            CompositeStage::ServiceCreated => "ServiceCreated",
            CompositeStage::RouteCreated => "RouteCreated",
            CompositeStage::Completed => "Completed",
        }
    }
}

impl std::fmt::Display for CompositeStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(self.as_str()) }
}

impl std::str::FromStr for CompositeStage {
    type Err = DeckError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Persisted" => Ok(CompositeStage::Persisted),
            "WorkloadCreated" => Ok(CompositeStage::WorkloadCreated),
            "ServiceCreated" => Ok(CompositeStage::ServiceCreated),
            "RouteCreated" => Ok(CompositeStage::RouteCreated),
            "Completed" => Ok(CompositeStage::Completed),
            other => Err(DeckError::validation(format!("unknown composite stage: {}", other))),
        }
    }
}

/// Names of the cluster resources that make up one composite workload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedNames {
    pub workload: String,
    pub service: String,
    /// Empty unless the workload is route-exposed.
    pub route: String,
}

pub const SERVICE_SUFFIX: &str = "-svc";
pub const ROUTE_SUFFIX: &str = "-ing";

/// Derive dependent resource names from the workload name. Pure and deterministic.
pub fn derive_names(name: &str, exposure: ExposureType) -> DerivedNames {
    DerivedNames {
        workload: name.to_string(),
        service: format!("{}{}", name, SERVICE_SUFFIX),
        route: if exposure.has_route() { format!("{}{}", name, ROUTE_SUFFIX) } else { String::new() },
    }
}

/// Persistent tracking record for a composite workload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositeWorkloadRecord {
    /// Assigned by the store on insert; 0 before that.
    pub id: i64,
    pub name: String,
    pub namespace: String,
    pub replica_count: i32,
    pub workload_resource_name: String,
    pub service_resource_name: String,
    pub route_resource_name: String,
    pub exposure_type: ExposureType,
    pub stage: CompositeStage,
    pub created_at: DateTime<Utc>,
}

impl CompositeWorkloadRecord {
    /// New, not yet persisted record with names derived from `name`.
    pub fn new(name: &str, namespace: &str, replica_count: i32, exposure: ExposureType) -> Self {
        let names = derive_names(name, exposure);
        Self {
            id: 0,
            name: name.to_string(),
            namespace: namespace.to_string(),
            replica_count,
            workload_resource_name: names.workload,
            service_resource_name: names.service,
            route_resource_name: names.route,
            exposure_type: exposure,
            stage: CompositeStage::Persisted,
            created_at: Utc::now(),
        }
    }

    pub fn has_route(&self) -> bool { !self.route_resource_name.is_empty() }
}

/// Number of objects of one kind in a namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceCount {
    pub namespace: String,
    pub count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_is_deterministic() {
        let a = derive_names("shop", ExposureType::RouteExposed);
        let b = derive_names("shop", ExposureType::RouteExposed);
        assert_eq!(a, b);
        assert_eq!(a.workload, "shop");
        assert_eq!(a.service, "shop-svc");
        assert_eq!(a.route, "shop-ing");
    }

    #[test]
    fn no_route_name_without_route_exposure() {
        assert_eq!(derive_names("shop", ExposureType::ClusterLocal).route, "");
        assert_eq!(derive_names("shop", ExposureType::NodeExposed).route, "");
        assert_eq!(derive_names("shop", ExposureType::NodeExposed).service, "shop-svc");
    }

    #[test]
    fn route_exposure_uses_cluster_local_service() {
        assert_eq!(ExposureType::RouteExposed.service_type(), "ClusterIP");
        assert_eq!(ExposureType::NodeExposed.service_type(), "NodePort");
        assert_eq!(ExposureType::ClusterLocal.service_type(), "ClusterIP");
    }

    #[test]
    fn exposure_wire_names_round_trip_through_str() {
        for e in [ExposureType::ClusterLocal, ExposureType::NodeExposed, ExposureType::RouteExposed] {
            assert_eq!(e.as_str().parse::<ExposureType>().unwrap(), e);
        }
        assert!(matches!("LoadBalancer".parse::<ExposureType>(), Err(DeckError::Validation(_))));
        let v: ExposureType = serde_json::from_str("\"Ingress\"").unwrap();
        assert_eq!(v, ExposureType::RouteExposed);
    }

    #[test]
    fn record_new_fills_derived_names() {
        let r = CompositeWorkloadRecord::new("api", "prod", 3, ExposureType::RouteExposed);
        assert_eq!(r.id, 0);
        assert_eq!(r.service_resource_name, "api-svc");
        assert_eq!(r.route_resource_name, "api-ing");
        assert_eq!(r.stage, CompositeStage::Persisted);
        assert!(r.has_route());
    }

    #[test]
    fn stages_are_ordered() {
        assert!(CompositeStage::Persisted < CompositeStage::WorkloadCreated);
        assert!(CompositeStage::RouteCreated < CompositeStage::Completed);
        assert_eq!("ServiceCreated".parse::<CompositeStage>().unwrap(), CompositeStage::ServiceCreated);
    }
}
