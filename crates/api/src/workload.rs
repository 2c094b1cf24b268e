//! Composite workload orchestration.
//!
//! A composite workload is one tracked record plus the cluster objects derived from its
//! name: a deployment, a service and, for route-exposed workloads, an ingress. Create
//! persists the record first and then creates workload, service and route in that order.
//! Delete walks the reverse order and drops the record last. Neither direction rolls
//! back: a failure stops the sequence and leaves earlier steps in place, with the record
//! stage showing how far a create got.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use deck_core::{CompositeStage, CompositeWorkloadRecord, DeckError, DeckResult, ExposureType};
use deck_ops::manifest::{
    build_deployment, build_ingress, build_service, Labels, ResourceLimits, RoutePath, RouteSpec, ServiceSpec, WorkloadSpec,
};
use deck_ops::CompositeBackend;
use deck_persist::Store;
use deck_select::{Selection, SelectionQuery};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Everything needed to create a composite workload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCompositeWorkload {
    pub name: String,
    pub namespace: String,
    pub replicas: i32,
    pub image: String,
    pub labels: Labels,
    #[serde(default)]
    pub resources: Option<ResourceLimits>,
    #[serde(default)]
    pub health_check_path: Option<String>,
    pub exposure_type: ExposureType,
    pub container_port: i32,
    pub service_port: i32,
    /// Honored for node-exposed workloads only.
    #[serde(default)]
    pub node_port: Option<i32>,
    /// Route rules keyed by host; required for route-exposed workloads.
    #[serde(default)]
    pub route_hosts: BTreeMap<String, Vec<RoutePath>>,
}

fn valid_port(p: i32) -> bool { (1..=65535).contains(&p) }

impl CreateCompositeWorkload {
    pub fn validate(&self) -> DeckResult<()> {
        if self.name.trim().is_empty() {
            return Err(DeckError::validation("name is required"));
        }
        if self.namespace.trim().is_empty() {
            return Err(DeckError::validation("namespace is required"));
        }
        if self.image.trim().is_empty() {
            return Err(DeckError::validation("image is required"));
        }
        if self.labels.is_empty() {
            return Err(DeckError::validation("at least one label is required to select pods"));
        }
        if self.replicas < 0 {
            return Err(DeckError::validation(format!("replicas must be >= 0, got {}", self.replicas)));
        }
        if !valid_port(self.container_port) {
            return Err(DeckError::validation(format!("containerPort out of range: {}", self.container_port)));
        }
        if !valid_port(self.service_port) {
            return Err(DeckError::validation(format!("servicePort out of range: {}", self.service_port)));
        }
        if let Some(np) = self.node_port {
            if np < 0 || np > 65535 {
                return Err(DeckError::validation(format!("nodePort out of range: {}", np)));
            }
        }
        if let Some(path) = self.health_check_path.as_deref() {
            if !path.starts_with('/') {
                return Err(DeckError::validation(format!("healthCheckPath must start with '/': {}", path)));
            }
        }
        if self.exposure_type.has_route() {
            if self.route_hosts.is_empty() {
                return Err(DeckError::validation("Ingress exposure needs at least one route host"));
            }
            if let Some((host, _)) = self.route_hosts.iter().find(|(h, paths)| h.trim().is_empty() || paths.is_empty()) {
                return Err(DeckError::validation(format!("route host {:?} needs a name and at least one path", host)));
            }
        }
        Ok(())
    }

    fn workload_spec(&self, rec: &CompositeWorkloadRecord) -> WorkloadSpec {
        WorkloadSpec {
            name: rec.workload_resource_name.clone(),
            namespace: self.namespace.clone(),
            replicas: self.replicas,
            image: self.image.clone(),
            labels: self.labels.clone(),
            container_port: self.container_port,
            health_check_path: self.health_check_path.clone(),
            resources: self.resources.clone(),
        }
    }

    fn service_spec(&self, rec: &CompositeWorkloadRecord) -> ServiceSpec {
        ServiceSpec {
            name: rec.service_resource_name.clone(),
            namespace: self.namespace.clone(),
            service_type: self.exposure_type.service_type().to_string(),
            port: self.service_port,
            container_port: self.container_port,
            node_port: match self.exposure_type {
                ExposureType::NodeExposed => self.node_port,
                _ => None,
            },
            labels: self.labels.clone(),
            selector: self.labels.clone(),
        }
    }

    fn route_spec(&self, rec: &CompositeWorkloadRecord) -> RouteSpec {
        RouteSpec {
            name: rec.route_resource_name.clone(),
            namespace: self.namespace.clone(),
            labels: self.labels.clone(),
            service_name: rec.service_resource_name.clone(),
            service_port: self.service_port,
            hosts: self.route_hosts.clone(),
        }
    }
}

/// Read side of the record store. Needs no cluster connection.
#[derive(Clone)]
pub struct CompositeRecords {
    pub(crate) store: Arc<dyn Store>,
}

impl CompositeRecords {
    pub fn new(store: Arc<dyn Store>) -> Self { Self { store } }

    pub fn get(&self, id: i64) -> DeckResult<CompositeWorkloadRecord> {
        self.store
            .get(id)
            .map_err(|e| DeckError::upstream(format!("load composite record {}: {:#}", id, e)))?
            .ok_or_else(|| DeckError::not_found(format!("composite workload {}", id)))
    }

    /// Name-filtered page of records, newest first; `total` counts every match.
    pub fn list(&self, query: &SelectionQuery) -> DeckResult<Selection<CompositeWorkloadRecord>> {
        let (items, total) = self.store.list(query).map_err(|e| DeckError::upstream(format!("list composite records: {:#}", e)))?;
        Ok(Selection { items, total })
    }
}

/// Drives record storage and cluster object creation for composite workloads.
#[derive(Clone)]
pub struct CompositeWorkloads {
    store: Arc<dyn Store>,
    records: CompositeRecords,
    backend: Arc<dyn CompositeBackend>,
}

impl CompositeWorkloads {
    pub fn new(store: Arc<dyn Store>, backend: Arc<dyn CompositeBackend>) -> Self {
        Self { records: CompositeRecords::new(store.clone()), store, backend }
    }

    pub fn records(&self) -> &CompositeRecords { &self.records }

    /// Persist, then workload, service and route. Returns the record at `Completed`.
    pub async fn create(&self, req: &CreateCompositeWorkload) -> DeckResult<CompositeWorkloadRecord> {
        let started = Instant::now();
        let res = self.create_steps(req).await;
        let outcome = match &res {
            Ok(_) => "ok",
            Err(e) => e.kind(),
        };
        counter!("composite_create_total", 1u64, "outcome" => outcome);
        match &res {
            Ok(rec) => info!(id = rec.id, name = %rec.name, ns = %rec.namespace, took_ms = %started.elapsed().as_millis(), "composite create ok"),
            Err(e) => warn!(name = %req.name, ns = %req.namespace, error = %e, took_ms = %started.elapsed().as_millis(), "composite create failed"),
        }
        res
    }

    async fn create_steps(&self, req: &CreateCompositeWorkload) -> DeckResult<CompositeWorkloadRecord> {
        req.validate()?;
        let mut rec = CompositeWorkloadRecord::new(&req.name, &req.namespace, req.replicas, req.exposure_type);
        rec.id = self.store.insert(&rec).map_err(|e| DeckError::upstream(format!("persist composite record: {:#}", e)))?;
        info!(id = rec.id, name = %rec.name, stage = %rec.stage, "composite record persisted");

        self.backend.create_workload(&req.namespace, build_deployment(&req.workload_spec(&rec))).await?;
        self.advance(&mut rec, CompositeStage::WorkloadCreated);

        self.backend.create_service(&req.namespace, build_service(&req.service_spec(&rec))).await?;
        self.advance(&mut rec, CompositeStage::ServiceCreated);

        if rec.has_route() {
            self.backend.create_route(&req.namespace, build_ingress(&req.route_spec(&rec))).await?;
            self.advance(&mut rec, CompositeStage::RouteCreated);
        }

        self.advance(&mut rec, CompositeStage::Completed);
        Ok(rec)
    }

    // Stage bookkeeping never fails the sequence; the cluster object already exists.
    fn advance(&self, rec: &mut CompositeWorkloadRecord, stage: CompositeStage) {
        rec.stage = stage;
        if let Err(e) = self.store.set_stage(rec.id, stage) {
            warn!(id = rec.id, stage = %stage, error = %e, "composite stage update failed");
        }
    }

    /// Route, service, workload, then the record. Stops at the first failure.
    pub async fn delete(&self, id: i64) -> DeckResult<()> {
        let started = Instant::now();
        let res = self.delete_steps(id).await;
        let outcome = match &res {
            Ok(_) => "ok",
            Err(e) => e.kind(),
        };
        counter!("composite_delete_total", 1u64, "outcome" => outcome);
        match &res {
            Ok(()) => info!(id, took_ms = %started.elapsed().as_millis(), "composite delete ok"),
            Err(e) => warn!(id, error = %e, took_ms = %started.elapsed().as_millis(), "composite delete failed"),
        }
        res
    }

    async fn delete_steps(&self, id: i64) -> DeckResult<()> {
        let rec = self.get(id)?;
        if rec.has_route() {
            self.backend.delete_route(&rec.namespace, &rec.route_resource_name).await?;
        }
        self.backend.delete_service(&rec.namespace, &rec.service_resource_name).await?;
        self.backend.delete_workload(&rec.namespace, &rec.workload_resource_name).await?;
        self.store.delete(id).map_err(|e| DeckError::upstream(format!("delete composite record {}: {:#}", id, e)))
    }

    pub fn get(&self, id: i64) -> DeckResult<CompositeWorkloadRecord> { self.records.get(id) }

    pub fn list(&self, query: &SelectionQuery) -> DeckResult<Selection<CompositeWorkloadRecord>> { self.records.list(query) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(exposure: ExposureType) -> CreateCompositeWorkload {
        let mut route_hosts = BTreeMap::new();
        if exposure.has_route() {
            route_hosts.insert("web.example.com".to_string(), vec![RoutePath { path: "/".into(), path_type: None }]);
        }
        CreateCompositeWorkload {
            name: "web".into(),
            namespace: "prod".into(),
            replicas: 2,
            image: "nginx:1.25".into(),
            labels: [("app".to_string(), "web".to_string())].into_iter().collect(),
            resources: None,
            health_check_path: Some("/healthz".into()),
            exposure_type: exposure,
            container_port: 8080,
            service_port: 80,
            node_port: Some(30080),
            route_hosts,
        }
    }

    #[test]
    fn validation_rejects_bad_requests() {
        assert!(request(ExposureType::ClusterLocal).validate().is_ok());
        assert!(request(ExposureType::RouteExposed).validate().is_ok());

        let mut r = request(ExposureType::ClusterLocal);
        r.name = " ".into();
        assert!(matches!(r.validate(), Err(DeckError::Validation(_))));

        let mut r = request(ExposureType::ClusterLocal);
        r.labels.clear();
        assert!(matches!(r.validate(), Err(DeckError::Validation(_))));

        let mut r = request(ExposureType::ClusterLocal);
        r.container_port = 0;
        assert!(matches!(r.validate(), Err(DeckError::Validation(_))));

        let mut r = request(ExposureType::ClusterLocal);
        r.replicas = -1;
        assert!(matches!(r.validate(), Err(DeckError::Validation(_))));

        let mut r = request(ExposureType::RouteExposed);
        r.route_hosts.clear();
        assert!(matches!(r.validate(), Err(DeckError::Validation(_))));

        let mut r = request(ExposureType::RouteExposed);
        r.route_hosts.insert("api.example.com".into(), vec![]);
        assert!(matches!(r.validate(), Err(DeckError::Validation(_))));

        let mut r = request(ExposureType::ClusterLocal);
        r.health_check_path = Some("healthz".into());
        assert!(matches!(r.validate(), Err(DeckError::Validation(_))));
    }

    #[test]
    fn service_type_and_node_port_follow_exposure() {
        let rec_for = |e| CompositeWorkloadRecord::new("web", "prod", 2, e);

        let routed = request(ExposureType::RouteExposed);
        let svc = routed.service_spec(&rec_for(ExposureType::RouteExposed));
        assert_eq!(svc.service_type, "ClusterIP");
        assert_eq!(svc.node_port, None);
        assert_eq!(svc.name, "web-svc");

        let node = request(ExposureType::NodeExposed);
        let svc = node.service_spec(&rec_for(ExposureType::NodeExposed));
        assert_eq!(svc.service_type, "NodePort");
        assert_eq!(svc.node_port, Some(30080));
        assert_eq!(svc.selector, node.labels);

        let route = routed.route_spec(&rec_for(ExposureType::RouteExposed));
        assert_eq!(route.name, "web-ing");
        assert_eq!(route.service_name, "web-svc");
        assert_eq!(route.service_port, 80);
    }

    #[test]
    fn request_reads_camel_case_json() {
        let raw = r#"{
            "name": "api", "namespace": "dev", "replicas": 1, "image": "api:1",
            "labels": {"app": "api"}, "exposureType": "NodePort",
            "containerPort": 9000, "servicePort": 9000, "nodePort": 31000
        }"#;
        let req: CreateCompositeWorkload = serde_json::from_str(raw).unwrap();
        assert_eq!(req.exposure_type, ExposureType::NodeExposed);
        assert_eq!(req.node_port, Some(31000));
        assert!(req.route_hosts.is_empty());
        assert!(req.validate().is_ok());
    }
}
