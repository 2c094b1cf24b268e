//! kubedeck ops: per-kind resource services over the cluster API.
//!
//! [`ResourceService`] gives every served kind the same list/get/create/update/delete
//! surface, routing lists through the selection engine. [`CompositeBackend`] is the
//! narrow seam the composite workload orchestrator drives; [`KubeOps`] implements it
//! against a live cluster.

#![forbid(unsafe_code)]

pub mod kinds;
pub mod manifest;

use std::marker::PhantomData;

use deck_core::{DeckError, DeckResult, NamespaceCount};
use deck_kubehub::map_kube_err;
use deck_select::{select, Selection, SelectionQuery};
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::autoscaling::v1::Scale;
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Node, PersistentVolume, PersistentVolumeClaim, Pod, Secret, Service};
use k8s_openapi::api::networking::v1::Ingress;
use kube::api::{Api, DeleteParams, ListParams, LogParams, Patch, PatchParams, PostParams};
use kube::{Client, Resource, ResourceExt};
use tracing::info;

pub use kinds::{KindApi, Restartable, Scalable};

pub const RESTARTED_AT_ANNOTATION: &str = "kubectl.kubernetes.io/restartedAt";
pub const DEFAULT_FIELD_MANAGER: &str = "kubedeck";

/// Typed operations for one resource kind.
pub struct ResourceService<K> {
    client: Client,
    field_manager: String,
    _kind: PhantomData<fn() -> K>,
}

impl<K> Clone for ResourceService<K> {
    fn clone(&self) -> Self {
        Self { client: self.client.clone(), field_manager: self.field_manager.clone(), _kind: PhantomData }
    }
}

impl<K: KindApi> ResourceService<K> {
    pub fn new(client: Client) -> Self {
        Self { client, field_manager: DEFAULT_FIELD_MANAGER.to_string(), _kind: PhantomData }
    }

    pub fn with_field_manager(mut self, field_manager: impl Into<String>) -> Self {
        self.field_manager = field_manager.into();
        self
    }

    fn what(verb: &str, namespace: Option<&str>, name: &str) -> String {
        match kinds::non_empty(namespace) {
            Some(ns) => format!("{} {} {}/{}", verb, K::kind_name(), ns, name),
            None => format!("{} {} {}", verb, K::kind_name(), name),
        }
    }

    /// Full list from the cluster, then filter/sort/page.
    pub async fn list(&self, namespace: Option<&str>, query: &SelectionQuery) -> DeckResult<Selection<K>> {
        let api = K::list_api(self.client.clone(), namespace);
        let list = api
            .list(&ListParams::default())
            .await
            .map_err(|e| map_kube_err(e, &format!("list {}", K::kind_name())))?;
        info!(kind = %K::kind_name(), ns = %namespace.unwrap_or("(all)"), listed = list.items.len(), "list ok");
        Ok(select(list.items, query))
    }

    pub async fn get(&self, namespace: Option<&str>, name: &str) -> DeckResult<K> {
        let api = K::object_api(self.client.clone(), namespace)?;
        api.get(name).await.map_err(|e| map_kube_err(e, &Self::what("get", namespace, name)))
    }

    pub async fn create(&self, namespace: Option<&str>, obj: &K) -> DeckResult<K> {
        let name = obj.name_any();
        let api = K::object_api(self.client.clone(), namespace)?;
        let pp = PostParams { field_manager: Some(self.field_manager.clone()), ..Default::default() };
        let created = api.create(&pp, obj).await.map_err(|e| map_kube_err(e, &Self::what("create", namespace, &name)))?;
        info!(kind = %K::kind_name(), ns = ?namespace, name = %name, "created");
        Ok(created)
    }

    /// Create an object from a JSON document. Without an explicit namespace the
    /// document's own `metadata.namespace` is used.
    pub async fn create_from(&self, namespace: Option<&str>, content: &str) -> DeckResult<K> {
        let (_, obj) = parse_manifest::<K>(content)?;
        let doc_ns = obj.meta().namespace.clone();
        let namespace = kinds::non_empty(namespace).or(doc_ns.as_deref());
        self.create(namespace, &obj).await
    }

    /// Replace an object from a JSON document; the name comes from the document.
    pub async fn update(&self, namespace: Option<&str>, content: &str) -> DeckResult<K> {
        let (name, obj) = parse_manifest::<K>(content)?;
        let api = K::object_api(self.client.clone(), namespace)?;
        let pp = PostParams { field_manager: Some(self.field_manager.clone()), ..Default::default() };
        let updated = api.replace(&name, &pp, &obj).await.map_err(|e| map_kube_err(e, &Self::what("update", namespace, &name)))?;
        info!(kind = %K::kind_name(), ns = ?namespace, name = %name, "updated");
        Ok(updated)
    }

    pub async fn delete(&self, namespace: Option<&str>, name: &str) -> DeckResult<()> {
        let api = K::object_api(self.client.clone(), namespace)?;
        api.delete(name, &DeleteParams::default())
            .await
            .map_err(|e| map_kube_err(e, &Self::what("delete", namespace, name)))?;
        info!(kind = %K::kind_name(), ns = ?namespace, name = %name, "deleted");
        Ok(())
    }

    /// Object count in every namespace. Cluster-scoped kinds are rejected.
    pub async fn count_per_namespace(&self) -> DeckResult<Vec<NamespaceCount>> {
        if !K::NAMESPACED {
            return Err(DeckError::validation(format!("{} is not namespaced", K::kind_name())));
        }
        let namespaces: Api<Namespace> = Api::all(self.client.clone());
        let list = namespaces
            .list(&ListParams::default())
            .await
            .map_err(|e| map_kube_err(e, "list Namespace"))?;
        let counts = list.items.iter().map(|ns| {
            let ns_name = ns.name_any();
            let api = K::list_api(self.client.clone(), Some(&ns_name));
            async move {
                let items = api
                    .list(&ListParams::default())
                    .await
                    .map_err(|e| map_kube_err(e, &format!("list {} in {}", K::kind_name(), ns_name)))?;
                Ok::<_, DeckError>(NamespaceCount { namespace: ns_name, count: items.items.len() })
            }
        });
        futures::future::try_join_all(counts).await
    }
}

impl<K: Scalable> ResourceService<K> {
    /// Read the scale subresource, set replicas, write it back. Returns the replicas the server accepted.
    pub async fn scale(&self, namespace: Option<&str>, name: &str, replicas: i32) -> DeckResult<i32> {
        if replicas < 0 {
            return Err(DeckError::validation(format!("replicas must be >= 0 (got {})", replicas)));
        }
        let api = K::object_api(self.client.clone(), namespace)?;
        let mut scale: Scale = api.get_scale(name).await.map_err(|e| map_kube_err(e, &Self::what("get scale of", namespace, name)))?;
        let spec = scale.spec.get_or_insert_with(Default::default);
        spec.replicas = Some(replicas);
        let body = serde_json::to_vec(&scale).map_err(|e| DeckError::upstream(format!("encoding scale: {}", e)))?;
        let pp = PostParams { field_manager: Some(self.field_manager.clone()), ..Default::default() };
        let updated = api
            .replace_scale(name, &pp, body)
            .await
            .map_err(|e| map_kube_err(e, &Self::what("update scale of", namespace, name)))?;
        let accepted = updated.spec.and_then(|s| s.replicas).unwrap_or(replicas);
        info!(kind = %K::kind_name(), ns = ?namespace, name = %name, replicas = accepted, "scaled");
        Ok(accepted)
    }
}

impl<K: Restartable> ResourceService<K> {
    /// Roll the pods by stamping the pod template; the logical spec is unchanged.
    pub async fn restart(&self, namespace: Option<&str>, name: &str) -> DeckResult<()> {
        let api = K::object_api(self.client.clone(), namespace)?;
        let patch = restart_patch(&chrono::Utc::now().to_rfc3339());
        let pp = PatchParams { field_manager: Some(self.field_manager.clone()), ..Default::default() };
        api.patch(name, &pp, &Patch::Merge(&patch))
            .await
            .map_err(|e| map_kube_err(e, &Self::what("restart", namespace, name)))?;
        info!(kind = %K::kind_name(), ns = ?namespace, name = %name, "restarted");
        Ok(())
    }
}

impl ResourceService<Pod> {
    pub async fn containers(&self, namespace: Option<&str>, pod: &str) -> DeckResult<Vec<String>> {
        let p = self.get(namespace, pod).await?;
        Ok(container_names(&p))
    }

    /// Last `tail_lines` lines of a container's log.
    pub async fn logs(&self, namespace: Option<&str>, pod: &str, container: Option<&str>, tail_lines: i64) -> DeckResult<String> {
        let api = Pod::object_api(self.client.clone(), namespace)?;
        let lp = LogParams {
            container: container.map(|c| c.to_string()),
            tail_lines: Some(tail_lines),
            ..Default::default()
        };
        api.logs(pod, &lp).await.map_err(|e| map_kube_err(e, &Self::what("read logs of", namespace, pod)))
    }
}

pub fn container_names(pod: &Pod) -> Vec<String> {
    pod.spec.as_ref().map(|s| s.containers.iter().map(|c| c.name.clone()).collect()).unwrap_or_default()
}

pub fn restart_patch(timestamp: &str) -> serde_json::Value {
    serde_json::json!({
        "spec": {"template": {"metadata": {"annotations": {RESTARTED_AT_ANNOTATION: timestamp}}}}
    })
}

/// Decode a JSON document into `K` and pull out its name.
pub fn parse_manifest<K: KindApi>(content: &str) -> DeckResult<(String, K)> {
    let obj: K = serde_json::from_str(content)
        .map_err(|e| DeckError::validation(format!("decoding {} document: {}", K::kind_name(), e)))?;
    match obj.meta().name.clone().filter(|n| !n.is_empty()) {
        Some(name) => Ok((name, obj)),
        None => Err(DeckError::validation(format!("{} document has no metadata.name", K::kind_name()))),
    }
}

/// Cluster calls the composite workload orchestrator depends on.
#[async_trait::async_trait]
pub trait CompositeBackend: Send + Sync {
    async fn create_workload(&self, namespace: &str, workload: Deployment) -> DeckResult<()>;
    async fn create_service(&self, namespace: &str, service: Service) -> DeckResult<()>;
    async fn create_route(&self, namespace: &str, route: Ingress) -> DeckResult<()>;
    async fn delete_workload(&self, namespace: &str, name: &str) -> DeckResult<()>;
    async fn delete_service(&self, namespace: &str, name: &str) -> DeckResult<()>;
    async fn delete_route(&self, namespace: &str, name: &str) -> DeckResult<()>;
}

/// Every per-kind service, sharing one client.
#[derive(Clone)]
pub struct KubeOps {
    pub deployments: ResourceService<Deployment>,
    pub stateful_sets: ResourceService<StatefulSet>,
    pub daemon_sets: ResourceService<DaemonSet>,
    pub pods: ResourceService<Pod>,
    pub services: ResourceService<Service>,
    pub ingresses: ResourceService<Ingress>,
    pub persistent_volumes: ResourceService<PersistentVolume>,
    pub persistent_volume_claims: ResourceService<PersistentVolumeClaim>,
    pub namespaces: ResourceService<Namespace>,
    pub nodes: ResourceService<Node>,
    pub config_maps: ResourceService<ConfigMap>,
    pub secrets: ResourceService<Secret>,
}

impl KubeOps {
    pub fn new(client: Client, field_manager: &str) -> Self {
        Self {
            deployments: ResourceService::new(client.clone()).with_field_manager(field_manager),
            stateful_sets: ResourceService::new(client.clone()).with_field_manager(field_manager),
            daemon_sets: ResourceService::new(client.clone()).with_field_manager(field_manager),
            pods: ResourceService::new(client.clone()).with_field_manager(field_manager),
            services: ResourceService::new(client.clone()).with_field_manager(field_manager),
            ingresses: ResourceService::new(client.clone()).with_field_manager(field_manager),
            persistent_volumes: ResourceService::new(client.clone()).with_field_manager(field_manager),
            persistent_volume_claims: ResourceService::new(client.clone()).with_field_manager(field_manager),
            namespaces: ResourceService::new(client.clone()).with_field_manager(field_manager),
            nodes: ResourceService::new(client.clone()).with_field_manager(field_manager),
            config_maps: ResourceService::new(client.clone()).with_field_manager(field_manager),
            secrets: ResourceService::new(client).with_field_manager(field_manager),
        }
    }
}

#[async_trait::async_trait]
impl CompositeBackend for KubeOps {
    async fn create_workload(&self, namespace: &str, workload: Deployment) -> DeckResult<()> {
        self.deployments.create(Some(namespace), &workload).await.map(|_| ())
    }

    async fn create_service(&self, namespace: &str, service: Service) -> DeckResult<()> {
        self.services.create(Some(namespace), &service).await.map(|_| ())
    }

    async fn create_route(&self, namespace: &str, route: Ingress) -> DeckResult<()> {
        self.ingresses.create(Some(namespace), &route).await.map(|_| ())
    }

    async fn delete_workload(&self, namespace: &str, name: &str) -> DeckResult<()> {
        self.deployments.delete(Some(namespace), name).await
    }

    async fn delete_service(&self, namespace: &str, name: &str) -> DeckResult<()> {
        self.services.delete(Some(namespace), name).await
    }

    async fn delete_route(&self, namespace: &str, name: &str) -> DeckResult<()> {
        self.ingresses.delete(Some(namespace), name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_manifest_reads_name() {
        let (name, d) = parse_manifest::<Deployment>(r#"{"metadata":{"name":"web","namespace":"prod"},"spec":{"selector":{},"template":{}}}"#).unwrap();
        assert_eq!(name, "web");
        assert_eq!(d.metadata.namespace.as_deref(), Some("prod"));
    }

    #[test]
    fn parse_manifest_requires_name() {
        let err = parse_manifest::<ConfigMap>(r#"{"metadata":{},"data":{"k":"v"}}"#).unwrap_err();
        assert!(matches!(err, DeckError::Validation(_)));
    }

    #[test]
    fn parse_manifest_rejects_garbage() {
        assert!(matches!(parse_manifest::<Service>("not json"), Err(DeckError::Validation(_))));
    }

    #[test]
    fn restart_patch_touches_template_annotation_only() {
        let p = restart_patch("2024-01-01T00:00:00+00:00");
        assert_eq!(p["spec"]["template"]["metadata"]["annotations"][RESTARTED_AT_ANNOTATION], "2024-01-01T00:00:00+00:00");
        assert_eq!(p["spec"].as_object().unwrap().len(), 1);
    }

    #[test]
    fn container_names_in_declared_order() {
        let pod: Pod = serde_json::from_value(serde_json::json!({
            "metadata": {"name": "p"},
            "spec": {"containers": [{"name": "app"}, {"name": "sidecar"}]}
        }))
        .unwrap();
        assert_eq!(container_names(&pod), vec!["app", "sidecar"]);
        assert!(container_names(&Pod::default()).is_empty());
    }
}
