//! kubedeck public API façade (in-process).
//!
//! Frontends pick a [`ResourceKind`] at runtime and get JSON back; typed access stays
//! available through [`InProcApi::ops`]. Composite workloads go through
//! [`CompositeWorkloads`].

#![forbid(unsafe_code)]

pub mod config;
pub mod kind;
pub mod workload;

use std::sync::Arc;
use std::time::Instant;

use deck_core::{DeckError, DeckResult, NamespaceCount};
use deck_ops::KubeOps;
use deck_persist::{SqliteStore, Store};
use deck_select::{Selection, SelectionQuery};
use serde::Serialize;
use serde_json::Value;
use tracing::info;

pub use config::DeckConfig;
pub use deck_core::{CompositeStage, CompositeWorkloadRecord, ExposureType};
pub use kind::ResourceKind;
pub use workload::{CompositeRecords, CompositeWorkloads, CreateCompositeWorkload};

fn to_json<T: Serialize>(v: &T) -> DeckResult<Value> {
    serde_json::to_value(v).map_err(|e| DeckError::upstream(format!("encoding object: {}", e)))
}

fn json_selection<T: Serialize>(sel: Selection<T>) -> DeckResult<Selection<Value>> {
    let items = sel.items.iter().map(to_json).collect::<DeckResult<Vec<_>>>()?;
    Ok(Selection { items, total: sel.total })
}

/// Bind `$svc` to the typed service for `$kind` and evaluate `$body`.
macro_rules! on_kind {
    ($ops:expr, $kind:expr, $svc:ident => $body:expr) => {
        match $kind {
            ResourceKind::Deployment => { let $svc = &$ops.deployments; $body }
            ResourceKind::StatefulSet => { let $svc = &$ops.stateful_sets; $body }
            ResourceKind::DaemonSet => { let $svc = &$ops.daemon_sets; $body }
            ResourceKind::Pod => { let $svc = &$ops.pods; $body }
            ResourceKind::Service => { let $svc = &$ops.services; $body }
            ResourceKind::Ingress => { let $svc = &$ops.ingresses; $body }
            ResourceKind::PersistentVolume => { let $svc = &$ops.persistent_volumes; $body }
            ResourceKind::PersistentVolumeClaim => { let $svc = &$ops.persistent_volume_claims; $body }
            ResourceKind::Namespace => { let $svc = &$ops.namespaces; $body }
            ResourceKind::Node => { let $svc = &$ops.nodes; $body }
            ResourceKind::ConfigMap => { let $svc = &$ops.config_maps; $body }
            ResourceKind::Secret => { let $svc = &$ops.secrets; $body }
        }
    };
}

/// In-process implementation that calls internal crates directly.
pub struct InProcApi {
    config: DeckConfig,
    ops: KubeOps,
    workloads: CompositeWorkloads,
}

impl InProcApi {
    /// Open the record store named by `config`. Reading records needs nothing else.
    pub fn open_records(config: &DeckConfig) -> anyhow::Result<CompositeRecords> {
        let store = SqliteStore::open(&config.db_path)?;
        Ok(CompositeRecords::new(Arc::new(store)))
    }

    /// Open the record store named by `config` and connect to the cluster.
    pub async fn connect(config: DeckConfig) -> anyhow::Result<Self> {
        let records = Self::open_records(&config)?;
        Self::connect_with(config, records).await
    }

    /// Connect to the cluster, reusing an already opened record store.
    pub async fn connect_with(config: DeckConfig, records: CompositeRecords) -> anyhow::Result<Self> {
        let client = deck_kubehub::connect(config.kubeconfig.as_deref()).await?;
        info!(db = %config.db_path, field_manager = %config.field_manager, "api: connected");
        let ops = KubeOps::new(client, &config.field_manager);
        Ok(Self::from_parts(config, ops, records.store))
    }

    pub fn from_parts(config: DeckConfig, ops: KubeOps, store: Arc<dyn Store>) -> Self {
        let workloads = CompositeWorkloads::new(store, Arc::new(ops.clone()));
        Self { config, ops, workloads }
    }

    pub fn config(&self) -> &DeckConfig { &self.config }

    // cluster-scoped kinds never carry a namespace
    fn scope<'a>(kind: ResourceKind, namespace: Option<&'a str>) -> Option<&'a str> {
        if kind.namespaced() { namespace } else { None }
    }

    /// Typed per-kind services.
    pub fn ops(&self) -> &KubeOps { &self.ops }

    pub fn workloads(&self) -> &CompositeWorkloads { &self.workloads }

    pub async fn list(&self, kind: ResourceKind, namespace: Option<&str>, query: &SelectionQuery) -> DeckResult<Selection<Value>> {
        let t0 = Instant::now();
        let namespace = Self::scope(kind, namespace);
        let sel = on_kind!(self.ops, kind, svc => json_selection(svc.list(namespace, query).await?))?;
        info!(kind = %kind, filter = %query.name(), page = query.page(), total = sel.total, took_ms = %t0.elapsed().as_millis(), "api: list ok");
        Ok(sel)
    }

    pub async fn get(&self, kind: ResourceKind, namespace: Option<&str>, name: &str) -> DeckResult<Value> {
        let namespace = Self::scope(kind, namespace);
        on_kind!(self.ops, kind, svc => to_json(&svc.get(namespace, name).await?))
    }

    /// Create from a JSON document; returns the stored object.
    pub async fn create(&self, kind: ResourceKind, namespace: Option<&str>, content: &str) -> DeckResult<Value> {
        let t0 = Instant::now();
        let namespace = Self::scope(kind, namespace);
        let v = on_kind!(self.ops, kind, svc => to_json(&svc.create_from(namespace, content).await?))?;
        info!(kind = %kind, took_ms = %t0.elapsed().as_millis(), "api: create ok");
        Ok(v)
    }

    /// Replace from a JSON document; returns the stored object.
    pub async fn update(&self, kind: ResourceKind, namespace: Option<&str>, content: &str) -> DeckResult<Value> {
        let t0 = Instant::now();
        let namespace = Self::scope(kind, namespace);
        let v = on_kind!(self.ops, kind, svc => to_json(&svc.update(namespace, content).await?))?;
        info!(kind = %kind, took_ms = %t0.elapsed().as_millis(), "api: update ok");
        Ok(v)
    }

    pub async fn delete(&self, kind: ResourceKind, namespace: Option<&str>, name: &str) -> DeckResult<()> {
        let namespace = Self::scope(kind, namespace);
        on_kind!(self.ops, kind, svc => svc.delete(namespace, name).await)
    }

    pub async fn count_per_namespace(&self, kind: ResourceKind) -> DeckResult<Vec<NamespaceCount>> {
        on_kind!(self.ops, kind, svc => svc.count_per_namespace().await)
    }

    pub async fn scale(&self, kind: ResourceKind, namespace: Option<&str>, name: &str, replicas: i32) -> DeckResult<i32> {
        match kind {
            ResourceKind::Deployment => self.ops.deployments.scale(namespace, name, replicas).await,
            ResourceKind::StatefulSet => self.ops.stateful_sets.scale(namespace, name, replicas).await,
            other => Err(DeckError::validation(format!("{} cannot be scaled", other))),
        }
    }

    pub async fn restart(&self, kind: ResourceKind, namespace: Option<&str>, name: &str) -> DeckResult<()> {
        match kind {
            ResourceKind::Deployment => self.ops.deployments.restart(namespace, name).await,
            ResourceKind::StatefulSet => self.ops.stateful_sets.restart(namespace, name).await,
            ResourceKind::DaemonSet => self.ops.daemon_sets.restart(namespace, name).await,
            other => Err(DeckError::validation(format!("{} cannot be restarted", other))),
        }
    }

    pub async fn pod_containers(&self, namespace: Option<&str>, pod: &str) -> DeckResult<Vec<String>> {
        self.ops.pods.containers(namespace, pod).await
    }

    /// Log tail of one container, bounded by the configured line count.
    pub async fn pod_logs(&self, namespace: Option<&str>, pod: &str, container: Option<&str>) -> DeckResult<String> {
        self.ops.pods.logs(namespace, pod, container, self.config.pod_log_tail_lines).await
    }
}
