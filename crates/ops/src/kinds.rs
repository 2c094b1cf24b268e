//! Which resource kinds kubedeck serves and how each one is scoped.

use std::fmt::Debug;

use deck_core::{DeckError, DeckResult};
use deck_select::Cell;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Node, PersistentVolume, PersistentVolumeClaim, Pod, Secret, Service};
use k8s_openapi::api::networking::v1::Ingress;
use kube::{Api, Client, Resource};
use serde::{de::DeserializeOwned, Serialize};

/// A listable kind with a known scope.
pub trait KindApi:
    Resource<DynamicType = ()> + Cell + Clone + DeserializeOwned + Serialize + Debug + Send + Sync + 'static
{
    const NAMESPACED: bool;

    /// Api handle for listing. Namespaced kinds span all namespaces when `namespace` is empty.
    fn list_api(client: Client, namespace: Option<&str>) -> Api<Self>;

    /// Api handle for a single object. Namespaced kinds require a namespace.
    fn object_api(client: Client, namespace: Option<&str>) -> DeckResult<Api<Self>>;

    fn kind_name() -> String { Self::kind(&()).to_string() }
}

/// Kinds with a scale subresource.
pub trait Scalable: KindApi {}

/// Kinds whose pod template can be rolled by touching an annotation.
pub trait Restartable: KindApi {}

pub(crate) fn non_empty(namespace: Option<&str>) -> Option<&str> { namespace.filter(|ns| !ns.is_empty()) }

macro_rules! namespaced_kind {
    ($($kind:ty),+ $(,)?) => {
        $(
            impl KindApi for $kind {
                const NAMESPACED: bool = true;

                fn list_api(client: Client, namespace: Option<&str>) -> Api<Self> {
                    match non_empty(namespace) {
                        Some(ns) => Api::namespaced(client, ns),
                        None => Api::all(client),
                    }
                }

                fn object_api(client: Client, namespace: Option<&str>) -> DeckResult<Api<Self>> {
                    match non_empty(namespace) {
                        Some(ns) => Ok(Api::namespaced(client, ns)),
                        None => Err(DeckError::validation(format!("namespace is required for {}", Self::kind_name()))),
                    }
                }
            }
        )+
    };
}

macro_rules! cluster_kind {
    ($($kind:ty),+ $(,)?) => {
        $(
            impl KindApi for $kind {
                const NAMESPACED: bool = false;

                fn list_api(client: Client, _namespace: Option<&str>) -> Api<Self> { Api::all(client) }

                fn object_api(client: Client, _namespace: Option<&str>) -> DeckResult<Api<Self>> { Ok(Api::all(client)) }
            }
        )+
    };
}

namespaced_kind!(Deployment, StatefulSet, DaemonSet, Pod, Service, Ingress, PersistentVolumeClaim, ConfigMap, Secret);
cluster_kind!(PersistentVolume, Namespace, Node);

impl Scalable for Deployment {}
impl Scalable for StatefulSet {}

impl Restartable for Deployment {}
impl Restartable for StatefulSet {}
impl Restartable for DaemonSet {}
