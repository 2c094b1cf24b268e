//! Pure builders turning declarative specs into cluster objects.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, HTTPGetAction, PodSpec, PodTemplateSpec, Probe, ResourceRequirements, Service, ServicePort,
    ServiceSpec as CoreServiceSpec,
};
use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule, IngressServiceBackend, IngressSpec,
    ServiceBackendPort,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use serde::{Deserialize, Serialize};

pub type Labels = BTreeMap<String, String>;

/// CPU/memory applied as both request and limit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    pub cpu: String,
    pub memory: String,
}

/// Single-container deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadSpec {
    pub name: String,
    pub namespace: String,
    pub replicas: i32,
    pub image: String,
    pub labels: Labels,
    pub container_port: i32,
    /// HTTP path for readiness and liveness probes; no probes when unset.
    pub health_check_path: Option<String>,
    pub resources: Option<ResourceLimits>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSpec {
    pub name: String,
    pub namespace: String,
    /// `ClusterIP` or `NodePort`.
    pub service_type: String,
    pub port: i32,
    pub container_port: i32,
    pub node_port: Option<i32>,
    pub labels: Labels,
    /// Pods the service balances across.
    pub selector: Labels,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutePath {
    pub path: String,
    /// `Prefix`, `Exact` or `ImplementationSpecific`; `Prefix` when unset.
    #[serde(default)]
    pub path_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteSpec {
    pub name: String,
    pub namespace: String,
    pub labels: Labels,
    pub service_name: String,
    pub service_port: i32,
    pub hosts: BTreeMap<String, Vec<RoutePath>>,
}

pub const DEFAULT_PATH_TYPE: &str = "Prefix";

fn meta(name: &str, namespace: &str, labels: &Labels) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        labels: Some(labels.clone()),
        ..Default::default()
    }
}

fn http_probe(path: &str, port: i32, initial_delay: i32) -> Probe {
    Probe {
        http_get: Some(HTTPGetAction { path: Some(path.to_string()), port: IntOrString::Int(port), ..Default::default() }),
        initial_delay_seconds: Some(initial_delay),
        timeout_seconds: Some(5),
        period_seconds: Some(5),
        ..Default::default()
    }
}

/// One container named after the workload, exposing one `http` port.
pub fn build_deployment(spec: &WorkloadSpec) -> Deployment {
    let ports = vec![ContainerPort {
        name: Some("http".to_string()),
        container_port: spec.container_port,
        protocol: Some("TCP".to_string()),
        ..Default::default()
    }];
    let mut container = Container {
        name: spec.name.clone(),
        image: Some(spec.image.clone()),
        ports: Some(ports),
        ..Default::default()
    };
    if let Some(path) = spec.health_check_path.as_deref() {
        // probes target the first declared port
        let port = container.ports.as_ref().and_then(|p| p.first()).map(|p| p.container_port).unwrap_or(spec.container_port);
        container.readiness_probe = Some(http_probe(path, port, 5));
        container.liveness_probe = Some(http_probe(path, port, 15));
    }
    if let Some(res) = spec.resources.as_ref() {
        let quantities: BTreeMap<String, Quantity> = [
            ("cpu".to_string(), Quantity(res.cpu.clone())),
            ("memory".to_string(), Quantity(res.memory.clone())),
        ]
        .into_iter()
        .collect();
        container.resources = Some(ResourceRequirements {
            limits: Some(quantities.clone()),
            requests: Some(quantities),
            ..Default::default()
        });
    }
    Deployment {
        metadata: meta(&spec.name, &spec.namespace, &spec.labels),
        spec: Some(DeploymentSpec {
            replicas: Some(spec.replicas),
            selector: LabelSelector { match_labels: Some(spec.labels.clone()), ..Default::default() },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta { labels: Some(spec.labels.clone()), ..Default::default() }),
                spec: Some(PodSpec { containers: vec![container], ..Default::default() }),
            },
            ..Default::default()
        }),
        status: None,
    }
}

pub fn build_service(spec: &ServiceSpec) -> Service {
    let mut port = ServicePort {
        name: Some("http".to_string()),
        port: spec.port,
        protocol: Some("TCP".to_string()),
        target_port: Some(IntOrString::Int(spec.container_port)),
        ..Default::default()
    };
    if spec.service_type == "NodePort" {
        port.node_port = spec.node_port.filter(|p| *p != 0);
    }
    Service {
        metadata: meta(&spec.name, &spec.namespace, &spec.labels),
        spec: Some(CoreServiceSpec {
            type_: Some(spec.service_type.clone()),
            ports: Some(vec![port]),
            selector: Some(spec.selector.clone()),
            ..Default::default()
        }),
        status: None,
    }
}

/// One rule per host, in host order; every path of a host backs onto the named service port.
pub fn build_ingress(spec: &RouteSpec) -> Ingress {
    let rules: Vec<IngressRule> = spec
        .hosts
        .iter()
        .map(|(host, paths)| IngressRule {
            host: Some(host.clone()),
            http: Some(HTTPIngressRuleValue {
                paths: paths
                    .iter()
                    .map(|p| HTTPIngressPath {
                        path: Some(p.path.clone()),
                        path_type: p.path_type.clone().unwrap_or_else(|| DEFAULT_PATH_TYPE.to_string()),
                        backend: IngressBackend {
                            service: Some(IngressServiceBackend {
                                name: spec.service_name.clone(),
                                port: Some(ServiceBackendPort { number: Some(spec.service_port), name: None }),
                            }),
                            resource: None,
                        },
                    })
                    .collect(),
            }),
        })
        .collect();
    Ingress {
        metadata: meta(&spec.name, &spec.namespace, &spec.labels),
        spec: Some(IngressSpec { rules: Some(rules), ..Default::default() }),
        status: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> Labels { [("app".to_string(), "web".to_string())].into_iter().collect() }

    fn workload() -> WorkloadSpec {
        WorkloadSpec {
            name: "web".into(),
            namespace: "prod".into(),
            replicas: 3,
            image: "nginx:1.25".into(),
            labels: labels(),
            container_port: 8080,
            health_check_path: None,
            resources: None,
        }
    }

    #[test]
    fn deployment_carries_replicas_labels_and_port() {
        let d = build_deployment(&workload());
        assert_eq!(d.metadata.name.as_deref(), Some("web"));
        assert_eq!(d.metadata.namespace.as_deref(), Some("prod"));
        let spec = d.spec.unwrap();
        assert_eq!(spec.replicas, Some(3));
        assert_eq!(spec.selector.match_labels, Some(labels()));
        let pod = spec.template.spec.unwrap();
        assert_eq!(pod.containers.len(), 1);
        let c = &pod.containers[0];
        assert_eq!(c.image.as_deref(), Some("nginx:1.25"));
        assert_eq!(c.ports.as_ref().unwrap()[0].container_port, 8080);
        assert!(c.readiness_probe.is_none());
        assert!(c.resources.is_none());
    }

    #[test]
    fn health_check_adds_both_probes_on_first_port() {
        let mut w = workload();
        w.health_check_path = Some("/healthz".into());
        let d = build_deployment(&w);
        let c = d.spec.unwrap().template.spec.unwrap().containers.remove(0);
        let ready = c.readiness_probe.unwrap();
        let live = c.liveness_probe.unwrap();
        let get = ready.http_get.unwrap();
        assert_eq!(get.path.as_deref(), Some("/healthz"));
        assert_eq!(get.port, IntOrString::Int(8080));
        assert_eq!(ready.initial_delay_seconds, Some(5));
        assert_eq!(live.initial_delay_seconds, Some(15));
        assert_eq!(live.period_seconds, Some(5));
    }

    #[test]
    fn resources_set_requests_equal_to_limits() {
        let mut w = workload();
        w.resources = Some(ResourceLimits { cpu: "500m".into(), memory: "256Mi".into() });
        let c = build_deployment(&w).spec.unwrap().template.spec.unwrap().containers.remove(0);
        let r = c.resources.unwrap();
        assert_eq!(r.limits, r.requests);
        assert_eq!(r.limits.unwrap().get("cpu"), Some(&Quantity("500m".into())));
    }

    fn service(kind: &str, node_port: Option<i32>) -> ServiceSpec {
        ServiceSpec {
            name: "web-svc".into(),
            namespace: "prod".into(),
            service_type: kind.into(),
            port: 80,
            container_port: 8080,
            node_port,
            labels: labels(),
            selector: labels(),
        }
    }

    #[test]
    fn node_port_only_for_node_port_services() {
        let np = build_service(&service("NodePort", Some(30080))).spec.unwrap();
        assert_eq!(np.type_.as_deref(), Some("NodePort"));
        assert_eq!(np.ports.unwrap()[0].node_port, Some(30080));

        let cip = build_service(&service("ClusterIP", Some(30080))).spec.unwrap();
        let port = &cip.ports.as_ref().unwrap()[0];
        assert_eq!(port.node_port, None);
        assert_eq!(port.target_port, Some(IntOrString::Int(8080)));
        assert_eq!(cip.selector, Some(labels()));

        let zero = build_service(&service("NodePort", Some(0))).spec.unwrap();
        assert_eq!(zero.ports.unwrap()[0].node_port, None);
    }

    #[test]
    fn ingress_paths_stay_with_their_host() {
        let mut hosts = BTreeMap::new();
        hosts.insert("b.example.com".to_string(), vec![RoutePath { path: "/b".into(), path_type: Some("Exact".into()) }]);
        hosts.insert(
            "a.example.com".to_string(),
            vec![RoutePath { path: "/".into(), path_type: None }, RoutePath { path: "/api".into(), path_type: None }],
        );
        let ing = build_ingress(&RouteSpec {
            name: "web-ing".into(),
            namespace: "prod".into(),
            labels: labels(),
            service_name: "web-svc".into(),
            service_port: 80,
            hosts,
        });
        let rules = ing.spec.unwrap().rules.unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].host.as_deref(), Some("a.example.com"));
        let a_paths = &rules[0].http.as_ref().unwrap().paths;
        assert_eq!(a_paths.len(), 2);
        assert_eq!(a_paths[0].path_type, "Prefix");
        let backend = a_paths[1].backend.service.as_ref().unwrap();
        assert_eq!(backend.name, "web-svc");
        assert_eq!(backend.port.as_ref().unwrap().number, Some(80));
        let b_paths = &rules[1].http.as_ref().unwrap().paths;
        assert_eq!(b_paths.len(), 1);
        assert_eq!(b_paths[0].path_type, "Exact");
    }
}
