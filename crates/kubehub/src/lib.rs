//! kubedeck kubehub: cluster client construction and error classification.

#![forbid(unsafe_code)]

use std::path::Path;

use anyhow::{Context, Result};
use deck_core::DeckError;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use tracing::{info, warn};

/// Build a client from an explicit kubeconfig path, or fall back to the default
/// chain (KUBECONFIG, ~/.kube/config, in-cluster service account).
pub async fn connect(kubeconfig: Option<&Path>) -> Result<Client> {
    match kubeconfig {
        Some(path) => {
            let kc = Kubeconfig::read_from(path).with_context(|| format!("reading kubeconfig at {}", path.display()))?;
            let cfg = Config::from_custom_kubeconfig(kc, &KubeConfigOptions::default())
                .await
                .with_context(|| format!("loading kubeconfig at {}", path.display()))?;
            info!(path = %path.display(), cluster = %cfg.cluster_url, "kube client from kubeconfig");
            Client::try_from(cfg).context("building kube client")
        }
        None => {
            let client = Client::try_default().await.context("inferring kube client config")?;
            info!(ns = %client.default_namespace(), "kube client from default config");
            Ok(client)
        }
    }
}

/// Classify a kube error. `what` names the object and verb, e.g. `create Deployment prod/web`.
pub fn map_kube_err(e: kube::Error, what: &str) -> DeckError {
    match &e {
        kube::Error::Api(ae) => match ae.code {
            404 => DeckError::NotFound(format!("{}: {}", what, ae.message)),
            409 => DeckError::Conflict(format!("{}: {}", what, ae.message)),
            400 | 422 => DeckError::Validation(format!("{}: {}", what, ae.message)),
            code => {
                warn!(code, reason = %ae.reason, what, "cluster api error");
                DeckError::Upstream(format!("{}: {} ({})", what, ae.message, code))
            }
        },
        _ => {
            warn!(error = %e, what, "cluster call failed");
            DeckError::Upstream(format!("{}: {}", what, e))
        }
    }
}
