use anyhow::{bail, Context, Result};
use kube::{
    config::{KubeConfigOptions, Kubeconfig},
    Client, Config,
};
use std::path::PathBuf;

/// A cluster reached through its own kubeconfig, given as `NAME=KUBECONFIG`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteCluster {
    pub name: String,
    pub kubeconfig: PathBuf,
}

// === impl RemoteCluster ===

impl RemoteCluster {
    pub async fn client(&self) -> Result<Client> {
        let kubeconfig = Kubeconfig::read_from(&self.kubeconfig).with_context(|| {
            format!(
                "failed to read kubeconfig for cluster {} from {}",
                self.name,
                self.kubeconfig.display()
            )
        })?;
        let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
            .await
            .with_context(|| format!("failed to load kubeconfig for cluster {}", self.name))?;
        let client = Client::try_from(config)
            .with_context(|| format!("failed to build client for cluster {}", self.name))?;
        Ok(client)
    }
}

impl std::str::FromStr for RemoteCluster {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let Some((name, path)) = s.split_once('=') else {
            bail!("expected NAME=KUBECONFIG, got {s:?}");
        };
        let (name, path) = (name.trim(), path.trim());
        if name.is_empty() || path.is_empty() {
            bail!("expected NAME=KUBECONFIG, got {s:?}");
        }
        Ok(Self {
            name: name.to_string(),
            kubeconfig: PathBuf::from(path),
        })
    }
}
