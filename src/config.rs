use crate::wallets;
use chain_client::{
    ConnectionSettings,
    PrivateKeySigner,
    WaitPolicy,
};
use color_eyre::eyre::Result;
use deployments::DeploymentEnv;
use std::{
    path::PathBuf,
    time::Duration,
};

pub const DEFAULT_PRIVATE_KEY_ENV: &str = "DEPLOYER_PRIVATE_KEY";

/// Everything needed to reach one network and its deployment file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetworkConfig {
    pub env: DeploymentEnv,
    pub rpc_url: String,
    pub deployment: PathBuf,
    pub wait: WaitPolicy,
}

impl NetworkConfig {
    pub fn new(env: DeploymentEnv) -> Self {
        Self {
            env,
            rpc_url: env.rpc_url().to_string(),
            deployment: env.default_path(),
            wait: WaitPolicy::default(),
        }
    }

    pub fn with_rpc_url(mut self, rpc_url: Option<String>) -> Self {
        if let Some(rpc_url) = rpc_url {
            self.rpc_url = rpc_url;
        }
        self
    }

    pub fn with_deployment(mut self, deployment: Option<PathBuf>) -> Self {
        if let Some(deployment) = deployment {
            self.deployment = deployment;
        }
        self
    }

    pub fn with_receipt_timeout(mut self, timeout: Option<Duration>) -> Self {
        if let Some(timeout) = timeout {
            self.wait.timeout = timeout;
        }
        self
    }

    /// Overriding the deployment path means the default tree is not needed.
    pub fn uses_default_deployment(&self) -> bool {
        self.deployment == self.env.default_path()
    }

    pub fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings::new(self.rpc_url.clone())
            .with_expected_chain_id(self.env.chain_id())
            .with_wait_policy(self.wait)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SignerSource {
    Env(String),
    Keystore { name: String, dir: Option<String> },
}

impl SignerSource {
    pub fn load(&self) -> Result<Option<PrivateKeySigner>> {
        match self {
            SignerSource::Env(var) => {
                let signer = wallets::signer_from_env(var)?;
                if signer.is_none() {
                    tracing::warn!(%var, "no private key in environment; read-only");
                }
                Ok(signer)
            }
            SignerSource::Keystore { name, dir } => {
                let dir = wallets::resolve_keystore_dir(dir.as_deref())?;
                let descriptor = wallets::find_keystore(&dir, name)?;
                wallets::unlock_keystore(&descriptor).map(Some)
            }
        }
    }
}
