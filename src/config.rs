use crate::rate_limit::{self, CloudProviderRateLimitConfig};
use crate::AppConfig;
use anyhow::Context;
use serde::Deserialize;
use std::fs::File;
use std::io::{BufReader, Read};
use std::sync::Arc;
use std::time::Duration;

pub const VM_TYPE_VMSS: &str = "vmss";

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub cloud: String,
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub subscription_id: String,
    pub resource_group: String,
    #[serde(default)]
    pub location: String,
    #[serde(default = "default_vm_type")]
    pub vm_type: String,
    #[serde(flatten)]
    pub rate_limit: CloudProviderRateLimitConfig,
    /// Explicit `<min>:<max>:<name>` node group specs.
    #[serde(default)]
    pub node_groups: Vec<String>,
    /// `label:<key>=<value>,...` auto discovery specs.
    #[serde(default)]
    pub node_group_auto_discovery: Vec<String>,
    #[serde(default = "default_refresh_interval", with = "humantime_serde")]
    pub refresh_interval: Duration,
    #[serde(default = "default_inventory_timeout", with = "humantime_serde")]
    pub inventory_timeout: Duration,
    #[serde(default)]
    pub scale_set_provider: ScaleSetProvider,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ScaleSetProvider {
    Mock,
    File { path: String },
}

impl Default for ScaleSetProvider {
    fn default() -> Self {
        ScaleSetProvider::Mock
    }
}

fn default_vm_type() -> String {
    VM_TYPE_VMSS.into()
}

fn default_refresh_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_inventory_timeout() -> Duration {
    Duration::from_secs(30)
}

pub fn load_config() -> anyhow::Result<AppConfig> {
    let config_path = get_config_path()?;
    let file = File::open(&config_path)
        .with_context(|| format!("Failed to open config file {}", &config_path))?;

    let config = parse_config(BufReader::new(file))
        .with_context(|| format!("Failed to load config file {}", &config_path))?;

    Ok(Arc::new(config))
}

/// Parses a YAML or JSON config and resolves its rate limit settings against
/// the process environment.
pub fn parse_config(reader: impl Read) -> anyhow::Result<Config> {
    parse_config_with_env(reader, |name| std::env::var(name).ok())
}

pub fn parse_config_with_env<F>(reader: impl Read, lookup: F) -> anyhow::Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config: Config =
        serde_yaml::from_reader(reader).context("Failed to unmarshal config body")?;

    rate_limit::initialize_with(Some(&mut config.rate_limit), lookup)?;

    Ok(config)
}

fn get_config_path() -> anyhow::Result<String> {
    use std::env;
    use tracing::info;

    env::var("APP_CONFIG").or_else(|e| {
        info!(
            error = format!("{:?}", e).as_str(),
            "Missing or invalid APP_CONFIG env var, fallback to config.yml"
        );
        Ok("config.yml".to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::{RateLimitConfig, ResourceCategory};
    use strum::IntoEnumIterator;

    const VALID_CONFIG: &str = r#"{
        "cloud": "AzurePublicCloud",
        "tenantId": "fakeId",
        "subscriptionId": "fakeId",
        "aadClientId": "fakeId",
        "aadClientSecret": "fakeId",
        "resourceGroup": "fakeId",
        "location": "southeastasia",
        "vmssCacheTTL": 60,
        "cloudProviderRateLimit": false,
        "routeRateLimit": {
            "cloudProviderRateLimit": true,
            "cloudProviderRateLimitQPS": 3
        }
    }"#;

    #[test]
    fn valid_config_gets_defaults() {
        let config = parse_config_with_env(VALID_CONFIG.as_bytes(), |_| None).unwrap();

        assert_eq!(config.cloud, "AzurePublicCloud");
        assert_eq!(config.resource_group, "fakeId");
        assert_eq!(config.location, "southeastasia");
        assert_eq!(config.vm_type, VM_TYPE_VMSS);
        assert_eq!(config.refresh_interval, Duration::from_secs(60));
        assert!(matches!(config.scale_set_provider, ScaleSetProvider::Mock));

        let expected = RateLimitConfig {
            enabled: false,
            qps: 1.0,
            bucket: 5,
            qps_write: 1.0,
            bucket_write: 5,
        };
        assert_eq!(config.rate_limit.defaults, expected);
        for category in ResourceCategory::iter() {
            assert_eq!(config.rate_limit.for_category(category), &expected);
        }
    }

    #[test]
    fn yaml_config_with_specs_and_overrides() {
        let raw = r#"
resourceGroup: rg
nodeGroups:
  - "1:15:test-asg"
nodeGroupAutoDiscovery:
  - "label:cluster-autoscaler-enabled=true"
refreshInterval: 2m
inventoryTimeout: 5s
qps: 4.5
virtualMachineScaleSetRateLimit:
  rateLimitEnabled: true
  bucketSize: 12
scaleSetProvider:
  type: file
  path: /var/lib/inventory
"#;
        let config = parse_config_with_env(raw.as_bytes(), |_| None).unwrap();

        assert_eq!(config.node_groups, vec!["1:15:test-asg"]);
        assert_eq!(config.node_group_auto_discovery.len(), 1);
        assert_eq!(config.refresh_interval, Duration::from_secs(120));
        assert_eq!(config.inventory_timeout, Duration::from_secs(5));
        assert!(matches!(
            config.scale_set_provider,
            ScaleSetProvider::File { ref path } if path == "/var/lib/inventory"
        ));

        let vmss = config
            .rate_limit
            .for_category(ResourceCategory::VirtualMachineScaleSet);
        assert!(vmss.enabled);
        assert_eq!(vmss.qps, 4.5);
        assert_eq!(vmss.bucket, 12);
        assert_eq!(vmss.qps_write, 4.5);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let raw = r#"{{}"cloud": "AzurePublicCloud",}"#;
        assert!(parse_config_with_env(raw.as_bytes(), |_| None).is_err());
    }

    #[test]
    fn malformed_rate_limit_env_is_rejected() {
        let raw = "resourceGroup: rg\n";
        let result = parse_config_with_env(raw.as_bytes(), |name| {
            if name == crate::rate_limit::RATE_LIMIT_READ_QPS_ENV_VAR {
                Some("fast".into())
            } else {
                None
            }
        });

        assert!(result.is_err());
    }
}
