//! Cloud provider rate limit configuration.
//!
//! Every resource category gets its own read and write token bucket settings.
//! Values that are left unset in the config file are filled from the
//! `RATE_LIMIT_*` environment variables and finally from built-in defaults.

pub mod limiter;

use crate::error::{Error, Result};
use serde::Deserialize;
use std::fmt::Display;
use std::str::FromStr;
use strum::{Display as StrumDisplay, EnumIter, IntoEnumIterator};

pub use limiter::RateLimiter;

pub const RATE_LIMIT_READ_QPS_ENV_VAR: &str = "RATE_LIMIT_READ_QPS";
pub const RATE_LIMIT_READ_BUCKETS_ENV_VAR: &str = "RATE_LIMIT_READ_BUCKETS";
pub const RATE_LIMIT_WRITE_QPS_ENV_VAR: &str = "RATE_LIMIT_WRITE_QPS";
pub const RATE_LIMIT_WRITE_BUCKETS_ENV_VAR: &str = "RATE_LIMIT_WRITE_BUCKETS";

pub const RATE_LIMIT_QPS_DEFAULT: f32 = 1.0;
pub const RATE_LIMIT_BUCKET_DEFAULT: u32 = 5;

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default, rename = "cloudProviderRateLimit", alias = "rateLimitEnabled")]
    pub enabled: bool,
    #[serde(default, rename = "cloudProviderRateLimitQPS", alias = "qps")]
    pub qps: f32,
    #[serde(default, rename = "cloudProviderRateLimitBucket", alias = "bucketSize")]
    pub bucket: u32,
    #[serde(default, rename = "cloudProviderRateLimitQPSWrite", alias = "qpsWrite")]
    pub qps_write: f32,
    #[serde(
        default,
        rename = "cloudProviderRateLimitBucketWrite",
        alias = "bucketSizeWrite"
    )]
    pub bucket_write: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, StrumDisplay, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum ResourceCategory {
    Interface,
    VirtualMachine,
    StorageAccount,
    Disk,
    VirtualMachineScaleSet,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudProviderRateLimitConfig {
    #[serde(flatten)]
    pub defaults: RateLimitConfig,
    #[serde(default)]
    pub interface_rate_limit: Option<RateLimitConfig>,
    #[serde(default)]
    pub virtual_machine_rate_limit: Option<RateLimitConfig>,
    #[serde(default)]
    pub storage_account_rate_limit: Option<RateLimitConfig>,
    #[serde(default)]
    pub disk_rate_limit: Option<RateLimitConfig>,
    #[serde(default)]
    pub virtual_machine_scale_set_rate_limit: Option<RateLimitConfig>,
}

impl CloudProviderRateLimitConfig {
    /// Settings for `category`, falling back to the top-level values when the
    /// category has no config of its own.
    pub fn for_category(&self, category: ResourceCategory) -> &RateLimitConfig {
        let config = match category {
            ResourceCategory::Interface => &self.interface_rate_limit,
            ResourceCategory::VirtualMachine => &self.virtual_machine_rate_limit,
            ResourceCategory::StorageAccount => &self.storage_account_rate_limit,
            ResourceCategory::Disk => &self.disk_rate_limit,
            ResourceCategory::VirtualMachineScaleSet => &self.virtual_machine_scale_set_rate_limit,
        };

        config.as_ref().unwrap_or(&self.defaults)
    }

    fn category_mut(&mut self, category: ResourceCategory) -> &mut Option<RateLimitConfig> {
        match category {
            ResourceCategory::Interface => &mut self.interface_rate_limit,
            ResourceCategory::VirtualMachine => &mut self.virtual_machine_rate_limit,
            ResourceCategory::StorageAccount => &mut self.storage_account_rate_limit,
            ResourceCategory::Disk => &mut self.disk_rate_limit,
            ResourceCategory::VirtualMachineScaleSet => {
                &mut self.virtual_machine_scale_set_rate_limit
            }
        }
    }
}

/// Resolves `config` in place using the process environment.
pub fn initialize(config: Option<&mut CloudProviderRateLimitConfig>) -> Result<()> {
    initialize_with(config, |name| std::env::var(name).ok())
}

pub fn initialize_with<F>(config: Option<&mut CloudProviderRateLimitConfig>, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    let config = match config {
        Some(v) => v,
        None => return Ok(()),
    };

    let defaults = &mut config.defaults;

    if defaults.qps == 0.0 {
        defaults.qps =
            env_value(&lookup, RATE_LIMIT_READ_QPS_ENV_VAR)?.unwrap_or(RATE_LIMIT_QPS_DEFAULT);
    }

    if defaults.bucket == 0 {
        defaults.bucket = env_value(&lookup, RATE_LIMIT_READ_BUCKETS_ENV_VAR)?
            .unwrap_or(RATE_LIMIT_BUCKET_DEFAULT);
    }

    // write settings follow the read settings unless overridden
    if defaults.qps_write == 0.0 {
        defaults.qps_write =
            env_value(&lookup, RATE_LIMIT_WRITE_QPS_ENV_VAR)?.unwrap_or(defaults.qps);
    }

    if defaults.bucket_write == 0 {
        defaults.bucket_write =
            env_value(&lookup, RATE_LIMIT_WRITE_BUCKETS_ENV_VAR)?.unwrap_or(defaults.bucket);
    }

    let defaults = config.defaults.clone();
    for category in ResourceCategory::iter() {
        let slot = config.category_mut(category);
        *slot = Some(override_defaults(&defaults, slot.take()));
    }

    Ok(())
}

fn override_defaults(defaults: &RateLimitConfig, config: Option<RateLimitConfig>) -> RateLimitConfig {
    let mut config = match config {
        Some(v) => v,
        None => return defaults.clone(),
    };

    if config.qps == 0.0 {
        config.qps = defaults.qps;
    }
    if config.bucket == 0 {
        config.bucket = defaults.bucket;
    }
    if config.qps_write == 0.0 {
        config.qps_write = defaults.qps_write;
    }
    if config.bucket_write == 0 {
        config.bucket_write = defaults.bucket_write;
    }

    config
}

fn env_value<F, T>(lookup: &F, var: &'static str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    let value = match lookup(var) {
        Some(v) if !v.is_empty() => v,
        _ => return Ok(None),
    };

    match value.parse::<T>() {
        Ok(v) => Ok(Some(v)),
        Err(e) => Err(Error::InvalidRateLimitEnvValue {
            var,
            reason: e.to_string(),
            value,
        }),
    }
}
