use config::FileFormat;
use lazy_static_include::lazy_static_include_str;
use serde_derive::Deserialize;
use tracing::debug;

lazy_static_include_str! {
    DEFAULT_CONFIG => "src/config/default.toml",
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Config {
    pub cluster: ClusterConfig,
    pub prometheus: PrometheusConfig,
    pub health: HealthConfig,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ClusterConfig {
    pub worker_count: u32,
    pub channel_capacity: usize,
    pub cleanup_batch_threshold: usize,
    pub serialized_payload_threshold_bytes: usize,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct PrometheusConfig {
    pub port: u16,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct HealthConfig {
    pub port: u16,
    pub liveness_check_interval_secs: u64,
}

impl ClusterConfig {
    /// Total world size, including the controller and monitor ranks.
    pub fn world_size(&self) -> u32 {
        self.worker_count + meshtask_messages::FIRST_WORKER_RANK
    }
}

impl Config {
    pub fn load(local_file: Option<String>) -> Config {
        let mut config_builder = config::Config::builder();
        config_builder =
            config_builder.add_source(config::File::from_str(&DEFAULT_CONFIG, FileFormat::Toml));

        if let Some(local_file) = local_file {
            debug!("Loading local configuration from {}", local_file);
            config_builder = config_builder.add_source(config::File::with_name(&local_file));
        }

        let config_builder = config_builder
            .add_source(config::Environment::default().separator("__").ignore_empty(true))
            .build()
            .expect("Could not load configuration");

        config_builder.try_deserialize().expect("Could not deserialize configuration")
    }

    pub fn validate(&self) {
        assert!(self.cluster.worker_count > 0, "need at least one worker");
        assert!(self.cluster.channel_capacity > 0, "channel capacity must be positive");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_loads_and_validates() {
        let config = Config::load(None);
        config.validate();
        assert_eq!(config.cluster.world_size(), config.cluster.worker_count + 2);
    }
}
