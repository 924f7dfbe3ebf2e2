//! The service registry (spec.md §4.6): the closed enumeration of downstream
//! service names and the base-URL resolution rules for them.
//!
//! Grounded on `service_map.py::EndpointServiceMap`'s service->executor
//! lookup and `enums.py::ServicePort`/`ServiceHost` for the concrete default
//! local ports.

use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{EnumIter, EnumString};

/// The closed set of downstream microservices (spec.md §2, §4.6).
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    EnumIter,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ServiceName {
    Obstruction,
    Encoder,
    Model,
    Merger,
    Stats,
}

impl ServiceName {
    /// The default local port for this service (spec.md §4.6: `{obstruction:
    /// 8081, encoder: 8082, model: 8083, merger: 8084, stats: 8085}`).
    pub fn default_local_port(self) -> u16 {
        match self {
            Self::Obstruction => 8081,
            Self::Encoder => 8082,
            Self::Model => 8083,
            Self::Merger => 8084,
            Self::Stats => 8085,
        }
    }

    /// The environment variable name overriding this service's base URL
    /// (spec.md §6: `<SERVICE>_SERVICE_URL`).
    pub fn env_var(self) -> &'static str {
        match self {
            Self::Obstruction => "OBSTRUCTION_SERVICE_URL",
            Self::Encoder => "ENCODER_SERVICE_URL",
            Self::Model => "MODEL_SERVICE_URL",
            Self::Merger => "MERGER_SERVICE_URL",
            Self::Stats => "STATS_SERVICE_URL",
        }
    }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Obstruction => "obstruction",
            Self::Encoder => "encoder",
            Self::Model => "model",
            Self::Merger => "merger",
            Self::Stats => "stats",
        };
        f.write_str(s)
    }
}

/// `DEPLOYMENT_MODE` (spec.md §6).
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DeploymentMode {
    Local,
    Production,
}

/// Resolves each service name to a base URL, given the deployment mode, an
/// optional configured production host, and per-service environment
/// overrides. Built once at startup and held immutably thereafter (spec.md
/// §9's "singleton global config -> explicit dependency" translation).
#[derive(Clone, Debug)]
pub struct ServiceRegistry {
    urls: std::collections::BTreeMap<ServiceName, String>,
}

impl ServiceRegistry {
    /// Resolves every service's base URL. `env_override` is a closure so the
    /// caller decides where env vars come from (real `std::env`, or a fixed
    /// map in tests).
    pub fn resolve(
        mode: DeploymentMode,
        production_host: Option<&str>,
        env_override: impl Fn(&str) -> Option<String>,
    ) -> Self {
        use strum::IntoEnumIterator;

        let mut urls = std::collections::BTreeMap::new();
        for service in ServiceName::iter() {
            let url = env_override(service.env_var()).unwrap_or_else(|| {
                match mode {
                    DeploymentMode::Local => {
                        format!("http://localhost:{}", service.default_local_port())
                    }
                    DeploymentMode::Production => {
                        let host = production_host.unwrap_or("localhost");
                        format!("https://{host}-{service}")
                    }
                }
            });
            urls.insert(service, url);
        }
        Self { urls }
    }

    pub fn base_url(&self, service: ServiceName) -> &str {
        self.urls
            .get(&service)
            .expect("ServiceRegistry::resolve populates every ServiceName")
    }

    pub fn iter_services(
        &self,
    ) -> impl Iterator<Item = (ServiceName, &str)> {
        self.urls.iter().map(|(&name, url)| (name, url.as_str()))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn local_mode_uses_default_ports() {
        let registry = ServiceRegistry::resolve(DeploymentMode::Local, None, |_| None);
        assert_eq!(registry.base_url(ServiceName::Obstruction), "http://localhost:8081");
        assert_eq!(registry.base_url(ServiceName::Stats), "http://localhost:8085");
    }

    #[test]
    fn env_override_wins() {
        let registry = ServiceRegistry::resolve(DeploymentMode::Local, None, |var| {
            (var == "ENCODER_SERVICE_URL").then(|| "http://encoder.internal:9000".to_owned())
        });
        assert_eq!(
            registry.base_url(ServiceName::Encoder),
            "http://encoder.internal:9000"
        );
        assert_eq!(registry.base_url(ServiceName::Model), "http://localhost:8083");
    }
}
