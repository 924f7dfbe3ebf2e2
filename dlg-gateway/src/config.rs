//! Environment configuration (spec.md §6's closed environment-variable set).
//! Resolved once at startup and held immutably thereafter, replacing the
//! source's singleton global config module (spec.md §9).

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::str::FromStr;

use anyhow::{anyhow, Context};
use dlg_api_core::registry::DeploymentMode;
use jsonwebtoken::Algorithm;

use crate::cli::GatewayArgs;

/// `0.0.0.0:8080`: the gateway binds on all interfaces by default since it's
/// meant to be reached by other services in the deployment, unlike the
/// sidecar's loopback-only default.
const DEFAULT_LISTEN_ADDR: SocketAddr =
    SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 8080));

/// `AUTH_TYPE` (spec.md §6).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthType {
    Token,
    Auth0,
    None,
}

impl FromStr for AuthType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "token" => Ok(Self::Token),
            "auth0" => Ok(Self::Auth0),
            "none" => Ok(Self::None),
            other => Err(anyhow!("invalid AUTH_TYPE `{other}`, expected token|auth0|none")),
        }
    }
}

pub struct GatewayConfig {
    pub listen_addr: SocketAddr,
    pub deployment_mode: DeploymentMode,
    /// The production host downstream service base URLs are derived from
    /// when a service has no `<SERVICE>_SERVICE_URL` override (spec.md
    /// §4.6: "in production mode the host is a configured address").
    /// Unused in `local` mode.
    pub service_host: Option<String>,
    pub auth_type: AuthType,
    pub api_token: Option<String>,
    pub auth0_domain: Option<String>,
    pub auth0_audience: Option<String>,
    pub auth0_algorithms: Vec<Algorithm>,
}

impl GatewayConfig {
    pub fn from_args(args: GatewayArgs) -> anyhow::Result<Self> {
        let listen_addr = match args.listen_addr {
            Some(addr) => addr,
            None => match env_var("PORT")? {
                Some(port) => SocketAddr::V4(SocketAddrV4::new(
                    Ipv4Addr::UNSPECIFIED,
                    port.parse().context("PORT is not a valid port number")?,
                )),
                None => DEFAULT_LISTEN_ADDR,
            },
        };

        let deployment_mode_str = args
            .deployment_mode
            .or(env_var("DEPLOYMENT_MODE")?)
            .unwrap_or_else(|| "local".to_owned());
        let deployment_mode = DeploymentMode::from_str(&deployment_mode_str)
            .map_err(|_| anyhow!("invalid DEPLOYMENT_MODE `{deployment_mode_str}`"))?;

        let service_host = args.service_host.or(env_var("SERVICE_HOST")?);
        if deployment_mode == DeploymentMode::Production && service_host.is_none() {
            tracing::warn!(
                "DEPLOYMENT_MODE=production but SERVICE_HOST is unset; any service without \
                 its own <SERVICE>_SERVICE_URL override will resolve to a localhost address"
            );
        }

        let auth_type = match env_var("AUTH_TYPE")? {
            Some(s) => AuthType::from_str(&s)?,
            None => AuthType::None,
        };
        let api_token = env_var("API_TOKEN")?;
        let auth0_domain = env_var("AUTH0_DOMAIN")?;
        let auth0_audience = env_var("AUTH0_AUDIENCE")?;
        let auth0_algorithms = match env_var("AUTH0_ALGORITHMS")? {
            Some(list) => list
                .split(',')
                .map(|s| parse_algorithm(s.trim()))
                .collect::<anyhow::Result<Vec<_>>>()?,
            None => vec![Algorithm::RS256],
        };

        if auth_type == AuthType::Token && api_token.is_none() {
            return Err(anyhow!("AUTH_TYPE=token requires API_TOKEN to be set"));
        }
        if auth_type == AuthType::Auth0 && (auth0_domain.is_none() || auth0_audience.is_none()) {
            return Err(anyhow!(
                "AUTH_TYPE=auth0 requires AUTH0_DOMAIN and AUTH0_AUDIENCE to be set"
            ));
        }

        Ok(Self {
            listen_addr,
            deployment_mode,
            service_host,
            auth_type,
            api_token,
            auth0_domain,
            auth0_audience,
            auth0_algorithms,
        })
    }

    /// Builds the [`dlg_api::auth::AuthConfig`] the HTTP layer's auth
    /// pre-filter needs out of this config's `AUTH_TYPE` and its companion
    /// fields, already validated for presence in [`Self::from_args`].
    pub fn to_auth_config(&self) -> dlg_api::auth::AuthConfig {
        match self.auth_type {
            AuthType::None => dlg_api::auth::AuthConfig::None,
            AuthType::Token => dlg_api::auth::AuthConfig::Token {
                token: self
                    .api_token
                    .clone()
                    .expect("AUTH_TYPE=token requires API_TOKEN, checked in from_args"),
            },
            AuthType::Auth0 => dlg_api::auth::AuthConfig::Auth0 {
                domain: self
                    .auth0_domain
                    .clone()
                    .expect("AUTH_TYPE=auth0 requires AUTH0_DOMAIN, checked in from_args"),
                audience: self
                    .auth0_audience
                    .clone()
                    .expect("AUTH_TYPE=auth0 requires AUTH0_AUDIENCE, checked in from_args"),
                algorithms: self.auth0_algorithms.clone(),
            },
        }
    }
}

fn parse_algorithm(name: &str) -> anyhow::Result<Algorithm> {
    match name {
        "HS256" => Ok(Algorithm::HS256),
        "HS384" => Ok(Algorithm::HS384),
        "HS512" => Ok(Algorithm::HS512),
        "RS256" => Ok(Algorithm::RS256),
        "RS384" => Ok(Algorithm::RS384),
        "RS512" => Ok(Algorithm::RS512),
        "ES256" => Ok(Algorithm::ES256),
        "ES384" => Ok(Algorithm::ES384),
        "PS256" => Ok(Algorithm::PS256),
        "PS384" => Ok(Algorithm::PS384),
        "PS512" => Ok(Algorithm::PS512),
        "EdDSA" => Ok(Algorithm::EdDSA),
        other => Err(anyhow!("unsupported AUTH0_ALGORITHMS entry `{other}`")),
    }
}

fn env_var(name: &str) -> anyhow::Result<Option<String>> {
    use std::env::VarError;
    match std::env::var(name) {
        Ok(value) => Ok(Some(value)),
        Err(VarError::NotPresent) => Ok(None),
        Err(VarError::NotUnicode(_)) => {
            Err(anyhow!("environment variable `{name}` is not valid UTF-8"))
        }
    }
}
