//! OpenStack connection settings.
//!
//! Settings are read from a TOML file and can be overridden by the usual `OS_*` environment
//! variables, so an `openrc` file sourced into the environment of `slurmctld` works as well.
//!
//! ```toml
//! region = "RegionOne"
//! interface = "public"
//!
//! [auth]
//! auth_url = "https://keystone.example.org:5000/v3"
//! application_credential_id = "..."
//! application_credential_secret = "..."
//!
//! [http]
//! connect_timeout = "5s"
//! timeout = "30s"
//! ```
//!
//! A cloud entry of an existing `clouds.yaml` (e.g. `/etc/openstack/clouds.yaml`) can be
//! transcribed key by key: its `auth:` mapping becomes the `[auth]` table, and `region_name`,
//! `interface`, `auth_type` and `identity_api_version` stay top-level keys. Only Keystone v3
//! with the `v3applicationcredential` or `password` auth types is supported.
//!
//! ```toml
//! region_name = "RegionOne"
//! interface = "public"
//! identity_api_version = 3
//! auth_type = "v3applicationcredential"
//!
//! [auth]
//! auth_url = "https://keystone.example.org:5000/v3"
//! application_credential_id = "..."
//! application_credential_secret = "..."
//! ```
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::common::error::HookError;

pub const DEFAULT_CLOUD_CONFIG_PATH: &str = "/etc/slurm-cloud/cloud.toml";

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CloudConfigFile {
    #[serde(default)]
    pub auth: AuthSection,
    #[serde(alias = "region_name")]
    pub region: Option<String>,
    pub interface: Option<String>,
    pub auth_type: Option<String>,
    pub identity_api_version: Option<toml::Value>,
    #[serde(default)]
    pub http: HttpSection,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthSection {
    pub auth_url: Option<String>,
    pub application_credential_id: Option<String>,
    pub application_credential_secret: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub project_name: Option<String>,
    pub project_id: Option<String>,
    pub user_domain_name: Option<String>,
    pub project_domain_name: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpSection {
    pub connect_timeout: Option<String>,
    pub timeout: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    ApplicationCredential {
        id: String,
        secret: String,
    },
    Password {
        username: String,
        password: String,
        user_domain_name: String,
        project: ProjectScope,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectScope {
    Id(String),
    Name { name: String, domain_name: String },
}

/// Validated connection settings.
#[derive(Debug, Clone)]
pub struct CloudConfig {
    pub auth_url: String,
    pub credentials: Credentials,
    pub region: Option<String>,
    pub interface: String,
    pub connect_timeout: Duration,
    pub timeout: Duration,
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

impl CloudConfig {
    /// Loads the config file (if it exists) and applies environment overrides.
    pub fn load(path: &Path) -> crate::Result<Self> {
        let file = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str::<CloudConfigFile>(&content).map_err(|e| {
                HookError::ConfigError(format!("Cannot parse {}: {e}", path.display()))
            })?
        } else {
            log::debug!(
                "Cloud config {} not found, relying on environment",
                path.display()
            );
            CloudConfigFile::default()
        };
        Self::from_sources(file, |key| std::env::var(key).ok())
    }

    pub fn from_sources<F: Fn(&str) -> Option<String>>(
        file: CloudConfigFile,
        env: F,
    ) -> crate::Result<Self> {
        let pick = |key: &str, value: Option<String>| -> Option<String> {
            env(key).filter(|v| !v.is_empty()).or(value)
        };
        let auth = file.auth;

        if let Some(version) = &file.identity_api_version {
            check_identity_api_version(version)?;
        }

        let auth_url = pick("OS_AUTH_URL", auth.auth_url)
            .ok_or_else(|| HookError::ConfigError("Missing auth_url (OS_AUTH_URL)".into()))?;

        let credential_id = pick("OS_APPLICATION_CREDENTIAL_ID", auth.application_credential_id);
        let credential_secret = pick(
            "OS_APPLICATION_CREDENTIAL_SECRET",
            auth.application_credential_secret,
        );
        let use_application_credential = match pick("OS_AUTH_TYPE", file.auth_type).as_deref() {
            None => credential_id.is_some() || credential_secret.is_some(),
            Some("v3applicationcredential") => true,
            Some("password" | "v3password") => false,
            Some(other) => {
                return Err(HookError::ConfigError(format!(
                    "Unsupported auth_type {other:?}"
                )));
            }
        };
        let credentials = match (credential_id, credential_secret) {
            (Some(id), Some(secret)) if use_application_credential => {
                Credentials::ApplicationCredential { id, secret }
            }
            _ if use_application_credential => {
                return Err(HookError::ConfigError(
                    "Application credential requires both an id and a secret".into(),
                ));
            }
            _ => {
                let username = pick("OS_USERNAME", auth.username).ok_or_else(|| {
                    HookError::ConfigError(
                        "Missing credentials: set an application credential or username/password"
                            .into(),
                    )
                })?;
                let password = pick("OS_PASSWORD", auth.password)
                    .ok_or_else(|| HookError::ConfigError("Missing password (OS_PASSWORD)".into()))?;
                let user_domain_name = pick("OS_USER_DOMAIN_NAME", auth.user_domain_name)
                    .unwrap_or_else(|| "Default".to_string());
                let project = match pick("OS_PROJECT_ID", auth.project_id) {
                    Some(id) => ProjectScope::Id(id),
                    None => ProjectScope::Name {
                        name: pick("OS_PROJECT_NAME", auth.project_name).ok_or_else(|| {
                            HookError::ConfigError(
                                "Missing project (OS_PROJECT_ID or OS_PROJECT_NAME)".into(),
                            )
                        })?,
                        domain_name: pick("OS_PROJECT_DOMAIN_NAME", auth.project_domain_name)
                            .unwrap_or_else(|| "Default".to_string()),
                    },
                };
                Credentials::Password {
                    username,
                    password,
                    user_domain_name,
                    project,
                }
            }
        };

        let parse_duration = |name: &str, value: Option<String>, default: Duration| {
            match value {
                Some(value) => humantime::parse_duration(&value).map_err(|e| {
                    HookError::ConfigError(format!("Invalid http.{name} value {value:?}: {e}"))
                }),
                None => Ok(default),
            }
        };

        Ok(Self {
            auth_url: auth_url.trim_end_matches('/').to_string(),
            credentials,
            region: pick("OS_REGION_NAME", file.region),
            interface: pick("OS_INTERFACE", file.interface)
                .map(|i| i.trim_end_matches("URL").to_string())
                .unwrap_or_else(|| "public".to_string()),
            connect_timeout: parse_duration(
                "connect_timeout",
                file.http.connect_timeout,
                default_connect_timeout(),
            )?,
            timeout: parse_duration("timeout", file.http.timeout, default_timeout())?,
        })
    }
}

fn check_identity_api_version(version: &toml::Value) -> crate::Result<()> {
    let supported = match version {
        toml::Value::Integer(version) => *version == 3,
        toml::Value::String(version) => version == "3",
        _ => false,
    };
    if supported {
        Ok(())
    } else {
        Err(HookError::ConfigError(format!(
            "Unsupported identity_api_version {version}, only 3 is supported"
        )))
    }
}
