//! Keystone (identity v3) authentication and service catalog lookup.
use reqwest::Client;
use serde_json::{Value, json};

use crate::cloud::{CloudError, CloudResult};
use crate::common::config::{CloudConfig, Credentials, ProjectScope};

const SUBJECT_TOKEN_HEADER: &str = "X-Subject-Token";

/// Authenticated session: a token and the endpoints of the services that we use.
#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub compute: String,
    pub network: String,
    pub image: String,
}

pub async fn authenticate(client: &Client, config: &CloudConfig) -> CloudResult<Session> {
    let url = tokens_url(&config.auth_url);
    log::debug!("Authenticating against {url}");

    let response = client
        .post(&url)
        .json(&auth_request_body(&config.credentials))
        .send()
        .await?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(CloudError::Auth(format!(
            "POST {url} returned status {}: {body}",
            status.as_u16()
        )));
    }
    let token = response
        .headers()
        .get(SUBJECT_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string())
        .ok_or_else(|| CloudError::Auth(format!("Missing {SUBJECT_TOKEN_HEADER} header")))?;
    let body: Value = response.json().await?;

    let endpoint = |service: &str| {
        find_endpoint(&body, service, &config.interface, config.region.as_deref())
    };
    let session = Session {
        token,
        compute: endpoint("compute")?,
        network: versioned(endpoint("network")?, "v2.0"),
        image: versioned(endpoint("image")?, "v2"),
    };
    log::debug!(
        "Using endpoints compute={}, network={}, image={}",
        session.compute,
        session.network,
        session.image
    );
    Ok(session)
}

fn tokens_url(auth_url: &str) -> String {
    let auth_url = auth_url.trim_end_matches('/');
    if auth_url.ends_with("/v3") {
        format!("{auth_url}/auth/tokens")
    } else {
        format!("{auth_url}/v3/auth/tokens")
    }
}

fn auth_request_body(credentials: &Credentials) -> Value {
    match credentials {
        Credentials::ApplicationCredential { id, secret } => json!({
            "auth": {
                "identity": {
                    "methods": ["application_credential"],
                    "application_credential": {"id": id, "secret": secret}
                }
            }
        }),
        Credentials::Password {
            username,
            password,
            user_domain_name,
            project,
        } => {
            let project = match project {
                ProjectScope::Id(id) => json!({"id": id}),
                ProjectScope::Name { name, domain_name } => {
                    json!({"name": name, "domain": {"name": domain_name}})
                }
            };
            json!({
                "auth": {
                    "identity": {
                        "methods": ["password"],
                        "password": {
                            "user": {
                                "name": username,
                                "domain": {"name": user_domain_name},
                                "password": password
                            }
                        }
                    },
                    "scope": {"project": project}
                }
            })
        }
    }
}

/// Finds the URL of `service_type` in the catalog of a token response.
fn find_endpoint(
    body: &Value,
    service_type: &str,
    interface: &str,
    region: Option<&str>,
) -> CloudResult<String> {
    let catalog = body["token"]["catalog"]
        .as_array()
        .ok_or_else(|| CloudError::InvalidResponse("Token has no service catalog".to_string()))?;

    catalog
        .iter()
        .filter(|service| service["type"].as_str() == Some(service_type))
        .filter_map(|service| service["endpoints"].as_array())
        .flatten()
        .filter(|endpoint| endpoint["interface"].as_str() == Some(interface))
        .find(|endpoint| match region {
            Some(region) => {
                endpoint["region_id"].as_str() == Some(region)
                    || endpoint["region"].as_str() == Some(region)
            }
            None => true,
        })
        .and_then(|endpoint| endpoint["url"].as_str())
        .map(|url| url.trim_end_matches('/').to_string())
        .ok_or_else(|| CloudError::Endpoint {
            service: service_type.to_string(),
            interface: interface.to_string(),
        })
}

/// Network and image catalog entries usually point to the unversioned root.
fn versioned(url: String, version: &str) -> String {
    if url.ends_with(&format!("/{version}")) {
        url
    } else {
        format!("{url}/{version}")
    }
}
