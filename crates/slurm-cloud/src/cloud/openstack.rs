use reqwest::{Client, Method, StatusCode};
use serde_json::{Value, json};
use tokio::sync::OnceCell;

use crate::InstanceId;
use crate::cloud::auth::{Session, authenticate};
use crate::cloud::{
    CloudError, CloudGateway, CloudInstance, CloudObject, CloudResult, DeleteMode,
    InstanceSpec, InstanceStatus, NetworkAttachment,
};
use crate::common::config::CloudConfig;

/// [`CloudGateway`] backed by the OpenStack compute (Nova), network (Neutron) and image
/// (Glance) APIs.
///
/// The client authenticates lazily on its first request, so creating it never touches the
/// network.
pub struct OpenStackClient {
    client: Client,
    config: CloudConfig,
    session: OnceCell<Session>,
}

impl OpenStackClient {
    pub fn new(config: CloudConfig) -> crate::Result<Self> {
        // Default reqwest client has no overall timeout, a stalled API would block the hook
        // until Slurm kills it.
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.timeout)
            .user_agent(concat!("slurm-cloud/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(CloudError::from)?;
        Ok(Self {
            client,
            config,
            session: OnceCell::new(),
        })
    }

    async fn session(&self) -> CloudResult<&Session> {
        self.session
            .get_or_try_init(|| authenticate(&self.client, &self.config))
            .await
    }

    /// Sends a request to one of the APIs.
    /// Returns [`None`] if the API answered with `404 Not Found`.
    async fn call(
        &self,
        method: Method,
        url: &str,
        query: &[(&str, &str)],
        body: Option<&Value>,
    ) -> CloudResult<Option<Value>> {
        let session = self.session().await?;
        log::debug!("{method} {url} {query:?}");

        let mut request = self
            .client
            .request(method.clone(), url)
            .header("X-Auth-Token", &session.token)
            .header(reqwest::header::ACCEPT, "application/json");
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CloudError::Api {
                status: status.as_u16(),
                method: method.to_string(),
                url: url.to_string(),
                body,
            });
        }
        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Ok(Some(Value::Null));
        }
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| CloudError::InvalidResponse(format!("{method} {url}: {e}")))
    }

    async fn get(&self, url: &str, query: &[(&str, &str)]) -> CloudResult<Option<Value>> {
        self.call(Method::GET, url, query, None).await
    }

    /// Like [`Self::call`], but a missing resource is an error.
    async fn call_existing(&self, method: Method, url: &str, body: &Value) -> CloudResult<Value> {
        self.call(method.clone(), url, &[], Some(body))
            .await?
            .ok_or_else(|| CloudError::Api {
                status: StatusCode::NOT_FOUND.as_u16(),
                method: method.to_string(),
                url: url.to_string(),
                body: String::new(),
            })
    }

    /// Looks the resource up by id and then, if that fails, by name.
    async fn find_by_name_or_id(
        &self,
        kind: &'static str,
        name_or_id: &str,
        by_id: Lookup<'_>,
        by_name: Lookup<'_>,
    ) -> CloudResult<Option<CloudObject>> {
        if let Some(body) = self.get(&by_id.url, &[]).await? {
            let object = by_id.extract(&body);
            if let Some(object) = object.into_iter().next() {
                return Ok(Some(object));
            }
        }
        let Some(body) = self.get(&by_name.url, by_name.query).await? else {
            return Ok(None);
        };
        let matches: Vec<CloudObject> = by_name
            .extract(&body)
            .into_iter()
            .filter(|object| object.name.as_deref() == Some(name_or_id))
            .collect();
        single_match(kind, name_or_id, matches)
    }
}

/// Where to look for a resource and how to read it from the response body.
struct Lookup<'a> {
    url: String,
    query: &'a [(&'a str, &'a str)],
    /// `None` for APIs (Glance) that return the object without a wrapping key.
    key: Option<&'static str>,
}

impl Lookup<'_> {
    fn extract(&self, body: &Value) -> Vec<CloudObject> {
        let value = match self.key {
            Some(key) => &body[key],
            None => body,
        };
        match value {
            Value::Array(items) => items.iter().filter_map(parse_object).collect(),
            value => parse_object(value).into_iter().collect(),
        }
    }
}

impl CloudGateway for OpenStackClient {
    async fn find_image(&self, name_or_id: &str) -> CloudResult<Option<CloudObject>> {
        let root = &self.session().await?.image;
        self.find_by_name_or_id(
            "image",
            name_or_id,
            Lookup {
                url: format!("{root}/images/{name_or_id}"),
                query: &[],
                key: None,
            },
            Lookup {
                url: format!("{root}/images"),
                query: &[("name", name_or_id)],
                key: Some("images"),
            },
        )
        .await
    }

    async fn find_flavor(&self, name_or_id: &str) -> CloudResult<Option<CloudObject>> {
        let root = &self.session().await?.compute;
        self.find_by_name_or_id(
            "flavor",
            name_or_id,
            Lookup {
                url: format!("{root}/flavors/{name_or_id}"),
                query: &[],
                key: Some("flavor"),
            },
            Lookup {
                url: format!("{root}/flavors/detail"),
                query: &[("is_public", "None")],
                key: Some("flavors"),
            },
        )
        .await
    }

    async fn find_network(&self, name_or_id: &str) -> CloudResult<Option<CloudObject>> {
        let root = &self.session().await?.network;
        self.find_by_name_or_id(
            "network",
            name_or_id,
            Lookup {
                url: format!("{root}/networks/{name_or_id}"),
                query: &[],
                key: Some("network"),
            },
            Lookup {
                url: format!("{root}/networks"),
                query: &[("name", name_or_id)],
                key: Some("networks"),
            },
        )
        .await
    }

    async fn find_keypair(&self, name: &str) -> CloudResult<Option<CloudObject>> {
        let root = &self.session().await?.compute;
        let url = format!("{root}/os-keypairs/{name}");
        Ok(self.get(&url, &[]).await?.and_then(|body| {
            body["keypair"]["name"]
                .as_str()
                .map(|name| CloudObject::new(name, Some(name.to_string())))
        }))
    }

    async fn find_port(&self, name: &str, network_id: &str) -> CloudResult<Option<CloudObject>> {
        let root = &self.session().await?.network;
        let url = format!("{root}/ports");
        let Some(body) = self
            .get(&url, &[("name", name), ("network_id", network_id)])
            .await?
        else {
            return Ok(None);
        };
        let ports = Lookup {
            url,
            query: &[],
            key: Some("ports"),
        }
        .extract(&body);
        single_match("port", name, ports)
    }

    async fn create_instance(&self, spec: &InstanceSpec) -> CloudResult<InstanceId> {
        let url = format!("{}/servers", self.session().await?.compute);
        let response = self
            .call_existing(Method::POST, &url, &create_server_body(spec))
            .await?;
        response["server"]["id"]
            .as_str()
            .map(|id| id.to_string())
            .ok_or_else(|| CloudError::InvalidResponse("No server id in create response".into()))
    }

    async fn delete_instance(&self, id: &str, mode: DeleteMode) -> CloudResult<()> {
        let root = &self.session().await?.compute;
        if mode == DeleteMode::Force {
            let url = format!("{root}/servers/{id}/action");
            match self
                .call(Method::POST, &url, &[], Some(&json!({"forceDelete": null})))
                .await
            {
                Ok(_) => return Ok(()),
                // Only soft-deleted instances can be force deleted
                Err(CloudError::Api { status: 409, .. }) => {
                    log::debug!("Force delete of {id} refused, deleting normally");
                }
                Err(error) => return Err(error),
            }
        }
        let url = format!("{root}/servers/{id}");
        if self.call(Method::DELETE, &url, &[], None).await?.is_none() {
            log::warn!("Instance {id} does not exist anymore");
        }
        Ok(())
    }

    async fn get_instance(&self, id: &str) -> CloudResult<Option<CloudInstance>> {
        let url = format!("{}/servers/{id}", self.session().await?.compute);
        match self.get(&url, &[]).await? {
            Some(body) => parse_server(&body["server"]).map(Some),
            None => Ok(None),
        }
    }

    async fn find_server_by_name(&self, name: &str) -> CloudResult<Option<CloudInstance>> {
        let url = format!("{}/servers/detail", self.session().await?.compute);
        // Nova treats the name filter as a regular expression
        let pattern = format!("^{}$", escape_regex(name));
        let Some(body) = self.get(&url, &[("name", pattern.as_str())]).await? else {
            return Ok(None);
        };
        let servers = body["servers"]
            .as_array()
            .ok_or_else(|| CloudError::InvalidResponse("Missing `servers` list".into()))?;
        let mut matches = servers
            .iter()
            .map(parse_server)
            .collect::<CloudResult<Vec<_>>>()?;
        matches.retain(|server| server.name == name);
        match matches.len() {
            0 | 1 => Ok(matches.pop()),
            count => Err(CloudError::Ambiguous {
                kind: "server",
                query: name.to_string(),
                count,
            }),
        }
    }

    async fn rebuild_instance(&self, id: &str, image_id: &str, name: &str) -> CloudResult<()> {
        let url = format!("{}/servers/{id}/action", self.session().await?.compute);
        let body = json!({"rebuild": {"imageRef": image_id, "name": name}});
        self.call_existing(Method::POST, &url, &body).await?;
        Ok(())
    }
}

fn single_match(
    kind: &'static str,
    query: &str,
    mut matches: Vec<CloudObject>,
) -> CloudResult<Option<CloudObject>> {
    match matches.len() {
        0 | 1 => Ok(matches.pop()),
        count => Err(CloudError::Ambiguous {
            kind,
            query: query.to_string(),
            count,
        }),
    }
}

fn parse_object(value: &Value) -> Option<CloudObject> {
    let id = value["id"].as_str()?;
    Some(CloudObject::new(
        id,
        value["name"].as_str().map(|name| name.to_string()),
    ))
}

fn parse_server(value: &Value) -> CloudResult<CloudInstance> {
    let field = |key: &str| {
        value[key]
            .as_str()
            .ok_or_else(|| CloudError::InvalidResponse(format!("Server is missing `{key}`")))
    };
    Ok(CloudInstance {
        id: field("id")?.to_string(),
        name: field("name")?.to_string(),
        // Volume-backed servers report `"image": ""`
        image_id: value["image"]["id"].as_str().map(|id| id.to_string()),
        status: InstanceStatus::from(field("status")?),
        fault_message: value["fault"]["message"]
            .as_str()
            .map(|message| message.to_string()),
    })
}

fn create_server_body(spec: &InstanceSpec) -> Value {
    let network = match &spec.attachment {
        NetworkAttachment::Network(id) => json!({"uuid": id}),
        NetworkAttachment::Port(id) => json!({"port": id}),
    };
    json!({
        "server": {
            "name": spec.name,
            "imageRef": spec.image_id,
            "flavorRef": spec.flavor_id,
            "key_name": spec.keypair,
            "networks": [network]
        }
    })
}

fn escape_regex(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if "\\.+*?()|[]{}^$".contains(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::cloud::openstack::{
        Lookup, create_server_body, escape_regex, parse_server, single_match,
    };
    use crate::cloud::{
        CloudError, CloudObject, InstanceSpec, InstanceStatus, NetworkAttachment,
    };

    #[test]
    fn parse_failed_server() {
        let body = json!({
            "id": "6a1b", "name": "cloud-1", "status": "ERROR",
            "image": {"id": "img-1", "links": []},
            "fault": {"code": 500, "message": "No valid host was found. There are not enough hosts available."}
        });
        let server = parse_server(&body).unwrap();
        assert_eq!(server.id, "6a1b");
        assert_eq!(server.status, InstanceStatus::Error);
        assert_eq!(server.image_id.as_deref(), Some("img-1"));
        assert!(
            server
                .fault_message
                .unwrap()
                .contains("not enough hosts available")
        );
    }

    #[test]
    fn parse_volume_backed_server() {
        let body = json!({"id": "1", "name": "cloud-2", "status": "ACTIVE", "image": ""});
        let server = parse_server(&body).unwrap();
        assert_eq!(server.image_id, None);
        assert_eq!(server.fault_message, None);
        assert_eq!(server.status, InstanceStatus::Active);
    }

    #[test]
    fn parse_server_without_status() {
        assert!(matches!(
            parse_server(&json!({"id": "1", "name": "x"})),
            Err(CloudError::InvalidResponse(_))
        ));
    }

    #[test]
    fn create_body_uses_port_or_network() {
        let mut spec = InstanceSpec {
            name: "cloud-1".to_string(),
            image_id: "img".to_string(),
            flavor_id: "flv".to_string(),
            keypair: "slurm".to_string(),
            attachment: NetworkAttachment::Network("net".to_string()),
        };
        let body = create_server_body(&spec);
        assert_eq!(body["server"]["networks"], json!([{"uuid": "net"}]));
        assert_eq!(body["server"]["key_name"], "slurm");
        assert_eq!(body["server"]["imageRef"], "img");

        spec.attachment = NetworkAttachment::Port("port".to_string());
        let body = create_server_body(&spec);
        assert_eq!(body["server"]["networks"], json!([{"port": "port"}]));
    }

    #[test]
    fn lookup_extracts_wrapped_and_plain_objects() {
        let plain = Lookup {
            url: String::new(),
            query: &[],
            key: None,
        };
        assert_eq!(
            plain.extract(&json!({"id": "i", "name": "rocky"})),
            vec![CloudObject::new("i", Some("rocky".to_string()))]
        );
        let list = Lookup {
            url: String::new(),
            query: &[],
            key: Some("networks"),
        };
        assert_eq!(
            list.extract(&json!({"networks": [{"id": "a", "name": "n"}, {"name": "no-id"}]})),
            vec![CloudObject::new("a", Some("n".to_string()))]
        );
        assert!(list.extract(&json!({})).is_empty());
    }

    #[test]
    fn more_than_one_match_is_ambiguous() {
        let objects = vec![
            CloudObject::new("a", Some("img".to_string())),
            CloudObject::new("b", Some("img".to_string())),
        ];
        assert!(matches!(
            single_match("image", "img", objects),
            Err(CloudError::Ambiguous { count: 2, .. })
        ));
        assert_eq!(single_match("image", "img", vec![]).unwrap(), None);
    }

    #[test]
    fn escape_node_names() {
        assert_eq!(escape_regex("cloud-1"), "cloud-1");
        assert_eq!(escape_regex("a.b[1]"), "a\\.b\\[1\\]");
    }
}
