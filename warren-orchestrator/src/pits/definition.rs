//! Declarative container and network definitions
//!
//! Builds the JSON bodies posted to the container hosts.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Value, json};
use warren_core::domain::job::JobId;
use warren_core::domain::node::Node;

/// A container device, serialized in the hosts' device map format
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Device {
    Disk {
        path: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        source: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pool: Option<String>,
    },
    Nic {
        nictype: String,
        parent: String,
    },
    Gpu {
        id: String,
    },
}

impl Device {
    pub fn root() -> Self {
        Device::Disk {
            path: "/".to_string(),
            source: None,
            pool: Some("default".to_string()),
        }
    }

    /// Bind mount of a host directory
    pub fn share(path: impl Into<String>, source: impl Into<String>) -> Self {
        Device::Disk {
            path: path.into(),
            source: Some(source.into()),
            pool: None,
        }
    }

    /// Interface attached to a pit's overlay network
    pub fn overlay_nic(network: impl Into<String>) -> Self {
        Device::Nic {
            nictype: "bridged".to_string(),
            parent: network.into(),
        }
    }

    pub fn gpu(index: i32) -> Self {
        Device::Gpu { id: index.to_string() }
    }
}

/// Device map keyed by device name
pub type Devices = BTreeMap<String, Device>;

/// Where containers pull their image from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSource {
    /// Endpoint of the control node serving the images
    pub server: String,
    /// Control node certificate, trusted by the pulling node
    pub certificate: Option<String>,
    pub fingerprint: String,
}

/// Definition of a new container; the root disk is always added
pub fn container_definition(name: &str, image: &ImageSource, devices: &Devices) -> Value {
    let mut all = Devices::new();
    all.insert("root".to_string(), Device::root());
    all.extend(devices.iter().map(|(k, v)| (k.clone(), v.clone())));

    json!({
        "name": name,
        "architecture": "x86_64",
        "profiles": [],
        "ephemeral": false,
        "devices": all,
        "source": {
            "type": "image",
            "mode": "pull",
            "server": image.server,
            "protocol": "lxd",
            "certificate": image.certificate,
            "fingerprint": image.fingerprint,
        },
    })
}

/// Definition of a pit's overlay network as created on `local`
///
/// Holds one tunnel per other physical node, keyed by that node's id and
/// using the pit id as encapsulation id.
pub fn network_definition(name: &str, pit_id: JobId, local: &Node, nodes: &[Node]) -> Value {
    let mut config = BTreeMap::new();
    for remote in nodes.iter().filter(|n| n.endpoint != local.endpoint) {
        let tunnel = format!("tunnel.{}", remote.id);
        config.insert(format!("{}.protocol", tunnel), "vxlan".to_string());
        config.insert(format!("{}.id", tunnel), pit_id.to_string());
    }

    json!({
        "name": name,
        "config": config,
    })
}

/// Renders an environment map as `NAME=value` lines
pub fn env_file(env: &BTreeMap<String, String>) -> String {
    env.iter().map(|(name, value)| format!("{}={}\n", name, value)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, endpoint: &str) -> Node {
        Node::new(id, endpoint).unwrap()
    }

    #[test]
    fn test_devices_serialize_with_type_tag() {
        assert_eq!(
            serde_json::to_value(Device::gpu(2)).unwrap(),
            json!({"type": "gpu", "id": "2"})
        );
        assert_eq!(
            serde_json::to_value(Device::overlay_nic("pit3")).unwrap(),
            json!({"type": "nic", "nictype": "bridged", "parent": "pit3"})
        );
        assert_eq!(
            serde_json::to_value(Device::root()).unwrap(),
            json!({"type": "disk", "path": "/", "pool": "default"})
        );
        assert_eq!(
            serde_json::to_value(Device::share("/data/rw/home", "/srv/home/ada")).unwrap(),
            json!({"type": "disk", "path": "/data/rw/home", "source": "/srv/home/ada"})
        );
    }

    #[test]
    fn test_container_definition() {
        let image = ImageSource {
            server: "https://10.0.0.1:8443".to_string(),
            certificate: Some("CERT".to_string()),
            fingerprint: "abc".to_string(),
        };
        let mut devices = Devices::new();
        devices.insert("gpu0".to_string(), Device::gpu(0));

        let def = container_definition("pit-n1-3-0", &image, &devices);

        assert_eq!(def["name"], "pit-n1-3-0");
        assert_eq!(def["architecture"], "x86_64");
        assert_eq!(def["ephemeral"], false);
        assert_eq!(def["devices"]["root"]["pool"], "default");
        assert_eq!(def["devices"]["gpu0"]["type"], "gpu");
        assert_eq!(def["source"]["fingerprint"], "abc");
        assert_eq!(def["source"]["certificate"], "CERT");
    }

    #[test]
    fn test_network_definition_tunnels_to_other_nodes() {
        let nodes = vec![
            node("head", "https://10.0.0.1:8443"),
            node("n1", "https://10.0.0.2:8443"),
            node("n2", "https://10.0.0.3:8443"),
        ];

        let def = network_definition("pit9", 9, &nodes[1], &nodes);

        assert_eq!(
            def,
            json!({
                "name": "pit9",
                "config": {
                    "tunnel.head.protocol": "vxlan",
                    "tunnel.head.id": "9",
                    "tunnel.n2.protocol": "vxlan",
                    "tunnel.n2.id": "9",
                }
            })
        );
    }

    #[test]
    fn test_env_file() {
        let mut env = BTreeMap::new();
        env.insert("JOB_NUMBER".to_string(), "3".to_string());
        env.insert("PIT_WORKER_NUMBER".to_string(), "2".to_string());
        assert_eq!(env_file(&env), "JOB_NUMBER=3\nPIT_WORKER_NUMBER=2\n");
    }
}
