// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Testcontainers setup for ZooKeeper.
//!
//! Provides a ZooKeeper container plus a raw client for seeding the
//! cluster and running nodes the locator reads.

#![allow(dead_code)]

use super::running_record;
use canal_cluster_client::locator::{cluster_path, running_path};
use testcontainers::{clients::Cli, core::WaitFor, Container, GenericImage};
use zookeeper_client as zk;

/// Create a standalone ZooKeeper container.
///
/// Uses the official zookeeper:3.9 image. Waits for the client port bind.
pub fn zookeeper_container(docker: &Cli) -> Container<'_, GenericImage> {
    let image = GenericImage::new("zookeeper", "3.9")
        .with_exposed_port(2181)
        .with_wait_for(WaitFor::message_on_stdout("binding to port"));
    docker.run(image)
}

/// `host:port` endpoint for a container.
pub fn zk_endpoint(container: &Container<'_, GenericImage>) -> String {
    let port = container.get_host_port_ipv4(2181);
    format!("127.0.0.1:{}", port)
}

/// Raw client used to write the nodes a relay cluster would maintain.
pub struct ZkSeeder {
    client: zk::Client,
}

impl ZkSeeder {
    pub async fn connect(endpoint: &str) -> Result<Self, zk::Error> {
        let client = zk::Client::connect(endpoint).await?;
        Ok(Self { client })
    }

    /// Create `path` and any missing parents. Existing nodes are left alone.
    pub async fn create_all(&self, path: &str, data: &[u8]) -> Result<(), zk::Error> {
        let options = zk::CreateMode::Persistent.with_acls(zk::Acls::anyone_all());
        let mut current = String::new();
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        for (i, segment) in segments.iter().enumerate() {
            current.push('/');
            current.push_str(segment);
            let payload: &[u8] = if i + 1 == segments.len() { data } else { &[] };
            match self.client.create(&current, payload, &options).await {
                Ok(_) | Err(zk::Error::NodeExists) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Overwrite the data of an existing node.
    pub async fn set(&self, path: &str, data: &[u8]) -> Result<(), zk::Error> {
        self.client.set_data(path, data, None).await.map(|_| ())
    }

    /// Register a relay server under the destination's cluster node.
    pub async fn add_cluster_node(&self, root: &str, destination: &str, address: &str) -> Result<(), zk::Error> {
        let path = format!("{}/{}", cluster_path(root, destination), address);
        self.create_all(&path, &[]).await
    }

    /// Write (or overwrite) the running record for a destination.
    pub async fn set_running(&self, root: &str, destination: &str, address: &str) -> Result<(), zk::Error> {
        let path = running_path(root, destination);
        let data = running_record(address, true);
        self.create_all(&path, data.as_bytes()).await?;
        self.set(&path, data.as_bytes()).await
    }
}
