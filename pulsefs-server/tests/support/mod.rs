//! Shared fixtures: in-process PulseFS members on ephemeral ports.

// not every test binary uses every fixture
#![allow(dead_code)]

use std::time::Duration;

use pulsefs_server::{Server, ServerConfig};
use tempfile::TempDir;

/// Short timeout keeps elections and liveness snappy in tests.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(1);

/// A running member plus its scratch directory; dropping the fixture
/// removes the on-disk state.
pub struct TestMember {
    pub server: Server,
    pub base_url: String,
    _data_root: TempDir,
}

impl TestMember {
    pub async fn shutdown(self) {
        self.server.shutdown().await;
    }
}

pub async fn start_member(join: Option<String>) -> TestMember {
    let data_root = TempDir::new().expect("tempdir");
    let server = Server::spawn(ServerConfig {
        port: 0,
        addr: "127.0.0.1:0".to_string(),
        join,
        timeout: TEST_TIMEOUT,
        data_root: data_root.path().to_path_buf(),
    })
    .await
    .expect("server spawn");
    let base_url = server.base_url();
    TestMember {
        server,
        base_url,
        _data_root: data_root,
    }
}

/// Start a lone member and wait until it has elected itself and registered
/// under `/pulsefs/servers`.
pub async fn start_server() -> TestMember {
    let member = start_member(None).await;
    wait_for_members(&member.base_url, 1).await;
    member
}

/// Start an `n`-member cluster; every member has settled on the same
/// membership view before this returns.
pub async fn start_cluster(n: usize) -> Vec<TestMember> {
    let first = start_member(None).await;
    wait_for_members(&first.base_url, 1).await;

    let mut members = vec![first];
    for _ in 1..n {
        let joiner = start_member(Some(members[0].server.id.clone())).await;
        members.push(joiner);
    }
    for member in &members {
        wait_for_members(&member.base_url, n).await;
    }
    members
}

/// Poll until `/pulsefs/servers` on `base_url` lists exactly `n` members.
pub async fn wait_for_members(base_url: &str, n: usize) {
    let client = reqwest::Client::new();
    for _ in 0..100 {
        if let Ok(res) = client
            .get(format!("{base_url}/pulsefs/servers"))
            .send()
            .await
            && res.status().is_success()
            && let Ok(body) = res.json::<serde_json::Value>().await
            && body["children"].as_array().map(Vec::len) == Some(n)
        {
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("{base_url} never converged on {n} members");
}

/// Retry an idempotent request until the expected status comes back; used
/// where replication or election timing is involved.
pub async fn get_until_status(url: &str, expected: reqwest::StatusCode) -> reqwest::Response {
    let client = reqwest::Client::new();
    for _ in 0..100 {
        if let Ok(res) = client.get(url).send().await
            && res.status() == expected
        {
            return res;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("{url} never answered {expected}");
}
