//! End-to-end exercise of spec.md §8's S1 scenario: a commissioner node
//! PASE-establishes against a freshly-started device, joins its fabric via
//! `ArmFailSafe`/`AddNOC`, establishes CASE, completes commissioning, and
//! toggles the demo on/off light.
//!
//! Runs the real `node` and `controller` binaries' library entry points
//! against each other over loopback UDP — no mocked transport or session
//! layer. Fixed ports (rather than `:0` + a discovered port) keep this
//! test simple, since this is the crate's only test that binds a socket
//! and there is no cross-test collision to worry about.

use controller::config::{ControllerConfig, FabricConfig as ControllerFabricConfig, ListenConfig as ControllerListenConfig, TargetConfig};
use node::config::{
    BdxConfig, CommissioningConfig, FabricConfig as NodeFabricConfig, InteractionConfig, ListenConfig as NodeListenConfig, NodeConfig,
    StorageConfig,
};
use tokio_util::sync::CancellationToken;

const NODE_ADDR: &str = "127.0.0.1:57540";
const CONTROLLER_ADDR: &str = "127.0.0.1:57541";

fn node_config() -> NodeConfig {
    NodeConfig {
        schema_version: 1,
        listen: NodeListenConfig { udp_bind: NODE_ADDR.to_owned() },
        commissioning: CommissioningConfig { passcode: 20202021, discriminator: 3840 },
        fabric: NodeFabricConfig { fabric_id: 1, vendor_id: 0xFFF1, node_id: 42 },
        storage: StorageConfig { sqlite_path: ":memory:".to_owned() },
        interaction: InteractionConfig { max_chunk_bytes: 1024, max_paths_per_invoke: 1 },
        bdx: BdxConfig { transport_max_block_size: 1024 },
    }
}

fn controller_config() -> ControllerConfig {
    ControllerConfig {
        schema_version: 1,
        listen: ControllerListenConfig { udp_bind: CONTROLLER_ADDR.to_owned() },
        target: TargetConfig { addr: NODE_ADDR.to_owned(), passcode: 20202021, node_id: 42 },
        fabric: ControllerFabricConfig { fabric_id: 1, vendor_id: 0xFFF1, admin_node_id: 7, ipk_value: [0x5A; 16] },
    }
}

#[tokio::test]
async fn commission_and_toggle_onoff_light() {
    let shutdown = CancellationToken::new();
    let node_shutdown = shutdown.clone();
    let node_task = tokio::spawn(async move { node::run(node_config(), node_shutdown).await });

    // Give the node's UDP socket a moment to bind before the commissioner
    // starts sending to it.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let result = tokio::time::timeout(std::time::Duration::from_secs(5), controller::run(controller_config())).await;
    shutdown.cancel();

    let run_result = result.expect("commissioning run did not finish within 5s (spec.md §8 S1 requires PASE < 5s)");
    run_result.expect("commissioning run failed");

    node_task.await.expect("node task panicked").expect("node exited with an error");
}
