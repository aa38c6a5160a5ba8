// Snapshot assembly against in-memory sources

mod common;

use common::*;
use gtop::assembler::Assembler;
use gtop::config::InferenceConfig;
use gtop::correlator::ContainerCorrelator;
use gtop::docker_repo::{ContainerEntry, ContainerRuntime};
use gtop::models::PortMapping;
use gtop::triton::InferenceProber;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

const BUDGET: Duration = Duration::from_millis(800);

fn inference_config(probe_timeout_ms: u64) -> InferenceConfig {
    InferenceConfig {
        markers: vec!["tritonserver".into()],
        host: "127.0.0.1".into(),
        ports: vec![8000],
        probe_timeout_ms,
        ..Default::default()
    }
}

fn markers() -> Vec<String> {
    vec!["docker".into(), "kubepods".into()]
}

fn assembler(
    devices: Arc<FakeDevices>,
    table: Arc<FakeProcessTable>,
    runtime: Option<Arc<CountingRuntime>>,
    client: Option<Arc<CountingClient>>,
    probe_timeout_ms: u64,
) -> Assembler {
    let runtime = runtime.map(|r| r as Arc<dyn ContainerRuntime>);
    let prober = client.map(|c| Arc::new(InferenceProber::new(c, &inference_config(probe_timeout_ms))));
    Assembler::new(
        devices,
        table,
        ContainerCorrelator::new(runtime, markers()),
        prober,
        BUDGET,
    )
}

#[tokio::test]
async fn test_device_count_follows_collector_between_ticks() {
    let devices = Arc::new(FakeDevices::new(2, 1));
    let asm = assembler(devices.clone(), Arc::default(), None, None, 200);

    let first = asm.assemble(1).await;
    assert_eq!(first.devices.len(), 2);
    assert_eq!(first.processes.len(), 2);

    devices.count.store(3, Ordering::SeqCst);
    let second = asm.assemble(2).await;
    assert_eq!(second.sequence, 2);
    assert_eq!(second.devices.len(), 3);
    assert_eq!(second.processes_for(2).len(), 1);

    devices.count.store(0, Ordering::SeqCst);
    let third = asm.assemble(3).await;
    assert!(third.devices.is_empty());
    assert_eq!(third.process_count(), 0);
    assert!(!third.budget_exceeded);
}

#[tokio::test]
async fn test_every_device_has_a_process_entry_even_when_idle() {
    let asm = assembler(Arc::new(FakeDevices::new(2, 0)), Arc::default(), None, None, 200);
    let snapshot = asm.assemble(1).await;
    assert_eq!(snapshot.processes.keys().copied().collect::<Vec<_>>(), vec![0, 1]);
    assert_eq!(snapshot.process_count(), 0);
}

#[tokio::test]
async fn test_memory_units_are_mib() {
    let asm = assembler(Arc::new(FakeDevices::new(1, 2)), Arc::default(), None, None, 200);
    let snapshot = asm.assemble(1).await;
    for record in snapshot.processes_for(0) {
        assert_eq!(record.mem_mb, 512.0);
        assert_eq!(record.host_mem_mb, 100.0);
        assert_eq!(record.gpu_index, 0);
    }
}

#[tokio::test]
async fn test_vanished_process_is_dropped() {
    let gone = FakeDevices::pid(0, 1);
    let table = Arc::new(FakeProcessTable {
        gone: vec![gone],
        ..Default::default()
    });
    let asm = assembler(Arc::new(FakeDevices::new(1, 3)), table.clone(), None, None, 200);
    let snapshot = asm.assemble(1).await;
    let pids: Vec<u32> = snapshot.processes_for(0).iter().map(|r| r.pid).collect();
    assert_eq!(pids, vec![FakeDevices::pid(0, 0), FakeDevices::pid(0, 2)]);
    assert_eq!(table.lookups.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unreachable_runtime_degrades_to_uncontainerized() {
    let devices = Arc::new(FakeDevices::new(1, 3));
    let id = container_id(1);
    let cgroups: HashMap<u32, String> = (0..3)
        .map(|i| (FakeDevices::pid(0, i), docker_cgroup(&id)))
        .collect();
    let table = Arc::new(FakeProcessTable {
        cgroups,
        ..Default::default()
    });
    let runtime = Arc::new(CountingRuntime {
        containers: vec![ContainerEntry {
            id: id.clone(),
            name: "trainer".into(),
            ports: vec![],
        }],
        ..Default::default()
    });
    runtime.unreachable.store(true, Ordering::SeqCst);
    let asm = assembler(devices, table, Some(runtime.clone()), None, 200);

    for seq in 1..=3 {
        let snapshot = asm.assemble(seq).await;
        assert_eq!(snapshot.process_count(), 3);
        assert!(snapshot.processes_for(0).iter().all(|r| !r.is_containerized()));
        assert!(!snapshot.budget_exceeded);
    }

    runtime.unreachable.store(false, Ordering::SeqCst);
    let recovered = asm.assemble(4).await;
    assert!(recovered.processes_for(0).iter().all(|r| r.container_name() == "trainer"));
}

#[tokio::test]
async fn test_container_listing_happens_once_per_tick() {
    let ids: Vec<String> = (1..=3).map(container_id).collect();
    let devices = Arc::new(FakeDevices::new(2, 3));
    // No id in the cgroup path, so resolution falls back to container process tables.
    let mut cgroups = HashMap::new();
    let mut top: HashMap<String, Vec<u32>> = HashMap::new();
    for gpu in 0..2 {
        for i in 0..3 {
            let pid = FakeDevices::pid(gpu, i);
            cgroups.insert(pid, "0::/kubepods/besteffort/pod-a/worker\n".to_string());
            top.entry(ids[i as usize].clone()).or_default().push(pid);
        }
    }
    let runtime = Arc::new(CountingRuntime {
        containers: ids
            .iter()
            .enumerate()
            .map(|(n, id)| ContainerEntry {
                id: id.clone(),
                name: format!("job-{}", n),
                ports: vec![],
            })
            .collect(),
        top,
        ..Default::default()
    });
    let table = Arc::new(FakeProcessTable {
        cgroups,
        ..Default::default()
    });
    let asm = assembler(devices, table, Some(runtime.clone()), None, 200);

    let snapshot = asm.assemble(1).await;
    assert_eq!(runtime.list_calls.load(Ordering::SeqCst), 1);
    assert!(runtime.top_calls.load(Ordering::SeqCst) <= 3);
    assert_eq!(snapshot.processes_for(1)[2].container_name(), "job-2");
    assert!(snapshot.processes.values().flatten().all(|r| r.is_containerized()));

    asm.assemble(2).await;
    assert_eq!(runtime.list_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_container_id_in_cgroup_skips_process_tables() {
    let id = container_id(42);
    let pid = FakeDevices::pid(0, 0);
    let table = Arc::new(FakeProcessTable {
        cgroups: HashMap::from([(pid, docker_cgroup(&id))]),
        ..Default::default()
    });
    let ports = vec![PortMapping {
        host_port: 8888,
        container_port: 8888,
    }];
    let runtime = Arc::new(CountingRuntime {
        containers: vec![ContainerEntry {
            id: id.clone(),
            name: "notebook".into(),
            ports: ports.clone(),
        }],
        ..Default::default()
    });
    let asm = assembler(Arc::new(FakeDevices::new(1, 2)), table, Some(runtime.clone()), None, 200);

    let snapshot = asm.assemble(1).await;
    let records = snapshot.processes_for(0);
    let container = records[0].container.as_ref().expect("containerized");
    assert_eq!(container.id, id);
    assert_eq!(container.ports, ports);
    // Second pid has no cgroup: host process.
    assert!(!records[1].is_containerized());
    assert_eq!(runtime.top_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_only_marker_processes_are_probed() {
    let client = Arc::new(CountingClient::serving("http://127.0.0.1:8000"));
    let asm = assembler(
        Arc::new(FakeDevices::new(2, 4)),
        Arc::default(),
        None,
        Some(client.clone()),
        200,
    );
    let snapshot = asm.assemble(1).await;
    assert_eq!(client.calls(), 0);
    assert!(snapshot.processes.values().flatten().all(|r| r.inference.is_none()));
}

#[tokio::test]
async fn test_marker_process_gets_summary_probe() {
    let triton = FakeDevices::pid(1, 2);
    let table = Arc::new(FakeProcessTable {
        names: HashMap::from([(triton, "tritonserver".to_string())]),
        ..Default::default()
    });
    let client = Arc::new(CountingClient::serving("http://127.0.0.1:8000"));
    let asm = assembler(
        Arc::new(FakeDevices::new(2, 4)),
        table,
        None,
        Some(client.clone()),
        200,
    );

    let snapshot = asm.assemble(1).await;
    // live + repository index
    assert_eq!(client.calls(), 2);
    let record = snapshot
        .processes_for(1)
        .iter()
        .find(|r| r.pid == triton)
        .expect("triton record");
    let info = record.inference.as_ref().expect("probed");
    assert_eq!(info.server_url, "http://127.0.0.1:8000");
    assert_eq!(info.models.len(), 2);
    assert_eq!(info.ready_models(), 1);
    let others = snapshot.processes.values().flatten().filter(|r| r.pid != triton);
    assert!(others.into_iter().all(|r| r.inference.is_none()));
}

#[tokio::test]
async fn test_same_endpoints_are_probed_once_per_tick() {
    let names: HashMap<u32, String> = (0..3)
        .map(|i| (FakeDevices::pid(0, i), "tritonserver".to_string()))
        .collect();
    let table = Arc::new(FakeProcessTable {
        names,
        ..Default::default()
    });
    let client = Arc::new(CountingClient::serving("http://127.0.0.1:8000"));
    let asm = assembler(
        Arc::new(FakeDevices::new(1, 3)),
        table,
        None,
        Some(client.clone()),
        200,
    );

    let snapshot = asm.assemble(1).await;
    assert_eq!(client.calls(), 2);
    assert!(snapshot.processes_for(0).iter().all(|r| r.inference.is_some()));

    asm.assemble(2).await;
    assert_eq!(client.calls(), 4);
}

#[tokio::test]
async fn test_container_ports_are_tried_before_configured_ports() {
    let id = container_id(7);
    let pid = FakeDevices::pid(0, 0);
    let table = Arc::new(FakeProcessTable {
        names: HashMap::from([(pid, "tritonserver".to_string())]),
        cgroups: HashMap::from([(pid, docker_cgroup(&id))]),
        ..Default::default()
    });
    let runtime = Arc::new(CountingRuntime {
        containers: vec![ContainerEntry {
            id,
            name: "triton".into(),
            ports: vec![PortMapping {
                host_port: 18000,
                container_port: 8000,
            }],
        }],
        ..Default::default()
    });
    let client = Arc::new(CountingClient::serving("http://127.0.0.1:18000"));
    let asm = assembler(
        Arc::new(FakeDevices::new(1, 1)),
        table,
        Some(runtime),
        Some(client.clone()),
        200,
    );

    let snapshot = asm.assemble(1).await;
    let urls = client.urls.lock().unwrap().clone();
    assert_eq!(urls.first().map(String::as_str), Some("http://127.0.0.1:18000"));
    let info = snapshot.processes_for(0)[0].inference.as_ref().expect("probed");
    assert_eq!(info.server_url, "http://127.0.0.1:18000");
}

#[tokio::test]
async fn test_probe_refused_everywhere_leaves_inference_empty() {
    let pid = FakeDevices::pid(0, 0);
    let table = Arc::new(FakeProcessTable {
        names: HashMap::from([(pid, "tritonserver".to_string())]),
        ..Default::default()
    });
    let client = Arc::new(CountingClient::serving("http://nowhere:1"));
    let asm = assembler(Arc::new(FakeDevices::new(1, 1)), table, None, Some(client.clone()), 200);

    let snapshot = asm.assemble(1).await;
    assert_eq!(client.calls(), 1);
    assert!(snapshot.processes_for(0)[0].inference.is_none());
    assert!(!snapshot.budget_exceeded);
}

#[tokio::test(start_paused = true)]
async fn test_hanging_probe_does_not_delay_publication() {
    let pid = FakeDevices::pid(0, 0);
    let table = Arc::new(FakeProcessTable {
        names: HashMap::from([(pid, "tritonserver".to_string())]),
        ..Default::default()
    });
    let client = Arc::new(CountingClient::hanging());
    let asm = assembler(
        Arc::new(FakeDevices::new(1, 2)),
        table,
        None,
        Some(client.clone()),
        60_000,
    );

    let started = tokio::time::Instant::now();
    let snapshot = asm.assemble(1).await;
    let elapsed = started.elapsed();

    assert!(elapsed <= BUDGET + Duration::from_millis(50), "took {:?}", elapsed);
    assert!(snapshot.budget_exceeded);
    assert_eq!(snapshot.devices.len(), 1);
    assert_eq!(snapshot.process_count(), 2);
    assert!(snapshot.processes_for(0)[0].inference.is_none());
    assert!(client.calls() >= 1);
}

#[tokio::test]
async fn test_export_assembly_skips_probing() {
    let pid = FakeDevices::pid(0, 0);
    let table = Arc::new(FakeProcessTable {
        names: HashMap::from([(pid, "tritonserver".to_string())]),
        ..Default::default()
    });
    let client = Arc::new(CountingClient::serving("http://127.0.0.1:8000"));
    let asm = assembler(Arc::new(FakeDevices::new(1, 1)), table, None, Some(client.clone()), 200)
        .without_probing();
    let snapshot = asm.assemble(1).await;
    assert_eq!(client.calls(), 0);
    assert_eq!(snapshot.process_count(), 1);
}
