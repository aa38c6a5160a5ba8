// JSON export document

use gtop::export::ExportDocument;
use gtop::models::{ContainerInfo, DeviceStat, PortMapping, ProcessRecord, Snapshot};
use std::collections::BTreeMap;

fn a100() -> DeviceStat {
    DeviceStat {
        index: 0,
        name: "NVIDIA A100".into(),
        util: 45,
        mem_used: 8192,
        mem_total: 40960,
        temp: 55,
        power: 120.5,
    }
}

fn training_process() -> ProcessRecord {
    ProcessRecord {
        gpu_index: 0,
        pid: 12345,
        name: "python".into(),
        cmdline: "python train.py --model large".into(),
        exe: Some("/usr/bin/python3".into()),
        mem_mb: 4096.5,
        host_mem_mb: 2048.0,
        container: Some(ContainerInfo {
            id: "c0ffee".into(),
            name: "pytorch-training".into(),
            ports: vec![
                PortMapping {
                    host_port: 8888,
                    container_port: 8888,
                },
                PortMapping {
                    host_port: 6006,
                    container_port: 6006,
                },
            ],
        }),
        inference: None,
    }
}

fn snapshot(devices: Vec<DeviceStat>, processes: BTreeMap<u32, Vec<ProcessRecord>>) -> Snapshot {
    Snapshot {
        sequence: 1,
        captured_at_ms: 0,
        devices,
        processes,
        budget_exceeded: false,
    }
}

#[test]
fn test_export_round_trip_preserves_all_fields() {
    let snap = snapshot(vec![a100()], BTreeMap::from([(0, vec![training_process()])]));
    let doc = ExportDocument::from_snapshot(&snap);
    let json = doc.to_json_pretty().unwrap();
    let decoded: ExportDocument = serde_json::from_str(&json).unwrap();
    assert_eq!(decoded, doc);

    assert_eq!(decoded.gpus, vec![a100()]);
    let procs = decoded.processes.get("0").expect("device 0 entry");
    assert_eq!(procs.len(), 1);
    let p = &procs[0];
    assert_eq!(p.gpu_index, 0);
    assert_eq!(p.pid, 12345);
    assert_eq!(p.name, "python");
    assert_eq!(p.cmdline, "python train.py --model large");
    assert_eq!(p.mem_mb, 4096.5);
    assert!(p.container);
    assert_eq!(p.container_name, "pytorch-training");
    assert_eq!(p.container_ports, "8888→8888, 6006→6006");
}

#[test]
fn test_export_schema_keys() {
    let snap = snapshot(vec![a100()], BTreeMap::from([(0, vec![training_process()])]));
    let value = serde_json::to_value(ExportDocument::from_snapshot(&snap)).unwrap();

    let gpu = &value["gpus"][0];
    for key in ["index", "name", "util", "mem_used", "mem_total", "temp", "power"] {
        assert!(gpu.get(key).is_some(), "gpu missing {}", key);
    }
    assert_eq!(gpu.as_object().unwrap().len(), 7);

    let process = &value["processes"]["0"][0];
    for key in [
        "gpu_index",
        "pid",
        "name",
        "cmdline",
        "mem_mb",
        "container",
        "container_name",
        "container_ports",
    ] {
        assert!(process.get(key).is_some(), "process missing {}", key);
    }
    assert_eq!(process.as_object().unwrap().len(), 8);
    assert_eq!(process["container"], serde_json::Value::Bool(true));
}

#[test]
fn test_export_keeps_device_order_and_idle_devices() {
    let mut second = a100();
    second.index = 3;
    let mut first = a100();
    first.index = 1;
    let snap = snapshot(vec![second, first], BTreeMap::new());
    let doc = ExportDocument::from_snapshot(&snap);

    let keys: Vec<&str> = doc.processes.0.iter().map(|(k, _)| k.as_str()).collect();
    assert_eq!(keys, vec!["3", "1"]);
    assert!(doc.processes.get("1").unwrap().is_empty());

    let json = doc.to_json_pretty().unwrap();
    assert!(json.find("\"3\"").unwrap() < json.find("\"1\"").unwrap());
    let decoded: ExportDocument = serde_json::from_str(&json).unwrap();
    assert_eq!(decoded.processes.0[0].0, "3");
}

#[test]
fn test_export_host_process_has_empty_container_fields() {
    let mut host = training_process();
    host.container = None;
    let snap = snapshot(vec![a100()], BTreeMap::from([(0, vec![host])]));
    let doc = ExportDocument::from_snapshot(&snap);
    let p = &doc.processes.get("0").unwrap()[0];
    assert!(!p.container);
    assert_eq!(p.container_name, "");
    assert_eq!(p.container_ports, "");
}

#[test]
fn test_export_empty_snapshot() {
    let doc = ExportDocument::from_snapshot(&Snapshot::default());
    let json = serde_json::to_string(&doc).unwrap();
    assert_eq!(json, r#"{"gpus":[],"processes":{}}"#);
}
