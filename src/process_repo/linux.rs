// Linux-specific helpers: /proc cgroup, fd table, TCP sockets, cpuinfo.

use crate::models::{Connection, OpenFile};
use std::collections::HashSet;
use std::net::{Ipv4Addr, Ipv6Addr};

/// Read first "model name" from /proc/cpuinfo. Prefer over sysinfo when it returns "cpu0" etc.
pub(super) fn read_cpu_model_linux() -> Option<String> {
    #[cfg(target_os = "linux")]
    {
        let content = std::fs::read_to_string("/proc/cpuinfo").ok()?;
        for line in content.lines() {
            if line.starts_with("model name") {
                let name = line
                    .find(": ")
                    .map(|i| line[i + 2..].trim())
                    .filter(|s| !s.is_empty() && *s != "cpu0")?;
                return Some(name.to_string());
            }
        }
    }
    None
}

pub(super) fn read_cgroup(pid: u32) -> Option<String> {
    std::fs::read_to_string(format!("/proc/{}/cgroup", pid)).ok()
}

/// Regular-file targets of /proc/<pid>/fd, lowest fd first. Devices, pipes,
/// sockets and directories are skipped.
pub(super) fn open_files(pid: u32, limit: usize) -> std::io::Result<Vec<OpenFile>> {
    let mut files: Vec<OpenFile> = fd_links(pid)?
        .into_iter()
        .filter(|(_, target)| target.starts_with('/'))
        .filter(|(_, target)| std::fs::metadata(target).is_ok_and(|m| m.is_file()))
        .map(|(fd, path)| OpenFile { fd, path })
        .collect();
    files.sort_by_key(|f| f.fd);
    files.truncate(limit);
    Ok(files)
}

/// TCP connections owned by `pid`, matched by socket inode against the
/// process's own network namespace view.
pub(super) fn connections(pid: u32, limit: usize) -> std::io::Result<Vec<Connection>> {
    let inodes: HashSet<u64> = fd_links(pid)?
        .iter()
        .filter_map(|(_, target)| socket_inode(target))
        .collect();
    if inodes.is_empty() {
        return Ok(Vec::new());
    }
    let mut out = Vec::new();
    for (file, kind) in [("tcp", "tcp"), ("tcp6", "tcp6")] {
        let Ok(content) = std::fs::read_to_string(format!("/proc/{}/net/{}", pid, file)) else {
            continue;
        };
        for entry in parse_proc_net_tcp(&content, kind == "tcp6") {
            if inodes.contains(&entry.inode) {
                out.push(Connection {
                    kind: kind.to_string(),
                    local: entry.local,
                    remote: entry.remote,
                    state: entry.state.to_string(),
                });
            }
        }
    }
    out.truncate(limit);
    Ok(out)
}

fn fd_links(pid: u32) -> std::io::Result<Vec<(u32, String)>> {
    let mut links = Vec::new();
    for entry in std::fs::read_dir(format!("/proc/{}/fd", pid))? {
        let Ok(entry) = entry else { continue };
        let Some(fd) = entry.file_name().to_str().and_then(|s| s.parse::<u32>().ok()) else {
            continue;
        };
        // fds can close between readdir and readlink
        if let Ok(target) = std::fs::read_link(entry.path()) {
            links.push((fd, target.to_string_lossy().into_owned()));
        }
    }
    Ok(links)
}

/// "socket:[12345]" → 12345
pub(super) fn socket_inode(link: &str) -> Option<u64> {
    link.strip_prefix("socket:[")?.strip_suffix(']')?.parse().ok()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct TcpEntry {
    pub local: String,
    pub remote: String,
    pub state: &'static str,
    pub inode: u64,
}

/// Parse the body of /proc/<pid>/net/tcp or tcp6. Malformed lines are skipped.
pub(super) fn parse_proc_net_tcp(content: &str, v6: bool) -> Vec<TcpEntry> {
    content
        .lines()
        .skip(1)
        .filter_map(|line| {
            let cols: Vec<&str> = line.split_whitespace().collect();
            if cols.len() < 10 {
                return None;
            }
            let local = decode_socket_addr(cols[1], v6)?;
            let remote = decode_socket_addr(cols[2], v6)?;
            let state = tcp_state(cols[3]);
            let inode = cols[9].parse().ok()?;
            let remote = if remote.ends_with(":0") && is_unspecified(cols[2]) {
                String::new()
            } else {
                remote
            };
            Some(TcpEntry {
                local,
                remote,
                state,
                inode,
            })
        })
        .collect()
}

fn is_unspecified(raw: &str) -> bool {
    raw.split(':')
        .next()
        .is_some_and(|ip| ip.chars().all(|c| c == '0'))
}

/// Kernel hex "0100007F:1F40" → "127.0.0.1:8000"; IPv6 words are little-endian u32s.
fn decode_socket_addr(raw: &str, v6: bool) -> Option<String> {
    let (ip_hex, port_hex) = raw.split_once(':')?;
    let port = u16::from_str_radix(port_hex, 16).ok()?;
    if v6 {
        if ip_hex.len() != 32 {
            return None;
        }
        let mut bytes = [0u8; 16];
        for word in 0..4 {
            let w = u32::from_str_radix(&ip_hex[word * 8..word * 8 + 8], 16).ok()?;
            bytes[word * 4..word * 4 + 4].copy_from_slice(&w.to_le_bytes());
        }
        Some(format!("[{}]:{}", Ipv6Addr::from(bytes), port))
    } else {
        let w = u32::from_str_radix(ip_hex, 16).ok()?;
        Some(format!("{}:{}", Ipv4Addr::from(w.to_le_bytes()), port))
    }
}

fn tcp_state(hex: &str) -> &'static str {
    match hex {
        "01" => "ESTABLISHED",
        "02" => "SYN_SENT",
        "03" => "SYN_RECV",
        "04" => "FIN_WAIT1",
        "05" => "FIN_WAIT2",
        "06" => "TIME_WAIT",
        "07" => "CLOSE",
        "08" => "CLOSE_WAIT",
        "09" => "LAST_ACK",
        "0A" => "LISTEN",
        "0B" => "CLOSING",
        _ => "UNKNOWN",
    }
}
