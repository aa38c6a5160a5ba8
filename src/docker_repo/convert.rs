// Convert raw Docker API responses into container entries and pid lists.

use super::ContainerEntry;
use crate::models::PortMapping;
use bollard::models::ContainerSummary;

pub(crate) fn container_entry(c: &ContainerSummary) -> Option<ContainerEntry> {
    let id = c.id.clone().filter(|id| !id.is_empty())?;
    let name = c
        .names
        .as_ref()
        .and_then(|n| n.first())
        .cloned()
        .unwrap_or_else(|| id.clone());
    let name = name.trim_start_matches('/').to_string();
    let ports = published_ports(
        c.ports
            .iter()
            .flatten()
            .map(|p| (p.public_port, p.private_port)),
    );
    Some(ContainerEntry { id, name, ports })
}

/// Keep published mappings only, dropping the IPv4/IPv6 duplicates Docker
/// reports for the same binding. Listing order is preserved.
pub(crate) fn published_ports(
    pairs: impl IntoIterator<Item = (Option<u16>, u16)>,
) -> Vec<PortMapping> {
    let mut out: Vec<PortMapping> = Vec::new();
    for (public, private) in pairs {
        let Some(host_port) = public.filter(|p| *p > 0) else {
            continue;
        };
        let mapping = PortMapping {
            host_port,
            container_port: private,
        };
        if !out.contains(&mapping) {
            out.push(mapping);
        }
    }
    out
}

/// Host pids from a `docker top` table, located by the "PID" column title.
pub(crate) fn pids_from_top(titles: &[String], rows: &[Vec<String>]) -> Vec<u32> {
    let Some(col) = titles.iter().position(|t| t.eq_ignore_ascii_case("pid")) else {
        return Vec::new();
    };
    rows.iter()
        .filter_map(|row| row.get(col)?.trim().parse().ok())
        .collect()
}
