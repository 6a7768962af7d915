//! PromQL query building.
//!
//! Node bandwidth is read from node_exporter's per-device byte counters.
//! A node's usage over a window is the receive increase plus the
//! transmit increase for one `instance`/`device` pair.

use std::net::Ipv6Addr;
use std::time::Duration;

use nodescore_core::duration::format_duration;

/// node_exporter counter for bytes received per device.
pub const RECEIVE_BYTES_METRIC: &str = "node_network_receive_bytes_total";

/// node_exporter counter for bytes transmitted per device.
pub const TRANSMIT_BYTES_METRIC: &str = "node_network_transmit_bytes_total";

/// Build the query for bytes moved through `interface` on the
/// exporter at `address` during the last `window`.
///
/// No validation happens here; a bad address or interface produces a
/// query that matches nothing and fails downstream.
pub fn build_bandwidth_query(address: &str, interface: &str, window: Duration) -> String {
    let selector = format!(
        "{{instance=\"{}\",device=\"{}\"}}",
        escape_label_value(address),
        escape_label_value(interface)
    );
    let range = format_duration(window);

    format!(
        "increase({RECEIVE_BYTES_METRIC}{selector}[{range}]) + increase({TRANSMIT_BYTES_METRIC}{selector}[{range}])"
    )
}

/// Compose the `instance` label value node_exporter is scraped under.
///
/// IPv6 hosts are bracketed: `[fd00::1]:9100`.
pub fn instance_address(host: &str, port: u16) -> String {
    if host.parse::<Ipv6Addr>().is_ok() {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

fn escape_label_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out
}
