//! Multiplexer discovery
//!
//! Walks the enumerated serial ports and probes each one with an all-off
//! switch command. The first port that returns a validated reply is the mux;
//! it stays bound to the link and the remaining ports are left untouched.

use std::time::Duration;

use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info, warn};

use crate::error::LinkError;
use crate::link::MuxLink;
use crate::scanner::PortScanner;

/// Probe a single port for the multiplexer.
///
/// Opens the port, lets it settle, binds it to the link, and issues one
/// all-off command. On a validated reply the binding is kept; otherwise the
/// link is detached again.
async fn probe_port(port_name: &str, link: &mut MuxLink) -> bool {
    let baud_rate = link.config().baud_rate;
    debug!("Probing {} at {} baud", port_name, baud_rate);

    let stream = match tokio_serial::new(port_name, baud_rate)
        .timeout(Duration::from_millis(100))
        .open_native_async()
    {
        Ok(s) => s,
        Err(e) => {
            warn!("Failed to open {}: {}", port_name, e);
            return false;
        }
    };

    // Give the port a moment to settle before talking to it
    tokio::time::sleep(Duration::from_millis(50)).await;

    link.attach(Box::new(stream), Some(port_name.to_string()));
    match link.select_channel(0).await {
        Ok(()) => {
            info!("Multiplexer found on {}", port_name);
            true
        }
        Err(e) => {
            debug!("No multiplexer on {}: {}", port_name, e);
            link.detach();
            false
        }
    }
}

/// Find the multiplexer among the available serial ports and bind it.
///
/// Each candidate port is probed in enumeration order; the first validated
/// reply wins and the link keeps that port. On failure the link is left
/// unbound and `NoDeviceFound` is returned.
pub async fn discover(link: &mut MuxLink) -> Result<String, LinkError> {
    let scanner = PortScanner::new();
    let ports = scanner.enumerate_ports()?;

    for port in &ports {
        if probe_port(&port.port, link).await {
            return Ok(port.port.clone());
        }
    }

    link.detach();
    Err(LinkError::NoDeviceFound)
}
