//! Serial port enumeration
//!
//! Lists candidate ports for multiplexer discovery, skipping ports that are
//! never a mux (Bluetooth bridges, debug consoles).

use serialport::{available_ports, SerialPortType};
use tracing::{debug, info};

use crate::error::LinkError;

/// Information about a serial port
#[derive(Debug, Clone)]
pub struct SerialPortInfo {
    /// Port name (e.g., /dev/ttyUSB0, COM3)
    pub port: String,
    /// USB Vendor ID (if USB)
    pub vid: Option<u16>,
    /// USB Product ID (if USB)
    pub pid: Option<u16>,
    /// USB serial number (if available)
    pub serial_number: Option<String>,
    /// USB product string
    pub product: Option<String>,
}

impl SerialPortInfo {
    fn from_serialport(name: String, port_type: &SerialPortType) -> Self {
        match port_type {
            SerialPortType::UsbPort(usb) => Self {
                port: name,
                vid: Some(usb.vid),
                pid: Some(usb.pid),
                serial_number: usb.serial_number.clone(),
                product: usb.product.clone(),
            },
            _ => Self {
                port: name,
                vid: None,
                pid: None,
                serial_number: None,
                product: None,
            },
        }
    }
}

/// Port scanner configuration
#[derive(Debug, Clone, Default)]
pub struct ScannerConfig {
    /// Skip ports matching these patterns
    pub skip_patterns: Vec<String>,
}

/// Serial port scanner
pub struct PortScanner {
    config: ScannerConfig,
}

impl PortScanner {
    /// Scanner with the default skip list: Bluetooth bridges and debug
    /// consoles are never the mux.
    pub fn new() -> Self {
        Self {
            config: ScannerConfig {
                skip_patterns: vec!["Bluetooth".to_string(), "debug".to_string()],
            },
        }
    }

    /// Scanner with a custom skip list
    pub fn with_config(config: ScannerConfig) -> Self {
        Self { config }
    }

    /// Enumerate the serial ports worth probing for the mux
    pub fn enumerate_ports(&self) -> Result<Vec<SerialPortInfo>, LinkError> {
        let candidates: Vec<_> = available_ports()
            .map_err(|e| LinkError::EnumerationFailed(e.to_string()))?
            .into_iter()
            .map(|p| SerialPortInfo::from_serialport(p.port_name, &p.port_type))
            .filter(|p| !self.should_skip_port(p))
            .collect();

        if candidates.is_empty() {
            info!("no candidate ports for mux discovery");
        } else {
            info!("{} candidate port(s) for mux discovery", candidates.len());
            for port in &candidates {
                debug!(
                    "candidate {} ({})",
                    port.port,
                    port.product.as_deref().unwrap_or("unknown")
                );
            }
        }

        Ok(candidates)
    }

    fn should_skip_port(&self, port: &SerialPortInfo) -> bool {
        self.config
            .skip_patterns
            .iter()
            .any(|pattern| port.port.contains(pattern))
    }
}

impl Default for PortScanner {
    fn default() -> Self {
        Self::new()
    }
}
