//! Virtual multiplexer
//!
//! Speaks the switch wire protocol over any async stream so the engine can
//! be exercised end to end without a serial port. Fault injection covers the
//! failure shapes the link has to handle: silence and a garbled echo.

use std::io;
use std::sync::Arc;

use cart_link::{CHANNEL_BASE, MAX_CHANNEL, MODE_AUTO};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Simulated 8-channel switch
#[derive(Debug)]
pub struct VirtualMux {
    /// Currently routed channel (0 = all off)
    selected: u8,
    /// When false the mux swallows commands without replying
    pub responding: bool,
    /// Mode marker placed in reply byte 1
    pub mode_marker: u8,
    /// Corrupt the echo byte in replies (bad-firmware simulation)
    pub garble_echo: bool,
    /// Commands processed so far
    commands_seen: u32,
}

impl Default for VirtualMux {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualMux {
    pub fn new() -> Self {
        Self {
            selected: 0,
            responding: true,
            mode_marker: MODE_AUTO,
            garble_echo: false,
            commands_seen: 0,
        }
    }

    /// The channel currently routed.
    pub fn selected(&self) -> u8 {
        self.selected
    }

    /// Commands processed since construction.
    pub fn commands_seen(&self) -> u32 {
        self.commands_seen
    }

    /// Process one command byte, returning the reply to send (if any).
    pub fn process_command(&mut self, cmd: u8) -> Option<[u8; 4]> {
        self.commands_seen += 1;

        if !self.responding {
            debug!("virtual mux ignoring command 0x{:02X}", cmd);
            return None;
        }

        let channel = cmd.wrapping_sub(CHANNEL_BASE);
        if channel > MAX_CHANNEL {
            warn!("virtual mux got invalid command 0x{:02X}", cmd);
            return None;
        }

        self.selected = channel;
        debug!("virtual mux routed channel {}", channel);

        let echo = if self.garble_echo { cmd ^ 0xFF } else { cmd };
        Some([0x02, self.mode_marker, channel, echo])
    }
}

/// Serve the switch protocol on a stream until it closes.
pub async fn run_virtual_mux_task<S>(mut stream: S, mux: Arc<Mutex<VirtualMux>>) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    info!("virtual mux task started");
    let mut cmd = [0u8; 1];

    loop {
        match stream.read(&mut cmd).await {
            Ok(0) => {
                debug!("virtual mux stream closed");
                break;
            }
            Ok(_) => {
                let reply = mux.lock().await.process_command(cmd[0]);
                if let Some(reply) = reply {
                    stream.write_all(&reply).await?;
                    stream.flush().await?;
                }
            }
            Err(e) => {
                warn!("virtual mux stream error: {}", e);
                return Err(e);
            }
        }
    }

    info!("virtual mux task ended");
    Ok(())
}

/// Spawn a virtual mux on an in-memory duplex stream.
///
/// Returns the near end (to attach to a `MuxLink`) and the shared mux handle
/// for scripting faults mid-test.
pub fn spawn_virtual_mux() -> (DuplexStream, Arc<Mutex<VirtualMux>>) {
    let (near, far) = tokio::io::duplex(256);
    let mux = Arc::new(Mutex::new(VirtualMux::new()));
    let task_mux = Arc::clone(&mux);
    tokio::spawn(async move {
        let _ = run_virtual_mux_task(far, task_mux).await;
    });
    (near, mux)
}
