//! Switch-link access to the channel multiplexer
//!
//! The link owns the single serial connection to the mux and serializes
//! request/reply exchanges on it: one command byte out, a 4-byte reply back.
//! Selecting a channel electrically connects that channel's bench hardware
//! to the upstream serial port; channel 0 disconnects everything.
//!
//! The link never retries a failed exchange. Retry policy (pulse off, wait,
//! try again) belongs to the caller, which also decides whether a failure
//! means skip, warn, or abort.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use crate::error::LinkError;

/// Command byte base: channel `n` is selected by sending ASCII `'0' + n`.
pub const CHANNEL_BASE: u8 = 0x30;

/// Highest selectable channel. Channel 0 switches every channel off.
pub const MAX_CHANNEL: u8 = 8;

/// Reply mode marker: switch acknowledged in auto mode.
pub const MODE_AUTO: u8 = b'A';

/// Reply mode marker: switch acknowledged while in manual (front panel) mode.
pub const MODE_MANUAL: u8 = b'M';

/// Length of every switch reply.
pub const REPLY_LEN: usize = 4;

/// Switch link configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Reply wait bound per exchange (ms)
    pub reply_timeout_ms: u64,
    /// Baud rate used when opening candidate ports
    pub baud_rate: u32,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            reply_timeout_ms: 500,
            baud_rate: 9600,
        }
    }
}

/// Streams the link can drive (real serial ports or in-memory test streams)
pub trait LinkStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> LinkStream for T {}

/// Validate a 4-byte switch reply against the command byte that was sent.
///
/// A reply is accepted iff byte 1 carries one of the two mode markers and
/// byte 3 echoes the command byte.
pub fn validate_reply(sent: u8, reply: &[u8; REPLY_LEN]) -> bool {
    (reply[1] == MODE_AUTO || reply[1] == MODE_MANUAL) && reply[3] == sent
}

/// The switch link to the multiplexer
///
/// Exclusively owns the upstream serial connection. There is exactly one of
/// these per process; the channel registry funnels every switch command
/// through it.
pub struct MuxLink {
    stream: Option<Box<dyn LinkStream>>,
    port_name: Option<String>,
    config: LinkConfig,
}

impl MuxLink {
    /// Create an unbound link. Attach a transport before selecting channels.
    pub fn new(config: LinkConfig) -> Self {
        Self {
            stream: None,
            port_name: None,
            config,
        }
    }

    /// Bind a transport to the link.
    pub fn attach(&mut self, stream: Box<dyn LinkStream>, port_name: Option<String>) {
        debug!(
            "switch link bound to {}",
            port_name.as_deref().unwrap_or("<stream>")
        );
        self.stream = Some(stream);
        self.port_name = port_name;
    }

    /// Drop the transport, releasing the underlying port.
    pub fn detach(&mut self) {
        if self.stream.take().is_some() {
            debug!(
                "switch link released {}",
                self.port_name.as_deref().unwrap_or("<stream>")
            );
        }
        self.port_name = None;
    }

    /// Whether a transport is currently bound.
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Name of the bound serial port, if the transport came from one.
    pub fn port_name(&self) -> Option<&str> {
        self.port_name.as_deref()
    }

    /// The link configuration.
    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Select channel `channel` (0..=8, 0 = all off).
    ///
    /// Sends one command byte and waits up to the configured deadline for a
    /// validated 4-byte reply. A timeout or a bad reply fails the exchange
    /// without touching the transport; an I/O error additionally tears the
    /// transport down so a later discovery pass can rebind to another port.
    pub async fn select_channel(&mut self, channel: u8) -> Result<(), LinkError> {
        if channel > MAX_CHANNEL {
            return Err(LinkError::InvalidChannel(channel));
        }
        let stream = self.stream.as_mut().ok_or(LinkError::NoTransport)?;

        let cmd = CHANNEL_BASE + channel;
        trace!("switch command 0x{:02X} (channel {})", cmd, channel);

        if let Err(e) = stream.write_all(&[cmd]).await {
            warn!("switch link write failed: {}", e);
            self.teardown();
            return Err(LinkError::Io(e));
        }

        let mut reply = [0u8; REPLY_LEN];
        let deadline = Duration::from_millis(self.config.reply_timeout_ms);
        match timeout(deadline, stream.read_exact(&mut reply)).await {
            Ok(Ok(_)) => {
                if validate_reply(cmd, &reply) {
                    debug!("channel {} selected (reply {:02X?})", channel, reply);
                    Ok(())
                } else {
                    warn!("switch rejected channel {}: reply {:02X?}", channel, reply);
                    Err(LinkError::SwitchRejected { sent: cmd, reply })
                }
            }
            Ok(Err(e)) => {
                warn!("switch link read failed: {}", e);
                self.teardown();
                Err(LinkError::Io(e))
            }
            Err(_) => {
                trace!("no reply to channel {} within {:?}", channel, deadline);
                Err(LinkError::ReplyTimeout)
            }
        }
    }

    fn teardown(&mut self) {
        self.stream = None;
        self.port_name = None;
    }
}

impl std::fmt::Debug for MuxLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MuxLink")
            .field("port_name", &self.port_name)
            .field("connected", &self.stream.is_some())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tokio::io::duplex;

    /// Answer exactly one switch command on the far end of a duplex stream.
    async fn answer_one(stream: &mut (impl AsyncRead + AsyncWrite + Unpin), reply_of: impl Fn(u8) -> [u8; 4]) {
        let mut cmd = [0u8; 1];
        stream.read_exact(&mut cmd).await.unwrap();
        stream.write_all(&reply_of(cmd[0])).await.unwrap();
    }

    #[test]
    fn reply_validation_accepts_both_mode_markers() {
        let cmd = CHANNEL_BASE + 3;
        assert!(validate_reply(cmd, &[0x02, MODE_AUTO, 3, cmd]));
        assert!(validate_reply(cmd, &[0x02, MODE_MANUAL, 3, cmd]));
        assert!(!validate_reply(cmd, &[0x02, b'X', 3, cmd]));
        assert!(!validate_reply(cmd, &[0x02, MODE_AUTO, 3, cmd + 1]));
    }

    #[tokio::test]
    async fn select_without_transport_fails() {
        let mut link = MuxLink::new(LinkConfig::default());
        let err = link.select_channel(3).await.unwrap_err();
        assert!(matches!(err, LinkError::NoTransport));
    }

    #[tokio::test]
    async fn select_out_of_range_channel_fails() {
        let mut link = MuxLink::new(LinkConfig::default());
        let err = link.select_channel(9).await.unwrap_err();
        assert!(matches!(err, LinkError::InvalidChannel(9)));
    }

    #[tokio::test]
    async fn select_with_valid_reply_succeeds() {
        let (local, mut remote) = duplex(64);
        let mut link = MuxLink::new(LinkConfig::default());
        link.attach(Box::new(local), None);

        let responder =
            tokio::spawn(
                async move { answer_one(&mut remote, |cmd| [0x02, MODE_AUTO, 0, cmd]).await },
            );

        link.select_channel(5).await.unwrap();
        responder.await.unwrap();
        assert!(link.is_connected());
    }

    #[tokio::test]
    async fn bad_echo_is_rejected_without_teardown() {
        let (local, mut remote) = duplex(64);
        let mut link = MuxLink::new(LinkConfig::default());
        link.attach(Box::new(local), None);

        let responder = tokio::spawn(async move {
            answer_one(&mut remote, |cmd| [0x02, MODE_AUTO, 0, cmd ^ 0xFF]).await;
            remote
        });

        let err = link.select_channel(2).await.unwrap_err();
        assert!(matches!(err, LinkError::SwitchRejected { .. }));
        // A rejection is not a transport loss
        assert!(link.is_connected());
        drop(responder.await.unwrap());
    }

    #[tokio::test]
    async fn silent_switch_times_out() {
        let (local, _remote) = duplex(64);
        let mut link = MuxLink::new(LinkConfig {
            reply_timeout_ms: 20,
            ..Default::default()
        });
        link.attach(Box::new(local), None);

        let err = link.select_channel(1).await.unwrap_err();
        assert!(matches!(err, LinkError::ReplyTimeout));
        assert!(link.is_connected());
    }

    #[tokio::test]
    async fn io_error_tears_the_link_down() {
        let (local, remote) = duplex(64);
        let mut link = MuxLink::new(LinkConfig::default());
        link.attach(Box::new(local), Some("COM9".into()));

        // Closing the far end makes the reply read fail immediately
        drop(remote);

        let err = link.select_channel(4).await.unwrap_err();
        assert!(matches!(err, LinkError::Io(_)));
        assert!(!link.is_connected());
        assert!(link.port_name().is_none());
    }

    proptest! {
        #[test]
        fn only_marker_and_echo_matter(marker: u8, b0: u8, b2: u8, channel in 0u8..=8) {
            let cmd = CHANNEL_BASE + channel;
            let reply = [b0, marker, b2, cmd];
            let expected = marker == MODE_AUTO || marker == MODE_MANUAL;
            prop_assert_eq!(validate_reply(cmd, &reply), expected);
        }

        #[test]
        fn wrong_echo_never_validates(marker: u8, echo: u8, channel in 0u8..=8) {
            let cmd = CHANNEL_BASE + channel;
            prop_assume!(echo != cmd);
            prop_assert!(!validate_reply(cmd, &[0, marker, 0, echo]));
        }
    }
}
