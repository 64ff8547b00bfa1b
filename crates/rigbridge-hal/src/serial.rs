//! Serial-port transport.
//!
//! The port is driven by two plain threads bridged into Tokio through
//! [`DeviceLink`] channels:
//!
//! | Thread | Loop |
//! |---|---|
//! | `serial-reader` | blocking `read_line` with a short timeout, forwards complete lines |
//! | `serial-writer` | blocking `recv` on the outbound channel, writes and flushes |
//!
//! The reader stops when the gateway drops its receiver (checked on every
//! read timeout); the writer stops when every sender is gone.  The port
//! closes once both threads have exited.  Read and write failures alike are
//! reported once on the inbound channel and never retried here.

use std::io::{BufRead, BufReader, ErrorKind, Read, Write};
use std::thread;
use std::time::Duration;

use rigbridge_types::TransportError;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::link::{self, DeviceLink, InboundLine};

/// Where and how to open the rig's serial port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialConfig {
    pub path: String,
    pub baud_rate: u32,
    /// How long one blocking read may wait before the reader re-checks
    /// whether the gateway is still listening.
    pub read_timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            path: "/dev/ttyUSB0".to_string(),
            baud_rate: 115_200,
            read_timeout: Duration::from_secs(1),
        }
    }
}

/// Open the configured port and start its reader and writer threads.
pub fn open_serial(config: &SerialConfig) -> Result<DeviceLink, TransportError> {
    let port = serialport::new(&config.path, config.baud_rate)
        .timeout(config.read_timeout)
        .open()
        .map_err(|e| TransportError::io(&config.path, e))?;
    let writer = port
        .try_clone()
        .map_err(|e| TransportError::io(&config.path, e))?;

    let (device_link, endpoint) = link::channel(config.path.clone());

    let name = config.path.clone();
    let failures = endpoint.inbound.clone();
    thread::Builder::new()
        .name("serial-reader".into())
        .spawn(move || read_loop(port, name, endpoint.inbound))
        .map_err(|e| TransportError::io(&config.path, e))?;

    let name = config.path.clone();
    thread::Builder::new()
        .name("serial-writer".into())
        .spawn(move || write_loop(writer, name, endpoint.outbound, failures))
        .map_err(|e| TransportError::io(&config.path, e))?;

    info!(port = %config.path, baud = config.baud_rate, "serial link open");
    Ok(device_link)
}

fn read_loop<R: Read>(port: R, name: String, lines: mpsc::Sender<InboundLine>) {
    let mut reader = BufReader::new(port);
    // Survives read timeouts so a line split across them is not lost.
    let mut line = String::new();
    loop {
        match reader.read_line(&mut line) {
            Ok(0) => {
                let _ = lines.blocking_send(Err(TransportError::Disconnected(name.clone())));
                break;
            }
            Ok(_) => {
                let complete = std::mem::take(&mut line);
                if lines.blocking_send(Ok(complete)).is_err() {
                    break;
                }
            }
            Err(e) if e.kind() == ErrorKind::TimedOut => {
                if lines.is_closed() {
                    break;
                }
            }
            Err(e) if e.kind() == ErrorKind::InvalidData => {
                warn!(port = %name, "dropping non-UTF-8 serial line");
                line.clear();
            }
            Err(e) => {
                error!(port = %name, error = %e, "serial read failed");
                let _ = lines.blocking_send(Err(TransportError::io(name.clone(), e)));
                break;
            }
        }
    }
    debug!(port = %name, "serial reader stopped");
}

fn write_loop<W: Write>(
    mut port: W,
    name: String,
    mut outbound: mpsc::Receiver<String>,
    failures: mpsc::Sender<InboundLine>,
) {
    while let Some(line) = outbound.blocking_recv() {
        if let Err(e) = port.write_all(line.as_bytes()).and_then(|()| port.flush()) {
            error!(port = %name, error = %e, "serial write failed");
            let _ = failures.blocking_send(Err(TransportError::io(name.clone(), e)));
            break;
        }
    }
    debug!(port = %name, "serial writer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io;

    /// Plays back a fixed sequence of read results, then reports end of file.
    struct ScriptedPort(VecDeque<io::Result<&'static [u8]>>);

    impl ScriptedPort {
        fn new(script: impl IntoIterator<Item = io::Result<&'static [u8]>>) -> Self {
            Self(script.into_iter().collect())
        }
    }

    impl Read for ScriptedPort {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.0.pop_front() {
                Some(Ok(chunk)) => {
                    buf[..chunk.len()].copy_from_slice(chunk);
                    Ok(chunk.len())
                }
                Some(Err(e)) => Err(e),
                None => Ok(0),
            }
        }
    }

    struct BrokenPort;

    impl Write for BrokenPort {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::from(ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn timed_out() -> io::Result<&'static [u8]> {
        Err(io::Error::from(ErrorKind::TimedOut))
    }

    fn read_all(port: ScriptedPort) -> Vec<InboundLine> {
        let (tx, mut rx) = mpsc::channel(16);
        read_loop(port, "scripted".into(), tx);
        let mut received = Vec::new();
        while let Ok(line) = rx.try_recv() {
            received.push(line);
        }
        received
    }

    #[test]
    fn line_split_by_a_timeout_is_kept_whole() {
        let port = ScriptedPort::new([
            Ok(&b"AAAA"[..]),
            timed_out(),
            timed_out(),
            Ok(&b"AAAA=\n"[..]),
        ]);
        assert_eq!(
            read_all(port),
            vec![
                Ok("AAAAAAAA=\n".to_string()),
                Err(TransportError::Disconnected("scripted".into())),
            ]
        );
    }

    #[test]
    fn non_utf8_line_is_dropped() {
        let port = ScriptedPort::new([Ok(&b"\xff\xfe\n"[..]), Ok(&b"AQ==\n"[..])]);
        assert_eq!(
            read_all(port),
            vec![
                Ok("AQ==\n".to_string()),
                Err(TransportError::Disconnected("scripted".into())),
            ]
        );
    }

    #[test]
    fn read_error_is_forwarded_and_stops_the_reader() {
        let port = ScriptedPort::new([
            Err(io::Error::from(ErrorKind::BrokenPipe)),
            Ok(&b"AQ==\n"[..]),
        ]);
        let received = read_all(port);
        assert_eq!(received.len(), 1);
        assert!(matches!(
            &received[0],
            Err(TransportError::Io { link, .. }) if link == "scripted"
        ));
    }

    #[test]
    fn reader_stops_on_timeout_once_the_gateway_is_gone() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        // Would report end of file if it read past the timeout.
        read_loop(ScriptedPort::new([timed_out()]), "scripted".into(), tx);
    }

    #[test]
    fn writer_flushes_each_line() {
        let (out_tx, out_rx) = mpsc::channel(4);
        let (fail_tx, mut fail_rx) = mpsc::channel(1);
        out_tx.try_send("AQ==\n".to_string()).unwrap();
        out_tx.try_send("Ag==\n".to_string()).unwrap();
        drop(out_tx);

        let mut written = Vec::new();
        write_loop(&mut written, "scripted".into(), out_rx, fail_tx);
        assert_eq!(written, b"AQ==\nAg==\n");
        assert!(fail_rx.try_recv().is_err());
    }

    #[test]
    fn write_error_is_reported_on_the_inbound_lane() {
        let (out_tx, out_rx) = mpsc::channel(4);
        let (fail_tx, mut fail_rx) = mpsc::channel(1);
        out_tx.try_send("AQ==\n".to_string()).unwrap();

        write_loop(BrokenPort, "scripted".into(), out_rx, fail_tx);
        let failure = fail_rx.try_recv().unwrap();
        assert!(matches!(
            failure,
            Err(TransportError::Io { ref link, .. }) if link == "scripted"
        ));
    }

    #[test]
    fn defaults_match_the_rig_firmware() {
        let config = SerialConfig::default();
        assert_eq!(config.baud_rate, 115_200);
        assert_eq!(config.path, "/dev/ttyUSB0");
    }

    #[test]
    fn opening_a_missing_port_is_a_transport_error() {
        let config = SerialConfig {
            path: "/dev/rigbridge-does-not-exist".into(),
            ..SerialConfig::default()
        };
        let err = open_serial(&config).unwrap_err();
        assert!(matches!(err, TransportError::Io { ref link, .. } if link == &config.path));
    }
}
