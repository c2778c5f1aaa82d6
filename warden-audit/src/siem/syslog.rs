//! Syslog delivery adapter (RFC 5424-flavored)
//!
//! No external syslog crate is used — the framing is simple enough to
//! generate directly. Each event becomes one line:
//!
//! `<PRI>1 TIMESTAMP HOST audit PID ACTIVITY [ocsf@1 ...] MESSAGE`
//!
//! UDP sends one datagram per event; TCP opens one connection per batch,
//! writes newline-terminated lines, half-closes, and waits for the collector
//! to close the socket (10 s of inactivity is a hard failure).

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::timeout;

use super::endpoint::SyslogProtocol;
use super::BatchTransport;
use crate::error::{AuditError, Result};
use crate::event::{format_timestamp_ms, AuditEvent, CLASS_UID};

/// Syslog facility for audit messages (local0)
pub(crate) const SYSLOG_FACILITY: u8 = 16;

const TCP_INACTIVITY_TIMEOUT: Duration = Duration::from_secs(10);

/// Syslog transport for a single endpoint
pub(crate) struct SyslogTransport {
    host: String,
    port: u16,
    protocol: SyslogProtocol,
    app_host: String,
    pid: u32,
}

impl SyslogTransport {
    pub(crate) fn new(host: String, port: u16, protocol: SyslogProtocol, app_host: String) -> Self {
        Self {
            host,
            port,
            protocol,
            app_host,
            pid: std::process::id(),
        }
    }

    async fn deliver_udp(&self, events: &[AuditEvent]) -> Result<()> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        for event in events {
            let line = format_rfc5424(event, &self.app_host, self.pid);
            socket
                .send_to(line.as_bytes(), (self.host.as_str(), self.port))
                .await?;
        }
        Ok(())
    }

    async fn deliver_tcp(&self, events: &[AuditEvent]) -> Result<()> {
        let mut stream = timeout(
            TCP_INACTIVITY_TIMEOUT,
            TcpStream::connect((self.host.as_str(), self.port)),
        )
        .await
        .map_err(|_| AuditError::Delivery("syslog tcp connect timed out".into()))??;

        let mut payload = String::new();
        for event in events {
            payload.push_str(&format_rfc5424(event, &self.app_host, self.pid));
            payload.push('\n');
        }

        timeout(TCP_INACTIVITY_TIMEOUT, stream.write_all(payload.as_bytes()))
            .await
            .map_err(|_| AuditError::Delivery("syslog tcp write timed out".into()))??;

        // Half-close: signal end-of-batch, then wait for the collector to
        // close its side.
        timeout(TCP_INACTIVITY_TIMEOUT, stream.shutdown())
            .await
            .map_err(|_| AuditError::Delivery("syslog tcp shutdown timed out".into()))??;

        let mut buf = [0u8; 1024];
        loop {
            let n = timeout(TCP_INACTIVITY_TIMEOUT, stream.read(&mut buf))
                .await
                .map_err(|_| {
                    AuditError::Delivery("syslog tcp timed out waiting for close".into())
                })??;
            if n == 0 {
                return Ok(());
            }
        }
    }
}

#[async_trait]
impl BatchTransport for SyslogTransport {
    async fn deliver(&self, events: &[AuditEvent]) -> Result<()> {
        if self.host.is_empty() {
            return Err(AuditError::Endpoint("syslog endpoint requires a host".into()));
        }
        if self.port == 0 {
            return Err(AuditError::Endpoint("syslog endpoint requires a port".into()));
        }

        match self.protocol {
            SyslogProtocol::Udp => self.deliver_udp(events).await,
            SyslogProtocol::Tcp => self.deliver_tcp(events).await,
        }
    }
}

/// Format one event as an RFC 5424-flavored line.
///
/// PRI = facility(16) * 8 + syslog severity; the `[ocsf@1 ...]` structured
/// data element carries the numeric OCSF codes.
pub(crate) fn format_rfc5424(event: &AuditEvent, app_host: &str, pid: u32) -> String {
    let pri = (SYSLOG_FACILITY as u16) * 8 + event.severity.syslog_severity() as u16;
    format!(
        "<{}>1 {} {} audit {} {} [ocsf@1 class_uid=\"{}\" activity_id=\"{}\" category=\"{}\" severity=\"{}\" status=\"{}\"] {}",
        pri,
        format_timestamp_ms(event.time),
        app_host,
        pid,
        event.activity.label(),
        CLASS_UID,
        event.activity.id(),
        event.category.uid(),
        event.severity.id(),
        event.status.id(),
        event.message,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Activity, Category, ProductMetadata, Severity};
    use tokio::net::TcpListener;

    fn event(severity: Severity) -> AuditEvent {
        let mut e = AuditEvent::new(
            Category::Authentication,
            Activity::Deny,
            "access denied",
            ProductMetadata::default(),
        )
        .with_severity(severity);
        e.time = 0;
        e
    }

    #[test]
    fn pri_for_critical_is_130() {
        let line = format_rfc5424(&event(Severity::Critical), "warden", 42);
        assert!(line.starts_with("<130>1 1970-01-01T00:00:00.000Z warden audit 42 DENY "));
    }

    #[test]
    fn pri_for_informational_is_134() {
        let line = format_rfc5424(&event(Severity::Informational), "warden", 42);
        assert!(line.starts_with("<134>1 "));
    }

    #[test]
    fn structured_data_carries_ocsf_codes() {
        let line = format_rfc5424(&event(Severity::High), "warden", 1);
        assert!(line.contains(
            "[ocsf@1 class_uid=\"6003\" activity_id=\"6\" category=\"2\" severity=\"4\" status=\"1\"]"
        ));
        assert!(line.ends_with(" access denied"));
    }

    #[tokio::test]
    async fn udp_sends_one_datagram_per_event() {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = receiver.local_addr().unwrap().port();

        let transport = SyslogTransport::new(
            "127.0.0.1".into(),
            port,
            SyslogProtocol::Udp,
            "warden".into(),
        );
        let events = vec![event(Severity::Critical), event(Severity::Low)];
        transport.deliver(&events).await.unwrap();

        let mut buf = [0u8; 2048];
        let n = receiver.recv(&mut buf).await.unwrap();
        let first = String::from_utf8_lossy(&buf[..n]).to_string();
        assert!(first.starts_with("<130>1 "));

        let n = receiver.recv(&mut buf).await.unwrap();
        let second = String::from_utf8_lossy(&buf[..n]).to_string();
        assert!(second.starts_with("<133>1 "));
    }

    #[tokio::test]
    async fn tcp_writes_newline_framed_lines_and_waits_for_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            sock.read_to_end(&mut received).await.unwrap();
            // Dropping the socket closes it, letting the sender resolve.
            String::from_utf8(received).unwrap()
        });

        let transport = SyslogTransport::new(
            "127.0.0.1".into(),
            port,
            SyslogProtocol::Tcp,
            "warden".into(),
        );
        let events = vec![event(Severity::Medium), event(Severity::High)];
        transport.deliver(&events).await.unwrap();

        let received = server.await.unwrap();
        let lines: Vec<&str> = received.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("<132>1 "));
        assert!(lines[1].starts_with("<131>1 "));
        assert!(received.ends_with('\n'));
    }

    #[tokio::test(start_paused = true)]
    async fn tcp_inactivity_is_a_hard_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        // A collector that reads the batch but never closes its side.
        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let _ = sock.read_to_end(&mut buf).await;
            std::future::pending::<()>().await;
        });

        let transport = SyslogTransport::new(
            "127.0.0.1".into(),
            port,
            SyslogProtocol::Tcp,
            "warden".into(),
        );
        let err = transport.deliver(&[event(Severity::Low)]).await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
        server.abort();
    }

    #[tokio::test]
    async fn missing_host_is_an_endpoint_error() {
        let transport =
            SyslogTransport::new(String::new(), 514, SyslogProtocol::Udp, "warden".into());
        let err = transport.deliver(&[event(Severity::Low)]).await.unwrap_err();
        assert!(matches!(err, AuditError::Endpoint(_)));
    }
}
