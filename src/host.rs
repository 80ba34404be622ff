//! Native-messaging host: length-prefixed JSON frames on stdin/stdout.

use std::cell::RefCell;
use std::io::{self, Read, Write};

use serde::Serialize;

use crate::capture::{MenuItem, MenuService, SurfaceLauncher};
use crate::engine::Coordinator;
use crate::errors::{ClipError, Result};
use crate::protocol::{CaptureData, ContextId, Envelope, Message, Notifier, Reply, Response};
use crate::surface::EditorParams;

/// Largest frame the browser accepts from a host.
pub const MAX_OUTBOUND_FRAME: usize = 1024 * 1024;
/// Largest frame the browser will send to a host.
pub const MAX_INBOUND_FRAME: usize = 64 * 1024 * 1024;

/// Reads one frame body. `Ok(None)` on a clean end of stream.
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    let mut filled = 0;
    while filled < len_buf.len() {
        match reader.read(&mut len_buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => {
                return Err(ClipError::Protocol("truncated frame header".into()));
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }

    let len = u32::from_ne_bytes(len_buf) as usize;
    if len > MAX_INBOUND_FRAME {
        return Err(ClipError::Protocol(format!("frame of {} bytes is too large", len)));
    }
    let mut body = Vec::new();
    reader.take(len as u64).read_to_end(&mut body)?;
    if body.len() != len {
        return Err(ClipError::Protocol(format!(
            "frame body ended after {} of {} bytes",
            body.len(),
            len
        )));
    }
    Ok(Some(body))
}

pub fn write_frame<W: Write, T: Serialize>(writer: &mut W, value: &T) -> Result<()> {
    let body = serde_json::to_vec(value)?;
    if body.len() > MAX_OUTBOUND_FRAME {
        return Err(ClipError::Protocol(format!(
            "outgoing frame of {} bytes exceeds the 1 MiB limit",
            body.len()
        )));
    }
    writer.write_all(&(body.len() as u32).to_ne_bytes())?;
    writer.write_all(&body)?;
    writer.flush()?;
    Ok(())
}

/// Outbound side of the host connection. The browser shim turns these
/// frames into tab messages, script injection and window creation.
pub struct HostChannel<W: Write> {
    out: RefCell<W>,
}

impl<W: Write> HostChannel<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: RefCell::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }

    pub fn send<T: Serialize>(&self, value: &T) -> Result<()> {
        write_frame(&mut *self.out.borrow_mut(), value)
    }
}

impl<W: Write> Notifier for HostChannel<W> {
    fn notify(&self, target: ContextId, message: Message) {
        if let Err(e) = self.send(&Envelope::to_tab(target, message)) {
            tracing::debug!(tab = target, error = %e, "notification dropped");
        }
    }
}

impl<W: Write> SurfaceLauncher for HostChannel<W> {
    fn show_overlay(&self, tab: ContextId, data: &CaptureData) -> Result<()> {
        self.send(&Envelope::to_tab(tab, Message::InjectOverlay))?;
        self.send(&Envelope::to_tab(
            tab,
            Message::ShowClipping { data: data.clone() },
        ))
    }

    fn open_editor(&self, params: &EditorParams) -> Result<()> {
        self.send(&Envelope::new(Message::OpenEditor {
            query: params.to_query(),
        }))
    }
}

impl<W: Write> MenuService for HostChannel<W> {
    fn register(&self, item: MenuItem) -> Result<()> {
        self.send(&Envelope::new(Message::RegisterMenu { item }))
    }
}

/// Request id of a frame that did not decode as an [`Envelope`], if it
/// carries one.
fn stray_request_id(body: &[u8]) -> Option<u64> {
    serde_json::from_slice::<serde_json::Value>(body)
        .ok()?
        .get("requestId")?
        .as_u64()
}

/// Serves frames until the browser closes stdin. A frame that does not
/// decode is logged and answered with a failure if it carried a
/// `requestId`; the connection stays up.
pub fn serve<R: Read, W: Write>(
    reader: &mut R,
    channel: &HostChannel<W>,
    coordinator: &Coordinator<'_>,
) -> Result<()> {
    while let Some(body) = read_frame(reader)? {
        let envelope: Envelope = match serde_json::from_slice(&body) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(error = %e, "malformed frame");
                if let Some(request_id) = stray_request_id(&body) {
                    let reply = Response::failed(format!("malformed request: {}", e));
                    channel.send(&Reply {
                        request_id: Some(request_id),
                        reply,
                    })?;
                }
                continue;
            }
        };
        let request_id = envelope.request_id;
        tracing::debug!(request = ?request_id, tab = ?envelope.tab_id, "frame received");

        if let Some(reply) = coordinator.handle(envelope) {
            channel.send(&Reply { request_id, reply })?;
        }
    }
    tracing::info!("browser closed the connection");
    Ok(())
}
