//! Serial transport for the monitor's USB port.
//!
//! One I/O task per connection owns the port: it splits the inbound byte
//! stream into CRLF-delimited frames, forwards queued outbound frames, and
//! delivers all connection events sequentially to the registered listener.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_serial::SerialPortBuilderExt;
use tokio_util::bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, warn};

use super::{Transport, TransportError, TransportListener};
use crate::protocol::DEFAULT_BAUD_RATE;

/// Splits the monitor's CRLF-delimited ASCII stream into frames and appends
/// CRLF on encode.
#[derive(Debug, Default)]
pub struct FrameCodec;

impl Decoder for FrameCodec {
    type Item = String;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>, io::Error> {
        let Some(pos) = src.iter().position(|&b| b == b'\n') else {
            return Ok(None);
        };
        let line = src.split_to(pos + 1);
        let mut end = line.len() - 1;
        if end > 0 && line[end - 1] == b'\r' {
            end -= 1;
        }
        Ok(Some(String::from_utf8_lossy(&line[..end]).into_owned()))
    }
}

impl Encoder<String> for FrameCodec {
    type Error = io::Error;

    fn encode(&mut self, frame: String, dst: &mut BytesMut) -> Result<(), io::Error> {
        dst.extend_from_slice(frame.as_bytes());
        dst.extend_from_slice(b"\r\n");
        Ok(())
    }
}

/// [`Transport`] implementation over a serial port (19200 8N1).
pub struct SerialTransport {
    handle: Handle,
    baud_rate: u32,
    connected: Arc<AtomicBool>,
    listener: Arc<Mutex<Option<Arc<dyn TransportListener>>>>,
    io: Mutex<Option<IoHandle>>,
}

struct IoHandle {
    tx: mpsc::UnboundedSender<String>,
    task: JoinHandle<()>,
}

impl SerialTransport {
    /// Create a transport whose I/O task will run on `handle`.
    pub fn new(handle: Handle) -> Self {
        Self::with_baud_rate(handle, DEFAULT_BAUD_RATE)
    }

    /// Create a transport with a non-standard baud rate.
    pub fn with_baud_rate(handle: Handle, baud_rate: u32) -> Self {
        Self {
            handle,
            baud_rate,
            connected: Arc::new(AtomicBool::new(false)),
            listener: Arc::new(Mutex::new(None)),
            io: Mutex::new(None),
        }
    }
}

impl Transport for SerialTransport {
    fn open(&self, address: &str) -> Result<(), TransportError> {
        let mut io = self.io.lock().unwrap();
        if io.is_some() {
            return Err(TransportError::AlreadyOpen);
        }

        let _guard = self.handle.enter();
        let port = tokio_serial::new(address, self.baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| TransportError::Serial(e.to_string()))?;
        debug!(address, baud_rate = self.baud_rate, "serial port opened");

        let (tx, rx) = mpsc::unbounded_channel();
        self.connected.store(true, Ordering::SeqCst);
        let task = self.handle.spawn(io_loop(
            port,
            rx,
            Arc::clone(&self.connected),
            Arc::clone(&self.listener),
        ));
        *io = Some(IoHandle { tx, task });
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn send(&self, frame: &str) -> Result<(), TransportError> {
        let io = self.io.lock().unwrap();
        let Some(io) = io.as_ref() else {
            return Err(TransportError::NotConnected);
        };
        io.tx
            .send(frame.to_owned())
            .map_err(|_| TransportError::NotConnected)
    }

    fn close(&self) -> Result<(), TransportError> {
        let Some(io) = self.io.lock().unwrap().take() else {
            return Err(TransportError::NotConnected);
        };
        self.connected.store(false, Ordering::SeqCst);
        // Dropping the sender lets the I/O task drain queued frames and
        // wind down on its own; aborting here would lose the exit message.
        drop(io.tx);
        drop(io.task);
        Ok(())
    }

    fn set_listener(&self, listener: Arc<dyn TransportListener>) {
        *self.listener.lock().unwrap() = Some(listener);
    }
}

type SharedListener = Arc<Mutex<Option<Arc<dyn TransportListener>>>>;

fn current(listener: &SharedListener) -> Option<Arc<dyn TransportListener>> {
    listener.lock().unwrap().clone()
}

async fn io_loop(
    port: tokio_serial::SerialStream,
    mut rx: mpsc::UnboundedReceiver<String>,
    connected: Arc<AtomicBool>,
    listener: SharedListener,
) {
    let mut codec = FrameCodec;
    let mut buf = BytesMut::with_capacity(256);
    let (mut reader, mut writer) = tokio::io::split(port);

    if let Some(l) = current(&listener) {
        l.on_connected();
    }

    loop {
        tokio::select! {
            outgoing = rx.recv() => match outgoing {
                Some(frame) => {
                    let mut wire = BytesMut::with_capacity(frame.len() + 2);
                    if codec.encode(frame, &mut wire).is_ok() {
                        if let Err(error) = writer.write_all(&wire).await {
                            warn!(%error, "serial write failed");
                            if let Some(l) = current(&listener) {
                                l.on_error();
                            }
                        }
                    }
                }
                // close() dropped the sender; queued frames are already out.
                None => break,
            },
            read = reader.read_buf(&mut buf) => match read {
                Ok(0) => {
                    warn!("serial port closed by peer");
                    if let Some(l) = current(&listener) {
                        l.on_error();
                    }
                    break;
                }
                Ok(_) => loop {
                    match codec.decode(&mut buf) {
                        Ok(Some(frame)) => {
                            if frame.is_empty() {
                                debug!("empty frame skipped");
                                continue;
                            }
                            if let Some(l) = current(&listener) {
                                l.on_frame(&frame);
                            }
                        }
                        Ok(None) => break,
                        Err(error) => {
                            warn!(%error, "frame decoding failed");
                            break;
                        }
                    }
                },
                Err(error) => {
                    warn!(%error, "serial read failed");
                    if let Some(l) = current(&listener) {
                        l.on_error();
                    }
                    break;
                }
            },
        }
    }

    connected.store(false, Ordering::SeqCst);
    if let Some(l) = current(&listener) {
        l.on_disconnected();
    }
}

/// List serial ports that may have a monitor attached, USB ports first.
pub fn available_ports() -> Vec<String> {
    let mut ports: Vec<(u8, String)> = serialport::available_ports()
        .unwrap_or_default()
        .into_iter()
        .map(|info| {
            let rank = match info.port_type {
                serialport::SerialPortType::UsbPort(_) => 0,
                _ => 1,
            };
            (rank, info.port_name)
        })
        .collect();
    ports.sort();
    ports.into_iter().map(|(_, name)| name).collect()
}
