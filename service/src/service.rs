//! High-level logic that orchestrates a session with the device.
//!
//! A background task reads the serial stream, splits it into packets and decodes them. Decoded
//! commands are handed over through a bounded queue, so the reader waits for the consumer
//! instead of dropping draw commands that the screen can't do without.
//!
//! Note that the interface here is purely synchronous.

use crate::command::{Command, DecodeError, EncodeError, HostCommand};
use crate::config::Config;
use crate::slip::{self, FramingError};
use async_std::fs::OpenOptions;
use async_std::task;
use atomic::Atomic;
use futures::channel::mpsc;
use futures::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use futures::prelude::*;
use log::{debug, error, info, warn};
use std::fmt::Write;
use std::io;
use std::sync::Arc;
use thiserror::Error;

const READ_BUFFER_SIZE: usize = 4 * 1024;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Framing(#[from] FramingError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error("transport error: {0}")]
    Io(#[from] io::Error),
    #[error("short write: {written} out of {expected} bytes")]
    ShortWrite { written: usize, expected: usize },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Streaming,
    /// The device closed the stream or nobody listens for commands anymore.
    Closed,
    /// The stream was abandoned because of an error.
    Failed,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct StatusReport {
    pub state: ConnectionState,
    /// The number of packets received so far.
    pub packets: u64,
    /// The number of packets that carried an unknown command.
    pub skipped: u64,
}

pub struct Service {
    _worker_handle: task::JoinHandle<()>,
    rx: mpsc::Receiver<Command>,
    writer: Box<dyn AsyncWrite + Send + Unpin>,
    status_report: Arc<Atomic<StatusReport>>,
    hung_up: bool,
}

impl Service {
    pub fn status_report(&self) -> StatusReport {
        self.status_report.load(atomic::Ordering::SeqCst)
    }

    /// Returns the next decoded command if there is one ready.
    pub fn poll(&mut self) -> Option<Command> {
        match self.rx.try_next() {
            Ok(Some(command)) => Some(command),
            Ok(None) => {
                if !self.hung_up {
                    self.hung_up = true;
                    warn!("the worker end hung up");
                }
                None
            }
            Err(_) => None,
        }
    }

    /// Waits for the next decoded command. Returns `None` once the stream is over.
    pub async fn next(&mut self) -> Option<Command> {
        let command = self.rx.next().await;
        self.hung_up = command.is_none();
        command
    }

    /// Whether the reader stopped and every command it produced was taken.
    pub fn is_finished(&self) -> bool {
        self.hung_up
    }

    /// Sends a command to the device.
    ///
    /// This is a blocking call.
    pub fn send(&mut self, command: &HostCommand) -> Result<(), ServiceError> {
        task::block_on(write_command(&mut self.writer, command))
    }

    /// Tells the device that we are leaving and closes the session.
    pub fn disconnect(mut self) -> Result<(), ServiceError> {
        info!("Disconnecting ...");
        self.send(&HostCommand::Disconnect)
    }
}

/// Opens the serial device from the config and starts a session over it.
///
/// The device is expected to be in raw mode already.
pub fn open(config: &Config) -> Result<Service, ServiceError> {
    info!("Opening serial port {} ...", config.device);
    let (reader, writer) = task::block_on(async {
        let reader = OpenOptions::new().read(true).open(&config.device).await?;
        let writer = OpenOptions::new().write(true).open(&config.device).await?;
        Ok::<_, io::Error>((reader, writer))
    })?;
    start(config, reader, writer)
}

/// Starts a session over the given transport.
///
/// The display is enabled before the stream is read.
pub fn start<R, W>(config: &Config, reader: R, writer: W) -> Result<Service, ServiceError>
where
    R: AsyncRead + Send + Unpin + 'static,
    W: AsyncWrite + Send + Unpin + 'static,
{
    let mut writer: Box<dyn AsyncWrite + Send + Unpin> = Box::new(writer);
    info!("Enabling and resetting display ...");
    task::block_on(write_command(&mut writer, &HostCommand::EnableAndResetDisplay))?;

    let (tx, rx) = mpsc::channel(config.queue_capacity);
    let status_report = Arc::new(Atomic::new(StatusReport {
        state: ConnectionState::Connecting,
        packets: 0,
        skipped: 0,
    }));
    let worker_handle = task::spawn(worker(reader, tx, Arc::clone(&status_report)));
    Ok(Service {
        _worker_handle: worker_handle,
        rx,
        writer,
        status_report,
        hung_up: false,
    })
}

async fn write_command<W>(writer: &mut W, command: &HostCommand) -> Result<(), ServiceError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let bytes = command.encode()?;
    let written = writer.write(&bytes).await?;
    if written != bytes.len() {
        return Err(ServiceError::ShortWrite {
            written,
            expected: bytes.len(),
        });
    }
    writer.flush().await?;
    debug!("sent {:?}", command);
    Ok(())
}

async fn worker<R>(
    reader: R,
    mut tx: mpsc::Sender<Command>,
    status_report: Arc<Atomic<StatusReport>>,
) where
    R: AsyncRead + Unpin,
{
    let mut report = status_report.load(atomic::Ordering::SeqCst);
    let outcome = read_stream(reader, &mut tx, &status_report, &mut report).await;
    report.state = match outcome {
        Ok(()) => ConnectionState::Closed,
        Err(err) => {
            error!("Reading the stream failed: {}", err);
            ConnectionState::Failed
        }
    };
    status_report.store(report, atomic::Ordering::SeqCst);
    // `tx` goes away only now so that the consumer sees the final report once the queue closes.
    drop(tx);
}

async fn read_stream<R>(
    mut reader: R,
    tx: &mut mpsc::Sender<Command>,
    status_report: &Atomic<StatusReport>,
    report: &mut StatusReport,
) -> Result<(), ServiceError>
where
    R: AsyncRead + Unpin,
{
    info!("Reading ...");
    report.state = ConnectionState::Streaming;
    status_report.store(*report, atomic::Ordering::SeqCst);

    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    let mut decoder = slip::Decoder::new();
    loop {
        let read = reader.read(&mut buf).await?;
        if read == 0 {
            info!("The device closed the stream");
            return Ok(());
        }

        let packets = match decoder.decode(&buf[..read]) {
            Ok(packets) => packets,
            Err(err) => {
                error!("{}. data: {}", err, hex(decoder.pending()));
                return Err(err.into());
            }
        };

        for packet in packets {
            report.packets += 1;
            match Command::decode(&packet) {
                Ok(command) => {
                    if tx.send(command).await.is_err() {
                        // The other end hung-up. We treat it as a shutdown signal.
                        debug!("the receiving end hung up");
                        return Ok(());
                    }
                }
                Err(err) if err.is_recoverable() => {
                    warn!("Skipping packet: {}. packet: {}", err, hex(&packet));
                    report.skipped += 1;
                }
                Err(err) => {
                    error!("Failed to decode packet: {}. packet: {}", err, hex(&packet));
                    return Err(err.into());
                }
            }
        }
        status_report.store(*report, atomic::Ordering::SeqCst);
    }
}

fn hex(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 3);
    for (i, byte) in data.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{:02x}", byte);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{Character, Color, Keys, Position, Rectangle, Size};
    use futures::io::Cursor;
    use std::pin::Pin;
    use std::sync::Mutex;
    use std::task::{Context, Poll};

    /// A transport write half that records everything and optionally accepts only a few bytes
    /// per write.
    #[derive(Clone, Default)]
    struct Sink {
        written: Arc<Mutex<Vec<u8>>>,
        limit: Option<usize>,
    }

    impl Sink {
        fn bytes(&self) -> Vec<u8> {
            self.written.lock().unwrap().clone()
        }
    }

    impl AsyncWrite for Sink {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            let len = self.limit.map_or(buf.len(), |limit| limit.min(buf.len()));
            self.written.lock().unwrap().extend_from_slice(&buf[..len]);
            Poll::Ready(Ok(len))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    fn config(queue_capacity: usize) -> Config {
        Config {
            device: "/dev/null".to_string(),
            window_width: 640,
            window_height: 480,
            fps: 30,
            fullscreen: false,
            queue_capacity,
        }
    }

    fn framed(packets: &[Vec<u8>]) -> Cursor<Vec<u8>> {
        let mut stream = Vec::new();
        for packet in packets {
            slip::encode(packet, &mut stream);
        }
        Cursor::new(stream)
    }

    fn rectangle_packet(x: u8) -> Vec<u8> {
        vec![0xFE, x, 0, 0, 0, 8, 0, 10, 0, 1, 2, 3]
    }

    fn character_packet() -> Vec<u8> {
        vec![0xFD, b'M', 8, 0, 10, 0, 0xC0, 0xDB, 0xFF, 0, 0, 0]
    }

    fn drain(service: &mut Service) -> Vec<Command> {
        let mut commands = Vec::new();
        while let Some(command) = task::block_on(service.next()) {
            commands.push(command);
        }
        commands
    }

    #[test]
    fn brackets_the_session() {
        let sink = Sink::default();
        let mut service = start(&config(16), framed(&[]), sink.clone()).unwrap();
        assert_eq!(sink.bytes(), b"ER".to_vec());

        service
            .send(&HostCommand::Controller(Keys::UP | Keys::EDIT))
            .unwrap();
        assert_eq!(sink.bytes(), b"ERC\x41".to_vec());

        service.disconnect().unwrap();
        assert_eq!(sink.bytes(), b"ERC\x41D".to_vec());
    }

    #[test]
    fn delivers_commands_in_order() {
        let stream = framed(&[
            rectangle_packet(1),
            vec![0x01, 0x02],
            character_packet(),
            rectangle_packet(2),
        ]);
        let mut service = start(&config(16), stream, Sink::default()).unwrap();

        let commands = drain(&mut service);
        assert_eq!(
            commands,
            vec![
                Command::DrawRectangle(Rectangle {
                    pos: Position { x: 1, y: 0 },
                    size: Size {
                        width: 8,
                        height: 10
                    },
                    color: Color::rgb(1, 2, 3),
                }),
                Command::DrawCharacter(Character {
                    code: b'M',
                    pos: Position { x: 8, y: 10 },
                    foreground: Color::rgb(0xC0, 0xDB, 0xFF),
                    background: Color::BLACK,
                }),
                Command::DrawRectangle(Rectangle {
                    pos: Position { x: 2, y: 0 },
                    size: Size {
                        width: 8,
                        height: 10
                    },
                    color: Color::rgb(1, 2, 3),
                }),
            ]
        );
        assert!(service.is_finished());
        assert_eq!(
            service.status_report(),
            StatusReport {
                state: ConnectionState::Closed,
                packets: 4,
                skipped: 1,
            }
        );
    }

    #[test]
    fn malformed_packet_stops_the_stream() {
        let stream = framed(&[rectangle_packet(1), vec![0xFE, 1, 2], rectangle_packet(2)]);
        let mut service = start(&config(16), stream, Sink::default()).unwrap();

        assert_eq!(drain(&mut service).len(), 1);
        assert_eq!(service.status_report().state, ConnectionState::Failed);
    }

    #[test]
    fn framing_error_stops_the_stream() {
        let mut stream = framed(&[rectangle_packet(1)]).into_inner();
        stream.extend_from_slice(&[0xFB, slip::ESC, 0x00, slip::END]);
        stream.extend(framed(&[rectangle_packet(2)]).into_inner());
        let mut service = start(&config(16), Cursor::new(stream), Sink::default()).unwrap();

        // Everything arrives in a single read, which is rejected as a whole.
        assert!(drain(&mut service).is_empty());
        assert_eq!(service.status_report().state, ConnectionState::Failed);
    }

    #[test]
    fn endless_garbage_stops_the_stream() {
        let noise = Cursor::new(vec![0x41; 64 * 1024]);
        let mut service = start(&config(16), noise, Sink::default()).unwrap();

        assert!(drain(&mut service).is_empty());
        assert_eq!(service.status_report().state, ConnectionState::Failed);
    }

    #[test]
    fn small_queue_loses_nothing() {
        let packets: Vec<Vec<u8>> = (0..200).map(|x| rectangle_packet(x as u8)).collect();
        let mut service = start(&config(1), framed(&packets), Sink::default()).unwrap();

        let xs: Vec<i16> = drain(&mut service)
            .into_iter()
            .map(|command| match command {
                Command::DrawRectangle(rectangle) => rectangle.pos.x,
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        assert_eq!(xs, (0..200).collect::<Vec<i16>>());
    }

    #[test]
    fn short_write_is_fatal() {
        let sink = Sink {
            limit: Some(1),
            ..Sink::default()
        };
        match start(&config(16), framed(&[]), sink) {
            Err(ServiceError::ShortWrite {
                written: 1,
                expected: 2,
            }) => {}
            Err(err) => panic!("unexpected error {}", err),
            Ok(_) => panic!("start should have failed"),
        }
    }

    #[async_std::test]
    async fn reader_stops_when_consumer_hangs_up() {
        let (mut tx, rx) = mpsc::channel(1);
        drop(rx);
        let status_report = Atomic::new(StatusReport {
            state: ConnectionState::Connecting,
            packets: 0,
            skipped: 0,
        });
        let mut report = status_report.load(atomic::Ordering::SeqCst);
        let stream = framed(&[rectangle_packet(1), rectangle_packet(2)]);

        let result = read_stream(stream, &mut tx, &status_report, &mut report).await;
        assert!(result.is_ok());
        assert_eq!(report.packets, 1);
    }

    #[test]
    fn hex_dump() {
        assert_eq!(hex(&[0xFE, 0x01, 0xC0]), "fe 01 c0");
        assert_eq!(hex(&[]), "");
    }
}
