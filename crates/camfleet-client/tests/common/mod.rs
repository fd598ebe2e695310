//! In-process simulated camera server speaking the command and download
//! protocols on loopback, with knobs for injecting faults.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use camfleet_client::{
    AgcMode, AwbMode, ClientConfig, Command, FileRecord, FileType, MeteringMode, Resolution,
    ServerAddress, ServerStatus,
};
use camfleet_protocol::wire::{decode_download_request, encode_download_size, MAX_DATAGRAM_SIZE};
use camfleet_protocol::{ErrorCode, Reply, Request, Response};
use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, UdpSocket};
use tokio::task::JoinHandle;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Client config bound to loopback with short deadlines.
pub fn test_config() -> ClientConfig {
    init_tracing();
    ClientConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        timeout_ms: 1000,
        query_retries: 2,
        discovery_timeout_ms: 500,
        download_timeout_ms: 2000,
        ..ClientConfig::default()
    }
}

#[derive(Debug, Clone)]
pub struct SimOptions {
    /// Delay before each command reply.
    pub latency: Duration,
    /// Never answer commands.
    pub silent: bool,
    /// Answer commands with bytes that do not decode.
    pub garbage: bool,
    /// Send every reply twice.
    pub duplicate_replies: bool,
    /// Added to the server's reported clock.
    pub clock_offset: TimeDelta,
    /// Resolutions wider than this are refused with an error reply.
    pub max_width: Option<u32>,
    /// Declare more bytes than are sent on download.
    pub truncate_downloads: bool,
    /// Send extra bytes past the declared size on download.
    pub overlong_downloads: bool,
}

impl Default for SimOptions {
    fn default() -> Self {
        Self {
            latency: Duration::ZERO,
            silent: false,
            garbage: false,
            duplicate_replies: false,
            clock_offset: TimeDelta::zero(),
            max_width: None,
            truncate_downloads: false,
            overlong_downloads: false,
        }
    }
}

#[derive(Debug)]
pub struct SimState {
    pub status: ServerStatus,
    pub files: Vec<(FileRecord, Vec<u8>)>,
    pub next_index: u32,
    pub commands: Vec<Command>,
    pub identified: u32,
    /// `(trigger time, local receive time)` for every scheduled capture.
    pub triggers: Vec<(DateTime<Utc>, DateTime<Utc>)>,
}

impl SimState {
    fn new() -> Self {
        Self {
            status: ServerStatus {
                resolution: Resolution::new(1920, 1080),
                framerate: 30.0,
                agc_mode: AgcMode::Auto,
                agc_gain: None,
                awb_mode: AwbMode::Auto,
                awb_red: None,
                awb_blue: None,
                iso: 0,
                metering_mode: MeteringMode::Average,
                brightness: 50,
                contrast: 0,
                saturation: 0,
                ev: 0,
                denoise: true,
                timestamp: Utc::now(),
                files: 0,
            },
            files: Vec::new(),
            next_index: 1,
            commands: Vec::new(),
            identified: 0,
            triggers: Vec::new(),
        }
    }
}

pub struct SimCamera {
    pub address: ServerAddress,
    pub state: Arc<Mutex<SimState>>,
    tasks: Vec<JoinHandle<()>>,
}

impl SimCamera {
    pub async fn spawn() -> Self {
        Self::spawn_with(SimOptions::default()).await
    }

    /// Bind TCP first to pick a free port, then UDP on the same number.
    pub async fn spawn_with(options: SimOptions) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let local = listener.local_addr().unwrap();
        let socket = Arc::new(UdpSocket::bind(local).await.unwrap());
        let state = Arc::new(Mutex::new(SimState::new()));

        let udp = tokio::spawn(serve_commands(socket, state.clone(), options.clone()));
        let tcp = tokio::spawn(serve_downloads(listener, state.clone(), options));

        Self {
            address: ServerAddress::new(local),
            state,
            tasks: vec![udp, tcp],
        }
    }

    pub async fn spawn_many(n: usize, options: SimOptions) -> Vec<Self> {
        let mut cameras = Vec::with_capacity(n);
        for _ in 0..n {
            cameras.push(Self::spawn_with(options.clone()).await);
        }
        cameras
    }

    pub fn file_count(&self) -> usize {
        self.state.lock().files.len()
    }

    pub fn file_bytes(&self, index: u32) -> Option<Vec<u8>> {
        self.state
            .lock()
            .files
            .iter()
            .find(|(record, _)| record.index == index)
            .map(|(_, bytes)| bytes.clone())
    }

    pub fn commands(&self) -> Vec<Command> {
        self.state.lock().commands.clone()
    }
}

impl Drop for SimCamera {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

async fn serve_commands(socket: Arc<UdpSocket>, state: Arc<Mutex<SimState>>, options: SimOptions) {
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
    loop {
        let Ok((len, from)) = socket.recv_from(&mut buf).await else {
            return;
        };
        let Ok(request) = Request::decode(&buf[..len]) else {
            continue;
        };
        if options.silent {
            continue;
        }

        let reply = handle(&state, &options, request.command);
        let datagram = if options.garbage {
            b"\xff garbage".to_vec()
        } else {
            Response::new(request.seq, reply).encode().unwrap()
        };
        let copies = if options.duplicate_replies { 2 } else { 1 };

        let socket = socket.clone();
        let latency = options.latency;
        tokio::spawn(async move {
            tokio::time::sleep(latency).await;
            for _ in 0..copies {
                let _ = socket.send_to(&datagram, from).await;
            }
        });
    }
}

fn handle(state: &Mutex<SimState>, options: &SimOptions, command: Command) -> Reply {
    let mut state = state.lock();
    state.commands.push(command.clone());
    let first_index = state.next_index;

    match command {
        Command::Hello => Reply::Ack,
        Command::Status => {
            let mut status = state.status.clone();
            status.timestamp = Utc::now() + options.clock_offset;
            status.files = state.files.len();
            Reply::Status { status }
        }
        Command::List => Reply::Files {
            files: state.files.iter().map(|(record, _)| record.clone()).collect(),
        },
        Command::Clear => {
            state.files.clear();
            state.next_index = 1;
            Reply::Ack
        }
        Command::Identify => {
            state.identified += 1;
            Reply::Ack
        }
        Command::Resolution { width, height } => {
            if options.max_width.is_some_and(|max| width > max) {
                return Reply::Error {
                    code: ErrorCode::InvalidParameter,
                    message: format!("unsupported resolution {width}x{height}"),
                };
            }
            state.status.resolution = Resolution::new(width, height);
            Reply::Ack
        }
        Command::Framerate { rate } => {
            state.status.framerate = rate;
            Reply::Ack
        }
        Command::Agc { mode, gain } => {
            state.status.agc_mode = mode;
            state.status.agc_gain = gain;
            Reply::Ack
        }
        Command::Awb { mode, red, blue } => {
            state.status.awb_mode = mode;
            state.status.awb_red = red;
            state.status.awb_blue = blue;
            Reply::Ack
        }
        Command::Iso { iso } => {
            state.status.iso = iso;
            Reply::Ack
        }
        Command::Metering { mode } => {
            state.status.metering_mode = mode;
            Reply::Ack
        }
        Command::Brightness { value } => {
            state.status.brightness = value;
            Reply::Ack
        }
        Command::Contrast { value } => {
            state.status.contrast = value;
            Reply::Ack
        }
        Command::Saturation { value } => {
            state.status.saturation = value;
            Reply::Ack
        }
        Command::Ev { value } => {
            state.status.ev = value;
            Reply::Ack
        }
        Command::Denoise { enabled } => {
            state.status.denoise = enabled;
            Reply::Ack
        }
        Command::Capture { count, at, .. } => {
            if let Some(at) = at {
                state.triggers.push((at, Utc::now()));
            }
            let taken = at.unwrap_or_else(Utc::now);
            for i in 0..count {
                let index = first_index + i;
                let size = 4096 + index as usize * 37;
                let bytes: Vec<u8> = (0..size).map(|b| ((b as u32 * 7 + index) % 256) as u8).collect();
                let record = FileRecord {
                    file_type: FileType::Image,
                    index,
                    timestamp: taken,
                    size: size as u64,
                };
                state.files.push((record, bytes));
            }
            state.next_index += count;
            Reply::Ack
        }
    }
}

async fn serve_downloads(listener: TcpListener, state: Arc<Mutex<SimState>>, options: SimOptions) {
    loop {
        let Ok((mut stream, _)) = listener.accept().await else {
            return;
        };
        let state = state.clone();
        let options = options.clone();
        tokio::spawn(async move {
            let mut request = [0u8; 4];
            if stream.read_exact(&mut request).await.is_err() {
                return;
            }
            let index = decode_download_request(request);
            let bytes = state
                .lock()
                .files
                .iter()
                .find(|(record, _)| record.index == index)
                .map(|(_, bytes)| bytes.clone());
            let Some(bytes) = bytes else {
                return;
            };

            let declared = if options.truncate_downloads {
                bytes.len() as u64 + 100
            } else {
                bytes.len() as u64
            };
            let _ = stream.write_all(&encode_download_size(declared)).await;
            let _ = stream.write_all(&bytes).await;
            if options.overlong_downloads {
                let _ = stream.write_all(&[0u8; 16]).await;
            }
            let _ = stream.shutdown().await;
        });
    }
}
