//! Remote shell session over SSH.
//!
//! A connected session is driven by a background pump task that owns the
//! russh channel. Its read half feeds remote output into the shared
//! aggregator while the write half applies write/resize requests in order,
//! so a write waiting on the remote window never holds up output. The pump
//! publishes the exit status when either half finishes.

use std::{
    fmt, io,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use russh::{
    Channel, ChannelMsg, ChannelReadHalf, ChannelWriteHalf, Disconnect, Pty, client,
    keys::{PrivateKey, PrivateKeyWithHashAlg},
};
use tokio::{
    net::{self, TcpStream},
    sync::{Mutex, mpsc, oneshot, watch},
    task::JoinHandle,
    time,
};
use tracing::Instrument;
use webssh_core::{
    AuthMode, ConfigError, ExitStatus, OutputAggregator, OutputSink, RemoteSessionConfig,
    RemoteShell, SessionError,
};

use crate::{
    ConnectError,
    verify::{ClientHandler, HostVerifier, MatchDialedAddress},
};

const TERM: &str = "xterm";
const TERMINAL_SPEED: u32 = 14_400;
const COMMAND_BUFFER: usize = 64;
const CLOSE_GRACE: Duration = Duration::from_secs(2);

type Handle = client::Handle<ClientHandler>;
type Reply = oneshot::Sender<Result<(), SessionError>>;

enum Command {
    Write { data: Vec<u8>, reply: Reply },
    Resize { cols: u32, rows: u32, reply: Reply },
    Close,
}

/// Connect with the default host check (answering address must equal the
/// configured address, see [`MatchDialedAddress`]).
///
/// # Errors
/// Returns error if the config is invalid, the key cannot be decoded, the
/// host is unreachable or rejected, authentication fails, or the PTY/shell
/// cannot be started.
pub async fn connect(config: &RemoteSessionConfig) -> Result<SshSession, ConnectError> {
    connect_with(config, Arc::new(MatchDialedAddress)).await
}

/// Connect, deciding on the remote host with `verifier`.
///
/// # Errors
/// See [`connect`].
pub async fn connect_with(
    config: &RemoteSessionConfig,
    verifier: Arc<dyn HostVerifier>,
) -> Result<SshSession, ConnectError> {
    config.validate()?;
    let key = match config.auth_mode {
        AuthMode::Password => None,
        AuthMode::PublicKey => Some(decode_private_key(config)?),
    };

    let addr = config.address();
    let timeout = config.connect_timeout();
    tracing::info!(addr = %addr, user = %config.user, "Connecting to SSH server");

    let (mut handle, peer) = time::timeout(timeout, handshake(config, &addr, key, verifier))
        .await
        .map_err(|_| ConnectError::Timeout {
            addr: addr.clone(),
            timeout,
        })??;

    let output = Arc::new(OutputAggregator::new());
    let channel = open_shell(&mut handle, config, &output).await?;

    tracing::info!(
        peer = %peer,
        cols = config.term_width,
        rows = config.term_height,
        "Remote shell started"
    );
    Ok(SshSession::spawn(channel, handle, output, peer))
}

fn decode_private_key(config: &RemoteSessionConfig) -> Result<PrivateKey, ConnectError> {
    let material = config
        .private_key
        .as_deref()
        .ok_or(ConfigError::MissingPrivateKey)?;
    russh::keys::decode_secret_key(material, config.passphrase()).map_err(|e| {
        tracing::warn!(error = %e, "Unable to parse private key");
        ConnectError::Key(e.to_string())
    })
}

async fn dial(addr: &str) -> Result<(TcpStream, SocketAddr), ConnectError> {
    let network_error = |source| ConnectError::Network {
        addr: addr.to_owned(),
        source,
    };

    let mut last_error = None;
    for candidate in net::lookup_host(addr).await.map_err(network_error)? {
        match TcpStream::connect(candidate).await {
            Ok(stream) => return Ok((stream, candidate)),
            Err(e) => {
                tracing::debug!(candidate = %candidate, error = %e, "Dial attempt failed");
                last_error = Some(e);
            }
        }
    }
    Err(network_error(last_error.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::NotFound, "host resolved to no addresses")
    })))
}

async fn handshake(
    config: &RemoteSessionConfig,
    addr: &str,
    key: Option<PrivateKey>,
    verifier: Arc<dyn HostVerifier>,
) -> Result<(Handle, SocketAddr), ConnectError> {
    let (stream, dialed) = dial(addr).await?;
    let peer = stream.peer_addr().map_err(|source| ConnectError::Network {
        addr: addr.to_owned(),
        source,
    })?;
    let _ = stream.set_nodelay(true);

    let handler = ClientHandler::new(addr, dialed, peer, verifier);
    let mut handle = client::connect_stream(Arc::new(client::Config::default()), stream, handler)
        .await
        .map_err(|e| match e {
            russh::Error::UnknownKey => ConnectError::HostRejected { dialed, peer },
            other => ConnectError::Protocol(other.to_string()),
        })?;

    authenticate(&mut handle, config, key).await?;
    Ok((handle, peer))
}

async fn authenticate(
    handle: &mut Handle,
    config: &RemoteSessionConfig,
    key: Option<PrivateKey>,
) -> Result<(), ConnectError> {
    let user = config.user.clone();
    let result = match key {
        None => {
            tracing::debug!(user = %user, "Attempting password authentication");
            handle
                .authenticate_password(user.clone(), config.secret.clone())
                .await
        }
        Some(key) => {
            tracing::debug!(user = %user, "Attempting public key authentication");
            let rsa_hash = handle
                .best_supported_rsa_hash()
                .await
                .ok()
                .flatten()
                .flatten();
            handle
                .authenticate_publickey(
                    user.clone(),
                    PrivateKeyWithHashAlg::new(Arc::new(key), rsa_hash),
                )
                .await
        }
    }
    .map_err(|e| ConnectError::Protocol(format!("authentication exchange failed: {e}")))?;

    if result.success() {
        tracing::debug!(user = %user, "Authentication successful");
        Ok(())
    } else {
        Err(ConnectError::Auth { user })
    }
}

async fn open_shell(
    handle: &mut Handle,
    config: &RemoteSessionConfig,
    output: &OutputAggregator,
) -> Result<Channel<client::Msg>, ConnectError> {
    let mut channel = handle
        .channel_open_session()
        .await
        .map_err(|e| ConnectError::Protocol(format!("failed to open session channel: {e}")))?;

    let modes = [
        (Pty::ECHO, 1),
        (Pty::TTY_OP_ISPEED, TERMINAL_SPEED),
        (Pty::TTY_OP_OSPEED, TERMINAL_SPEED),
    ];
    channel
        .request_pty(
            true,
            TERM,
            config.term_width,
            config.term_height,
            0,
            0,
            &modes,
        )
        .await
        .map_err(|e| ConnectError::Protocol(format!("PTY request failed: {e}")))?;
    await_reply(&mut channel, "PTY", output).await?;

    channel
        .request_shell(true)
        .await
        .map_err(|e| ConnectError::Protocol(format!("shell request failed: {e}")))?;
    await_reply(&mut channel, "shell", output).await?;

    Ok(channel)
}

/// Wait for the server's answer to a channel request. Output that arrives
/// first (a shell may print before acknowledging) is kept.
async fn await_reply(
    channel: &mut Channel<client::Msg>,
    request: &str,
    output: &OutputAggregator,
) -> Result<(), ConnectError> {
    loop {
        match channel.wait().await {
            Some(ChannelMsg::Success) => return Ok(()),
            Some(ChannelMsg::Failure) => {
                return Err(ConnectError::Protocol(format!("{request} request rejected")));
            }
            Some(ChannelMsg::Data { data } | ChannelMsg::ExtendedData { data, .. }) => {
                output.write_output(&data);
            }
            Some(ChannelMsg::Close) | None => {
                return Err(ConnectError::Protocol(format!(
                    "channel closed during {request} request"
                )));
            }
            Some(_) => {}
        }
    }
}

/// Connected, authenticated SSH session with a running interactive shell.
pub struct SshSession {
    commands: mpsc::Sender<Command>,
    output: Arc<OutputAggregator>,
    exit: watch::Receiver<Option<ExitStatus>>,
    pump: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
    peer: SocketAddr,
}

impl fmt::Debug for SshSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SshSession")
            .field("peer", &self.peer)
            .field("buffered", &self.output.len())
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl SshSession {
    fn spawn(
        channel: Channel<client::Msg>,
        handle: Handle,
        output: Arc<OutputAggregator>,
        peer: SocketAddr,
    ) -> Self {
        let (commands, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (exit_tx, exit) = watch::channel(None);

        let pump = Pump {
            channel,
            handle,
            output: Arc::clone(&output),
            exit: exit_tx,
        };
        let pump = tokio::spawn(
            pump.run(command_rx)
                .instrument(tracing::debug_span!("ssh_pump", peer = %peer)),
        );

        Self {
            commands,
            output,
            exit,
            pump: Mutex::new(Some(pump)),
            closed: AtomicBool::new(false),
            peer,
        }
    }

    /// Address of the remote host.
    #[must_use]
    pub const fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    async fn request(
        &self,
        command: Command,
        response: oneshot::Receiver<Result<(), SessionError>>,
    ) -> Result<(), SessionError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SessionError::Closed);
        }
        self.commands
            .send(command)
            .await
            .map_err(|_| SessionError::Closed)?;
        response.await.map_err(|_| SessionError::Closed)?
    }
}

#[async_trait]
impl RemoteShell for SshSession {
    async fn write(&self, data: &[u8]) -> Result<(), SessionError> {
        let (reply, response) = oneshot::channel();
        self.request(
            Command::Write {
                data: data.to_vec(),
                reply,
            },
            response,
        )
        .await
    }

    async fn resize(&self, cols: u32, rows: u32) -> Result<(), SessionError> {
        let (reply, response) = oneshot::channel();
        self.request(Command::Resize { cols, rows, reply }, response)
            .await
    }

    async fn wait(&self) -> Result<ExitStatus, SessionError> {
        let mut exit = self.exit.clone();
        let status = exit
            .wait_for(Option::is_some)
            .await
            .map_err(|_| SessionError::Closed)?
            .clone();
        Ok(status.unwrap_or(ExitStatus::ConnectionLost))
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.commands.try_send(Command::Close);

        let Some(mut pump) = self.pump.lock().await.take() else {
            return;
        };
        if time::timeout(CLOSE_GRACE, &mut pump).await.is_err() {
            tracing::warn!(peer = %self.peer, "SSH session did not close in time, aborting");
            pump.abort();
        }
        tracing::debug!(peer = %self.peer, "SSH session closed");
    }

    fn output(&self) -> &OutputAggregator {
        &self.output
    }
}

struct Pump {
    channel: Channel<client::Msg>,
    handle: Handle,
    output: Arc<OutputAggregator>,
    exit: watch::Sender<Option<ExitStatus>>,
}

impl Pump {
    async fn run(self, commands: mpsc::Receiver<Command>) {
        let (mut reader, writer) = self.channel.split();
        let mut status = None;

        tokio::select! {
            () = read_remote(&mut reader, &self.output, &mut status) => {}
            () = execute(&writer, commands) => {}
        }

        let status = status.unwrap_or(ExitStatus::ConnectionLost);
        tracing::debug!(status = %status, "Remote shell finished");
        self.exit.send_replace(Some(status));

        if let Err(e) = writer.close().await {
            tracing::trace!(error = %e, "Channel already closed");
        }
        if let Err(e) = self
            .handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
        {
            tracing::trace!(error = %e, "Disconnect failed");
        }
    }
}

/// Drain channel messages until the remote closes the channel.
async fn read_remote(
    reader: &mut ChannelReadHalf,
    output: &OutputAggregator,
    status: &mut Option<ExitStatus>,
) {
    while let Some(message) = reader.wait().await {
        match message {
            ChannelMsg::Data { data } | ChannelMsg::ExtendedData { data, .. } => {
                output.write_output(&data);
            }
            ChannelMsg::ExitStatus { exit_status } => {
                *status = Some(ExitStatus::Code(exit_status));
            }
            ChannelMsg::ExitSignal { signal_name, .. } => {
                *status = Some(ExitStatus::Signal(format!("{signal_name:?}")));
            }
            ChannelMsg::Eof => tracing::trace!("Remote sent EOF"),
            ChannelMsg::Close => break,
            _ => {}
        }
    }
}

/// Apply write and resize requests in order until asked to close.
async fn execute(writer: &ChannelWriteHalf<client::Msg>, mut commands: mpsc::Receiver<Command>) {
    while let Some(command) = commands.recv().await {
        let (result, reply) = match command {
            Command::Write { data, reply } => (writer.data(&data[..]).await, reply),
            Command::Resize { cols, rows, reply } => {
                (writer.window_change(cols, rows, 0, 0).await, reply)
            }
            Command::Close => break,
        };
        let _ = reply.send(result.map_err(|e| SessionError::Protocol(e.to_string())));
    }
}
