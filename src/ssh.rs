//! SSH session capability
//!
//! The executor only needs "open a session, run one command, collect
//! stdout/stderr/exit status, close" — that surface is the [`RemoteSession`]
//! and [`Connector`] traits, with a russh-backed implementation behind them.
//! Tests substitute scripted fakes.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::keys::ssh_key;
use russh::ChannelMsg;
use tracing::{debug, info, warn};

use crate::error::RemoteExecError;

/// How to authenticate against the remote host.
#[derive(Debug, Clone)]
pub enum Credentials {
    Password(String),
    Key {
        path: PathBuf,
        passphrase: Option<String>,
    },
}

/// Connection parameters for the SSH transport.
#[derive(Debug, Clone)]
pub struct SshConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub credentials: Credentials,
    pub connect_timeout: Duration,
}

impl SshConfig {
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        credentials: Credentials,
    ) -> Self {
        Self {
            host: host.into(),
            port: 22,
            username: username.into(),
            credentials,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Collected output of one remote command.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecOutput {
    /// `None` when the channel closed without sending an exit status,
    /// which some servers do for short-lived commands.
    pub exit_code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

/// One open session on the remote host.
#[async_trait]
pub trait RemoteSession: Send {
    /// Run a single command, given as argv tokens, and collect its output.
    async fn exec(&mut self, argv: &[String]) -> Result<ExecOutput, RemoteExecError>;

    /// Release the session. Safe to call once per session on any exit path.
    async fn close(&mut self);
}

/// Factory for [`RemoteSession`]s; each attempt gets a fresh one.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn RemoteSession>, RemoteExecError>;
}

/// Host key policy: accept whatever the server presents.
///
/// The point of this client is running curl on hosts you already control,
/// so unknown host keys are accepted rather than interactively verified.
struct AcceptHostKey;

impl russh::client::Handler for AcceptHostKey {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &ssh_key::PublicKey,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

/// russh-backed [`Connector`].
pub struct SshConnector {
    config: SshConfig,
}

impl SshConnector {
    pub fn new(config: SshConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Connector for SshConnector {
    async fn connect(&self) -> Result<Box<dyn RemoteSession>, RemoteExecError> {
        let SshConfig {
            host,
            port,
            username,
            credentials,
            connect_timeout,
        } = &self.config;

        info!("connecting to {}:{} via SSH", host, port);
        let russh_config = Arc::new(russh::client::Config::default());
        let connect = russh::client::connect(russh_config, (host.as_str(), *port), AcceptHostKey);
        let mut handle = tokio::time::timeout(*connect_timeout, connect)
            .await
            .map_err(|_| RemoteExecError::Timeout(connect_timeout.as_secs()))?
            .map_err(|e| RemoteExecError::Connect(e.to_string()))?;

        let auth = match credentials {
            Credentials::Password(password) => handle
                .authenticate_password(username.as_str(), password.as_str())
                .await
                .map_err(|e| RemoteExecError::Connect(e.to_string()))?,
            Credentials::Key { path, passphrase } => {
                let key = russh::keys::load_secret_key(path, passphrase.as_deref()).map_err(
                    |e| RemoteExecError::KeyLoad {
                        path: path.display().to_string(),
                        reason: e.to_string(),
                    },
                )?;
                let hash = handle
                    .best_supported_rsa_hash()
                    .await
                    .map_err(|e| RemoteExecError::Connect(e.to_string()))?
                    .flatten();
                handle
                    .authenticate_publickey(
                        username.as_str(),
                        russh::keys::PrivateKeyWithHashAlg::new(Arc::new(key), hash),
                    )
                    .await
                    .map_err(|e| RemoteExecError::Connect(e.to_string()))?
            }
        };

        if !auth.success() {
            return Err(RemoteExecError::AuthRejected(username.clone()));
        }

        info!("SSH connection established");
        Ok(Box::new(SshSession { handle }))
    }
}

/// A live russh session.
pub struct SshSession {
    handle: russh::client::Handle<AcceptHostKey>,
}

#[async_trait]
impl RemoteSession for SshSession {
    async fn exec(&mut self, argv: &[String]) -> Result<ExecOutput, RemoteExecError> {
        let command = join_argv(argv);
        debug!("remote command: {}", command);

        let mut channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| RemoteExecError::ChannelOpen(e.to_string()))?;
        channel
            .exec(true, command.as_str())
            .await
            .map_err(|e| RemoteExecError::Exec(e.to_string()))?;

        let mut output = ExecOutput::default();
        loop {
            let Some(msg) = channel.wait().await else {
                break;
            };
            match msg {
                ChannelMsg::Data { data } => output.stdout.extend_from_slice(&data),
                ChannelMsg::ExtendedData { data, ext: 1 } => {
                    output.stderr.extend_from_slice(&data)
                }
                ChannelMsg::ExitStatus { exit_status } => {
                    output.exit_code = Some(exit_status as i32)
                }
                // Keep draining after Eof: ExitStatus often arrives last.
                ChannelMsg::Eof => {}
                ChannelMsg::Close => break,
                _ => {}
            }
        }

        if !output.stderr.is_empty() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = stderr.trim();
            if !stderr.is_empty() {
                warn!("remote stderr: {}", stderr);
            }
        }

        Ok(output)
    }

    async fn close(&mut self) {
        let _ = self
            .handle
            .disconnect(russh::Disconnect::ByApplication, "", "english")
            .await;
    }
}

/// Join argv tokens into one POSIX shell command line, quoting as needed.
pub(crate) fn join_argv(argv: &[String]) -> String {
    argv.iter()
        .map(|token| shell_quote(token))
        .collect::<Vec<_>>()
        .join(" ")
}

fn shell_quote(token: &str) -> String {
    let safe = !token.is_empty()
        && token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:@%,+".contains(c));
    if safe {
        token.to_string()
    } else {
        format!("'{}'", token.replace('\'', r"'\''"))
    }
}
