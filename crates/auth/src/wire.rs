//! The wire transport for [`crate::api::AuthApi`]: a length-prefixed
//! `serde_json` envelope sent over whatever byte stream the
//! caller already has open — in practice an SSH channel multiplexed over
//! the internal control listener, authenticated by a host certificate of
//! role `admin`. Deliberately not protobuf/tonic: the channel is private,
//! single-hop, and already authenticated by the SSH handshake, so the
//! simplest adequate framing wins. [`crate::api::LocalAuthApi`] skips this
//! transport entirely for a colocated caller and dispatches in-process.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use teleport_ca::CaType;
use teleport_core::ErrorKind;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::api::{
	AddProvisioningTokenRequest, AddProvisioningTokenResponse, AuthApi, CaSummary, GenerateHostCertRequest,
	GenerateHostCertResponse, UpsertCaRequest,
};
use crate::error::AuthError;
use crate::join::{RegisterUsingTokenRequest, RegisterUsingTokenResponse};
use crate::presence::PresenceRecord;
use crate::session::SessionEvent;
use crate::userauth::{SignInRequest, SignInResponse};

const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;

/// A bidirectional byte stream carrying one call's request frame and
/// response frame. An SSH channel and a plain duplex stream both implement
/// this the same way, via [`FramedStream`].
#[async_trait]
pub trait ControlChannel: Send + Sync {
	async fn send_frame(&self, bytes: Vec<u8>) -> Result<(), AuthError>;
	async fn recv_frame(&self) -> Result<Vec<u8>, AuthError>;
}

/// Wraps any `AsyncRead + AsyncWrite` stream (an SSH channel's stream half,
/// or a plain `TcpStream`/`DuplexStream` in tests) with u32-length-prefixed
/// framing. One call is in flight at a time, serialized by the mutex —
/// matching the simple request/response shape of this control channel.
pub struct FramedStream<T> {
	inner: Mutex<T>,
}

impl<T> FramedStream<T> {
	pub fn new(inner: T) -> Self {
		Self { inner: Mutex::new(inner) }
	}
}

#[async_trait]
impl<T> ControlChannel for FramedStream<T>
where
	T: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send,
{
	async fn send_frame(&self, bytes: Vec<u8>) -> Result<(), AuthError> {
		if bytes.len() as u64 > MAX_FRAME_LEN as u64 {
			return Err(AuthError::BadParameter("control frame too large".into()));
		}
		let mut stream = self.inner.lock().await;
		stream.write_u32(bytes.len() as u32).await?;
		stream.write_all(&bytes).await?;
		stream.flush().await?;
		Ok(())
	}

	async fn recv_frame(&self) -> Result<Vec<u8>, AuthError> {
		let mut stream = self.inner.lock().await;
		let len = stream.read_u32().await?;
		if len > MAX_FRAME_LEN {
			return Err(AuthError::Internal(anyhow::anyhow!("control frame of {len} bytes exceeds limit")));
		}
		let mut buf = vec![0u8; len as usize];
		stream.read_exact(&mut buf).await?;
		Ok(buf)
	}
}

#[derive(Serialize, Deserialize)]
struct RequestEnvelope {
	method: String,
	payload: serde_json::Value,
}

#[derive(Serialize, Deserialize)]
struct ResponseEnvelope {
	ok: bool,
	payload: serde_json::Value,
}

#[derive(Serialize, Deserialize)]
struct RemoteErrorPayload {
	kind: ErrorKind,
	message: String,
}

/// Dials the Auth control channel and speaks the envelope protocol; used by
/// Proxy and Node code that does not colocate with Auth.
pub struct RemoteAuthApi<C> {
	channel: C,
}

impl<C: ControlChannel> RemoteAuthApi<C> {
	pub fn new(channel: C) -> Self {
		Self { channel }
	}

	async fn call<Req: Serialize + Send + Sync, Resp: DeserializeOwned>(
		&self,
		method: &str,
		req: Req,
	) -> Result<Resp, AuthError> {
		let payload = serde_json::to_value(req).map_err(|e| AuthError::Internal(e.into()))?;
		let frame = serde_json::to_vec(&RequestEnvelope {
			method: method.to_string(),
			payload,
		})
		.map_err(|e| AuthError::Internal(e.into()))?;
		self.channel.send_frame(frame).await?;

		let response_bytes = self.channel.recv_frame().await?;
		let response: ResponseEnvelope =
			serde_json::from_slice(&response_bytes).map_err(|e| AuthError::Internal(e.into()))?;

		if response.ok {
			serde_json::from_value(response.payload).map_err(|e| AuthError::Internal(e.into()))
		} else {
			let err: RemoteErrorPayload =
				serde_json::from_value(response.payload).map_err(|e| AuthError::Internal(e.into()))?;
			Err(AuthError::Remote {
				kind: err.kind,
				message: err.message,
			})
		}
	}
}

/// Serializes an `AuthApi` result into the response envelope the other end
/// of a [`ControlChannel`] expects — the dispatch-side counterpart of
/// [`RemoteAuthApi::call`], used by the Auth server's control-channel
/// listener. Errors go out through [`crate::error::external_error`], so a
/// remote caller never sees a raw kind or message, only the collapsed,
/// uniform external form.
pub fn encode_response<T: Serialize>(result: &Result<T, AuthError>) -> Result<Vec<u8>, AuthError> {
	let envelope = match result {
		Ok(value) => ResponseEnvelope {
			ok: true,
			payload: serde_json::to_value(value).map_err(|e| AuthError::Internal(e.into()))?,
		},
		Err(e) => {
			let (kind, message) = crate::error::external_error(e);
			ResponseEnvelope {
				ok: false,
				payload: serde_json::to_value(RemoteErrorPayload {
					kind,
					message: message.to_string(),
				})
				.map_err(|e| AuthError::Internal(e.into()))?,
			}
		},
	};
	serde_json::to_vec(&envelope).map_err(|e| AuthError::Internal(e.into()))
}

pub fn decode_request(bytes: &[u8]) -> Result<(String, serde_json::Value), AuthError> {
	let envelope: RequestEnvelope = serde_json::from_slice(bytes).map_err(|e| AuthError::Internal(e.into()))?;
	Ok((envelope.method, envelope.payload))
}

#[async_trait]
impl<C: ControlChannel> AuthApi for RemoteAuthApi<C> {
	async fn upsert_ca(&self, req: UpsertCaRequest) -> Result<(), AuthError> {
		self.call("upsert_ca", req).await
	}

	async fn get_ca(&self, domain: &str, ca_type: CaType) -> Result<Option<CaSummary>, AuthError> {
		#[derive(Serialize)]
		struct Req<'a> {
			domain: &'a str,
			ca_type: CaType,
		}
		self.call("get_ca", Req { domain, ca_type }).await
	}

	async fn get_cas(&self, ca_type: CaType) -> Result<Vec<CaSummary>, AuthError> {
		self.call("get_cas", ca_type).await
	}

	async fn delete_ca(&self, domain: &str, ca_type: CaType) -> Result<(), AuthError> {
		#[derive(Serialize)]
		struct Req<'a> {
			domain: &'a str,
			ca_type: CaType,
		}
		self.call("delete_ca", Req { domain, ca_type }).await
	}

	async fn generate_host_cert(&self, req: GenerateHostCertRequest) -> Result<GenerateHostCertResponse, AuthError> {
		self.call("generate_host_cert", req).await
	}

	async fn register_using_token(
		&self,
		req: RegisterUsingTokenRequest,
	) -> Result<RegisterUsingTokenResponse, AuthError> {
		self.call("register_using_token", req).await
	}

	async fn sign_in(&self, req: SignInRequest) -> Result<SignInResponse, AuthError> {
		self.call("sign_in", req).await
	}

	async fn check_password(&self, login: &str, password: &str) -> Result<(), AuthError> {
		#[derive(Serialize)]
		struct Req<'a> {
			login: &'a str,
			password: &'a str,
		}
		self.call("check_password", Req { login, password }).await
	}

	async fn check_otp(&self, login: &str, code: &str) -> Result<(), AuthError> {
		#[derive(Serialize)]
		struct Req<'a> {
			login: &'a str,
			code: &'a str,
		}
		self.call("check_otp", Req { login, code }).await
	}

	async fn add_provisioning_token(
		&self,
		req: AddProvisioningTokenRequest,
	) -> Result<AddProvisioningTokenResponse, AuthError> {
		self.call("add_provisioning_token", req).await
	}

	async fn record_session(&self, event: SessionEvent) -> Result<(), AuthError> {
		self.call("record_session", event).await
	}

	async fn list_sessions(&self) -> Result<Vec<SessionEvent>, AuthError> {
		self.call("list_sessions", ()).await
	}

	async fn heartbeat_presence(
		&self,
		principal: String,
		labels: HashMap<String, String>,
		ttl: Duration,
	) -> Result<(), AuthError> {
		#[derive(Serialize)]
		struct Req {
			principal: String,
			labels: HashMap<String, String>,
			ttl: Duration,
		}
		self.call("heartbeat_presence", Req { principal, labels, ttl }).await
	}

	async fn list_presence(&self) -> Result<Vec<PresenceRecord>, AuthError> {
		self.call("list_presence", ()).await
	}
}
