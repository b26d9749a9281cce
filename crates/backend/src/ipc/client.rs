//! Daemon client.
//!
//! One socket per [`Client`]. A background task owns the connection, writes
//! queued requests and routes each response line back to its caller by id,
//! so clones may have several calls in flight at once.

use std::{
  collections::HashMap,
  path::Path,
  sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
  },
};

use futures::{
  SinkExt, StreamExt,
  stream::{SplitSink, SplitStream},
};
use tokio::{
  net::UnixStream,
  sync::{mpsc, oneshot},
};
use tokio_util::codec::{Framed, LinesCodec};
use tracing::{debug, trace, warn};

use super::{IpcError, Request, RequestData, Response, ResponseData, ResponseScenario};

type Lines = Framed<UnixStream, LinesCodec>;

/// Calls queued before the connection task picks them up
const QUEUE_DEPTH: usize = 64;

/// A request parameter type paired with the result it expects back.
pub trait IpcRequest: Into<RequestData> + Clone {
  type Response;

  /// Pull this request's result out of a response, or `NoResult` when the
  /// daemon answered with a different variant.
  fn extract(data: ResponseData) -> Result<Self::Response, IpcError>;
}

struct Call {
  request: Request,
  reply: oneshot::Sender<Response>,
}

#[derive(Clone)]
pub struct Client {
  calls: mpsc::Sender<Call>,
  next_id: Arc<AtomicU64>,
}

impl Client {
  /// Connect to the daemon's default socket.
  pub async fn connect() -> Result<Self, IpcError> {
    Self::connect_to(&crate::dirs::default_socket_path()).await
  }

  pub async fn connect_to(socket_path: &Path) -> Result<Self, IpcError> {
    let stream = UnixStream::connect(socket_path)
      .await
      .map_err(|e| IpcError::Connection(format!("{}: {}", socket_path.display(), e)))?;
    let (writer, reader) = Framed::new(stream, LinesCodec::new()).split();

    let (calls, queue) = mpsc::channel(QUEUE_DEPTH);
    tokio::spawn(Connection::default().run(writer, reader, queue));

    Ok(Self {
      calls,
      next_id: Arc::new(AtomicU64::new(1)),
    })
  }

  /// Send one request and wait for its typed result.
  pub async fn call<R: IpcRequest>(&self, params: R) -> Result<R::Response, IpcError> {
    let response = self.round_trip(params.into()).await?;
    match response.scenario {
      ResponseScenario::Result { result } => R::extract(result),
      ResponseScenario::Error { error } => Err(error),
    }
  }

  async fn round_trip(&self, data: RequestData) -> Result<Response, IpcError> {
    let request = Request {
      id: self.next_id.fetch_add(1, Ordering::Relaxed).to_string(),
      data,
    };
    let (reply, response) = oneshot::channel();

    self
      .calls
      .send(Call { request, reply })
      .await
      .map_err(|_| IpcError::Connection("daemon connection closed".into()))?;

    response
      .await
      .map_err(|_| IpcError::Connection("daemon connection closed before replying".into()))
  }
}

// ============================================================================
// Connection task
// ============================================================================

/// Calls written to the socket and still waiting for their response.
#[derive(Default)]
struct Connection {
  in_flight: HashMap<String, oneshot::Sender<Response>>,
}

impl Connection {
  async fn run(
    mut self,
    mut writer: SplitSink<Lines, String>,
    mut reader: SplitStream<Lines>,
    mut queue: mpsc::Receiver<Call>,
  ) {
    loop {
      tokio::select! {
        Some(call) = queue.recv() => self.write(&mut writer, call).await,

        line = reader.next() => match line {
          Some(Ok(line)) => self.deliver(&line),
          Some(Err(e)) => {
            warn!(err = %e, "Daemon connection failed");
            break;
          }
          None => {
            debug!("Daemon closed the connection");
            break;
          }
        },
      }
    }

    let abandoned = self.in_flight.len();
    for (id, reply) in self.in_flight {
      let _ = reply.send(Response::error(id, IpcError::Connection("connection closed".into())));
    }
    debug!(abandoned, "Client connection task stopped");
  }

  async fn write(&mut self, writer: &mut SplitSink<Lines, String>, call: Call) {
    let id = call.request.id.clone();
    let line = match serde_json::to_string(&call.request) {
      Ok(line) => line,
      Err(e) => {
        let _ = call.reply.send(Response::error(id, e.into()));
        return;
      }
    };

    trace!(id = %id, method = call.request.data.name(), "Sending request");
    self.in_flight.insert(id.clone(), call.reply);
    if let Err(e) = writer.send(line).await
      && let Some(reply) = self.in_flight.remove(&id)
    {
      let _ = reply.send(Response::error(id, IpcError::Connection(e.to_string())));
    }
  }

  fn deliver(&mut self, line: &str) {
    let response: Response = match serde_json::from_str(line) {
      Ok(response) => response,
      Err(e) => {
        warn!(err = %e, "Unreadable response line from daemon");
        return;
      }
    };

    match self.in_flight.remove(&response.id) {
      // The caller may have given up waiting
      Some(reply) => {
        let _ = reply.send(response);
      }
      None => warn!(id = %response.id, "Response for a request that is not in flight"),
    }
  }
}

// ============================================================================
// Request/response wiring
// ============================================================================

/// Wire a params type to its `RequestData` variant and its result type.
///
/// The trailing `ident => expr` clause also converts the result into
/// `ResponseData`; leave it out when the result type is shared with another
/// request.
#[macro_export]
macro_rules! impl_ipc_request {
  (
    $req:ty => $resp:ty,
    $resp_pattern:pat => $resp_extract:expr,
    $req_ident:ident => $req_construct:expr
    $(, $resp_ident:ident => $resp_construct:expr)?
  ) => {
    impl $crate::ipc::client::IpcRequest for $req {
      type Response = $resp;

      fn extract(data: $crate::ipc::ResponseData) -> Result<Self::Response, $crate::ipc::IpcError> {
        match data {
          $resp_pattern => Ok($resp_extract),
          _ => Err($crate::ipc::IpcError::NoResult),
        }
      }
    }

    impl From<$req> for $crate::ipc::RequestData {
      fn from($req_ident: $req) -> Self {
        $req_construct
      }
    }

    $(
      impl From<$resp> for $crate::ipc::ResponseData {
        fn from($resp_ident: $resp) -> Self {
          $resp_construct
        }
      }
    )?
  };
}

pub use impl_ipc_request;
