use core::fmt;
use std::sync::Arc;

use croak_msg::Code;

use crate::exchange::Exchange;
use crate::req::Req;
use crate::resp::{code, Resp};

/// Hands requests and responses that made it through the stack
/// to the application.
///
/// By the time anything is delivered, duplicates were filtered out and
/// block-wise bodies were reassembled. The endpoint stores a delivered
/// response in its request's [`MessageState`](crate::lifecycle::MessageState)
/// before calling [`Deliverer::deliver_response`], so a client blocked in
/// [`Req::wait_for_response`] wakes up regardless of the deliverer.
pub trait Deliverer: fmt::Debug + Send + Sync {
  /// A request arrived.
  ///
  /// Yield a response to have the endpoint send it right away. Yield
  /// `None` to answer later with
  /// [`Endpoint::respond`](crate::endpoint::Endpoint::respond), or to
  /// [`accept`](crate::endpoint::Endpoint::accept) first and respond
  /// separately.
  fn deliver_request(&self, exchange: &Arc<Exchange>, req: &Req) -> Option<Resp>;

  /// A response to a request we sent arrived
  fn deliver_response(&self, _exchange: &Arc<Exchange>, _resp: &Resp) {}
}

/// Answers every request with 4.04 Not Found
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NotFound;

impl Deliverer for NotFound {
  fn deliver_request(&self, exchange: &Arc<Exchange>, req: &Req) -> Option<Resp> {
    log::debug!("exchange {}: no resource at {:?}", exchange.id(), req.path_string());
    Some(Resp::for_request(req, code::NOT_FOUND))
  }
}

type Handler = Box<dyn Fn(&Req) -> Resp + Send + Sync>;

struct Route {
  method: Option<Code>,
  path: String,
  handler: Handler,
}

/// Dispatches requests to handlers by path and method.
///
/// Requests for a path nobody handles get 4.04 Not Found; requests for
/// a known path with a method nobody handles get 4.05 Method Not Allowed.
///
/// ```
/// use croak::endpoint::Routes;
/// use croak::req::Req;
/// use croak::resp::{code, Resp};
/// use croak_msg::Code;
///
/// let routes = Routes::new().route(Code::GET, "sensors/temp", |req: &Req| {
///                             let mut resp = Resp::for_request(req, code::CONTENT);
///                             resp.set_payload("23.5");
///                             resp
///                           });
/// assert_eq!(routes.len(), 1);
/// ```
#[derive(Default)]
pub struct Routes {
  routes: Vec<Route>,
}

impl fmt::Debug for Routes {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_list()
     .entries(self.routes.iter().map(|r| (r.method, &r.path)))
     .finish()
  }
}

impl Routes {
  /// No routes
  pub fn new() -> Self {
    Self::default()
  }

  /// Handle requests for `path` (without leading slash) made with `method`
  pub fn route(mut self, method: Code, path: &str, f: impl Fn(&Req) -> Resp + Send + Sync + 'static) -> Self {
    self.routes.push(Route { method: Some(method),
                             path: path.trim_start_matches('/').to_string(),
                             handler: Box::new(f) });
    self
  }

  /// Handle requests for `path` whatever the method
  pub fn any(mut self, path: &str, f: impl Fn(&Req) -> Resp + Send + Sync + 'static) -> Self {
    self.routes.push(Route { method: None,
                             path: path.trim_start_matches('/').to_string(),
                             handler: Box::new(f) });
    self
  }

  /// Number of routes
  pub fn len(&self) -> usize {
    self.routes.len()
  }

  /// Are there no routes?
  pub fn is_empty(&self) -> bool {
    self.routes.is_empty()
  }
}

impl Deliverer for Routes {
  fn deliver_request(&self, exchange: &Arc<Exchange>, req: &Req) -> Option<Resp> {
    let path = req.path_string();
    let mut for_path = self.routes.iter().filter(|r| r.path == path).peekable();

    if for_path.peek().is_none() {
      return NotFound.deliver_request(exchange, req);
    }

    match for_path.find(|r| r.method.map(|m| m == req.code).unwrap_or(true)) {
      | Some(route) => Some((route.handler)(req)),
      | None => {
        log::debug!("exchange {}: {} not allowed on {:?}", exchange.id(), req.code, path);
        Some(Resp::for_request(req, code::METHOD_NOT_ALLOWED))
      },
    }
  }
}
