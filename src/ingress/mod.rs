//! Host-based ingress: the dispatch table filled during compilation and the
//! reverse proxy that serves it on one fixed local port.

mod proxy;
mod table;

pub use proxy::{BoundProxy, IngressProxy, DEFAULT_PROXY_PORT};
pub use table::{Backend, DispatchTable, Route};
