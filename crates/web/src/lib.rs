//! Routing, middleware and sessions on top of `brisk-http`.
//!
//! # Example
//!
//! ```no_run
//! use brisk_web::middleware::{CorsConfig, CorsMiddleware};
//! use brisk_web::router::Router;
//! use brisk_web::session::{Session, SessionManager};
//! use brisk_web::Server;
//!
//! #[tokio::main]
//! async fn main() {
//!     let router = Router::builder()
//!         .get("/", |_req, resp| {
//!             resp.set_body("hello world");
//!         })
//!         .pattern_callback(http::Method::GET, "/users/{id}", |req, resp| {
//!             let visits = Session::from_request(req).and_then(|s| s.get_value("visits"));
//!             resp.set_body(format!("user {} ({visits:?})", req.route_param("id").unwrap_or_default()));
//!         })
//!         .build()
//!         .expect("routes are valid");
//!
//!     let server = Server::builder()
//!         .router(router)
//!         .middleware(CorsMiddleware::new(CorsConfig::permissive()))
//!         .session_manager(SessionManager::in_memory())
//!         .address("127.0.0.1:8080")
//!         .build()
//!         .expect("server config is valid");
//!
//!     server.start().await.expect("server runs");
//! }
//! ```
//!
//! # Request flow
//!
//! Each parsed request goes through the [`Pipeline`]: session resolution,
//! middleware `before` hooks, routing (static handlers, static callbacks,
//! pattern handlers, pattern callbacks, then the default handler or 404), and
//! middleware `after` hooks in reverse.

pub mod config;
pub mod handler;
pub mod middleware;
pub mod router;
pub mod session;

mod pipeline;
mod server;

pub use brisk_http::protocol::{Headers, Request, Response};
pub use config::ServerConfig;
pub use handler::{BoxError, RequestHandler};
pub use pipeline::Pipeline;
pub use router::Router;
pub use server::{Server, ServerBuildError, ServerBuilder, ServerError};
