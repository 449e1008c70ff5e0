use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use brisk_web::middleware::{CorsConfig, CorsMiddleware};
use brisk_web::router::Router;
use brisk_web::session::{Session, SessionConfig, SessionManager};
use brisk_web::{BoxError, Request, RequestHandler, Response, Server};
use http::{Method, StatusCode};
use serde::Deserialize;
use tracing::Level;

#[derive(Deserialize, Debug)]
struct NewNote {
    text: String,
}

/// A tiny in-memory note store.
#[derive(Default)]
struct Notes {
    notes: RwLock<HashMap<String, String>>,
}

#[async_trait]
impl RequestHandler for Notes {
    async fn handle(&self, req: &Request, resp: &mut Response) -> Result<(), BoxError> {
        let id = req.route_param("id").unwrap_or_default();

        match *req.method() {
            Method::GET => match self.notes.read().map_err(|_| "note store poisoned")?.get(id) {
                Some(text) => resp.set_body(text.clone()),
                None => resp.set_status(StatusCode::NOT_FOUND),
            },
            Method::PUT => {
                let note: NewNote = serde_json::from_slice(req.body())?;
                self.notes.write().map_err(|_| "note store poisoned")?.insert(id.to_owned(), note.text);
                resp.set_status(StatusCode::CREATED)
            }
            _ => resp.set_status(StatusCode::METHOD_NOT_ALLOWED),
        };
        Ok(())
    }

    async fn init(&self) -> Result<(), BoxError> {
        tracing::info!("note store ready");
        Ok(())
    }
}

struct NotFound;

#[async_trait]
impl RequestHandler for NotFound {
    async fn handle(&self, req: &Request, resp: &mut Response) -> Result<(), BoxError> {
        resp.set_status(StatusCode::NOT_FOUND).set_body(format!("404 not found: {}\r\n", req.path()));
        Ok(())
    }
}

// curl -v -b cookies -c cookies http://127.0.0.1:8080/visits
fn visits(req: &Request, resp: &mut Response) {
    let Some(session) = Session::from_request(req) else {
        resp.set_status(StatusCode::INTERNAL_SERVER_ERROR);
        return;
    };
    let count = session.get_value("visits").and_then(|v| v.parse::<u64>().ok()).unwrap_or(0) + 1;
    session.set_value("visits", count.to_string());
    resp.set_body(format!("visit #{count}\r\n"));
}

// curl -v -X PUT -d '{"text":"hello"}' http://127.0.0.1:8080/notes/1
// curl -v http://127.0.0.1:8080/notes/1
#[tokio::main]
async fn main() {
    let notes = std::sync::Arc::new(Notes::default());

    let router = Router::builder()
        .get("/", |_req, resp| {
            resp.set_body("hello brisk\r\n");
        })
        .get("/visits", visits)
        .shared_pattern_handler(Method::GET, "/notes/{id}", notes.clone())
        .shared_pattern_handler(Method::PUT, "/notes/{id}", notes)
        .build()
        .expect("routes are valid");

    let sessions = SessionManager::new(
        brisk_web::session::MemorySessionStorage::new(),
        SessionConfig { max_age: 600, ..SessionConfig::default() },
    );

    let server = Server::builder()
        .router(router)
        .address("127.0.0.1:8080")
        .middleware(CorsMiddleware::new(CorsConfig::permissive()))
        .session_manager(sessions)
        .default_handler(NotFound)
        .log_level(Level::INFO)
        .build()
        .expect("server config is valid");

    if let Err(e) = server.start().await {
        eprintln!("server stopped with error: {e}");
    }
}
