use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::client::{Backend, ClientResult, Credentials, Registration};
use crate::model::{Bookmark, SupportedWebsite, TrackedItem};

/// Work the dashboard hands to a background thread.
#[derive(Debug, Clone)]
pub enum Request {
    Items,
    Bookmarks,
    Websites,
    Refresh,
    Submit(Vec<TrackedItem>),
    Login(Credentials),
    Register(Registration),
}

impl Request {
    fn name(&self) -> &'static str {
        match self {
            Request::Items => "items",
            Request::Bookmarks => "bookmarks",
            Request::Websites => "websites",
            Request::Refresh => "refresh",
            Request::Submit(_) => "submit",
            Request::Login(_) => "login",
            Request::Register(_) => "register",
        }
    }

    fn execute(self, backend: &dyn Backend) -> Response {
        match self {
            Request::Items => Response::Items(backend.fetch_items()),
            Request::Bookmarks => Response::Bookmarks(backend.fetch_bookmarks()),
            Request::Websites => Response::Websites(backend.fetch_supported_websites()),
            Request::Refresh => Response::Refreshed(backend.refresh()),
            Request::Submit(items) => Response::Submitted(backend.submit(&items)),
            Request::Login(credentials) => Response::LoggedIn {
                result: backend.login(&credentials),
                username: credentials.username,
            },
            Request::Register(registration) => Response::Registered {
                result: backend.register(&registration),
                username: registration.username,
            },
        }
    }
}

#[derive(Debug)]
pub enum Response {
    Items(ClientResult<Vec<TrackedItem>>),
    Bookmarks(ClientResult<Vec<Bookmark>>),
    Websites(ClientResult<Vec<SupportedWebsite>>),
    Refreshed(ClientResult<String>),
    Submitted(ClientResult<Vec<TrackedItem>>),
    LoggedIn {
        username: String,
        result: ClientResult<String>,
    },
    Registered {
        username: String,
        result: ClientResult<String>,
    },
}

#[derive(Debug)]
pub struct AsyncResponse {
    pub request_id: u64,
    pub response: Response,
}

/// Runs backend calls off the UI thread and queues their results.
pub struct ActionDispatcher {
    backend: Arc<dyn Backend>,
    tx: Sender<AsyncResponse>,
    rx: Receiver<AsyncResponse>,
    next_id: u64,
}

impl ActionDispatcher {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        let (tx, rx) = unbounded();
        Self {
            backend,
            tx,
            rx,
            next_id: 0,
        }
    }

    pub fn dispatch(&mut self, request: Request) -> Result<u64> {
        self.next_id += 1;
        let request_id = self.next_id;
        let name = request.name();
        let backend = Arc::clone(&self.backend);
        let tx = self.tx.clone();
        thread::Builder::new()
            .name(format!("mangatrack-{name}"))
            .spawn(move || {
                let response = request.execute(backend.as_ref());
                if tx.send(AsyncResponse { request_id, response }).is_err() {
                    tracing::debug!(request_id, "dashboard closed before response arrived");
                }
            })
            .with_context(|| format!("spawning {name} request thread"))?;
        tracing::debug!(request_id, request = name, "dispatched backend request");
        Ok(request_id)
    }

    pub fn try_recv(&self) -> Option<AsyncResponse> {
        self.rx.try_recv().ok()
    }

    #[cfg(test)]
    pub fn recv_timeout(&self, timeout: std::time::Duration) -> Option<AsyncResponse> {
        self.rx.recv_timeout(timeout).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::fake::{item, FakeBackend};
    use assert_matches::assert_matches;
    use std::time::Duration;

    #[test]
    fn responses_carry_their_request_ids() -> anyhow::Result<()> {
        let backend = Arc::new(FakeBackend::with_items(vec![item(
            "1", "Berserk", "374", "2024-01-01",
        )]));
        let mut dispatcher = ActionDispatcher::new(backend);
        let first = dispatcher.dispatch(Request::Items)?;
        let second = dispatcher.dispatch(Request::Refresh)?;
        assert!(second > first);

        let mut seen = Vec::new();
        for _ in 0..2 {
            let response = dispatcher
                .recv_timeout(Duration::from_secs(5))
                .expect("response");
            seen.push(response.request_id);
            match response.response {
                Response::Items(result) => assert_eq!(result?.len(), 1),
                Response::Refreshed(result) => assert_eq!(result?, "Refreshed 1 records"),
                other => panic!("unexpected response {other:?}"),
            }
        }
        seen.sort_unstable();
        assert_eq!(seen, vec![first, second]);
        Ok(())
    }

    #[test]
    fn login_response_keeps_the_username() -> anyhow::Result<()> {
        let backend = Arc::new(FakeBackend::default());
        let mut dispatcher = ActionDispatcher::new(backend);
        dispatcher.dispatch(Request::Login(Credentials {
            username: "reader".into(),
            password: "wrong".into(),
        }))?;
        let response = dispatcher
            .recv_timeout(Duration::from_secs(5))
            .expect("response");
        assert_matches!(
            response.response,
            Response::LoggedIn { ref username, result: Err(ref err) }
                if username == "reader" && err.is_unauthorized()
        );
        Ok(())
    }
}
