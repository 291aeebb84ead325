//! Router: keeps the navigation token and the active module in sync.
//!
//! Token → state: navigation events (back/forward, deep links) are parsed
//! and turned into `open`/`close` calls. State → token: when a mount or
//! close takes effect the lifecycle calls back into the router, under its
//! slot lock, to write the token. Its own writes echo back as navigation
//! events; those are recognized and dropped.

mod location;

use std::collections::VecDeque;
use std::sync::{Arc, LazyLock, Mutex, MutexGuard, PoisonError};

use deepfly_events::{EventBus, EventMetadata, HubEvent};
use regex::Regex;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use location::NAVIGATION_CHANNEL_CAPACITY;
pub use location::{Location, MemoryLocation, NavigationEvent};

use crate::error::HubResult;
use crate::lifecycle::{CloseOutcome, Lifecycle, OpenOutcome};
use crate::slug::Slug;

/// Token meaning "no active module".
pub const EMPTY_TOKEN: &str = "";

static GAME_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"game=([A-Za-z0-9_-]+)").expect("invalid regex"));

/// Extract the slug from a token such as `#game=pong`.
#[must_use]
pub fn parse_slug(token: &str) -> Option<&str> {
    GAME_TOKEN
        .captures(token)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Token encoding `slug`.
#[must_use]
pub fn token_for(slug: &Slug) -> String {
    format!("#game={slug}")
}

/// How a routed request ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// The slug is mounted and the token points at it.
    Opened(Slug),
    /// Nothing is mounted and the token is empty.
    Closed,
    /// A newer request took over; nothing was written.
    Superseded,
}

#[derive(Debug)]
enum Route {
    Open(String),
    Close,
}

#[derive(Debug)]
struct Pending {
    route: Route,
    ticket: u64,
}

/// Maps navigation tokens onto lifecycle transitions and back.
pub struct Router {
    lifecycle: Arc<Lifecycle>,
    location: Arc<dyn Location>,
    bus: EventBus,
    echoes: Mutex<VecDeque<String>>,
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("token", &self.location.token())
            .field("lifecycle", &self.lifecycle)
            .finish_non_exhaustive()
    }
}

impl Router {
    /// A router driving `lifecycle` from `location`.
    #[must_use]
    pub fn new(lifecycle: Arc<Lifecycle>, location: Arc<dyn Location>, bus: EventBus) -> Self {
        Self {
            lifecycle,
            location,
            bus,
            echoes: Mutex::new(VecDeque::new()),
        }
    }

    /// Current navigation token.
    #[must_use]
    pub fn token(&self) -> String {
        self.location.token()
    }

    /// The lifecycle this router drives.
    #[must_use]
    pub fn lifecycle(&self) -> &Arc<Lifecycle> {
        &self.lifecycle
    }

    /// Open `slug` on behalf of the user and point the token at it.
    ///
    /// # Errors
    ///
    /// Whatever [`Lifecycle::open`] returns. The token is cleared if the
    /// failed open had already torn down the previous module, and left
    /// untouched otherwise.
    pub async fn open(&self, slug: &str) -> HubResult<RouteOutcome> {
        let ticket = self.lifecycle.issue_ticket();
        self.finish(Pending {
            route: Route::Open(slug.to_owned()),
            ticket,
        })
        .await
    }

    /// Close the active module and clear the token.
    #[allow(clippy::unused_async)]
    pub async fn close(&self) -> RouteOutcome {
        let ticket = self.lifecycle.issue_ticket();
        self.close_with_ticket(ticket)
    }

    /// Bring the lifecycle in line with `token`.
    ///
    /// A token naming the module that is already active is a no-op.
    ///
    /// # Errors
    ///
    /// Whatever [`Lifecycle::open`] returns.
    pub async fn navigate(&self, token: &str) -> HubResult<RouteOutcome> {
        match self.begin(token) {
            Some(pending) => self.finish(pending).await,
            None => Ok(self.current_outcome()),
        }
    }

    /// React to one navigation event. Returns the spawned transition, or
    /// `None` if the event was the router's own echo or already satisfied.
    ///
    /// The ticket is taken before spawning, so events dispatched in order
    /// supersede each other in order.
    pub fn dispatch(
        self: &Arc<Self>,
        event: &NavigationEvent,
    ) -> Option<JoinHandle<HubResult<RouteOutcome>>> {
        if self.take_echo(&event.token) {
            trace!(token = %event.token, "ignoring own token write");
            return None;
        }
        let pending = self.begin(&event.token)?;
        let router = Arc::clone(self);
        Some(tokio::spawn(async move { router.finish(pending).await }))
    }

    /// Follow the location's navigation events until it goes away or the
    /// task is aborted.
    #[must_use]
    pub fn listen(self: Arc<Self>) -> JoinHandle<()> {
        let mut events = self.location.subscribe();
        // Writes made while nobody was listening will never echo back.
        self.lock_echoes().clear();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        debug!(token = %event.token, "navigation event");
                        // Failures are reported by the lifecycle itself.
                        drop(self.dispatch(&event));
                    },
                    Err(RecvError::Lagged(n)) => {
                        warn!(skipped = n, "router lagged behind navigation events");
                        // Dropped events may have included our own echoes.
                        self.lock_echoes().clear();
                    },
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    fn begin(&self, token: &str) -> Option<Pending> {
        let route = match parse_slug(token) {
            Some(slug) => {
                if self
                    .lifecycle
                    .active_slug()
                    .is_some_and(|active| active.as_str() == slug)
                {
                    trace!(slug, "token names the active module");
                    return None;
                }
                Route::Open(slug.to_owned())
            },
            None => Route::Close,
        };
        Some(Pending {
            route,
            ticket: self.lifecycle.issue_ticket(),
        })
    }

    async fn finish(&self, pending: Pending) -> HubResult<RouteOutcome> {
        match pending.route {
            Route::Open(slug) => {
                let settle = |active: Option<&Slug>| match active {
                    Some(slug) => self.write_token(&token_for(slug)),
                    None => self.write_token(EMPTY_TOKEN),
                };
                Ok(
                    match self
                        .lifecycle
                        .open_with_ticket(&slug, pending.ticket, settle)
                        .await?
                    {
                        OpenOutcome::Mounted(slug) => RouteOutcome::Opened(slug),
                        OpenOutcome::Superseded => RouteOutcome::Superseded,
                    },
                )
            },
            Route::Close => Ok(self.close_with_ticket(pending.ticket)),
        }
    }

    fn close_with_ticket(&self, ticket: u64) -> RouteOutcome {
        let settle = || self.write_token(EMPTY_TOKEN);
        match self.lifecycle.close_with_ticket(ticket, settle) {
            CloseOutcome::Superseded => RouteOutcome::Superseded,
            CloseOutcome::Unmounted | CloseOutcome::AlreadyIdle => RouteOutcome::Closed,
        }
    }

    fn current_outcome(&self) -> RouteOutcome {
        self.lifecycle
            .active_slug()
            .map_or(RouteOutcome::Closed, RouteOutcome::Opened)
    }

    fn write_token(&self, token: &str) {
        {
            // Held across `set_token` so echoes queue in emission order.
            let mut echoes = self.lock_echoes();
            if self.location.token() == token {
                return;
            }
            // A listener further behind than the channel lags and clears
            // the queue anyway, so older entries can go.
            if echoes.len() >= NAVIGATION_CHANNEL_CAPACITY {
                echoes.pop_front();
            }
            echoes.push_back(token.to_owned());
            self.location.set_token(token);
        }
        debug!(token, "navigation token updated");
        self.bus.publish(HubEvent::Navigated {
            metadata: EventMetadata::new("router"),
            token: token.to_owned(),
        });
    }

    fn lock_echoes(&self) -> MutexGuard<'_, VecDeque<String>> {
        self.echoes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of own writes still expected to echo back.
    #[must_use]
    pub fn pending_echoes(&self) -> usize {
        self.lock_echoes().len()
    }

    /// Whether `token` is the echo of the oldest write not yet seen.
    fn take_echo(&self, token: &str) -> bool {
        let mut echoes = self.lock_echoes();
        if echoes.front().is_some_and(|echo| echo == token) {
            echoes.pop_front();
            true
        } else {
            false
        }
    }
}
