//! Tracks the one session that is currently being timed.
//!
//! While running, a background task recomputes the elapsed time every frame and publishes it
//! through a [watch] channel. The value is only for display, the stored total is taken from the
//! clock when the timer stops.

pub mod lock;

use std::{sync::Arc, time::Duration};

use tokio::{sync::watch, task::JoinHandle, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    entries::{cases::DailyCases, entities::Session},
    utils::{clock::Clock, time::time_of_day},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerState {
    Idle,
    Running {
        session_id: Arc<str>,
        started: Instant,
    },
}

struct Ticker {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct TimerController {
    cases: Arc<DailyCases>,
    clock: Arc<dyn Clock>,
    frame: Duration,
    state: TimerState,
    elapsed: Arc<watch::Sender<Duration>>,
    ticker: Option<Ticker>,
}

impl TimerController {
    pub fn new(cases: Arc<DailyCases>, clock: Arc<dyn Clock>, frame: Duration) -> Self {
        let (elapsed, _) = watch::channel(Duration::ZERO);
        Self {
            cases,
            clock,
            frame,
            state: TimerState::Idle,
            elapsed: Arc::new(elapsed),
            ticker: None,
        }
    }

    pub fn state(&self) -> &TimerState {
        &self.state
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, TimerState::Running { .. })
    }

    pub fn elapsed(&self) -> Duration {
        *self.elapsed.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Duration> {
        self.elapsed.subscribe()
    }

    /// Session being timed right now, as it's currently listed.
    pub fn current_case(&self) -> Option<Session> {
        match &self.state {
            TimerState::Running { session_id, .. } => self.cases.find(session_id),
            TimerState::Idle => None,
        }
    }

    /// Opens a new session at the top of today's list and starts timing it. Does nothing while
    /// another session is running.
    pub fn start(&mut self, case_name: &str, activity: &str) -> Option<Session> {
        if self.is_running() {
            debug!("Timer is already running, ignoring start of {case_name}");
            return None;
        }

        let session = Session::open(
            Uuid::new_v4().to_string(),
            case_name,
            activity,
            time_of_day(self.clock.time()),
        );
        let opened = session.clone();
        self.cases.set_all_cases(move |mut previous| {
            previous.insert(0, opened);
            previous
        });

        let started = self.clock.instant();
        self.state = TimerState::Running {
            session_id: session.id.clone(),
            started,
        };
        self.elapsed.send_replace(Duration::ZERO);
        self.spawn_ticker(started);
        info!("Started {} / {} as {}", session.case_name, session.activity, session.id);
        Some(session)
    }

    /// Recomputes elapsed time. Returns `None` while idle.
    pub fn tick(&self) -> Option<Duration> {
        let TimerState::Running { started, .. } = &self.state else {
            return None;
        };
        let elapsed = self.clock.instant().saturating_duration_since(*started);
        self.elapsed.send_replace(elapsed);
        Some(elapsed)
    }

    /// Closes the running session and hands it to the store. Sessions left open by an earlier
    /// run that never stopped are dropped at the same time. Does nothing while idle.
    pub fn stop(&mut self) -> Option<Session> {
        let TimerState::Running {
            session_id,
            started,
        } = std::mem::replace(&mut self.state, TimerState::Idle)
        else {
            debug!("Stop without an active session");
            return None;
        };
        self.cancel_ticker();

        let elapsed = self.clock.instant().saturating_duration_since(started);
        let end_time = time_of_day(self.clock.time());
        let total_time = chrono::Duration::seconds(elapsed.as_secs() as i64);

        let mut closed = None;
        self.cases.set_all_cases(|previous| {
            previous
                .into_iter()
                .map(|session| {
                    if session.id == session_id {
                        let session = session.close(end_time, total_time);
                        closed = Some(session.clone());
                        session
                    } else {
                        session
                    }
                })
                .filter(|session| {
                    let keep = session.total_time.is_some();
                    if !keep {
                        warn!("Dropping session {} that was never stopped", session.id);
                    }
                    keep
                })
                .collect()
        });
        self.elapsed.send_replace(Duration::ZERO);

        match &closed {
            Some(session) => info!(
                "Stopped {} after {}s",
                session.case_name,
                total_time.num_seconds()
            ),
            None => warn!("Running session {session_id} disappeared before it was stopped"),
        }
        closed
    }

    /// Throws away the running measurement without storing anything.
    pub fn reset(&mut self) {
        self.cancel_ticker();
        self.state = TimerState::Idle;
        self.elapsed.send_replace(Duration::ZERO);
        debug!("Timer reset");
    }

    fn spawn_ticker(&mut self, started: Instant) {
        self.cancel_ticker();
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let clock = self.clock.clone();
        let elapsed = self.elapsed.clone();
        let frame = self.frame;

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = cancelled.cancelled() => return,
                    _ = clock.sleep(frame) => {
                        elapsed.send_replace(clock.instant().saturating_duration_since(started));
                    }
                }
            }
        });
        self.ticker = Some(Ticker { token, handle });
    }

    fn cancel_ticker(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.token.cancel();
            if ticker.handle.is_finished() {
                warn!("Ticker stopped on its own");
            }
        }
    }
}

impl Drop for TimerController {
    fn drop(&mut self) {
        self.cancel_ticker();
    }
}
