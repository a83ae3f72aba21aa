//! Multi-device connection orchestrator.
//!
//! Runs one session lifecycle per target concurrently on the current
//! executor:
//!
//! 1. connect (with timeout) and discover,
//! 2. run the caller's work against the ready session while pumping its
//!    notifications,
//! 3. close.
//!
//! Lifecycles share nothing but the adapter, so a timeout or GATT failure
//! on one device never reaches its siblings.  An external shutdown future
//! cuts every lifecycle short; all sessions are closed before `run`
//! returns.

use alloc::collections::BTreeMap;
use core::cell::RefCell;
use core::fmt;
use core::future::{pending, Future};

use embassy_futures::select::{select, Either};
use futures::future::join_all;

use super::adapter::Adapter;
use super::session::Session;
use super::{Address, ConnectionState, DeviceDescriptor};
use crate::config::SessionConfig;
use crate::error::{ConnectError, GattError};

/// Terminal result of one device's lifecycle.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Outcome {
    /// Work finished and the session was closed.
    Completed,
    /// The session never reached `Ready`.
    ConnectFailed(ConnectError),
    /// Work failed, or the link was lost while it ran.
    Failed(GattError),
    /// Shutdown arrived first.
    Cancelled,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::ConnectFailed(e) => write!(f, "{e}"),
            Self::Failed(e) => write!(f, "failed: {e}"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Per-address outcomes of one orchestrated run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Report {
    outcomes: BTreeMap<Address, Outcome>,
}

impl Report {
    pub fn get(&self, address: &Address) -> Option<&Outcome> {
        self.outcomes.get(address)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Address, &Outcome)> {
        self.outcomes.iter()
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn completed(&self) -> usize {
        self.outcomes
            .values()
            .filter(|o| **o == Outcome::Completed)
            .count()
    }
}

pub struct Orchestrator<'a, A: Adapter> {
    adapter: &'a A,
    config: SessionConfig,
}

impl<'a, A: Adapter> Orchestrator<'a, A> {
    pub fn new(adapter: &'a A, config: SessionConfig) -> Self {
        Self { adapter, config }
    }

    /// Run `work` against every target until all lifecycles end.
    pub async fn run_to_completion<W>(&self, targets: &[DeviceDescriptor], work: W) -> Report
    where
        W: AsyncFn(&Session<'a, A>) -> Result<(), GattError>,
    {
        self.run(targets, work, pending::<()>()).await
    }

    /// Run `work` against every target until all lifecycles end or
    /// `shutdown` resolves, whichever comes first.
    ///
    /// Targets are de-duplicated by address.
    pub async fn run<W, S>(&self, targets: &[DeviceDescriptor], work: W, shutdown: S) -> Report
    where
        W: AsyncFn(&Session<'a, A>) -> Result<(), GattError>,
        S: Future<Output = ()>,
    {
        let sessions: BTreeMap<Address, Session<'a, A>> = targets
            .iter()
            .map(|d| (d.address, Session::new(self.adapter, d.address, self.config)))
            .collect();
        let outcomes = RefCell::new(BTreeMap::new());
        let (work, recorded) = (&work, &outcomes);

        info!("orchestrating {} sessions", sessions.len());
        let lifecycles = sessions.values().map(|session| async move {
            let outcome = lifecycle(session, work).await;
            recorded.borrow_mut().insert(session.address(), outcome);
            session.close().await;
        });

        if let Either::Second(()) = select(join_all(lifecycles), shutdown).await {
            info!("shutdown requested");
        }

        let mut report = Report {
            outcomes: outcomes.into_inner(),
        };
        // Lifecycles cut short may have been mid-close; finish those too.
        for (address, session) in sessions.iter() {
            if session.state() != ConnectionState::Disconnected {
                session.close().await;
            }
            report
                .outcomes
                .entry(*address)
                .or_insert(Outcome::Cancelled);
        }
        report
    }
}

async fn lifecycle<'a, A, W>(session: &Session<'a, A>, work: &W) -> Outcome
where
    A: Adapter,
    W: AsyncFn(&Session<'a, A>) -> Result<(), GattError>,
{
    if let Err(e) = session.connect().await {
        return Outcome::ConnectFailed(e);
    }
    match select(work(session), session.pump()).await {
        Either::First(Ok(())) | Either::Second(Ok(())) => Outcome::Completed,
        Either::First(Err(e)) | Either::Second(Err(e)) => {
            warn!("{}: {}", session.address(), e);
            Outcome::Failed(e)
        }
    }
}
