// Copyright (c) Contributors to the sftpfs project.
// SPDX-License-Identifier: Apache-2.0

//! Ownership and repair of the single remote session of a mount.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use arc_swap::ArcSwapOption;

use crate::config::MountContext;
use crate::remote::{Connector, RemoteSession};
use crate::{Error, Result};

#[cfg(test)]
#[path = "./session_test.rs"]
mod session_test;

#[derive(Debug, Default)]
struct FaultState {
    faulted: bool,
    retries: u64,
}

/// Owns the remote session shared by every in-flight operation.
///
/// Reading the current session never blocks. Repairing a faulted
/// session is serialized so that any number of callers observing
/// the same failure result in a single reconnect.
pub struct SessionManager<C: Connector> {
    connector: C,
    context: MountContext,
    session: ArcSwapOption<C::Session>,
    fault: Mutex<FaultState>,
}

impl<C: Connector> SessionManager<C> {
    pub fn new(connector: C, context: MountContext) -> Self {
        Self {
            connector,
            context,
            session: ArcSwapOption::empty(),
            fault: Mutex::new(FaultState::default()),
        }
    }

    /// Open a new session and install it as the current one.
    pub fn connect(&self) -> Result<()> {
        match self.connector.connect(&self.context) {
            Ok(session) => {
                self.session.store(Some(Arc::new(session)));
                tracing::debug!(address = %self.context.address(), "session connected");
                Ok(())
            }
            Err(err) => {
                tracing::error!(address = %self.context.address(), "failed to connect: {err}");
                Err(err)
            }
        }
    }

    /// The session currently in use.
    pub fn current_session(&self) -> Result<Arc<C::Session>> {
        self.session.load_full().ok_or(Error::NotConnected)
    }

    /// Record that a connection level failure was observed.
    pub fn mark_faulted(&self) {
        self.lock_fault().faulted = true;
    }

    pub fn is_faulted(&self) -> bool {
        self.lock_fault().faulted
    }

    /// The number of reconnects attempted over the lifetime of this manager
    pub fn retry_count(&self) -> u64 {
        self.lock_fault().retries
    }

    /// Fault and reconnect after `failed` observed a connection level failure.
    ///
    /// Nothing is reconnected when `failed` has already been replaced by
    /// another caller's repair. `None` stands for a caller that found no
    /// session at all. Returns `false` if a new session could not be
    /// established, leaving the fault in place.
    pub fn repair(&self, failed: Option<&Arc<C::Session>>) -> bool {
        let mut fault = self.lock_fault();
        let replaced = {
            let current = self.session.load();
            match (failed, &*current) {
                (Some(failed), Some(current)) => !Arc::ptr_eq(failed, current),
                (None, Some(_)) => true,
                (_, None) => false,
            }
        };
        if replaced {
            return !fault.faulted;
        }
        fault.faulted = true;
        self.replace_session(&mut fault)
    }

    /// Replace a faulted session with a new one.
    ///
    /// Returns immediately with `true` if the session is not faulted,
    /// which is the case for every caller that waited on another
    /// caller's successful reconnect. Returns `false` if a new session
    /// could not be established, leaving the fault in place.
    pub fn reconnect(&self) -> bool {
        let mut fault = self.lock_fault();
        if !fault.faulted {
            return true;
        }
        self.replace_session(&mut fault)
    }

    /// Connect a new session and install it, keeping the stale
    /// session in place until the new one is ready.
    fn replace_session(&self, fault: &mut FaultState) -> bool {
        fault.retries += 1;
        tracing::info!(attempt = fault.retries, "reconnecting remote session");
        let session = match self.connector.connect(&self.context) {
            Ok(session) => session,
            Err(err) => {
                tracing::warn!(attempt = fault.retries, "reconnect failed: {err}");
                return false;
            }
        };
        let stale = self.session.swap(Some(Arc::new(session)));
        fault.faulted = false;
        tracing::debug!(address = %self.context.address(), "session reconnected");
        if let Some(stale) = stale {
            if let Err(err) = stale.disconnect() {
                tracing::warn!("failed to disconnect stale session: {err}");
            }
        }
        true
    }

    /// Tear down and forget the current session, if any.
    pub fn disconnect(&self) -> Result<()> {
        match self.session.swap(None) {
            Some(session) => session.disconnect(),
            None => Ok(()),
        }
    }

    fn lock_fault(&self) -> MutexGuard<'_, FaultState> {
        // the fault state is always left consistent, even by a panicking holder
        self.fault.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
