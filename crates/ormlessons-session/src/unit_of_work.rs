//! Transactional scope around a session.
//!
//! A [`UnitOfWork`] begins a transaction when it starts (a savepoint when the
//! shared connection already has one open) and ends in exactly one of three
//! ways:
//!
//! - [`UnitOfWork::commit`]: flush, then commit
//! - [`UnitOfWork::rollback`]: discard everything
//! - drop without either: roll back and raise [`Alert::ImplicitRollback`]
//!
//! Units of work sharing a connection must end in reverse order of starting.

use crate::profiler::Alert;
use crate::{FlushResult, Session};
use ormlessons_core::{Connection, Result};
use std::fmt;
use std::ops::Deref;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Active,
    Committed,
    RolledBack,
}

/// A session bound to one transaction.
pub struct UnitOfWork<C: Connection> {
    session: Session<C>,
    state: State,
}

impl<C: Connection> UnitOfWork<C> {
    pub(crate) fn start(session: Session<C>) -> Result<Self> {
        session.connection().begin()?;
        tracing::debug!(
            session = session.id(),
            depth = session.connection().transaction_depth(),
            "unit of work started"
        );
        Ok(Self {
            session,
            state: State::Active,
        })
    }

    pub fn session(&self) -> &Session<C> {
        &self.session
    }

    /// Flush pending changes and commit.
    ///
    /// If the flush fails the transaction is rolled back and the error
    /// returned.
    #[tracing::instrument(level = "debug", skip(self), fields(session = self.session.id()))]
    pub fn commit(mut self) -> Result<FlushResult> {
        let result = match self.session.flush() {
            Ok(result) => result,
            Err(e) => {
                self.state = State::RolledBack;
                if let Err(rollback) = self.session.connection().rollback() {
                    tracing::error!(error = %rollback, "rollback after failed flush failed");
                }
                return Err(e);
            }
        };
        self.session.connection().commit()?;
        self.state = State::Committed;
        tracing::info!(
            session = self.session.id(),
            inserted = result.inserted,
            updated = result.updated,
            deleted = result.deleted,
            "unit of work committed"
        );
        Ok(result)
    }

    /// Discard every change made in this unit of work.
    pub fn rollback(mut self) -> Result<()> {
        self.state = State::RolledBack;
        self.session.connection().rollback()?;
        tracing::info!(session = self.session.id(), "unit of work rolled back");
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.state == State::Active
    }
}

impl<C: Connection> Deref for UnitOfWork<C> {
    type Target = Session<C>;

    fn deref(&self) -> &Session<C> {
        &self.session
    }
}

impl<C: Connection> Drop for UnitOfWork<C> {
    fn drop(&mut self) {
        if self.state != State::Active {
            return;
        }
        self.session.profiler().raise(Alert::ImplicitRollback {
            session: self.session.id(),
        });
        if let Err(e) = self.session.connection().rollback() {
            tracing::error!(session = self.session.id(), error = %e, "implicit rollback failed");
        }
    }
}

impl<C: Connection> fmt::Debug for UnitOfWork<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("session", &self.session.id())
            .field("state", &self.state)
            .finish()
    }
}
