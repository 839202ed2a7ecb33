//! User lifecycle and authorization.

use crate::models::{UserId, UserRecord, UserStatus};
use crate::storage::UserStore;
use crate::{Error, Result};
use std::sync::Arc;
use tracing::instrument;

/// Display name recorded for identities approved without ever contacting the bot.
const UNKNOWN_DISPLAY_NAME: &str = "N/A";

/// Outcome of an access request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessOutcome {
    /// The user is already approved.
    AlreadyApproved,
    /// The user is blocked.
    AlreadyBlocked,
    /// A pending record was created; the administrator must be notified.
    NewlyPending,
    /// A pending record already existed; the administrator was notified before.
    StillPending,
}

/// Owns user status transitions.
///
/// There is exactly one administrator, configured at startup. The
/// administrator is always authorized, whatever the stored record says.
pub struct AccessControl {
    store: Arc<dyn UserStore>,
    admin: UserId,
}

impl AccessControl {
    /// Creates the service.
    #[must_use]
    pub fn new(store: Arc<dyn UserStore>, admin: UserId) -> Self {
        Self { store, admin }
    }

    /// The configured administrator.
    #[must_use]
    pub const fn admin(&self) -> UserId {
        self.admin
    }

    /// Returns true if `id` is the administrator.
    #[must_use]
    pub fn is_admin(&self, id: UserId) -> bool {
        id == self.admin
    }

    /// Registers a first contact, or reports the existing status.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or written.
    #[instrument(skip(self), fields(user.id = %id))]
    pub fn request_access(&self, id: UserId, display_name: &str) -> Result<AccessOutcome> {
        if let Some(record) = self.store.get(id)? {
            return Ok(match record.status {
                UserStatus::Approved => AccessOutcome::AlreadyApproved,
                UserStatus::Blocked => AccessOutcome::AlreadyBlocked,
                UserStatus::Pending => AccessOutcome::StillPending,
            });
        }

        let created = self.store.insert(&UserRecord::pending(id, display_name))?;
        if created {
            tracing::info!(user.id = %id, "New access request");
            metrics::counter!("access_requests_total").increment(1);
            Ok(AccessOutcome::NewlyPending)
        } else {
            // Lost a race with a concurrent insert of the same id.
            Ok(AccessOutcome::StillPending)
        }
    }

    /// Approves a user. Allowed from any status, including approved.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if there is no record for `id`.
    #[instrument(skip(self), fields(user.id = %id))]
    pub fn approve(&self, id: UserId) -> Result<()> {
        if !self.store.set_status(id, UserStatus::Approved)? {
            return Err(Error::user_not_found(id));
        }
        tracing::info!(user.id = %id, "User approved");
        Ok(())
    }

    /// Flips approved ↔ blocked; pending becomes approved.
    ///
    /// Returns the new status.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if there is no record for `id`.
    #[instrument(skip(self), fields(user.id = %id))]
    pub fn toggle(&self, id: UserId) -> Result<UserStatus> {
        let record = self.store.get(id)?.ok_or_else(|| Error::user_not_found(id))?;
        let next = record.status.toggled();
        if !self.store.set_status(id, next)? {
            return Err(Error::user_not_found(id));
        }
        tracing::info!(user.id = %id, from = %record.status, to = %next, "User status toggled");
        Ok(next)
    }

    /// Approves every id, creating records for unknown ones.
    ///
    /// Returns the number of ids processed.
    ///
    /// # Errors
    ///
    /// Returns the first store error; earlier ids stay approved.
    #[instrument(skip(self, ids), fields(count = ids.len()))]
    pub fn force_approve(&self, ids: &[UserId]) -> Result<usize> {
        for id in ids {
            self.store
                .upsert_status(*id, UNKNOWN_DISPLAY_NAME, UserStatus::Approved)?;
        }
        tracing::info!(count = ids.len(), "Users force-approved");
        Ok(ids.len())
    }

    /// Returns true if the stored status is approved.
    ///
    /// Store failures are logged and answer `false`.
    #[must_use]
    pub fn is_approved(&self, id: UserId) -> bool {
        match self.store.get(id) {
            Ok(record) => record.is_some_and(|r| r.is_approved()),
            Err(e) => {
                tracing::error!(user.id = %id, error = %e, "Approval check failed");
                false
            },
        }
    }

    /// Returns true if `id` may use gated features.
    #[must_use]
    pub fn is_authorized(&self, id: UserId) -> bool {
        self.is_admin(id) || self.is_approved(id)
    }

    /// Fetches a user record.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn get(&self, id: UserId) -> Result<Option<UserRecord>> {
        self.store.get(id)
    }

    /// All approved identities: the audience of change notifications.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn approved_users(&self) -> Result<Vec<UserId>> {
        self.store.ids_with_status(UserStatus::Approved)
    }

    /// All user records, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn roster(&self) -> Result<Vec<UserRecord>> {
        self.store.list()
    }
}
