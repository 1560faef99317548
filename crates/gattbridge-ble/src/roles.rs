//! Role binding and discovery bookkeeping
//!
//! Pure state tracking for the characteristic-discovery phase: which of the
//! three target roles are bound, how many services still have pending
//! characteristic enumeration, and whether target confirmation has already
//! fired for this connection. All of it lives behind the session's inner
//! lock; nothing here touches the adapter.

use gattbridge_core::CharacteristicRole;

// ----------------------------------------------------------------------------
// Role Map
// ----------------------------------------------------------------------------

/// Mapping from role to an opaque characteristic handle, at most one handle
/// per role. Cleared in full whenever the connection is torn down.
#[derive(Debug, Clone)]
pub struct RoleMap<H> {
    data: Option<H>,
    command: Option<H>,
    notify: Option<H>,
}

// Manual impl to avoid an H: Default bound
impl<H> Default for RoleMap<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> RoleMap<H> {
    pub fn new() -> Self {
        Self {
            data: None,
            command: None,
            notify: None,
        }
    }

    /// Bind a handle to a role. Returns true only when the role was newly
    /// bound; re-binding an already-bound role is a no-op.
    pub fn bind(&mut self, role: CharacteristicRole, handle: H) -> bool {
        let slot = self.slot_mut(role);
        if slot.is_some() {
            return false;
        }
        *slot = Some(handle);
        true
    }

    pub fn get(&self, role: CharacteristicRole) -> Option<&H> {
        match role {
            CharacteristicRole::Data => self.data.as_ref(),
            CharacteristicRole::Command => self.command.as_ref(),
            CharacteristicRole::Notify => self.notify.as_ref(),
        }
    }

    /// All three target roles are bound
    pub fn is_complete(&self) -> bool {
        self.data.is_some() && self.command.is_some() && self.notify.is_some()
    }

    pub fn clear(&mut self) {
        self.data = None;
        self.command = None;
        self.notify = None;
    }

    fn slot_mut(&mut self, role: CharacteristicRole) -> &mut Option<H> {
        match role {
            CharacteristicRole::Data => &mut self.data,
            CharacteristicRole::Command => &mut self.command,
            CharacteristicRole::Notify => &mut self.notify,
        }
    }
}

// ----------------------------------------------------------------------------
// Discovery Tracker
// ----------------------------------------------------------------------------

/// Countdown over per-service characteristic enumeration plus the
/// once-per-connection confirmation latch
#[derive(Debug, Clone, Default)]
pub struct DiscoveryTracker {
    remaining_services: usize,
    all_discovered_fired: bool,
    confirmed: bool,
}

impl DiscoveryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a fresh discovery round over `service_count` services.
    /// Zero services short-circuits straight to "all discovered".
    pub fn begin(&mut self, service_count: usize) {
        self.remaining_services = service_count;
        self.all_discovered_fired = false;
        self.confirmed = false;
    }

    /// Record one completed per-service enumeration. Returns true exactly
    /// once, when the countdown reaches zero.
    pub fn service_done(&mut self) -> bool {
        if self.remaining_services > 0 {
            self.remaining_services -= 1;
        }
        self.check_all_discovered()
    }

    /// Zero-service discovery uses this to fire the completion signal
    /// without any countdown steps.
    pub fn check_all_discovered(&mut self) -> bool {
        if self.remaining_services == 0 && !self.all_discovered_fired {
            self.all_discovered_fired = true;
            return true;
        }
        false
    }

    /// Attempt target confirmation. Fires at most once per connection
    /// lifetime, exactly when all three roles are bound.
    pub fn try_confirm(&mut self, roles_complete: bool) -> bool {
        if self.confirmed || !roles_complete {
            return false;
        }
        self.confirmed = true;
        true
    }

    pub fn is_confirmed(&self) -> bool {
        self.confirmed
    }
}
