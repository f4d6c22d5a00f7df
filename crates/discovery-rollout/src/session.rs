//! In-memory state of the simulated users.

use discovery_client::SessionToken;

use crate::config::Completion;

/// Error returned for an index outside the population.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("no simulated user with index {index} (population {len})")]
pub struct StoreError {
    pub index: usize,
    pub len: usize,
}

/// What one successful poll observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    /// Version string reported by the service.
    pub version: String,
    /// Asset URL reported by the service.
    pub url: String,
    /// Token the service issued with this response, if any.
    pub token: Option<SessionToken>,
}

/// State of one simulated user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatedUser {
    /// Position in the population.
    pub index: usize,
    /// Successful polls so far. Never decreases.
    pub request_count: u64,
    /// Version from the latest successful poll; empty before the first.
    pub last_version: String,
    /// URL from the latest successful poll.
    pub last_url: String,
    /// Sticky session token, held once issued.
    pub session_token: Option<SessionToken>,
    /// Why the latest poll failed, cleared by the next success.
    pub last_failure: Option<String>,
}

impl SimulatedUser {
    fn new(index: usize) -> Self {
        Self {
            index,
            request_count: 0,
            last_version: String::new(),
            last_url: String::new(),
            session_token: None,
            last_failure: None,
        }
    }

    /// Whether at least one poll has succeeded.
    pub fn has_observed(&self) -> bool {
        self.request_count > 0
    }

    /// Whether the latest poll failed.
    pub fn is_failing(&self) -> bool {
        self.last_failure.is_some()
    }
}

/// Per-user state indexed `0..len`.
#[derive(Debug, Clone)]
pub struct SessionStore {
    users: Vec<SimulatedUser>,
}

impl SessionStore {
    /// Create `len` users with empty state.
    pub fn new(len: usize) -> Self {
        Self {
            users: (0..len).map(SimulatedUser::new).collect(),
        }
    }

    /// Number of users.
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// Whether the population is empty.
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Get a user by index.
    pub fn get(&self, index: usize) -> Option<&SimulatedUser> {
        self.users.get(index)
    }

    /// Iterate users in index order.
    pub fn iter(&self) -> impl Iterator<Item = &SimulatedUser> {
        self.users.iter()
    }

    /// Apply a successful poll.
    ///
    /// Version and URL are overwritten, the request count goes up by one,
    /// and the token is stored only if the user had none.
    pub fn update(&mut self, index: usize, observation: Observation) -> Result<(), StoreError> {
        let user = self.user_mut(index)?;

        user.last_version = observation.version;
        user.last_url = observation.url;
        user.request_count += 1;
        user.last_failure = None;

        if user.session_token.is_none() {
            user.session_token = observation.token;
        } else if let (Some(held), Some(issued)) = (&user.session_token, &observation.token) {
            if held != issued {
                tracing::debug!(user = index, held = %held, issued = %issued, "keeping sticky session token");
            }
        }

        Ok(())
    }

    /// Record a failed poll. Everything but the failure reason is kept.
    pub fn record_failure(&mut self, index: usize, reason: impl Into<String>) -> Result<(), StoreError> {
        self.user_mut(index)?.last_failure = Some(reason.into());
        Ok(())
    }

    /// Whether every user satisfies `completion`.
    ///
    /// A user counts only if it has been observed at least once and its
    /// latest poll succeeded. An empty store is vacuously complete; the
    /// monitor refuses to run with zero users.
    pub fn is_complete(&self, completion: &Completion) -> bool {
        self.users.iter().all(|user| {
            user.has_observed() && !user.is_failing() && completion.is_satisfied_by(&user.last_version)
        })
    }

    /// Users whose latest version still matches `version`.
    pub fn count_on(&self, version: &str) -> usize {
        self.users
            .iter()
            .filter(|user| user.has_observed() && user.last_version == version)
            .count()
    }

    /// Users whose latest poll failed.
    pub fn count_failing(&self) -> usize {
        self.users.iter().filter(|user| user.is_failing()).count()
    }

    /// Lowest-index failing user and its failure reason.
    pub fn first_failure(&self) -> Option<(usize, &str)> {
        self.users
            .iter()
            .find_map(|user| user.last_failure.as_deref().map(|reason| (user.index, reason)))
    }

    fn user_mut(&mut self, index: usize) -> Result<&mut SimulatedUser, StoreError> {
        let len = self.users.len();
        self.users.get_mut(index).ok_or(StoreError { index, len })
    }
}
