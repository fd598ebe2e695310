//! Per-server outcomes of one dispatch round.

use std::collections::BTreeMap;

use camfleet_core::{Error, Failure, Result, ServerAddress};

/// Result of one exchange with one server.
pub type Outcome<T> = std::result::Result<T, Failure>;

/// Address-keyed outcomes of a dispatch round.
///
/// Holds exactly one entry per targeted address; a server that never replied
/// is present with a failure, never missing.
#[derive(Debug, Clone, PartialEq)]
pub struct FleetResult<T> {
    outcomes: BTreeMap<ServerAddress, Outcome<T>>,
}

impl<T> Default for FleetResult<T> {
    fn default() -> Self {
        Self {
            outcomes: BTreeMap::new(),
        }
    }
}

impl<T> FleetResult<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, address: ServerAddress, outcome: Outcome<T>) {
        self.outcomes.insert(address, outcome);
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// `None` means the address was not part of the round.
    pub fn get(&self, address: &ServerAddress) -> Option<&Outcome<T>> {
        self.outcomes.get(address)
    }

    /// Successful payload for one address, or the reason there is none.
    pub fn require(&self, address: &ServerAddress) -> Result<&T> {
        match self.outcomes.get(address) {
            Some(Ok(value)) => Ok(value),
            Some(Err(failure)) => Err(Error::from_failure(*address, failure.clone())),
            None => Err(Error::Validation(format!(
                "{address} was not targeted by this command"
            ))),
        }
    }

    pub fn addresses(&self) -> impl Iterator<Item = &ServerAddress> {
        self.outcomes.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ServerAddress, &Outcome<T>)> {
        self.outcomes.iter()
    }

    pub fn successes(&self) -> impl Iterator<Item = (&ServerAddress, &T)> {
        self.outcomes
            .iter()
            .filter_map(|(addr, outcome)| outcome.as_ref().ok().map(|v| (addr, v)))
    }

    pub fn failures(&self) -> impl Iterator<Item = (&ServerAddress, &Failure)> {
        self.outcomes
            .iter()
            .filter_map(|(addr, outcome)| outcome.as_ref().err().map(|f| (addr, f)))
    }

    pub fn all_succeeded(&self) -> bool {
        self.outcomes.values().all(|o| o.is_ok())
    }

    /// Convert each successful payload, possibly into a failure.
    pub fn and_then<U>(self, mut f: impl FnMut(T) -> Outcome<U>) -> FleetResult<U> {
        FleetResult {
            outcomes: self
                .outcomes
                .into_iter()
                .map(|(addr, outcome)| (addr, outcome.and_then(&mut f)))
                .collect(),
        }
    }

    /// Escalate any failure into `Error::PartialFleetFailure`.
    pub fn into_uniform(self) -> Result<Self> {
        if self.all_succeeded() {
            return Ok(self);
        }
        let mut failed = Vec::new();
        let mut succeeded = Vec::new();
        for (addr, outcome) in &self.outcomes {
            match outcome {
                Ok(_) => succeeded.push(*addr),
                Err(failure) => failed.push((*addr, failure.clone())),
            }
        }
        Err(Error::PartialFleetFailure { failed, succeeded })
    }

    pub fn into_map(self) -> BTreeMap<ServerAddress, Outcome<T>> {
        self.outcomes
    }
}

impl<T> FromIterator<(ServerAddress, Outcome<T>)> for FleetResult<T> {
    fn from_iter<I: IntoIterator<Item = (ServerAddress, Outcome<T>)>>(iter: I) -> Self {
        Self {
            outcomes: iter.into_iter().collect(),
        }
    }
}

impl<T> IntoIterator for FleetResult<T> {
    type Item = (ServerAddress, Outcome<T>);
    type IntoIter = std::collections::btree_map::IntoIter<ServerAddress, Outcome<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.outcomes.into_iter()
    }
}
