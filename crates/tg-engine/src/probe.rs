//! Buffer access instrumentation.
//!
//! Stages report when they start and stop touching a scratch instance. The
//! [`AccessLog`] probe records those intervals in one global order and can
//! check afterwards that no instance was written by one stage while another
//! stage held it.

use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::sync::{Mutex, PoisonError};

use thiserror::Error;

use crate::scratch::Slot;
use crate::stage::Stage;

/// Double-buffered region of the scratch store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Region {
    Input,
    Output,
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Region::Input => write!(f, "input"),
            Region::Output => write!(f, "output"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Access {
    Read,
    Write,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Begin,
    End,
}

/// One edge of an access interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AccessEvent {
    pub stage: Stage,
    pub region: Region,
    pub slot: Slot,
    pub access: Access,
    pub phase: Phase,
}

/// Observer of scratch buffer accesses.
pub trait AccessProbe: Send + Sync + Debug {
    fn record(&self, event: AccessEvent);

    fn begin(&self, stage: Stage, region: Region, slot: Slot, access: Access) {
        self.record(AccessEvent {
            stage,
            region,
            slot,
            access,
            phase: Phase::Begin,
        });
    }

    fn end(&self, stage: Stage, region: Region, slot: Slot, access: Access) {
        self.record(AccessEvent {
            stage,
            region,
            slot,
            access,
            phase: Phase::End,
        });
    }
}

/// Probe that discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullProbe;

impl AccessProbe for NullProbe {
    fn record(&self, _event: AccessEvent) {}
}

/// Two stages held the same instance at once and at least one was writing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error(
    "{region} {slot} instance: {intruder} {intruder_access:?} began while {holder} {holder_access:?} was active (event #{index})"
)]
pub struct AccessConflict {
    pub region: Region,
    pub slot: Slot,
    pub holder: Stage,
    pub holder_access: Access,
    pub intruder: Stage,
    pub intruder_access: Access,
    pub index: usize,
}

/// Probe that keeps every event in arrival order.
#[derive(Debug, Default)]
pub struct AccessLog {
    events: Mutex<Vec<AccessEvent>>,
}

impl AccessLog {
    pub fn new() -> Self {
        AccessLog {
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<AccessEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of completed intervals recorded by `stage` with `access`.
    pub fn count(&self, stage: Stage, access: Access) -> usize {
        self.events()
            .iter()
            .filter(|e| e.stage == stage && e.access == access && e.phase == Phase::End)
            .count()
    }

    /// Check that every instance had a single writer and no concurrent
    /// reader while it was being written.
    pub fn verify(&self) -> Result<(), AccessConflict> {
        let mut active: HashMap<(Region, Slot), Vec<(Stage, Access)>> = HashMap::new();

        for (index, event) in self.events().into_iter().enumerate() {
            let holders = active.entry((event.region, event.slot)).or_default();
            match event.phase {
                Phase::Begin => {
                    let clash = holders.iter().find(|(stage, access)| {
                        *stage != event.stage
                            && (*access == Access::Write || event.access == Access::Write)
                    });
                    if let Some(&(holder, holder_access)) = clash {
                        return Err(AccessConflict {
                            region: event.region,
                            slot: event.slot,
                            holder,
                            holder_access,
                            intruder: event.stage,
                            intruder_access: event.access,
                            index,
                        });
                    }
                    holders.push((event.stage, event.access));
                }
                Phase::End => {
                    if let Some(pos) = holders
                        .iter()
                        .position(|h| *h == (event.stage, event.access))
                    {
                        holders.swap_remove(pos);
                    }
                }
            }
        }
        Ok(())
    }
}

impl AccessProbe for AccessLog {
    fn record(&self, event: AccessEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_handoff_is_clean() {
        let log = AccessLog::new();
        log.begin(Stage::Load, Region::Input, Slot::Front, Access::Write);
        log.end(Stage::Load, Region::Input, Slot::Front, Access::Write);
        log.begin(Stage::Compute, Region::Input, Slot::Front, Access::Read);
        // the other instance may be filled meanwhile
        log.begin(Stage::Load, Region::Input, Slot::Back, Access::Write);
        log.end(Stage::Compute, Region::Input, Slot::Front, Access::Read);
        log.end(Stage::Load, Region::Input, Slot::Back, Access::Write);

        assert!(log.verify().is_ok());
        assert_eq!(log.count(Stage::Load, Access::Write), 2);
        assert_eq!(log.count(Stage::Compute, Access::Read), 1);
    }

    #[test]
    fn test_overlapping_write_is_reported() {
        let log = AccessLog::new();
        log.begin(Stage::Compute, Region::Output, Slot::Back, Access::Write);
        log.begin(Stage::Store, Region::Output, Slot::Back, Access::Read);

        let conflict = log.verify().unwrap_err();
        assert_eq!(conflict.holder, Stage::Compute);
        assert_eq!(conflict.intruder, Stage::Store);
        assert_eq!(conflict.slot, Slot::Back);
        assert_eq!(conflict.index, 1);
    }

    #[test]
    fn test_regions_are_independent() {
        let log = AccessLog::new();
        log.begin(Stage::Compute, Region::Output, Slot::Front, Access::Write);
        log.begin(Stage::Load, Region::Input, Slot::Front, Access::Write);
        assert!(log.verify().is_ok());
    }

    #[test]
    fn test_null_probe() {
        let probe = NullProbe;
        probe.begin(Stage::Store, Region::Output, Slot::Front, Access::Read);
    }
}
