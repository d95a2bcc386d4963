//! Byzantine evidence handling.
//!
//! Penalties zero voting power and jail the record so later stake changes
//! cannot restore it; staked funds are left untouched. Each punished address is queued at the current height so the
//! engine drops it from the active set at the next end-block.

use tracing::{debug, warn};

use crate::consensus::Evidence;
use crate::error::IdentityResult;
use crate::keys::Address;
use crate::queue::{QueueEntry, ValidatorQueue};
use crate::registry::ValidatorRegistry;
use crate::state::StateTree;

/// Applies evidence to the registry and returns the addresses whose power
/// was zeroed, in address order and without duplicates.
pub fn apply_evidence<S: StateTree>(
    registry: &mut ValidatorRegistry<S>,
    queue: &mut ValidatorQueue,
    evidence: &[Evidence],
    height: u64,
) -> IdentityResult<Vec<Address>> {
    let mut offenders: Vec<&Evidence> = evidence.iter().collect();
    offenders.sort_by(|a, b| a.validator.address.cmp(&b.validator.address));
    offenders.dedup_by(|a, b| a.validator.address == b.validator.address);

    let mut punished = Vec::with_capacity(offenders.len());
    for report in offenders {
        let address = report.validator.address;
        let Some(mut validator) = registry.get(&address)? else {
            warn!(%address, kind = %report.kind, height = report.height, "evidence for unknown validator ignored");
            continue;
        };

        debug!(%address, kind = %report.kind, previous_power = validator.power, "zeroing byzantine validator");
        validator.power = 0;
        validator.jailed = true;
        registry.set(&validator)?;
        queue.push(QueueEntry::new(address, height, 0));
        punished.push(address);
    }

    Ok(punished)
}
