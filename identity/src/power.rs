//! Stake to voting power mapping.
//!
//! `power = floor(stake / power_unit)`. The unit is a network-wide
//! protocol parameter; the mapping is monotonic and never negative.

use crate::amount::Amount;
use crate::error::{IdentityError, IdentityResult};

pub fn power_from_stake(stake: &Amount, power_unit: &Amount) -> IdentityResult<i64> {
    let units = stake
        .checked_div(power_unit)
        .ok_or_else(|| IdentityError::InvalidConfig("power unit must be positive".to_string()))?;
    units.to_i64().ok_or_else(|| IdentityError::PowerOverflow(stake.to_string()))
}
