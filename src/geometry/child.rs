//! Child vectors: which of the `2^rank` children a block is within its parent.

use crate::error::{RefreshError, Result};

/// Which of the `2^rank` children a node occupies within its parent, one bit
/// per axis (`0` = lower half, `1` = upper half).
pub type Child = [i32; 3];

/// Validates a child vector per spec: components in `{0,1}`.
pub fn validate_child(ic3: Child) -> Result<()> {
    if ic3.iter().any(|&c| !(0..=1).contains(&c)) {
        return Err(RefreshError::InvalidChild(ic3));
    }
    Ok(())
}
