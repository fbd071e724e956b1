use crate::engine::classify::Classification;

/// Number the problem episodes of one ordered group.
///
/// A correction closes the episode counted by the running number of corrections up to and
/// including itself. A rework entry belongs to the episode still open, which the next
/// correction will close, hence the `+ 1`.
pub fn assign_episodes(flags: &[Classification]) -> Vec<u32> {
    let mut running_corrections = 0u32;
    flags
        .iter()
        .map(|flag| {
            if flag.is_correction {
                running_corrections += 1;
            }
            if flag.is_rework {
                running_corrections + 1
            } else {
                running_corrections
            }
        })
        .collect()
}
