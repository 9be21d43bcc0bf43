//! Pre-flight check that an exclusion change cannot orphan data.

use crate::error::{Error, Result};
use crate::partitioning::ResolvedReplicaMap;
use crate::topology::ExclusionSet;

/// Fail with the first region whose primary owners are all excluded.
pub fn check_convergence_feasible(map: &ResolvedReplicaMap, exclusions: &ExclusionSet) -> Result<()> {
    for entry in map.entries() {
        if exclusions.filter(&entry.primary_owners).is_empty() {
            return Err(Error::InfeasibleConvergence {
                region: entry.region,
                owners: entry.primary_owners.clone(),
            });
        }
    }
    Ok(())
}

/// Like [`check_convergence_feasible`], logging the failing region.
pub fn convergence_feasible(map: &ResolvedReplicaMap, exclusions: &ExclusionSet) -> bool {
    match check_convergence_feasible(map, exclusions) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Cannot find viable replica");
            false
        }
    }
}
