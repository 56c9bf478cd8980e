//! Data migrations over stored tasks
//!
//! Schema migrations live in taskstore and run on open. The routines here
//! rewrite task data when the way it is derived changes.

use tracing::{debug, info};

use crate::error::WorkerResult;
use crate::repository::{Repository, TaskQuery};

/// Recompute the identity hash of every stored task
///
/// Returns the number of tasks whose hash changed. Running it twice is a
/// no-op the second time.
pub fn rehash_tasks(repo: &dyn Repository) -> WorkerResult<usize> {
    debug!("rehash_tasks: called");
    let mut changed = 0;
    for mut task in repo.list(&TaskQuery::new())? {
        let hash = task.compute_hash()?;
        if hash == task.identity_hash {
            continue;
        }
        debug!(id = %task.id, old = %task.identity_hash, new = %hash, "rehash_tasks: updating");
        task.identity_hash = hash;
        repo.update(&task)?;
        changed += 1;
    }
    info!(changed, "Rehashed tasks");
    Ok(changed)
}
