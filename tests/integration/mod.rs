
mod ahead_fails_behind_recovers;
mod dependency_cycle;
mod new_patchset_supersedes;
mod semaphore_contention;
mod solo_change_success;
