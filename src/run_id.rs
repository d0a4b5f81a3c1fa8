//! Run-id lineage helpers
//!
//! Run ids are dot separated: a job `123` spawning a child gets `123.456`.

/// Strip the last dot-separated segment; a run id without a parent yields `""`
pub fn get_parent_run_id(run_id: &str) -> &str {
    match run_id.rfind('.') {
        Some(position) => &run_id[..position],
        None => "",
    }
}

/// First segment of a run id, identifying the whole lineage
pub fn root_run_id(run_id: &str) -> &str {
    run_id.split('.').next().unwrap_or_default()
}

/// True when `candidate` belongs to the lineage rooted at `root`
pub fn is_in_lineage(candidate: &str, root: &str) -> bool {
    !root.is_empty()
        && (candidate == root
            || candidate
                .strip_prefix(root)
                .is_some_and(|rest| rest.starts_with('.')))
}
