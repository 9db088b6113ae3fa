use std::collections::HashMap;

use crate::core::types::SourceRole;

/// Cross-source consistency rules, relaxed: every finding is a warning the
/// caller may show or ignore, never a reason to fail the search. An
/// inconsistent set of sources is a normal state mid-migration.
pub fn consistency_warnings(per_source_found: &HashMap<SourceRole, bool>) -> Vec<String> {
    let found = |role: SourceRole| per_source_found.get(&role).copied().unwrap_or(false);
    let new_if = found(SourceRole::NewInterface);
    let old_if = found(SourceRole::OldInterface);
    let new_df = found(SourceRole::NewDataflow);
    let old_df = found(SourceRole::OldDataflow);

    let mut warnings = Vec::new();

    match (new_if, old_if) {
        (true, true) => {
            warnings.push("variable present in both interface files, ready for comparison".into());
        }
        (true, false) => {
            warnings.push("variable only in the new interface file; likely newly added".into());
        }
        (false, true) => {
            warnings.push("variable only in the old interface file; likely removed".into());
        }
        (false, false) => {
            warnings.push("variable not found in either interface file".into());
        }
    }

    match (new_df, old_df) {
        (true, true) => {}
        (true, false) => {
            warnings.push("variable mapped only in the new dataflow file".into());
        }
        (false, true) => {
            warnings.push("variable mapped only in the old dataflow file".into());
        }
        (false, false) => {
            warnings.push("variable not mapped in either dataflow file".into());
        }
    }

    if !new_if && !old_if && !new_df && !old_df {
        warnings.push("variable not found in any source".into());
    }
    warnings
}
