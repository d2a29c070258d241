//! Two-phase dead-reference collection. Ported from `database.py::cleaner`:
//! first drop records for files no longer on disk, maintaining a reference
//! count per digest as they go and cleaning the vault when a digest's last
//! reference disappears; then sweep any vault entry left with zero
//! references as a belt-and-braces pass (covers artifacts orphaned by a
//! record whose digest changed without ever being explicitly dropped).

use crate::context::Context;
use crate::index::Index;
use crate::vault::Vault;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct CleanReport {
    pub records_dropped: usize,
    pub vault_entries_cleaned: usize,
    pub orphans_cleaned: usize,
}

pub fn clean(ctx: &Context, index: &mut Index, vault_obj: &Vault) -> CleanReport {
    let mut report = CleanReport::default();

    let mut refcount: HashMap<String, usize> = HashMap::new();
    for record in index.records.values() {
        if record.has_digest() {
            *refcount.entry(record.digest.clone()).or_insert(0) += 1;
        }
    }

    let missing: Vec<String> = index
        .records
        .iter()
        .filter(|(_, rec)| !rec.full_path(&ctx.root).exists())
        .map(|(path, _)| path.clone())
        .collect();

    for path in missing {
        if let Some(rec) = index.records.remove(&path) {
            report.records_dropped += 1;
            if rec.has_digest() {
                if let Some(count) = refcount.get_mut(&rec.digest) {
                    *count -= 1;
                    if *count == 0 {
                        let removed = vault_obj.clean(&mut index.vault, &rec.digest);
                        if removed > 0 {
                            report.vault_entries_cleaned += 1;
                        }
                    }
                }
            }
        }
    }

    let live_digests: std::collections::HashSet<String> =
        index.records.values().filter(|r| r.has_digest()).map(|r| r.digest.clone()).collect();
    let orphans: Vec<String> =
        index.vault.keys().filter(|d| !live_digests.contains(*d)).cloned().collect();
    for digest in orphans {
        let removed = vault_obj.clean(&mut index.vault, &digest);
        if removed > 0 {
            report.orphans_cleaned += 1;
        }
    }

    if report.records_dropped > 0 || report.vault_entries_cleaned > 0 || report.orphans_cleaned > 0 {
        index.mark_dirty();
    }
    report
}
