//! Admission planning for the preview store.
//!
//! Everything here is a pure function of the manifest entries, the size of
//! the incoming artifact, the artifact files present on disk (with their
//! lengths) and the current time. The preview store applies the resulting [`Plan`] (deleting files,
//! persisting the manifest) inside a manifest job.
//!
//! Eviction is strictly age based: the oldest created artifact goes first,
//! with manifest order breaking ties.

use crate::manifest::ManifestEntry;
use std::collections::HashMap;
use std::time::Duration;
use vitrine_core::config::PreviewConfig;

/// Budgets enforced on every admission.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Limits {
    pub max_items: usize,
    pub max_bytes: u64,
    pub ttl: Duration,
}

impl From<&PreviewConfig> for Limits {
    fn from(config: &PreviewConfig) -> Self {
        Self {
            max_items: config.max_items,
            max_bytes: config.max_bytes,
            ttl: config.ttl(),
        }
    }
}

/// Outcome of admission planning.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    /// The incoming artifact fits once the planned removals are applied.
    Admit,
    /// The artifact alone exceeds the byte budget. Nothing is removed.
    CapacityExceeded,
    /// Even after evicting everything evictable the artifact does not fit.
    /// The planned removals still apply.
    TemporarilyFull,
}

/// Entries split by what should happen to them.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Plan {
    /// Surviving entries, oldest first.
    pub keep: Vec<ManifestEntry>,
    /// Entries whose retention period elapsed. Their files must be deleted.
    pub expired: Vec<ManifestEntry>,
    /// Entries whose file is gone. Only the entry is dropped.
    pub missing: Vec<ManifestEntry>,
    /// Entries evicted to make room. Their files must be deleted.
    pub evicted: Vec<ManifestEntry>,
    /// Kept entries whose recorded size was corrected from the disk.
    pub resized: usize,
}

impl Plan {
    /// Whether the manifest differs from what was planned against.
    pub fn changed(&self) -> bool {
        !(self.expired.is_empty()
            && self.missing.is_empty()
            && self.evicted.is_empty()
            && self.resized == 0)
    }

    /// Entries whose files should be removed from disk.
    pub fn doomed(&self) -> impl Iterator<Item = &ManifestEntry> {
        self.expired.iter().chain(self.evicted.iter())
    }
}

/// Age-based admission control over a set of budgets.
#[derive(Clone, Copy, Debug)]
pub struct EvictionPolicy {
    limits: Limits,
}

impl EvictionPolicy {
    pub fn new(limits: Limits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Whether `entry` has outlived the retention period at `now_ms`.
    pub fn is_expired(&self, entry: &ManifestEntry, now_ms: i64) -> bool {
        let ttl_ms = i64::try_from(self.limits.ttl.as_millis()).unwrap_or(i64::MAX);
        now_ms.saturating_sub(entry.created_at) >= ttl_ms
    }

    /// Drop expired entries and entries whose file is not in `present`,
    /// which maps file names to their length on disk. Surviving entries take
    /// the on-disk length as their size.
    ///
    /// Expiry is checked first, so an expired entry with a missing file is
    /// reported as expired.
    pub fn reconcile(
        &self,
        entries: Vec<ManifestEntry>,
        now_ms: i64,
        present: &HashMap<String, u64>,
    ) -> Plan {
        let mut plan = Plan::default();
        for mut entry in entries {
            if self.is_expired(&entry, now_ms) {
                plan.expired.push(entry);
                continue;
            }
            match present.get(&entry.filename) {
                None => plan.missing.push(entry),
                Some(&len) => {
                    if entry.size_bytes != len {
                        entry.size_bytes = len;
                        plan.resized += 1;
                    }
                    plan.keep.push(entry);
                }
            }
        }
        plan
    }

    /// Plan the admission of an artifact of `incoming` bytes.
    pub fn plan(
        &self,
        entries: Vec<ManifestEntry>,
        incoming: u64,
        now_ms: i64,
        present: &HashMap<String, u64>,
    ) -> (Plan, Verdict) {
        if incoming > self.limits.max_bytes {
            let plan = Plan {
                keep: entries,
                ..Plan::default()
            };
            return (plan, Verdict::CapacityExceeded);
        }

        let mut plan = self.reconcile(entries, now_ms, present);
        // Stable: equal timestamps keep manifest order
        plan.keep.sort_by_key(|e| e.created_at);

        let mut count = plan.keep.len();
        let mut bytes: u64 = plan.keep.iter().map(|e| e.size_bytes).sum();
        let mut evict_upto = 0;
        while evict_upto < plan.keep.len() && !self.fits(count, bytes, incoming) {
            let victim = &plan.keep[evict_upto];
            count -= 1;
            bytes -= victim.size_bytes;
            evict_upto += 1;
        }
        plan.evicted = plan.keep.drain(..evict_upto).collect();

        let verdict = if self.fits(count, bytes, incoming) {
            Verdict::Admit
        } else {
            Verdict::TemporarilyFull
        };
        (plan, verdict)
    }

    fn fits(&self, count: usize, bytes: u64, incoming: u64) -> bool {
        count < self.limits.max_items && bytes.saturating_add(incoming) <= self.limits.max_bytes
    }
}
