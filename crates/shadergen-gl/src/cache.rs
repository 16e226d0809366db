//! The shared key→program cache.
//!
//! Bounded LRU over compiled programs. The cache is the one shared resource
//! of the subsystem: concurrent builds may race on a key, and the cache
//! guarantees at most one committed winner: a build that loses the race has
//! its program deleted through the backend rather than installed.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, trace};

use shadergen_core::backend::{CompiledProgram, ProgramBackend};
use shadergen_core::key::ProgramKey;

/// Default entry budget, matching a small per-context working set.
pub const DEFAULT_PROGRAM_BUDGET: usize = 64;

struct Entry {
    program: Arc<CompiledProgram>,
    stamp: u64,
}

struct CacheInner {
    entries: HashMap<ProgramKey, Entry>,
    current_stamp: u64,
}

/// Bounded key→program cache, shareable across threads.
pub struct ProgramCache {
    inner: Mutex<CacheInner>,
    budget: usize,
}

impl ProgramCache {
    pub fn new(budget: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                current_stamp: 0,
            }),
            budget: budget.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up a program by key, refreshing its LRU stamp on a hit.
    pub fn find(&self, key: &ProgramKey) -> Option<Arc<CompiledProgram>> {
        let mut inner = self.lock();
        inner.current_stamp += 1;
        let stamp = inner.current_stamp;
        match inner.entries.get_mut(key) {
            Some(entry) => {
                entry.stamp = stamp;
                trace!(key = %key.to_hex(), "program cache hit");
                Some(entry.program.clone())
            }
            None => {
                trace!(key = %key.to_hex(), "program cache miss");
                None
            }
        }
    }

    /// Install a freshly compiled program. If another build already committed
    /// the same key, the incoming program is deleted and the committed winner
    /// is returned instead. Installing past the budget evicts the least
    /// recently used entry.
    pub fn install(
        &self,
        key: ProgramKey,
        program: CompiledProgram,
        backend: &mut dyn ProgramBackend,
    ) -> Arc<CompiledProgram> {
        let mut inner = self.lock();
        inner.current_stamp += 1;
        let stamp = inner.current_stamp;

        if let Some(entry) = inner.entries.get_mut(&key) {
            // Lost the race: the committed winner stays, ours is destroyed.
            debug!(key = %key.to_hex(), "discarding program that lost the install race");
            backend.delete_program(program.program);
            entry.stamp = stamp;
            return entry.program.clone();
        }

        if inner.entries.len() >= self.budget {
            if let Some(victim) = inner
                .entries
                .iter()
                .min_by_key(|(_, e)| e.stamp)
                .map(|(k, _)| k.clone())
            {
                if let Some(evicted) = inner.entries.remove(&victim) {
                    debug!(key = %victim.to_hex(), "evicting least recently used program");
                    backend.delete_program(evicted.program.program);
                }
            }
        }

        let program = Arc::new(program);
        inner.entries.insert(
            key,
            Entry {
                program: program.clone(),
                stamp,
            },
        );
        program
    }

    /// Delete every cached program through the backend.
    pub fn purge(&self, backend: &mut dyn ProgramBackend) {
        let mut inner = self.lock();
        for (_, entry) in inner.entries.drain() {
            backend.delete_program(entry.program.program);
        }
    }

    /// Drop every entry without touching the backend, for when the context
    /// itself is gone and its objects with it.
    pub fn abandon(&self) {
        self.lock().entries.clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheInner> {
        // A poisoned cache mutex means a panic mid-insert; the map itself is
        // still structurally sound.
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for ProgramCache {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRAM_BUDGET)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use shadergen_core::backend::finalize;
    use shadergen_core::builder::ProgramBuilder;
    use shadergen_core::caps::GlslCaps;
    use shadergen_core::effects::{CoverageScaleProcessor, QuadProcessor, SrcOverTransfer};
    use shadergen_core::pipeline::{DrawTarget, PipelineDesc};
    use shadergen_core::testing::RecordingBackend;

    fn pipeline(invert: bool, coverage_stages: usize) -> PipelineDesc {
        PipelineDesc {
            primitive: Box::new(QuadProcessor::new()),
            color: Vec::new(),
            coverage: (0..coverage_stages)
                .map(|_| {
                    Box::new(CoverageScaleProcessor { invert })
                        as Box<dyn shadergen_core::processor::FragmentProcessor>
                })
                .collect(),
            transfer: Box::new(SrcOverTransfer::default()),
        }
    }

    fn compiled(
        desc: &PipelineDesc,
        backend: &mut RecordingBackend,
    ) -> (ProgramKey, CompiledProgram) {
        let caps = GlslCaps::default();
        let assembled = ProgramBuilder::assemble(desc, &caps, &DrawTarget::top_left()).unwrap();
        let program = finalize(&assembled, &caps, backend).unwrap();
        (assembled.key, program)
    }

    #[test]
    fn install_race_keeps_one_winner() {
        let cache = ProgramCache::new(8);
        let mut backend = RecordingBackend::new();
        let desc = pipeline(false, 1);

        let (key_a, program_a) = compiled(&desc, &mut backend);
        let (key_b, program_b) = compiled(&desc, &mut backend);
        assert_eq!(key_a, key_b);
        let loser_id = program_b.program;

        let winner = cache.install(key_a.clone(), program_a, &mut backend);
        let resolved = cache.install(key_b, program_b, &mut backend);
        assert_eq!(winner.program, resolved.program);
        assert_eq!(cache.len(), 1);
        // The loser's backend object was destroyed, never installed.
        assert!(backend.deleted_programs.contains(&loser_id));
    }

    #[test]
    fn eviction_removes_least_recently_used() {
        let cache = ProgramCache::new(2);
        let mut backend = RecordingBackend::new();

        let (key1, prog1) = compiled(&pipeline(false, 1), &mut backend);
        let (key2, prog2) = compiled(&pipeline(true, 1), &mut backend);
        let (key3, prog3) = compiled(&pipeline(false, 2), &mut backend);
        let first_id = prog1.program;
        let second_id = prog2.program;

        cache.install(key1.clone(), prog1, &mut backend);
        cache.install(key2.clone(), prog2, &mut backend);
        // Touch key1 so key2 becomes the eviction candidate.
        assert!(cache.find(&key1).is_some());
        cache.install(key3.clone(), prog3, &mut backend);

        assert_eq!(cache.len(), 2);
        assert!(cache.find(&key1).is_some());
        assert!(cache.find(&key2).is_none());
        assert!(cache.find(&key3).is_some());
        assert!(backend.deleted_programs.contains(&second_id));
        assert!(!backend.deleted_programs.contains(&first_id));
    }

    #[test]
    fn purge_deletes_everything_abandon_does_not() {
        let cache = ProgramCache::new(8);
        let mut backend = RecordingBackend::new();
        let (key1, prog1) = compiled(&pipeline(false, 1), &mut backend);
        let id1 = prog1.program;
        cache.install(key1, prog1, &mut backend);

        cache.purge(&mut backend);
        assert!(cache.is_empty());
        assert!(backend.deleted_programs.contains(&id1));

        let (key2, prog2) = compiled(&pipeline(true, 1), &mut backend);
        let id2 = prog2.program;
        cache.install(key2, prog2, &mut backend);
        cache.abandon();
        assert!(cache.is_empty());
        assert!(!backend.deleted_programs.contains(&id2));
    }
}
