//! Mark-sweep collector over the value [`Heap`] (§4.5, §9). Collection
//! only ever runs at a statement boundary of the outermost frame (see
//! [`crate::interp::Engine::run_frame`]'s safe-point check), so the root
//! set is the global object, the fixed set of permanent singletons, the
//! engine's cache of already-interned constants (every value a `LoadConst`
//! may still reach without re-allocating, §3 "Constants pool"), and that
//! one frame's operand stack plus its closure-env chain — no other frame
//! can hold a live temporary at that point.

use crate::engine::Engine;
use crate::interp::Frame;
use crate::value::{Callable, Value, ValueId};

impl Engine {
    /// Run one mark-sweep pass if the heap has grown past
    /// `gc_allocation_threshold` since the last collection; otherwise a
    /// no-op. Returns the number of slots reclaimed, for logging (§12).
    ///
    /// For use outside of script execution (e.g. a host driving `eval`
    /// repeatedly and collecting in between); while a script is running,
    /// [`Engine::maybe_collect_for_frame`] is the safe entry point since it
    /// also roots the active frame.
    pub fn maybe_collect(&mut self) -> usize {
        if self.heap.allocations_since_gc < self.config.gc_allocation_threshold {
            return 0;
        }
        self.collect()
    }

    pub fn collect(&mut self) -> usize {
        self.collect_with_roots(&[])
    }

    /// Collect with `frame`'s operand stack and closure-env chain added to
    /// the root set, for the safe point inside `run_frame` (§4.5).
    pub(crate) fn maybe_collect_for_frame(&mut self, frame: &Frame) -> usize {
        if self.heap.allocations_since_gc < self.config.gc_allocation_threshold {
            return 0;
        }
        let mut extra = frame.stack.clone();
        extra.extend(self.env_reachable(&frame.env));
        self.collect_with_roots(&extra)
    }

    fn collect_with_roots(&mut self, extra_roots: &[ValueId]) -> usize {
        self.heap.generation += 1;
        let generation = self.heap.generation;

        let mut roots: Vec<ValueId> = self.permanents.all();
        roots.push(self.global_object);
        roots.push(self.object_proto);
        roots.push(self.function_proto);
        roots.push(self.array_proto);
        // Every constant the generator may reference by index again later
        // (`LoadConst` re-reads the cache rather than re-interning), so a
        // cached constant must stay live even when nothing on the current
        // frame's stack or env chain points to it right now (§4.5, §3
        // "Constants pool").
        roots.extend(self.const_cache.iter().flatten().copied());
        roots.extend_from_slice(extra_roots);

        for root in roots {
            self.mark_value(root, generation);
        }

        let reclaimed = self.heap.sweep(generation);
        if reclaimed > 0 {
            log::debug!("gc: reclaimed {reclaimed} value(s), heap now {}", self.heap.len());
        }
        reclaimed
    }

    fn mark_value(&mut self, id: ValueId, generation: u64) {
        if !self.heap.mark(id, generation) {
            return;
        }
        let children: Vec<ValueId> = match self.heap.get(id) {
            Some(Value::Object(o)) => o
                .slots
                .values()
                .chain(o.special.values())
                .copied()
                .chain(o.proto)
                .collect(),
            Some(Value::Function(f)) => {
                let mut ids: Vec<ValueId> = f
                    .object
                    .slots
                    .values()
                    .chain(f.object.special.values())
                    .copied()
                    .chain(f.object.proto)
                    .collect();
                if let Callable::Compiled { closure, .. } = &f.callable {
                    ids.extend(self.env_reachable(closure));
                }
                ids
            }
            _ => Vec::new(),
        };
        for child in children {
            self.mark_value(child, generation);
        }
    }

    /// Every `ValueId` reachable from a closure's captured environment
    /// chain, walked eagerly since `Env` itself isn't heap-allocated.
    fn env_reachable(&self, env: &crate::interp::EnvHandle) -> Vec<ValueId> {
        let mut out = Vec::new();
        let mut cur = Some(env.clone());
        while let Some(e) = cur {
            out.extend(e.borrow().bindings.values().copied());
            cur = e.borrow().parent.clone();
        }
        out
    }
}
