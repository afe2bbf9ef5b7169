//! The mode stack: an explicit per-execution-context object owning the
//! untagged interceptor stack, the keyed slots, and the fast-path dispatch
//! cache. All scoped operations hand out RAII guards whose drop restores the
//! stacks on every exit path, including unwinding.

use std::collections::{HashMap, HashSet};
use parking_lot::Mutex;

use crate::error::{CrucibleError, CrucibleResult};
use crate::schema::OpId;
use super::mode::{same_mode, ModeHandle, ModeKey};

/// Owns the interceptor stacks for one logical execution context.
///
/// Contexts are created empty and are not shared across execution contexts;
/// the locks exist for interior mutability through `&self`, not for
/// cross-thread contention. Push and pop are the only stack mutations, so
/// entries are never reordered or dropped relative to push order.
#[derive(Debug, Default)]
pub struct DispatchContext {
    user_modes: Mutex<Vec<ModeHandle>>,
    keyed_modes: Mutex<HashMap<ModeKey, Vec<ModeHandle>>>,
    fast_path_cache: Mutex<HashMap<ModeKey, HashSet<OpId>>>,
}

impl DispatchContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `mode` to the selected stack.
    ///
    /// A keyed push invalidates the fast-path dispatch decisions cached for
    /// that key: the presence of an active mode changes which code path
    /// subsequent calls must take.
    pub fn push_mode(&self, mode: ModeHandle, key: Option<ModeKey>) {
        match key {
            None => {
                tracing::debug!(mode = mode.name(), "push mode (untagged)");
                self.user_modes.lock().push(mode);
            }
            Some(k) => {
                self.invalidate_fast_path(k);
                tracing::debug!(mode = mode.name(), key = %k, "push mode");
                self.keyed_modes.lock().entry(k).or_default().push(mode);
            }
        }
    }

    /// Remove and return the top of the selected stack
    pub fn pop_mode(&self, key: Option<ModeKey>) -> CrucibleResult<ModeHandle> {
        let popped = match key {
            None => self.user_modes.lock().pop(),
            Some(k) => self
                .keyed_modes
                .lock()
                .get_mut(&k)
                .and_then(|stack| stack.pop()),
        };
        popped.ok_or_else(|| match key {
            None => CrucibleError::empty_stack("untagged"),
            Some(k) => CrucibleError::empty_stack(&k.to_string()),
        })
    }

    /// Top of the selected stack without removing it
    pub fn current_mode(&self, key: Option<ModeKey>) -> Option<ModeHandle> {
        match key {
            None => self.user_modes.lock().last().cloned(),
            Some(k) => self
                .keyed_modes
                .lock()
                .get(&k)
                .and_then(|stack| stack.last().cloned()),
        }
    }

    pub fn depth(&self, key: Option<ModeKey>) -> usize {
        match key {
            None => self.user_modes.lock().len(),
            Some(k) => self.keyed_modes.lock().get(&k).map_or(0, |s| s.len()),
        }
    }

    /// True iff every stack is empty; teardown should assert this
    pub fn is_clear(&self) -> bool {
        self.user_modes.lock().is_empty()
            && self.keyed_modes.lock().values().all(|s| s.is_empty())
    }

    /// Snapshot of the untagged stack, bottom to top
    pub fn user_mode_stack(&self) -> Vec<ModeHandle> {
        self.user_modes.lock().clone()
    }

    /// Snapshot of one keyed stack, bottom to top
    pub fn keyed_mode_stack(&self, key: ModeKey) -> Vec<ModeHandle> {
        self.keyed_modes.lock().get(&key).cloned().unwrap_or_default()
    }

    /// Scoped push: the mode is popped again when the guard drops.
    /// The stack is selected by the mode's own dispatch key.
    pub fn enter_mode(&self, mode: ModeHandle) -> ModeGuard<'_> {
        let key = mode.dispatch_key();
        self.push_mode(mode.clone(), key);
        ModeGuard {
            ctx: self,
            mode,
            key,
        }
    }

    /// Scoped pop: the top mode is handed to the caller and re-pushed when
    /// the guard drops, on every exit path
    pub fn pop_mode_temporarily(
        &self,
        key: Option<ModeKey>,
    ) -> CrucibleResult<TemporarilyPopped<'_>> {
        let mode = self.pop_mode(key)?;
        Ok(TemporarilyPopped {
            ctx: self,
            mode: Some(mode),
            key,
        })
    }

    /// Scoped bulk disable: drains every stack and restores each mode to its
    /// original stack and position when the guard drops
    pub fn disable_all(&self) -> DisabledModes<'_> {
        let user = std::mem::take(&mut *self.user_modes.lock());
        let keyed = std::mem::take(&mut *self.keyed_modes.lock());
        tracing::debug!(
            user = user.len(),
            keyed = keyed.values().map(|s| s.len()).sum::<usize>(),
            "disable all modes"
        );
        DisabledModes {
            ctx: self,
            user,
            keyed,
        }
    }

    /// Record that `op` took the no-interceptor fast path for `key`
    pub(crate) fn record_fast_path(&self, key: ModeKey, op: OpId) {
        self.fast_path_cache
            .lock()
            .entry(key)
            .or_default()
            .insert(op);
    }

    /// Ops whose fast-path decision is currently cached for `key`
    pub fn cached_fast_path_ops(&self, key: ModeKey) -> Vec<OpId> {
        self.fast_path_cache
            .lock()
            .get(&key)
            .map(|ops| ops.iter().copied().collect())
            .unwrap_or_default()
    }

    fn invalidate_fast_path(&self, key: ModeKey) {
        if let Some(ops) = self.fast_path_cache.lock().remove(&key) {
            if !ops.is_empty() {
                tracing::debug!(key = %key, count = ops.len(), "invalidated cached fast-path decisions");
            }
        }
    }
}

/// Guard for a scoped mode push; pops on drop
pub struct ModeGuard<'a> {
    ctx: &'a DispatchContext,
    mode: ModeHandle,
    key: Option<ModeKey>,
}

impl ModeGuard<'_> {
    pub fn mode(&self) -> &ModeHandle {
        &self.mode
    }
}

impl Drop for ModeGuard<'_> {
    fn drop(&mut self) {
        match self.ctx.pop_mode(self.key) {
            Ok(popped) => {
                if !same_mode(&popped, &self.mode) {
                    tracing::error!(
                        mode = self.mode.name(),
                        "stack discipline violation: popped a different mode than was pushed"
                    );
                }
            }
            Err(_) => {
                tracing::error!(
                    mode = self.mode.name(),
                    "stack discipline violation: stack already empty at scope exit"
                );
            }
        }
    }
}

/// Guard for a temporarily popped mode; re-pushes on drop
pub struct TemporarilyPopped<'a> {
    ctx: &'a DispatchContext,
    mode: Option<ModeHandle>,
    key: Option<ModeKey>,
}

impl TemporarilyPopped<'_> {
    pub fn mode(&self) -> &ModeHandle {
        self.mode.as_ref().expect("mode is present until drop")
    }
}

impl Drop for TemporarilyPopped<'_> {
    fn drop(&mut self) {
        if let Some(mode) = self.mode.take() {
            self.ctx.push_mode(mode, self.key);
        }
    }
}

/// Guard for a bulk disable; restores the full snapshot on drop
pub struct DisabledModes<'a> {
    ctx: &'a DispatchContext,
    user: Vec<ModeHandle>,
    keyed: HashMap<ModeKey, Vec<ModeHandle>>,
}

impl DisabledModes<'_> {
    /// The full ordered snapshot: untagged modes first in stack order, then
    /// the proxy-tracing slot, then the fake-execution slot
    pub fn modes(&self) -> Vec<ModeHandle> {
        let mut all = self.user.clone();
        for key in ModeKey::ALL {
            if let Some(stack) = self.keyed.get(&key) {
                all.extend(stack.iter().cloned());
            }
        }
        all
    }
}

impl Drop for DisabledModes<'_> {
    fn drop(&mut self) {
        // Splice the snapshot back underneath anything pushed inside the
        // disabled scope, so every mode lands at its original position.
        {
            let mut user = self.ctx.user_modes.lock();
            let mut restored = std::mem::take(&mut self.user);
            restored.extend(user.drain(..));
            *user = restored;
        }
        let keys: Vec<ModeKey> = self.keyed.keys().copied().collect();
        {
            let mut keyed = self.ctx.keyed_modes.lock();
            for (key, mut stack) in self.keyed.drain() {
                let current = keyed.entry(key).or_default();
                stack.extend(current.drain(..));
                *current = stack;
            }
        }
        for key in keys {
            self.ctx.invalidate_fast_path(key);
        }
    }
}
