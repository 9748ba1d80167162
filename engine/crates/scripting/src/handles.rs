use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use mlua::RegistryKey;

static NEXT_HOST_ID: AtomicU32 = AtomicU32::new(1);

pub(crate) fn next_host_id() -> u32 {
    NEXT_HOST_ID.fetch_add(1, Ordering::Relaxed)
}

/// Slots whose last handle was dropped, drained by the owning table.
type ReleaseQueue = Arc<Mutex<Vec<(u32, u32)>>>;

struct Slot {
    host: u32,
    index: u32,
    generation: u32,
    released: ReleaseQueue,
}

impl Drop for Slot {
    fn drop(&mut self) {
        if let Ok(mut queue) = self.released.lock() {
            queue.push((self.index, self.generation));
        }
    }
}

/// Owned reference to a table, function or object living inside one host's
/// Lua state. Only meaningful to the host that issued it.
///
/// Clones share the same slot. The slot is freed once the last clone is
/// dropped, or earlier through [`ScriptHost::release`](crate::ScriptHost::release),
/// which invalidates every clone.
#[derive(Clone)]
pub struct ScriptHandle {
    slot: Arc<Slot>,
}

impl ScriptHandle {
    pub fn host(&self) -> u32 {
        self.slot.host
    }

    fn index(&self) -> usize {
        self.slot.index as usize
    }

    fn generation(&self) -> u32 {
        self.slot.generation
    }
}

impl PartialEq for ScriptHandle {
    fn eq(&self, other: &Self) -> bool {
        self.slot.host == other.slot.host
            && self.slot.index == other.slot.index
            && self.slot.generation == other.slot.generation
    }
}

impl Eq for ScriptHandle {}

impl std::fmt::Debug for ScriptHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptHandle")
            .field("host", &self.slot.host)
            .field("index", &self.slot.index)
            .field("generation", &self.slot.generation)
            .finish()
    }
}

impl std::fmt::Display for ScriptHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "H{}({}v{})",
            self.slot.host, self.slot.index, self.slot.generation
        )
    }
}

/// Generational slot table of registry keys. Lives in the Lua app data of
/// its host so value conversions can reach it from inside callbacks.
pub struct HandleTable {
    host: u32,
    keys: Vec<Option<RegistryKey>>,
    generations: Vec<u32>,
    free_indices: Vec<u32>,
    released: ReleaseQueue,
}

impl HandleTable {
    pub fn new(host: u32) -> Self {
        Self {
            host,
            keys: Vec::new(),
            generations: Vec::new(),
            free_indices: Vec::new(),
            released: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn host(&self) -> u32 {
        self.host
    }

    pub fn insert(&mut self, key: RegistryKey) -> ScriptHandle {
        self.collect();

        let index = if let Some(index) = self.free_indices.pop() {
            let idx = index as usize;
            self.generations[idx] = self.generations[idx].wrapping_add(1);
            self.keys[idx] = Some(key);
            index
        } else {
            let index = self.keys.len() as u32;
            self.keys.push(Some(key));
            self.generations.push(0);
            index
        };

        ScriptHandle {
            slot: Arc::new(Slot {
                host: self.host,
                index,
                generation: self.generations[index as usize],
                released: self.released.clone(),
            }),
        }
    }

    pub fn get(&self, handle: &ScriptHandle) -> Option<&RegistryKey> {
        if !self.is_alive(handle) {
            return None;
        }
        self.keys[handle.index()].as_ref()
    }

    /// Free the slot, invalidating every clone of `handle`. Returns the key
    /// so the caller can drop it from the Lua registry.
    pub fn remove(&mut self, handle: &ScriptHandle) -> Option<RegistryKey> {
        if !self.is_alive(handle) {
            return None;
        }
        self.take_slot(handle.index())
    }

    fn take_slot(&mut self, idx: usize) -> Option<RegistryKey> {
        let key = self.keys[idx].take()?;
        self.free_indices.push(idx as u32);
        Some(key)
    }

    /// Free slots whose handles have all been dropped. Returns how many
    /// were freed. Their registry entries are reclaimed by mlua on the
    /// next registry insert.
    pub fn collect(&mut self) -> usize {
        let pending = match self.released.lock() {
            Ok(mut queue) => std::mem::take(&mut *queue),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };

        let mut freed = 0;
        for (index, generation) in pending {
            let idx = index as usize;
            // Slots released explicitly may already be reused
            if self.generations.get(idx) == Some(&generation) && self.take_slot(idx).is_some() {
                freed += 1;
            }
        }
        freed
    }

    pub fn is_alive(&self, handle: &ScriptHandle) -> bool {
        let idx = handle.index();
        handle.host() == self.host
            && idx < self.keys.len()
            && self.keys[idx].is_some()
            && self.generations[idx] == handle.generation()
    }

    /// Occupied slots, including ones whose handles are dropped but not yet
    /// collected.
    pub fn len(&self) -> usize {
        self.keys.len() - self.free_indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
