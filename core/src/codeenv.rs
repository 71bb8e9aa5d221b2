//! Code environments: committed bytecode plus its data segment, shared by
//! reference count and found by address.
//!
//! Every environment is assigned a disjoint range of virtual word addresses
//! when it is created. Ranges are never reused, so an address found in a frame
//! or a function value identifies at most one environment.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

use once_cell::sync::Lazy;
use tracing::{debug, trace};

use crate::value::{FunctionRef, Value};

const TRACE_TARGET: &str = "woort::codeenv";

/// Virtual word address of a bytecode instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CodeAddress(pub u64);

impl CodeAddress {
    pub const fn offset(self, words: u64) -> Self {
        CodeAddress(self.0 + words)
    }
}

impl fmt::Display for CodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{:#x}", self.0)
    }
}

/// Initial content of one data-segment slot.
#[derive(Debug, Clone)]
pub enum DataSlot {
    Constant(Value),
    /// Script function constant, resolved to `base + entries[i]`.
    FunctionEntry(usize),
    /// Mutable static storage, starts as `Nil`.
    Static,
}

struct Registered {
    end: u64,
    env: Weak<EnvInner>,
}

static REGISTRY: Lazy<RwLock<BTreeMap<u64, Registered>>> = Lazy::new(|| RwLock::new(BTreeMap::new()));

// Address zero stays unmapped.
static NEXT_BASE: AtomicU64 = AtomicU64::new(0x1000);

struct EnvInner {
    base: u64,
    code: Box<[u32]>,
    data: RwLock<Box<[Value]>>,
    entries: Box<[u32]>,
    static_count: usize,
}

impl Drop for EnvInner {
    fn drop(&mut self) {
        let mut registry = REGISTRY.write().unwrap_or_else(PoisonError::into_inner);
        registry.remove(&self.base);
        trace!(target: TRACE_TARGET, base = self.base, "codeenv.unregister");
    }
}

/// Shared handle to a compiled unit.
#[derive(Clone)]
pub struct CodeEnv(Arc<EnvInner>);

impl CodeEnv {
    /// Registers a new environment. `entries` are word offsets of each
    /// function's first instruction inside `code`.
    pub fn create(code: Vec<u32>, data: Vec<DataSlot>, entries: Vec<u32>) -> CodeEnv {
        let len = code.len() as u64;
        let base = NEXT_BASE.fetch_add(len.max(1), Ordering::Relaxed);
        let static_count = data.iter().filter(|slot| matches!(slot, DataSlot::Static)).count();
        let values: Box<[Value]> = data
            .into_iter()
            .map(|slot| match slot {
                DataSlot::Constant(value) => value,
                DataSlot::FunctionEntry(index) => match entries.get(index) {
                    Some(offset) => Value::Function(FunctionRef::Script(CodeAddress(base + *offset as u64))),
                    None => Value::Nil,
                },
                DataSlot::Static => Value::Nil,
            })
            .collect();

        let inner = Arc::new(EnvInner {
            base,
            code: code.into_boxed_slice(),
            data: RwLock::new(values),
            entries: entries.into_boxed_slice(),
            static_count,
        });

        REGISTRY.write().unwrap_or_else(PoisonError::into_inner).insert(
            base,
            Registered {
                end: base + len,
                env: Arc::downgrade(&inner),
            },
        );
        debug!(
            target: TRACE_TARGET,
            base,
            words = len,
            functions = inner.entries.len(),
            statics = static_count,
            "codeenv.create"
        );
        CodeEnv(inner)
    }

    /// Environment whose code range contains `addr`.
    pub fn find(addr: CodeAddress) -> Option<CodeEnv> {
        let registry = REGISTRY.read().unwrap_or_else(PoisonError::into_inner);
        let (base, entry) = registry.range(..=addr.0).next_back()?;
        if addr.0 >= entry.end {
            trace!(target: TRACE_TARGET, addr = addr.0, nearest = *base, "codeenv.find_miss");
            return None;
        }
        entry.env.upgrade().map(CodeEnv)
    }

    pub fn share(&self) -> CodeEnv {
        self.clone()
    }

    pub fn unshare(self) {
        drop(self);
    }

    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    pub fn base(&self) -> CodeAddress {
        CodeAddress(self.0.base)
    }

    pub fn end(&self) -> CodeAddress {
        CodeAddress(self.0.base + self.0.code.len() as u64)
    }

    pub fn contains(&self, addr: CodeAddress) -> bool {
        addr.0 >= self.0.base && addr.0 < self.0.base + self.0.code.len() as u64
    }

    pub fn code(&self) -> &[u32] {
        &self.0.code
    }

    pub fn function_count(&self) -> usize {
        self.0.entries.len()
    }

    /// Word offset of function `index` inside [`Self::code`].
    pub fn entry_offset(&self, index: usize) -> Option<u32> {
        self.0.entries.get(index).copied()
    }

    pub fn entry_address(&self, index: usize) -> Option<CodeAddress> {
        self.entry_offset(index).map(|offset| self.base().offset(offset as u64))
    }

    pub fn static_count(&self) -> usize {
        self.0.static_count
    }

    pub fn data_len(&self) -> usize {
        self.0.data.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Reads a data slot; out-of-range indices read as `Nil`.
    pub fn load(&self, index: usize) -> Value {
        let data = self.0.data.read().unwrap_or_else(PoisonError::into_inner);
        data.get(index).cloned().unwrap_or_default()
    }

    /// Writes a data slot, returning `false` when the index is out of range.
    pub fn store(&self, index: usize, value: Value) -> bool {
        let mut data = self.0.data.write().unwrap_or_else(PoisonError::into_inner);
        match data.get_mut(index) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    pub fn ptr_eq(&self, other: &CodeEnv) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for CodeEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodeEnv")
            .field("base", &self.base())
            .field("words", &self.0.code.len())
            .field("functions", &self.0.entries.len())
            .finish()
    }
}
