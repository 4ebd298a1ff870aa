//! Simulated method records.

use std::sync::{
    atomic::{AtomicU32, AtomicU64, Ordering},
    Arc,
};

use crate::{
    metadata::{AccessFlags, ClassRef, MemberDescriptor, MethodInfo, MethodShape},
    runtime::{sim::SimRuntime, EntryPoint, TrampolineRef},
    value::Value,
    Result,
};

/// Body of a simulated method.
///
/// Receives the runtime (so bodies can call other methods), the receiver for instance
/// methods and the arguments in declaration order.
pub type MethodBody =
    Arc<dyn Fn(&SimRuntime, Option<&Value>, &[Value]) -> Result<Value> + Send + Sync>;

const TAG_SHIFT: u32 = 62;
const TAG_COMPILED: u64 = 1 << TAG_SHIFT;
const TAG_TRAMPOLINE: u64 = 2 << TAG_SHIFT;
const ADDRESS_MASK: u64 = TAG_COMPILED - 1;

/// Packs an entry point into a single word so it can be swapped atomically.
pub(crate) fn encode_entry(entry: EntryPoint) -> u64 {
    match entry {
        EntryPoint::Interpreter => 0,
        EntryPoint::Compiled(address) => TAG_COMPILED | (address & ADDRESS_MASK),
        EntryPoint::Trampoline(t) => TAG_TRAMPOLINE | (t.0 & ADDRESS_MASK),
    }
}

pub(crate) fn decode_entry(word: u64) -> EntryPoint {
    let address = word & ADDRESS_MASK;
    match word >> TAG_SHIFT {
        1 => EntryPoint::Compiled(address),
        2 => EntryPoint::Trampoline(TrampolineRef(address)),
        _ => EntryPoint::Interpreter,
    }
}

/// One slot in the runtime's method arena.
///
/// Identity, shape and body are immutable; the entry point, flags and code generation
/// are the mutable words a real runtime keeps in its method record.
pub(crate) struct MethodSlot {
    pub(crate) class: ClassRef,
    pub(crate) member: MemberDescriptor,
    pub(crate) shape: MethodShape,
    pub(crate) body: Option<MethodBody>,
    flags: AtomicU32,
    entry: AtomicU64,
    generation: AtomicU64,
}

impl MethodSlot {
    pub(crate) fn new(
        class: ClassRef,
        member: MemberDescriptor,
        shape: MethodShape,
        flags: AccessFlags,
        body: Option<MethodBody>,
    ) -> Self {
        MethodSlot {
            class,
            member,
            shape,
            body,
            flags: AtomicU32::new(flags.bits()),
            entry: AtomicU64::new(encode_entry(EntryPoint::Interpreter)),
            generation: AtomicU64::new(0),
        }
    }

    /// Bitwise copy of this slot with a fresh code generation.
    pub(crate) fn duplicate(&self) -> Self {
        MethodSlot {
            class: self.class.clone(),
            member: self.member.clone(),
            shape: self.shape.clone(),
            body: self.body.clone(),
            flags: AtomicU32::new(self.flags.load(Ordering::Acquire)),
            entry: AtomicU64::new(self.entry.load(Ordering::Acquire)),
            generation: AtomicU64::new(0),
        }
    }

    pub(crate) fn flags(&self) -> AccessFlags {
        AccessFlags::from_bits_retain(self.flags.load(Ordering::Acquire))
    }

    pub(crate) fn set_flags(&self, flags: AccessFlags) {
        self.flags.store(flags.bits(), Ordering::Release);
    }

    pub(crate) fn entry(&self) -> EntryPoint {
        decode_entry(self.entry.load(Ordering::Acquire))
    }

    pub(crate) fn set_entry(&self, entry: EntryPoint) {
        self.entry.store(encode_entry(entry), Ordering::Release);
    }

    /// Installs a compiled entry unless the record has been redirected to a trampoline.
    /// Returns whether the entry was replaced.
    pub(crate) fn set_compiled(&self, address: u64) -> bool {
        self.entry
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |word| {
                match decode_entry(word) {
                    EntryPoint::Trampoline(_) => None,
                    _ => Some(encode_entry(EntryPoint::Compiled(address))),
                }
            })
            .is_ok()
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Invalidates compiled code: bumps the generation so inline caches miss, and drops a
    /// compiled entry back to the interpreter. Trampoline entries are left in place.
    pub(crate) fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        let _ = self
            .entry
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |word| {
                match decode_entry(word) {
                    EntryPoint::Compiled(_) => Some(encode_entry(EntryPoint::Interpreter)),
                    _ => None,
                }
            });
    }

    pub(crate) fn info(&self) -> MethodInfo {
        MethodInfo {
            declaring_class: self.class.clone(),
            member: self.member.clone(),
            flags: self.flags(),
            shape: self.shape.clone(),
        }
    }
}
