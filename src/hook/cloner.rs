//! Backup cloning.
//!
//! A backup is a bitwise copy of the method record taken before redirection. It keeps
//! the declaring class (so `this` dispatch and static field access keep working), the
//! shape and the pre-redirection entry point, but is made `PRIVATE` and tagged
//! [`AccessFlags::HOOK_BACKUP`] so it never participates in virtual dispatch and can
//! never be redirected itself.

use std::sync::Arc;

use crate::{
    hook::resolver::ResolvedMethod,
    metadata::{AccessFlags, MethodRecord},
    runtime::RuntimeAdapter,
    Error, Result,
};

pub(crate) struct BackupCloner {
    adapter: Arc<dyn RuntimeAdapter>,
}

impl BackupCloner {
    pub(crate) fn new(adapter: Arc<dyn RuntimeAdapter>) -> Self {
        BackupCloner { adapter }
    }

    /// Checks that `method` can be cloned on this runtime variant, without allocating.
    pub(crate) fn check(&self, method: &ResolvedMethod) -> Result<AccessFlags> {
        let identity = method.info.identity();
        let flags = self.adapter.access_flags(method.record)?;
        if flags.is_backup() {
            return Err(Error::BackupNotHookable(identity));
        }

        let variant = self.adapter.variant();
        let kind = flags.kind();
        if !variant.can_clone(kind) {
            return Err(Error::Clone {
                identity,
                reason: format!("{variant} cannot clone methods of kind {kind:?}"),
            });
        }

        if self.adapter.entry_point(method.record)?.is_trampoline() {
            return Err(Error::Clone {
                identity,
                reason: "entry point is already redirected".to_string(),
            });
        }

        Ok(flags)
    }

    /// Clones `method` into a new backup record.
    ///
    /// Must run before the original is redirected, since the backup inherits the
    /// original's current entry point.
    pub(crate) fn clone_method(&self, method: &ResolvedMethod) -> Result<MethodRecord> {
        let flags = self.check(method)?;
        let entry = self.adapter.entry_point(method.record)?;

        let backup = self.adapter.allocate_copy(method.record)?;
        self.adapter.set_access_flags(backup, flags.for_backup())?;
        self.adapter.set_entry_point(backup, entry)?;
        Ok(backup)
    }
}
