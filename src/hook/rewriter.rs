//! Entry-point rewriting.
//!
//! Redirects a live method record to the trampoline: the native bit is cleared so every
//! call path enters through the quick entry point, the entry point is replaced, and any
//! compiled code that bypasses the entry point is invalidated. The result is read back
//! and verified; a record left half-rewritten cannot be repaired and is reported as
//! [`Error::InstallationFatal`].

use std::sync::Arc;

use crate::{
    metadata::{MethodIdentity, MethodRecord},
    runtime::{EntryPoint, RuntimeAdapter, TrampolineRef},
    Error, Result,
};

pub(crate) struct EntryPointRewriter {
    adapter: Arc<dyn RuntimeAdapter>,
    trampoline: TrampolineRef,
}

impl EntryPointRewriter {
    pub(crate) fn new(adapter: Arc<dyn RuntimeAdapter>, trampoline: TrampolineRef) -> Self {
        EntryPointRewriter {
            adapter,
            trampoline,
        }
    }

    /// The entry point redirected records receive.
    pub(crate) fn target(&self) -> EntryPoint {
        EntryPoint::Trampoline(self.trampoline)
    }

    /// Redirects `record` to the trampoline.
    pub(crate) fn redirect(&self, identity: &MethodIdentity, record: MethodRecord) -> Result<()> {
        let flags = self.adapter.access_flags(record)?;
        if flags.is_backup() {
            return Err(Error::BackupNotHookable(identity.clone()));
        }

        let redirected = flags.for_redirect();
        let target = self.target();
        self.adapter.set_access_flags(record, redirected)?;

        // From here on the record is partially mutated.
        let applied = || -> Result<bool> {
            self.adapter.set_entry_point(record, target)?;
            self.adapter.invalidate_compiled_code(record)?;
            Ok(self.adapter.entry_point(record)? == target
                && self.adapter.access_flags(record)? == redirected)
        };

        match applied() {
            Ok(true) => Ok(()),
            Ok(false) => Err(Error::InstallationFatal {
                identity: identity.clone(),
                reason: "entry point rewrite did not take effect".to_string(),
            }),
            Err(error) => Err(Error::InstallationFatal {
                identity: identity.clone(),
                reason: format!("entry point rewrite failed - {error}"),
            }),
        }
    }
}
