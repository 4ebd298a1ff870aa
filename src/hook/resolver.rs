//! Identity resolution.
//!
//! Turns a [`MethodIdentity`] into a concrete runtime record. Only methods with a body
//! resolve; abstract and interface members report [`Error::NotFound`] because there is no
//! behavior to back up.

use std::sync::Arc;

use crate::{
    metadata::{ClassRef, MemberDescriptor, MethodIdentity, MethodInfo, MethodRecord},
    runtime::RuntimeAdapter,
    Error, Result,
};

/// A concrete method located in the runtime.
#[derive(Clone, Debug)]
pub struct ResolvedMethod {
    /// The live record
    pub record: MethodRecord,
    /// Its metadata at resolution time
    pub info: MethodInfo,
}

/// Resolves identities against the runtime's class tables.
pub(crate) struct IdentityResolver {
    adapter: Arc<dyn RuntimeAdapter>,
}

impl IdentityResolver {
    pub(crate) fn new(adapter: Arc<dyn RuntimeAdapter>) -> Self {
        IdentityResolver { adapter }
    }

    /// Resolves `identity` to a concrete method.
    pub(crate) fn resolve(&self, identity: &MethodIdentity) -> Result<ResolvedMethod> {
        let record = self
            .adapter
            .resolve(&identity.class, &identity.member)?
            .ok_or_else(|| Error::NotFound(identity.clone()))?;

        let info = self.adapter.describe(record)?;
        if info.flags.is_abstract() {
            return Err(Error::NotFound(identity.clone()));
        }

        Ok(ResolvedMethod { record, info })
    }

    /// Every declared overload of `name`, abstract ones included.
    pub(crate) fn overloads(&self, class: &ClassRef, name: &str) -> Result<Vec<MemberDescriptor>> {
        Ok(self
            .adapter
            .declared_methods(class)?
            .into_iter()
            .filter(|member| member.name == name)
            .collect())
    }
}
