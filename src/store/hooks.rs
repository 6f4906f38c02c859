// Varseal - Persistence Hook Surface
//
// Lifecycle callbacks invoked by the executor around each storage operation.
// Hooks run synchronously on the caller's connection (or transaction), once
// per operation, before the operation returns.

use rusqlite::Connection;

use crate::crypto::KeyMaterial;

use super::StoreError;

/// Tunables consulted by the hooks.
#[derive(Debug, Clone, Copy)]
pub struct HookOptions {
    /// Issue a corrective write when a legacy document fails to decode on read.
    pub heal_legacy_on_read: bool,
}

impl Default for HookOptions {
    fn default() -> Self {
        Self {
            heal_legacy_on_read: true,
        }
    }
}

/// Everything a hook may touch: the current connection and the key material.
pub struct HookContext<'a> {
    pub conn: &'a Connection,
    pub keys: &'a KeyMaterial,
    pub options: HookOptions,
}

/// Lifecycle contract for persisted entities.
///
/// `post_insert` delegates to `post_update` unless overridden, so a fresh row
/// is sealed exactly like an updated one.
pub trait Lifecycle {
    fn pre_insert(&mut self, _ctx: &HookContext<'_>) -> Result<(), StoreError> {
        Ok(())
    }

    fn post_insert(&mut self, ctx: &HookContext<'_>) -> Result<(), StoreError> {
        self.post_update(ctx)
    }

    fn post_update(&mut self, _ctx: &HookContext<'_>) -> Result<(), StoreError> {
        Ok(())
    }

    fn post_get(&mut self, _ctx: &HookContext<'_>) -> Result<(), StoreError> {
        Ok(())
    }
}
