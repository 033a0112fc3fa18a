//! Command implementations for the `mimic` binary

pub mod ingest;
pub mod message;
pub mod speak;
pub mod stats;

use anyhow::{anyhow, Result};

use crate::engine::Core;
use crate::model::Scope;

/// Switch the engine to `user`, or to all users when `None`
pub fn select_scope(core: &mut Core, user: Option<u64>) -> Result<()> {
    let scope = match user {
        Some(id) => {
            let user = core
                .store()
                .user(id)?
                .ok_or_else(|| anyhow!("User not found: {}", id))?;
            Scope::User(user.id)
        }
        None => Scope::All,
    };
    core.set_scope(scope)?;
    Ok(())
}
