use std::sync::{OnceLock, RwLock};

use super::execution_context::ExecutionContext;

static DEFAULT: OnceLock<RwLock<Option<ExecutionContext>>> = OnceLock::new();

fn slot() -> &'static RwLock<Option<ExecutionContext>> {
    DEFAULT.get_or_init(|| RwLock::new(None))
}

/// The process-wide context used by operations that are not given one.
/// Created on first use as a host context with default settings.
pub fn default_context() -> ExecutionContext {
    if let Some(ctx) = slot().read().unwrap().as_ref() {
        return ctx.clone();
    }
    let mut guard = slot().write().unwrap();
    guard.get_or_insert_with(ExecutionContext::host).clone()
}

/// Replaces the process-wide context, returning the previous one.
pub fn set_default_context(ctx: ExecutionContext) -> Option<ExecutionContext> {
    slot().write().unwrap().replace(ctx)
}
