use crate::balancer::backend::Backend;
use crate::balancer::pool::ServerPool;
use std::sync::Arc;

/// Round-robin over the alive snapshot: `alive[cursor % |alive|]`, cursor
/// post-incremented atomically. With a fixed alive set successive calls
/// cycle through it in pool order; membership churn may skew one cycle.
pub(super) fn select(pool: &ServerPool) -> Option<Arc<Backend>> {
    let alive = pool.alive_backends();
    if alive.is_empty() {
        return None;
    }
    let idx = (pool.next_cursor() % alive.len() as u64) as usize;
    Some(alive[idx].clone())
}
