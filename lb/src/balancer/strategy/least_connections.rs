use crate::balancer::backend::Backend;
use crate::balancer::pool::ServerPool;
use std::sync::Arc;

/// Linear scan for the minimum active-connection count. Only a strictly
/// smaller count replaces the candidate, so the earliest minimum in pool
/// order wins ties.
pub(super) fn select(pool: &ServerPool) -> Option<Arc<Backend>> {
    let alive = pool.alive_backends();

    let mut min: Option<(Arc<Backend>, usize)> = None;
    for backend in alive {
        let conns = backend.connections();
        let better = match &min {
            Some((_, best)) => conns < *best,
            None => true,
        };
        if better {
            min = Some((backend, conns));
        }
    }
    min.map(|(backend, _)| backend)
}
