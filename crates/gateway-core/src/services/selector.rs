//! Health-aware round-robin instance selection.
//!
//! Grounded on the teacher's `RoundRobinBalancer` (a bare `AtomicUsize`
//! cyclic counter); extended with the admissibility filter spec.md §4.3
//! requires before an index is handed back to the caller.

use std::sync::Arc;

use crate::models::service::{Instance, Service};

/// Selects the next admissible instance of `service` by cyclic index,
/// skipping any instance whose health record is unhealthy or whose breaker
/// is open. Falls back to the raw cyclic candidate if the whole ring is
/// traversed without finding one — the selector never returns `None` while
/// the ring is non-empty, so the proxy layer can still produce a
/// deterministic circuit-breaker/health error downstream.
pub fn select_instance(service: &Service) -> Option<Arc<Instance>> {
    let len = service.instances.len();
    if len == 0 {
        return None;
    }

    let start = service.next_index();
    for offset in 0..len {
        let idx = (start + offset) % len;
        let candidate = &service.instances[idx];
        if candidate.is_admissible() {
            return Some(Arc::clone(candidate));
        }
    }

    // Ring fully traversed with nothing admissible: return the original
    // cyclic candidate so the caller still gets a deterministic instance.
    Some(Arc::clone(&service.instances[start % len]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::service::ServiceName;

    #[test]
    fn rotates_across_calls() {
        let service = Service::new(
            ServiceName::Work,
            vec!["http://a".into(), "http://b".into(), "http://c".into()],
        );
        let first = select_instance(&service).unwrap();
        let second = select_instance(&service).unwrap();
        let third = select_instance(&service).unwrap();
        assert_ne!(first.base_url, second.base_url);
        assert_ne!(second.base_url, third.base_url);
    }

    #[test]
    fn skips_unhealthy_instance() {
        let service = Service::new(ServiceName::Work, vec!["http://a".into(), "http://b".into()]);
        service.instances[0].health.write().unwrap().record_failure("down");
        for _ in 0..4 {
            let chosen = select_instance(&service).unwrap();
            assert_eq!(chosen.base_url, "http://b");
        }
    }

    #[test]
    fn returns_last_candidate_when_none_admissible() {
        let service = Service::new(ServiceName::Work, vec!["http://a".into(), "http://b".into()]);
        for instance in &service.instances {
            instance.health.write().unwrap().record_failure("down");
        }
        assert!(select_instance(&service).is_some());
    }

    #[test]
    fn empty_service_returns_none() {
        let service = Service::new(ServiceName::Work, vec![]);
        assert!(select_instance(&service).is_none());
    }
}
