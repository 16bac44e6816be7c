use crate::models::Status;

/// Per-aggregate ordering gate.
///
/// An entry `(A, N)` may be attempted only when `(A, N-1)` does not exist or
/// has been delivered. A pending, in-flight, or dead predecessor blocks all
/// successors; a dead one blocks them until it is replayed. Head-of-line
/// blocking is deliberate: strict ordering is traded against liveness of
/// later sequences.
pub fn is_eligible(predecessor: Option<Status>) -> bool {
    match predecessor {
        None => true,
        Some(Status::Delivered) => true,
        Some(Status::Pending) | Some(Status::Delivering) | Some(Status::Dead) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_predecessor_is_eligible() {
        assert!(is_eligible(None));
    }

    #[test]
    fn delivered_predecessor_is_eligible() {
        assert!(is_eligible(Some(Status::Delivered)));
    }

    #[test]
    fn unresolved_predecessor_blocks() {
        assert!(!is_eligible(Some(Status::Pending)));
        assert!(!is_eligible(Some(Status::Delivering)));
    }

    #[test]
    fn dead_predecessor_blocks_until_replayed() {
        assert!(!is_eligible(Some(Status::Dead)));
    }
}
