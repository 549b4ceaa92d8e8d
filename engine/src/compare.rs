use crate::{materialize::Values, types::RelOp};

fn any_pair<T, F: Fn(&T, &T) -> bool>(lhs: &[T], rhs: &[T], f: F) -> bool {
    lhs.iter().any(|a| rhs.iter().any(|b| f(a, b)))
}

fn exact<T: PartialEq>(op: RelOp, lhs: &[T], rhs: &[T]) -> bool {
    match op {
        RelOp::Equal => any_pair(lhs, rhs, |a, b| a == b),
        RelOp::NotEqual => any_pair(lhs, rhs, |a, b| a != b),
        _ => unreachable!("{:?} on an exact-match type", op),
    }
}

/// Existential comparison: true iff some pair of values satisfies `op`.
///
/// Both sides must have been materialized for the same relation type.
pub(crate) fn compare(op: RelOp, lhs: &Values<'_>, rhs: &Values<'_>) -> bool {
    if lhs.is_empty() || rhs.is_empty() {
        return false;
    }

    match (lhs, rhs) {
        (Values::Unsigned(lhs), Values::Unsigned(rhs)) => {
            any_pair(lhs, rhs, |a, b| op.matches(a.cmp(b)))
        }
        (Values::Ipv4(lhs), Values::Ipv4(rhs)) => {
            any_pair(lhs, rhs, |a, b| op.matches(a.masked_cmp(b)))
        }
        (Values::Ether(lhs), Values::Ether(rhs)) => exact(op, lhs, rhs),
        (Values::Boolean(lhs), Values::Boolean(rhs)) => exact(op, lhs, rhs),
        (Values::Bytes(lhs), Values::Bytes(rhs)) => match op {
            RelOp::Equal | RelOp::NotEqual | RelOp::GreaterThan | RelOp::LessThan => {
                any_pair(lhs, rhs, |a, b| op.matches(a.cmp(b)))
            }
            _ => unreachable!("{:?} on bytes", op),
        },
        _ => unreachable!("comparing {:?} with {:?}", lhs, rhs),
    }
}
