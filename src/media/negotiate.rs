//! Response type negotiation.
//!
//! # Responsibilities
//! - Enumerate every viable (accept, produce) candidate
//! - Select the single best candidate, or report no match
//! - Select the best candidate across several bindings at once
//!
//! # Design Decisions
//! - Candidates are enumerated produce-major, so among equals the earliest
//!   declared produced type (and earliest binding) wins; Accept order never
//!   breaks a tie
//! - A `q=0` entry refuses every type it covers, including types a broader
//!   entry would otherwise accept
//! - An empty produces list behaves as `*/*`; an empty accept list as `*/*`

use std::cmp::Ordering;

use crate::media::combined::CombinedMediaType;
use crate::media::quality::{AcceptPreference, ProducePreference};

/// Every viable candidate for one produced set, in tie-break order.
pub fn candidates(
    accepted: &[AcceptPreference],
    produced: &[ProducePreference],
) -> Vec<CombinedMediaType> {
    let any_accept = [AcceptPreference::any()];
    let any_produce = [ProducePreference::any()];
    let accepted = if accepted.is_empty() { &any_accept[..] } else { accepted };
    let produced = if produced.is_empty() { &any_produce[..] } else { produced };

    let mut result = Vec::new();
    for produce in produced {
        for accept in accepted {
            if accept.is_refusal() || is_refused(accepted, accept, produce) {
                continue;
            }
            if let Some(combined) = CombinedMediaType::create(accept, produce) {
                result.push(combined);
            }
        }
    }
    result
}

/// Pick the best response type for one produced set.
///
/// Returns `None` when no pair is compatible; callers surface that as
/// 406 Not Acceptable.
pub fn negotiate(
    accepted: &[AcceptPreference],
    produced: &[ProducePreference],
) -> Option<CombinedMediaType> {
    best(candidates(accepted, produced).into_iter())
}

/// Pick the best binding and response type across several produced sets.
///
/// Returns the index of the winning set with its combined type. Exact ties
/// go to the lowest index.
pub fn negotiate_among<P>(
    accepted: &[AcceptPreference],
    produced_sets: &[P],
) -> Option<(usize, CombinedMediaType)>
where
    P: AsRef<[ProducePreference]>,
{
    let mut winner: Option<(usize, CombinedMediaType)> = None;
    for (index, produced) in produced_sets.iter().enumerate() {
        let Some(candidate) = negotiate(accepted, produced.as_ref()) else {
            continue;
        };
        let better = match &winner {
            Some((_, current)) => candidate.compare(current) == Ordering::Less,
            None => true,
        };
        if better {
            winner = Some((index, candidate));
        }
    }
    winner
}

/// First minimal element; later equals never displace it.
fn best<I>(mut iter: I) -> Option<CombinedMediaType>
where
    I: Iterator<Item = CombinedMediaType>,
{
    let mut winner = iter.next()?;
    for candidate in iter {
        if candidate.compare(&winner) == Ordering::Less {
            winner = candidate;
        }
    }
    Some(winner)
}

/// True if a more specific `q=0` entry covers `produce`, overriding `accept`.
fn is_refused(
    accepted: &[AcceptPreference],
    accept: &AcceptPreference,
    produce: &ProducePreference,
) -> bool {
    accepted.iter().any(|refusal| {
        refusal.is_refusal()
            && refusal.media_type.is_compatible(&produce.media_type)
            && refusal.media_type.specificity() <= produce.media_type.specificity()
            && refusal.media_type.specificity() > accept.media_type.specificity()
    })
}
