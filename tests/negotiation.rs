//! Property tests for response type negotiation.

use std::cmp::Ordering;

use proptest::prelude::*;
use resource_runtime::media::{
    candidates, negotiate, negotiate_among, AcceptPreference, MediaType, ProducePreference, Quality,
};

// ============================================================================
// Strategies
// ============================================================================

const TYPES: &[&str] = &[
    "*/*",
    "text/*",
    "text/plain",
    "text/html",
    "application/*",
    "application/json",
    "image/png",
];

fn media_type() -> impl Strategy<Value = MediaType> {
    prop::sample::select(TYPES).prop_map(|t| t.parse::<MediaType>().unwrap())
}

fn accept_entry() -> impl Strategy<Value = AcceptPreference> {
    (media_type(), 0u16..=1000).prop_map(|(m, q)| AcceptPreference::new(m, Quality::new(q)))
}

fn produce_entry() -> impl Strategy<Value = ProducePreference> {
    (media_type(), 1u16..=1000).prop_map(|(m, qs)| ProducePreference::new(m, Quality::new(qs)))
}

fn accept_list() -> impl Strategy<Value = Vec<AcceptPreference>> {
    prop::collection::vec(accept_entry(), 0..5)
}

fn produce_list() -> impl Strategy<Value = Vec<ProducePreference>> {
    prop::collection::vec(produce_entry(), 0..4)
}

// ============================================================================
// Property tests
// ============================================================================

proptest! {
    /// The same inputs always select the same type.
    #[test]
    fn test_negotiation_is_deterministic(accepted in accept_list(), produced in produce_list()) {
        prop_assert_eq!(negotiate(&accepted, &produced), negotiate(&accepted, &produced));
    }

    /// No candidate beats the selected one.
    #[test]
    fn test_winner_is_minimal(accepted in accept_list(), produced in produce_list()) {
        let all = candidates(&accepted, &produced);
        match negotiate(&accepted, &produced) {
            Some(winner) => {
                for candidate in &all {
                    prop_assert_ne!(candidate.compare(&winner), Ordering::Less);
                }
            }
            None => prop_assert!(all.is_empty()),
        }
    }

    /// A selected type always carries a non-zero client weight.
    #[test]
    fn test_refusals_never_win(accepted in accept_list(), produced in produce_list()) {
        if let Some(winner) = negotiate(&accepted, &produced) {
            prop_assert!(!winner.q.is_zero());
            prop_assert!(winner.weight() > 0);
        }
    }

    /// Refusing everything leaves nothing to select.
    #[test]
    fn test_refusing_all_types(produced in produce_list()) {
        let accepted = vec![AcceptPreference::new(MediaType::wildcard(), Quality::ZERO)];
        prop_assert!(negotiate(&accepted, &produced).is_none());
    }

    /// The winner is compatible with at least one produced type.
    #[test]
    fn test_winner_is_producible(accepted in accept_list(), produced in produce_list()) {
        if let Some(winner) = negotiate(&accepted, &produced) {
            let produced = if produced.is_empty() { vec![ProducePreference::any()] } else { produced };
            prop_assert!(produced.iter().any(|p| p.media_type.is_compatible(&winner.media_type)));
        }
    }

    /// Across bindings, the winner is as good as each binding's own best.
    #[test]
    fn test_among_dominates_each_binding(
        accepted in accept_list(),
        sets in prop::collection::vec(produce_list(), 1..4),
    ) {
        match negotiate_among(&accepted, &sets) {
            Some((index, winner)) => {
                prop_assert!(index < sets.len());
                prop_assert_eq!(negotiate(&accepted, &sets[index]), Some(winner.clone()));
                for set in &sets {
                    if let Some(own) = negotiate(&accepted, set) {
                        prop_assert_ne!(own.compare(&winner), Ordering::Less);
                    }
                }
            }
            None => {
                for set in &sets {
                    prop_assert!(negotiate(&accepted, set).is_none());
                }
            }
        }
    }
}

// ============================================================================
// Examples
// ============================================================================

fn accept(header: &str) -> Vec<AcceptPreference> {
    resource_runtime::media::parse_accept([header]).unwrap()
}

fn produces(values: &[&str]) -> Vec<ProducePreference> {
    values.iter().map(|v| v.parse().unwrap()).collect()
}

#[test]
fn test_weight_beats_distance() {
    let winner = negotiate(
        &accept("text/*;q=0.9, application/json;q=0.5"),
        &produces(&["application/json", "text/plain"]),
    )
    .unwrap();
    assert_eq!(winner.media_type.to_string(), "text/plain");
    assert_eq!(winner.d, 1);
}

#[test]
fn test_distance_breaks_weight_ties() {
    let winner = negotiate(&accept("*/*, text/plain"), &produces(&["text/plain"])).unwrap();
    assert_eq!(winner.media_type.to_string(), "text/plain");
    assert_eq!(winner.d, 0);
}

#[test]
fn test_server_weight_scales_client_weight() {
    let winner = negotiate(
        &accept("text/html, application/json;q=0.8"),
        &produces(&["text/html;qs=0.5", "application/json"]),
    )
    .unwrap();
    assert_eq!(winner.media_type.to_string(), "application/json");
}
