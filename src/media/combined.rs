//! Pairing one acceptable type with one producible type.
//!
//! # Responsibilities
//! - Decide whether an (accept, produce) pair can match at all
//! - Compute the combined type, both weights and the wildcard distance
//! - Order candidates: combined weight first, distance second
//!
//! # Design Decisions
//! - `q` and `qs` are compared as a product so a refusal-level client weight
//!   is never rescued by a high server weight
//! - Distance counts levels where either side is a wildcard, so `*/*`
//!   against `*/*` has the largest distance (2)
//! - The comparator is a plain three-way function; callers choose stability

use std::cmp::Ordering;
use std::fmt;

use crate::media::media_type::MediaType;
use crate::media::quality::{AcceptPreference, ProducePreference, Quality};

/// The negotiated result for one (accept, produce) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombinedMediaType {
    /// Most specific of the two types, without `q`/`qs`.
    pub media_type: MediaType,
    /// Client weight.
    pub q: Quality,
    /// Server weight.
    pub qs: Quality,
    /// Wildcard-to-concrete promotions needed for the pair (0..=2).
    pub d: u8,
}

impl CombinedMediaType {
    /// Combine a client and a server type, or `None` if they are incompatible.
    pub fn create(accept: &AcceptPreference, produce: &ProducePreference) -> Option<Self> {
        let client = &accept.media_type;
        let server = &produce.media_type;
        if !client.is_compatible(server) {
            return None;
        }

        Some(Self {
            media_type: client.most_specific(server),
            q: accept.q,
            qs: produce.qs,
            d: distance(client, server),
        })
    }

    /// `q * qs` on the fixed-point scale (0..=1_000_000).
    pub fn weight(&self) -> u32 {
        u32::from(self.q.value()) * u32::from(self.qs.value())
    }

    /// Three-way comparison; `Less` means `self` is the better candidate.
    pub fn compare(&self, other: &Self) -> Ordering {
        other
            .weight()
            .cmp(&self.weight())
            .then_with(|| self.d.cmp(&other.d))
    }
}

impl fmt::Display for CombinedMediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{};q={};qs={};d={}", self.media_type, self.q, self.qs, self.d)
    }
}

fn distance(client: &MediaType, server: &MediaType) -> u8 {
    let type_level = client.is_wildcard_type() || server.is_wildcard_type();
    let subtype_level = client.is_wildcard_subtype() || server.is_wildcard_subtype();
    u8::from(type_level) + u8::from(subtype_level)
}
