//! Content negotiation subsystem.
//!
//! # Data Flow
//! ```text
//! Accept header values
//!     → quality.rs (parse into AcceptPreference list, q normalized to 0..=1000)
//! Binding produces declarations
//!     → quality.rs (ProducePreference list, qs defaults to 1000)
//!
//! negotiate.rs:
//!     every (accept, produce) pair
//!     → combined.rs (CombinedMediaType: most specific type, q, qs, distance)
//!     → comparator (q*qs descending, then distance ascending)
//!     → first maximal candidate in produce declaration order, or no match
//! ```
//!
//! # Design Decisions
//! - Weights are fixed-point integers so ties are exact
//! - Negotiation is a pure function of its inputs
//! - Nothing here depends on routing or dispatch

pub mod combined;
pub mod media_type;
pub mod negotiate;
pub mod quality;

pub use combined::CombinedMediaType;
pub use media_type::{MediaType, MediaTypeError};
pub use negotiate::{candidates, negotiate, negotiate_among};
pub use quality::{parse_accept, AcceptPreference, ProducePreference, Quality};
