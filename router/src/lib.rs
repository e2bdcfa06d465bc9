#![forbid(unsafe_code)]
#![deny(
    clippy::dbg_macro,
    missing_copy_implementations,
    rustdoc::missing_crate_level_docs,
    missing_debug_implementations,
    nonstandard_style,
    unused_qualifications
)]

/*!
# Typed trie router for the crow server library

Route patterns are compiled into a byte trie at registration time. Literal
bytes descend a dense 256-way child table; the placeholders `<int>`,
`<uint>`, `<double>`, `<string>`, and `<path>` descend one of five typed
slots per node. Matching walks the trie once, preferring literals and
consuming maximal typed runs, and produces a [`RouteParams`] with the
captured values in registration order.

The router is generic over its handler payload; `crow` instantiates it with
its endpoint type.
*/

mod params;
pub use params::{FromParam, FromRouteParams, ParamKind, RouteParams, pattern_tag};

mod method_mask;
pub use method_mask::MethodMask;

mod trie;

mod router;
pub use router::{Match, Router, RouterError, Rule};
