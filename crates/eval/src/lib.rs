//! mapwright rule executor.
//!
//! Takes normalized [`ConversionRules`](mapwright_core::ConversionRules)
//! and runs them against parsed payloads:
//!
//! - [`execute`] walks a rule tree once against one input document
//! - [`CompiledPlan`] pairs rules with a content-hash key and pre-parsed
//!   expressions; [`PlanCache`] shares plans between callers
//! - [`profile`] measures parse/execute/format latency of a plan
//! - [`convert_stream`] converts a byte stream item by item
//!
//! Problems inside rules never surface as `Err`: they are strings on the
//! returned [`ConversionResult`].

pub mod executor;
pub mod plan;
pub mod predicate;
pub mod profile;
pub mod resolve;
pub mod stream;
pub mod transform;
pub mod types;

pub use executor::{execute, MAX_RULE_DEPTH};
pub use plan::{CacheStats, CompiledPlan, Conversion, PlanCache};
pub use predicate::{evaluate, Scope};
pub use profile::{profile, ProfileReport};
pub use resolve::MAX_SOURCE_DEPTH;
pub use stream::{convert_stream, ConversionStream, ErrorMode, StreamError, StreamInputKind, StreamOptions};
pub use transform::TransformRegistry;
pub use types::{ConversionResult, ExecError, ExecOptions};
