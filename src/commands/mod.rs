//! Controller operations, grouped by what they negotiate

mod call_api;
mod candidate_api;
mod util_api;
