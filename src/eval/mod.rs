pub mod context;
pub mod expr;
pub mod functions;

pub use context::{CancellationToken, EvalContext, IncludeTrack};
pub use functions::FunctionLibrary;
