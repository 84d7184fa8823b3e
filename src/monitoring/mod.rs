/*!
 * Monitoring
 * Logging and tracing setup
 */

mod tracer;

pub use tracer::{init_tracing, try_init_tracing};
