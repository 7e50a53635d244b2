//! Package-manager and filesystem primitives.
//!
//! Everything here is stateless except [`GlobalPathResolver`], which caches one
//! answer per package manager. Memoization of root and PnP lookups lives in
//! `stylist-runtime`, which owns the invalidation policy.

mod global_path;
mod pnp;
mod process;
mod root_finder;

pub use global_path::{GlobalPathResolver, ManagerCommand};
pub use pnp::{PnpSearch, find_pnp_configuration};
pub use process::{RunOptions, RunnerError, run_find_line, try_run_find_line};
pub use root_finder::{FindRootError, UpwardSearch, find_package_root, find_upward};
