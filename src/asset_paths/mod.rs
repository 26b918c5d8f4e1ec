//! Helpers for resolving and normalising asset paths inside the output tree.
//!
//! Destination resolution and reference filtering live in separate submodules so the path
//! traversal rules can be tested independently of the reference rewriting that relies on them.

mod filters;
mod resolve;

pub use filters::should_ignore_asset_reference;
pub(crate) use resolve::validate_file_name;
pub use resolve::{normalise_relative, resolve, resolve_named, to_url_path};
