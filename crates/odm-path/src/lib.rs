//! ODM path addresses
//!
//! Dotted hierarchical addresses used to locate values across backing
//! stores, and the traversal rules that resolve them against a metadata
//! value.
//!
//! # Grammar
//!
//! ```text
//! location '#' frag '.' frag '.' frag '.' frag
//! frag := [^.#]+ | '*' | '**'
//! ```
//!
//! # Example
//!
//! ```
//! use odm_path::{access, Accessed, PathAddress};
//! use serde_json::json;
//!
//! let root = json!({ "x": { "y": { "z": { "w": 5 } } } });
//! let path: PathAddress = "static#x.y.z.w".parse().unwrap();
//! let value = access(&root, path.fragments()).unwrap();
//! assert_eq!(value, Accessed::Leaf(Some(&json!(5))));
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod access;
mod error;
mod path;

pub use access::{access, flatten, Accessed};
pub use error::{PathError, PathResult};
pub use path::{
    parse, Fragment, Fragments, Location, PathAddress, FRAGMENT_SEPARATOR, LOCATION_SEPARATOR,
    TERMINAL_DEPTH,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
