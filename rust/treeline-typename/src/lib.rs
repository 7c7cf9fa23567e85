//! Parser from C++-style type descriptor text to a tree of type descriptors.
//!
//! Column metadata in the container names element types with template syntax,
//! e.g. `vector<map<int,vector<float>>>`. This crate turns that text into a
//! [`descriptor::TypeDescriptor`] tree and renders trees back to canonical
//! text. Descriptor trees are pure data; turning them into decoders is the
//! interpretation layer's job.

pub mod descriptor;
pub mod parse;

mod token;

pub use descriptor::TypeDescriptor;
pub use parse::{TypeLookup, parse, parse_with_lookup};
