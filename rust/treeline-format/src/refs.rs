//! Back-reference tracking for one top-level decode call.
//!
//! Object columns can contain repeated or self-referential pointers. Each
//! decoded object is appended to a per-call arena and registered here under
//! its wire tag; later pointers with the same tag resolve to the same arena
//! slot instead of decoding a second copy. The table lives exactly as long as
//! one top-level decode call and is never shared across calls.

use std::collections::HashMap;

use treeline_common::{Result, error::Error};

/// Resolution of a pointer tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reference {
    /// Tag 0: a null pointer.
    Null,
    /// Tag 1: the enclosing object currently being decoded.
    Enclosing,
    /// Any other known tag: an index into the decode call's object arena.
    Object(usize),
}

/// Mapping from back-reference tag to already-decoded arena slot.
#[derive(Debug, Default)]
pub struct ReferenceTable {
    entries: HashMap<u32, usize>,
}

impl ReferenceTable {
    pub fn new() -> ReferenceTable {
        ReferenceTable::default()
    }

    /// Registers a freshly decoded object under its wire tag.
    ///
    /// Tags 0 and 1 are reserved and may not be registered.
    pub fn register(&mut self, tag: u32, arena_index: usize) -> Result<()> {
        if tag < 2 {
            return Err(Error::invalid_arg(
                "tag",
                format!("tag {tag} is reserved and cannot be registered"),
            ));
        }
        self.entries.insert(tag, arena_index);
        Ok(())
    }

    /// Resolves a pointer tag. Unknown tags are fatal; the error lists every
    /// known tag for diagnosis.
    pub fn resolve(&self, tag: u32) -> Result<Reference> {
        match tag {
            0 => Ok(Reference::Null),
            1 => Ok(Reference::Enclosing),
            _ => match self.entries.get(&tag) {
                Some(&index) => Ok(Reference::Object(index)),
                None => Err(Error::unresolved_reference(tag, self.known_tags())),
            },
        }
    }

    /// All registered tags, ascending.
    pub fn known_tags(&self) -> Vec<u32> {
        let mut tags: Vec<u32> = self.entries.keys().copied().collect();
        tags.sort_unstable();
        tags
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_tags_resolve_without_entries() {
        let table = ReferenceTable::new();
        assert_eq!(table.resolve(0).unwrap(), Reference::Null);
        assert_eq!(table.resolve(1).unwrap(), Reference::Enclosing);
    }

    #[test]
    fn unknown_tag_lists_known_tags() {
        let mut table = ReferenceTable::new();
        table.register(10, 0).unwrap();
        table.register(34, 1).unwrap();
        let err = table.resolve(7).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("tag 7"), "{msg}");
        assert!(msg.contains("[10, 34]"), "{msg}");
    }

    #[test]
    fn registered_tag_resolves_to_arena_slot() {
        let mut table = ReferenceTable::new();
        table.register(100, 3).unwrap();
        assert_eq!(table.resolve(100).unwrap(), Reference::Object(3));
        assert!(table.register(1, 0).is_err());
    }
}
