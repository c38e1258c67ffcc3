use std::collections::HashSet;

use crate::Id;

/// Tracks the names defined in a scope and generates new, non-conflicting
/// names on demand. Used wherever something is inserted into a namespace
/// that may already contain the requested name.
#[derive(Clone, Debug, Default)]
pub struct NameGenerator {
    name_hash: HashSet<Id>,
}

impl NameGenerator {
    /// Construct a generator that treats `names` as already defined.
    pub fn with_prev_defined_names(names: HashSet<Id>) -> Self {
        NameGenerator { name_hash: names }
    }

    /// Add additional defined names to the generator.
    pub fn add_names(&mut self, names: HashSet<Id>) {
        self.name_hash.extend(names)
    }

    /// Returns true if the name has already been defined or generated.
    pub fn is_defined<S>(&self, name: S) -> bool
    where
        S: Into<Id>,
    {
        self.name_hash.contains(&name.into())
    }

    /// Returns a new name that does not conflict with any defined name.
    /// The name is of the form `prefix` or `prefix<i>` for the smallest
    /// `i` that avoids a conflict, and is recorded as defined.
    pub fn gen_name<S>(&mut self, prefix: S) -> Id
    where
        S: Into<Id>,
    {
        let prefix = prefix.into();
        let mut name = prefix;
        let mut i = 0;
        while self.name_hash.contains(&name) {
            name = Id::new(format!("{prefix}{i}"));
            i += 1;
        }
        self.name_hash.insert(name);
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_names_do_not_collide() {
        let mut namegen = NameGenerator::with_prev_defined_names(
            ["main", "main_gpu"].map(Id::new).into(),
        );
        assert_eq!(namegen.gen_name("main_gpu"), "main_gpu0");
        assert_eq!(namegen.gen_name("main_gpu"), "main_gpu1");
        assert_eq!(namegen.gen_name("helper"), "helper");
        assert!(namegen.is_defined("helper"));
    }
}
