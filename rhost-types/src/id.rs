use std::fmt;

/// An opaque message identifier.
///
/// Ids minted by the host have the form `"#" <decimal> "#"` (§3); ids minted
/// by the client are not constrained by this crate and are carried as-is.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Id(String);

impl Id {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The sentinel bottom-of-stack id representing the top-level prompt loop.
    pub fn sentinel() -> Self {
        Self(String::new())
    }

    pub fn is_sentinel(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Id {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Id {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Mints host-originated ids of the form `#<n>#`, where `n` starts at 0 and
/// is incremented by 2 each time (the client's id namespace is independent;
/// using a disjoint stride rules out accidental collisions across the two
/// namespaces without requiring coordination).
#[derive(Debug)]
pub struct IdGenerator {
    next: u64,
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl IdGenerator {
    pub fn new() -> Self {
        Self { next: 0 }
    }

    pub fn mint(&mut self) -> Id {
        let id = Id(format!("#{}#", self.next));
        self.next += 2;
        id
    }
}
