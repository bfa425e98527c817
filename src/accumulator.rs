use std::collections::HashSet;

use crate::ingestion::Profile;

/// Global, ordered, duplicate-free record of every profile seen this session.
///
/// `identifiers` mirrors the identifiers of `profiles`; both sides compare by
/// exact string match on the already-normalized identifier.
#[derive(Debug, Clone, Default)]
pub struct ProfileSet {
    profiles: Vec<Profile>,
    identifiers: Vec<String>,
    identifier_index: HashSet<String>,
    profile_index: HashSet<String>,
}

impl ProfileSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds the set from a persisted, ordered profile list.
    pub fn from_profiles(profiles: impl IntoIterator<Item = Profile>) -> Self {
        let mut set = Self::new();
        for profile in profiles {
            let identifier = profile.identifier.clone();
            set.merge(std::slice::from_ref(&identifier), std::slice::from_ref(&profile));
        }
        set
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.identifier_index.contains(identifier)
    }

    /// Counts the distinct identifiers not yet present, without mutating.
    pub fn count_new<'a, I>(&self, identifiers: I) -> usize
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut fresh = HashSet::new();
        identifiers
            .into_iter()
            .filter(|id| !self.contains(id.as_str()) && fresh.insert(*id))
            .count()
    }

    /// Merges one file's extraction and returns how many identifiers were added.
    ///
    /// Takes `&mut self`, so the read of existing state and the writes for a
    /// single file can never interleave with another merge.
    pub fn merge(&mut self, identifiers: &[String], profiles: &[Profile]) -> usize {
        let mut added = 0;
        for identifier in identifiers {
            if self.identifier_index.insert(identifier.clone()) {
                self.identifiers.push(identifier.clone());
                added += 1;
            }
        }
        for profile in profiles {
            if self.profile_index.insert(profile.identifier.clone()) {
                self.profiles.push(profile.clone());
            }
        }
        added
    }

    pub fn profiles(&self) -> &[Profile] {
        &self.profiles
    }

    pub fn identifiers(&self) -> &[String] {
        &self.identifiers
    }

    pub fn identifier_count(&self) -> usize {
        self.identifiers.len()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}
