//! Persisted "this client already voted" flag

use crate::common::{Result, Storage, VoteOption};

const HAS_VOTED_KEY: &str = "has_voted";
const LAST_VOTE_KEY: &str = "last_vote";

/// Courtesy gate against voting twice from the same client installation.
/// Anyone with access to the state file can clear it.
#[derive(Clone)]
pub struct VoteFlag {
    storage: Storage,
}

impl VoteFlag {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    pub fn has_voted(&self) -> Result<bool> {
        Ok(self.storage.get(HAS_VOTED_KEY)?.as_deref() == Some("true"))
    }

    /// Last option voted from this client; unknown values read as `None`.
    pub fn last_vote(&self) -> Result<Option<VoteOption>> {
        Ok(self
            .storage
            .get(LAST_VOTE_KEY)?
            .and_then(|raw| raw.parse().ok()))
    }

    pub fn record(&self, option: VoteOption) -> Result<()> {
        self.storage.put(LAST_VOTE_KEY, option.as_str())?;
        self.storage.put(HAS_VOTED_KEY, "true")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_sets_both_values() {
        let flag = VoteFlag::new(Storage::new_memory());
        assert!(!flag.has_voted().unwrap());
        assert_eq!(flag.last_vote().unwrap(), None);

        flag.record(VoteOption::B).unwrap();
        assert!(flag.has_voted().unwrap());
        assert_eq!(flag.last_vote().unwrap(), Some(VoteOption::B));
    }

    #[test]
    fn test_garbage_last_vote_reads_as_none() {
        let storage = Storage::new_memory();
        storage.put(LAST_VOTE_KEY, "menina").unwrap();
        let flag = VoteFlag::new(storage);
        assert_eq!(flag.last_vote().unwrap(), None);
    }
}
