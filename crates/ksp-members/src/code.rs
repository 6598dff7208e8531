use ksp_core::{Error, MemberCodeSequence, Result};

pub const DEFAULT_MEMBER_CODE_PREFIX: &str = "KSP";

/// Allocates codes of the form `KSP-2024-0012` from the store's per-year counter.
#[derive(Debug, Clone)]
pub struct MemberCodeAllocator {
    prefix: String,
}

impl Default for MemberCodeAllocator {
    fn default() -> Self {
        Self::new(DEFAULT_MEMBER_CODE_PREFIX)
    }
}

impl MemberCodeAllocator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn format(&self, year: i32, sequence: u32) -> String {
        format!("{}-{year:04}-{sequence:04}", self.prefix)
    }

    pub async fn allocate<S>(&self, sequences: &S, year: i32) -> Result<String>
    where
        S: MemberCodeSequence + ?Sized,
    {
        let sequence = sequences.next_member_sequence(year).await?;
        if sequence == 0 {
            return Err(Error::StoreUnavailable(
                "member code sequence returned zero".to_string(),
            ));
        }
        Ok(self.format(year, sequence))
    }
}

#[cfg(test)]
mod tests {
    use ksp_store::InMemoryStore;

    use super::*;

    #[test]
    fn pads_year_and_sequence() {
        let allocator = MemberCodeAllocator::default();
        assert_eq!(allocator.format(2024, 12), "KSP-2024-0012");
        assert_eq!(allocator.format(2024, 12345), "KSP-2024-12345");
    }

    #[tokio::test]
    async fn consecutive_allocations_differ() {
        let store = InMemoryStore::new();
        let allocator = MemberCodeAllocator::new("KOP");
        let first = allocator.allocate(&store, 2025).await.unwrap();
        let second = allocator.allocate(&store, 2025).await.unwrap();
        assert_eq!(first, "KOP-2025-0001");
        assert_eq!(second, "KOP-2025-0002");
    }
}
