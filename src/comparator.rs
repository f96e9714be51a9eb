use std::cmp::Ordering;
use std::sync::Arc;

use crate::types::{extract_user_key, unpack_tag};

/// Total order over keys. Must stay stable for the lifetime of a database:
/// the name is written to the manifest and checked on open.
pub trait Comparator: Send + Sync {
    fn name(&self) -> &str;
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering;
}

/// Plain lexicographic byte ordering.
#[derive(Debug, Default, Clone, Copy)]
pub struct BytewiseComparator;

impl Comparator for BytewiseComparator {
    fn name(&self) -> &str {
        "ravel.BytewiseComparator"
    }

    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }
}

/// Orders encoded internal keys: user key ascending (by the user
/// comparator), then tag descending so the newest version comes first.
#[derive(Clone)]
pub struct InternalKeyComparator {
    user: Arc<dyn Comparator>,
}

impl InternalKeyComparator {
    pub fn new(user: Arc<dyn Comparator>) -> Self {
        InternalKeyComparator { user }
    }

    pub fn user_comparator(&self) -> &Arc<dyn Comparator> {
        &self.user
    }

    pub fn compare_user(&self, a: &[u8], b: &[u8]) -> Ordering {
        self.user.compare(a, b)
    }
}

impl Comparator for InternalKeyComparator {
    fn name(&self) -> &str {
        "ravel.InternalKeyComparator"
    }

    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        match self.user.compare(extract_user_key(a), extract_user_key(b)) {
            Ordering::Equal => unpack_tag(b).cmp(&unpack_tag(a)),
            ord => ord,
        }
    }
}

impl std::fmt::Debug for InternalKeyComparator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InternalKeyComparator")
            .field("user", &self.user.name())
            .finish()
    }
}
