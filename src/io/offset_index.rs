use indexmap::map::Iter;
use indexmap::IndexMap;

/**
An ordered mapping from a record's native id to the byte offset of its start tag.

The importer fills one for spectra and one for chromatograms, and the writer builds
the same pair to emit the `<indexList>` of an indexedmzML document.
*/
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct OffsetIndex {
    /// The `name` attribute of the `<index>` element, `spectrum` or `chromatogram`
    pub name: String,
    offsets: IndexMap<Box<str>, u64>,
}

impl OffsetIndex {
    pub fn new<S: Into<String>>(name: S) -> OffsetIndex {
        OffsetIndex {
            name: name.into(),
            offsets: IndexMap::new(),
        }
    }

    #[inline]
    pub fn get(&self, key: &str) -> Option<u64> {
        self.offsets.get(key).copied()
    }

    /// Get the id and offset at an ordinal position
    #[inline]
    pub fn get_index(&self, index: usize) -> Option<(&str, u64)> {
        self.offsets
            .get_index(index)
            .map(|(key, offset)| (key.as_ref(), *offset))
    }

    #[inline]
    pub fn index_of(&self, key: &str) -> Option<usize> {
        self.offsets.get_index_of(key)
    }

    /// Record `offset` for `key`. A repeated id keeps its first position and reports the
    /// offset it replaced.
    #[inline]
    pub fn insert<T: Into<Box<str>>>(&mut self, key: T, offset: u64) -> Option<u64> {
        self.offsets.insert(key.into(), offset)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn iter(&self) -> Iter<'_, Box<str>, u64> {
        self.offsets.iter()
    }

    #[inline]
    pub fn contains_key(&self, key: &str) -> bool {
        self.offsets.contains_key(key)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_ordering() {
        let mut index = OffsetIndex::new("spectrum");
        index.insert("scan=3", 300);
        index.insert("scan=1", 100);
        assert_eq!(index.insert("scan=3", 350), Some(300));
        assert_eq!(index.len(), 2);
        assert_eq!(index.get_index(0), Some(("scan=3", 350)));
        assert_eq!(index.index_of("scan=1"), Some(1));
        assert_eq!(index.get("scan=2"), None);
        let keys: Vec<_> = index.iter().map(|(k, _)| k.as_ref()).collect();
        assert_eq!(keys, ["scan=3", "scan=1"]);
    }
}
