use std::collections::HashMap;
use std::sync::Arc;

use super::scan_properties::SpectrumType;

/// The acquisition function a spectrum belongs to: its scan type at one MS level.
///
/// Thousands of spectra share a handful of functions, so records hold a shared
/// handle from an [`MsFunctionArena`] instead of their own copy.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MsFunction {
    pub spectrum_type: SpectrumType,
    pub ms_level: u8,
}

impl MsFunction {
    pub fn name(&self) -> &str {
        self.spectrum_type.name()
    }
}

/// Interns [`MsFunction`] values by `(name, level)` for the lifetime of one import.
///
/// Nothing is ever evicted; the arena and everything in it is dropped with the session
/// that owns it, while records keep their own `Arc`s alive.
#[derive(Debug, Default)]
pub struct MsFunctionArena {
    functions: HashMap<(String, u8), Arc<MsFunction>>,
}

impl MsFunctionArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the shared function for `spectrum_type` at `ms_level`, creating it on first use.
    pub fn intern(&mut self, spectrum_type: SpectrumType, ms_level: u8) -> Arc<MsFunction> {
        let key = (spectrum_type.name().to_string(), ms_level);
        self.functions
            .entry(key)
            .or_insert_with(|| {
                log::trace!("New MS function {spectrum_type} at level {ms_level}");
                Arc::new(MsFunction {
                    spectrum_type,
                    ms_level,
                })
            })
            .clone()
    }

    pub fn get(&self, name: &str, ms_level: u8) -> Option<&Arc<MsFunction>> {
        self.functions.get(&(name.to_string(), ms_level))
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<MsFunction>> {
        self.functions.values()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_interning() {
        let mut arena = MsFunctionArena::new();
        let a = arena.intern(SpectrumType::MSnSpectrum, 2);
        let b = arena.intern(SpectrumType::MSnSpectrum, 2);
        let c = arena.intern(SpectrumType::MSnSpectrum, 3);
        let d = arena.intern(SpectrumType::MS1Spectrum, 1);
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(arena.len(), 3);
        assert_eq!(d.name(), "MS1 spectrum");
        assert!(arena.get("MSn spectrum", 3).is_some());
        drop(arena);
        assert_eq!(a.ms_level, 2);
    }
}
