use crate::impl_param_described;
use crate::params::{ControlledVocabulary, ParamList};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Software {
    /// A unique identifier for the software within processing metadata
    pub id: String,
    /// A string denoting a particular software version, no guarantee is given for its format
    pub version: String,
    /// Any associated vocabulary terms, including actual software name and type
    pub params: ParamList,
}

impl Software {
    pub fn new<I: Into<String>, V: Into<String>>(id: I, version: V) -> Self {
        Self {
            id: id.into(),
            version: version.into(),
            params: ParamList::new(),
        }
    }

    /// The software entry describing this library, written into every exported file.
    pub fn this_library() -> Self {
        let mut sw = Self::new(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
        // MS:1000799 "custom unreleased software tool"
        sw.params.push(ControlledVocabulary::MS.param_val(
            1000799,
            "custom unreleased software tool",
            env!("CARGO_PKG_NAME"),
        ));
        sw
    }
}

impl_param_described!(Software);
