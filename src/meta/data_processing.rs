use crate::impl_param_described;
use crate::params::{ControlledVocabulary, ParamList};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessingMethod {
    pub order: i8,
    pub software_reference: String,
    pub params: ParamList,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataProcessing {
    pub id: String,
    pub methods: Vec<ProcessingMethod>,
}

impl_param_described!(ProcessingMethod);

impl DataProcessing {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self {
            id: id.into(),
            methods: Vec::new(),
        }
    }

    /// A single-step processing entry that records a format conversion done by `software_reference`.
    pub fn conversion<S: Into<String>, R: Into<String>>(id: S, software_reference: R) -> Self {
        let mut dp = Self::new(id);
        let mut method = ProcessingMethod {
            order: 0,
            software_reference: software_reference.into(),
            params: ParamList::new(),
        };
        method
            .params
            .push(ControlledVocabulary::MS.param(1000544, "Conversion to mzML"));
        dp.push(method);
        dp
    }

    pub fn push(&mut self, method: ProcessingMethod) {
        self.methods.push(method)
    }

    pub fn iter(&self) -> std::slice::Iter<ProcessingMethod> {
        self.methods.iter()
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}
