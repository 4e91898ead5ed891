use crate::impl_param_described;
use crate::params::ParamList;

/// An `<instrumentConfiguration>`. Component-level terms are flattened into `params`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstrumentConfiguration {
    pub id: String,
    pub params: ParamList,
    pub software_reference: Option<String>,
}

impl InstrumentConfiguration {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }
}

impl_param_described!(InstrumentConfiguration);
