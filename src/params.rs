//! Controlled vocabulary parameters, the generic metadata carrier of mzML.
use std::fmt::Display;
use std::str::{self, FromStr};

/// Split a CURIE like `MS:1000514` into its vocabulary and numeric accession.
pub fn curie_to_num(curie: &str) -> (Option<ControlledVocabulary>, Option<u32>) {
    let mut parts = curie.splitn(2, ':');
    let prefix = parts
        .next()
        .and_then(|v| v.parse::<ControlledVocabulary>().ok())
        .and_then(|cv| cv.as_option());
    let accession = parts.next().and_then(|k| k.parse().ok());
    (prefix, accession)
}

/// A `<cvParam>` or `<userParam>`. `accession` is only set for controlled terms.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    pub value: String,
    pub accession: Option<u32>,
    pub controlled_vocabulary: Option<ControlledVocabulary>,
    pub unit: Unit,
}

impl Param {
    pub fn new() -> Param {
        Param::default()
    }

    pub fn new_key_value<K: Into<String>, V: Into<String>>(name: K, value: V) -> Param {
        Param {
            name: name.into(),
            value: value.into(),
            ..Default::default()
        }
    }

    pub fn coerce<T: str::FromStr>(&self) -> Result<T, T::Err> {
        self.value.parse::<T>()
    }

    /// Parse the value as a float, treating an empty or malformed value as absent.
    pub fn to_f64(&self) -> Option<f64> {
        self.value.trim().parse().ok()
    }

    pub fn is_controlled(&self) -> bool {
        self.accession.is_some()
    }

    pub fn curie(&self) -> Option<String> {
        let cv = self.controlled_vocabulary?;
        let acc = self.accession?;
        Some(format!("{}:{:07}", cv.prefix()?, acc))
    }

    /// Whether this is the controlled term `cv:accession`
    pub fn is_term(&self, cv: ControlledVocabulary, accession: u32) -> bool {
        self.accession == Some(accession) && self.controlled_vocabulary == Some(cv)
    }

    pub fn is_ms(&self, accession: u32) -> bool {
        self.is_term(ControlledVocabulary::MS, accession)
    }

    pub fn with_unit<S: AsRef<str>, A: AsRef<str>>(mut self, accession: S, name: A) -> Param {
        self.unit = Unit::from_accession(accession.as_ref());
        if matches!(self.unit, Unit::Unknown) {
            self.unit = Unit::from_name(name.as_ref());
        }
        self
    }

    pub fn with_unit_t(mut self, unit: &Unit) -> Param {
        self.unit = *unit;
        self
    }
}

impl Display for Param {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.curie() {
            Some(curie) => write!(f, "{}|{}={}", curie, self.name, self.value),
            None => write!(f, "{}={}", self.name, self.value),
        }
    }
}

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum ControlledVocabulary {
    MS,
    UO,
    Unknown,
}

const MS_CV: &str = "MS";
const UO_CV: &str = "UO";

impl ControlledVocabulary {
    pub fn prefix(&self) -> Option<&'static str> {
        match self {
            Self::MS => Some(MS_CV),
            Self::UO => Some(UO_CV),
            Self::Unknown => None,
        }
    }

    pub fn as_option(&self) -> Option<Self> {
        match self {
            Self::Unknown => None,
            _ => Some(*self),
        }
    }

    /// Build a controlled term from its numeric accession.
    pub const fn const_param(self, accession: u32, name: &'static str) -> ConstParam {
        ConstParam {
            name,
            accession,
            controlled_vocabulary: self,
        }
    }

    pub fn param<S: Into<String>>(&self, accession: u32, name: S) -> Param {
        Param {
            name: name.into(),
            accession: Some(accession),
            controlled_vocabulary: Some(*self),
            ..Default::default()
        }
    }

    pub fn param_val<S: Into<String>, V: ToString>(
        &self,
        accession: u32,
        name: S,
        value: V,
    ) -> Param {
        let mut param = self.param(accession, name);
        param.value = value.to_string();
        param
    }
}

impl FromStr for ControlledVocabulary {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MS" | "PSI-MS" => Ok(Self::MS),
            "UO" => Ok(Self::UO),
            _ => Ok(Self::Unknown),
        }
    }
}

/// A controlled term known at compile time, used by the writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstParam {
    pub name: &'static str,
    pub accession: u32,
    pub controlled_vocabulary: ControlledVocabulary,
}

impl ConstParam {
    pub fn to_param(&self) -> Param {
        self.controlled_vocabulary.param(self.accession, self.name)
    }

    pub fn with_value<V: ToString>(&self, value: V) -> Param {
        self.controlled_vocabulary
            .param_val(self.accession, self.name, value)
    }
}

pub type ParamList = Vec<Param>;

pub trait ParamDescribed {
    fn params(&self) -> &ParamList;
    fn params_mut(&mut self) -> &mut ParamList;

    fn add_param(&mut self, param: Param) {
        self.params_mut().push(param);
    }

    fn extend_params<I: IntoIterator<Item = Param>>(&mut self, params: I)
    where
        Self: Sized,
    {
        self.params_mut().extend(params);
    }

    fn get_param_by_name(&self, name: &str) -> Option<&Param> {
        self.params().iter().find(|p| p.name == name)
    }

    fn get_param_by_curie(&self, curie: &str) -> Option<&Param> {
        let (cv, acc_num) = curie_to_num(curie);
        acc_num?;
        self.params()
            .iter()
            .find(|p| p.accession == acc_num && p.controlled_vocabulary == cv)
    }
}

#[macro_export]
macro_rules! impl_param_described {
    ($($t:ty), +) => {$(

        impl $crate::params::ParamDescribed for $t {
            fn params(&self) -> &$crate::params::ParamList {
                &self.params
            }

            fn params_mut(&mut self) -> &mut $crate::params::ParamList {
                &mut self.params
            }
        }
    )+};
}

/// Units that a term's value might have
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Unit {
    // Mass
    MZ,
    Mass,

    // Time
    Minute,
    Second,
    Millisecond,

    // Intensity
    DetectorCounts,
    PercentBasePeak,
    CountsPerSecond,
    AbsorbanceUnit,

    // Collision Energy
    Electronvolt,
    Percent,

    #[default]
    Unknown,
}

impl Unit {
    pub fn for_param(&self) -> Option<(&'static str, &'static str)> {
        let pair = match self {
            Self::Millisecond => ("UO:0000028", "millisecond"),
            Self::Second => ("UO:0000010", "second"),
            Self::Minute => ("UO:0000031", "minute"),

            Self::MZ => ("MS:1000040", "m/z"),
            Self::Mass => ("UO:0000221", "dalton"),

            Self::DetectorCounts => ("MS:1000131", "number of detector counts"),
            Self::PercentBasePeak => ("MS:1000132", "percent of base peak"),
            Self::CountsPerSecond => ("MS:1000814", "counts per second"),
            Self::AbsorbanceUnit => ("UO:0000269", "absorbance unit"),

            Self::Electronvolt => ("UO:0000266", "electronvolt"),
            Self::Percent => ("UO:0000187", "percent"),
            Self::Unknown => return None,
        };
        Some(pair)
    }

    pub fn from_name(name: &str) -> Unit {
        match name {
            "millisecond" => Self::Millisecond,
            "second" => Self::Second,
            "minute" => Self::Minute,

            "m/z" => Self::MZ,
            "dalton" => Self::Mass,

            "number of detector counts" => Self::DetectorCounts,
            "percent of base peak" => Self::PercentBasePeak,
            "counts per second" => Self::CountsPerSecond,
            "absorbance unit" => Self::AbsorbanceUnit,

            "electronvolt" => Self::Electronvolt,
            "percent" => Self::Percent,
            _ => Unit::Unknown,
        }
    }

    pub fn from_accession(acc: &str) -> Unit {
        match acc {
            "UO:0000028" => Self::Millisecond,
            "UO:0000010" => Self::Second,
            "UO:0000031" => Self::Minute,

            "MS:1000040" => Self::MZ,
            "UO:0000221" => Self::Mass,

            "MS:1000131" => Self::DetectorCounts,
            "MS:1000132" => Self::PercentBasePeak,
            "MS:1000814" => Self::CountsPerSecond,
            "UO:0000269" => Self::AbsorbanceUnit,

            "UO:0000266" => Self::Electronvolt,
            "UO:0000187" => Self::Percent,
            _ => Unit::Unknown,
        }
    }

    /// Convert a time value in this unit to minutes. Unknown units are assumed to be minutes.
    pub fn time_to_minutes(&self, value: f64) -> f64 {
        match self {
            Self::Second => value / 60.0,
            Self::Millisecond => value / 60000.0,
            _ => value,
        }
    }

    /// Convert a time value in this unit to milliseconds. Unknown units are assumed to be milliseconds.
    pub fn time_to_milliseconds(&self, value: f64) -> f64 {
        match self {
            Self::Second => value * 1000.0,
            Self::Minute => value * 60000.0,
            _ => value,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_curie_to_num() {
        assert_eq!(
            curie_to_num("MS:1000514"),
            (Some(ControlledVocabulary::MS), Some(1000514))
        );
        assert_eq!(
            curie_to_num("UO:0000031"),
            (Some(ControlledVocabulary::UO), Some(31))
        );
        assert_eq!(curie_to_num("XX:12"), (None, Some(12)));
        assert_eq!(curie_to_num("MS"), (Some(ControlledVocabulary::MS), None));
    }

    #[test]
    fn test_param_curie() {
        let p = ControlledVocabulary::MS.param_val(1000511, "ms level", 2);
        assert_eq!(p.curie().as_deref(), Some("MS:1000511"));
        assert_eq!(p.coerce::<u8>().unwrap(), 2);
        assert!(p.is_ms(1000511));
        let u = Param::new_key_value("note", "hello");
        assert!(u.curie().is_none());
        assert_eq!(u.to_string(), "note=hello");
    }

    #[test]
    fn test_time_units() {
        assert_eq!(Unit::Second.time_to_minutes(120.0), 2.0);
        assert_eq!(Unit::Minute.time_to_minutes(2.0), 2.0);
        assert_eq!(Unit::Millisecond.time_to_minutes(60000.0), 1.0);
        assert_eq!(Unit::Second.time_to_milliseconds(0.25), 250.0);
        assert_eq!(Unit::Minute.time_to_milliseconds(0.5), 30000.0);
        assert_eq!(Unit::Millisecond.time_to_milliseconds(20.25), 20.25);
        assert_eq!(Unit::Unknown.time_to_milliseconds(20.25), 20.25);
        let p = Param::new().with_unit("UO:0000010", "second");
        assert_eq!(p.unit, Unit::Second);
        let p = Param::new().with_unit("", "minute");
        assert_eq!(p.unit, Unit::Minute);
    }
}
