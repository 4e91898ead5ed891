use std::fmt::Display;

use crate::impl_param_described;
use crate::params::{ControlledVocabulary, Param, ParamList};

/// The isolation window around a precursor or product ion, as the offsets recorded in mzML.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct IsolationWindow {
    pub target: Option<f64>,
    pub lower_offset: Option<f64>,
    pub upper_offset: Option<f64>,
    pub params: ParamList,
}

impl IsolationWindow {
    pub fn new(target: f64, lower_offset: f64, upper_offset: f64) -> Self {
        Self {
            target: Some(target),
            lower_offset: Some(lower_offset),
            upper_offset: Some(upper_offset),
            params: ParamList::new(),
        }
    }

    pub fn lower_bound(&self) -> Option<f64> {
        Some(self.target? - self.lower_offset.unwrap_or_default())
    }

    pub fn upper_bound(&self) -> Option<f64> {
        Some(self.target? + self.upper_offset.unwrap_or_default())
    }

    pub fn is_empty(&self) -> bool {
        self.target.is_none() && self.lower_offset.is_none() && self.upper_offset.is_none()
    }
}

#[derive(Default, Debug, Clone, PartialEq)]
pub struct ScanWindow {
    pub lower_bound: f64,
    pub upper_bound: f64,
}

pub type ScanWindowList = Vec<ScanWindow>;

#[derive(Default, Debug, Clone, PartialEq)]
/// Describes a single scan event. Unless additional post-processing is done,
/// there is usually only one event per spectrum.
pub struct ScanEvent {
    /// Scan start time in minutes, whatever unit the document used
    pub start_time: Option<f64>,
    /// Ion injection time in milliseconds
    pub injection_time: Option<f64>,
    pub filter_string: Option<String>,
    pub scan_windows: ScanWindowList,
    pub instrument_configuration_ref: Option<String>,
    pub params: ParamList,
}

pub type ScanEventList = Vec<ScanEvent>;

#[derive(Default, Debug, Clone, PartialEq)]
/// Describe the series of acquisition events that constructed the spectrum
/// being described.
pub struct Acquisition {
    pub scans: ScanEventList,
    pub params: ParamList,
}

impl Acquisition {
    pub fn first_scan(&self) -> Option<&ScanEvent> {
        self.scans.first()
    }

    pub fn start_time(&self) -> Option<f64> {
        self.first_scan().and_then(|s| s.start_time)
    }

    pub fn is_empty(&self) -> bool {
        self.scans.is_empty() && self.params.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
/// Describes a single selected ion from a precursor isolation
pub struct SelectedIon {
    /// The selected ion's m/z as reported, may not be the monoisotopic peak.
    pub mz: f64,
    pub intensity: Option<f64>,
    /// The reported precursor ion's charge state. May be absent in
    /// some source files.
    pub charge: Option<i32>,
    pub params: ParamList,
}

#[derive(Debug, Default, Clone, PartialEq)]
/// Describes the activation method used to dissociate the precursor ion
pub struct Activation {
    /// The dissociation method terms, usually one
    pub methods: Vec<Param>,
    /// Collision energy in electronvolts
    pub energy: Option<f64>,
    pub params: ParamList,
}

impl Activation {
    pub fn method(&self) -> Option<&Param> {
        self.methods.first()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty() && self.energy.is_none() && self.params.is_empty()
    }

    pub fn is_param_activation(p: &Param) -> bool {
        match (p.controlled_vocabulary, p.accession) {
            (Some(ControlledVocabulary::MS), Some(accession)) => {
                Self::accession_to_activation(accession)
            }
            _ => false,
        }
    }

    /// Whether `accession` is one of the PSI-MS dissociation method terms
    pub fn accession_to_activation(accession: u32) -> bool {
        matches!(
            accession,
            1000133
                | 1000134
                | 1000135
                | 1000136
                | 1000242
                | 1000250
                | 1000262
                | 1000282
                | 1000422
                | 1000433
                | 1000435
                | 1000598
                | 1000599
                | 1001880
                | 1002000
                | 1002472
                | 1002481
                | 1002631
                | 1002678
                | 1002679
                | 1003181
                | 1003182
                | 1003246
                | 1003247
                | 1003294
        )
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
/// Describes a precursor ion of the owning spectrum or chromatogram.
pub struct Precursor {
    /// The native id of the spectrum the precursor was selected from, if given
    pub spectrum_ref: Option<String>,
    pub isolation_window: Option<IsolationWindow>,
    pub ions: Vec<SelectedIon>,
    pub activation: Activation,
    pub params: ParamList,
}

impl Precursor {
    pub fn ion(&self) -> Option<&SelectedIon> {
        self.ions.first()
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
/// Describes a product ion, used by SRM chromatograms
pub struct Product {
    pub isolation_window: Option<IsolationWindow>,
    pub params: ParamList,
}

/**
Describes the polarity of a mass spectrum. A spectrum is either `Positive` (1+), `Negative` (-1)
or `Unknown` (0). The `Unknown` state is the default.
*/
#[repr(i8)]
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Eq, Hash, Default)]
pub enum ScanPolarity {
    #[default]
    Unknown = 0,
    Positive = 1,
    Negative = -1,
}

impl ScanPolarity {
    pub const fn from_accession(accession: u32) -> Option<Self> {
        match accession {
            1000130 => Some(Self::Positive),
            1000129 => Some(Self::Negative),
            _ => None,
        }
    }

    pub fn as_param(&self) -> Option<Param> {
        let cv = ControlledVocabulary::MS;
        match self {
            Self::Positive => Some(cv.param(1000130, "positive scan")),
            Self::Negative => Some(cv.param(1000129, "negative scan")),
            Self::Unknown => None,
        }
    }
}

/**
Describes the initial representation of the signal of a spectrum.

Though most formats explicitly have a method of either conveying a processing level
or an assumed level, the `Unknown` option is retained for partial initialization.
*/
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Eq, Hash, Default)]
pub enum SignalContinuity {
    #[default]
    Unknown = 0,
    Centroid = 3,
    Profile = 5,
}

impl SignalContinuity {
    pub const fn from_accession(accession: u32) -> Option<Self> {
        match accession {
            1000127 => Some(Self::Centroid),
            1000128 => Some(Self::Profile),
            _ => None,
        }
    }

    pub fn as_param(&self) -> Option<Param> {
        let cv = ControlledVocabulary::MS;
        match self {
            Self::Centroid => Some(cv.param(1000127, "centroid spectrum")),
            Self::Profile => Some(cv.param(1000128, "profile spectrum")),
            Self::Unknown => None,
        }
    }
}

/// The kind of scan that produced a spectrum
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum SpectrumType {
    #[default]
    Unknown,
    MS1Spectrum,
    MSnSpectrum,
    SelectedIonMonitoring,
    SelectedReactionMonitoring,
    ConsecutiveReactionMonitoring,
    PrecursorIon,
    ConstantNeutralGain,
    ConstantNeutralLoss,
    EnhancedMultiplyCharged,
    TimeDelayedFragmentation,
    ElectromagneticRadiation,
    Absorption,
    Emission,
    Other { accession: u32, name: Box<String> },
}

impl Display for SpectrumType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl SpectrumType {
    pub fn accession(&self) -> Option<u32> {
        let acc = match self {
            Self::Unknown => return None,
            Self::MS1Spectrum => 1000579,
            Self::MSnSpectrum => 1000580,
            Self::SelectedIonMonitoring => 1000582,
            Self::SelectedReactionMonitoring => 1000583,
            Self::ConsecutiveReactionMonitoring => 1000581,
            Self::PrecursorIon => 1000341,
            Self::ConstantNeutralGain => 1000325,
            Self::ConstantNeutralLoss => 1000326,
            Self::EnhancedMultiplyCharged => 1000789,
            Self::TimeDelayedFragmentation => 1000790,
            Self::ElectromagneticRadiation => 1000804,
            Self::Absorption => 1000806,
            Self::Emission => 1000805,
            Self::Other { accession, .. } => *accession,
        };
        Some(acc)
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Unknown => "unknown spectrum type",
            Self::MS1Spectrum => "MS1 spectrum",
            Self::MSnSpectrum => "MSn spectrum",
            Self::SelectedIonMonitoring => "SIM spectrum",
            Self::SelectedReactionMonitoring => "SRM spectrum",
            Self::ConsecutiveReactionMonitoring => "CRM spectrum",
            Self::PrecursorIon => "precursor ion spectrum",
            Self::ConstantNeutralGain => "constant neutral gain spectrum",
            Self::ConstantNeutralLoss => "constant neutral loss spectrum",
            Self::EnhancedMultiplyCharged => "enhanced multiply charged spectrum",
            Self::TimeDelayedFragmentation => "time-delayed fragmentation spectrum",
            Self::ElectromagneticRadiation => "electromagnetic radiation spectrum",
            Self::Absorption => "absorption spectrum",
            Self::Emission => "emission spectrum",
            Self::Other { name, .. } => name.as_str(),
        }
    }

    /// Recognize a controlled term as a spectrum type. Unlisted terms whose name ends in
    /// `spectrum` become [`SpectrumType::Other`].
    pub fn from_param(param: &Param) -> Option<Self> {
        if param.controlled_vocabulary != Some(ControlledVocabulary::MS) {
            return None;
        }
        let tp = match param.accession? {
            1000579 => Self::MS1Spectrum,
            1000580 => Self::MSnSpectrum,
            1000582 => Self::SelectedIonMonitoring,
            1000583 => Self::SelectedReactionMonitoring,
            1000581 => Self::ConsecutiveReactionMonitoring,
            1000341 => Self::PrecursorIon,
            1000325 => Self::ConstantNeutralGain,
            1000326 => Self::ConstantNeutralLoss,
            1000789 => Self::EnhancedMultiplyCharged,
            1000790 => Self::TimeDelayedFragmentation,
            1000804 => Self::ElectromagneticRadiation,
            1000806 => Self::Absorption,
            1000805 => Self::Emission,
            accession if param.name.ends_with(" spectrum") => Self::Other {
                accession,
                name: Box::new(param.name.clone()),
            },
            _ => return None,
        };
        Some(tp)
    }

    pub fn as_param(&self) -> Option<Param> {
        self.accession()
            .map(|acc| ControlledVocabulary::MS.param(acc, self.name()))
    }

    /// The type written for a spectrum whose document did not say
    pub fn default_for_level(ms_level: u8) -> Self {
        if ms_level > 1 {
            Self::MSnSpectrum
        } else {
            Self::MS1Spectrum
        }
    }
}

/// The kind of trace a chromatogram holds
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum ChromatogramType {
    #[default]
    Unknown,
    TotalIonCurrentChromatogram,
    BasePeakChromatogram,
    SelectedIonCurrentChromatogram,
    SelectedReactionMonitoringChromatogram,
    SelectedIonMonitoringChromatogram,
    IonCurrentChromatogram,
    ElectromagneticRadiationChromatogram,
    AbsorptionChromatogram,
    EmissionChromatogram,
    PressureChromatogram,
    FlowRateChromatogram,
    Other { accession: u32, name: Box<String> },
}

impl Display for ChromatogramType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl ChromatogramType {
    pub fn accession(&self) -> Option<u32> {
        let acc = match self {
            Self::Unknown => return None,
            Self::TotalIonCurrentChromatogram => 1000235,
            Self::BasePeakChromatogram => 1000628,
            Self::SelectedIonCurrentChromatogram => 1000627,
            Self::SelectedReactionMonitoringChromatogram => 1001473,
            Self::SelectedIonMonitoringChromatogram => 1001472,
            Self::IonCurrentChromatogram => 1000810,
            Self::ElectromagneticRadiationChromatogram => 1000811,
            Self::AbsorptionChromatogram => 1000812,
            Self::EmissionChromatogram => 1000813,
            Self::PressureChromatogram => 1003019,
            Self::FlowRateChromatogram => 1003020,
            Self::Other { accession, .. } => *accession,
        };
        Some(acc)
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Unknown => "unknown chromatogram type",
            Self::TotalIonCurrentChromatogram => "total ion current chromatogram",
            Self::BasePeakChromatogram => "basepeak chromatogram",
            Self::SelectedIonCurrentChromatogram => "selected ion current chromatogram",
            Self::SelectedReactionMonitoringChromatogram => {
                "selected reaction monitoring chromatogram"
            }
            Self::SelectedIonMonitoringChromatogram => "selected ion monitoring chromatogram",
            Self::IonCurrentChromatogram => "ion current chromatogram",
            Self::ElectromagneticRadiationChromatogram => "electromagnetic radiation chromatogram",
            Self::AbsorptionChromatogram => "absorption chromatogram",
            Self::EmissionChromatogram => "emission chromatogram",
            Self::PressureChromatogram => "pressure chromatogram",
            Self::FlowRateChromatogram => "flow rate chromatogram",
            Self::Other { name, .. } => name.as_str(),
        }
    }

    /// Recognize a controlled term as a chromatogram type. Unlisted terms whose name ends in
    /// `chromatogram` become [`ChromatogramType::Other`].
    pub fn from_param(param: &Param) -> Option<Self> {
        if param.controlled_vocabulary != Some(ControlledVocabulary::MS) {
            return None;
        }
        let tp = match param.accession? {
            1000235 => Self::TotalIonCurrentChromatogram,
            1000628 => Self::BasePeakChromatogram,
            1000627 => Self::SelectedIonCurrentChromatogram,
            1001473 => Self::SelectedReactionMonitoringChromatogram,
            1001472 => Self::SelectedIonMonitoringChromatogram,
            1000810 => Self::IonCurrentChromatogram,
            1000811 => Self::ElectromagneticRadiationChromatogram,
            1000812 => Self::AbsorptionChromatogram,
            1000813 => Self::EmissionChromatogram,
            1003019 => Self::PressureChromatogram,
            1003020 => Self::FlowRateChromatogram,
            accession if param.name.ends_with(" chromatogram") => Self::Other {
                accession,
                name: Box::new(param.name.clone()),
            },
            _ => return None,
        };
        Some(tp)
    }

    pub fn as_param(&self) -> Option<Param> {
        self.accession()
            .map(|acc| ControlledVocabulary::MS.param(acc, self.name()))
    }
}

impl_param_described!(
    Acquisition,
    Activation,
    Precursor,
    Product,
    SelectedIon,
    ScanEvent,
    IsolationWindow
);

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_isolation_window_bounds() {
        let window = IsolationWindow::new(445.3, 0.5, 1.0);
        assert_eq!(window.lower_bound(), Some(444.8));
        assert_eq!(window.upper_bound(), Some(446.3));
        assert!(IsolationWindow::default().is_empty());
        assert_eq!(IsolationWindow::default().lower_bound(), None);
    }

    #[test]
    fn test_type_terms() {
        let cv = ControlledVocabulary::MS;
        assert_eq!(
            SpectrumType::from_param(&cv.param(1000580, "MSn spectrum")),
            Some(SpectrumType::MSnSpectrum)
        );
        let other = SpectrumType::from_param(&cv.param(1000928, "calibration spectrum")).unwrap();
        assert_eq!(other.accession(), Some(1000928));
        assert_eq!(other.name(), "calibration spectrum");
        assert_eq!(
            SpectrumType::from_param(&cv.param(1000511, "ms level")),
            None
        );

        let tic = ChromatogramType::from_param(&cv.param(1000235, "total ion current chromatogram"));
        assert_eq!(tic, Some(ChromatogramType::TotalIonCurrentChromatogram));
        assert_eq!(
            ChromatogramType::SelectedReactionMonitoringChromatogram
                .as_param()
                .and_then(|p| p.accession),
            Some(1001473)
        );
    }

    #[test]
    fn test_activation_terms() {
        let cv = ControlledVocabulary::MS;
        assert!(Activation::is_param_activation(
            &cv.param(1000422, "beam-type collision-induced dissociation")
        ));
        assert!(!Activation::is_param_activation(
            &cv.param(1000045, "collision energy")
        ));
        assert_eq!(ScanPolarity::from_accession(1000129), Some(ScanPolarity::Negative));
        assert_eq!(
            SignalContinuity::from_accession(1000127),
            Some(SignalContinuity::Centroid)
        );
    }
}
