use serde::{Deserialize, Serialize};

/// Configuración de filtros que se envía al nodo.
///
/// Los campos ausentes no se serializan; un `Filters::default()` limpia los
/// filtros del lado del nodo.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Filters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub equalizer: Option<Vec<EqualizerBand>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub karaoke: Option<Karaoke>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timescale: Option<Timescale>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tremolo: Option<Tremolo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vibrato: Option<Vibrato>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rotation: Option<Rotation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distortion: Option<Distortion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_mix: Option<ChannelMix>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub low_pass: Option<LowPass>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EqualizerBand {
    pub band: u8,
    pub gain: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Karaoke {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mono_level: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_band: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_width: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Timescale {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pitch: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Tremolo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depth: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Vibrato {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depth: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rotation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rotation_hz: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Distortion {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sin_offset: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sin_scale: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cos_offset: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cos_scale: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tan_offset: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tan_scale: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelMix {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub left_to_left: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub left_to_right: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub right_to_left: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub right_to_right: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LowPass {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub smoothing: Option<f64>,
}

/// Presets de filtros disponibles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterPreset {
    Bass,
    Pop,
    Soft,
    TrebleBass,
    Television,
    Nightcore,
    Vaporwave,
    Daycore,
    DoubleTime,
    SlowMotion,
    EightD,
    Tremolo,
    Vibrato,
    Chipmunk,
    DarthVader,
}

impl FilterPreset {
    /// Construye la configuración de filtros del preset
    pub fn filters(self) -> Filters {
        match self {
            FilterPreset::Bass => equalizer(&[
                0.1, 0.1, 0.05, 0.05, -0.05, -0.05, 0.0, -0.05, -0.05, 0.0, 0.05, 0.05, 0.1, 0.1,
            ]),
            FilterPreset::Pop => equalizer(&[
                0.65, 0.45, -0.45, -0.65, -0.35, 0.45, 0.55, 0.6, 0.6, 0.6, 0.0, 0.0, 0.0, 0.0,
            ]),
            FilterPreset::Soft => equalizer(&[
                0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, -0.25, -0.25, -0.25, -0.25, -0.25, -0.25,
            ]),
            FilterPreset::TrebleBass => equalizer(&[
                0.6, 0.67, 0.67, 0.0, -0.5, 0.15, -0.45, 0.23, 0.35, 0.45, 0.55, 0.6, 0.55, 0.0,
            ]),
            FilterPreset::Television => equalizer(&[
                0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.65, 0.65, 0.65, 0.65, 0.65, 0.65, 0.65,
            ]),
            FilterPreset::Nightcore => timescale(Some(1.165), Some(1.125), Some(1.05)),
            FilterPreset::Vaporwave => Filters {
                timescale: Some(Timescale {
                    pitch: Some(0.55),
                    ..Default::default()
                }),
                ..equalizer(&[
                    0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.15, 0.15, 0.15, 0.15, 0.15, 0.15,
                ])
            },
            FilterPreset::Daycore => Filters {
                timescale: Some(Timescale {
                    speed: None,
                    pitch: Some(0.63),
                    rate: Some(1.05),
                }),
                ..FilterPreset::Soft.filters()
            },
            FilterPreset::DoubleTime => timescale(Some(1.165), None, None),
            FilterPreset::SlowMotion => timescale(Some(0.5), Some(1.0), Some(0.8)),
            FilterPreset::EightD => Filters {
                rotation: Some(Rotation {
                    rotation_hz: Some(0.2),
                }),
                ..Default::default()
            },
            FilterPreset::Tremolo => Filters {
                tremolo: Some(Tremolo {
                    frequency: Some(4.0),
                    depth: Some(0.75),
                }),
                ..Default::default()
            },
            FilterPreset::Vibrato => Filters {
                vibrato: Some(Vibrato {
                    frequency: Some(4.0),
                    depth: Some(0.75),
                }),
                ..Default::default()
            },
            FilterPreset::Chipmunk => timescale(Some(1.05), Some(1.35), Some(1.25)),
            FilterPreset::DarthVader => timescale(Some(0.975), Some(0.5), Some(0.8)),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            FilterPreset::Bass => "bass",
            FilterPreset::Pop => "pop",
            FilterPreset::Soft => "soft",
            FilterPreset::TrebleBass => "treblebass",
            FilterPreset::Television => "television",
            FilterPreset::Nightcore => "nightcore",
            FilterPreset::Vaporwave => "vaporwave",
            FilterPreset::Daycore => "daycore",
            FilterPreset::DoubleTime => "doubletime",
            FilterPreset::SlowMotion => "slowmotion",
            FilterPreset::EightD => "8d",
            FilterPreset::Tremolo => "tremolo",
            FilterPreset::Vibrato => "vibrato",
            FilterPreset::Chipmunk => "chipmunk",
            FilterPreset::DarthVader => "darthvader",
        }
    }
}

impl From<FilterPreset> for Filters {
    fn from(preset: FilterPreset) -> Self {
        preset.filters()
    }
}

fn equalizer(gains: &[f64]) -> Filters {
    let bands = gains
        .iter()
        .enumerate()
        .map(|(band, &gain)| EqualizerBand {
            band: band as u8,
            gain,
        })
        .collect();

    Filters {
        equalizer: Some(bands),
        ..Default::default()
    }
}

fn timescale(speed: Option<f64>, pitch: Option<f64>, rate: Option<f64>) -> Filters {
    Filters {
        timescale: Some(Timescale { speed, pitch, rate }),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_empty_filters_serialize_to_empty_object() {
        assert_eq!(serde_json::to_value(Filters::default()).unwrap(), json!({}));
    }

    #[test]
    fn test_presets_use_wire_field_names() {
        let value = serde_json::to_value(FilterPreset::EightD.filters()).unwrap();
        assert_eq!(value, json!({ "rotation": { "rotationHz": 0.2 } }));

        let bass = FilterPreset::Bass.filters();
        let bands = bass.equalizer.unwrap();
        assert_eq!(bands.len(), 14);
        assert_eq!(bands[13].band, 13);
    }

    #[test]
    fn test_combined_presets_keep_both_sections() {
        let vaporwave = FilterPreset::Vaporwave.filters();
        assert!(vaporwave.equalizer.is_some());
        assert_eq!(vaporwave.timescale.unwrap().pitch, Some(0.55));
    }
}
