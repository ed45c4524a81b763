//! Clip transform planning and filter-graph construction.
//!
//! Everything here is pure string assembly: the same inputs always produce
//! the same argument fragments. Overlay timing is deliberately NOT expressed
//! here; the overlay frame sequence already encodes per-overlay visibility,
//! so the compositing filter stays enabled for the whole output duration.

use clipforge_models::{
    AspectTarget, BitrateMode, ConversionMode, Dimensions, DualAudioSource, DualLayout,
    ExportSettings, Resolution,
};

/// Default letterbox filler color.
pub const DEFAULT_PAD_COLOR: &str = "white";

/// Fallback bitrate when a (resolution, fps) pair is missing from the table.
pub const FALLBACK_BITRATE_STANDARD_KBPS: u32 = 8000;
/// High-quality fallback bitrate.
pub const FALLBACK_BITRATE_HIGH_KBPS: u32 = 12000;
/// Minimum-size fallback bitrate.
pub const FALLBACK_BITRATE_MIN_KBPS: u32 = 4000;

/// Bitrates for one (resolution, fps) cell.
#[derive(Debug, Clone, Copy)]
pub struct BitrateTier {
    pub standard: u32,
    pub high: u32,
    pub min: u32,
}

/// Recommended bitrates per resolution tier and frame rate, in kbps.
pub const BITRATE_TABLE: &[(Resolution, u32, BitrateTier)] = &[
    (
        Resolution::R1080p,
        30,
        BitrateTier {
            standard: 8000,
            high: 12000,
            min: 4000,
        },
    ),
    (
        Resolution::R1080p,
        60,
        BitrateTier {
            standard: 12000,
            high: 18000,
            min: 6000,
        },
    ),
    (
        Resolution::R720p,
        30,
        BitrateTier {
            standard: 5000,
            high: 7500,
            min: 2500,
        },
    ),
    (
        Resolution::R720p,
        60,
        BitrateTier {
            standard: 7500,
            high: 11000,
            min: 4000,
        },
    ),
    (
        Resolution::R480p,
        30,
        BitrateTier {
            standard: 2500,
            high: 4000,
            min: 1500,
        },
    ),
    (
        Resolution::R480p,
        60,
        BitrateTier {
            standard: 4000,
            high: 6000,
            min: 2000,
        },
    ),
];

/// Resolve the output bitrate for the given settings.
///
/// `Custom` uses the explicit value verbatim, ignoring the table. Other
/// modes look up `(resolution, fps)`; combinations absent from the table
/// fall back to the named constants above, never zero.
pub fn resolve_bitrate_kbps(settings: &ExportSettings) -> u32 {
    if settings.bitrate_mode == BitrateMode::Custom {
        if let Some(kbps) = settings.custom_bitrate_kbps {
            return kbps;
        }
    }

    let tier = BITRATE_TABLE
        .iter()
        .find(|(res, fps, _)| *res == settings.resolution && *fps == settings.fps)
        .map(|(_, _, tier)| *tier);

    match (settings.bitrate_mode, tier) {
        (BitrateMode::High, Some(t)) => t.high,
        (BitrateMode::Min, Some(t)) => t.min,
        (BitrateMode::Standard | BitrateMode::Custom, Some(t)) => t.standard,
        (BitrateMode::High, None) => FALLBACK_BITRATE_HIGH_KBPS,
        (BitrateMode::Min, None) => FALLBACK_BITRATE_MIN_KBPS,
        (BitrateMode::Standard | BitrateMode::Custom, None) => FALLBACK_BITRATE_STANDARD_KBPS,
    }
}

/// Plan the aspect-ratio conversion filter for a source video.
///
/// `Original` passes through (no filter). Otherwise the input height stays
/// fixed and the width becomes `round(input_h * target_ratio)`:
/// - `Letterbox`: fit inside the box, pad the remainder, centered.
/// - `Crop`: fill the box, cutting equally from both sides.
/// - `Stretch`: scale directly into the box, distorting.
pub fn plan_aspect_filter(
    source: Dimensions,
    target: &AspectTarget,
    mode: ConversionMode,
    pad_color: Option<&str>,
) -> Option<String> {
    let AspectTarget::Ratio(ratio) = target else {
        return None;
    };

    let box_h = source.height;
    let box_w = (box_h as f64 * ratio.as_f64()).round() as u32;

    Some(match mode {
        ConversionMode::Letterbox => format!(
            "scale={box_w}:{box_h}:force_original_aspect_ratio=decrease,\
             pad={box_w}:{box_h}:(ow-iw)/2:(oh-ih)/2:color={}",
            pad_color.unwrap_or(DEFAULT_PAD_COLOR)
        ),
        ConversionMode::Crop => format!("scale=-2:{box_h},crop={box_w}:{box_h}"),
        ConversionMode::Stretch => format!("scale={box_w}:{box_h}"),
    })
}

/// Build the base video chain: aspect conversion (if any) followed by a
/// scale to the render target, labeled `[base]`.
pub fn base_video_chain(
    source: Dimensions,
    settings: &ExportSettings,
    target: Dimensions,
) -> String {
    let mut parts = Vec::new();
    if let Some(aspect) = plan_aspect_filter(
        source,
        &settings.aspect_target,
        settings.conversion,
        settings.pad_color.as_deref(),
    ) {
        parts.push(aspect);
    }
    parts.push(format!("scale={}:{},setsar=1", target.width, target.height));
    format!("[0:v]{}[base]", parts.join(","))
}

/// Composite the rasterized overlay sequence onto a video stream.
///
/// The enable window spans the entire output: per-overlay timing already
/// lives in the frame content.
pub fn overlay_composite_chain(
    base_label: &str,
    overlay_input: usize,
    duration_secs: f64,
    out_label: &str,
) -> String {
    format!(
        "[{base_label}][{overlay_input}:v]overlay=0:0:format=auto:\
         enable='between(t,0,{duration_secs:.3})'[{out_label}]"
    )
}

/// Scale-and-pad one pane of a dual layout.
fn pane_chain(input_label: &str, pane: Dimensions, lead_in_secs: f64, out_label: &str) -> String {
    let mut parts = Vec::new();
    if lead_in_secs > 0.0 {
        parts.push(format!(
            "tpad=start_duration={lead_in_secs:.3}:color=black"
        ));
    }
    parts.push(format!(
        "scale={w}:{h}:force_original_aspect_ratio=decrease,\
         pad={w}:{h}:(ow-iw)/2:(oh-ih)/2",
        w = pane.width,
        h = pane.height
    ));
    format!("[{input_label}]{}[{out_label}]", parts.join(","))
}

/// Build the dual-video stacking chains.
///
/// Splits the render target into two equal panes (top/bottom for vertical,
/// left/right for horizontal), fits each stream into its pane, and stacks.
/// `lead_in_secs` pads the secondary with black when its offset places it
/// after the trimmed output start.
pub fn dual_stack_chains(
    primary_label: &str,
    dual_input: usize,
    layout: DualLayout,
    target: Dimensions,
    lead_in_secs: f64,
    out_label: &str,
) -> String {
    let (pane, stack) = match layout {
        DualLayout::Vertical => (
            Dimensions::new(target.width, target.height / 2),
            "vstack=inputs=2",
        ),
        DualLayout::Horizontal => (
            Dimensions::new(target.width / 2, target.height),
            "hstack=inputs=2",
        ),
    };

    let first = pane_chain(primary_label, pane, 0.0, "pane_a");
    let second = pane_chain(&format!("{dual_input}:v"), pane, lead_in_secs, "pane_b");
    format!("{first};{second};[pane_a][pane_b]{stack}[{out_label}]")
}

/// One source feeding the audio mix.
#[derive(Debug, Clone)]
pub struct AudioMixInput {
    /// Input index of the stream.
    pub input: usize,
    /// Volume multiplier in 0..2.
    pub volume: f32,
    /// Delay before the stream enters the mix, in milliseconds.
    pub delay_ms: u64,
    /// Clip the stream to this many seconds, when set.
    pub trim_secs: Option<f64>,
}

/// Build the audio mix graph, labeled `[aout]`.
///
/// Every source gets its own trim/delay/volume chain; more than one source
/// is folded through `amix`. Returns `None` when there is nothing to mix.
pub fn audio_mix_chains(inputs: &[AudioMixInput]) -> Option<String> {
    if inputs.is_empty() {
        return None;
    }

    let mut chains = Vec::new();
    let mut labels = Vec::new();

    for (n, src) in inputs.iter().enumerate() {
        let mut parts = Vec::new();
        if let Some(trim) = src.trim_secs {
            parts.push(format!("atrim=0:{trim:.3}"));
            parts.push("asetpts=PTS-STARTPTS".to_string());
        }
        if src.delay_ms > 0 {
            parts.push(format!("adelay={0}|{0}", src.delay_ms));
        }
        parts.push(format!("volume={:.2}", src.volume));

        let label = format!("mix{n}");
        chains.push(format!("[{}:a]{}[{label}]", src.input, parts.join(",")));
        labels.push(format!("[{label}]"));
    }

    if labels.len() == 1 {
        // Single source: relabel its chain directly as the output.
        return chains.pop().map(|only| only.replace("[mix0]", "[aout]"));
    }

    chains.push(format!(
        "{}amix=inputs={}:duration=first:dropout_transition=0[aout]",
        labels.concat(),
        labels.len()
    ));
    Some(chains.join(";"))
}

/// Which audio streams a dual export keeps, as mix inputs.
pub fn dual_audio_inputs(
    source: DualAudioSource,
    dual_input: usize,
    dual_volume: f32,
    dual_delay_ms: u64,
) -> Vec<AudioMixInput> {
    let primary = AudioMixInput {
        input: 0,
        volume: 1.0,
        delay_ms: 0,
        trim_secs: None,
    };
    let secondary = AudioMixInput {
        input: dual_input,
        volume: dual_volume,
        delay_ms: dual_delay_ms,
        trim_secs: None,
    };

    match source {
        DualAudioSource::Primary => vec![primary],
        DualAudioSource::Secondary => vec![secondary],
        DualAudioSource::Mix => vec![primary, secondary],
    }
}
