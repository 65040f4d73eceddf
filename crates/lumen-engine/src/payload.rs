use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use lumen_contracts::options::{
    ActionKind, RequestOptions, HIGH_RES_AREA_THRESHOLD, PARAMS_VERSION,
};
use rand::Rng;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::error::{EngineError, Result};
use crate::normalize::NormalizedImage;

pub const MAX_VIBE_REFERENCES: usize = 16;
pub const DEFAULT_VIBE_STRENGTH: f64 = 0.6;
pub const DEFAULT_VIBE_INFORMATION: f64 = 1.0;

/// One precise-reference entry. The wire protocol wants five co-indexed
/// arrays; holding the fields together per item keeps them in lock-step
/// by construction and they are only flattened at serialization.
#[derive(Debug, Clone)]
pub struct PreciseReference {
    pub image: NormalizedImage,
    /// Caption for the reference; falls back to the request prompt.
    pub description: Option<String>,
    pub information_extracted: f64,
    pub strength: f64,
    /// User-facing fidelity, 1 = strongest. The wire carries it inverted
    /// (0 = maximum fidelity), matching the remote contract.
    pub fidelity: f64,
}

#[derive(Debug, Clone)]
pub struct VibeReference {
    pub image: NormalizedImage,
    pub strength: Option<f64>,
    pub information_extracted: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct EnhanceSettings {
    /// Convenience scalar deriving strength and noise when no explicit
    /// override is given.
    pub magnitude: f64,
    pub strength: Option<f64>,
    pub noise: Option<f64>,
    pub upscale: u32,
}

impl Default for EnhanceSettings {
    fn default() -> Self {
        Self {
            magnitude: 1.0,
            strength: None,
            noise: None,
            upscale: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PostprocessTool {
    Upscale { scale: u32 },
    Declutter { level: u32 },
    LineArt,
    Colorize { prompt: String, defry: u32 },
}

impl PostprocessTool {
    pub fn req_type(&self) -> &'static str {
        match self {
            PostprocessTool::Upscale { .. } => "upscale",
            PostprocessTool::Declutter { .. } => "declutter",
            PostprocessTool::LineArt => "lineart",
            PostprocessTool::Colorize { .. } => "colorize",
        }
    }
}

/// Text-to-image, optionally with precise references. Flattens the
/// per-item records into the five parallel director arrays.
pub fn generate_payload(
    options: &RequestOptions,
    references: &[PreciseReference],
) -> Result<Value> {
    require_prompt(options)?;
    let mut parameters = base_parameters(options, options.width, options.height);

    if !references.is_empty() {
        let mut images = Vec::with_capacity(references.len());
        let mut descriptions = Vec::with_capacity(references.len());
        let mut information = Vec::with_capacity(references.len());
        let mut strengths = Vec::with_capacity(references.len());
        let mut secondary_strengths = Vec::with_capacity(references.len());
        for reference in references {
            images.push(Value::String(BASE64.encode(&reference.image.bytes)));
            let caption = reference
                .description
                .clone()
                .unwrap_or_else(|| options.prompt.clone());
            descriptions.push(caption_object(&caption));
            information.push(json!(reference.information_extracted));
            strengths.push(json!(reference.strength));
            secondary_strengths.push(json!(1.0 - reference.fidelity));
        }
        ensure_lock_step(
            &[
                images.len(),
                descriptions.len(),
                information.len(),
                strengths.len(),
                secondary_strengths.len(),
            ],
            "director reference arrays",
        )?;
        parameters.insert("director_reference_images".to_string(), Value::Array(images));
        parameters.insert(
            "director_reference_descriptions".to_string(),
            Value::Array(descriptions),
        );
        parameters.insert(
            "director_reference_information_extracted".to_string(),
            Value::Array(information),
        );
        parameters.insert(
            "director_reference_strength_values".to_string(),
            Value::Array(strengths),
        );
        parameters.insert(
            "director_reference_secondary_strength_values".to_string(),
            Value::Array(secondary_strengths),
        );
    }

    Ok(envelope(options, ActionKind::Generate, parameters))
}

/// Text-to-image with loose stylistic influence from up to sixteen vibe
/// images. Missing per-image scalars default positionally.
pub fn vibe_payload(options: &RequestOptions, vibes: &[VibeReference]) -> Result<Value> {
    require_prompt(options)?;
    let vibes = if vibes.len() > MAX_VIBE_REFERENCES {
        warn!(
            count = vibes.len(),
            "too many vibe references; keeping the first {MAX_VIBE_REFERENCES}"
        );
        &vibes[..MAX_VIBE_REFERENCES]
    } else {
        vibes
    };
    if vibes.is_empty() {
        return Err(EngineError::MissingRequiredField("vibe images"));
    }

    let mut parameters = base_parameters(options, options.width, options.height);
    let mut images = Vec::with_capacity(vibes.len());
    let mut information = Vec::with_capacity(vibes.len());
    let mut strengths = Vec::with_capacity(vibes.len());
    for vibe in vibes {
        images.push(Value::String(BASE64.encode(&vibe.image.bytes)));
        information.push(json!(vibe
            .information_extracted
            .unwrap_or(DEFAULT_VIBE_INFORMATION)));
        strengths.push(json!(vibe.strength.unwrap_or(DEFAULT_VIBE_STRENGTH)));
    }
    ensure_lock_step(
        &[images.len(), information.len(), strengths.len()],
        "vibe reference arrays",
    )?;
    parameters.insert("reference_image_multiple".to_string(), Value::Array(images));
    parameters.insert(
        "reference_information_extracted_multiple".to_string(),
        Value::Array(information),
    );
    parameters.insert(
        "reference_strength_multiple".to_string(),
        Value::Array(strengths),
    );

    Ok(envelope(options, ActionKind::Generate, parameters))
}

/// Image-to-image enhancement. The base geometry comes from the decoded
/// source image, never from the caller's nominal width/height; an upscale
/// multiplier is applied after the base geometry is established.
pub fn enhance_payload(
    options: &RequestOptions,
    source: &NormalizedImage,
    settings: &EnhanceSettings,
) -> Result<Value> {
    require_prompt(options)?;
    let mut width = source.width;
    let mut height = source.height;
    if settings.upscale > 1 {
        width *= settings.upscale;
        height *= settings.upscale;
    }

    // Explicit overrides win field-by-field over the magnitude-derived pair.
    let strength = settings
        .strength
        .unwrap_or_else(|| (settings.magnitude * 0.5).min(1.0));
    let noise = settings
        .noise
        .unwrap_or_else(|| (settings.magnitude * 0.3).min(0.3));
    debug!(strength, noise, width, height, "resolved enhancement settings");

    let mut parameters = base_parameters(options, width, height);
    parameters.insert(
        "image".to_string(),
        Value::String(BASE64.encode(&source.bytes)),
    );
    parameters.insert("strength".to_string(), json!(strength));
    parameters.insert("noise".to_string(), json!(noise));

    Ok(envelope(options, ActionKind::Img2Img, parameters))
}

/// Mask-guided inpainting: source and mask travel as sibling byte fields.
pub fn inpaint_payload(
    options: &RequestOptions,
    source: &NormalizedImage,
    mask: &[u8],
    strength: f64,
) -> Result<Value> {
    require_prompt(options)?;
    if mask.is_empty() {
        return Err(EngineError::MissingRequiredField("mask"));
    }

    let mut parameters = base_parameters(options, source.width, source.height);
    parameters.insert(
        "image".to_string(),
        Value::String(BASE64.encode(&source.bytes)),
    );
    parameters.insert("mask".to_string(), Value::String(BASE64.encode(mask)));
    parameters.insert("strength".to_string(), json!(strength));
    parameters.insert("add_original_image".to_string(), Value::Bool(false));

    Ok(envelope(options, ActionKind::Infill, parameters))
}

/// Post-processing request: a flat body, not the generation envelope.
pub fn postprocess_payload(image: &NormalizedImage, tool: &PostprocessTool) -> Result<Value> {
    let mut body = map_object(json!({
        "image": BASE64.encode(&image.bytes),
        "width": image.width,
        "height": image.height,
        "req_type": tool.req_type(),
    }));
    match tool {
        PostprocessTool::Upscale { scale } => {
            body.insert("scale".to_string(), json!(scale));
        }
        PostprocessTool::Declutter { level } => {
            body.insert("level".to_string(), json!(level));
        }
        PostprocessTool::LineArt => {}
        PostprocessTool::Colorize { prompt, defry } => {
            if prompt.trim().is_empty() {
                return Err(EngineError::MissingRequiredField("prompt"));
            }
            body.insert("prompt".to_string(), json!(prompt));
            body.insert("defry".to_string(), json!(defry));
        }
    }
    Ok(Value::Object(body))
}

/// Seed actually sent: the pinned user value, or a fresh uniform draw
/// from `[0, 2^32)`. Each assembled request gets its own resolution.
pub fn resolve_seed(options: &RequestOptions) -> u64 {
    match options.seed {
        Some(seed) => u64::from(seed),
        None => rand::thread_rng().gen_range(0..(1u64 << 32)),
    }
}

fn base_parameters(options: &RequestOptions, width: u32, height: u32) -> Map<String, Value> {
    let seed = resolve_seed(options);
    let (sm, sm_dyn) = high_res_toggles(options, width, height);
    map_object(json!({
        "params_version": PARAMS_VERSION,
        "width": width,
        "height": height,
        "scale": options.scale,
        "sampler": options.sampler,
        "steps": options.steps,
        "seed": seed,
        "n_samples": 1,
        "sm": sm,
        "sm_dyn": sm_dyn,
        "cfg_rescale": options.cfg_rescale,
        "noise_schedule": options.noise_schedule,
        "negative_prompt": options.negative_prompt,
        "v4_prompt": {
            "caption": {
                "base_caption": options.prompt,
                "char_captions": [],
            },
            "use_coords": false,
            "use_order": true,
        },
        "v4_negative_prompt": {
            "caption": {
                "base_caption": options.negative_prompt,
                "char_captions": [],
            },
        },
    }))
}

/// Derived high-resolution sampler toggles. An explicit override wins;
/// otherwise canvases over the megapixel threshold enable the dynamic
/// variant when auto-selection is on. The dynamic variant implies the
/// base toggle.
fn high_res_toggles(options: &RequestOptions, width: u32, height: u32) -> (bool, bool) {
    if options.smea.is_some() || options.smea_dyn.is_some() {
        let sm_dyn = options.smea_dyn.unwrap_or(false);
        let sm = options.smea.unwrap_or(false) || sm_dyn;
        return (sm, sm_dyn);
    }
    if options.auto_smea && u64::from(width) * u64::from(height) > HIGH_RES_AREA_THRESHOLD {
        return (true, true);
    }
    (false, false)
}

fn envelope(options: &RequestOptions, action: ActionKind, parameters: Map<String, Value>) -> Value {
    json!({
        "input": options.prompt,
        "model": options.model,
        "action": action.as_str(),
        "parameters": parameters,
    })
}

fn caption_object(caption: &str) -> Value {
    json!({
        "caption": {
            "base_caption": caption,
            "char_captions": [],
        },
    })
}

fn require_prompt(options: &RequestOptions) -> Result<()> {
    if options.prompt.trim().is_empty() {
        return Err(EngineError::MissingRequiredField("prompt"));
    }
    Ok(())
}

fn ensure_lock_step(lengths: &[usize], context: &'static str) -> Result<()> {
    if lengths.windows(2).any(|pair| pair[0] != pair[1]) {
        return Err(EngineError::ArrayLengthMismatch { context });
    }
    Ok(())
}

fn map_object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}
