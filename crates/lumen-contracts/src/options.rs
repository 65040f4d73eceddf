use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub const DEFAULT_MODEL: &str = "nai-diffusion-4-5-full";
pub const DEFAULT_WIDTH: u32 = 832;
pub const DEFAULT_HEIGHT: u32 = 1216;
pub const DEFAULT_STEPS: u32 = 28;
pub const DEFAULT_SCALE: f64 = 6.0;
pub const DEFAULT_SAMPLER: &str = "k_euler_ancestral";
pub const DEFAULT_NOISE_SCHEDULE: &str = "karras";

/// Wire value of the request version tag carried in every generation
/// payload.
pub const PARAMS_VERSION: u64 = 3;

/// Pixel area above which the dynamic high-resolution sampler variant is
/// switched on automatically (absent an explicit override). One megapixel
/// in the 1024x1024 sense; the default 832x1216 canvas sits just below it.
pub const HIGH_RES_AREA_THRESHOLD: u64 = 1024 * 1024;

/// Remote action discriminator for the image-generation endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Generate,
    Img2Img,
    Infill,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Generate => "generate",
            ActionKind::Img2Img => "img2img",
            ActionKind::Infill => "infill",
        }
    }
}

/// Every user-supplied and defaulted knob for one invocation, resolved at
/// construction time. Numeric fields are typed, so a non-finite value can
/// never reach payload assembly; anything optional stays `None` rather
/// than carrying a sentinel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestOptions {
    pub prompt: String,
    #[serde(default)]
    pub negative_prompt: String,
    pub model: String,
    pub width: u32,
    pub height: u32,
    pub seed: Option<u32>,
    pub steps: u32,
    pub scale: f64,
    pub cfg_rescale: f64,
    pub sampler: String,
    pub noise_schedule: String,
    /// Explicit base high-resolution sampler override.
    pub smea: Option<bool>,
    /// Explicit dynamic high-resolution sampler override.
    pub smea_dyn: Option<bool>,
    /// When true and no override is set, large canvases enable the dynamic
    /// variant on their own.
    pub auto_smea: bool,
    pub out_dir: PathBuf,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            negative_prompt: String::new(),
            model: DEFAULT_MODEL.to_string(),
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            seed: None,
            steps: DEFAULT_STEPS,
            scale: DEFAULT_SCALE,
            cfg_rescale: 0.0,
            sampler: DEFAULT_SAMPLER.to_string(),
            noise_schedule: DEFAULT_NOISE_SCHEDULE.to_string(),
            smea: None,
            smea_dyn: None,
            auto_smea: true,
            out_dir: PathBuf::from("output"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{RequestOptions, DEFAULT_HEIGHT, DEFAULT_WIDTH, HIGH_RES_AREA_THRESHOLD};

    #[test]
    fn default_canvas_sits_below_the_high_res_threshold() {
        let default_area = u64::from(DEFAULT_WIDTH) * u64::from(DEFAULT_HEIGHT);
        assert!(default_area <= HIGH_RES_AREA_THRESHOLD);
        // The large square canvas is the smallest one that crosses it.
        assert!(1472u64 * 1472 > HIGH_RES_AREA_THRESHOLD);
    }

    #[test]
    fn defaults_match_the_documented_grid() {
        let options = RequestOptions::default();
        assert_eq!(options.width, 832);
        assert_eq!(options.height, 1216);
        assert_eq!(options.steps, 28);
        assert_eq!(options.sampler, "k_euler_ancestral");
        assert!(options.auto_smea);
        assert!(options.seed.is_none());
    }
}
