use std::fmt;

use thiserror::Error;

/// Sentinel for a style selection the user left open.
pub const UNSPECIFIED: &str = "Don't specify";

pub const CONSISTENCY_DIRECTIVE: &str =
    "The character's appearance MUST be consistent with the one in the provided images.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StyleOption {
    pub id: &'static str,
    pub name: &'static str,
}

const fn option(id: &'static str, name: &'static str) -> StyleOption {
    StyleOption { id, name }
}

const NONE: StyleOption = option("none", UNSPECIFIED);

pub const PHOTOGRAPHY_TYPE_OPTIONS: [StyleOption; 11] = [
    NONE,
    option("portrait", "Portrait photography - Person in focus"),
    option("editorial", "Editorial fashion - High-end magazine"),
    option("street", "Street photography - Urban, documentary"),
    option("cinematic", "Cinematic portrait - Movie still aesthetic"),
    option("studio", "Studio photography - Controlled, clean"),
    option("film", "Film photography - Grain, analog texture"),
    option("lookbook", "Fashion lookbook - Catalog, clothing focus"),
    option("lifestyle", "Lifestyle photography - Natural, everyday"),
    option("fine-art", "Fine art portrait - Artistic, conceptual"),
    option("commercial", "Commercial photography - Advertising, product"),
];

pub const CAMERA_OPTIONS: [StyleOption; 11] = [
    NONE,
    option("dslr", "DSLR - Professional, versatile"),
    option("cinema", "Cinema camera - RED, ARRI aesthetic"),
    option("medium-format", "Medium format - Hasselblad, ultra high quality"),
    option("35mm", "35mm film camera - Classic analog"),
    option("polaroid", "Polaroid/Instant - Nostalgic, unique colors"),
    option("smartphone", "Smartphone camera - Modern, casual"),
    option("gopro", "GoPro/Action camera - Wide, dynamic"),
    option("drone", "Drone camera - Aerial, unique perspective"),
    option("vintage", "Vintage camera - Retro, heavy grain"),
    option("large-format", "Large format camera - 4x5, ultra detailed"),
];

pub const LENS_OPTIONS: [StyleOption; 11] = [
    NONE,
    option("wide", "Wide angle (16-35mm) - Broad environment"),
    option("standard", "Standard (35-50mm) - Natural vision"),
    option("portrait", "Portrait (85mm) - Flattering compression"),
    option("telephoto", "Telephoto (135-200mm) - Creamy bokeh"),
    option("macro", "Macro lens - Extreme details"),
    option("fisheye", "Fisheye - Creative distortion"),
    option("tilt-shift", "Tilt-shift - Perspective control"),
    option("50mm", "50mm f/1.2 - Shallow depth, dreamy"),
    option("24mm", "24mm f/1.4 - Wide + low light"),
    option("70-200mm", "70-200mm f/2.8 - Versatile pro zoom"),
];

pub const FRAMING_OPTIONS: [StyleOption; 11] = [
    NONE,
    option("extreme-closeup", "Extreme close-up - Eyes, facial details"),
    option("closeup", "Close-up - Full face"),
    option("medium-closeup", "Medium close-up - Head and shoulders"),
    option("medium", "Medium shot - Waist up"),
    option("cowboy", "Cowboy shot - Mid-thigh up"),
    option("full-body", "Full body - Entire body, feet visible"),
    option("wide", "Wide shot - Character + environment"),
    option("over-shoulder", "Over the shoulder - Behind shoulder view"),
    option("dutch", "Dutch angle - Tilted camera, dynamic"),
    option("birds-eye", "Bird's eye view - Overhead view"),
];

pub const POSE_OPTIONS: [StyleOption; 11] = [
    NONE,
    option("standing", "Standing confidently - Strong posture, power"),
    option("walking", "Walking towards camera - Movement, energy"),
    option("sitting", "Sitting casually - Relaxed, accessible"),
    option("leaning", "Leaning against wall - Cool, laid-back"),
    option("hand-pocket", "Hand in pocket - Casual confidence"),
    option("arms-crossed", "Arms crossed - Assertive, serious"),
    option("over-shoulder", "Looking over shoulder - Mysterious, intriguing"),
    option("laughing", "Mid-laugh - Genuine, joyful"),
    option("hair-flip", "Hair flip/movement - Dynamic, editorial"),
    option("hands-frame", "Hands in frame - Interacting, storytelling"),
];

pub const EXPRESSION_OPTIONS: [StyleOption; 11] = [
    NONE,
    option("serious", "Serious/intense gaze - Dramatic, editorial"),
    option("smile", "Genuine smile - Joyful, approachable"),
    option("smirk", "Subtle smirk - Confident, mysterious"),
    option("contemplative", "Contemplative - Thoughtful, introspective"),
    option("fierce", "Fierce/powerful - Strong, determined"),
    option("soft", "Soft/gentle - Delicate, vulnerable"),
    option("playful", "Playful - Fun, energetic"),
    option("neutral", "Neutral/stoic - Minimalist, fashion"),
    option("surprised", "Surprised/candid - Spontaneous, natural"),
    option("melancholic", "Melancholic - Emotional, artistic"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StyleField {
    PhotographyType,
    Framing,
    Camera,
    Lens,
    Pose,
    Expression,
}

impl StyleField {
    pub const ALL: [StyleField; 6] = [
        StyleField::PhotographyType,
        StyleField::Camera,
        StyleField::Lens,
        StyleField::Framing,
        StyleField::Pose,
        StyleField::Expression,
    ];

    pub fn parse(value: &str) -> Option<StyleField> {
        match value.trim().to_ascii_lowercase().as_str() {
            "type" | "photography" | "photography-type" => Some(StyleField::PhotographyType),
            "framing" => Some(StyleField::Framing),
            "camera" => Some(StyleField::Camera),
            "lens" => Some(StyleField::Lens),
            "pose" | "action" | "acting" => Some(StyleField::Pose),
            "expression" => Some(StyleField::Expression),
            _ => None,
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            StyleField::PhotographyType => "type",
            StyleField::Framing => "framing",
            StyleField::Camera => "camera",
            StyleField::Lens => "lens",
            StyleField::Pose => "pose",
            StyleField::Expression => "expression",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            StyleField::PhotographyType => "Types of Photography",
            StyleField::Framing => "Framing",
            StyleField::Camera => "Camera",
            StyleField::Lens => "Lens",
            StyleField::Pose => "Action / Pose",
            StyleField::Expression => "Facial Expression",
        }
    }

    pub fn options(self) -> &'static [StyleOption] {
        match self {
            StyleField::PhotographyType => &PHOTOGRAPHY_TYPE_OPTIONS,
            StyleField::Framing => &FRAMING_OPTIONS,
            StyleField::Camera => &CAMERA_OPTIONS,
            StyleField::Lens => &LENS_OPTIONS,
            StyleField::Pose => &POSE_OPTIONS,
            StyleField::Expression => &EXPRESSION_OPTIONS,
        }
    }

    pub fn find_option(self, id: &str) -> Option<&'static StyleOption> {
        let id = id.trim();
        self.options()
            .iter()
            .find(|option| option.id.eq_ignore_ascii_case(id))
    }
}

impl fmt::Display for StyleField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StyleError {
    #[error("Unknown style field '{0}'. Use one of: type, framing, camera, lens, pose, expression.")]
    UnknownField(String),
    #[error("Unknown {field} option '{id}'. Run `options {key}` to list them.", key = .field.key())]
    UnknownOption { field: StyleField, id: String },
}

/// One generation request's inputs. Each style value holds an option's
/// display name, or [`UNSPECIFIED`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationSettings {
    pub prompt: String,
    pub photography_type: String,
    pub framing: String,
    pub camera: String,
    pub lens: String,
    pub pose: String,
    pub expression: String,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        GenerationSettings::with_prompt("")
    }
}

impl GenerationSettings {
    pub fn with_prompt(prompt: &str) -> Self {
        GenerationSettings {
            prompt: prompt.to_string(),
            photography_type: UNSPECIFIED.to_string(),
            framing: UNSPECIFIED.to_string(),
            camera: UNSPECIFIED.to_string(),
            lens: UNSPECIFIED.to_string(),
            pose: UNSPECIFIED.to_string(),
            expression: UNSPECIFIED.to_string(),
        }
    }

    pub fn get(&self, field: StyleField) -> &str {
        match field {
            StyleField::PhotographyType => &self.photography_type,
            StyleField::Framing => &self.framing,
            StyleField::Camera => &self.camera,
            StyleField::Lens => &self.lens,
            StyleField::Pose => &self.pose,
            StyleField::Expression => &self.expression,
        }
    }

    fn slot(&mut self, field: StyleField) -> &mut String {
        match field {
            StyleField::PhotographyType => &mut self.photography_type,
            StyleField::Framing => &mut self.framing,
            StyleField::Camera => &mut self.camera,
            StyleField::Lens => &mut self.lens,
            StyleField::Pose => &mut self.pose,
            StyleField::Expression => &mut self.expression,
        }
    }

    /// Selects an option by field key and option id, e.g. `("lens", "macro")`.
    pub fn select(&mut self, field: &str, option_id: &str) -> Result<&'static StyleOption, StyleError> {
        let field = StyleField::parse(field)
            .ok_or_else(|| StyleError::UnknownField(field.trim().to_string()))?;
        let option = field
            .find_option(option_id)
            .ok_or_else(|| StyleError::UnknownOption {
                field,
                id: option_id.trim().to_string(),
            })?;
        *self.slot(field) = option.name.to_string();
        Ok(option)
    }
}

fn is_specified(value: &str) -> bool {
    !value.is_empty() && value != UNSPECIFIED
}

/// Builds the instruction text sent alongside the reference images.
pub fn compose(
    prompt: &str,
    trigger_word: &str,
    settings: &GenerationSettings,
    character_description: &str,
) -> String {
    let mut photography_parts = Vec::new();
    if is_specified(&settings.photography_type) {
        photography_parts.push(settings.photography_type.clone());
    }
    if is_specified(&settings.framing) {
        photography_parts.push(settings.framing.clone());
    }
    if is_specified(&settings.camera) {
        photography_parts.push(format!("photo taken with a {}", settings.camera));
    }
    if is_specified(&settings.lens) {
        photography_parts.push(format!("using a {} lens", settings.lens));
    }
    let photography_details = photography_parts.join(", ");

    let mut character_parts = Vec::new();
    if is_specified(&settings.pose) {
        character_parts.push(format!("The character is {}", settings.pose));
    }
    if is_specified(&settings.expression) {
        character_parts.push(format!("with a {} facial expression", settings.expression));
    }
    let character_details = character_parts.join(" ");

    // Plain substring match: a trigger embedded in a longer word is rewritten too.
    let base_prompt = if trigger_word.is_empty() {
        prompt.to_string()
    } else {
        prompt.replace(trigger_word, &format!("a character named {trigger_word}"))
    };

    // No trailing period here; the ". " join below supplies it.
    let character_context = format!("Character concept: {character_description}");

    let segments = [
        character_context,
        photography_details,
        character_details,
        base_prompt,
    ];
    let body = segments
        .iter()
        .filter(|segment| !segment.is_empty())
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(". ");

    format!("{body}. {CONSISTENCY_DIRECTIVE}")
}

pub fn default_prompt(trigger_word: &str) -> String {
    format!("A photo of {trigger_word} sitting in a cafe")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fully_specified() -> GenerationSettings {
        let mut settings = GenerationSettings::with_prompt("kael92 reading");
        settings.select("type", "street").unwrap();
        settings.select("framing", "medium").unwrap();
        settings.select("camera", "35mm").unwrap();
        settings.select("lens", "portrait").unwrap();
        settings.select("pose", "sitting").unwrap();
        settings.select("expression", "smile").unwrap();
        settings
    }

    #[test]
    fn unspecified_settings_leave_only_context_and_prompt() {
        let settings = GenerationSettings::with_prompt("A photo of kael92 in a cafe");
        let instruction = compose(&settings.prompt, "kael92", &settings, "A tall warrior");

        assert_eq!(
            instruction,
            "Character concept: A tall warrior. A photo of a character named kael92 in a cafe. \
             The character's appearance MUST be consistent with the one in the provided images."
        );
        assert!(instruction.ends_with(CONSISTENCY_DIRECTIVE));
        assert!(!instruction.contains("photo taken with"));
        assert!(!instruction.contains("The character is"));
    }

    #[test]
    fn fully_specified_settings_follow_fixed_order() {
        let settings = fully_specified();
        let instruction = compose(&settings.prompt, "kael92", &settings, "A tall warrior");

        assert_eq!(
            instruction,
            "Character concept: A tall warrior. \
             Street photography - Urban, documentary, Medium shot - Waist up, \
             photo taken with a 35mm film camera - Classic analog, \
             using a Portrait (85mm) - Flattering compression lens. \
             The character is Sitting casually - Relaxed, accessible \
             with a Genuine smile - Joyful, approachable facial expression. \
             a character named kael92 reading. \
             The character's appearance MUST be consistent with the one in the provided images."
        );
    }

    #[test]
    fn each_unspecified_field_is_omitted_independently() {
        let full = fully_specified();
        for field in StyleField::ALL {
            let mut settings = full.clone();
            let removed = settings.get(field).to_string();
            settings.select(field.key(), "none").unwrap();

            let instruction = compose(&settings.prompt, "kael92", &settings, "desc");
            assert!(
                !instruction.contains(&removed),
                "{field} should be omitted but found '{removed}'"
            );
            for other in StyleField::ALL.iter().filter(|other| **other != field) {
                assert!(instruction.contains(settings.get(*other)));
            }
        }
    }

    #[test]
    fn compose_is_deterministic() {
        let settings = fully_specified();
        let first = compose(&settings.prompt, "kael92", &settings, "A tall warrior");
        let second = compose(&settings.prompt, "kael92", &settings, "A tall warrior");
        assert_eq!(first, second);
    }

    #[test]
    fn every_trigger_occurrence_is_rewritten_including_inside_words() {
        let settings = GenerationSettings::default();
        let instruction = compose("kael92 meets kael92x", "kael92", &settings, "d");
        assert!(instruction.contains(
            "a character named kael92 meets a character named kael92x"
        ));
    }

    #[test]
    fn empty_trigger_leaves_prompt_untouched() {
        let settings = GenerationSettings::default();
        let instruction = compose("a quiet street", "", &settings, "d");
        assert!(instruction.contains(". a quiet street. "));
    }

    #[test]
    fn empty_prompt_is_dropped_from_segments() {
        let settings = GenerationSettings::default();
        let instruction = compose("", "kael92", &settings, "d");
        assert_eq!(
            instruction,
            format!("Character concept: d. {CONSISTENCY_DIRECTIVE}")
        );
    }

    #[test]
    fn select_rejects_unknown_field_and_option() {
        let mut settings = GenerationSettings::default();
        assert_eq!(
            settings.select("aperture", "f2"),
            Err(StyleError::UnknownField("aperture".to_string()))
        );
        assert!(matches!(
            settings.select("lens", "zoom-zoom"),
            Err(StyleError::UnknownOption { field: StyleField::Lens, .. })
        ));
        assert_eq!(settings.lens, UNSPECIFIED);
    }

    #[test]
    fn every_catalogue_starts_with_the_sentinel() {
        for field in StyleField::ALL {
            let options = field.options();
            assert_eq!(options[0].name, UNSPECIFIED);
            assert_eq!(options.len(), 11);
        }
    }
}
