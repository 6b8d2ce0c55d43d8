use std::fmt;

pub const MIN_REFERENCE_IMAGES: usize = 5;
pub const MAX_REFERENCE_IMAGES: usize = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Concept,
    Upload,
    Training,
    Prompting,
}

impl Step {
    pub fn number(self) -> usize {
        match self {
            Step::Concept => 1,
            Step::Upload => 2,
            Step::Training => 3,
            Step::Prompting => 4,
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Step::Concept => "Define Your Character",
            Step::Upload => "Upload Your Training Images",
            Step::Training => "Training in Progress",
            Step::Prompting => "Test Your Character Model",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Step {}/4: {}", self.number(), self.title())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceImage {
    pub id: String,
    /// Base64 payload, without a `data:` prefix.
    pub data: String,
    pub mime_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub id: String,
    pub data: String,
    pub mime_type: String,
    /// The user's prompt, before composition.
    pub prompt: String,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub step: Step,
    pub description: String,
    pub trigger_word: String,
    pub reference_images: Vec<ReferenceImage>,
    pub generated_images: Vec<GeneratedImage>,
    pub is_loading: bool,
    pub error: Option<String>,
}

impl Default for Session {
    fn default() -> Self {
        Session {
            step: Step::Concept,
            description: String::new(),
            trigger_word: String::new(),
            reference_images: Vec::new(),
            generated_images: Vec::new(),
            is_loading: false,
            error: None,
        }
    }
}

impl Session {
    pub fn remaining_capacity(&self) -> usize {
        MAX_REFERENCE_IMAGES.saturating_sub(self.reference_images.len())
    }

    pub fn view(&self) -> StepView<'_> {
        match self.step {
            Step::Concept => StepView::Concept {
                description: &self.description,
                trigger_word: &self.trigger_word,
            },
            Step::Upload => StepView::Upload {
                images: &self.reference_images,
                min: MIN_REFERENCE_IMAGES,
                max: MAX_REFERENCE_IMAGES,
            },
            Step::Training => StepView::Training,
            Step::Prompting => StepView::Prompting {
                trigger_word: &self.trigger_word,
                generated: &self.generated_images,
                is_loading: self.is_loading,
            },
        }
    }
}

/// What each step's screen needs from the session.
#[derive(Debug, Clone, Copy)]
pub enum StepView<'a> {
    Concept {
        description: &'a str,
        trigger_word: &'a str,
    },
    Upload {
        images: &'a [ReferenceImage],
        min: usize,
        max: usize,
    },
    Training,
    Prompting {
        trigger_word: &'a str,
        generated: &'a [GeneratedImage],
        is_loading: bool,
    },
}
