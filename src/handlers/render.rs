use crate::config::CREDENTIAL_CONSENT_TEXT;
use crate::intake::IntakeReport;
use crate::prompt::{GenerationSettings, StyleField, UNSPECIFIED};
use crate::state::{GeneratedImage, ReferenceImage, Session, StepView};
use crate::training::TrainingProgress;

const PROGRESS_BAR_WIDTH: usize = 30;
const PROMPT_PREVIEW_CHARS: usize = 60;

fn preview(text: &str, max_chars: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

fn or_placeholder(value: &str) -> &str {
    if value.is_empty() {
        "(not set)"
    } else {
        value
    }
}

pub fn render_credential_entry() -> String {
    [
        "Welcome to NanaTwin.",
        "Paste your Gemini API key to get started. You can create one in Google AI Studio.",
        "",
        CREDENTIAL_CONSENT_TEXT,
    ]
    .join("\n")
}

pub fn render_credential_confirmation() -> String {
    format!("{CREDENTIAL_CONSENT_TEXT}\nType `agree` to save the key, or anything else to cancel.")
}

pub fn render_reference_list(images: &[ReferenceImage]) -> String {
    if images.is_empty() {
        return "No reference images yet.".to_string();
    }
    images
        .iter()
        .enumerate()
        .map(|(index, image)| format!("  {:>2}. {} ({})", index + 1, image.id, image.mime_type))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_gallery(images: &[GeneratedImage]) -> String {
    if images.is_empty() {
        return "No images generated yet.".to_string();
    }
    images
        .iter()
        .enumerate()
        .map(|(index, image)| {
            format!(
                "  {:>2}. {} \"{}\"",
                index + 1,
                image.id,
                preview(&image.prompt, PROMPT_PREVIEW_CHARS)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_settings(settings: &GenerationSettings) -> String {
    let mut lines = vec![format!("Prompt: {}", or_placeholder(&settings.prompt))];
    for field in StyleField::ALL {
        let value = settings.get(field);
        if value != UNSPECIFIED {
            lines.push(format!("  {field}: {value}"));
        }
    }
    lines.join("\n")
}

pub fn render_options(field: Option<StyleField>, settings: &GenerationSettings) -> String {
    let fields: Vec<StyleField> = match field {
        Some(field) => vec![field],
        None => StyleField::ALL.to_vec(),
    };

    let mut sections = Vec::new();
    for field in fields {
        let selected = settings.get(field);
        let mut lines = vec![format!("{field} (set {} <id>):", field.key())];
        for option in field.options() {
            let marker = if option.name == selected { "*" } else { " " };
            lines.push(format!("  {marker} {:<16} {}", option.id, option.name));
        }
        sections.push(lines.join("\n"));
    }
    sections.join("\n\n")
}

pub fn render_intake_report(report: &IntakeReport, total: usize, max: usize) -> String {
    let mut lines = vec![format!(
        "Added {} image(s). {total}/{max} reference images.",
        report.accepted.len()
    )];
    for skipped in &report.skipped {
        lines.push(format!("  skipped: {skipped}"));
    }
    if report.dropped > 0 {
        lines.push(format!(
            "  {} file(s) ignored: the limit is {max} images.",
            report.dropped
        ));
    }
    lines.join("\n")
}

pub fn render_progress(progress: &TrainingProgress) -> String {
    let filled = PROGRESS_BAR_WIDTH * usize::from(progress.percent) / 100;
    format!(
        "[{}{}] {:>3}% {}",
        "#".repeat(filled),
        ".".repeat(PROGRESS_BAR_WIDTH - filled),
        progress.percent,
        progress.message
    )
}

pub fn render_step(session: &Session, settings: &GenerationSettings) -> String {
    let mut out = format!("== {} ==\n", session.step);
    match session.view() {
        StepView::Concept {
            description,
            trigger_word,
        } => {
            out.push_str(&format!("Description: {}\n", or_placeholder(description)));
            out.push_str(&format!("Trigger word: {}\n", or_placeholder(trigger_word)));
            out.push_str("Use `description <text>` and `trigger <word>`, then `next`.");
        }
        StepView::Upload { images, min, max } => {
            out.push_str(&format!(
                "Reference images: {}/{max} (at least {min} needed)\n",
                images.len()
            ));
            out.push_str(&render_reference_list(images));
            out.push_str("\nUse `add <path>...` and `remove <id>`, then `next` to start training.");
        }
        StepView::Training => {
            out.push_str("Training your character model. Press Ctrl-C to cancel.");
        }
        StepView::Prompting {
            trigger_word,
            generated,
            is_loading,
        } => {
            out.push_str(&format!(
                "Use the trigger word \"{trigger_word}\" in your prompt to refer to your character.\n"
            ));
            out.push_str(&render_settings(settings));
            out.push('\n');
            if is_loading {
                out.push_str("Generating...\n");
            }
            out.push_str(&format!("Gallery: {} image(s)\n", generated.len()));
            out.push_str("Use `prompt`, `options`, `set`, then `generate`.");
        }
    }
    if let Some(error) = &session.error {
        out.push_str(&format!("\nError: {error}"));
    }
    out
}
