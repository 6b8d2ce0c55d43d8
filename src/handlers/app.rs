use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Result};
use tracing::{info, warn};

use crate::config::{Config, HELP_TEXT};
use crate::download::save_generated_image;
use crate::handlers::commands::{parse_command, Command, DownloadTarget, ParseError};
use crate::handlers::render::{
    render_credential_confirmation, render_credential_entry, render_gallery, render_intake_report,
    render_options, render_reference_list, render_settings, render_step,
};
use crate::prompt::{default_prompt, GenerationSettings, StyleField};
use crate::state::{Step, MAX_REFERENCE_IMAGES};
use crate::training::{TrainingProgress, TrainingRun};
use crate::utils::logging::{read_recent_log_lines, APP_LOG_BASE_NAME};
use crate::utils::timing::{complete_command_timer, start_command_timer};
use crate::wizard::{Surface, Wizard, WizardError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub flow: Flow,
}

impl Reply {
    fn text(text: impl Into<String>) -> Self {
        Reply {
            text: text.into(),
            flow: Flow::Continue,
        }
    }

    fn quit() -> Self {
        Reply {
            text: "Goodbye.".to_string(),
            flow: Flow::Quit,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainingOutcome {
    Completed,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct AppSettings {
    pub logs_dir: PathBuf,
    pub download_dir: PathBuf,
    pub training_tick: Duration,
    pub training_completion_delay: Duration,
}

impl AppSettings {
    pub fn from_config(config: &Config) -> Self {
        AppSettings {
            logs_dir: config.logs_dir.clone(),
            download_dir: config.download_dir.clone(),
            training_tick: config.training_tick(),
            training_completion_delay: config.training_completion_delay(),
        }
    }
}

/// Terminal front end: turns input lines into wizard operations and text.
pub struct App {
    wizard: Wizard,
    settings: AppSettings,
    generation: GenerationSettings,
    pending_credential: Option<String>,
}

impl App {
    pub fn new(wizard: Wizard, settings: AppSettings) -> Self {
        App {
            wizard,
            settings,
            generation: GenerationSettings::default(),
            pending_credential: None,
        }
    }

    pub fn wizard(&self) -> &Wizard {
        &self.wizard
    }

    pub fn needs_training(&self) -> bool {
        self.wizard.surface() == Surface::Wizard && self.wizard.step() == Step::Training
    }

    pub fn screen(&self) -> String {
        match self.wizard.surface() {
            Surface::CredentialEntry if self.pending_credential.is_some() => {
                render_credential_confirmation()
            }
            Surface::CredentialEntry => render_credential_entry(),
            Surface::Wizard => render_step(self.wizard.session(), &self.generation),
        }
    }

    pub fn prompt_label(&self) -> &'static str {
        match (self.wizard.surface(), self.pending_credential.is_some()) {
            (Surface::CredentialEntry, false) => "api key> ",
            (Surface::CredentialEntry, true) => "agree> ",
            (Surface::Wizard, _) => match self.wizard.step() {
                Step::Concept => "concept> ",
                Step::Upload => "upload> ",
                Step::Training => "training> ",
                Step::Prompting => "prompt> ",
            },
        }
    }

    pub async fn handle_line(&mut self, line: &str) -> Reply {
        if self.wizard.surface() == Surface::CredentialEntry {
            return self.handle_credential_line(line);
        }

        let command = match parse_command(line) {
            Ok(command) => command,
            Err(ParseError::Empty) => return Reply::text(""),
            Err(err) => return Reply::text(err.to_string()),
        };

        let step = self.wizard.step();
        let mut timer = start_command_timer(command.name(), step.title(), line);
        let result = self.dispatch(command).await;
        match &result {
            Ok(_) => complete_command_timer(&mut timer, "success", None),
            Err(err) => complete_command_timer(&mut timer, "error", Some(err.to_string())),
        }

        match result {
            Ok(reply) => reply,
            Err(err) => {
                warn!("Command failed on {}: {}", step, err);
                self.wizard.dismiss_error();
                let mut text = format!("Error: {err}");
                if self.wizard.surface() == Surface::CredentialEntry {
                    text.push_str("\n\n");
                    text.push_str(&render_credential_entry());
                }
                Reply::text(text)
            }
        }
    }

    fn handle_credential_line(&mut self, line: &str) -> Reply {
        let line = line.trim();
        if let Some(credential) = self.pending_credential.take() {
            let agreed = matches!(line.to_lowercase().as_str(), "agree" | "yes" | "y");
            let mut timer = start_command_timer("credential", "credential entry", "");
            return match self.wizard.submit_credential(&credential, agreed) {
                Ok(()) => {
                    complete_command_timer(&mut timer, "success", None);
                    info!("API credential saved");
                    Reply::text(format!("API key saved.\n\n{}", self.screen()))
                }
                Err(err) => {
                    complete_command_timer(&mut timer, "rejected", Some(err.to_string()));
                    self.wizard.dismiss_error();
                    Reply::text(format!("{err}\n\n{}", render_credential_entry()))
                }
            };
        }

        match line.to_lowercase().as_str() {
            "" => Reply::text(render_credential_entry()),
            "quit" | "exit" => Reply::quit(),
            "help" => Reply::text(render_credential_entry()),
            _ => {
                self.pending_credential = Some(line.to_string());
                Reply::text(render_credential_confirmation())
            }
        }
    }

    async fn dispatch(&mut self, command: Command) -> Result<Reply, WizardError> {
        match command {
            Command::Help => Ok(Reply::text(HELP_TEXT)),
            Command::Quit => Ok(Reply::quit()),
            Command::Reset => {
                self.wizard.reset();
                self.generation = GenerationSettings::default();
                Ok(Reply::text(format!("Started over.\n\n{}", self.screen())))
            }
            Command::ChangeKey => {
                self.wizard.change_credential()?;
                self.generation = GenerationSettings::default();
                Ok(Reply::text(format!(
                    "Stored API key removed.\n\n{}",
                    self.screen()
                )))
            }
            Command::Logs(lines) => Ok(Reply::text(self.log_tail(lines))),
            Command::Description(text) => {
                self.wizard.set_description(&text)?;
                Ok(Reply::text("Description saved."))
            }
            Command::Trigger(word) => {
                self.wizard.set_trigger_word(&word)?;
                Ok(Reply::text(format!("Trigger word set to \"{}\".", word.trim())))
            }
            Command::Next => self.next().await,
            Command::Add(paths) => {
                let report = self.wizard.add_files(&paths).await?;
                let total = self.wizard.session().reference_images.len();
                Ok(Reply::text(render_intake_report(
                    &report,
                    total,
                    MAX_REFERENCE_IMAGES,
                )))
            }
            Command::Remove(id) => {
                if self.wizard.remove_image(&id)? {
                    Ok(Reply::text(format!("Removed {id}.")))
                } else {
                    Ok(Reply::text(format!("No reference image with id {id}.")))
                }
            }
            Command::List => {
                let images = &self.wizard.session().reference_images;
                Ok(Reply::text(render_reference_list(images)))
            }
            Command::Prompt(text) => {
                self.require_prompting()?;
                self.generation.prompt = text;
                Ok(Reply::text(render_settings(&self.generation)))
            }
            Command::Options(field) => {
                self.require_prompting()?;
                let field = match field {
                    Some(field) => Some(StyleField::parse(&field).ok_or_else(|| {
                        WizardError::Validation(format!(
                            "Unknown style field '{field}'. Use one of: type, framing, camera, lens, pose, expression."
                        ))
                    })?),
                    None => None,
                };
                Ok(Reply::text(render_options(field, &self.generation)))
            }
            Command::Set { field, option } => {
                self.require_prompting()?;
                let chosen = self
                    .generation
                    .select(&field, &option)
                    .map_err(|err| WizardError::Validation(err.to_string()))?;
                Ok(Reply::text(format!("Selected: {}", chosen.name)))
            }
            Command::Generate(prompt) => {
                self.require_prompting()?;
                if let Some(prompt) = prompt {
                    self.generation.prompt = prompt;
                }
                let image = self.wizard.generate(&self.generation).await?;
                Ok(Reply::text(format!(
                    "Generated {} ({}). Use `download 1` to save it.",
                    image.id, image.mime_type
                )))
            }
            Command::Gallery => {
                self.require_prompting()?;
                Ok(Reply::text(render_gallery(
                    &self.wizard.session().generated_images,
                )))
            }
            Command::Download { target, dir } => self.download(target, dir).await,
        }
    }

    fn require_prompting(&self) -> Result<(), WizardError> {
        if self.wizard.step() == Step::Prompting {
            Ok(())
        } else {
            Err(WizardError::Validation(format!(
                "That command is available once training has finished (currently on {}).",
                self.wizard.step()
            )))
        }
    }

    async fn next(&mut self) -> Result<Reply, WizardError> {
        match self.wizard.step() {
            Step::Concept => self.wizard.proceed_to_upload()?,
            Step::Upload => self.wizard.proceed_to_training()?,
            Step::Training => {
                return Ok(Reply::text("Training is already running."));
            }
            Step::Prompting => {
                return Err(WizardError::Validation(
                    "This is the last step. Use `reset` to start a new character.".to_string(),
                ));
            }
        }
        Ok(Reply::text(self.screen()))
    }

    async fn download(
        &mut self,
        target: DownloadTarget,
        dir: Option<PathBuf>,
    ) -> Result<Reply, WizardError> {
        self.require_prompting()?;
        let gallery = &self.wizard.session().generated_images;
        let image = match &target {
            DownloadTarget::Index(index) => gallery.get(index - 1),
            DownloadTarget::Id(id) => gallery.iter().find(|image| &image.id == id),
        }
        .ok_or_else(|| WizardError::Validation("No generated image matches that.".to_string()))?;

        let dir = dir.unwrap_or_else(|| self.settings.download_dir.clone());
        let path = save_generated_image(image, &dir).await?;
        Ok(Reply::text(format!("Saved {}", path.display())))
    }

    fn log_tail(&self, lines: usize) -> String {
        match read_recent_log_lines(&self.settings.logs_dir, APP_LOG_BASE_NAME, lines) {
            Ok(Some(tail)) if !tail.lines.is_empty() => {
                format!("{}:\n{}", tail.path.display(), tail.lines.join("\n"))
            }
            Ok(_) => "No log lines yet.".to_string(),
            Err(err) => format!("Failed to read logs: {err}"),
        }
    }

    /// Runs the simulated training for the current session. `cancel` resolving
    /// first (Ctrl-C) abandons the run and starts over.
    pub async fn run_training<C, P>(&mut self, cancel: C, mut on_progress: P) -> Result<TrainingOutcome>
    where
        C: Future<Output = ()>,
        P: FnMut(&TrainingProgress),
    {
        if !self.needs_training() {
            return Err(anyhow!("No training is pending"));
        }

        let mut run = TrainingRun::start(
            self.settings.training_tick,
            self.settings.training_completion_delay,
        );
        let mut progress = run.progress();
        let mut last_reported = *progress.borrow_and_update();
        on_progress(&last_reported);

        let completion = {
            let completed = run.completed();
            tokio::pin!(completed);
            tokio::pin!(cancel);
            loop {
                tokio::select! {
                    biased;
                    _ = &mut cancel => break None,
                    token = &mut completed => break Some(token),
                    Ok(()) = progress.changed() => {
                        last_reported = *progress.borrow_and_update();
                        on_progress(&last_reported);
                    }
                }
            }
        };

        match completion {
            Some(Some(token)) => {
                let latest = *progress.borrow();
                if latest != last_reported {
                    on_progress(&latest);
                }
                self.wizard.complete_training(token)?;
                let trigger = self.wizard.session().trigger_word.clone();
                self.generation = GenerationSettings::with_prompt(&default_prompt(&trigger));
                Ok(TrainingOutcome::Completed)
            }
            Some(None) => Err(anyhow!("Training ended without signalling completion")),
            None => {
                run.cancel();
                info!("Training cancelled; starting over");
                self.wizard.reset();
                self.generation = GenerationSettings::default();
                Ok(TrainingOutcome::Cancelled)
            }
        }
    }
}
