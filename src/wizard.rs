use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::credentials::CredentialStore;
use crate::intake::{load_reference_images, IntakeReport};
use crate::llm::{GenerationError, ImageGenerator};
use crate::prompt::{compose, GenerationSettings};
use crate::state::{GeneratedImage, Session, Step, MAX_REFERENCE_IMAGES, MIN_REFERENCE_IMAGES};
use crate::training::TrainingComplete;

pub const MISSING_CONCEPT_MESSAGE: &str =
    "Please provide a character description and a trigger word.";
pub const TOO_FEW_IMAGES_MESSAGE: &str = "Please upload at least 5 images for training.";
pub const MISSING_PROMPT_MESSAGE: &str = "Please enter a prompt to generate an image.";
pub const NO_REFERENCES_MESSAGE: &str =
    "Something went wrong, no training images found. Please start over.";
pub const MISSING_CREDENTIAL_MESSAGE: &str = "API Key is not set. Please configure it first.";
pub const REJECTED_CREDENTIAL_MESSAGE: &str =
    "Your API key is not valid. Please check it and try again.";

#[derive(Debug, Error)]
pub enum WizardError {
    #[error("{0}")]
    Validation(String),
    #[error("{REJECTED_CREDENTIAL_MESSAGE}")]
    CredentialRejected,
    #[error(transparent)]
    Generation(GenerationError),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

fn validation(message: &str) -> WizardError {
    WizardError::Validation(message.to_string())
}

/// Which top-level screen the user should see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    CredentialEntry,
    Wizard,
}

pub struct Wizard {
    session: Session,
    credential: Option<String>,
    credentials: Arc<dyn CredentialStore>,
    generator: Arc<dyn ImageGenerator>,
}

impl Wizard {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        generator: Arc<dyn ImageGenerator>,
    ) -> Result<Self, WizardError> {
        let credential = credentials.load()?;
        if credential.is_some() {
            info!("Loaded stored API credential");
        }
        Ok(Wizard {
            session: Session::default(),
            credential,
            credentials,
            generator,
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn step(&self) -> Step {
        self.session.step
    }

    pub fn surface(&self) -> Surface {
        if self.credential.is_some() {
            Surface::Wizard
        } else {
            Surface::CredentialEntry
        }
    }

    fn fail(&mut self, err: WizardError) -> WizardError {
        self.session.error = Some(err.to_string());
        err
    }

    fn require_step(&mut self, step: Step, action: &str) -> Result<(), WizardError> {
        if self.session.step == step {
            return Ok(());
        }
        let message = format!("{action} is only available on {step}.");
        Err(self.fail(WizardError::Validation(message)))
    }

    pub fn dismiss_error(&mut self) {
        self.session.error = None;
    }

    pub fn submit_credential(&mut self, credential: &str, agreed: bool) -> Result<(), WizardError> {
        let credential = credential.trim();
        if credential.is_empty() {
            return Err(self.fail(validation("Please enter your API key.")));
        }
        if !agreed {
            return Err(self.fail(validation(
                "Please confirm you understand how your API key is stored and used.",
            )));
        }
        self.credentials.save(credential)?;
        self.credential = Some(credential.to_string());
        self.session.error = None;
        Ok(())
    }

    /// Forgets the stored credential and starts over.
    pub fn change_credential(&mut self) -> Result<(), WizardError> {
        self.credential = None;
        self.reset();
        self.credentials.clear()?;
        Ok(())
    }

    pub fn reset(&mut self) {
        self.session = Session::default();
        info!("Session reset");
    }

    pub fn set_description(&mut self, description: &str) -> Result<(), WizardError> {
        self.require_step(Step::Concept, "Editing the description")?;
        self.session.description = description.trim().to_string();
        Ok(())
    }

    pub fn set_trigger_word(&mut self, trigger_word: &str) -> Result<(), WizardError> {
        self.require_step(Step::Concept, "Editing the trigger word")?;
        self.session.trigger_word = trigger_word.trim().to_string();
        Ok(())
    }

    pub fn proceed_to_upload(&mut self) -> Result<(), WizardError> {
        self.require_step(Step::Concept, "Continuing to the upload")?;
        if self.session.description.is_empty() || self.session.trigger_word.is_empty() {
            return Err(self.fail(validation(MISSING_CONCEPT_MESSAGE)));
        }
        self.session.error = None;
        self.session.step = Step::Upload;
        Ok(())
    }

    pub async fn add_files(&mut self, paths: &[PathBuf]) -> Result<IntakeReport, WizardError> {
        self.require_step(Step::Upload, "Adding reference images")?;
        let report = load_reference_images(paths, self.session.remaining_capacity()).await;
        self.session
            .reference_images
            .extend(report.accepted.iter().cloned());
        debug_assert!(self.session.reference_images.len() <= MAX_REFERENCE_IMAGES);
        info!(
            accepted = report.accepted.len(),
            skipped = report.skipped.len(),
            dropped = report.dropped,
            total = self.session.reference_images.len(),
            "Reference images added"
        );
        Ok(report)
    }

    /// Returns whether anything was removed.
    pub fn remove_image(&mut self, id: &str) -> Result<bool, WizardError> {
        self.require_step(Step::Upload, "Removing reference images")?;
        let before = self.session.reference_images.len();
        self.session.reference_images.retain(|image| image.id != id);
        Ok(self.session.reference_images.len() != before)
    }

    pub fn proceed_to_training(&mut self) -> Result<(), WizardError> {
        self.require_step(Step::Upload, "Starting training")?;
        let count = self.session.reference_images.len();
        if !(MIN_REFERENCE_IMAGES..=MAX_REFERENCE_IMAGES).contains(&count) {
            return Err(self.fail(validation(TOO_FEW_IMAGES_MESSAGE)));
        }
        self.session.error = None;
        self.session.step = Step::Training;
        Ok(())
    }

    pub fn complete_training(&mut self, _signal: TrainingComplete) -> Result<(), WizardError> {
        self.require_step(Step::Training, "Finishing training")?;
        self.session.error = None;
        self.session.step = Step::Prompting;
        Ok(())
    }

    pub async fn generate(
        &mut self,
        settings: &GenerationSettings,
    ) -> Result<&GeneratedImage, WizardError> {
        self.require_step(Step::Prompting, "Image generation")?;
        if self.session.is_loading {
            return Err(self.fail(validation("An image is already being generated.")));
        }
        let Some(credential) = self.credential.clone() else {
            return Err(self.fail(validation(MISSING_CREDENTIAL_MESSAGE)));
        };
        if settings.prompt.trim().is_empty() {
            return Err(self.fail(validation(MISSING_PROMPT_MESSAGE)));
        }
        if self.session.reference_images.is_empty() {
            return Err(self.fail(validation(NO_REFERENCES_MESSAGE)));
        }

        self.session.is_loading = true;
        self.session.error = None;

        let instruction = compose(
            &settings.prompt,
            &self.session.trigger_word,
            settings,
            &self.session.description,
        );
        let result = self
            .generator
            .generate(&credential, &instruction, &self.session.reference_images)
            .await;
        self.session.is_loading = false;

        match result {
            Ok(image) => {
                let generated = GeneratedImage {
                    id: self.next_generated_id(),
                    data: image.data,
                    mime_type: image.mime_type,
                    prompt: settings.prompt.clone(),
                };
                info!(id = %generated.id, "Generated image added to gallery");
                self.session.generated_images.insert(0, generated);
                Ok(&self.session.generated_images[0])
            }
            Err(err) if err.is_credential_rejection() => {
                warn!("API credential rejected: {}", err);
                self.credential = None;
                self.reset();
                if let Err(clear_err) = self.credentials.clear() {
                    error!("Failed to clear rejected credential: {}", clear_err);
                }
                Err(self.fail(WizardError::CredentialRejected))
            }
            Err(err) => {
                error!("Image generation failed: {}", err);
                Err(self.fail(WizardError::Generation(err)))
            }
        }
    }

    fn next_generated_id(&self) -> String {
        let mut millis = Utc::now().timestamp_millis();
        loop {
            let id = format!("test-{millis}");
            if !self
                .session
                .generated_images
                .iter()
                .any(|image| image.id == id)
            {
                return id;
            }
            millis += 1;
        }
    }
}
