//! Operator tool for admission forms
//!
//! Validates form files, inspects or clears the persisted draft, and
//! submits a filled-in form through the same controller the app uses.
//!
//! Usage:
//!   admissions validate form.json
//!   admissions draft show --store ./drafts
//!   admissions submit form.json --config admissions.json --token $TOKEN

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;

use campus_admissions::attachment::LocalFileSystem;
use campus_admissions::storage::FileStore;
use campus_admissions::{
    AdmissionConfig, AttachmentValidator, DraftStore, FormState, FormStateController,
    HttpTransport, SubmitOutcome, ValidationEngine,
};

#[derive(Parser)]
#[command(name = "admissions", about = "Admission form validation, drafts and submission")]
struct Cli {
    /// JSON config file; defaults apply when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the persisted draft
    #[arg(long, global = true, default_value = "./drafts")]
    store: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a form file and print the result
    Validate { form: PathBuf },

    /// Inspect or remove the saved draft
    Draft {
        #[command(subcommand)]
        action: DraftAction,
    },

    /// Submit a form file to the admissions API
    Submit {
        form: PathBuf,

        /// Bearer token of the signed-in applicant
        #[arg(long)]
        token: Option<String>,

        /// Applicant id stamped onto the submission
        #[arg(long)]
        applicant: Option<String>,
    },
}

#[derive(Subcommand)]
enum DraftAction {
    Show,
    Clear,
}

fn read_form(path: &Path) -> Result<FormState> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read form file: {}", path.display()))?;
    let value: Value = serde_json::from_str(&raw)
        .with_context(|| format!("Form file is not valid JSON: {}", path.display()))?;
    Ok(FormState::from_value(value))
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn draft_store(cli: &Cli, config: &AdmissionConfig) -> Result<DraftStore> {
    let store = FileStore::new(&cli.store)
        .await
        .with_context(|| format!("Failed to open draft store: {}", cli.store.display()))?;
    Ok(DraftStore::new(Arc::new(store))
        .with_key(config.draft_key.clone())
        .with_max_age(config.draft_max_age()))
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = match &cli.config {
        Some(path) => AdmissionConfig::from_file(path)?,
        None => AdmissionConfig::from_env(),
    };

    match &cli.command {
        Command::Validate { form } => {
            let result = ValidationEngine::new().validate(&read_form(form)?);
            print_json(&result)?;
            Ok(if result.is_valid {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }

        Command::Draft { action } => {
            let drafts = draft_store(&cli, &config).await?;
            match action {
                DraftAction::Show => match drafts.load().await {
                    Some(state) => print_json(&state)?,
                    None => println!("No saved draft"),
                },
                DraftAction::Clear => {
                    drafts.clear().await;
                    println!("Draft cleared");
                }
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::Submit {
            form,
            token,
            applicant,
        } => {
            let state = read_form(form)?;

            let mut transport = HttpTransport::new(&config)?;
            if let Some(token) = token {
                transport = transport.with_bearer_token(token.clone());
            }
            let attachments =
                AttachmentValidator::new(Arc::new(LocalFileSystem::new(&config.document_dir)))
                    .with_max_bytes(config.max_attachment_bytes);

            let mut builder = FormStateController::builder(
                draft_store(&cli, &config).await?,
                attachments,
                Arc::new(transport),
            )
            .with_config(&config);
            if let Some(applicant) = applicant {
                builder = builder.with_applicant_id(applicant.clone());
            }
            let controller = builder.load_or_initialize().await;

            // the file replaces whatever the draft held
            let value = state.into_value();
            if let Some(sections) = value.as_object() {
                for (section, value) in sections {
                    controller.update_field(section, value.clone());
                }
            }

            match controller.submit().await? {
                SubmitOutcome::Accepted(response) => {
                    print_json(&response)?;
                    Ok(ExitCode::SUCCESS)
                }
                SubmitOutcome::Invalid(result) => {
                    print_json(&result)?;
                    Ok(ExitCode::FAILURE)
                }
                SubmitOutcome::AttachmentRejected { slot, error } => {
                    eprintln!("{slot}: {error}");
                    Ok(ExitCode::FAILURE)
                }
            }
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run(Cli::parse()).await {
        Ok(code) => code,
        Err(e) => {
            log::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
