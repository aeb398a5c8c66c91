// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// This is the entry point for all user interaction.
// It uses the `clap` crate to parse command line arguments.
// All business logic is delegated to Layer 2 (application).
//
// Four commands are supported:
//   1. `train`      — trains / resumes the classifier
//   2. `val`        — accuracy of milestone checkpoints
//   3. `test`       — predictions for one image folder
//   4. `preprocess` — predictions for every brand category
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, PreprocessArgs, TestArgs, TrainArgs, ValArgs};

#[derive(Parser, Debug)]
#[command(
    name = "sleeve-classifier",
    version,
    about = "Train a sleeve / sleeveless image classifier and tag product folders with it."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Route the subcommand to its use case.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args)      => run_train(args),
            Commands::Val(args)        => run_val(args),
            Commands::Test(args)       => run_test(args),
            Commands::Preprocess(args) => run_preprocess(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    tracing::info!("Starting training on images in: {}", args.data_dir.display());

    let outcome = TrainUseCase::new(args.into()).execute()?;

    println!(
        "Training complete: epochs {}..{}, milestones {:?}",
        outcome.start_epoch, outcome.final_epoch, outcome.milestones
    );
    Ok(())
}

fn run_val(args: ValArgs) -> Result<()> {
    use crate::application::validate_use_case::ValidateUseCase;

    let report = ValidateUseCase::new(args.into()).execute()?;

    for score in &report.scores {
        println!(
            "Epoch {:>3}: {}/{} correct, accuracy {:.4}",
            score.epoch, score.correct, score.total, score.accuracy()
        );
    }
    match report.best {
        Some(best) => println!(
            "Best epoch {} with {} correct ({:.4})",
            best.epoch, best.correct, best.accuracy()
        ),
        None => println!("No milestone evaluated"),
    }
    Ok(())
}

fn run_test(args: TestArgs) -> Result<()> {
    use crate::application::predict_use_case::PredictUseCase;

    let output_dir = args.output_dir.clone();
    let written    = PredictUseCase::new(args.into()).execute()?;

    println!("Wrote {} predictions to '{}'", written, output_dir.display());
    Ok(())
}

fn run_preprocess(args: PreprocessArgs) -> Result<()> {
    use crate::application::predict_use_case::PreprocessUseCase;

    let brand   = args.brand.clone();
    let written = PreprocessUseCase::new(args.into()).execute()?;

    println!("Wrote {} predictions for brand '{}'", written, brand);
    Ok(())
}
