use crate::infra::definition_source;
use clap::Args;
use std::path::PathBuf;
use verascore::config::AppConfig;
use verascore::error::AppError;
use verascore::scoring::{loader, ConfigValidationError, DefinitionSource, ScoringConfigSet};

#[derive(Args, Debug, Default)]
pub(crate) struct ConfigsArgs {
    /// Directory of factor and persona YAML files (defaults to SCORING_CONFIG_DIR, then built-in)
    #[arg(long)]
    pub(crate) dir: Option<PathBuf>,
}

fn source_for(args: ConfigsArgs) -> Result<DefinitionSource, AppError> {
    let config = AppConfig::load()?;
    Ok(definition_source(args.dir, config.scoring.config_dir))
}

pub(crate) fn run_configs_list(args: ConfigsArgs) -> Result<(), AppError> {
    let source = source_for(args)?;
    let set = loader::load(&source.load()?)?;
    println!("Scoring definitions from {}", source.describe());
    print!("{}", render_listing(&set));
    Ok(())
}

pub(crate) fn run_configs_validate(args: ConfigsArgs) -> Result<(), AppError> {
    let source = source_for(args)?;
    match loader::load(&source.load()?) {
        Ok(set) => {
            println!(
                "{}: {} factor revision(s), {} persona(s), no issues",
                source.describe(),
                set.summaries().len(),
                set.personas().len()
            );
            Ok(())
        }
        Err(err) => {
            print!("{}", render_issues(&err));
            Err(err.into())
        }
    }
}

pub(crate) fn render_listing(set: &ScoringConfigSet) -> String {
    let mut out = String::from("\nFactors\n");
    for summary in set.summaries() {
        out.push_str(&format!(
            "  {:<16} v{:<3} {:<24} {} metric(s), default weight {:.2}\n",
            summary.factor.as_str(),
            summary.version,
            summary.label,
            summary.metrics_count,
            summary.default_weight
        ));
    }

    let default = set.default_persona().map(|persona| persona.id.clone());
    out.push_str("\nPersonas\n");
    for persona in set.personas() {
        let marker = if default.as_ref() == Some(&persona.id) {
            " (default)"
        } else {
            ""
        };
        out.push_str(&format!("  {} - {}{}\n", persona.id, persona.label, marker));
        for entry in &persona.factors {
            out.push_str(&format!(
                "      {:<16} v{:<3} {:>5.1}%\n",
                entry.config.factor.as_str(),
                entry.config.version,
                entry.weight * 100.0
            ));
        }
    }
    out
}

pub(crate) fn render_issues(err: &ConfigValidationError) -> String {
    let mut out = format!("{} issue(s) found\n", err.issues().len());
    for issue in err.issues() {
        out.push_str(&format!("  - {}: {}\n", issue.scope, issue.kind));
    }
    out
}
