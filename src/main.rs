use banana_docsync::config::{ProviderKind, SyncConfig};
use banana_docsync::translate::build_generator;
use banana_docsync::vcs::{GitHubChangeSource, parse_pull_request_url};
use banana_docsync::{PipelineOrchestrator, logging};
use clap::{Arg, Command};
use std::path::PathBuf;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = Command::new("banana-docsync")
        .version("0.1.0")
        .about("Carry a documentation pull request into the translated mirror")
        .arg(
            Arg::new("url")
                .help("Pull request URL, e.g. https://github.com/pingcap/docs/pull/123")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .help("TOML configuration file")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("target-root")
                .long("target-root")
                .short('t')
                .help("Local checkout of the target repository")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("staging-dir")
                .long("staging-dir")
                .help("Directory for intermediate artifacts (default: temp_output)")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("provider")
                .long("provider")
                .short('p')
                .help("Translation provider: deepseek, gemini or mock"),
        )
        .arg(
            Arg::new("resume")
                .long("resume")
                .help("Reuse artifacts from a previous run instead of clearing them")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .help("Show debug output")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    logging::init(matches.get_flag("verbose"))?;

    let url = matches
        .get_one::<String>("url")
        .ok_or("missing pull request URL")?;
    let request = parse_pull_request_url(url)?;

    let mut config = match matches.get_one::<PathBuf>("config") {
        Some(path) => SyncConfig::load(path)?,
        None => SyncConfig::default(),
    }
    .for_repository(&request.repository())?;

    if let Some(root) = matches.get_one::<PathBuf>("target-root") {
        config = config.with_target_root(root.clone());
    }
    if let Some(dir) = matches.get_one::<PathBuf>("staging-dir") {
        config = config.with_staging_dir(dir.clone());
    }
    if let Some(name) = matches.get_one::<String>("provider") {
        config = config.with_provider(ProviderKind::parse(name)?);
    }
    if matches.get_flag("resume") {
        config = config.with_resume(true);
    }
    config.validate()?;

    println!("🔗 {} #{}", request.repository(), request.number);
    println!(
        "🌍 {} → {} into {}",
        config.source_language,
        config.target_language,
        config.target_root.display()
    );

    let generator = build_generator(&config)?;
    let source = Arc::new(GitHubChangeSource::from_env(request)?);
    let summary = PipelineOrchestrator::new(config, source, generator)
        .run()
        .await?;

    println!();
    print!("{}", summary);
    Ok(())
}
