mod cli;
mod settings;

use anyhow::Context;
use flywheel::cancel::Cancellation;
use flywheel::nginx::{self, BuildOptions, ParseOptions};
use flywheel::overrides;
use flywheel::payload::{Directive, Payload};
use flywheel::provider::{DirectiveSource, KeyRule, MapProvider, OverrideProvider, RedisProvider};
use flywheel::visit::TryVisitDirectivesMut;
use flywheel::writer;
use settings::Settings;
use std::io::Write;
use std::path::{Path, PathBuf};

fn main() {
    use clap::Parser;
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_env("FLYWHEEL_LOG"))
        .with_writer(std::io::stderr)
        .init();

    let cancel = Cancellation::new();
    if let Err(error) = cancel.install_signal_handler() {
        tracing::warn!(%error, "unable to install signal handler");
    }

    let command_result =
        Settings::load(cli.config.as_deref()).and_then(|settings| match cli.command {
            cli::Command::Redis(redis_cli) => redis(redis_cli, &settings, &cancel),
            cli::Command::File(file_cli) => file(file_cli, &settings, &cancel),
            cli::Command::Dev(dev_cli) => dev(dev_cli, &settings, &cancel),
        });

    if let Err(e) = command_result {
        for error in e.chain() {
            eprintln!("{error}")
        }
        std::process::exit(1);
    }
}

pub fn redis(
    cli: cli::RedisCommand,
    settings: &Settings,
    cancel: &Cancellation,
) -> anyhow::Result<()> {
    let redis_settings = settings.redis(&cli.endpoints, cli.input.strip_prefix.as_deref());
    let provider = RedisProvider::connect(&redis_settings).context("Unable to connect to redis")?;

    overrides::with_provider(provider, |provider| {
        rewrite(&cli.input, &cli.output, provider, cancel)
    })
}

pub fn file(
    cli: cli::FileCommand,
    settings: &Settings,
    cancel: &Cancellation,
) -> anyhow::Result<()> {
    let rule = settings.key_rule(cli.input.strip_prefix.as_deref());
    let provider = MapProvider::from_file(&cli.values, rule)
        .with_context(|| format!("Unable to load values from {}", cli.values.display()))?;

    overrides::with_provider(provider, |provider| {
        rewrite(&cli.input, &cli.output, provider, cancel)
    })
}

/// Load, override, write
fn rewrite(
    input: &cli::InputArgs,
    output: &cli::OutputArgs,
    provider: &mut dyn OverrideProvider,
    cancel: &Cancellation,
) -> anyhow::Result<()> {
    let mut payload = load(input)?;

    tracing::info!("Replacing directive arguments");
    let stats = overrides::override_payload(&mut payload, provider, cancel)
        .context("Overriding nginx configuration failed")?;
    tracing::info!(visited = stats.visited, replaced = stats.replaced, "override finished");

    let source_dir = root_dir(&payload);
    if let (Some(destination), Some(source_dir)) = (&output.destination, &source_dir) {
        payload.relocate(source_dir, destination).with_context(|| {
            format!("Unable to write to {}", destination.display())
        })?;
    }

    tracing::info!(mode=%output.mode, "Writing payload");
    let options = BuildOptions::default();
    match output.mode {
        cli::WriteMode::InPlace => {
            writer::write_in_place(&payload, &options, cancel).context("Failed to write output")?;
        }
        cli::WriteMode::Staged => {
            let staging_parent = output
                .staging_dir
                .clone()
                .or_else(|| output.destination.clone())
                .or(source_dir)
                .unwrap_or_else(std::env::temp_dir);
            std::fs::create_dir_all(&staging_parent).with_context(|| {
                format!("Unable to create directory {}", staging_parent.display())
            })?;

            let staging = writer::write_staged_in(&staging_parent, &payload, &options, cancel)
                .context("Failed to stage output")?;

            // last chance to back out before any target is touched
            if cancel.is_cancelled() {
                staging.discard()?;
                anyhow::bail!("Cancelled, no files were replaced");
            }

            staging.commit().context("Failed to replace files")?;
        }
    }

    Ok(())
}

fn load(input: &cli::InputArgs) -> anyhow::Result<Payload> {
    let is_json = input
        .source
        .extension()
        .is_some_and(|extension| extension == "json");

    if is_json {
        return Payload::load_json(&input.source)
            .with_context(|| format!("Failed to load payload {}", input.source.display()));
    }

    let options = ParseOptions {
        single_file: input.single_file,
        ..Default::default()
    };
    let payload = nginx::parse(&input.source, &options)
        .with_context(|| format!("Failed to parse source file {}", input.source.display()))?;

    anyhow::ensure!(!payload.config.is_empty(), "No files loaded");
    Ok(payload)
}

/// Directory of the root file
fn root_dir(payload: &Payload) -> Option<PathBuf> {
    payload
        .config
        .first()
        .and_then(|config| config.file.parent())
        .map(Path::to_path_buf)
}

/// (flywheel-)developer utilities
///
/// A quick way to expose internal structures for debugging purposes
pub fn dev(
    cli: cli::DevCommand,
    settings: &Settings,
    cancel: &Cancellation,
) -> anyhow::Result<()> {
    use cli::DevSubCommand::*;

    let mut payload = load(&cli.input)?;
    let rule = settings.key_rule(cli.input.strip_prefix.as_deref());

    match cli.command {
        Parse { format } => match format {
            cli::OutputFormat::Yaml => serde_yaml::to_writer(std::io::stdout(), &payload)?,
            cli::OutputFormat::Json => serde_json::to_writer_pretty(std::io::stdout(), &payload)?,
        },
        Keys => {
            for config in &mut payload.config {
                let file = config.file.clone();
                config.try_visit_directives_mut(&mut |directive: &mut Directive| {
                    if !directive.is_comment() {
                        println!(
                            "{}:{}\t{}",
                            file.display(),
                            directive.line,
                            rule.directive_key(&directive.directive, &file)
                        );
                    }
                    Ok::<_, std::convert::Infallible>(())
                })?;
            }
        }
        NewDirectives { endpoints, values } => {
            let mut stdout = std::io::stdout().lock();
            match values {
                Some(values) => {
                    let provider = MapProvider::from_file(&values, rule.clone())?
                        .with_new_marker(settings.new_marker.clone());
                    print_new_directives(provider, &payload, &rule, cancel, &mut stdout)?;
                }
                None => {
                    let redis_settings =
                        settings.redis(&endpoints, cli.input.strip_prefix.as_deref());
                    let provider = RedisProvider::connect(&redis_settings)?;
                    print_new_directives(provider, &payload, &rule, cancel, &mut stdout)?;
                }
            }
        }
    }

    Ok(())
}

/// Writes the directives `source` would add to each file of `payload`, then closes `source`
fn print_new_directives<P>(
    source: P,
    payload: &Payload,
    rule: &KeyRule,
    cancel: &Cancellation,
    out: &mut impl Write,
) -> anyhow::Result<()>
where
    P: OverrideProvider + DirectiveSource,
{
    overrides::with_provider(source, |source| {
        for config in &payload.config {
            let prefix = rule.file_key(&config.file);
            let directives = source.new_directives(&prefix, cancel)?;
            writeln!(out, "# {} ({prefix})", config.file.display())?;
            nginx::build_to(out, &directives, &BuildOptions::default())?;
        }
        Ok(())
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use flywheel::provider::ProviderError;
    use pretty_assertions::assert_eq;
    use std::cell::Cell;
    use std::rc::Rc;

    /// Offers one `gzip on;` per file and counts `close` calls
    #[derive(Default)]
    struct GzipSource {
        fail: bool,
        closed: Rc<Cell<usize>>,
    }

    impl OverrideProvider for GzipSource {
        fn override_args(
            &mut self,
            _directive: &str,
            _path: &Path,
            _cancel: &Cancellation,
        ) -> Result<Vec<String>, ProviderError> {
            Ok(vec![])
        }

        fn close(&mut self) -> Result<(), ProviderError> {
            self.closed.set(self.closed.get() + 1);
            Ok(())
        }
    }

    impl DirectiveSource for GzipSource {
        fn new_directives(
            &mut self,
            _prefix: &str,
            _cancel: &Cancellation,
        ) -> Result<Vec<Directive>, ProviderError> {
            if self.fail {
                return Err(ProviderError::Closed);
            }
            Ok(vec![Directive::new("gzip", 0, vec!["on".into()])])
        }
    }

    #[test]
    fn new_directives_are_printed_and_source_closed() {
        let payload = flywheel::payload!("/etc/nginx/nginx.conf" => "user www;");
        let closed = Rc::new(Cell::new(0));
        let source = GzipSource {
            closed: closed.clone(),
            ..Default::default()
        };

        let mut out = vec![];
        print_new_directives(
            source,
            &payload,
            &KeyRule::default(),
            &Cancellation::new(),
            &mut out,
        )
        .unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "# /etc/nginx/nginx.conf (/nginx/nginx)\ngzip on;\n"
        );
        assert_eq!(closed.get(), 1);
    }

    #[test]
    fn source_is_closed_after_failure() {
        let payload = flywheel::payload!("/etc/nginx/nginx.conf" => "user www;");
        let closed = Rc::new(Cell::new(0));
        let source = GzipSource {
            fail: true,
            closed: closed.clone(),
        };

        let result = print_new_directives(
            source,
            &payload,
            &KeyRule::default(),
            &Cancellation::new(),
            &mut Vec::<u8>::new(),
        );

        assert!(result.is_err());
        assert_eq!(closed.get(), 1);
    }
}
