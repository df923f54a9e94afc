use anyhow::Context;
use clap::Parser;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::io::IsTerminal;

mod cascade;
mod catalog;
mod cli;
mod config;
mod matching;
mod processor;
mod scrape;
mod sources;
mod storage;
#[cfg(test)]
mod tests;
mod types;
mod validate;

use cascade::Cascade;
use catalog::Catalog;
use config::Config;
use processor::{Processor, StopFlag};
use types::BookRequest;

fn init_logging(verbose: bool) {
    let default_directive = if verbose {
        "bookcovers=debug"
    } else {
        "bookcovers=info"
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn progress_bar(len: usize, verbose: bool) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    if verbose || !std::io::stderr().is_terminal() {
        pb.set_draw_target(ProgressDrawTarget::hidden());
        return pb;
    }

    if let Ok(style) =
        ProgressStyle::with_template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
    {
        pb.set_style(style);
    }
    pb
}

fn main() -> anyhow::Result<()> {
    let args = cli::Args::parse();

    init_logging(args.verbose);

    let base_path = match args.config_dir {
        Some(dir) => dir,
        None => config::default_base_path()?,
    };
    let mut config = Config::load_with(&base_path)?;

    match args.command {
        cli::Command::Resolve {
            catalog,
            workers,
            covers_dir,
            no_download,
            timeout,
            batch,
        } => {
            if let Some(workers) = workers {
                config.scheduler.workers = workers;
            }
            if let Some(covers_dir) = covers_dir {
                config.scheduler.covers_dir = covers_dir;
            }
            if no_download {
                config.scheduler.download = false;
            }
            if timeout.is_some() {
                config.scheduler.run_timeout_secs = timeout;
            }
            if batch {
                config.scheduler.flush_every_record = false;
            }
            config.validate()?;

            let mut catalog = Catalog::load(&catalog)?;
            let cascade = Cascade::from_config(&config)?;

            let stop = StopFlag::new();
            ctrlc::set_handler({
                let stop = stop.clone();
                move || {
                    log::warn!("interrupted, finishing books in progress");
                    stop.stop();
                }
            })
            .context("failed to set Ctrl+C handler")?;

            let progress = progress_bar(catalog.records.len(), args.verbose);
            let summary = Processor::new(&cascade, &config.scheduler)
                .with_stop_flag(stop)
                .with_progress(progress.clone())
                .run(&mut catalog)?;
            progress.finish_and_clear();

            println!("{summary}");
            Ok(())
        }

        cli::Command::Lookup {
            title,
            author,
            link,
        } => {
            let mut book = BookRequest::new(&title, &author);
            if let Some(link) = link {
                book = book.with_link(&link);
            }

            let cascade = Cascade::from_config(&config)?;
            let resolution = cascade.resolve(&book);

            println!("{}", serde_json::to_string_pretty(&resolution.report)?);
            Ok(())
        }

        cli::Command::Sources {} => {
            let cascade = Cascade::from_config(&config)?;

            for (idx, source) in cascade.registry().iter().enumerate() {
                let d = source.descriptor();
                let capabilities = d
                    .capabilities
                    .iter()
                    .map(|c| c.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");

                println!("#{} {} (priority {})", idx + 1, d.name, d.priority);
                println!("  base_url: {}", d.base_url);
                println!("  capabilities: {capabilities}");
                println!(
                    "  thresholds: title {:.2}, author {:.2}",
                    d.thresholds.title, d.thresholds.author
                );
                if !d.link_domains.is_empty() {
                    println!("  link domains: {}", d.link_domains.join(", "));
                }
            }
            Ok(())
        }
    }
}
