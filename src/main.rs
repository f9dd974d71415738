use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod bookmarks;
mod cache;
mod cli;
mod config;
mod factory;
mod images;
mod library;
mod preview;
mod storage;
#[cfg(test)]
mod tests;

use cli::{Command, PreviewCommand};
use config::Config;
use factory::AppFactory;
use library::BookmarkLibrary;

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Cached index when there is one, a fresh read of the source otherwise.
async fn open_library(config: &Config) -> anyhow::Result<Arc<BookmarkLibrary>> {
    let library = AppFactory::create_library(config)?;
    let entry_folder_id = &config.settings.entry_folder_id;

    if !library.load_cache(entry_folder_id).await && !library.refresh(entry_folder_id).await {
        let reason = library.state().last_error.unwrap_or_default();
        bail!("no bookmarks available: {reason}");
    }

    Ok(library)
}

async fn run(command: Command, config: Config) -> anyhow::Result<()> {
    match command {
        Command::Refresh {} => {
            let library = AppFactory::create_library(&config)?;
            let refresh = library.bootstrap(&config.settings.entry_folder_id).await;
            refresh.await?;

            if let Some(err) = library.state().last_error {
                bail!("refresh failed: {err}");
            }

            let index = library.index();
            println!(
                "{} folders, {} bookmarks",
                index.folders().len(),
                index.items().len()
            );
        }

        Command::Search { query, limit } => {
            let library = open_library(&config).await?;
            let results = library.search(&query, limit);
            println!("{}", serde_json::to_string_pretty(&results)?);
        }

        Command::Tree { folder } => {
            let library = open_library(&config).await?;
            if let Some(folder) = folder {
                if !library.set_current_folder(&folder) {
                    bail!("folder {folder} does not exist");
                }
            }

            let trail: Vec<_> = library.breadcrumbs().into_iter().map(|f| f.title).collect();
            println!("{}", trail.join(" / "));

            for folder in library.current_folders() {
                println!("  [{}] {}/", folder.id, folder.title);
            }
            for bookmark in library.current_bookmarks() {
                println!("  [{}] {} <{}>", bookmark.id, bookmark.title, bookmark.url);
            }
        }

        Command::Folders {} => {
            let library = open_library(&config).await?;
            println!("{}", serde_json::to_string_pretty(&library.folder_tree_options())?);
        }

        #[cfg(feature = "headless")]
        Command::Preview {
            action:
                PreviewCommand::Capture {
                    url,
                    selector,
                    preview_args,
                },
        } => {
            use preview::headless::{launch_browser, open_page, HeadlessViewport, SelectorTarget};

            config.ensure_previews_enabled()?;

            let (width, height) = (config.preview.viewport_width, config.preview.viewport_height);
            let page_url = url.clone();
            // the browser has to outlive the capture
            let (_browser, tab) = tokio::task::spawn_blocking(move || {
                let browser = launch_browser()?;
                let tab = open_page(&browser, &page_url, width, height)?;
                anyhow::Ok((browser, tab))
            })
            .await??;

            let service =
                AppFactory::create_preview_service(&config, Arc::new(HeadlessViewport::new(tab.clone()))).await?;
            let target = Arc::new(SelectorTarget::new(tab, selector));
            let options = preview_args.options(config.preview.options());

            match service.capture_and_store(&url, target, options).await {
                Some(image) => println!("{} bytes of {}", image.bytes.len(), image.format.mime_type()),
                None => bail!("failed to capture a preview of {url}"),
            }
        }

        Command::Preview {
            action: PreviewCommand::Get { url, out },
        } => {
            let cache = AppFactory::create_preview_cache(&config).await?;
            let Some(image) = cache.get(&url).await else {
                bail!("no preview cached for {url}");
            };

            match out {
                Some(out) => tokio::fs::write(&out, &image.bytes)
                    .await
                    .with_context(|| format!("failed to write {out}"))?,
                None => println!("{}", image.to_data_url()),
            }
        }

        Command::Settings {} => {
            print!("{}", serde_yml::to_string(&config.settings)?);
        }

        Command::Favicon { url, size } => {
            for favicon in bookmarks::urls::favicon_fallback_urls(&url, size) {
                println!("{favicon}");
            }
        }
    }

    Ok(())
}

fn main() -> anyhow::Result<()> {
    init_logging();

    let args = cli::Args::parse();
    let config = AppFactory::create_config()?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(run(args.command, config))
}
