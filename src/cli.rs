use clap::{Args as ClapArgs, Parser, Subcommand};

use crate::{images::PreviewFormat, preview::PreviewOptions};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct PreviewArgs {
    /// Output format. Defaults to the configured one.
    #[clap(long, value_enum)]
    pub format: Option<PreviewFormat>,

    /// Maximum width of the preview, 240 to 1200
    #[clap(long)]
    pub max_width: Option<u32>,

    /// Lossy quality, 0.3 to 0.95
    #[clap(long)]
    pub quality: Option<f32>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum PreviewCommand {
    /// Open a page in headless chrome and cache a preview of it
    #[cfg(feature = "headless")]
    Capture {
        /// Page url
        #[clap(allow_hyphen_values = true)]
        url: String,

        /// CSS selector of the element to capture
        #[clap(short, long, default_value = "body")]
        selector: String,

        #[clap(flatten)]
        preview_args: PreviewArgs,
    },
    /// Print a cached preview as a data url, or write it to a file
    Get {
        /// Page url
        #[clap(allow_hyphen_values = true)]
        url: String,

        /// Write the image here instead
        #[clap(short, long)]
        out: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Re-read the bookmark source and rebuild the cache
    Refresh {},
    /// Search bookmarks
    Search {
        /// Search query
        query: String,

        /// Maximum number of results, 10 to 500
        #[clap(short, long)]
        limit: Option<usize>,
    },
    /// Show the contents of a folder
    Tree {
        /// Folder id. Defaults to the configured entry folder.
        #[clap(short, long)]
        folder: Option<String>,
    },
    /// Print the folder tree as json
    Folders {},
    /// Manage page previews
    Preview {
        #[clap(subcommand)]
        action: PreviewCommand,
    },
    /// Print the user settings from config.yaml
    Settings {},
    /// Print the favicon urls for a page
    Favicon {
        /// Page url
        #[clap(allow_hyphen_values = true)]
        url: String,

        /// Icon size in pixels, 16 to 256
        #[clap(short, long)]
        size: Option<u32>,
    },
}

impl PreviewArgs {
    /// Command line values over `defaults`.
    pub fn options(&self, defaults: PreviewOptions) -> PreviewOptions {
        PreviewOptions {
            max_width: self.max_width.or(defaults.max_width),
            format: self.format.unwrap_or(defaults.format),
            quality: self.quality.or(defaults.quality),
        }
    }
}
