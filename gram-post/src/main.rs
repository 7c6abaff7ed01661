//! gram-post - Publish photos, carousels, stories and reels to Instagram

use clap::{Parser, Subcommand};
use libgramcast::config::Config;
use libgramcast::graph::client::GraphClient;
use libgramcast::logging::{LogFormat, LoggingConfig};
use libgramcast::media::{is_remote, kind_of_location, list_media, MediaItem, MediaKind};
use libgramcast::publisher::{PostKind, ReelOptions};
use libgramcast::secrets::{open_store, AccountSecrets};
use libgramcast::transcode::{image_to_video, TempVideo};
use libgramcast::upload::cloudinary::CloudinaryUploader;
use libgramcast::upload::upload_file;
use libgramcast::{GramcastError, PostConfig, PublishPolicies, PublishReport, Publisher, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "gram-post")]
#[command(version)]
#[command(about = "Publish photos, carousels, stories and reels to Instagram", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (default: $GRAMCAST_CONFIG or ~/.config/gramcast/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format (text or json)
    #[arg(short, long, global = true, default_value = "text", value_parser = ["text", "json"])]
    format: String,

    /// Log output format (text, json or pretty)
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Post every image and video in a folder (one file: single post, more: carousel)
    Feed {
        /// Folder holding the media and its post.yaml
        folder: PathBuf,

        /// Post description to use instead of FOLDER/post.yaml
        #[arg(long)]
        post_file: Option<PathBuf>,

        /// Publish nothing if any upload fails
        #[arg(long)]
        strict: bool,

        /// Show what would be posted without uploading or publishing
        #[arg(long)]
        dry_run: bool,
    },

    /// Post one image or video as a story
    Story {
        /// Local file or public URL
        source: String,
    },

    /// Post a video as a reel
    Reel {
        /// Local file or public URL
        source: String,

        /// Reel caption
        #[arg(long, default_value = "")]
        caption: String,

        /// Cover image URL
        #[arg(long)]
        cover: Option<String>,

        /// Keep the reel out of the main feed
        #[arg(long)]
        no_feed: bool,

        /// Treat SOURCE as a still image and convert it to video first
        #[arg(long)]
        from_image: bool,

        /// Length of the converted video in seconds
        #[arg(long, default_value_t = 5)]
        duration: u32,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    LoggingConfig::from_env(cli.log_format, cli.verbose).init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };

    let report = match cli.command {
        Commands::Feed {
            folder,
            post_file,
            strict,
            dry_run,
        } => {
            let post_file = post_file.unwrap_or_else(|| folder.join("post.yaml"));
            let post = PostConfig::parse(&post_file);
            let files = list_media(&folder)?;
            if files.is_empty() {
                return Err(GramcastError::InvalidInput(format!(
                    "no media files found in {}",
                    folder.display()
                )));
            }

            if dry_run {
                return print_plan(&FeedPlan::new(&folder, &post, &files), &cli.format);
            }

            let session = Session::open(&config)?;
            let uploader = session.uploader(&config)?;
            session
                .publisher
                .post_files(&uploader, &files, &post, strict)
                .await?
        }
        Commands::Story { source } => {
            if !is_remote(&source) {
                require_file(Path::new(&source))?;
            }

            let session = Session::open(&config)?;
            let item = if is_remote(&source) {
                MediaItem::new(source.as_str(), kind_of_location(&source))
            } else {
                let uploader = session.uploader(&config)?;
                upload_file(&uploader, Path::new(&source)).await?
            };
            session.publisher.post_story(&item).await?
        }
        Commands::Reel {
            source,
            caption,
            cover,
            no_feed,
            from_image,
            duration,
        } => {
            let options = ReelOptions {
                caption,
                cover_url: cover,
                share_to_feed: !no_feed,
            };

            if is_remote(&source) {
                if from_image {
                    return Err(GramcastError::InvalidInput(
                        "--from-image needs a local image file".to_string(),
                    ));
                }
                let session = Session::open(&config)?;
                session.publisher.post_reel(&source, &options).await?
            } else {
                let path = PathBuf::from(&source);
                require_file(&path)?;
                if !from_image && !MediaKind::from_path(&path).is_video() {
                    return Err(GramcastError::InvalidInput(format!(
                        "{} is not a video; use --from-image to post a still image as a reel",
                        path.display()
                    )));
                }

                let session = Session::open(&config)?;
                let uploader = session.uploader(&config)?;

                // The converted video must outlive the upload
                let converted: Option<TempVideo> = if from_image {
                    Some(image_to_video(&path, duration).await?)
                } else {
                    None
                };
                let upload_path = converted.as_ref().map(|v| v.path()).unwrap_or(path.as_path());

                let item = upload_file(&uploader, upload_path).await?;
                session.publisher.post_reel(&item.url, &options).await?
            }
        }
    };

    print_report(&report, &cli.format)
}

/// Everything needed to talk to the graph API for one account
struct Session {
    secrets: AccountSecrets,
    publisher: Publisher,
}

impl Session {
    fn open(config: &Config) -> Result<Self> {
        let store = open_store(&config.credentials);
        let secrets = AccountSecrets::load(store.as_ref())?;
        let graph = GraphClient::new(
            &config.graph_root(),
            &secrets.account_id,
            secrets.access_token.clone(),
        )?;
        let publisher = Publisher::new(Arc::new(graph), PublishPolicies::from_config(config)?);

        info!("Publishing as account {}", secrets.account_id);
        Ok(Self { secrets, publisher })
    }

    fn uploader(&self, config: &Config) -> Result<CloudinaryUploader> {
        CloudinaryUploader::from_config(&config.upload, &self.secrets)
    }
}

fn require_file(path: &Path) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(GramcastError::InvalidInput(format!(
            "file not found: {}",
            path.display()
        )))
    }
}

/// What a feed post would contain
#[derive(Debug, Serialize)]
struct FeedPlan<'a> {
    folder: &'a Path,
    kind: PostKind,
    caption: String,
    location_id: Option<&'a str>,
    user_tags: &'a [String],
    files: Vec<PlannedFile<'a>>,
}

#[derive(Debug, Serialize)]
struct PlannedFile<'a> {
    path: &'a Path,
    kind: MediaKind,
}

impl<'a> FeedPlan<'a> {
    fn new(folder: &'a Path, post: &'a PostConfig, files: &'a [PathBuf]) -> Self {
        Self {
            folder,
            kind: if files.len() == 1 {
                PostKind::Single
            } else {
                PostKind::Carousel
            },
            caption: post.full_caption(),
            location_id: post.location_id(),
            user_tags: &post.user_tags,
            files: files
                .iter()
                .map(|path| PlannedFile {
                    path,
                    kind: MediaKind::from_path(path),
                })
                .collect(),
        }
    }
}

fn print_plan(plan: &FeedPlan<'_>, format: &str) -> Result<()> {
    if format == "json" {
        println!("{}", to_json(plan)?);
        return Ok(());
    }

    println!(
        "Would publish a {} post with {} file(s) from {}",
        plan.kind,
        plan.files.len(),
        plan.folder.display()
    );
    for file in &plan.files {
        println!("  [{}] {}", file.kind, file.path.display());
    }
    println!("Caption:\n{}", plan.caption);
    if let Some(location) = plan.location_id {
        println!("Location: {}", location);
    }
    if !plan.user_tags.is_empty() {
        println!("Tagged: {}", plan.user_tags.join(", "));
    }
    Ok(())
}

fn print_report(report: &PublishReport, format: &str) -> Result<()> {
    if format == "json" {
        println!("{}", to_json(report)?);
        return Ok(());
    }

    println!(
        "Published {} {} ({} item(s))",
        report.kind,
        report.media_id,
        report.items.len()
    );
    for path in &report.skipped {
        println!("Skipped (upload failed): {}", path.display());
    }
    Ok(())
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value)
        .map_err(|e| GramcastError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))
}
