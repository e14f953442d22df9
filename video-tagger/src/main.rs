use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::process::ExitCode;
use tag_defs::{FrameRange, TagApplicableTo, TagMeta, TagValueType};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use video_tagger::{
    ensure_tag_meta, env, run_scenario, AnnotationApi, ApiConfig, HttpApi, MockPlatform, ObjectTags, ProjectContext,
    ScenarioOptions, TaggerError, VideoTags,
};

#[derive(Parser)]
#[command(name = "video-tagger", version, about = "Manage tag metas and video/object tags on an annotation project")]
struct Cli {
    /// Run against an in-memory demo project instead of the platform
    #[arg(long, global = true)]
    dry_run: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full tagging walkthrough on the first video of the dataset
    Scenario {
        /// Also create and apply the `kiwi` object tag
        #[arg(long)]
        with_kiwi: bool,
    },
    /// Print the project meta as JSON
    ShowMeta,
    /// List the videos of the dataset
    ListVideos,
    /// Create a tag meta unless one with the same name exists
    EnsureTagMeta {
        #[arg(long)]
        name: String,
        #[arg(long)]
        value_type: TagValueType,
        #[arg(long, default_value = "all")]
        applicable_to: TagApplicableTo,
        #[arg(long, value_delimiter = ',')]
        values: Vec<String>,
    },
    /// Tags attached to videos
    VideoTag {
        #[command(subcommand)]
        action: TagAction,
    },
    /// Tags attached to annotated objects
    ObjectTag {
        #[command(subcommand)]
        action: TagAction,
    },
}

#[derive(Subcommand)]
enum TagAction {
    Add {
        #[arg(long)]
        tag_meta: String,
        /// Video or object id
        #[arg(long)]
        target: i64,
        /// Read according to the tag meta's value type
        #[arg(long)]
        value: Option<String>,
        #[arg(long, requires = "to")]
        from: Option<u32>,
        #[arg(long, requires = "from")]
        to: Option<u32>,
    },
    UpdateValue {
        #[arg(long)]
        tag_meta: String,
        #[arg(long)]
        tag: i64,
        #[arg(long)]
        value: String,
    },
    UpdateRange {
        #[arg(long)]
        tag: i64,
        #[arg(long)]
        from: u32,
        #[arg(long)]
        to: u32,
    },
    Remove {
        #[arg(long)]
        tag: i64,
    },
}

#[derive(Clone, Copy)]
enum Target {
    Video,
    Object,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Env files may carry RUST_LOG, so read them before the subscriber starts.
    let loaded = if cli.dry_run { Vec::new() } else { env::load_env_files() };
    init_tracing(cli.log_json);
    for path in &loaded {
        info!("Loaded environment from {}", path.display());
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    if cli.dry_run {
        let (platform, context) = MockPlatform::with_demo_project().await;
        info!("Dry run against in-memory project {} / dataset {}", context.project_id, context.dataset_id);
        return execute(&platform, context, cli.command).await;
    }

    let config = ApiConfig::from_env().context("Failed to read API credentials")?;
    let context = ProjectContext::from_env().context("Failed to read project context")?;
    let api = HttpApi::new(config)?;
    info!("Using project {} / dataset {} at {}", context.project_id, context.dataset_id, api.base_url());

    execute(&api, context, cli.command).await
}

async fn execute(api: &dyn AnnotationApi, context: ProjectContext, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Scenario { with_kiwi } => {
            let report = run_scenario(api, context, ScenarioOptions { with_kiwi }).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::ShowMeta => {
            let meta = api.get_project_meta(context.project_id).await?;
            println!("{}", serde_json::to_string_pretty(&meta.to_json()?)?);
        }
        Command::ListVideos => {
            for video in api.list_videos(context.dataset_id).await? {
                println!("{}\t{}\t{} tags", video.id, video.name, video.tags.len());
            }
        }
        Command::EnsureTagMeta {
            name,
            value_type,
            applicable_to,
            values,
        } => {
            let desired = TagMeta::new(name, value_type)
                .with_applicable_to(applicable_to)
                .with_possible_values(values);
            let project_meta = api.get_project_meta(context.project_id).await?;
            let (tag_meta, _) = ensure_tag_meta(api, context.project_id, &desired, project_meta).await?;
            println!("{}\t{}", tag_meta.sly_id().unwrap_or_default(), tag_meta.name);
        }
        Command::VideoTag { action } => tag_action(api, context, Target::Video, action).await?,
        Command::ObjectTag { action } => tag_action(api, context, Target::Object, action).await?,
    }
    Ok(())
}

async fn find_tag_meta(api: &dyn AnnotationApi, project_id: i64, name: &str) -> anyhow::Result<TagMeta> {
    let meta = api.get_project_meta(project_id).await?;
    match meta.get_tag_meta(name) {
        Some(tag_meta) => Ok(tag_meta.clone()),
        None => Err(TaggerError::TagMetaNotFound(name.to_string()).into()),
    }
}

async fn tag_action(api: &dyn AnnotationApi, context: ProjectContext, target: Target, action: TagAction) -> anyhow::Result<()> {
    match action {
        TagAction::Add {
            tag_meta,
            target: target_id,
            value,
            from,
            to,
        } => {
            let frame_range = match (from, to) {
                (Some(start), Some(end)) => Some(FrameRange::new(start, end)?),
                (None, None) => None,
                _ => bail!("--from and --to must be given together"),
            };
            let tag_meta = find_tag_meta(api, context.project_id, &tag_meta).await?;
            let value = value.map(|raw| tag_meta.parse_value(&raw)).transpose()?;
            let tag_id = match target {
                Target::Video => VideoTags::new(api, &tag_meta)?.add(target_id, value.as_ref(), frame_range).await?,
                Target::Object => ObjectTags::new(api, &tag_meta)?.add(target_id, value.as_ref(), frame_range).await?,
            };
            println!("{}", tag_id);
        }
        TagAction::UpdateValue { tag_meta, tag, value } => {
            let tag_meta = find_tag_meta(api, context.project_id, &tag_meta).await?;
            let value = tag_meta.parse_value(&value)?;
            match target {
                Target::Video => VideoTags::new(api, &tag_meta)?.update_value(tag, &value).await?,
                Target::Object => ObjectTags::new(api, &tag_meta)?.update_value(tag, &value).await?,
            }
        }
        TagAction::UpdateRange { tag, from, to } => {
            let frame_range = FrameRange::new(from, to)?;
            match target {
                Target::Video => api.update_video_tag_frame_range(tag, frame_range).await?,
                Target::Object => api.update_object_tag_frame_range(tag, frame_range).await?,
            }
            info!("Tag {} frame range set to {}", tag, frame_range);
        }
        TagAction::Remove { tag } => {
            match target {
                Target::Video => api.remove_video_tag(tag).await?,
                Target::Object => api.remove_object_tag(tag).await?,
            }
            info!("Removed tag {}", tag);
        }
    }
    Ok(())
}
