use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use status_tables::api_client::ApiClient;
use status_tables::cell_renderer::CellRenderer;
use status_tables::column_manager::ColumnCatalog;
use status_tables::config::config::Config;
use status_tables::data_exporter::DataExporter;
use status_tables::datasource_adapter::{ApiDataSource, SnapshotDataSource};
use status_tables::datasource_trait::DataSource;
use status_tables::image_resolver::{HttpImageFetcher, ImageResolver};
use status_tables::logging;
use status_tables::presets::PresetKind;
use status_tables::running_notes::{self, NoteType};
use status_tables::table_renderer::TableTab;
use status_tables::view::{ProjectView, ViewContent};

/// Render project sample tables from the genomics status API
#[derive(Parser, Debug)]
#[command(name = "status-tables")]
#[command(version)]
struct Cli {
    /// Config file (defaults to the platform config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Read JSON snapshots from this directory instead of the API
    #[arg(long, global = true)]
    snapshot: Option<PathBuf>,

    /// Echo log output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print the diagnostic console when done
    #[arg(long, global = true)]
    show_log: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Render a project's sample table as HTML
    Render(RenderArgs),

    /// List the default and user column presets
    Presets,

    /// Export a project's sample table as CSV
    Export(ExportArgs),

    /// List the running notes of a project, flowcell or workset, or add one
    Notes(NotesArgs),

    /// Print a commented default config file
    GenerateConfig,
}

#[derive(Args, Debug)]
struct TableArgs {
    /// Project id, e.g. P12345
    #[arg(short, long)]
    project: String,

    /// "samples" or "library-validation"
    #[arg(short, long)]
    tab: Option<String>,

    /// Preset to apply (basic columns otherwise)
    #[arg(long)]
    preset: Option<String>,

    /// "default" or "user"
    #[arg(long, default_value = "default")]
    preset_type: String,
}

#[derive(Args, Debug)]
struct RenderArgs {
    #[command(flatten)]
    table: TableArgs,

    /// Output file (stdout when omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Write only the <tbody> rows instead of a full page
    #[arg(long)]
    body_only: bool,

    /// Leave thumbnail placeholders unresolved
    #[arg(long)]
    no_images: bool,
}

#[derive(Args, Debug)]
struct ExportArgs {
    #[command(flatten)]
    table: TableArgs,

    /// Only export rows containing this text
    #[arg(long)]
    filter: Option<String>,

    /// Treat --filter as a fuzzy pattern
    #[arg(long)]
    fuzzy: bool,

    /// Sort rows on this column header
    #[arg(long)]
    sort: Option<String>,

    /// Sort descending
    #[arg(long)]
    desc: bool,

    /// CSV file to write
    #[arg(short, long)]
    output: PathBuf,
}

#[derive(Args, Debug)]
struct NotesArgs {
    /// Project id, flowcell or workset name
    partition: String,

    /// project, flowcell, flowcell_ont or workset
    #[arg(long, default_value = "project")]
    note_type: String,

    /// Post this text as a new note
    #[arg(long)]
    add: Option<String>,

    /// Category of the new note (repeatable)
    #[arg(long = "category")]
    categories: Vec<String>,
}

fn load_config(cli: &Cli) -> Result<Config> {
    match &cli.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => Config::load(),
    }
}

fn build_source(cli: &Cli, config: &Config) -> Result<Arc<dyn DataSource>> {
    if let Some(dir) = &cli.snapshot {
        return Ok(Arc::new(SnapshotDataSource::new(dir)));
    }

    let client = ApiClient::from_config(&config.api)?;
    Ok(Arc::new(ApiDataSource::new(client)))
}

fn open_view(cli: &Cli, config: &Config, args: &TableArgs) -> Result<ProjectView> {
    let catalog = match &config.columns {
        Some(columns) => ColumnCatalog::new(columns.clone()),
        None => ColumnCatalog::builtin(),
    };

    let mut view = ProjectView::new(
        &args.project,
        build_source(cli, config)?,
        catalog,
        CellRenderer::new(&config.render),
    );

    let tab: TableTab = args
        .tab
        .as_deref()
        .unwrap_or(config.render.default_tab.as_str())
        .parse()?;
    view.set_tab(tab);

    view.load_presets();
    if let Some(name) = &args.preset {
        let kind: PresetKind = args.preset_type.parse()?;
        view.select_preset(kind, name)?;
    }
    view.load_title();
    view.load_sticky_note();

    match view.render_table() {
        ViewContent::Table | ViewContent::Empty(_) => Ok(view),
        ViewContent::Unavailable => Err(anyhow!(
            "Could not load samples for {} (see --show-log)",
            args.project
        )),
    }
}

fn run_render(cli: &Cli, config: &Config, args: &RenderArgs) -> Result<()> {
    let mut view = open_view(cli, config, &args.table)?;

    if config.images.enabled && !args.no_images && cli.snapshot.is_none() {
        let fetcher = HttpImageFetcher::new(
            &config.api.base_url,
            config.api.token.clone(),
            config.api.timeout_secs,
        )?;
        let resolver = ImageResolver::new(Arc::new(fetcher), config.images.max_concurrent);
        let runtime = tokio::runtime::Runtime::new()?;
        let patched = runtime.block_on(view.resolve_images(&resolver));
        info!(target: "images", "Resolved {} thumbnails", patched);
    }

    let html = if args.body_only {
        view.table().map(|t| t.body_html.clone()).unwrap_or_default()
    } else {
        view.page_html()
    };

    match &args.output {
        Some(path) => {
            std::fs::write(path, html)?;
            eprintln!("Wrote {}", path.display());
        }
        None => println!("{}", html),
    }

    view.teardown();
    Ok(())
}

fn run_export(cli: &Cli, config: &Config, args: &ExportArgs) -> Result<()> {
    let view = open_view(cli, config, &args.table)?;
    let table = view
        .table()
        .ok_or_else(|| anyhow!("Project {} has no samples to export", args.table.project))?;

    let index = view.search_index();
    let mut rows: Option<Vec<usize>> = args.filter.as_deref().map(|query| {
        if args.fuzzy {
            index.fuzzy_filter(query, 1)
        } else {
            index.filter_rows(query)
        }
    });

    if let Some(header) = &args.sort {
        let column = index
            .column_index(header)
            .ok_or_else(|| anyhow!("No column '{}' in the table", header))?;
        let sorted = index.sorted_rows(column, args.desc);
        rows = Some(match rows {
            Some(kept) => sorted.into_iter().filter(|r| kept.contains(r)).collect(),
            None => sorted,
        });
    }

    let message = DataExporter::export_to_file(table, rows.as_deref(), &args.output)?;
    eprintln!("{}", message);

    view.teardown();
    Ok(())
}

fn run_presets(cli: &Cli, config: &Config) -> Result<()> {
    let source = build_source(cli, config)?;
    let value = source.presets()?;
    let presets = status_tables::presets::PresetSet::from_value(&value)?;

    for kind in [PresetKind::Default, PresetKind::User] {
        println!("{} presets:", kind);
        let list = presets.list(kind);
        if list.is_empty() && kind == PresetKind::User {
            println!("  {}", status_tables::presets::NO_USER_PRESETS);
        }
        for preset in list {
            let order = match &preset.column_order {
                Some(order) => format!(" (order: {})", order.join(", ")),
                None => String::new(),
            };
            println!("  {} - {} columns{}", preset.name, preset.selected().count(), order);
        }
    }
    Ok(())
}

fn run_notes(cli: &Cli, config: &Config, args: &NotesArgs) -> Result<()> {
    if cli.snapshot.is_some() {
        return Err(anyhow!("Running notes are only available from the live API"));
    }

    let client = ApiClient::from_config(&config.api)?;
    if let Some(text) = &args.add {
        let note_type: NoteType = args.note_type.parse()?;
        client.post_running_note(&args.partition, text, &args.categories, note_type)?;
        info!(target: "notes", "Added {} note to {}", note_type, args.partition);
        eprintln!("Note added to {}", args.partition);
    }

    let notes = running_notes::parse_notes(&client.get_running_notes(&args.partition)?);
    if notes.is_empty() {
        println!("No running notes for {}", args.partition);
    }
    for note in notes {
        println!("{}\n", note.to_text());
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_buffer = logging::init_tracing(cli.verbose);

    if let Commands::GenerateConfig = cli.command {
        print!("{}", Config::create_default_with_comments());
        return Ok(());
    }

    let config = load_config(&cli)?;
    let result = match &cli.command {
        Commands::Render(args) => run_render(&cli, &config, args),
        Commands::Export(args) => run_export(&cli, &config, args),
        Commands::Presets => run_presets(&cli, &config),
        Commands::Notes(args) => run_notes(&cli, &config, args),
        Commands::GenerateConfig => Ok(()),
    };

    if cli.show_log {
        eprintln!("--- diagnostic console ---");
        for entry in log_buffer.get_recent(200) {
            eprintln!("{}", entry.format_for_display());
        }
    }

    result
}
